//! OIDC relying-party client.
//!
//! Provides:
//! - One pooled HTTP client shared by every flow (bounded, timed out, traced)
//! - Authorization URL construction with state, nonce and PKCE
//! - Authorization flows: code exchange, identity token verification, userinfo
//! - A remote key cache shared by all flows

mod http;
mod middleware;

pub use self::http::{HttpClient, HttpResponse};
pub use middleware::TraceRequests;

use std::sync::Arc;

use url::Url;

use crate::config::{Config, Endpoints};
use crate::error::{ConfigError, OidcError, OidcResult};
use crate::oauth::{
    AuthorizationRequest, ExchangeRequest, TokenExchanger, TokenResponse, build_authorize_url,
};
use crate::oidc::{
    AuthorizationFlow, FlowSteps, KeyResolver, Outcome, TokenVerifier, UserInfoEnricher,
};

/// OIDC client. Cheap to clone; clones share the connection pool and key cache.
#[derive(Clone)]
pub struct OidcClient {
    inner: Arc<Inner>,
}

struct Inner {
    /// Validated configuration, never mutated.
    config: Config,

    /// Resolved endpoints.
    endpoints: Endpoints,

    /// Shared transport.
    http: HttpClient,

    /// Exchanger, verifier and enricher.
    steps: Arc<FlowSteps>,
}

impl OidcClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let endpoints = config.resolve()?;
        let http = HttpClient::new(&config)?;

        let keys = match &endpoints.certificates {
            Some(uri) => KeyResolver::remote(http.clone(), uri.clone(), config.key_refresh_cooldown),
            None => KeyResolver::shared_secret(&config.client_secret),
        };

        let exchanger = TokenExchanger::new(
            http.clone(),
            endpoints.token.clone(),
            endpoints.redirect.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        );
        let verifier = TokenVerifier::new(
            keys,
            config.client_id.clone(),
            config.expected_issuer(),
            config.algorithms(),
            config.clock_leeway,
        );
        let enricher = endpoints
            .userinfo
            .clone()
            .map(|endpoint| UserInfoEnricher::new(http.clone(), endpoint));

        tracing::info!(
            provider = %config.provider_uri,
            remote_keys = config.uses_remote_keys(),
            userinfo = enricher.is_some(),
            pool_size = config.pool_size,
            "OIDC client ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoints,
                http,
                steps: Arc::new(FlowSteps::new(exchanger, verifier, enricher)),
            }),
        })
    }

    /// Configuration the client was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Resolved endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    /// Authorization URL to send the user to.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the redirect URI is a path and the request has
    /// no callback origin.
    pub fn authorize_url(&self, request: &AuthorizationRequest) -> OidcResult<Url> {
        let redirect_uri = self
            .inner
            .endpoints
            .redirect
            .resolve(request.callback_origin.as_ref())
            .ok_or_else(|| OidcError::invalid_request("redirect URI needs the callback origin"))?;

        Ok(build_authorize_url(
            &self.inner.endpoints.authorize,
            &self.inner.config.client_id,
            &redirect_uri,
            &self.inner.config.scope,
            request,
        ))
    }

    /// Start an authorization flow for one inbound callback.
    #[must_use]
    pub fn flow(&self, request: ExchangeRequest) -> AuthorizationFlow {
        AuthorizationFlow::new(Arc::clone(&self.inner.steps), request)
    }

    /// Run a full authorization flow: exchange, verify, enrich.
    pub async fn authorization_code_token(&self, request: ExchangeRequest) -> Outcome {
        self.flow(request).run().await
    }

    /// Exchange a code without verifying the identity token.
    ///
    /// # Errors
    ///
    /// See [`TokenExchanger::exchange`].
    pub async fn exchange(&self, request: &ExchangeRequest) -> OidcResult<TokenResponse> {
        self.inner.steps.exchanger().exchange(request).await
    }

    /// GET a provider resource with a bearer access token.
    ///
    /// `path` is relative to the provider URI, or an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an unusable path and `Network` on transport
    /// failure. Non-200 statuses are returned, not raised.
    pub async fn protected_resource(&self, path: &str, access_token: &str) -> OidcResult<HttpResponse> {
        let url = resource_url(&self.inner.config.provider_uri, path)?;
        Ok(self.inner.http.get_bearer(&url, access_token).await?)
    }

    /// Token verifier, for identity tokens obtained outside a flow.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        self.inner.steps.verifier()
    }

    /// Drop cached verification keys; the next verification refetches them.
    pub fn invalidate_keys(&self) {
        self.inner.steps.verifier().keys().invalidate();
        tracing::info!("Verification keys invalidated");
    }
}

fn resource_url(provider_uri: &str, path: &str) -> OidcResult<Url> {
    if let Ok(absolute) = Url::parse(path) {
        return Ok(absolute);
    }
    let base = provider_uri.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
        .map_err(|e| OidcError::invalid_request(format!("invalid resource path: {e}")))
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("provider", &self.inner.config.provider_uri)
            .field("client_id", &self.inner.config.client_id)
            .field("remote_keys", &self.inner.config.uses_remote_keys())
            .finish()
    }
}
