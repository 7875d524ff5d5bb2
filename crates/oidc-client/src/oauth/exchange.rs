//! Authorization code → token exchange against the provider's token endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use url::Url;

use super::callback::CallbackRequest;
use crate::client::HttpClient;
use crate::config::RedirectUri;
use crate::error::{OidcError, OidcResult};

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthMode {
    /// `Authorization: Basic base64(client_id:client_secret)`.
    #[default]
    Basic,
    /// `client_id` and `client_secret` as form fields.
    RequestBody,
}

/// One inbound authorization callback, ready to be exchanged.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRequest {
    /// `code` query parameter.
    pub code: Option<String>,

    /// `state` query parameter.
    pub state: Option<String>,

    /// `error` query parameter sent instead of a code.
    pub error: Option<String>,

    /// `error_description` query parameter.
    pub error_description: Option<String>,

    /// State issued for this session when the user was sent to the provider.
    pub expected_state: String,

    /// Client authentication mode.
    pub auth_mode: ClientAuthMode,

    /// PKCE verifier matching the challenge in the authorization URL.
    pub code_verifier: Option<String>,

    /// Nonce the identity token must carry.
    pub nonce: Option<String>,

    /// `scheme://host` of the inbound request.
    pub callback_origin: Option<Url>,
}

impl ExchangeRequest {
    /// Build a request from explicit values.
    #[must_use]
    pub fn new(code: impl Into<String>, state: impl Into<String>, expected_state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            expected_state: expected_state.into(),
            ..Self::default()
        }
    }

    /// Read `code`, `state`, `error` and the origin from an inbound callback.
    #[must_use]
    pub fn from_callback(request: &impl CallbackRequest, expected_state: impl Into<String>) -> Self {
        Self {
            code: request.query_param("code"),
            state: request.query_param("state"),
            error: request.query_param("error"),
            error_description: request.query_param("error_description"),
            expected_state: expected_state.into(),
            callback_origin: request.origin(),
            ..Self::default()
        }
    }

    /// Set the client authentication mode.
    #[must_use]
    pub const fn with_auth_mode(mut self, mode: ClientAuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    /// Set the PKCE verifier.
    #[must_use]
    pub fn with_code_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(verifier.into());
        self
    }

    /// Set the expected nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the origin used to complete a path-only redirect URI.
    #[must_use]
    pub fn with_callback_origin(mut self, origin: Url) -> Self {
        self.callback_origin = Some(origin);
        self
    }

    /// Check the callback before anything leaves the process.
    ///
    /// Order matters: the state is checked first so a forged callback is rejected
    /// as CSRF whatever else it carries.
    ///
    /// # Errors
    ///
    /// `InvalidState`, `AuthorizationDenied` or `InvalidRequest`.
    pub fn validate(&self) -> OidcResult<&str> {
        match self.state.as_deref() {
            Some(state) if !self.expected_state.is_empty() && state == self.expected_state => {}
            _ => return Err(OidcError::InvalidState),
        }

        if let Some(error) = &self.error {
            return Err(OidcError::AuthorizationDenied {
                error: error.clone(),
                description: self.error_description.clone(),
            });
        }

        match self.code.as_deref() {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(OidcError::invalid_request("missing authorization code")),
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token for protected resources.
    pub access_token: String,

    /// Identity token (compact JWS).
    #[serde(default)]
    pub id_token: Option<String>,

    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Refresh token, kept for the caller.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,

    /// Local time the response was parsed.
    #[serde(skip_deserializing, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// When the access token stops being valid, if the provider said.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        self.received_at.checked_add_signed(ChronoDuration::try_seconds(secs)?)
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("has_id_token", &self.id_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// `Basic` authorization header value for the client credentials.
#[must_use]
pub fn basic_authorization(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

/// Performs the code exchange.
#[derive(Clone)]
pub struct TokenExchanger {
    http: HttpClient,
    token_endpoint: Url,
    redirect_uri: RedirectUri,
    client_id: String,
    client_secret: String,
}

impl TokenExchanger {
    /// Create an exchanger for one token endpoint.
    #[must_use]
    pub fn new(
        http: HttpClient,
        token_endpoint: Url,
        redirect_uri: RedirectUri,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_endpoint,
            redirect_uri,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Exchange the authorization code for tokens.
    ///
    /// A single attempt; provider rejections become `ExchangeFailed`, transport
    /// failures become `Network`.
    ///
    /// # Errors
    ///
    /// Returns error if the callback is invalid, the provider rejects the code,
    /// the response is malformed, or the provider is unreachable.
    pub async fn exchange(&self, request: &ExchangeRequest) -> OidcResult<TokenResponse> {
        let code = request.validate()?;

        let redirect_uri = self
            .redirect_uri
            .resolve(request.callback_origin.as_ref())
            .ok_or_else(|| OidcError::invalid_request("redirect URI needs the callback origin"))?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        if let Some(verifier) = request.code_verifier.as_deref() {
            form.push(("code_verifier", verifier));
        }

        let authorization = match request.auth_mode {
            ClientAuthMode::Basic => Some(basic_authorization(&self.client_id, &self.client_secret)),
            ClientAuthMode::RequestBody => {
                form.push(("client_id", self.client_id.as_str()));
                form.push(("client_secret", self.client_secret.as_str()));
                None
            }
        };

        let response = self
            .http
            .post_form(&self.token_endpoint, &form, authorization.as_deref())
            .await?;

        if !response.is_ok() {
            tracing::warn!(
                status = response.status,
                auth_mode = ?request.auth_mode,
                "Token endpoint rejected the authorization code"
            );
            return Err(OidcError::exchange_failed(response.status, response.body));
        }

        let tokens: TokenResponse = response.json().map_err(|e| {
            OidcError::exchange_failed(response.status, format!("malformed token response: {e}"))
        })?;

        if tokens.access_token.is_empty() {
            return Err(OidcError::exchange_failed(
                response.status,
                "malformed token response: empty access_token",
            ));
        }

        tracing::debug!(
            token_type = %tokens.token_type,
            expires_in = ?tokens.expires_in,
            has_id_token = tokens.id_token.is_some(),
            "Authorization code exchanged"
        );

        Ok(tokens)
    }
}

impl std::fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchanger")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("client_id", &self.client_id)
            .finish()
    }
}
