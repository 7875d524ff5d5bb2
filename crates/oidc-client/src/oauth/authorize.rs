//! Authorization URL construction for the first leg of the code grant.

use url::Url;

use super::pkce;

/// Parameters of one authorization redirect.
///
/// The caller stores `state` (and `nonce` / `code_verifier` when used) in its
/// session and hands them back when the provider redirects to the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Anti-CSRF value echoed back by the provider.
    pub state: String,

    /// Value the identity token must echo in its `nonce` claim.
    pub nonce: Option<String>,

    /// PKCE verifier; its S256 challenge goes into the URL.
    pub code_verifier: Option<String>,

    /// Scope override. The configured scope is used when unset.
    pub scope: Option<String>,

    /// Origin used to complete a path-only redirect URI.
    pub callback_origin: Option<Url>,

    /// Extra provider-specific parameters (`prompt`, `login_hint`, ...).
    pub extra: Vec<(String, String)>,
}

impl AuthorizationRequest {
    /// New request with a random state, a random nonce and a PKCE verifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: uuid::Uuid::new_v4().simple().to_string(),
            nonce: Some(uuid::Uuid::new_v4().simple().to_string()),
            code_verifier: Some(pkce::generate_verifier()),
            scope: None,
            callback_origin: None,
            extra: Vec::new(),
        }
    }

    /// New request with a caller-chosen state and nothing else.
    #[must_use]
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            nonce: None,
            code_verifier: None,
            scope: None,
            callback_origin: None,
            extra: Vec::new(),
        }
    }

    /// Set the nonce.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the PKCE verifier.
    #[must_use]
    pub fn code_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(verifier.into());
        self
    }

    /// Drop PKCE for providers that reject it.
    #[must_use]
    pub fn without_pkce(mut self) -> Self {
        self.code_verifier = None;
        self
    }

    /// Override the scope.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the origin used to complete a path-only redirect URI.
    #[must_use]
    pub fn callback_origin(mut self, origin: Url) -> Self {
        self.callback_origin = Some(origin);
        self
    }

    /// Add a provider-specific parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }
}

impl Default for AuthorizationRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the authorization parameters to the provider's authorize endpoint.
///
/// Parameters are form-encoded; existing query parameters on the endpoint are kept.
#[must_use]
pub fn build_authorize_url(
    endpoint: &Url,
    client_id: &str,
    redirect_uri: &str,
    default_scope: &str,
    request: &AuthorizationRequest,
) -> Url {
    let mut url = endpoint.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("response_type", "code");
        pairs.append_pair("client_id", client_id);
        pairs.append_pair("redirect_uri", redirect_uri);
        pairs.append_pair("scope", request.scope.as_deref().unwrap_or(default_scope));
        pairs.append_pair("state", &request.state);

        if let Some(nonce) = &request.nonce {
            pairs.append_pair("nonce", nonce);
        }
        if let Some(verifier) = &request.code_verifier {
            pairs.append_pair("code_challenge", &pkce::challenge_s256(verifier));
            pairs.append_pair("code_challenge_method", pkce::METHOD_S256);
        }
        for (k, v) in &request.extra {
            pairs.append_pair(k, v);
        }
    }
    url
}
