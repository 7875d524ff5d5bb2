//! Configuration for the OIDC client.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use url::Url;

use crate::error::ConfigError;

/// Default values for optional settings.
pub mod defaults {
    use std::time::Duration;

    /// Authorization endpoint path, relative to the provider URI.
    pub const AUTHORIZE_PATH: &str = "/oauth2/authorize";

    /// Token endpoint path, relative to the provider URI.
    pub const TOKEN_PATH: &str = "/oauth2/token";

    /// Scope requested when the caller does not name one.
    pub const SCOPE: &str = "openid profile email";

    /// Request timeout for every provider call.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum concurrent provider connections.
    pub const POOL_SIZE: usize = 16;

    /// Keepalive expiry for idle pooled connections.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Allowed clock skew when checking `exp` / `nbf`.
    pub const CLOCK_LEEWAY: Duration = Duration::from_secs(60);

    /// Minimum delay between key refreshes triggered by an unknown `kid`.
    pub const KEY_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);
}

/// Client configuration.
///
/// Built once and handed to [`crate::OidcClient::new`], which validates it and keeps
/// its own copy for the lifetime of the client.
#[derive(Clone)]
pub struct Config {
    /// Base URI of the identity provider.
    pub provider_uri: String,

    /// OAuth2 client identifier.
    pub client_id: String,

    /// OAuth2 client secret. Also the HMAC key when no certificates endpoint is set.
    pub client_secret: String,

    /// Authorization endpoint, a path relative to `provider_uri` or an absolute URL.
    pub authorize_path: String,

    /// Token endpoint, a path relative to `provider_uri` or an absolute URL.
    pub token_path: String,

    /// Redirect URI registered with the provider. Either absolute, or an absolute
    /// path resolved against the scheme and host of the inbound callback.
    pub redirect_uri: String,

    /// Userinfo endpoint (optional). Enrichment is skipped when unset.
    pub userinfo_path: Option<String>,

    /// Key document endpoint (optional). Without it, tokens are verified with the
    /// client secret.
    pub certificates_uri: Option<String>,

    /// Expected `iss` claim. Defaults to `provider_uri`.
    pub issuer: Option<String>,

    /// Accepted identity-token algorithms. Defaults to RS256 with a certificates
    /// endpoint and HS256 without.
    pub id_token_algorithms: Vec<Algorithm>,

    /// Scope requested in authorization URLs.
    pub scope: String,

    /// Connection pool size, also the bound on in-flight provider calls.
    pub pool_size: usize,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Clock leeway for time-based claims.
    pub clock_leeway: Duration,

    /// Minimum delay between unknown-`kid` key refreshes. Zero disables throttling.
    pub key_refresh_cooldown: Duration,
}

/// Alias matching the name used throughout the documentation.
pub type ClientConfig = Config;

impl Config {
    /// Create a configuration with default endpoint paths and timeouts.
    #[must_use]
    pub fn new(
        provider_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            provider_uri: provider_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_path: defaults::AUTHORIZE_PATH.to_string(),
            token_path: defaults::TOKEN_PATH.to_string(),
            redirect_uri: redirect_uri.into(),
            userinfo_path: None,
            certificates_uri: None,
            issuer: None,
            id_token_algorithms: Vec::new(),
            scope: defaults::SCOPE.to_string(),
            pool_size: defaults::POOL_SIZE,
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            clock_leeway: defaults::CLOCK_LEEWAY,
            key_refresh_cooldown: defaults::KEY_REFRESH_COOLDOWN,
        }
    }

    /// Create a test configuration pointing every endpoint at a mock provider.
    ///
    /// Uses the shared-secret key mode, no userinfo endpoint, short timeouts and no
    /// refresh throttling.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            authorize_path: "/authorize".to_string(),
            token_path: "/token".to_string(),
            issuer: Some(base_url.to_string()),
            pool_size: 4,
            request_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            key_refresh_cooldown: Duration::ZERO,
            ..Self::new(base_url, "test-client", "test-secret", "https://app.example.com/callback")
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required: `OIDC_PROVIDER_URI`, `OIDC_CLIENT_ID`, `OIDC_CLIENT_SECRET`,
    /// `OIDC_REDIRECT_URI`. Optional: `OIDC_AUTHORIZE_PATH`, `OIDC_TOKEN_PATH`,
    /// `OIDC_USERINFO_PATH`, `OIDC_CERTIFICATES_URI`, `OIDC_ISSUER`,
    /// `OIDC_ALGORITHMS` (comma separated), `OIDC_SCOPE`, `OIDC_POOL_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or a value is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        fn required(name: &str) -> anyhow::Result<String> {
            std::env::var(name).map_err(|_| anyhow::anyhow!("{name} is not set"))
        }

        let mut config = Self::new(
            required("OIDC_PROVIDER_URI")?,
            required("OIDC_CLIENT_ID")?,
            required("OIDC_CLIENT_SECRET")?,
            required("OIDC_REDIRECT_URI")?,
        );

        if let Ok(path) = std::env::var("OIDC_AUTHORIZE_PATH") {
            config.authorize_path = path;
        }
        if let Ok(path) = std::env::var("OIDC_TOKEN_PATH") {
            config.token_path = path;
        }
        config.userinfo_path = std::env::var("OIDC_USERINFO_PATH").ok();
        config.certificates_uri = std::env::var("OIDC_CERTIFICATES_URI").ok();
        config.issuer = std::env::var("OIDC_ISSUER").ok();
        if let Ok(scope) = std::env::var("OIDC_SCOPE") {
            config.scope = scope;
        }
        if let Ok(size) = std::env::var("OIDC_POOL_SIZE") {
            config.pool_size = size.parse()?;
        }
        if let Ok(list) = std::env::var("OIDC_ALGORITHMS") {
            config.id_token_algorithms = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Algorithm::from_str)
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }

    /// Set the userinfo endpoint.
    #[must_use]
    pub fn with_userinfo(mut self, path: impl Into<String>) -> Self {
        self.userinfo_path = Some(path.into());
        self
    }

    /// Set the key document endpoint, switching verification to remote keys.
    #[must_use]
    pub fn with_certificates(mut self, uri: impl Into<String>) -> Self {
        self.certificates_uri = Some(uri.into());
        self
    }

    /// Set the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Restrict the accepted identity-token algorithms.
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: &[Algorithm]) -> Self {
        self.id_token_algorithms = algorithms.to_vec();
        self
    }

    /// Set the connection pool size.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Check if verification keys come from a remote endpoint.
    #[must_use]
    pub const fn uses_remote_keys(&self) -> bool {
        self.certificates_uri.is_some()
    }

    /// Check if a userinfo endpoint is configured.
    #[must_use]
    pub fn has_userinfo(&self) -> bool {
        self.userinfo_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Expected `iss` claim.
    #[must_use]
    pub fn expected_issuer(&self) -> &str {
        self.issuer.as_deref().unwrap_or(&self.provider_uri)
    }

    /// Accepted algorithms, falling back to the default for the key mode.
    #[must_use]
    pub fn algorithms(&self) -> Vec<Algorithm> {
        if !self.id_token_algorithms.is_empty() {
            return self.id_token_algorithms.clone();
        }
        if self.uses_remote_keys() { vec![Algorithm::RS256] } else { vec![Algorithm::HS256] }
    }

    /// Validate the configuration and resolve every endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if a URI is malformed, a required field is empty, the pool is
    /// empty, or the accepted algorithms do not fit the key mode.
    pub fn resolve(&self) -> Result<Endpoints, ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::Missing("client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::Missing("client_secret"));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }

        let provider = Url::parse(&self.provider_uri)
            .map_err(|e| ConfigError::invalid_uri("provider_uri", e.to_string()))?;
        if !matches!(provider.scheme(), "http" | "https") {
            return Err(ConfigError::invalid_uri("provider_uri", "scheme must be http or https"));
        }

        let redirect = RedirectUri::parse(&self.redirect_uri)?;

        let authorize = endpoint(&provider, &self.authorize_path, "authorize_path")?;
        let token = endpoint(&provider, &self.token_path, "token_path")?;
        let userinfo = match self.userinfo_path.as_deref() {
            Some(path) if !path.is_empty() => Some(endpoint(&provider, path, "userinfo_path")?),
            _ => None,
        };
        let certificates = match self.certificates_uri.as_deref() {
            Some(uri) => Some(
                Url::parse(uri).map_err(|e| ConfigError::invalid_uri("certificates_uri", e.to_string()))?,
            ),
            None => None,
        };

        for alg in self.algorithms() {
            let hmac = matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512);
            if certificates.is_some() && hmac {
                return Err(ConfigError::AlgorithmMismatch {
                    algorithm: format!("{alg:?}"),
                    reason: "with a remote key set",
                });
            }
            if certificates.is_none() && !hmac {
                return Err(ConfigError::AlgorithmMismatch {
                    algorithm: format!("{alg:?}"),
                    reason: "with the shared-secret key",
                });
            }
        }

        Ok(Endpoints { authorize, token, userinfo, certificates, redirect })
    }
}

/// Resolve an endpoint: absolute URLs are used as-is, paths are appended to the provider.
fn endpoint(provider: &Url, path: &str, field: &'static str) -> Result<Url, ConfigError> {
    if let Ok(absolute) = Url::parse(path) {
        return Ok(absolute);
    }
    let base = provider.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}")).map_err(|e| ConfigError::invalid_uri(field, e.to_string()))
}

impl Default for Config {
    fn default() -> Self {
        Self::new("https://localhost", "", "", "/callback")
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider_uri", &self.provider_uri)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("userinfo_path", &self.userinfo_path)
            .field("certificates_uri", &self.certificates_uri)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Every endpoint of a validated configuration.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Authorization endpoint.
    pub authorize: Url,
    /// Token endpoint.
    pub token: Url,
    /// Userinfo endpoint.
    pub userinfo: Option<Url>,
    /// Key document endpoint.
    pub certificates: Option<Url>,
    /// Redirect URI.
    pub redirect: RedirectUri,
}

/// A validated redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectUri {
    /// Fully qualified URI, sent as-is.
    Absolute(Url),
    /// Absolute path, completed with the scheme and host of the inbound request.
    Path(String),
}

impl RedirectUri {
    /// Parse and validate a configured redirect URI.
    ///
    /// # Errors
    ///
    /// Returns error for non-http(s) schemes, fragments, or relative paths.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match Url::parse(raw) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::invalid_uri("redirect_uri", "scheme must be http or https"));
                }
                if url.fragment().is_some() {
                    return Err(ConfigError::invalid_uri("redirect_uri", "must not contain a fragment"));
                }
                Ok(Self::Absolute(url))
            }
            Err(url::ParseError::RelativeUrlWithoutBase) if raw.starts_with('/') && !raw.starts_with("//") => {
                if raw.contains('#') {
                    return Err(ConfigError::invalid_uri("redirect_uri", "must not contain a fragment"));
                }
                Ok(Self::Path(raw.to_string()))
            }
            Err(e) => Err(ConfigError::invalid_uri("redirect_uri", e.to_string())),
        }
    }

    /// Produce the URI sent to the provider, completing a path with `origin`.
    #[must_use]
    pub fn resolve(&self, origin: Option<&Url>) -> Option<String> {
        match self {
            Self::Absolute(url) => Some(url.to_string()),
            Self::Path(path) => origin.and_then(|o| o.join(path).ok()).map(|u| u.to_string()),
        }
    }
}
