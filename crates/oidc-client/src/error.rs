//! Error types for the OIDC client.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Every failure of an authorization flow is an [`OidcError`]; the variants are kept
//! apart so that a bad code, an untrusted signature and an unreachable provider can
//! never be confused with each other.

use std::time::Duration;

/// Transport-level failures of an outbound HTTP call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The call did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider could not be reached (DNS, refused connection, TLS handshake).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport problem (reset connection, truncated body, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

impl NetworkError {
    /// Classify a `reqwest` error. `timeout` is the budget the call was given.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    /// Classify an error coming out of the middleware stack.
    #[must_use]
    pub fn from_middleware(err: &reqwest_middleware::Error, timeout: Duration) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => Self::from_reqwest(e, timeout),
            reqwest_middleware::Error::Middleware(e) => Self::Transport(e.to_string()),
        }
    }
}

/// Failures while obtaining a signature verification key.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key endpoint could not be reached.
    #[error("key endpoint unreachable: {0}")]
    Network(#[from] NetworkError),

    /// The key endpoint answered with a non-200 status.
    #[error("key endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The key document could not be parsed or held no usable key.
    #[error("malformed key document: {0}")]
    MalformedDocument(String),

    /// No key matches the requested key identifier.
    #[error("no verification key for kid {kid:?}")]
    NotFound {
        /// Requested key identifier, if the token carried one
        kid: Option<String>,
    },

    /// A key was found but cannot be used for verification.
    #[error("unusable verification key {kid:?}: {reason}")]
    InvalidKey {
        /// Key identifier
        kid: Option<String>,
        /// Why the key was rejected
        reason: String,
    },
}

impl KeyError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(kid: Option<&str>) -> Self {
        Self::NotFound { kid: kid.map(str::to_owned) }
    }

    /// Create a malformed document error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument(reason.into())
    }
}

/// Errors surfaced by an authorization flow.
#[derive(thiserror::Error, Debug)]
pub enum OidcError {
    /// `state` missing or not equal to the one issued for the session (CSRF).
    #[error("state parameter is missing or does not match the issued state")]
    InvalidState,

    /// The inbound callback cannot be exchanged (missing code, unresolvable redirect URI).
    #[error("invalid authorization callback: {reason}")]
    InvalidRequest {
        /// What is wrong with the callback
        reason: String,
    },

    /// The provider redirected back with an `error` parameter instead of a code.
    #[error("authorization denied by provider: {error}")]
    AuthorizationDenied {
        /// OAuth2 error code (`access_denied`, ...)
        error: String,
        /// Optional `error_description`
        description: Option<String>,
    },

    /// The provider rejected or could not complete the code exchange.
    #[error("token exchange failed ({status}): {detail}")]
    ExchangeFailed {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Raw provider error text, or the parse failure for a malformed body
        detail: String,
    },

    /// The exchange succeeded but the provider returned no identity token.
    #[error("token response carries no id_token")]
    MissingIdToken,

    /// The identity token is not a well-formed compact JWS.
    #[error("malformed identity token: {reason}")]
    MalformedToken {
        /// Parse failure
        reason: String,
    },

    /// The token declares an algorithm outside the configured allow-list.
    #[error("identity token algorithm {algorithm} is not allowed")]
    AlgorithmNotAllowed {
        /// Algorithm named in the token header
        algorithm: String,
    },

    /// The signature does not match the resolved key.
    #[error("identity token signature is invalid")]
    InvalidSignature,

    /// The `exp` claim is in the past.
    #[error("identity token has expired")]
    TokenExpired,

    /// A claim does not hold the expected value.
    #[error("identity token claim '{claim}' rejected: {detail}")]
    ClaimMismatch {
        /// Claim name
        claim: String,
        /// Why the claim was rejected
        detail: String,
    },

    /// No verification key could be obtained.
    #[error("key resolution failed: {0}")]
    KeyResolutionFailed(#[from] KeyError),

    /// Transport failure talking to the provider.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
}

impl OidcError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }

    /// Create an exchange failure.
    #[must_use]
    pub fn exchange_failed(status: u16, detail: impl Into<String>) -> Self {
        Self::ExchangeFailed { status, detail: detail.into() }
    }

    /// Create a malformed token error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken { reason: reason.into() }
    }

    /// Create a claim mismatch error.
    #[must_use]
    pub fn claim_mismatch(claim: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ClaimMismatch { claim: claim.into(), detail: detail.into() }
    }

    /// Create an algorithm rejection.
    #[must_use]
    pub fn algorithm_not_allowed(algorithm: impl Into<String>) -> Self {
        Self::AlgorithmNotAllowed { algorithm: algorithm.into() }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::ExchangeFailed { .. } => "exchange_failed",
            Self::MissingIdToken => "missing_id_token",
            Self::MalformedToken { .. } => "malformed_token",
            Self::AlgorithmNotAllowed { .. } => "algorithm_not_allowed",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::ClaimMismatch { .. } => "claim_mismatch",
            Self::KeyResolutionFailed(_) => "key_resolution_failed",
            Self::Network(_) => "network",
        }
    }

    /// Returns true if the identity token itself was rejected.
    #[must_use]
    pub const fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken { .. }
                | Self::AlgorithmNotAllowed { .. }
                | Self::InvalidSignature
                | Self::TokenExpired
                | Self::ClaimMismatch { .. }
        )
    }

    /// Returns true if the provider could not be reached at all.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::KeyResolutionFailed(KeyError::Network(_)))
    }
}

/// Errors raised while building a client from its configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A URI field does not parse or has the wrong shape.
    #[error("invalid {field}: {reason}")]
    InvalidUri {
        /// Configuration field name
        field: &'static str,
        /// Parse or validation failure
        reason: String,
    },

    /// A required field is empty.
    #[error("{0} must not be empty")]
    Missing(&'static str),

    /// The connection pool must hold at least one connection.
    #[error("pool size must be at least 1")]
    ZeroPoolSize,

    /// The accepted algorithms do not fit the key mode.
    #[error("algorithm {algorithm} cannot be used {reason}")]
    AlgorithmMismatch {
        /// Offending algorithm
        algorithm: String,
        /// Which mode rejects it
        reason: &'static str,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client initialisation failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ConfigError {
    /// Create an invalid URI error.
    #[must_use]
    pub fn invalid_uri(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidUri { field, reason: reason.into() }
    }
}

/// Result type alias for flow operations.
pub type OidcResult<T> = Result<T, OidcError>;
