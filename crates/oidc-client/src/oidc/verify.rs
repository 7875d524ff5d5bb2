//! Identity token verification.
//!
//! Order of checks:
//! 1. compact JWS structure (three base64url segments, JSON header)
//! 2. header `alg` against the configured allow-list, before any key lookup
//! 3. key resolution by `kid`
//! 4. signature, then `exp` / `nbf` / `iss` / `aud` / `sub`
//! 5. `nonce`, when the caller expects one

use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::claims::VerifiedClaims;
use super::keys::KeyResolver;
use crate::error::{KeyError, OidcError, OidcResult};

/// Registered claims every identity token must carry.
const REQUIRED_CLAIMS: [&str; 4] = ["exp", "iss", "aud", "sub"];

/// Decoded JOSE header.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Declared algorithm, as written in the token.
    pub alg: String,

    /// Key identifier.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type.
    #[serde(default)]
    pub typ: Option<String>,
}

/// Structurally valid compact JWS, signature not yet checked.
#[derive(Debug, Clone)]
pub struct CompactToken {
    /// Decoded header.
    pub header: TokenHeader,

    /// Decoded payload object.
    pub payload: Map<String, Value>,
}

impl CompactToken {
    /// Split and decode a compact token.
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken` unless the token has exactly three unpadded
    /// base64url segments, a JSON header with `alg`, and a JSON object payload.
    pub fn parse(token: &str) -> OidcResult<Self> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments.as_slice() else {
            return Err(OidcError::malformed(format!("expected 3 segments, found {}", segments.len())));
        };

        let header = decode_segment(header, "header")?;
        let payload = decode_segment(payload, "payload")?;
        decode_segment(signature, "signature")?;

        let header: TokenHeader = serde_json::from_slice(&header)
            .map_err(|e| OidcError::malformed(format!("header: {e}")))?;
        let payload: Map<String, Value> = serde_json::from_slice(&payload)
            .map_err(|e| OidcError::malformed(format!("payload: {e}")))?;

        Ok(Self { header, payload })
    }

    /// Declared algorithm, if `jsonwebtoken` knows it.
    #[must_use]
    pub fn algorithm(&self) -> Option<Algorithm> {
        Algorithm::from_str(&self.header.alg).ok()
    }
}

fn decode_segment(segment: &str, name: &str) -> OidcResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| OidcError::malformed(format!("{name} is not base64url: {e}")))
}

/// Verifies identity tokens for one client.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: KeyResolver,
    client_id: String,
    issuer: String,
    algorithms: Vec<Algorithm>,
    leeway: Duration,
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// `algorithms` is the allow-list; a token declaring anything else is
    /// rejected before its key is looked up.
    #[must_use]
    pub fn new(
        keys: KeyResolver,
        client_id: impl Into<String>,
        issuer: impl Into<String>,
        algorithms: Vec<Algorithm>,
        leeway: Duration,
    ) -> Self {
        Self { keys, client_id: client_id.into(), issuer: issuer.into(), algorithms, leeway }
    }

    /// Key resolver backing this verifier.
    #[must_use]
    pub const fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Accepted algorithms.
    #[must_use]
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Verify a token without a nonce check.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_with_nonce`].
    pub async fn verify(&self, token: &str) -> OidcResult<VerifiedClaims> {
        self.verify_with_nonce(token, None).await
    }

    /// Verify a token and, when `nonce` is given, its `nonce` claim.
    ///
    /// # Errors
    ///
    /// `MalformedToken`, `AlgorithmNotAllowed`, `KeyResolutionFailed`,
    /// `InvalidSignature`, `TokenExpired` or `ClaimMismatch`.
    pub async fn verify_with_nonce(&self, token: &str, nonce: Option<&str>) -> OidcResult<VerifiedClaims> {
        let compact = CompactToken::parse(token)?;

        let algorithm = compact
            .algorithm()
            .filter(|alg| self.algorithms.contains(alg))
            .ok_or_else(|| OidcError::algorithm_not_allowed(&compact.header.alg))?;

        let key = self.keys.resolve(compact.header.kid.as_deref()).await?;
        if key.algorithm().is_some_and(|pinned| pinned != algorithm) {
            return Err(OidcError::algorithm_not_allowed(&compact.header.alg));
        }

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS);
        validation.leeway = self.leeway.as_secs();
        validation.validate_nbf = true;

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, key.decoding_key(), &validation)
            .map_err(|e| classify(&e, &compact.header))?;
        let claims = VerifiedClaims::from_map(data.claims)?;

        if let Some(expected) = nonce {
            match claims.nonce() {
                Some(actual) if actual == expected => {}
                Some(_) => return Err(OidcError::claim_mismatch("nonce", "does not match the issued nonce")),
                None => return Err(OidcError::claim_mismatch("nonce", "missing")),
            }
        }

        tracing::debug!(alg = ?algorithm, kid = ?compact.header.kid, "Identity token verified");
        Ok(claims)
    }
}

/// Map a `jsonwebtoken` failure to the flow error it stands for.
fn classify(err: &jsonwebtoken::errors::Error, header: &TokenHeader) -> OidcError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::Crypto(_) => OidcError::InvalidSignature,
        ErrorKind::ExpiredSignature => OidcError::TokenExpired,
        ErrorKind::ImmatureSignature => OidcError::claim_mismatch("nbf", "token is not valid yet"),
        ErrorKind::InvalidIssuer => OidcError::claim_mismatch("iss", "unexpected issuer"),
        ErrorKind::InvalidAudience => OidcError::claim_mismatch("aud", "client is not an audience"),
        ErrorKind::InvalidSubject => OidcError::claim_mismatch("sub", "unexpected subject"),
        ErrorKind::MissingRequiredClaim(claim) => OidcError::claim_mismatch(claim.as_str(), "missing"),
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName | ErrorKind::MissingAlgorithm => {
            OidcError::algorithm_not_allowed(&header.alg)
        }
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
            OidcError::KeyResolutionFailed(KeyError::InvalidKey {
                kid: header.kid.clone(),
                reason: err.to_string(),
            })
        }
        _ => OidcError::malformed(err.to_string()),
    }
}
