//! PKCE (Proof Key for Code Exchange) for the client side of the grant.
//!
//! Implements the S256 method of RFC 7636: a random verifier is kept by the
//! caller, its challenge travels in the authorization URL, and the verifier is
//! sent with the token request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Challenge method sent alongside the challenge.
pub const METHOD_S256: &str = "S256";

/// Generate a code verifier.
///
/// Two UUIDs give 256 bits of randomness in 64 unreserved characters, inside the
/// 43..=128 length window required by RFC 7636.
#[must_use]
pub fn generate_verifier() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// Compute `BASE64URL(SHA256(code_verifier))`.
#[must_use]
pub fn challenge_s256(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s256_valid() {
        // RFC 7636 Appendix B test vector
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(challenge_s256(verifier), challenge);
    }

    #[test]
    fn test_s256_invalid_verifier() {
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_ne!(challenge_s256("wrong-verifier"), challenge);
    }

    #[test]
    fn test_generated_verifier_shape() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 64);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(verifier, generate_verifier());
        assert_eq!(challenge_s256(&verifier).len(), 43);
    }
}
