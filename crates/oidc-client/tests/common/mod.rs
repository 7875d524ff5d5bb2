//! Shared fixtures: a mock identity provider's keys and tokens.

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use wiremock::MockServer;

use oidc_client::{ClientConfig, ExchangeRequest, OidcClient};

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const AUTH_CODE: &str = "auth-code-123";
pub const STATE: &str = "state-abc";
pub const ACCESS_TOKEN: &str = "access-token-xyz";

/// An RSA key pair as the provider would hold it.
pub struct TestKey {
    pub private_pem: String,
    pub public_pem: String,
    pub n: String,
    pub e: String,
}

impl TestKey {
    fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = private_key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();

        Self {
            private_pem,
            public_pem,
            n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
        }
    }

    /// JWK entry for this key.
    pub fn jwk(&self, kid: &str) -> Value {
        json!({"kty": "RSA", "kid": kid, "alg": "RS256", "use": "sig", "n": self.n, "e": self.e})
    }

    /// Sign claims with RS256.
    pub fn sign(&self, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_owned);
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }
}

/// Key used by the mock provider.
pub fn provider_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate)
}

/// A key the provider never published.
pub fn rogue_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate)
}

/// JWKS document holding the provider key under each of `kids`.
pub fn jwks(kids: &[&str]) -> Value {
    json!({"keys": kids.iter().map(|kid| provider_key().jwk(kid)).collect::<Vec<_>>()})
}

/// Sign claims with HS256 and a shared secret.
pub fn sign_hs256(secret: &str, claims: &Value) -> String {
    encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

pub fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

/// Claims of a valid identity token for `issuer`.
pub fn id_claims(issuer: &str) -> Value {
    json!({
        "iss": issuer,
        "sub": "alice",
        "aud": CLIENT_ID,
        "exp": now() + 3600,
        "iat": now(),
        "email": "alice@idp.example.com"
    })
}

/// Token endpoint success body.
pub fn token_body(id_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    });
    if let Some(id_token) = id_token {
        body["id_token"] = json!(id_token);
    }
    body
}

/// A callback whose state matches the issued one.
pub fn callback() -> ExchangeRequest {
    ExchangeRequest::new(AUTH_CODE, STATE, STATE)
}

/// Shared-secret client pointed at a mock provider.
pub fn shared_secret_client(server: &MockServer) -> OidcClient {
    OidcClient::new(ClientConfig::for_testing(&server.uri())).unwrap()
}

/// Remote-key client pointed at a mock provider serving keys at `/certs`.
pub fn remote_key_config(server: &MockServer) -> ClientConfig {
    ClientConfig::for_testing(&server.uri()).with_certificates(format!("{}/certs", server.uri()))
}

pub fn remote_key_client(server: &MockServer) -> OidcClient {
    OidcClient::new(remote_key_config(server)).unwrap()
}

/// Base URI of a local port nothing listens on.
pub fn closed_port_uri() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Flip one byte of the decoded signature and re-encode it.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').unwrap();
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
    bytes[0] ^= 0x01;
    format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes))
}
