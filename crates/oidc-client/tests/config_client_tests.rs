//! Configuration and client tests.
//!
//! Tests actual behavior, not constants.

use jsonwebtoken::Algorithm;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_client::config::RedirectUri;
use oidc_client::{ClientConfig, ConfigError, OidcClient, OidcError};

// =============================================================================
// Config Behavior Tests
// =============================================================================

#[test]
fn test_config_default_is_incomplete() {
    let config = ClientConfig::default();
    assert!(matches!(OidcClient::new(config), Err(ConfigError::Missing("client_id"))));
}

#[test]
fn test_config_clone_preserves_secret() {
    let config = ClientConfig::new("https://idp.example.com", "app", "secret", "/cb");
    let cloned = config.clone();
    assert_eq!(config.client_secret, cloned.client_secret);
}

#[test]
fn test_invalid_provider_uri_is_rejected() {
    let config = ClientConfig::new("not a uri", "app", "secret", "https://app.example.com/cb");
    assert!(matches!(OidcClient::new(config), Err(ConfigError::InvalidUri { field: "provider_uri", .. })));
}

// =============================================================================
// Client Behavior Tests
// =============================================================================

#[test]
fn test_client_creation_succeeds() {
    let client = OidcClient::new(ClientConfig::for_testing("https://idp.example.com"));
    assert!(client.is_ok());
}

#[test]
fn test_client_reports_key_mode() {
    let shared = OidcClient::new(ClientConfig::for_testing("https://idp.example.com")).unwrap();
    assert!(!shared.config().uses_remote_keys());
    assert_eq!(shared.verifier().algorithms(), &[Algorithm::HS256]);

    let remote = OidcClient::new(
        ClientConfig::for_testing("https://idp.example.com").with_certificates("https://idp.example.com/certs"),
    )
    .unwrap();
    assert!(remote.config().uses_remote_keys());
    assert_eq!(remote.verifier().algorithms(), &[Algorithm::RS256]);
}

#[test]
fn test_client_debug_hides_secret() {
    let config = ClientConfig::new("https://idp.example.com", "app", "super-secret-value", "https://app/cb");
    let client = OidcClient::new(config).unwrap();
    let debug = format!("{client:?}");
    assert!(!debug.contains("super-secret-value"));
    assert!(debug.contains("client_id"));
}

#[test]
fn test_client_is_cloneable() {
    let client = OidcClient::new(ClientConfig::for_testing("https://idp.example.com")).unwrap();
    let cloned = client.clone();
    assert_eq!(client.endpoints().token, cloned.endpoints().token);
}

#[test]
fn test_client_keeps_path_redirect() {
    let mut config = ClientConfig::for_testing("https://idp.example.com");
    config.redirect_uri = "/auth/callback".to_string();
    let client = OidcClient::new(config).unwrap();
    assert_eq!(client.endpoints().redirect, RedirectUri::Path("/auth/callback".to_string()));
}

// =============================================================================
// Protected Resources
// =============================================================================

#[tokio::test]
async fn test_protected_resource_sends_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/admin"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = OidcClient::new(ClientConfig::for_testing(&server.uri())).unwrap();

    let response = client.protected_resource("/api/me", "at-1").await.unwrap();
    assert!(response.is_ok());
    assert_eq!(response.body, r#"{"ok":true}"#);

    let forbidden = client.protected_resource("api/admin", "at-1").await.unwrap();
    assert_eq!(forbidden.status, 403);
}

#[tokio::test]
async fn test_protected_resource_unreachable_is_network() {
    let client = OidcClient::new(ClientConfig::for_testing("http://127.0.0.1:9")).unwrap();
    let err = client.protected_resource("/api/me", "at-1").await.unwrap_err();
    assert!(matches!(err, OidcError::Network(_)));
}
