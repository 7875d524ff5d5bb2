//! Authorization URL construction.

use url::Url;

use oidc_client::oauth::pkce;
use oidc_client::{AuthorizationRequest, ClientConfig, OidcClient, OidcError};

fn client() -> OidcClient {
    OidcClient::new(ClientConfig::for_testing("https://idp.example.com")).unwrap()
}

fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

#[test]
fn test_authorize_url_snapshot() {
    let request = AuthorizationRequest::with_state("fixed-state")
        .nonce("fixed-nonce")
        .code_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");

    let url = client().authorize_url(&request).unwrap();

    insta::assert_snapshot!(url.as_str(), @"https://idp.example.com/authorize?response_type=code&client_id=test-client&redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback&scope=openid+profile+email&state=fixed-state&nonce=fixed-nonce&code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM&code_challenge_method=S256");
}

#[test]
fn test_generated_request_carries_fresh_values() {
    let first = AuthorizationRequest::new();
    let second = AuthorizationRequest::new();
    assert_ne!(first.state, second.state);
    assert_ne!(first.nonce, second.nonce);

    let url = client().authorize_url(&first).unwrap();
    assert_eq!(query(&url, "state"), Some(first.state.clone()));
    assert_eq!(query(&url, "nonce"), first.nonce.clone());

    let verifier = first.code_verifier.as_deref().unwrap();
    assert_eq!(query(&url, "code_challenge"), Some(pkce::challenge_s256(verifier)));
}

#[test]
fn test_without_pkce_and_scope_override() {
    let request = AuthorizationRequest::with_state("s").without_pkce().scope("openid offline_access");
    let url = client().authorize_url(&request).unwrap();

    assert_eq!(query(&url, "scope").as_deref(), Some("openid offline_access"));
    assert_eq!(query(&url, "code_challenge"), None);
    assert_eq!(query(&url, "nonce"), None);
}

#[test]
fn test_extra_parameters_are_appended() {
    let request = AuthorizationRequest::with_state("s").param("prompt", "login").param("login_hint", "a@b.c");
    let url = client().authorize_url(&request).unwrap();

    assert_eq!(query(&url, "prompt").as_deref(), Some("login"));
    assert_eq!(query(&url, "login_hint").as_deref(), Some("a@b.c"));
}

#[test]
fn test_path_redirect_needs_origin() {
    let mut config = ClientConfig::for_testing("https://idp.example.com");
    config.redirect_uri = "/auth/callback".to_string();
    let client = OidcClient::new(config).unwrap();

    let request = AuthorizationRequest::with_state("s");
    assert!(matches!(client.authorize_url(&request), Err(OidcError::InvalidRequest { .. })));

    let origin = Url::parse("http://localhost:8080").unwrap();
    let url = client.authorize_url(&request.callback_origin(origin)).unwrap();
    assert_eq!(query(&url, "redirect_uri").as_deref(), Some("http://localhost:8080/auth/callback"));
}
