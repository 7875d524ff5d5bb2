//! Key cache behaviour: single-flight fetch, refresh on unknown kid, invalidation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Barrier;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_client::{KeyError, OidcClient, OidcError};

use common::{id_claims, jwks, provider_key, remote_key_client, remote_key_config};

async fn certs_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/certs")
        .count()
}

#[tokio::test]
async fn test_concurrent_verifications_share_one_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks(&["k1"]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = remote_key_client(&server);
    let token = provider_key().sign(Some("k1"), &id_claims(&server.uri()));

    let results = join_all((0..16).map(|_| {
        let client = client.clone();
        let token = token.clone();
        async move { client.verifier().verify(&token).await }
    }))
    .await;

    assert!(results.iter().all(Result::is_ok));
}

#[tokio::test]
async fn test_repeated_verification_uses_cache_until_invalidated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1"])))
        .expect(2)
        .mount(&server)
        .await;

    let client = remote_key_client(&server);
    let token = provider_key().sign(Some("k1"), &id_claims(&server.uri()));

    let first = client.verifier().verify(&token).await.unwrap();
    for _ in 0..5 {
        assert_eq!(client.verifier().verify(&token).await.unwrap(), first);
    }
    assert_eq!(certs_requests(&server).await, 1);

    client.invalidate_keys();
    assert_eq!(client.verifier().keys().cached_key_ids().await, None);

    assert_eq!(client.verifier().verify(&token).await.unwrap(), first);
    assert_eq!(certs_requests(&server).await, 2);
}

#[tokio::test]
async fn test_unknown_kid_triggers_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["old"])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["old", "new"])))
        .mount(&server)
        .await;

    let client = remote_key_client(&server);
    let old = provider_key().sign(Some("old"), &id_claims(&server.uri()));
    let rotated = provider_key().sign(Some("new"), &id_claims(&server.uri()));

    client.verifier().verify(&old).await.unwrap();
    assert_eq!(client.verifier().keys().cached_key_ids().await, Some(vec!["old".to_string()]));

    client.verifier().verify(&rotated).await.unwrap();
    client.verifier().verify(&rotated).await.unwrap();
    client.verifier().verify(&old).await.unwrap();

    assert_eq!(certs_requests(&server).await, 2);
    assert_eq!(
        client.verifier().keys().cached_key_ids().await,
        Some(vec!["old".to_string(), "new".to_string()])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_lookups_of_rotated_kid_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["old"])))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks(&["old", "new"]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Cooldown on: only one refresh may happen, and every caller must share it
    let mut config = remote_key_config(&server);
    config.key_refresh_cooldown = Duration::from_secs(60);
    let client = OidcClient::new(config).unwrap();

    let old = provider_key().sign(Some("old"), &id_claims(&server.uri()));
    client.verifier().verify(&old).await.unwrap();

    let rotated = provider_key().sign(Some("new"), &id_claims(&server.uri()));
    let tasks = 16;
    let barrier = Arc::new(Barrier::new(tasks));
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let client = client.clone();
            let token = rotated.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                client.verifier().verify(&token).await
            })
        })
        .collect();

    for result in join_all(handles).await {
        let claims = result.unwrap();
        assert!(claims.is_ok(), "got {claims:?}");
    }
    assert_eq!(certs_requests(&server).await, 2);
}

#[tokio::test]
async fn test_fresh_set_without_kid_is_not_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = remote_key_client(&server);
    let token = provider_key().sign(Some("unknown"), &id_claims(&server.uri()));

    match client.verifier().verify(&token).await {
        Err(OidcError::KeyResolutionFailed(KeyError::NotFound { kid })) => {
            assert_eq!(kid.as_deref(), Some("unknown"));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_kid_refresh_is_throttled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1"])))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = remote_key_config(&server);
    config.key_refresh_cooldown = Duration::from_secs(300);
    let client = OidcClient::new(config).unwrap();

    let known = provider_key().sign(Some("k1"), &id_claims(&server.uri()));
    client.verifier().verify(&known).await.unwrap();

    // First unknown kid refreshes, the next one inside the cooldown does not
    for kid in ["ghost-1", "ghost-2", "ghost-3"] {
        let token = provider_key().sign(Some(kid), &id_claims(&server.uri()));
        assert!(matches!(
            client.verifier().verify(&token).await,
            Err(OidcError::KeyResolutionFailed(KeyError::NotFound { .. }))
        ));
    }
    assert_eq!(certs_requests(&server).await, 2);

    client.verifier().verify(&known).await.unwrap();
}

#[tokio::test]
async fn test_token_without_kid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["only"])))
        .mount(&server)
        .await;

    let client = remote_key_client(&server);
    let token = provider_key().sign(None, &id_claims(&server.uri()));
    assert!(client.verifier().verify(&token).await.is_ok());

    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["a", "b"])))
        .mount(&other)
        .await;

    let client = remote_key_client(&other);
    let token = provider_key().sign(None, &id_claims(&other.uri()));
    assert!(matches!(
        client.verifier().verify(&token).await,
        Err(OidcError::KeyResolutionFailed(KeyError::NotFound { kid: None }))
    ));
}

#[tokio::test]
async fn test_legacy_pem_map_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"pem-1": provider_key().public_pem, "broken": "not a pem"})),
        )
        .mount(&server)
        .await;

    let client = remote_key_client(&server);
    let token = provider_key().sign(Some("pem-1"), &id_claims(&server.uri()));

    let claims = client.verifier().verify(&token).await.unwrap();
    assert_eq!(claims.subject(), "alice");
    assert_eq!(client.verifier().keys().cached_key_ids().await, Some(vec!["pem-1".to_string()]));
}
