//! Optional enrichment of verified claims from the userinfo endpoint.

use serde_json::{Map, Value};
use url::Url;

use super::claims::VerifiedClaims;
use crate::client::HttpClient;

/// Fetches userinfo and folds it into verified claims.
#[derive(Debug, Clone)]
pub struct UserInfoEnricher {
    http: HttpClient,
    endpoint: Url,
}

impl UserInfoEnricher {
    /// Create an enricher for one userinfo endpoint.
    #[must_use]
    pub const fn new(http: HttpClient, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    /// Userinfo endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Add userinfo claims that the identity token did not carry.
    ///
    /// Never fails: on any error the verified claims come back unchanged. A
    /// response for a different subject is discarded.
    pub async fn enrich(&self, access_token: &str, mut claims: VerifiedClaims) -> VerifiedClaims {
        let response = match self.http.get_bearer(&self.endpoint, access_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Userinfo request failed, keeping verified claims");
                return claims;
            }
        };

        if !response.is_ok() {
            tracing::warn!(status = response.status, "Userinfo endpoint returned an error, keeping verified claims");
            return claims;
        }

        let info: Map<String, Value> = match response.json() {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "Userinfo response is not a JSON object, keeping verified claims");
                return claims;
            }
        };

        if info.get("sub").is_some_and(|sub| sub.as_str() != Some(claims.subject())) {
            tracing::warn!("Userinfo subject does not match the identity token, discarding it");
            return claims;
        }

        let added = claims.merge_absent(info);
        tracing::debug!(added, "Merged userinfo claims");
        claims
    }
}
