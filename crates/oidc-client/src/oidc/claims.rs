//! Verified identity claims.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{OidcError, OidcResult};

/// Claim map of a verified identity token.
///
/// Always holds string `sub` and `iss` claims. The only mutation after
/// verification is the userinfo merge, which adds keys and never replaces them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    /// Wrap a decoded claim map, checking the claims every identity must carry.
    pub(crate) fn from_map(claims: Map<String, Value>) -> OidcResult<Self> {
        for claim in ["sub", "iss"] {
            match claims.get(claim) {
                Some(Value::String(s)) if !s.is_empty() => {}
                Some(_) => return Err(OidcError::claim_mismatch(claim, "must be a non-empty string")),
                None => return Err(OidcError::claim_mismatch(claim, "missing")),
            }
        }
        Ok(Self(claims))
    }

    /// Subject identifier.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.str_claim("sub").unwrap_or_default()
    }

    /// Issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.str_claim("iss").unwrap_or_default()
    }

    /// Audiences; `aud` may be a single string or an array.
    #[must_use]
    pub fn audience(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(list)) => list.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// `nonce` claim, if present.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.str_claim("nonce")
    }

    /// Token expiry.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.0.get("exp")?.as_i64()?;
        DateTime::from_timestamp(exp, 0)
    }

    /// Any claim by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String claim by name.
    #[must_use]
    pub fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Check if a claim is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the map holds no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the claim map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the claim map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Add claims that are not already present. Returns how many were added.
    pub(crate) fn merge_absent(&mut self, extra: Map<String, Value>) -> usize {
        let mut added = 0;
        for (name, value) in extra {
            if let serde_json::map::Entry::Vacant(slot) = self.0.entry(name) {
                slot.insert(value);
                added += 1;
            }
        }
        added
    }
}
