//! Fuzzing library for oidc-client.
//!
//! This crate provides fuzzing targets for the parsers that see provider or
//! attacker controlled input: compact identity tokens, key documents and token
//! endpoint responses.
//!
//! # Usage
//!
//! ```bash
//! cd crates/oidc-fuzz
//! cargo +nightly fuzz run fuzz_compact_token -- -max_total_time=60
//! ```

pub use oidc_client::oauth::TokenResponse;
pub use oidc_client::oidc::{CompactToken, SigningKeySet};
