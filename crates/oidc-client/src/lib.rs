//! OpenID Connect Client
//!
//! A relying-party client for the OAuth2 authorization-code grant with OpenID
//! Connect identity tokens. Exchanges the authorization code, verifies the
//! identity token against the provider's keys, and optionally enriches the
//! identity from the userinfo endpoint.
//!
//! # Features
//!
//! - **Explicit flow**: a state machine from callback to verified claims
//! - **Algorithm pinning**: tokens are checked against the configured algorithms, never their own header
//! - **Shared key cache**: single-flight fetch, refresh on unknown `kid`
//! - **Classified failures**: bad code, bad signature and unreachable provider stay distinct
//!
//! # Example
//!
//! ```no_run
//! use oidc_client::{CallbackUrl, ClientConfig, ExchangeRequest, OidcClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let client = OidcClient::new(config)?;
//!
//!     let callback = CallbackUrl::parse("https://app.example.com/callback?code=abc&state=xyz")?;
//!     let request = ExchangeRequest::from_callback(&callback, "xyz");
//!     let claims = client.authorization_code_token(request).await?;
//!     println!("signed in as {}", claims.subject());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod oauth;
pub mod oidc;

pub use client::OidcClient;
pub use config::{ClientConfig, Config};
pub use error::{ConfigError, KeyError, NetworkError, OidcError, OidcResult};
pub use oauth::{AuthorizationRequest, CallbackRequest, CallbackUrl, ClientAuthMode, ExchangeRequest, TokenResponse};
pub use oidc::{AuthorizationFlow, FlowPhase, Outcome, VerifiedClaims};
