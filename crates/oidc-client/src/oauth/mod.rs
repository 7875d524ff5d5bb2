//! OAuth2 authorization-code grant, client side.
//!
//! - [`authorize`]: authorization URL with state, nonce and PKCE challenge
//! - [`callback`]: read-only view of the provider's redirect
//! - [`exchange`]: callback validation and the code → token call
//! - [`pkce`]: S256 verifier and challenge

pub mod authorize;
pub mod callback;
pub mod exchange;
pub mod pkce;

pub use authorize::{AuthorizationRequest, build_authorize_url};
pub use callback::{CallbackRequest, CallbackUrl};
pub use exchange::{ClientAuthMode, ExchangeRequest, TokenExchanger, TokenResponse, basic_authorization};
