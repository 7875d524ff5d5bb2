//! OpenID Connect layer: identity token verification, key resolution,
//! userinfo enrichment and the flow that ties them to the code exchange.

pub mod claims;
pub mod flow;
pub mod keys;
pub mod userinfo;
pub mod verify;

pub use claims::VerifiedClaims;
pub use flow::{AuthorizationFlow, FlowPhase, FlowState, FlowSteps, Outcome};
pub use keys::{JwksResolver, KeyResolver, SigningKey, SigningKeySet};
pub use userinfo::UserInfoEnricher;
pub use verify::{CompactToken, TokenHeader, TokenVerifier};
