//! Authorization flow state machine.
//!
//! ```text
//! Start -> Exchanging -> Verifying -> (Enriching) -> Done
//!              |             |
//!              +-> Failed <--+
//! ```
//!
//! Each [`AuthorizationFlow::advance`] performs one transition. [`AuthorizationFlow::run`]
//! drives the flow to a terminal state and hands back its [`Outcome`].

use std::fmt;
use std::sync::Arc;

use tracing::Instrument;

use super::claims::VerifiedClaims;
use super::userinfo::UserInfoEnricher;
use super::verify::TokenVerifier;
use crate::error::OidcError;
use crate::oauth::{ExchangeRequest, TokenExchanger};

/// Final result of one authorization flow.
pub type Outcome = Result<VerifiedClaims, OidcError>;

/// Components a flow runs through, shared by every flow of a client.
#[derive(Debug, Clone)]
pub struct FlowSteps {
    exchanger: TokenExchanger,
    verifier: TokenVerifier,
    enricher: Option<UserInfoEnricher>,
}

impl FlowSteps {
    /// Bundle the flow components. Without an enricher the flow skips `Enriching`.
    #[must_use]
    pub const fn new(
        exchanger: TokenExchanger,
        verifier: TokenVerifier,
        enricher: Option<UserInfoEnricher>,
    ) -> Self {
        Self { exchanger, verifier, enricher }
    }

    /// Token exchanger.
    #[must_use]
    pub const fn exchanger(&self) -> &TokenExchanger {
        &self.exchanger
    }

    /// Token verifier.
    #[must_use]
    pub const fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}

/// State of a flow, with the data the next step needs.
pub enum FlowState {
    /// Callback received, nothing done yet.
    Start(ExchangeRequest),
    /// Exchanging the code at the token endpoint.
    Exchanging(ExchangeRequest),
    /// Verifying the identity token.
    Verifying {
        /// Compact identity token.
        id_token: String,
        /// Access token, kept for enrichment.
        access_token: String,
        /// Nonce the token must carry.
        nonce: Option<String>,
    },
    /// Fetching userinfo.
    Enriching {
        /// Access token for the userinfo call.
        access_token: String,
        /// Verified claims.
        claims: VerifiedClaims,
    },
    /// Flow succeeded.
    Done(VerifiedClaims),
    /// Flow failed.
    Failed(OidcError),
}

impl FlowState {
    /// Discriminant of the state.
    #[must_use]
    pub const fn phase(&self) -> FlowPhase {
        match self {
            Self::Start(_) => FlowPhase::Start,
            Self::Exchanging(_) => FlowPhase::Exchanging,
            Self::Verifying { .. } => FlowPhase::Verifying,
            Self::Enriching { .. } => FlowPhase::Enriching,
            Self::Done(_) => FlowPhase::Done,
            Self::Failed(_) => FlowPhase::Failed,
        }
    }
}

impl fmt::Debug for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => f.debug_tuple("Failed").field(&e.kind()).finish(),
            other => f.write_str(other.phase().as_str()),
        }
    }
}

/// Copyable flow phase for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowPhase {
    /// Not started.
    Start,
    /// Code exchange.
    Exchanging,
    /// Token verification.
    Verifying,
    /// Userinfo enrichment.
    Enriching,
    /// Succeeded.
    Done,
    /// Failed.
    Failed,
}

impl FlowPhase {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Exchanging => "exchanging",
            Self::Verifying => "verifying",
            Self::Enriching => "enriching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Check if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One authorization-code flow, from callback to verified identity.
pub struct AuthorizationFlow {
    steps: Arc<FlowSteps>,
    state: FlowState,
    span: tracing::Span,
}

impl AuthorizationFlow {
    /// Start a flow for one inbound callback.
    #[must_use]
    pub fn new(steps: Arc<FlowSteps>, request: ExchangeRequest) -> Self {
        let flow_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("authorization_flow", %flow_id);
        Self { steps, state: FlowState::Start(request), span }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> FlowPhase {
        self.state.phase()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &FlowState {
        &self.state
    }

    /// Check if the flow has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Perform one transition. Terminal flows are returned unchanged.
    pub async fn advance(self) -> Self {
        let Self { steps, state, span } = self;
        let from = state.phase();

        let state = step(&steps, state).instrument(span.clone()).await;

        span.in_scope(|| {
            tracing::debug!(%from, to = %state.phase(), "Flow transition");
            match &state {
                FlowState::Done(_) if from != FlowPhase::Done => {
                    tracing::info!("Authorization flow completed");
                }
                FlowState::Failed(e) if from != FlowPhase::Failed => {
                    tracing::warn!(kind = e.kind(), error = %e, "Authorization flow failed");
                }
                _ => {}
            }
        });

        Self { steps, state, span }
    }

    /// Drive the flow to completion and deliver its outcome.
    pub async fn run(mut self) -> Outcome {
        loop {
            self = match self.finish() {
                Ok(outcome) => return outcome,
                Err(flow) => flow.advance().await,
            };
        }
    }

    /// The outcome of a terminal flow, or the flow itself if it is still running.
    fn finish(self) -> Result<Outcome, Self> {
        let Self { steps, state, span } = self;
        match state {
            FlowState::Done(claims) => Ok(Ok(claims)),
            FlowState::Failed(e) => Ok(Err(e)),
            state => Err(Self { steps, state, span }),
        }
    }
}

impl fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationFlow").field("state", &self.state).finish_non_exhaustive()
    }
}

async fn step(steps: &FlowSteps, state: FlowState) -> FlowState {
    match state {
        FlowState::Start(request) => FlowState::Exchanging(request),

        FlowState::Exchanging(request) => match steps.exchanger.exchange(&request).await {
            Ok(tokens) => match tokens.id_token.filter(|t| !t.is_empty()) {
                Some(id_token) => FlowState::Verifying {
                    id_token,
                    access_token: tokens.access_token,
                    nonce: request.nonce,
                },
                None => FlowState::Failed(OidcError::MissingIdToken),
            },
            Err(e) => FlowState::Failed(e),
        },

        FlowState::Verifying { id_token, access_token, nonce } => {
            match steps.verifier.verify_with_nonce(&id_token, nonce.as_deref()).await {
                Ok(claims) if steps.enricher.is_some() => FlowState::Enriching { access_token, claims },
                Ok(claims) => FlowState::Done(claims),
                Err(e) => FlowState::Failed(e),
            }
        }

        FlowState::Enriching { access_token, claims } => match &steps.enricher {
            Some(enricher) => FlowState::Done(enricher.enrich(&access_token, claims).await),
            None => FlowState::Done(claims),
        },

        terminal @ (FlowState::Done(_) | FlowState::Failed(_)) => terminal,
    }
}
