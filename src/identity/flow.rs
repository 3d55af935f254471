//! Registration flow contract: a two-phase (start, finish) handshake per strategy.
//! The orchestrator only talks to [`FlowEngine`]; concrete engines own flow storage,
//! replay protection and provider protocol details.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::principal::{Organization, User};
use super::request_context::RequestContext;

/// Server-side state of one in-progress handshake. Single use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub id: Uuid,
    /// Strategy name, e.g. `google`.
    pub method: String,
    pub start_url: String,
    /// Where the client is sent once the handshake completes (sanitised return-to).
    pub finish_url: String,
    /// Provider-side correlation value bound to this flow.
    pub nonce: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Flow {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool { self.expires_at > now }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationStartRequest {
    pub method: String,
    pub return_to_url: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationStartResponse {
    pub flow: Flow,
    /// Opaque correlation state the client must present on finish.
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationFinishRequest {
    pub method: String,
    pub code: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFinishResponse {
    pub user: User,
    pub flow: Flow,
}

/// Outcome of a token minting request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Minted {
    Token(Vec<u8>),
    /// No signing key configured; the caller proceeds without a token.
    SigningDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("unsupported authentication method")]
    UnsupportedMethod,
    #[error("strategy not applicable")]
    StrategyNotApplicable,
    #[error("invalid auth state")]
    InvalidState,
    #[error("auth code is missing")]
    MissingCode,
    #[error("invalid flow or expired")]
    FlowInvalid,
    #[error("provider: {0}")]
    Provider(String),
    #[error("{0}")]
    Internal(String),
}

impl FlowError {
    /// Errors caused by what the client sent rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FlowError::InvalidState | FlowError::MissingCode | FlowError::FlowInvalid)
    }
}

#[async_trait]
pub trait FlowEngine: Send + Sync {
    async fn start(&self, ctx: &RequestContext, request: RegistrationStartRequest) -> Result<RegistrationStartResponse, FlowError>;
    async fn finish(&self, ctx: &RequestContext, request: RegistrationFinishRequest) -> Result<RegistrationFinishResponse, FlowError>;
    fn token(&self, user: &User, orgs: &[Organization]) -> Result<Minted, FlowError>;
    fn supported_strategies(&self) -> Vec<String>;
    /// Returns the url when it is whitelisted, otherwise an empty string.
    fn sanitize_return_to_url(&self, url: &str) -> String;
    /// Empty input selects the default callback; unknown urls sanitise to empty.
    fn sanitize_callback_url(&self, url: &str) -> String;
}
