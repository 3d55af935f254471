//! Reference flow engine: strategy dispatch over an in-memory, single-use flow repository.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::tprintln;

use super::flow::{
    Flow, FlowEngine, FlowError, Minted, RegistrationFinishRequest, RegistrationFinishResponse,
    RegistrationStartRequest, RegistrationStartResponse,
};
use super::principal::{Organization, User};
use super::request_context::RequestContext;
use super::strategy::{ProviderProfile, Strategy};
use super::token::ContextTokenSigner;
use super::users::{UserDirectory, UserError};

const STATE_PREFIX: &str = "flow:";
const CALLBACK_URL_KEY: &str = "callback_url";

/// Embed a flow id in the provider-facing `state` parameter.
pub fn embed_flow_in_state(flow_id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}{}", STATE_PREFIX, flow_id))
}

pub fn extract_flow_from_state(state: &str) -> Option<Uuid> {
    let raw = URL_SAFE_NO_PAD.decode(state.trim()).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let id = text.strip_prefix(STATE_PREFIX)?;
    Uuid::parse_str(id).ok()
}

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub authorized_redirect_urls: Vec<String>,
    /// First entry is the default callback.
    pub callback_urls: Vec<String>,
    pub flow_ttl: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self { authorized_redirect_urls: Vec::new(), callback_urls: Vec::new(), flow_ttl: Duration::from_secs(600) }
    }
}

pub struct RegistrationService {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
    flows: RwLock<HashMap<Uuid, Flow>>,
    users: Arc<dyn UserDirectory>,
    signer: Option<ContextTokenSigner>,
    cfg: RegistrationConfig,
}

impl RegistrationService {
    pub fn new(users: Arc<dyn UserDirectory>, cfg: RegistrationConfig) -> Self {
        Self { strategies: BTreeMap::new(), flows: RwLock::new(HashMap::new()), users, signer: None, cfg }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.insert(strategy.name().to_string(), strategy);
        self
    }

    /// Without a signer, [`FlowEngine::token`] reports [`Minted::SigningDisabled`].
    pub fn with_signer(mut self, signer: Option<ContextTokenSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn flow_count(&self) -> usize { self.flows.read().len() }

    /// Drop flows past their expiry. Returns how many were removed.
    pub fn purge_expired_flows(&self) -> usize {
        let now = Utc::now();
        let mut flows = self.flows.write();
        let before = flows.len();
        flows.retain(|_, f| f.is_valid(now));
        let removed = before - flows.len();
        if removed > 0 {
            debug!(removed, "purged expired auth flows");
        }
        removed
    }

    /// Remove the flow so it cannot be finished twice; expired flows are removed too.
    fn consume_flow(&self, id: Uuid) -> Result<Flow, FlowError> {
        let flow = self.flows.write().remove(&id).ok_or(FlowError::FlowInvalid)?;
        if !flow.is_valid(Utc::now()) {
            return Err(FlowError::FlowInvalid);
        }
        tprintln!("flow.consume id={} method={}", flow.id, flow.method);
        Ok(flow)
    }

    async fn get_or_create_user(&self, profile: ProviderProfile) -> Result<User, FlowError> {
        match self.users.get_by_email(&profile.email).await {
            Ok(existing) => return Ok(existing),
            Err(UserError::NotExist) => {}
            Err(e) => return Err(FlowError::Internal(e.to_string())),
        }
        let created = self
            .users
            .create(User { email: profile.email, title: profile.name, ..Default::default() })
            .await
            .map_err(|e| FlowError::Internal(e.to_string()))?;
        info!(target: "audit", event = "user.created", user_id = %created.id, name = %created.name);
        Ok(created)
    }
}

#[async_trait]
impl FlowEngine for RegistrationService {
    async fn start(&self, _ctx: &RequestContext, request: RegistrationStartRequest) -> Result<RegistrationStartResponse, FlowError> {
        let strategy = self.strategies.get(&request.method).ok_or(FlowError::UnsupportedMethod)?;
        if request.callback_url.is_empty() {
            return Err(FlowError::Internal("callback url not configured".to_string()));
        }
        let ttl = chrono::Duration::from_std(self.cfg.flow_ttl).map_err(|e| FlowError::Internal(e.to_string()))?;
        let id = Uuid::new_v4();
        let state = embed_flow_in_state(id);
        let (start_url, nonce) = strategy.auth_url(&state, &request.callback_url)?;
        let now = Utc::now();
        let flow = Flow {
            id,
            method: request.method,
            start_url,
            finish_url: request.return_to_url,
            nonce,
            metadata: HashMap::from([(CALLBACK_URL_KEY.to_string(), request.callback_url)]),
            created_at: now,
            expires_at: now + ttl,
        };
        self.flows.write().insert(id, flow.clone());
        tprintln!("flow.start id={} method={}", flow.id, flow.method);
        Ok(RegistrationStartResponse { flow, state })
    }

    async fn finish(&self, _ctx: &RequestContext, request: RegistrationFinishRequest) -> Result<RegistrationFinishResponse, FlowError> {
        if request.state.is_empty() {
            return Err(FlowError::InvalidState);
        }
        if request.code.is_empty() {
            return Err(FlowError::MissingCode);
        }
        let flow_id = extract_flow_from_state(&request.state).ok_or(FlowError::InvalidState)?;
        let flow = self.consume_flow(flow_id)?;
        if !request.method.is_empty() && request.method != flow.method {
            warn!(flow_id = %flow.id, requested = %request.method, started = %flow.method, "strategy mismatch on finish");
            return Err(FlowError::StrategyNotApplicable);
        }
        let strategy = self.strategies.get(&flow.method).ok_or(FlowError::StrategyNotApplicable)?;
        let profile = strategy.exchange(&request.code, &flow).await?;
        let user = self.get_or_create_user(profile).await?;
        Ok(RegistrationFinishResponse { user, flow })
    }

    fn token(&self, user: &User, orgs: &[Organization]) -> Result<Minted, FlowError> {
        let Some(signer) = self.signer.as_ref() else {
            return Ok(Minted::SigningDisabled);
        };
        let token = signer.sign(user, orgs).map_err(|e| FlowError::Internal(e.to_string()))?;
        Ok(Minted::Token(token.into_bytes()))
    }

    fn supported_strategies(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    fn sanitize_return_to_url(&self, url: &str) -> String {
        if !url.is_empty() && self.cfg.authorized_redirect_urls.iter().any(|u| u == url) {
            return url.to_string();
        }
        String::new()
    }

    fn sanitize_callback_url(&self, url: &str) -> String {
        let Some(default) = self.cfg.callback_urls.first() else {
            return String::new();
        };
        if url.is_empty() {
            return default.clone();
        }
        if self.cfg.callback_urls.iter().any(|u| u == url) {
            return url.to_string();
        }
        String::new()
    }
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod tests;
