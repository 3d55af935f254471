//! Authentication orchestration: start or skip login, finish it, end it, list the options.
//!
//! Every operation writes its side effects (redirects, session cookie, context token)
//! into a [`ResponseMetadata`] the HTTP edge translates into headers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::handler::Handler;
use crate::error::{AppError, AppResult};
use crate::identity::flow::{RegistrationFinishRequest, RegistrationStartRequest};
use crate::identity::{FlowError, RequestContext, ResponseMetadata, SessionError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub return_to: String,
    #[serde(default)]
    pub strategy_name: String,
    /// Ask the edge to redirect straight to the provider.
    #[serde(default)]
    pub redirect_onstart: bool,
    #[serde(default)]
    pub callback_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthCallbackRequest {
    #[serde(default)]
    pub strategy_name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthCallbackResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthLogoutResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStrategy {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListAuthStrategiesResponse {
    pub strategies: Vec<AuthStrategy>,
}

impl Handler {
    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        md: &mut ResponseMetadata,
        req: AuthenticateRequest,
    ) -> AppResult<AuthenticateResponse> {
        let return_to = self.flows.sanitize_return_to_url(&req.return_to);
        let callback_url = self.flows.sanitize_callback_url(&req.callback_url);

        match self.sessions.extract_from_context(ctx).await {
            Ok(session) if session.is_valid(Utc::now()) => {
                debug!(session_id = %session.id, "already authenticated");
                if !return_to.is_empty() {
                    md.set_redirect(&return_to);
                }
                return Ok(AuthenticateResponse::default());
            }
            Ok(session) => debug!(session_id = %session.id, "session no longer valid; starting a new flow"),
            Err(SessionError::NoSession) => {}
            Err(e) => {
                error!(error = %e, "session extraction failed");
                return Err(AppError::internal("session_extract"));
            }
        }

        let started = self
            .flows
            .start(
                ctx,
                RegistrationStartRequest { method: req.strategy_name.clone(), return_to_url: return_to, callback_url },
            )
            .await
            .map_err(|e| match e {
                FlowError::UnsupportedMethod => {
                    warn!(strategy = %req.strategy_name, "unsupported auth strategy");
                    AppError::bad_request("unsupported_strategy")
                }
                other => {
                    error!(strategy = %req.strategy_name, error = %other, "auth flow start failed");
                    AppError::internal("flow_start")
                }
            })?;

        if req.redirect_onstart && !started.flow.start_url.is_empty() {
            md.set_redirect(&started.flow.start_url);
        }
        Ok(AuthenticateResponse { endpoint: started.flow.start_url, state: started.state })
    }

    /// Finish the handshake. Metadata is only written once every step succeeded.
    pub async fn auth_callback(
        &self,
        ctx: &RequestContext,
        md: &mut ResponseMetadata,
        req: AuthCallbackRequest,
    ) -> AppResult<AuthCallbackResponse> {
        let finished = self
            .flows
            .finish(ctx, RegistrationFinishRequest { method: req.strategy_name, code: req.code, state: req.state })
            .await
            .map_err(|e| {
                if e.is_client_error() {
                    warn!(error = %e, "rejected auth callback");
                    AppError::bad_request("invalid_auth_callback")
                } else {
                    error!(error = %e, "auth flow finish failed");
                    AppError::internal("flow_finish")
                }
            })?;
        let user = finished.user;

        let session = self.sessions.create(ctx, &user.id).await.map_err(|e| {
            error!(user_id = %user.id, error = %e, "session create failed");
            AppError::internal("session_create")
        })?;

        let mut out = ResponseMetadata::new();
        out.set_session_id(&session.id.to_string());
        if let Err(e) = self.issue_context_token(ctx, &user, &mut out).await {
            error!(user_id = %user.id, session_id = %session.id, error = %e, "context token issue failed");
            if let Err(del) = self.sessions.delete(ctx, session.id).await {
                warn!(session_id = %session.id, error = %del, "could not roll back session");
            }
            return Err(AppError::internal("context_token"));
        }
        if !finished.flow.finish_url.is_empty() {
            out.set_redirect(&finished.flow.finish_url);
        }

        info!(user_id = %user.id, session_id = %session.id, method = %finished.flow.method, "login complete");
        md.merge(out);
        Ok(AuthCallbackResponse {})
    }

    /// Always instructs the client to drop its cookie, even when no session exists.
    pub async fn auth_logout(&self, ctx: &RequestContext, md: &mut ResponseMetadata) -> AppResult<AuthLogoutResponse> {
        md.delete_session();
        match self.sessions.extract_from_context(ctx).await {
            Ok(session) if session.is_valid(Utc::now()) => {
                self.sessions.delete(ctx, session.id).await.map_err(|e| {
                    error!(session_id = %session.id, error = %e, "session delete failed");
                    AppError::internal("session_delete")
                })?;
                info!(session_id = %session.id, user_id = %session.user_id, "logged out");
            }
            Ok(session) => debug!(session_id = %session.id, "logout with stale session"),
            Err(e) => debug!(error = %e, "logout without session"),
        }
        Ok(AuthLogoutResponse {})
    }

    pub fn list_auth_strategies(&self) -> ListAuthStrategiesResponse {
        let mut names = self.flows.supported_strategies();
        names.sort();
        names.dedup();
        ListAuthStrategiesResponse { strategies: names.into_iter().map(|name| AuthStrategy { name }).collect() }
    }
}

#[cfg(test)]
#[path = "authn_tests.rs"]
mod tests;
