use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::identity::{
    AuthzCheck, FlowEngine, MembershipProvider, Principal, RequestContext, SessionError, SessionStore, SudoCheck,
    UserDirectory, UserError,
};

/// The collaborator set every RPC handler works against.
///
/// Cloning is cheap and the set is fixed at construction; handlers hold no other state.
#[derive(Clone)]
pub struct Handler {
    pub(crate) flows: Arc<dyn FlowEngine>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) authz: Arc<dyn AuthzCheck>,
    pub(crate) sudo: Arc<dyn SudoCheck>,
    pub(crate) memberships: Arc<dyn MembershipProvider>,
    pub(crate) users: Arc<dyn UserDirectory>,
}

impl Handler {
    pub fn new(
        flows: Arc<dyn FlowEngine>,
        sessions: Arc<dyn SessionStore>,
        authz: Arc<dyn AuthzCheck>,
        sudo: Arc<dyn SudoCheck>,
        memberships: Arc<dyn MembershipProvider>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self { flows, sessions, authz, sudo, memberships, users }
    }

    /// Resolve the caller from its session. Always consults the store.
    pub async fn logged_in_principal(&self, ctx: &RequestContext) -> AppResult<Principal> {
        let session = match self.sessions.extract_from_context(ctx).await {
            Ok(s) => s,
            Err(SessionError::NoSession) => return Err(AppError::unauthenticated()),
            Err(SessionError::Malformed(e)) => {
                debug!(error = %e, "malformed session reference");
                return Err(AppError::unauthenticated());
            }
            Err(e) => {
                error!(error = %e, "session lookup failed");
                return Err(AppError::internal("session_extract"));
            }
        };
        if !session.is_valid(Utc::now()) {
            return Err(AppError::unauthenticated());
        }
        match self.users.get_by_id(&session.user_id).await {
            Ok(user) => Ok(Principal::from_user(user)),
            Err(UserError::NotExist) | Err(UserError::InvalidId) | Err(UserError::InvalidEmail) => {
                debug!(user_id = %session.user_id, session_id = %session.id, "session user is gone");
                Err(AppError::not_found("user_not_found"))
            }
            Err(e) => {
                error!(user_id = %session.user_id, error = %e, "user lookup failed");
                Err(AppError::internal("user_lookup"))
            }
        }
    }
}
