//! Issues the signed user context token after a successful login.

use tracing::debug;

use super::handler::Handler;
use crate::identity::{FlowError, MembershipError, Minted, RequestContext, ResponseMetadata, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenIssueError {
    /// Passed through from the membership provider untouched.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    #[error("token mint: {0}")]
    Mint(#[from] FlowError),
}

impl Handler {
    /// Fetch memberships, mint, and attach the token to `md`. A disabled signer is not an error.
    pub async fn issue_context_token(
        &self,
        ctx: &RequestContext,
        user: &User,
        md: &mut ResponseMetadata,
    ) -> Result<(), TokenIssueError> {
        let orgs = self.memberships.list_by_user(ctx, &user.id).await?;
        match self.flows.token(user, &orgs)? {
            Minted::Token(bytes) => {
                let token = String::from_utf8(bytes)
                    .map_err(|_| FlowError::Internal("context token is not valid utf-8".to_string()))?;
                md.set_user_token(&token);
            }
            Minted::SigningDisabled => {
                debug!(user_id = %user.id, "context token signing disabled; skipping");
            }
        }
        Ok(())
    }
}
