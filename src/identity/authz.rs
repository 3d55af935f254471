//! Object references, namespace aliasing and the decision-function seam.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::request_context::RequestContext;
use super::session::{SessionError, SessionStore};
use super::users::{UserDirectory, UserError};
use super::principal::User;

pub const USER_PRINCIPAL: &str = "app/user";
pub const SERVICE_USER_PRINCIPAL: &str = "app/serviceuser";
pub const SUPERUSER_PRINCIPAL: &str = "app/superuser";
pub const GROUP_NAMESPACE: &str = "app/group";
pub const ORGANIZATION_NAMESPACE: &str = "app/organization";
pub const PROJECT_NAMESPACE: &str = "app/project";

/// Map short namespace names to their canonical form; unknown names pass through.
pub fn parse_namespace_alias(namespace: &str) -> &str {
    match namespace {
        "user" => USER_PRINCIPAL,
        "serviceuser" => SERVICE_USER_PRINCIPAL,
        "superuser" => SUPERUSER_PRINCIPAL,
        "group" => GROUP_NAMESPACE,
        "org" | "organization" => ORGANIZATION_NAMESPACE,
        "project" => PROJECT_NAMESPACE,
        other => other,
    }
}

/// Split `namespace:id`. Anything other than exactly two parts is rejected.
pub fn split_namespace_and_resource_id(resource: &str) -> Option<(&str, &str)> {
    let mut parts = resource.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ns), Some(id), None) => Some((ns, id)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Object {
    pub namespace: String,
    pub id: String,
}

impl Object {
    /// Builds an object with its namespace already resolved through [`parse_namespace_alias`].
    pub fn new(namespace: &str, id: impl Into<String>) -> Self {
        Self { namespace: parse_namespace_alias(namespace).to_string(), id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("{0}")]
    Other(String),
}

impl AuthzError {
    /// Failures to establish who the caller is, as opposed to failures to evaluate.
    pub fn is_identity_error(&self) -> bool {
        matches!(self, AuthzError::InvalidEmail | AuthzError::Unauthenticated)
    }
}

/// The opaque decision function. The subject is resolved from `ctx` by the implementation.
#[async_trait]
pub trait AuthzCheck: Send + Sync {
    async fn check_authz(&self, ctx: &RequestContext, object: &Object, permission: &str) -> Result<bool, AuthzError>;
}

#[async_trait]
pub trait SudoCheck: Send + Sync {
    async fn is_sudo(&self, ctx: &RequestContext, user_id: &str) -> Result<bool, AuthzError>;
}

/// Reference decision function over an in-memory grant set.
///
/// Grants are direct `(user, object, permission)` tuples; superusers (matched by email)
/// hold every permission.
pub struct MemoryRelations {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    grants: RwLock<HashSet<(String, Object, String)>>,
    superusers: RwLock<HashSet<String>>,
}

impl MemoryRelations {
    pub fn new(sessions: Arc<dyn SessionStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { sessions, users, grants: RwLock::new(HashSet::new()), superusers: RwLock::new(HashSet::new()) }
    }

    pub fn grant(&self, user_id: &str, object: Object, permission: &str) {
        self.grants.write().insert((user_id.to_string(), object, permission.to_string()));
    }

    pub fn revoke(&self, user_id: &str, object: &Object, permission: &str) -> bool {
        self.grants.write().remove(&(user_id.to_string(), object.clone(), permission.to_string()))
    }

    pub fn add_superuser(&self, email: &str) {
        self.superusers.write().insert(email.trim().to_lowercase());
    }

    fn is_superuser_email(&self, email: &str) -> bool {
        self.superusers.read().contains(&email.to_lowercase())
    }

    async fn resolve_caller(&self, ctx: &RequestContext) -> Result<User, AuthzError> {
        let session = match self.sessions.extract_from_context(ctx).await {
            Ok(s) => s,
            Err(SessionError::NoSession) | Err(SessionError::Malformed(_)) => return Err(AuthzError::Unauthenticated),
            Err(SessionError::Store(e)) => return Err(AuthzError::Other(e)),
        };
        if !session.is_valid(Utc::now()) {
            return Err(AuthzError::Unauthenticated);
        }
        match self.users.get_by_id(&session.user_id).await {
            Ok(u) if u.email.is_empty() => Err(AuthzError::InvalidEmail),
            Ok(u) => Ok(u),
            Err(UserError::NotExist) | Err(UserError::InvalidId) => Err(AuthzError::Unauthenticated),
            Err(UserError::InvalidEmail) => Err(AuthzError::InvalidEmail),
            Err(UserError::Store(e)) => Err(AuthzError::Other(e)),
        }
    }
}

#[async_trait]
impl AuthzCheck for MemoryRelations {
    async fn check_authz(&self, ctx: &RequestContext, object: &Object, permission: &str) -> Result<bool, AuthzError> {
        let caller = self.resolve_caller(ctx).await?;
        if self.is_superuser_email(&caller.email) {
            return Ok(true);
        }
        let key = (caller.id, object.clone(), permission.to_string());
        Ok(self.grants.read().contains(&key))
    }
}

#[async_trait]
impl SudoCheck for MemoryRelations {
    async fn is_sudo(&self, _ctx: &RequestContext, user_id: &str) -> Result<bool, AuthzError> {
        match self.users.get_by_id(user_id).await {
            Ok(u) => Ok(self.is_superuser_email(&u.email)),
            Err(UserError::NotExist) | Err(UserError::InvalidId) => Ok(false),
            Err(e) => Err(AuthzError::Other(e.to_string())),
        }
    }
}
