//! Authorization gate. Every protected operation passes through [`Handler::decide`];
//! the public check and the internal helper only differ in how they report the outcome.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::handler::Handler;
use crate::error::{AppError, AppResult};
use crate::identity::authz::split_namespace_and_resource_id;
use crate::identity::{AuthzError, Object, RequestContext};

/// Outcome of one decision call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    Failed(AuthzError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResourcePermissionRequest {
    /// `namespace:id`; takes precedence over the split fields when well formed.
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub object_id: String,
    #[serde(default)]
    pub object_namespace: String,
    #[serde(default)]
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResourcePermissionResponse {
    pub status: bool,
}

fn failure_to_app_error(err: &AuthzError) -> AppError {
    if err.is_identity_error() {
        AppError::unauthenticated()
    } else {
        AppError::internal("authz_check")
    }
}

fn audit_check(object: &Object, allowed: bool) {
    info!(
        target: "audit",
        event = "permission.checked",
        object_id = %object.id,
        namespace = %object.namespace,
        status = if allowed { "success" } else { "failure" },
        "permission checked"
    );
}

impl Handler {
    pub async fn decide(&self, ctx: &RequestContext, object: &Object, permission: &str) -> Decision {
        match self.authz.check_authz(ctx, object, permission).await {
            Ok(true) => Decision::Allowed,
            Ok(false) => Decision::Denied,
            Err(e) => {
                if e.is_identity_error() {
                    warn!(namespace = %object.namespace, object_id = %object.id, permission, error = %e, "caller identity unresolved");
                } else {
                    error!(namespace = %object.namespace, object_id = %object.id, permission, error = %e, "authorization check failed");
                }
                Decision::Failed(e)
            }
        }
    }

    /// Public check: a denial is a successful answer, not an error.
    pub async fn check_resource_permission(
        &self,
        ctx: &RequestContext,
        req: CheckResourcePermissionRequest,
    ) -> AppResult<CheckResourcePermissionResponse> {
        let object = match split_namespace_and_resource_id(&req.resource) {
            Some((ns, id)) if !req.resource.is_empty() => Object::new(ns, id),
            _ => Object::new(&req.object_namespace, req.object_id.clone()),
        };
        if object.namespace.is_empty() || object.id.is_empty() {
            return Err(AppError::bad_request("invalid_resource"));
        }

        match self.decide(ctx, &object, &req.permission).await {
            Decision::Allowed => {
                audit_check(&object, true);
                Ok(CheckResourcePermissionResponse { status: true })
            }
            Decision::Denied => {
                audit_check(&object, false);
                Ok(CheckResourcePermissionResponse { status: false })
            }
            Decision::Failed(e) => Err(failure_to_app_error(&e)),
        }
    }

    /// Internal helper for handlers that must stop unless the caller holds `permission`.
    pub async fn is_authorized(&self, ctx: &RequestContext, object: &Object, permission: &str) -> AppResult<()> {
        if object.namespace.is_empty() || object.id.is_empty() {
            return Err(AppError::bad_request("invalid_namespace_or_id"));
        }
        match self.decide(ctx, object, permission).await {
            Decision::Allowed => Ok(()),
            Decision::Denied => Err(AppError::permission_denied()),
            Decision::Failed(e) => Err(failure_to_app_error(&e)),
        }
    }

    /// Full administrative bypass. Only for call sites that mean it.
    pub async fn is_super_user(&self, ctx: &RequestContext) -> AppResult<()> {
        let principal = self.logged_in_principal(ctx).await?;
        match self.sudo.is_sudo(ctx, &principal.id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::permission_denied()),
            Err(e) => {
                error!(user_id = %principal.id, error = %e, "sudo check failed");
                Err(AppError::internal("sudo_check"))
            }
        }
    }
}

#[cfg(test)]
#[path = "authz_tests.rs"]
mod tests;
