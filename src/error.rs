//! Unified application error model and mapping helpers.
//! Every error leaving the service maps to exactly one coarse kind, and every kind maps
//! to one transport status plus a fixed human-readable message. Causes stay server-side.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const MSG_BAD_REQUEST: &str = "bad request";
pub const MSG_UNAUTHENTICATED: &str = "not authenticated";
pub const MSG_PERMISSION_DENIED: &str = "permission denied";
pub const MSG_NOT_FOUND: &str = "not found";
pub const MSG_INTERNAL: &str = "internal server error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Internal,
}

/// Transport-facing description of an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub http: u16,
    /// RPC-style status name, stable for clients that switch on it.
    pub name: &'static str,
    pub message: &'static str,
}

static STATUS_TABLE: Lazy<HashMap<ErrorKind, Status>> = Lazy::new(|| {
    HashMap::from([
        (ErrorKind::InvalidArgument, Status { http: 400, name: "invalid_argument", message: MSG_BAD_REQUEST }),
        (ErrorKind::Unauthenticated, Status { http: 401, name: "unauthenticated", message: MSG_UNAUTHENTICATED }),
        (ErrorKind::PermissionDenied, Status { http: 403, name: "permission_denied", message: MSG_PERMISSION_DENIED }),
        (ErrorKind::NotFound, Status { http: 404, name: "not_found", message: MSG_NOT_FOUND }),
        (ErrorKind::Internal, Status { http: 500, name: "internal", message: MSG_INTERNAL }),
    ])
});

impl ErrorKind {
    pub fn status(self) -> Status {
        // The table is total over ErrorKind; the fallback only guards against a future variant.
        STATUS_TABLE.get(&self).copied().unwrap_or(Status { http: 500, name: "internal", message: MSG_INTERNAL })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    InvalidArgument { code: String, message: String },
    Unauthenticated { code: String, message: String },
    PermissionDenied { code: String, message: String },
    NotFound { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            AppError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            AppError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn code_str(&self) -> &str {
        match self {
            AppError::InvalidArgument { code, .. }
            | AppError::Unauthenticated { code, .. }
            | AppError::PermissionDenied { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InvalidArgument { message, .. }
            | AppError::Unauthenticated { message, .. }
            | AppError::PermissionDenied { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(code: S, msg: S) -> Self { AppError::InvalidArgument { code: code.into(), message: msg.into() } }
    pub fn bad_request<S: Into<String>>(code: S) -> Self { AppError::InvalidArgument { code: code.into(), message: MSG_BAD_REQUEST.into() } }
    pub fn unauthenticated() -> Self { AppError::Unauthenticated { code: "unauthenticated".into(), message: MSG_UNAUTHENTICATED.into() } }
    pub fn permission_denied() -> Self { AppError::PermissionDenied { code: "permission_denied".into(), message: MSG_PERMISSION_DENIED.into() } }
    pub fn not_found<S: Into<String>>(code: S) -> Self { AppError::NotFound { code: code.into(), message: MSG_NOT_FOUND.into() } }
    pub fn internal<S: Into<String>>(code: S) -> Self { AppError::Internal { code: code.into(), message: MSG_INTERNAL.into() } }

    pub fn status(&self) -> Status { self.kind().status() }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 { self.status().http }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
