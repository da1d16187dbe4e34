//! Unified application error model and mapping helpers.
//! Store-level errors (validation, not found, already exists) surface to administrative
//! callers unchanged; the login path narrows everything else before it leaves the backend.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Validation { code: String, message: String },
    NotFound { code: String, message: String },
    AlreadyExists { code: String, message: String },
    Unauthorized { code: String, message: String },
    PreconditionFailed { code: String, message: String },
    Upstream { code: String, message: String },
    Canceled { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::AlreadyExists { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::PreconditionFailed { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Canceled { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::AlreadyExists { message, .. }
            | AppError::Unauthorized { message, .. }
            | AppError::PreconditionFailed { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Canceled { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn already_exists<S: Into<String>>(code: S, msg: S) -> Self { AppError::AlreadyExists { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn precondition<S: Into<String>>(code: S, msg: S) -> Self { AppError::PreconditionFailed { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn canceled<S: Into<String>>(code: S, msg: S) -> Self { AppError::Canceled { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::AlreadyExists { .. } => 409,
            AppError::Unauthorized { .. } => 401,
            AppError::PreconditionFailed { .. } => 412,
            AppError::Upstream { .. } => 502,
            AppError::Canceled { .. } => 408,
            AppError::Internal { .. } => 500,
        }
    }

    /// Collapse to what an unauthenticated login caller may observe. Anything that could
    /// reveal whether a role or config exists becomes the generic unauthorized denial.
    pub fn narrow_for_login(self) -> Self {
        match self {
            AppError::Upstream { .. } | AppError::Canceled { .. } | AppError::Validation { .. } => self,
            AppError::Internal { .. } => AppError::internal("internal", "internal error"),
            AppError::NotFound { .. }
            | AppError::AlreadyExists { .. }
            | AppError::Unauthorized { .. }
            | AppError::PreconditionFailed { .. } => unauthorized_denial(),
        }
    }
}

/// The one denial shape returned for every login rejection.
pub fn unauthorized_denial() -> AppError {
    AppError::unauthorized("unauthorized", "permission denied")
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

impl From<crate::storage::StorageError> for AppError {
    fn from(err: crate::storage::StorageError) -> Self {
        AppError::Internal { code: "storage_error".into(), message: err.to_string() }
    }
}

impl From<crate::identity::IdentityError> for AppError {
    fn from(err: crate::identity::IdentityError) -> Self {
        use crate::identity::IdentityError;
        match err {
            IdentityError::Unauthorized(msg) => AppError::Unauthorized { code: "unauthorized".into(), message: msg },
            IdentityError::Transient(msg) => AppError::Upstream { code: "identity_unavailable".into(), message: msg },
            IdentityError::Decode(msg) => AppError::Upstream { code: "identity_bad_response".into(), message: msg },
            IdentityError::Canceled => AppError::Canceled { code: "canceled".into(), message: "request canceled".into() },
        }
    }
}

impl From<crate::backend::TokenParamsError> for AppError {
    fn from(err: crate::backend::TokenParamsError) -> Self {
        AppError::Validation { code: "invalid_token_params".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
