//! Unified application error model and mapping helpers.
//! One error enum is shared by the HTTP layer, the store and the services; each
//! variant carries a short machine code plus a human-readable message, and maps
//! onto an HTTP status for the JSON API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Bad form input: out-of-range rating, weak password, malformed email.
    /// Surfaced inline to the submitting user; nothing was mutated.
    #[error("{code}: {message}")]
    Validation { code: String, message: String },

    /// Missing directory, file, user or comment. A 404-equivalent.
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },

    /// Unique-constraint race on lazy creation. Retried transparently by
    /// re-reading the now-existing row; never surfaced to the user.
    #[error("{code}: {message}")]
    Conflict { code: String, message: String },

    /// Bad credentials, expired/invalid token, missing role. Kept generic.
    #[error("{code}: {message}")]
    Auth { code: String, message: String },

    /// Denied outright: missing/mismatched CSRF token, or a role gate the
    /// caller does not pass. Logging in again will not help.
    #[error("{code}: {message}")]
    Forbidden { code: String, message: String },

    /// Outbound provider failure (mail). Logged; the request still succeeds.
    #[error("{code}: {message}")]
    Upstream { code: String, message: String },

    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Validation { code: code.into(), message: msg.into() }
    }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Conflict { code: code.into(), message: msg.into() }
    }
    pub fn auth<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Auth { code: code.into(), message: msg.into() }
    }
    pub fn forbidden<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Forbidden { code: code.into(), message: msg.into() }
    }
    pub fn upstream<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Upstream { code: code.into(), message: msg.into() }
    }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Internal { code: code.into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
            AppError::Upstream { .. } => 503,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// True when the database rejected a write because a UNIQUE constraint fired.
/// The lazy-creation paths use this as the backstop for the read-then-write
/// race: the loser re-reads the row the winner just inserted.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            AppError::Conflict { code: "unique_violation".into(), message: err.to_string() }
        } else if matches!(err, sqlx::Error::RowNotFound) {
            AppError::NotFound { code: "row_not_found".into(), message: err.to_string() }
        } else {
            AppError::Internal { code: "database_error".into(), message: err.to_string() }
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal { code: "io_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream { code: "mail_provider".into(), message: err.to_string() }
    }
}
