//! Error types for sqlweave
//!
//! Every message carries the component it originated from in brackets so a
//! failure surfaced several layers up can still be traced to its source.

use crate::tx::Propagation;
use thiserror::Error;

/// The main error type for sqlweave operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or execution error
    #[error("[{component}] database error: {source}")]
    Database {
        component: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A test expression could not be evaluated or did not yield a boolean
    #[error("[SqlBuilder] <test `{test}`> fail, {message}")]
    Expression { test: String, message: String },

    /// The requested propagation is incompatible with the current transaction state
    #[error("[Session] {propagation} nested transaction exception: {message}")]
    PropagationConflict {
        propagation: Propagation,
        message: String,
    },

    /// An unknown propagation name was supplied; this is a caller contract violation
    #[error("[Session] unsupported propagation `{value}` (caller contract violation)")]
    UnsupportedPropagation { value: String },

    /// An operation was attempted on a closed session
    #[error("[Session] can not {operation}() a closed session")]
    SessionClosed { operation: &'static str },

    /// The registry holds no session with this id
    #[error("[SessionFactory] session '{id}' not found")]
    SessionNotFound { id: String },

    /// Configuration could not be parsed
    #[error("[Config] {message}")]
    Config { message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for sqlweave operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Database {
            component: "Database",
            source,
        }
    }
}

impl Error {
    /// Create a new expression evaluation error
    pub fn expression(test: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            test: test.into(),
            message: message.into(),
        }
    }

    /// Create a new propagation conflict error
    pub fn propagation_conflict(propagation: Propagation, message: impl Into<String>) -> Self {
        Self::PropagationConflict {
            propagation,
            message: message.into(),
        }
    }

    /// Create a new unsupported propagation error
    pub fn unsupported_propagation(value: impl Into<String>) -> Self {
        Self::UnsupportedPropagation {
            value: value.into(),
        }
    }

    /// Create a new closed session error
    pub fn session_closed(operation: &'static str) -> Self {
        Self::SessionClosed { operation }
    }

    /// Create a new session not found error
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Re-tag a database error with the component that observed it.
    /// Other variants pass through unchanged.
    pub fn within(self, component: &'static str) -> Self {
        match self {
            Self::Database { source, .. } => Self::Database { component, source },
            other => other,
        }
    }

    /// True for faults that signal a broken caller contract rather than a
    /// runtime condition; the operation must be aborted, not retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::UnsupportedPropagation { .. })
    }
}
