//! Batch queue error types
//!
//! Construction and registry errors. Producer-side failures are never
//! errors: `produce` reports drops and rejections through its `bool`.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Boxed error returned by handler implementations
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Batch queue errors
#[derive(Debug, Error)]
pub enum BatchQueueError {
    /// A policy or config value is out of range
    #[error("invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// A queue with this name is already registered
    #[error("batch queue already exists: {name}")]
    AlreadyExists { name: String },

    /// The registered queue carries a different item type
    #[error("batch queue {name} does not carry items of type {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Worker thread could not be started
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Settings text could not be parsed
    #[error("invalid queue settings: {0}")]
    Settings(String),
}

impl BatchQueueError {
    /// Create an invalid-argument error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    /// Create a type-mismatch error for item type `T`
    pub fn type_mismatch<T>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create a spawn error
    pub fn spawn(name: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            name: name.into(),
            source,
        }
    }

    /// Check if this is a validation failure
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Check if this is a duplicate-name failure
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Result type for batch queue operations
pub type Result<T> = std::result::Result<T, BatchQueueError>;

/// Failure reported by a handler for one batch
///
/// The failing batch counts as consumed; it is never redelivered.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    /// The handler panicked while consuming
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap any error as a handler failure
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }

    /// Build from a caught panic payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
