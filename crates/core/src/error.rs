// crates/core/src/error.rs
use thiserror::Error;

/// Boxed error coming out of an update store implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the update log, the hub and stream sessions.
///
/// Subscriber overflow is deliberately absent: a full subscriber channel is a
/// counted drop, never an error returned to anyone.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Update store unavailable: {source}")]
    Store {
        #[source]
        source: BoxError,
    },
}

impl StatusError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn store(source: impl Into<BoxError>) -> Self {
        Self::Store {
            source: source.into(),
        }
    }
}

pub type StatusResult<T> = Result<T, StatusError>;
