// SPDX-License-Identifier: MIT OR Apache-2.0

//! JoinWait Core Error Types
//!
//! Error taxonomy for the correlation engine. Every error is fatal to the
//! triggering event only: the event is dropped and the condition reported,
//! group state is never mutated by a failing call.

use thiserror::Error;

/// Result type for join-wait operations
pub type JoinWaitResult<T> = Result<T, JoinWaitError>;

/// Errors raised while configuring or feeding the correlation engine
#[derive(Error, Debug)]
pub enum JoinWaitError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("pathsToExpire cannot have duplicate entries: '{pattern}'")]
    DuplicateExpirePath { pattern: String },

    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Extraction error: {message}")]
    Extraction { message: String },
}

// Custom error creation helpers
impl JoinWaitError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an extraction error
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// True for errors caused by static or per-event configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::DuplicateExpirePath { .. } | Self::InvalidPattern { .. }
        )
    }
}
