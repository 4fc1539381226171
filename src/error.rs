//! Error types for Trueno-Runboard
//!
//! Validation errors are reported to the caller verbatim. Execution errors are
//! logged at the service boundary and surface as an opaque failure.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned to callers for every non-client error.
pub const OPAQUE_FAILURE: &str = "internal server error";

/// Trueno-Runboard error types
#[derive(Error, Debug)]
pub enum Error {
    /// The `query` parameter is not a JSON object
    #[error("Invalid filter syntax: {0}")]
    InvalidFilterSyntax(String),

    /// A request parameter could not be parsed
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name as received
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The compiled pipeline failed inside the document store
    #[error("Store execution failed: {0}")]
    Store(String),

    /// Column definitions could not be decoded
    #[error("Column catalog error: {0}")]
    Catalog(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the request rather than the server.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilterSyntax(_) | Self::InvalidParameter { .. }
        )
    }

    /// Message safe to hand back to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            OPAQUE_FAILURE.to_string()
        }
    }
}
