//! Error types for the httpstan client.

use thiserror::Error;

/// Errors returned by compilation, sampling and transform calls.
#[derive(Error, Debug)]
pub enum StanError {
    /// A data value cannot be represented as JSON.
    #[error("Value associated with variable `{variable}` is not JSON serializable")]
    Serialization {
        /// Name of the offending data variable.
        variable: String,
    },

    /// The caller violated an interface contract. Raised before any request is sent.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The service rejected the request arguments (HTTP 422).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The service failed to compile the program.
    #[error("Compilation failed: {0}")]
    Compilation(String),

    /// Parameter metadata returned by the service is inconsistent.
    #[error("Invalid parameter metadata: {0}")]
    Parameter(String),

    /// Unexpected non-success response.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the service.
        message: String,
    },

    /// A failure reported by the service while running an operation.
    #[error("{0}")]
    Runtime(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for httpstan client operations.
pub type Result<T> = std::result::Result<T, StanError>;
