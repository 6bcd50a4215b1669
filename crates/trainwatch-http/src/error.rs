//! Error types for the HTTP collaborators.

/// Errors from the history and geocoding clients.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// A query parameter was missing or malformed. Caller's fault.
    #[error("invalid '{field}': {reason}")]
    InvalidQuery {
        /// Parameter name as it appears on the wire.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The request never produced a response (connect, timeout, ...).
    #[error("request failed: {source}")]
    Request {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("HTTP {status}")]
    Status {
        /// Numeric status code.
        status: u16,
        /// Response body, if it could be read.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("response parse failed: {source}")]
    Decode {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {source}")]
    Client {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    /// Whether the error was caused by the caller's input rather than the
    /// upstream service.
    pub const fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQuery { .. })
    }
}
