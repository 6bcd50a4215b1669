//! Error types for the tracker binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup. Once running, feed failures are
//! recovered by the transport and never surface here.

/// Top-level error for the tracker binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: trainwatch_core::config::ConfigError,
    },

    /// An HTTP collaborator client could not be built.
    #[error("http client error: {source}")]
    Http {
        /// The underlying client error.
        #[from]
        source: trainwatch_http::HttpError,
    },

    /// The rendering surface failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: trainwatch_observer::startup::StartupError,
    },
}
