//! Error types for the streaming feed client.
//!
//! None of these reach the caller of [`TransportChannel::connect`]: the
//! channel logs them and schedules a reconnect. They exist so each way a
//! session can end is named and logged consistently.
//!
//! [`TransportChannel::connect`]: crate::TransportChannel::connect

/// Ways a connection attempt or session can fail.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The WebSocket handshake or a read/write failed.
    #[error("websocket error: {source}")]
    WebSocket {
        /// The underlying tungstenite error.
        #[from]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The connect attempt did not finish in time.
    #[error("connect timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Configured connect timeout.
        timeout_ms: u64,
    },

    /// Nothing was received for longer than the liveness window.
    #[error("no frames received for {silent_ms} ms")]
    HeartbeatTimeout {
        /// Length of the silence that triggered the close.
        silent_ms: u64,
    },

    /// The server closed the connection.
    #[error("connection closed by server")]
    ClosedByPeer,
}
