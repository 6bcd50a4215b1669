//! Enumeration types shared between the transport, the engine, and the
//! rendering surface.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Connection status of the streaming feed as exposed to the consuming UI.
///
/// The transport tracks a finer-grained state machine internally
/// (including `Connecting`); consumers only ever see these two values.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionStatus {
    /// A feed connection is open and passing liveness checks.
    Connected,
    /// No usable connection; a reconnect may be pending.
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    /// Return `true` when the feed is connected.
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Lowercase label used in status payloads and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl core::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Connected).ok();
        assert_eq!(json.as_deref(), Some("\"connected\""));
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert!(!ConnectionStatus::Disconnected.is_connected());
    }
}
