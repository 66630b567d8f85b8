//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every section is `#[serde(default)]`,
//! so a partial file only needs the values it changes.

use std::time::Duration;

use mesh_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for a mesh node.
///
/// ```json
/// {
///   "transport": { "handshakeTimeoutMs": 2000 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeshSettings {
    /// WebSocket transport settings.
    pub transport: TransportSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl MeshSettings {
    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.transport.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "transport.wsPath must start with '/', got {:?}",
                self.transport.ws_path
            )));
        }
        if self.transport.handshake_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "transport.handshakeTimeoutMs must be positive".into(),
            ));
        }
        if self.transport.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "transport.maxMessageSize must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// WebSocket transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// HTTP path peers upgrade on, used both for serving and dialing.
    pub ws_path: String,
    /// Budget for an outbound dial including the WebSocket handshake.
    pub handshake_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl TransportSettings {
    /// Handshake budget as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            ws_path: "/ws".into(),
            handshake_timeout_ms: 5_000,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Line format on stderr.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}
