//! # mesh-settings
//!
//! Node configuration loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`MeshSettings::default()`]
//! 2. **Settings file**: `~/.mesh/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `MESH_*` overrides (highest priority)
//!
//! The listen address is not a setting; it is the node's required
//! command-line argument.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, MeshSettings, TransportSettings};
