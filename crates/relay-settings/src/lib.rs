//! # relay-settings
//!
//! Configuration for the order chat relay, loaded in three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `$RELAY_HOME/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides
//!
//! Settings are loaded once by the binary and passed down explicitly; there
//! is no process-wide singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, relay_home, settings_path};
pub use types::*;
