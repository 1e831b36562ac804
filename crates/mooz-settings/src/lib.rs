//! # mooz-settings
//!
//! Configuration for the mooz relay hub, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`MoozSettings::default()`]
//! 2. **Settings file**: `~/.mooz/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `MOOZ_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_with, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
