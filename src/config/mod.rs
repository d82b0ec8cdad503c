//! Configuration merge system
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. JSON config file (cef_config.json)
//! 3. CLI flags
//!
//! The merged object is then validated into a typed `BuildConfiguration`.

mod build_config;
mod defaults;
mod effective;
mod merge;
mod paths;

pub use build_config::{
    resolve_path, BuildConfiguration, BuildType, MfcSettings, RuntimeLibrary, RECOGNIZED_KEYS,
};
pub use defaults::{BuiltinDefaults, DEFAULT_CONFIG_FILE};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use paths::{PathOverrides, RunPaths};
