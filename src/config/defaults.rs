//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for every recognised configuration key.

use serde::{Deserialize, Serialize};

/// Default config file looked up in the workspace root
pub const DEFAULT_CONFIG_FILE: &str = "cef_config.json";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// CDN platform string (default: "windows64")
    pub platform: String,

    /// CPU architecture (default: "x64")
    pub architecture: String,

    /// Build configuration (default: "Release")
    pub build_configuration: String,

    /// CMake release to provision (default: "3.30.1")
    pub cmake_version: String,

    /// CMake generator, empty = auto-detect
    pub vs_generator: String,

    /// Deployment directory (default: "bin/NT/cef/release")
    pub output_directory: String,

    /// Scratch root for downloads, logs, backups (default: "temp/cef-workflow")
    pub temp_directory: String,

    /// MSVC runtime library (default: "MultiThreadedDLL")
    pub runtime_library: String,

    /// Run the GUI-solution integration workflow (default: false)
    pub enable_mfc_integration: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            platform: "windows64".to_string(),
            architecture: "x64".to_string(),
            build_configuration: "Release".to_string(),
            cmake_version: "3.30.1".to_string(),
            vs_generator: String::new(),
            output_directory: "bin/NT/cef/release".to_string(),
            temp_directory: "temp/cef-workflow".to_string(),
            runtime_library: "MultiThreadedDLL".to_string(),
            enable_mfc_integration: false,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "platform": self.platform,
            "architecture": self.architecture,
            "build_configuration": self.build_configuration,
            "cmake_version": self.cmake_version,
            "vs_generator": self.vs_generator,
            "output_directory": self.output_directory,
            "temp_directory": self.temp_directory,
            "runtime_library": self.runtime_library,
            "enable_mfc_integration": self.enable_mfc_integration,
            "mfc_solution_path": "",
            "mfc_binary_dir": "",
            "mfc_cef_binary_dir": ""
        })
    }
}
