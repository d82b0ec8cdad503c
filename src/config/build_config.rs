//! Validated, typed build configuration

use cef_version::{Architecture, PlatformTarget, VersionDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::effective::{ConfigError, EffectiveConfig};

/// Keys the tool interprets; everything else lands in `extra`
pub const RECOGNIZED_KEYS: &[&str] = &[
    "cef_version",
    "platform",
    "architecture",
    "build_configuration",
    "cmake_version",
    "vs_generator",
    "output_directory",
    "temp_directory",
    "runtime_library",
    "enable_mfc_integration",
    "mfc_solution_path",
    "mfc_binary_dir",
    "mfc_cef_binary_dir",
];

/// CMake build type / MSBuild configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildType {
    Debug,
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Debug => "Debug",
            BuildType::Release => "Release",
            BuildType::RelWithDebInfo => "RelWithDebInfo",
            BuildType::MinSizeRel => "MinSizeRel",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildType::Debug),
            "release" => Ok(BuildType::Release),
            "relwithdebinfo" => Ok(BuildType::RelWithDebInfo),
            "minsizerel" => Ok(BuildType::MinSizeRel),
            _ => Err(format!(
                "'{}' is not one of Debug, Release, RelWithDebInfo, MinSizeRel",
                s
            )),
        }
    }
}

/// MSVC runtime library linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeLibrary {
    MultiThreaded,
    MultiThreadedDebug,
    #[serde(rename = "MultiThreadedDLL")]
    MultiThreadedDll,
    #[serde(rename = "MultiThreadedDebugDLL")]
    MultiThreadedDebugDll,
}

impl RuntimeLibrary {
    /// Value as written in a `.vcxproj` `<RuntimeLibrary>` element
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeLibrary::MultiThreaded => "MultiThreaded",
            RuntimeLibrary::MultiThreadedDebug => "MultiThreadedDebug",
            RuntimeLibrary::MultiThreadedDll => "MultiThreadedDLL",
            RuntimeLibrary::MultiThreadedDebugDll => "MultiThreadedDebugDLL",
        }
    }

    /// Compiler switch (`/MT`, `/MTd`, `/MD`, `/MDd`)
    pub fn compiler_flag(&self) -> &'static str {
        match self {
            RuntimeLibrary::MultiThreaded => "/MT",
            RuntimeLibrary::MultiThreadedDebug => "/MTd",
            RuntimeLibrary::MultiThreadedDll => "/MD",
            RuntimeLibrary::MultiThreadedDebugDll => "/MDd",
        }
    }
}

impl fmt::Display for RuntimeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeLibrary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multithreaded" | "/mt" | "mt" => Ok(RuntimeLibrary::MultiThreaded),
            "multithreadeddebug" | "/mtd" | "mtd" => Ok(RuntimeLibrary::MultiThreadedDebug),
            "multithreadeddll" | "/md" | "md" => Ok(RuntimeLibrary::MultiThreadedDll),
            "multithreadeddebugdll" | "/mdd" | "mdd" => Ok(RuntimeLibrary::MultiThreadedDebugDll),
            _ => Err(format!(
                "'{}' is not one of MultiThreaded, MultiThreadedDebug, MultiThreadedDLL, MultiThreadedDebugDLL",
                s
            )),
        }
    }
}

/// GUI-solution integration settings (present when enabled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfcSettings {
    /// Solution file to build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution_path: Option<PathBuf>,

    /// Application binary directory receiving the runtime subset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_dir: Option<PathBuf>,

    /// Directory receiving the full deployed CEF output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cef_binary_dir: Option<PathBuf>,
}

impl MfcSettings {
    /// Both the solution and the binary dir are set
    pub fn is_configured(&self) -> bool {
        self.solution_path.is_some() && self.binary_dir.is_some()
    }
}

/// Operator configuration for one run; immutable once loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub version: VersionDescriptor,
    pub target: PlatformTarget,
    pub build_type: BuildType,
    pub cmake_version: String,

    /// Explicit CMake generator, None = auto-detect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,

    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub runtime_library: RuntimeLibrary,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfc: Option<MfcSettings>,

    /// Unrecognised keys, kept verbatim and never interpreted
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl BuildConfiguration {
    /// Load and validate: defaults → file → CLI
    pub fn load(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
        workspace_root: &Path,
    ) -> Result<(Self, EffectiveConfig), ConfigError> {
        let effective = EffectiveConfig::build(config_path, cli_overrides)?;
        let config = Self::from_effective(&effective, workspace_root)?;
        Ok((config, effective))
    }

    /// Validate a merged config; relative paths resolve against `workspace_root`
    pub fn from_effective(
        effective: &EffectiveConfig,
        workspace_root: &Path,
    ) -> Result<Self, ConfigError> {
        let map = effective
            .config
            .as_object()
            .ok_or_else(|| ConfigError::ParseError("configuration is not an object".to_string()))?;

        let version_str = string_key(map, "cef_version")?.ok_or(ConfigError::Missing("cef_version"))?;
        let version = VersionDescriptor::parse(version_str.trim()).map_err(|e| ConfigError::Invalid {
            key: "cef_version",
            message: e.to_string(),
        })?;

        let platform_str = required_string(map, "platform")?;
        let (platform, suffix) =
            PlatformTarget::parse_platform(&platform_str).map_err(|e| ConfigError::Invalid {
                key: "platform",
                message: e.to_string(),
            })?;

        let arch_str = required_string(map, "architecture")?;
        let configured: Architecture = arch_str.parse().map_err(|e: cef_version::PlatformError| {
            ConfigError::Invalid {
                key: "architecture",
                message: e.to_string(),
            }
        })?;
        let architecture = match suffix {
            Some(from_platform) if effective.is_explicit("architecture") => {
                if from_platform != configured {
                    return Err(ConfigError::Invalid {
                        key: "architecture",
                        message: format!(
                            "'{}' conflicts with platform '{}'",
                            configured, platform_str
                        ),
                    });
                }
                configured
            }
            Some(from_platform) => from_platform,
            None => configured,
        };

        let build_type: BuildType = required_string(map, "build_configuration")?
            .parse()
            .map_err(|message| ConfigError::Invalid {
                key: "build_configuration",
                message,
            })?;

        let cmake_version = required_string(map, "cmake_version")?;
        if cmake_version.is_empty()
            || !cmake_version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(ConfigError::Invalid {
                key: "cmake_version",
                message: format!("'{}' is not a release version", cmake_version),
            });
        }

        let generator = string_key(map, "vs_generator")?.filter(|g| !g.trim().is_empty());

        let runtime_library: RuntimeLibrary = required_string(map, "runtime_library")?
            .parse()
            .map_err(|message| ConfigError::Invalid {
                key: "runtime_library",
                message,
            })?;

        let output_dir = resolve_path(workspace_root, &required_string(map, "output_directory")?);
        let temp_dir = resolve_path(workspace_root, &required_string(map, "temp_directory")?);

        let mfc_enabled = match map.get("enable_mfc_integration") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "enable_mfc_integration",
                    message: format!("expected a boolean, got {}", other),
                })
            }
        };
        let mfc = if mfc_enabled {
            let optional_path = |key: &'static str| -> Result<Option<PathBuf>, ConfigError> {
                Ok(string_key(map, key)?
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| resolve_path(workspace_root, &s)))
            };
            Some(MfcSettings {
                solution_path: optional_path("mfc_solution_path")?,
                binary_dir: optional_path("mfc_binary_dir")?,
                cef_binary_dir: optional_path("mfc_cef_binary_dir")?,
            })
        } else {
            None
        };

        let extra = map
            .iter()
            .filter(|(k, _)| !RECOGNIZED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            version,
            target: PlatformTarget::new(platform, architecture),
            build_type,
            cmake_version,
            generator,
            output_dir,
            temp_dir,
            runtime_library,
            mfc,
            extra,
        })
    }
}

/// A string-typed key; absent or null is None, any other type is an error
fn string_key(map: &Map<String, Value>, key: &'static str) -> Result<Option<String>, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigError::Invalid {
            key,
            message: format!("expected a string, got {}", other),
        }),
    }
}

fn required_string(map: &Map<String, Value>, key: &'static str) -> Result<String, ConfigError> {
    string_key(map, key)?.ok_or(ConfigError::Missing(key))
}

/// Absolute paths stay as-is; relative ones are joined onto `root`
pub fn resolve_path(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cef_version::Platform;
    use serde_json::json;

    const VERSION: &str = "120.1.10+g3ce3184+chromium-120.0.6099.129";

    fn load(cli: Value) -> Result<BuildConfiguration, ConfigError> {
        let effective = EffectiveConfig::build(None, Some(cli))?;
        BuildConfiguration::from_effective(&effective, Path::new("/work"))
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = load(json!({"cef_version": VERSION})).unwrap();

        assert_eq!(config.version.to_string(), VERSION);
        assert_eq!(config.target.platform, Platform::Windows);
        assert_eq!(config.target.architecture, Architecture::X64);
        assert_eq!(config.build_type, BuildType::Release);
        assert_eq!(config.cmake_version, "3.30.1");
        assert_eq!(config.generator, None);
        assert_eq!(config.runtime_library, RuntimeLibrary::MultiThreadedDll);
        assert_eq!(config.output_dir, PathBuf::from("/work/bin/NT/cef/release"));
        assert_eq!(config.temp_dir, PathBuf::from("/work/temp/cef-workflow"));
        assert!(config.mfc.is_none());
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_missing_version_is_error() {
        let err = load(json!({"platform": "linux64"})).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("cef_version")));
    }

    #[test]
    fn test_malformed_version_is_error() {
        let err = load(json!({"cef_version": "120.1.10"})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "cef_version", .. }));
    }

    #[test]
    fn test_mistyped_values_rejected() {
        let err = load(json!({"cef_version": VERSION, "enable_mfc_integration": "yes"})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "enable_mfc_integration", .. }));

        let err = load(json!({"cef_version": VERSION, "output_directory": 5})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "output_directory", .. }));

        let err = load(json!({"cef_version": VERSION, "runtime_library": "static"})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "runtime_library", .. }));
    }

    #[test]
    fn test_platform_suffix_sets_architecture() {
        let config = load(json!({"cef_version": VERSION, "platform": "macosarm64"})).unwrap();
        assert_eq!(config.target.platform, Platform::Macos);
        assert_eq!(config.target.architecture, Architecture::Arm64);
        assert_eq!(config.target.cdn_name(), "macosarm64");
    }

    #[test]
    fn test_explicit_architecture_conflict() {
        let err = load(json!({
            "cef_version": VERSION,
            "platform": "windows64",
            "architecture": "x86"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("conflicts"));

        let config = load(json!({
            "cef_version": VERSION,
            "platform": "windows",
            "architecture": "x86"
        }))
        .unwrap();
        assert_eq!(config.target.cdn_name(), "windows32");
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let err = load(json!({"cef_version": VERSION, "platform": "amiga"})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "platform", .. }));
    }

    #[test]
    fn test_extra_keys_preserved() {
        let config = load(json!({"cef_version": VERSION, "team": "desktop", "notes": [1, 2]})).unwrap();
        assert_eq!(config.extra.len(), 2);
        assert_eq!(config.extra["team"], json!("desktop"));
    }

    #[test]
    fn test_mfc_settings() {
        let config = load(json!({
            "cef_version": VERSION,
            "enable_mfc_integration": true,
            "mfc_solution_path": "app/App.sln",
            "mfc_binary_dir": "/abs/bin",
            "mfc_cef_binary_dir": ""
        }))
        .unwrap();
        let mfc = config.mfc.unwrap();
        assert_eq!(mfc.solution_path, Some(PathBuf::from("/work/app/App.sln")));
        assert_eq!(mfc.binary_dir, Some(PathBuf::from("/abs/bin")));
        assert_eq!(mfc.cef_binary_dir, None);
        assert!(mfc.is_configured());
    }

    #[test]
    fn test_padded_version_key_is_trimmed() {
        let config = load(json!({"cef_version": format!(" {}\n", VERSION)})).unwrap();
        assert_eq!(config.version.to_string(), VERSION);
    }

    #[test]
    fn test_explicit_empty_generator_means_auto() {
        let config = load(json!({"cef_version": VERSION, "vs_generator": "  "})).unwrap();
        assert_eq!(config.generator, None);

        let config = load(json!({"cef_version": VERSION, "vs_generator": "Ninja"})).unwrap();
        assert_eq!(config.generator.as_deref(), Some("Ninja"));
    }

    #[test]
    fn test_runtime_library_aliases() {
        assert_eq!("/MD".parse::<RuntimeLibrary>().unwrap(), RuntimeLibrary::MultiThreadedDll);
        assert_eq!("MultiThreaded".parse::<RuntimeLibrary>().unwrap().compiler_flag(), "/MT");
        assert_eq!(
            serde_json::to_string(&RuntimeLibrary::MultiThreadedDebugDll).unwrap(),
            "\"MultiThreadedDebugDLL\""
        );
    }
}
