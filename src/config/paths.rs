//! Per-run directory layout
//!
//! Every phase receives its paths from here; nothing depends on the process
//! working directory after the binary captures it once.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::build_config::BuildConfiguration;

/// Path flags given on the command line
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub install_dir: Option<PathBuf>,
    pub app_path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub cef_source: Option<PathBuf>,
    pub cmake_path: Option<PathBuf>,
}

/// Resolved directories for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPaths {
    /// Where the framework is installed
    pub install_dir: PathBuf,
    /// Application whose bundled framework is detected and backed up; never
    /// an install target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_path: Option<PathBuf>,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub download_dir: PathBuf,
    /// Scratch area for extraction
    pub scratch_dir: PathBuf,
    pub cmake_cache_dir: PathBuf,
    pub build_dir: PathBuf,
    /// Deployment directory
    pub output_dir: PathBuf,
    /// Explicit framework source for the build workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cef_source: Option<PathBuf>,
    /// Explicit CMake executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmake_path: Option<PathBuf>,
    /// Also look in system-wide locations during detection
    pub system_scan: bool,
}

impl RunPaths {
    /// Resolve the layout; relative overrides are joined onto `workspace_root`
    pub fn resolve(config: &BuildConfiguration, overrides: &PathOverrides, workspace_root: &Path) -> Self {
        let rooted = |p: &PathBuf| -> PathBuf {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace_root.join(p)
            }
        };
        let temp = &config.temp_dir;

        Self {
            install_dir: overrides
                .install_dir
                .as_ref()
                .map(rooted)
                .unwrap_or_else(|| temp.join("cef_source")),
            app_path: overrides.app_path.as_ref().map(rooted),
            backup_dir: overrides
                .backup_dir
                .as_ref()
                .map(rooted)
                .unwrap_or_else(|| temp.join("backups")),
            log_dir: overrides
                .log_dir
                .as_ref()
                .map(rooted)
                .unwrap_or_else(|| temp.join("logs")),
            download_dir: temp.join("downloads"),
            scratch_dir: temp.join("scratch"),
            cmake_cache_dir: temp.join("cmake"),
            build_dir: temp.join("build"),
            output_dir: config.output_dir.clone(),
            cef_source: overrides.cef_source.as_ref().map(rooted),
            cmake_path: overrides.cmake_path.as_ref().map(rooted),
            system_scan: overrides.install_dir.is_none() && overrides.app_path.is_none(),
        }
    }

    /// Where the existing installation is looked for
    pub fn detect_root(&self) -> &Path {
        self.app_path.as_deref().unwrap_or(&self.install_dir)
    }

    /// Framework tree the build workflow compiles against
    pub fn build_source(&self) -> &Path {
        self.cef_source.as_deref().unwrap_or(&self.install_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectiveConfig;

    fn config() -> BuildConfiguration {
        let cli = serde_json::json!({
            "cef_version": "120.1.10+g3ce3184+chromium-120.0.6099.129",
            "temp_directory": "tmp"
        });
        let effective = EffectiveConfig::build(None, Some(cli)).unwrap();
        BuildConfiguration::from_effective(&effective, Path::new("/ws")).unwrap()
    }

    #[test]
    fn test_defaults_under_temp() {
        let paths = RunPaths::resolve(&config(), &PathOverrides::default(), Path::new("/ws"));
        assert_eq!(paths.install_dir, PathBuf::from("/ws/tmp/cef_source"));
        assert_eq!(paths.backup_dir, PathBuf::from("/ws/tmp/backups"));
        assert_eq!(paths.log_dir, PathBuf::from("/ws/tmp/logs"));
        assert_eq!(paths.download_dir, PathBuf::from("/ws/tmp/downloads"));
        assert_eq!(paths.cmake_cache_dir, PathBuf::from("/ws/tmp/cmake"));
        assert!(paths.system_scan);
        assert_eq!(paths.detect_root(), Path::new("/ws/tmp/cef_source"));
        assert_eq!(paths.build_source(), Path::new("/ws/tmp/cef_source"));
    }

    #[test]
    fn test_app_path_is_detected_but_never_installed_into() {
        let overrides = PathOverrides {
            app_path: Some(PathBuf::from("app")),
            ..Default::default()
        };
        let paths = RunPaths::resolve(&config(), &overrides, Path::new("/ws"));
        assert_eq!(paths.install_dir, PathBuf::from("/ws/tmp/cef_source"));
        assert_eq!(paths.detect_root(), Path::new("/ws/app"));
        assert_eq!(paths.build_source(), Path::new("/ws/tmp/cef_source"));
        assert!(!paths.system_scan);

        let overrides = PathOverrides {
            app_path: Some(PathBuf::from("app/cef")),
            install_dir: Some(PathBuf::from("/opt/cef")),
            ..Default::default()
        };
        let paths = RunPaths::resolve(&config(), &overrides, Path::new("/ws"));
        assert_eq!(paths.install_dir, PathBuf::from("/opt/cef"));
        assert_eq!(paths.detect_root(), Path::new("/ws/app/cef"));
    }

    #[test]
    fn test_cef_source_overrides_build_source() {
        let overrides = PathOverrides {
            cef_source: Some(PathBuf::from("/src/cef_binary")),
            ..Default::default()
        };
        let paths = RunPaths::resolve(&config(), &overrides, Path::new("/ws"));
        assert_eq!(paths.build_source(), Path::new("/src/cef_binary"));
    }
}
