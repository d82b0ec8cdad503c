//! Installation detection
//!
//! Finds a CEF installation by its marker files, then reads the version
//! from the distribution's README/version file or `include/cef_version.h`
//! and the architecture from the core library's binary header. Absence is a
//! normal outcome (`found == false`), never an error.

pub mod header;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use cef_version::{Architecture, Platform, VersionDescriptor};

pub use header::sniff_architecture;

/// Directory depth searched below a candidate path
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Name of the macOS framework bundle
pub const MAC_FRAMEWORK: &str = "Chromium Embedded Framework.framework";

/// Detection errors (the phase reports these as a non-fatal warning)
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What detection found at one location; never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub found: bool,
    pub root_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    pub platform: Platform,
}

impl InstallationRecord {
    pub fn not_found(path: &Path, platform: Platform) -> Self {
        Self {
            found: false,
            root_path: path.to_path_buf(),
            version: None,
            architecture: None,
            platform,
        }
    }

    /// One-line description for summaries
    pub fn describe(&self) -> String {
        if !self.found {
            return format!("no installation at {}", self.root_path.display());
        }
        format!(
            "CEF {} ({}) at {}",
            self.version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "version unknown".to_string()),
            self.architecture
                .map(|a| a.to_string())
                .unwrap_or_else(|| "arch unknown".to_string()),
            self.root_path.display()
        )
    }
}

/// File or directory names that identify an installation
pub fn markers(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => &["libcef.dll", "chrome_elf.dll"],
        Platform::Macos => &[MAC_FRAMEWORK, "libcef.dylib"],
        Platform::Linux => &["libcef.so"],
    }
}

/// Paths, relative to a directory holding the core library, of the library itself
fn core_library_names(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => &["libcef.dll"],
        Platform::Macos => &[
            "Chromium Embedded Framework.framework/Chromium Embedded Framework",
            "libcef.dylib",
        ],
        Platform::Linux => &["libcef.so"],
    }
}

/// Locate the core library inside an installation root
pub fn find_core_library(root: &Path, platform: Platform) -> Option<PathBuf> {
    ["", "Release", "Debug"]
        .iter()
        .map(|sub| if sub.is_empty() { root.to_path_buf() } else { root.join(sub) })
        .flat_map(|dir| {
            core_library_names(platform)
                .iter()
                .map(move |name| dir.join(name))
        })
        .find(|candidate| candidate.is_file())
}

/// Find the installation root under `search`.
///
/// The shallowest marker wins. A marker sitting in `Release`, `Debug` or
/// `Resources` of a binary distribution lifts the root to the distribution
/// directory.
pub fn locate_framework_root(
    search: &Path,
    platform: Platform,
    max_depth: usize,
) -> Result<Option<PathBuf>, DetectError> {
    match fs::metadata(search) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(DetectError::Io {
                path: search.to_path_buf(),
                source,
            })
        }
    }

    let names = markers(platform);
    let mut best: Option<(usize, PathBuf)> = None;
    let mut walker = WalkDir::new(search)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        // Unreadable subdirectories are skipped, not fatal
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy();
        if !names.iter().any(|m| *m == name) {
            continue;
        }
        if entry.file_type().is_dir() {
            walker.skip_current_dir();
        }
        let depth = entry.depth();
        if best.as_ref().map_or(true, |(d, _)| depth < *d) {
            if let Some(parent) = entry.path().parent() {
                best = Some((depth, lift_root(parent)));
            }
        }
    }
    Ok(best.map(|(_, root)| root))
}

fn lift_root(dir: &Path) -> PathBuf {
    let is_config_dir = dir
        .file_name()
        .map(|n| {
            let n = n.to_string_lossy().to_ascii_lowercase();
            n == "release" || n == "debug" || n == "resources"
        })
        .unwrap_or(false);
    if is_config_dir {
        if let Some(parent) = dir.parent() {
            let distribution = parent.join("include").is_dir()
                || parent.join("CMakeLists.txt").is_file()
                || parent.join("README.txt").is_file();
            if distribution {
                return parent.to_path_buf();
            }
        }
    }
    dir.to_path_buf()
}

/// Read the installed version, `None` when no readable version is present
pub fn read_version(root: &Path) -> Option<VersionDescriptor> {
    let line_pattern = Regex::new(r"(?i)CEF Version:\s*(\S+)").ok()?;
    for name in ["README.txt", "version.txt", "VERSION"] {
        let Ok(content) = fs::read_to_string(root.join(name)) else {
            continue;
        };
        if let Some(caps) = line_pattern.captures(&content) {
            if let Ok(version) = VersionDescriptor::parse(&caps[1]) {
                return Some(version);
            }
        }
        if let Ok(version) = VersionDescriptor::parse(content.trim()) {
            return Some(version);
        }
    }

    let define = Regex::new(r#"#define\s+CEF_VERSION\s+"([^"]+)""#).ok()?;
    let header = fs::read_to_string(root.join("include").join("cef_version.h")).ok()?;
    define
        .captures(&header)
        .and_then(|caps| VersionDescriptor::parse(&caps[1]).ok())
}

/// System-wide locations searched when no application path is given
pub fn default_search_roots(platform: Platform) -> Vec<PathBuf> {
    let env_dir = |key: &str| std::env::var_os(key).map(PathBuf::from);
    let home = env_dir("HOME").or_else(|| env_dir("USERPROFILE"));

    let mut roots = Vec::new();
    match platform {
        Platform::Windows => {
            roots.push(PathBuf::from("C:/Program Files"));
            roots.push(PathBuf::from("C:/Program Files (x86)"));
            roots.extend(env_dir("LOCALAPPDATA"));
            roots.extend(env_dir("APPDATA"));
        }
        Platform::Macos => {
            roots.push(PathBuf::from("/Applications"));
            roots.extend(home.as_ref().map(|h| h.join("Applications")));
            roots.push(PathBuf::from("/Library/Frameworks"));
            roots.extend(home.as_ref().map(|h| h.join("Library/Frameworks")));
        }
        Platform::Linux => {
            roots.push(PathBuf::from("/opt"));
            roots.push(PathBuf::from("/usr/local"));
            roots.push(PathBuf::from("/usr/lib"));
            roots.extend(home.as_ref().map(|h| h.join(".local")));
        }
    }
    roots
}

/// Marker-based detector for one platform
#[derive(Debug, Clone)]
pub struct InstallationDetector {
    platform: Platform,
    max_depth: usize,
}

impl InstallationDetector {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Detect at `path`, surfacing IO errors
    pub fn try_detect(&self, path: &Path) -> Result<InstallationRecord, DetectError> {
        let Some(root) = locate_framework_root(path, self.platform, self.max_depth)? else {
            return Ok(InstallationRecord::not_found(path, self.platform));
        };

        let version = read_version(&root);
        let architecture = find_core_library(&root, self.platform).and_then(|lib| {
            sniff_architecture(&lib)
                .map_err(|e| tracing::debug!(path = %lib.display(), error = %e, "header unreadable"))
                .ok()
                .flatten()
        });

        tracing::info!(
            root = %root.display(),
            version = ?version.as_ref().map(|v| v.to_string()),
            architecture = ?architecture,
            "installation found"
        );
        Ok(InstallationRecord {
            found: true,
            root_path: root,
            version,
            architecture,
            platform: self.platform,
        })
    }

    /// Detect at `path`; an unreadable location counts as not found
    pub fn detect(&self, path: &Path) -> InstallationRecord {
        self.try_detect(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "detection failed, treating as not found");
            InstallationRecord::not_found(path, self.platform)
        })
    }

    /// First installation found under any of `roots`, in order
    pub fn scan(&self, roots: &[PathBuf]) -> Option<InstallationRecord> {
        roots
            .iter()
            .map(|root| self.detect(root))
            .find(|record| record.found)
    }
}
