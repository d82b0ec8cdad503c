//! Post-install verification checklist
//!
//! A failed item is reported, never rolled back; restoring the previous
//! installation is an operator decision using the backup archive.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use cef_version::Platform;

use crate::detect::{find_core_library, MAC_FRAMEWORK};

/// Resource paks accepted as "at least one present"
pub const RESOURCE_PAKS: &[&str] = &[
    "cef.pak",
    "cef_100_percent.pak",
    "cef_200_percent.pak",
    "resources.pak",
];

/// One checklist line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckItem {
    pub item: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Ordered checklist result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub root: PathBuf,
    pub passed: bool,
    pub checklist: Vec<CheckItem>,
}

impl VerificationReport {
    pub fn failed_items(&self) -> impl Iterator<Item = &CheckItem> {
        self.checklist.iter().filter(|c| !c.ok)
    }
}

/// Checks an installed tree for one platform
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    platform: Platform,
}

impl Verifier {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn verify(&self, install_root: &Path) -> VerificationReport {
        let core = find_core_library(install_root, self.platform);
        let pak = self.find_resource_pak(install_root);
        let locales = self.find_locales(install_root);

        let checklist = vec![
            item("core library", core),
            item("resource pak", pak),
            item("locales", locales),
        ];
        let passed = checklist.iter().all(|c| c.ok);
        if passed {
            tracing::info!(root = %install_root.display(), "verification passed");
        } else {
            for failed in checklist.iter().filter(|c| !c.ok) {
                tracing::warn!(item = %failed.item, "verification item failed");
            }
        }
        VerificationReport {
            root: install_root.to_path_buf(),
            passed,
            checklist,
        }
    }

    fn search_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let mut dirs = vec![
            root.to_path_buf(),
            root.join("Resources"),
            root.join("Release"),
            root.join("Debug"),
        ];
        if self.platform == Platform::Macos {
            for config in ["Release", "Debug", ""] {
                let base = if config.is_empty() { root.to_path_buf() } else { root.join(config) };
                dirs.push(base.join(MAC_FRAMEWORK).join("Resources"));
            }
        }
        dirs
    }

    fn find_resource_pak(&self, root: &Path) -> Option<PathBuf> {
        let dirs = self.search_dirs(root);
        let named = dirs
            .iter()
            .flat_map(|d| RESOURCE_PAKS.iter().map(move |p| d.join(p)))
            .find(|p| p.is_file());
        if named.is_some() || self.platform != Platform::Macos {
            return named;
        }
        // Framework bundles may ship differently named paks
        dirs.iter()
            .filter(|d| d.ends_with("Resources") && d.parent().map_or(false, |p| p.ends_with(MAC_FRAMEWORK)))
            .filter_map(|d| fs::read_dir(d).ok())
            .flatten()
            .filter_map(Result::ok)
            .map(|e| e.path())
            .find(|p| p.extension().map_or(false, |e| e == "pak"))
    }

    fn find_locales(&self, root: &Path) -> Option<PathBuf> {
        let dirs = self.search_dirs(root);
        if self.platform == Platform::Macos {
            return dirs
                .iter()
                .filter_map(|d| fs::read_dir(d).ok())
                .flatten()
                .filter_map(Result::ok)
                .map(|e| e.path())
                .find(|p| p.extension().map_or(false, |e| e == "lproj") && non_empty_dir(p));
        }
        dirs.iter().map(|d| d.join("locales")).find(|p| non_empty_dir(p))
    }
}

fn non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn item(name: &str, found: Option<PathBuf>) -> CheckItem {
    CheckItem {
        item: name.to_string(),
        ok: found.is_some(),
        detail: Some(
            found
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "missing".to_string()),
        ),
    }
}
