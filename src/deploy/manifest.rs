//! Deployment manifests: which build outputs land where

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use cef_version::Platform;

use crate::detect::MAC_FRAMEWORK;

/// Class of a deployed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    CoreLibrary,
    WrapperLibrary,
    RuntimeLibrary,
    Resource,
    Locale,
    Header,
}

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Glob relative to a source root, `/`-separated
    pub source_glob: String,
    /// Directory under the destination root
    pub destination_dir: PathBuf,
    pub category: ArtifactCategory,
    /// Missing required entries fail the collection
    pub required: bool,
}

impl ManifestEntry {
    pub fn new(
        source_glob: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        category: ArtifactCategory,
        required: bool,
    ) -> Self {
        Self {
            source_glob: source_glob.into(),
            destination_dir: destination_dir.into(),
            category,
            required,
        }
    }
}

/// Ordered list of entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Runtime DLLs shipped next to libcef.dll
const WINDOWS_RUNTIME: &[&str] = &[
    "chrome_elf.dll",
    "d3dcompiler_47.dll",
    "libEGL.dll",
    "libGLESv2.dll",
    "vk_swiftshader.dll",
    "vk_swiftshader_icd.json",
    "vulkan-1.dll",
];

const LINUX_RUNTIME: &[&str] = &[
    "libEGL.so",
    "libGLESv2.so",
    "libvk_swiftshader.so",
    "libvulkan.so.1",
    "vk_swiftshader_icd.json",
    "chrome-sandbox",
];

impl DeploymentManifest {
    pub fn push(&mut self, entry: ManifestEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Everything a consumer build needs: libraries, resources, locales, headers
    pub fn default_for(platform: Platform) -> Self {
        use ArtifactCategory::*;
        let mut manifest = Self::default();
        match platform {
            Platform::Windows => {
                manifest.push(ManifestEntry::new("libcef.dll", ".", CoreLibrary, true));
                manifest.push(ManifestEntry::new("libcef.lib", ".", CoreLibrary, false));
                manifest.push(ManifestEntry::new("libcef_dll_wrapper.lib", ".", WrapperLibrary, true));
                for name in WINDOWS_RUNTIME {
                    manifest.push(ManifestEntry::new(*name, ".", RuntimeLibrary, false));
                }
            }
            Platform::Linux => {
                manifest.push(ManifestEntry::new("libcef.so", ".", CoreLibrary, true));
                manifest.push(ManifestEntry::new("libcef_dll_wrapper.a", ".", WrapperLibrary, true));
                for name in LINUX_RUNTIME {
                    manifest.push(ManifestEntry::new(*name, ".", RuntimeLibrary, false));
                }
            }
            Platform::Macos => {
                manifest.push(ManifestEntry::new(
                    format!("{}/**/*", MAC_FRAMEWORK),
                    MAC_FRAMEWORK,
                    CoreLibrary,
                    true,
                ));
                manifest.push(ManifestEntry::new("libcef_dll_wrapper.a", ".", WrapperLibrary, true));
            }
        }
        if platform != Platform::Macos {
            manifest.push(ManifestEntry::new("*.pak", ".", Resource, false));
            manifest.push(ManifestEntry::new("*.bin", ".", Resource, false));
            manifest.push(ManifestEntry::new("icudtl.dat", ".", Resource, false));
            manifest.push(ManifestEntry::new("locales/*.pak", "locales", Locale, false));
        }
        manifest.push(ManifestEntry::new("include/**/*", "include", Header, false));
        manifest
    }

    /// Files an application needs at runtime, taken from a deployed tree
    pub fn runtime_subset(platform: Platform) -> Self {
        use ArtifactCategory::*;
        let mut manifest = Self::default();
        match platform {
            Platform::Windows => {
                manifest.push(ManifestEntry::new("libcef.dll", ".", CoreLibrary, true));
                for name in WINDOWS_RUNTIME {
                    manifest.push(ManifestEntry::new(*name, ".", RuntimeLibrary, false));
                }
            }
            Platform::Linux => {
                manifest.push(ManifestEntry::new("libcef.so", ".", CoreLibrary, true));
                for name in LINUX_RUNTIME {
                    manifest.push(ManifestEntry::new(*name, ".", RuntimeLibrary, false));
                }
            }
            Platform::Macos => {
                manifest.push(ManifestEntry::new(
                    format!("{}/**/*", MAC_FRAMEWORK),
                    MAC_FRAMEWORK,
                    CoreLibrary,
                    true,
                ));
                return manifest;
            }
        }
        manifest.push(ManifestEntry::new("*.pak", ".", Resource, false));
        manifest.push(ManifestEntry::new("*.bin", ".", Resource, false));
        manifest.push(ManifestEntry::new("icudtl.dat", ".", Resource, false));
        manifest.push(ManifestEntry::new("locales/*.pak", "locales", Locale, false));
        manifest
    }

    /// Copy a whole tree
    pub fn mirror() -> Self {
        let mut manifest = Self::default();
        manifest.push(ManifestEntry::new("**/*", ".", ArtifactCategory::Resource, true));
        manifest
    }
}
