//! Shared fixtures for the orchestrator tests
//!
//! A `Workspace` is a temporary workspace root plus the scripted HTTP client
//! and command runner the orchestrator is wired to. Distribution archives
//! are built on the fly and served at their CDN URL.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

use cef_archive::ArchiveKind;
use cef_lane::config::{BuildConfiguration, EffectiveConfig, PathOverrides, RunPaths};
use cef_lane::detect::header::fake;
use cef_lane::download::{archive_kind, cdn_url, distribution_dir_name, RetryPolicy, CDN_BASE_URL};
use cef_lane::mock::{MockHttp, MockRunner};
use cef_lane::pipeline::{Endpoints, Orchestrator, RunOptions, RunOutcome};
use cef_lane::state::{PhaseName, PhaseState, WorkflowName};
use cef_lane::RunReport;
use cef_version::{Architecture, Platform, PlatformTarget, VersionDescriptor};

pub const VERSION: &str = "120.1.10+g3ce3184+chromium-120.0.6099.129";
pub const OLD_VERSION: &str = "119.4.7+g55e15c8+chromium-119.0.6045.199";

pub const LINUX64: PlatformTarget = PlatformTarget {
    platform: Platform::Linux,
    architecture: Architecture::X64,
};

pub const WINDOWS64: PlatformTarget = PlatformTarget {
    platform: Platform::Windows,
    architecture: Architecture::X64,
};

pub fn version(s: &str) -> VersionDescriptor {
    VersionDescriptor::parse(s).unwrap()
}

fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Lay out a minimal binary distribution for `platform` under `root`
pub fn distribution_tree(root: &Path, version: &str, platform: Platform) {
    write(&root.join("README.txt"), format!("CEF Version:       {}\n", version).as_bytes());
    write(&root.join("CMakeLists.txt"), b"project(cef)\n");
    write(&root.join("include/cef_version.h"), b"// generated\n");
    let core = match platform {
        Platform::Windows => "Release/libcef.dll",
        Platform::Linux => "Release/libcef.so",
        Platform::Macos => "Release/Chromium Embedded Framework.framework/Chromium Embedded Framework",
    };
    write(&root.join(core), &fake::header(platform, Architecture::X64));
    match platform {
        Platform::Macos => {
            let resources = "Release/Chromium Embedded Framework.framework/Resources";
            write(&root.join(resources).join("resources.pak"), b"pak");
            write(&root.join(resources).join("en.lproj/locale.pak"), b"pak");
        }
        _ => {
            write(&root.join("Resources/resources.pak"), b"pak");
            write(&root.join("Resources/icudtl.dat"), b"icu");
            write(&root.join("Resources/locales/en-US.pak"), b"pak");
        }
    }
}

/// Bytes of a distribution archive in the platform's CDN format
pub fn distribution_archive(scratch: &Path, version: &str, target: PlatformTarget) -> Vec<u8> {
    let descriptor = self::version(version);
    let dir_name = distribution_dir_name(&descriptor, target);
    let tree = scratch.join(format!("tree-{}", target.cdn_name()));
    distribution_tree(&tree, version, target.platform);
    let kind: ArchiveKind = archive_kind(target.platform);
    let archive = scratch.join(format!("dist.{}", kind.extension()));
    cef_archive::create(kind, &tree, &dir_name, &archive).unwrap();
    let bytes = fs::read(&archive).unwrap();
    fs::remove_dir_all(&tree).unwrap();
    fs::remove_file(&archive).unwrap();
    bytes
}

/// Relative path -> size of every file under `root`, skipping `exclude`
pub fn snapshot(root: &Path, exclude: &Path) -> BTreeMap<PathBuf, u64> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && !e.path().starts_with(exclude))
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, e.metadata().unwrap().len())
        })
        .collect()
}

pub struct Workspace {
    pub temp: TempDir,
    pub http: Arc<MockHttp>,
    pub runner: Arc<MockRunner>,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            http: Arc::new(MockHttp::new()),
            runner: Arc::new(MockRunner::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn install_dir(&self) -> PathBuf {
        self.root().join("app/cef")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Configuration for `platform` with everything under the workspace root
    pub fn config(&self, platform: &str, extra: Value) -> BuildConfiguration {
        let mut cli = json!({
            "cef_version": VERSION,
            "platform": platform,
            "temp_directory": "work",
            "output_directory": "out",
        });
        if let (Some(obj), Some(extra)) = (cli.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        let effective = EffectiveConfig::build(None, Some(cli)).unwrap();
        BuildConfiguration::from_effective(&effective, self.root()).unwrap()
    }

    pub fn paths(&self, config: &BuildConfiguration, cmake: Option<PathBuf>) -> RunPaths {
        let overrides = PathOverrides {
            install_dir: Some(self.install_dir()),
            cmake_path: cmake,
            ..Default::default()
        };
        RunPaths::resolve(config, &overrides, self.root())
    }

    /// Like [`Workspace::paths`], detecting the installation bundled in `app`
    pub fn app_paths(&self, config: &BuildConfiguration, app: &Path) -> RunPaths {
        let overrides = PathOverrides {
            install_dir: Some(self.install_dir()),
            app_path: Some(app.to_path_buf()),
            ..Default::default()
        };
        RunPaths::resolve(config, &overrides, self.root())
    }

    pub fn orchestrator(
        &self,
        config: BuildConfiguration,
        paths: RunPaths,
        options: RunOptions,
    ) -> Orchestrator {
        let endpoints = Endpoints {
            retry: RetryPolicy::immediate(2),
            vswhere: self.root().join("no-vswhere.exe"),
            ..Endpoints::default()
        };
        Orchestrator::new(config, paths, options, self.http.clone(), self.runner.clone())
            .with_endpoints(endpoints)
    }

    /// Serve a distribution of `version` at its CDN URL; returns the URL
    pub fn serve_distribution(&self, version: &str, target: PlatformTarget) -> String {
        let scratch = self.root().join(".fixtures");
        fs::create_dir_all(&scratch).unwrap();
        let bytes = distribution_archive(&scratch, version, target);
        fs::remove_dir_all(&scratch).unwrap();
        let url = cdn_url(CDN_BASE_URL, &self::version(version), target);
        self.http.serve(url.clone(), bytes);
        url
    }

    /// An existing installation at the install dir
    pub fn seed_install(&self, version: &str, platform: Platform) {
        distribution_tree(&self.install_dir(), version, platform);
    }

    /// A CMake executable the build workflow can be pointed at
    pub fn fake_cmake(&self) -> PathBuf {
        let path = self.root().join("tools/cmake");
        write(&path, b"#!/bin/sh\n");
        path
    }
}

pub fn run(orchestrator: &Orchestrator) -> RunOutcome {
    orchestrator.run(&mut |_, _| {}).unwrap()
}

pub fn phase_state(report: &RunReport, workflow: WorkflowName, phase: PhaseName) -> PhaseState {
    report
        .workflow(workflow)
        .and_then(|w| w.phase(phase))
        .map(|p| p.state)
        .unwrap()
}

pub fn all_skipped(report: &RunReport, workflow: WorkflowName) -> bool {
    report
        .workflow(workflow)
        .unwrap()
        .phases
        .iter()
        .all(|p| p.state == PhaseState::Skipped)
}
