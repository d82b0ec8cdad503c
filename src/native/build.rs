//! Build driver invocation (MSBuild on Windows, `cmake --build` elsewhere)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cef_version::Architecture;

use crate::config::BuildType;
use crate::process::{CommandRunner, Invocation, RunnerError};

/// Well-known MSBuild locations, newest first
const KNOWN_MSBUILD: &[&str] = &[
    r"C:\Program Files\Microsoft Visual Studio\2022\Community\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\Professional\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Community\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Professional\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
];

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("MSBuild not found; install Visual Studio or pass its path")]
    DriverNotFound,

    #[error(transparent)]
    Launch(#[from] RunnerError),

    #[error("build of {project} exited with code {exit_code}: {tail}")]
    Failed {
        project: PathBuf,
        exit_code: i32,
        tail: String,
    },
}

/// Locate MSBuild: explicit path, then vswhere, then the well-known install paths
pub fn locate_msbuild(
    runner: &dyn CommandRunner,
    vswhere: &Path,
    explicit: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| p.is_file()) {
        return Some(path.to_path_buf());
    }

    let probe = Invocation::new(vswhere).args([
        "-latest",
        "-requires",
        "Microsoft.Component.MSBuild",
        "-find",
        r"MSBuild\**\Bin\MSBuild.exe",
    ]);
    match runner.run(&probe) {
        Ok(out) if out.success() => {
            if let Some(found) = out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(PathBuf::from)
                .find(|p| p.is_file())
            {
                return Some(found);
            }
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "vswhere unavailable"),
    }

    KNOWN_MSBUILD
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// The tool that drives a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", content = "path", rename_all = "snake_case")]
pub enum BuildDriver {
    MsBuild(PathBuf),
    CMake(PathBuf),
}

/// One build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Solution/project for MSBuild, build directory for CMake
    pub project: PathBuf,
    /// None builds everything
    pub target: Option<String>,
    pub configuration: BuildType,
    pub architecture: Architecture,
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub command: String,
    /// None under dry-run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Runs one build driver
pub struct Builder {
    runner: Arc<dyn CommandRunner>,
    driver: BuildDriver,
}

impl Builder {
    pub fn new(runner: Arc<dyn CommandRunner>, driver: BuildDriver) -> Self {
        Self { runner, driver }
    }

    pub fn driver(&self) -> &BuildDriver {
        &self.driver
    }

    pub fn invocation(&self, request: &BuildRequest) -> Invocation {
        match &self.driver {
            BuildDriver::MsBuild(msbuild) => {
                let mut inv = Invocation::new(msbuild)
                    .arg_path(&request.project)
                    .arg(format!("/p:Configuration={}", request.configuration.as_str()))
                    .arg(format!("/p:Platform={}", request.architecture.msbuild_platform()));
                if request.parallel {
                    inv = inv.arg("/m");
                }
                inv = inv.arg("/v:minimal");
                if let Some(target) = &request.target {
                    inv = inv.arg(format!("/t:{}", target));
                }
                inv
            }
            BuildDriver::CMake(cmake) => {
                let mut inv = Invocation::new(cmake)
                    .arg("--build")
                    .arg_path(&request.project)
                    .arg("--config")
                    .arg(request.configuration.as_str());
                if let Some(target) = &request.target {
                    inv = inv.arg("--target").arg(target.as_str());
                }
                if request.parallel {
                    inv = inv.arg("--parallel");
                }
                inv
            }
        }
    }

    /// Run the build; output lands in the transcript through the runner
    pub fn build(&self, request: &BuildRequest, dry_run: bool) -> Result<BuildOutcome, BuildError> {
        let invocation = self.invocation(request);
        let command = invocation.to_string();
        if dry_run {
            tracing::info!(command = %command, "[dry-run] would build");
            return Ok(BuildOutcome {
                command,
                exit_code: None,
            });
        }

        tracing::info!(command = %command, "building");
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(BuildError::Failed {
                project: request.project.clone(),
                exit_code: output.exit_code,
                tail: output.tail_line().unwrap_or_default().to_string(),
            });
        }
        Ok(BuildOutcome {
            command,
            exit_code: Some(output.exit_code),
        })
    }
}
