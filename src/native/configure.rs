//! CMake configure step and generator auto-detection

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cef_version::{Platform, PlatformTarget};

use crate::config::BuildType;
use crate::process::{CommandRunner, Invocation, RunnerError};

/// Visual Studio generators in preference order, with the vswhere version range of each
pub const VS_GENERATORS: &[(&str, &str)] = &[
    ("Visual Studio 17 2022", "[17.0,18.0)"),
    ("Visual Studio 16 2019", "[16.0,17.0)"),
    ("Visual Studio 15 2017", "[15.0,16.0)"),
    ("Visual Studio 14 2015", "[14.0,15.0)"),
];

/// Used when no Visual Studio installation answers
pub const FALLBACK_VS_GENERATOR: &str = "Visual Studio 17 2022";

/// Generator for non-Windows hosts
pub const UNIX_GENERATOR: &str = "Unix Makefiles";

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error(transparent)]
    Launch(#[from] RunnerError),

    #[error("cmake configure exited with code {exit_code}: {tail}")]
    Failed { exit_code: i32, tail: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn is_visual_studio(generator: &str) -> bool {
    generator.starts_with("Visual Studio")
}

/// Generators that take `--config` at build time instead of CMAKE_BUILD_TYPE
pub fn is_multi_config(generator: &str) -> bool {
    is_visual_studio(generator) || generator == "Xcode" || generator == "Ninja Multi-Config"
}

/// What the configure step ran (or would run)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureOutcome {
    pub generator: String,
    pub command: String,
    /// None under dry-run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Runs `cmake -S -B -G` for one CMake executable
pub struct ProjectConfigurer {
    runner: Arc<dyn CommandRunner>,
    cmake: PathBuf,
    vswhere: PathBuf,
}

impl ProjectConfigurer {
    pub fn new(runner: Arc<dyn CommandRunner>, cmake: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            cmake: cmake.into(),
            vswhere: super::vswhere_path(),
        }
    }

    pub fn with_vswhere(mut self, vswhere: impl Into<PathBuf>) -> Self {
        self.vswhere = vswhere.into();
        self
    }

    /// Newest installed Visual Studio generator on Windows, Unix Makefiles elsewhere
    pub fn detect_generator(&self, platform: Platform) -> String {
        if platform != Platform::Windows {
            return UNIX_GENERATOR.to_string();
        }
        for (generator, range) in VS_GENERATORS {
            let probe = Invocation::new(&self.vswhere).args([
                "-version",
                range,
                "-property",
                "installationPath",
            ]);
            match self.runner.run(&probe) {
                Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
                    tracing::info!(generator, "detected Visual Studio");
                    return generator.to_string();
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "vswhere unavailable");
                    break;
                }
            }
        }
        tracing::warn!(generator = FALLBACK_VS_GENERATOR, "no Visual Studio detected, using default");
        FALLBACK_VS_GENERATOR.to_string()
    }

    /// Build the configure command line
    pub fn invocation(
        &self,
        source_dir: &Path,
        build_dir: &Path,
        generator: &str,
        target: PlatformTarget,
        build_type: BuildType,
    ) -> Invocation {
        let mut invocation = Invocation::new(&self.cmake)
            .arg("-S")
            .arg_path(source_dir)
            .arg("-B")
            .arg_path(build_dir)
            .arg("-G")
            .arg(generator);
        if is_visual_studio(generator) {
            invocation = invocation
                .arg("-A")
                .arg(target.architecture.msbuild_platform());
        }
        if !is_multi_config(generator) {
            invocation = invocation.arg(format!("-DCMAKE_BUILD_TYPE={}", build_type.as_str()));
        }
        invocation.current_dir(build_dir)
    }

    /// Configure `source_dir` into `build_dir`; a non-zero exit is an error
    pub fn configure(
        &self,
        source_dir: &Path,
        build_dir: &Path,
        generator: Option<&str>,
        target: PlatformTarget,
        build_type: BuildType,
        dry_run: bool,
    ) -> Result<ConfigureOutcome, ConfigureError> {
        let generator = match generator {
            Some(g) => g.to_string(),
            None => self.detect_generator(target.platform),
        };
        let invocation = self.invocation(source_dir, build_dir, &generator, target, build_type);
        let command = invocation.to_string();

        if dry_run {
            tracing::info!(command = %command, "[dry-run] would configure");
            return Ok(ConfigureOutcome {
                generator,
                command,
                exit_code: None,
            });
        }

        fs::create_dir_all(build_dir).map_err(|source| ConfigureError::Io {
            path: build_dir.to_path_buf(),
            source,
        })?;
        tracing::info!(command = %command, "configuring");
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(ConfigureError::Failed {
                exit_code: output.exit_code,
                tail: output.tail_line().unwrap_or_default().to_string(),
            });
        }
        Ok(ConfigureOutcome {
            generator,
            command,
            exit_code: Some(output.exit_code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;
    use crate::process::CommandOutput;
    use cef_version::Architecture;
    use tempfile::TempDir;

    const WIN64: PlatformTarget = PlatformTarget {
        platform: Platform::Windows,
        architecture: Architecture::X64,
    };

    #[test]
    fn test_detects_newest_installed_vs() {
        let runner = Arc::new(MockRunner::new());
        runner.stdout("[16.0,17.0)", "C:\\VS\\2019\n");
        let configurer = ProjectConfigurer::new(runner.clone(), "cmake").with_vswhere("vswhere.exe");

        assert_eq!(configurer.detect_generator(Platform::Windows), "Visual Studio 16 2019");
        // 2022 probed first, then 2019
        assert_eq!(runner.calls_matching("vswhere.exe"), 2);
    }

    #[test]
    fn test_falls_back_without_vswhere() {
        let runner = Arc::new(MockRunner::new());
        runner.missing("vswhere");
        let configurer = ProjectConfigurer::new(runner.clone(), "cmake").with_vswhere("vswhere.exe");
        assert_eq!(configurer.detect_generator(Platform::Windows), FALLBACK_VS_GENERATOR);
        assert_eq!(configurer.detect_generator(Platform::Linux), UNIX_GENERATOR);
    }

    #[test]
    fn test_invocation_flags() {
        let runner = Arc::new(MockRunner::new());
        let configurer = ProjectConfigurer::new(runner, "cmake");
        let vs = configurer.invocation(
            Path::new("/src"),
            Path::new("/build"),
            "Visual Studio 17 2022",
            WIN64,
            BuildType::Release,
        );
        assert_eq!(vs.args, ["-S", "/src", "-B", "/build", "-G", "Visual Studio 17 2022", "-A", "x64"]);

        let make = configurer.invocation(
            Path::new("/src"),
            Path::new("/build"),
            UNIX_GENERATOR,
            PlatformTarget::new(Platform::Linux, Architecture::X64),
            BuildType::Debug,
        );
        assert!(make.args.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
        assert!(!make.args.contains(&"-A".to_string()));
    }

    #[test]
    fn test_configure_failure_carries_tail() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        runner.respond(
            "-S",
            CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "CMake Error: could not find compiler\n".into(),
            },
        );
        let configurer = ProjectConfigurer::new(runner, "cmake");
        let err = configurer
            .configure(temp.path(), &temp.path().join("b"), Some(UNIX_GENERATOR), WIN64, BuildType::Release, false)
            .unwrap_err();
        match err {
            ConfigureError::Failed { exit_code, tail } => {
                assert_eq!(exit_code, 1);
                assert!(tail.contains("could not find compiler"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_runs_nothing() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new());
        let configurer = ProjectConfigurer::new(runner.clone(), "cmake");
        let build = temp.path().join("build");
        let outcome = configurer
            .configure(temp.path(), &build, Some("Visual Studio 17 2022"), WIN64, BuildType::Release, true)
            .unwrap();
        assert!(outcome.exit_code.is_none());
        assert!(outcome.command.contains("-A x64"));
        assert!(runner.invocations().is_empty());
        assert!(!build.exists());
    }
}
