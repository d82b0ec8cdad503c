//! GUI-solution integration workflow
//!
//! Builds the consuming application's solution against the freshly deployed
//! framework, then redeploys: the whole output directory into the
//! application's CEF binary directory and the runtime subset next to the
//! application executable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cef_version::Platform;

use crate::config::{BuildConfiguration, MfcSettings};
use crate::deploy::{ArtifactCollector, CollectionError, CollectionReport, DeploymentManifest};
use crate::native::{BuildDriver, BuildError, BuildOutcome, BuildRequest, Builder};
use crate::process::CommandRunner;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("solution not found: {0}")]
    SolutionMissing(PathBuf),

    #[error("deployed output directory not found: {0}")]
    OutputMissing(PathBuf),

    #[error("solution build failed: {0}")]
    Build(#[from] BuildError),

    #[error("redeploy failed: {0}")]
    Redeploy(#[from] CollectionError),
}

/// What the redeploy step copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeployReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cef_binary_dir: Option<CollectionReport>,
    pub binary_dir: CollectionReport,
}

/// Resolved integration targets; only exists when the settings are complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationPlan {
    pub solution: PathBuf,
    pub binary_dir: PathBuf,
    pub cef_binary_dir: Option<PathBuf>,
}

impl IntegrationPlan {
    /// None when integration is disabled or its paths are unset
    pub fn from_config(config: &BuildConfiguration) -> Option<Self> {
        let mfc: &MfcSettings = config.mfc.as_ref()?;
        if !mfc.is_configured() {
            return None;
        }
        Some(Self {
            solution: mfc.solution_path.clone()?,
            binary_dir: mfc.binary_dir.clone()?,
            cef_binary_dir: mfc.cef_binary_dir.clone(),
        })
    }
}

pub struct SolutionIntegrator {
    builder: Builder,
    platform: Platform,
}

impl SolutionIntegrator {
    pub fn new(runner: Arc<dyn CommandRunner>, driver: BuildDriver, platform: Platform) -> Self {
        Self {
            builder: Builder::new(runner, driver),
            platform,
        }
    }

    /// Build every target of the application solution
    pub fn build_solution(
        &self,
        plan: &IntegrationPlan,
        config: &BuildConfiguration,
        dry_run: bool,
    ) -> Result<BuildOutcome, IntegrationError> {
        if !plan.solution.exists() {
            return Err(IntegrationError::SolutionMissing(plan.solution.clone()));
        }
        let request = BuildRequest {
            project: plan.solution.clone(),
            target: None,
            configuration: config.build_type,
            architecture: config.target.architecture,
            parallel: true,
        };
        Ok(self.builder.build(&request, dry_run)?)
    }

    /// Copy the deployed output into the application's directories
    pub fn redeploy(
        &self,
        plan: &IntegrationPlan,
        output_dir: &Path,
        dry_run: bool,
    ) -> Result<RedeployReport, IntegrationError> {
        if !output_dir.is_dir() {
            return Err(IntegrationError::OutputMissing(output_dir.to_path_buf()));
        }
        let roots = vec![output_dir.to_path_buf()];

        let cef_binary_dir = match &plan.cef_binary_dir {
            Some(dest) => Some(
                ArtifactCollector::new(roots.clone(), dest)
                    .collect(&DeploymentManifest::mirror(), dry_run)?,
            ),
            None => None,
        };
        let binary_dir = ArtifactCollector::new(roots, &plan.binary_dir)
            .collect(&DeploymentManifest::runtime_subset(self.platform), dry_run)?;

        tracing::info!(
            binary_dir = %plan.binary_dir.display(),
            files = binary_dir.copied,
            "application runtime redeployed"
        );
        Ok(RedeployReport {
            cef_binary_dir,
            binary_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectiveConfig;
    use crate::mock::MockRunner;
    use std::fs;
    use tempfile::TempDir;

    const VERSION: &str = "120.1.10+g3ce3184+chromium-120.0.6099.129";

    fn config(root: &Path, mfc: serde_json::Value) -> BuildConfiguration {
        let mut cli = serde_json::json!({"cef_version": VERSION});
        if let (Some(obj), Some(extra)) = (cli.as_object_mut(), mfc.as_object()) {
            obj.extend(extra.clone());
        }
        let effective = EffectiveConfig::build(None, Some(cli)).unwrap();
        BuildConfiguration::from_effective(&effective, root).unwrap()
    }

    fn deployed(dir: &Path) {
        for file in ["libcef.dll", "libcef_dll_wrapper.lib", "cef.pak", "icudtl.dat", "locales/en-US.pak", "include/cef_app.h"] {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, file).unwrap();
        }
    }

    #[test]
    fn test_plan_requires_enabled_and_paths() {
        let temp = TempDir::new().unwrap();
        assert!(IntegrationPlan::from_config(&config(temp.path(), serde_json::json!({}))).is_none());
        assert!(IntegrationPlan::from_config(&config(
            temp.path(),
            serde_json::json!({"enable_mfc_integration": true, "mfc_solution_path": "app.sln"})
        ))
        .is_none());

        let plan = IntegrationPlan::from_config(&config(
            temp.path(),
            serde_json::json!({
                "enable_mfc_integration": true,
                "mfc_solution_path": "app.sln",
                "mfc_binary_dir": "bin"
            }),
        ))
        .unwrap();
        assert_eq!(plan.solution, temp.path().join("app.sln"));
        assert!(plan.cef_binary_dir.is_none());
    }

    #[test]
    fn test_build_solution_uses_all_targets() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("app.sln"), "").unwrap();
        let config = config(
            temp.path(),
            serde_json::json!({
                "enable_mfc_integration": true,
                "mfc_solution_path": "app.sln",
                "mfc_binary_dir": "bin"
            }),
        );
        let plan = IntegrationPlan::from_config(&config).unwrap();
        let runner = Arc::new(MockRunner::new());
        let integrator = SolutionIntegrator::new(
            runner.clone(),
            BuildDriver::MsBuild(PathBuf::from("MSBuild.exe")),
            Platform::Windows,
        );

        let outcome = integrator.build_solution(&plan, &config, false).unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert!(invocations[0].args.iter().all(|a| !a.starts_with("/t:")));
    }

    #[test]
    fn test_missing_solution() {
        let temp = TempDir::new().unwrap();
        let config = config(
            temp.path(),
            serde_json::json!({
                "enable_mfc_integration": true,
                "mfc_solution_path": "missing.sln",
                "mfc_binary_dir": "bin"
            }),
        );
        let plan = IntegrationPlan::from_config(&config).unwrap();
        let integrator = SolutionIntegrator::new(
            Arc::new(MockRunner::new()),
            BuildDriver::MsBuild(PathBuf::from("MSBuild.exe")),
            Platform::Windows,
        );
        assert!(matches!(
            integrator.build_solution(&plan, &config, false),
            Err(IntegrationError::SolutionMissing(_))
        ));
    }

    #[test]
    fn test_redeploy_mirror_and_runtime_subset() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out");
        deployed(&output);
        let plan = IntegrationPlan {
            solution: temp.path().join("app.sln"),
            binary_dir: temp.path().join("app/bin"),
            cef_binary_dir: Some(temp.path().join("app/cef")),
        };
        let integrator = SolutionIntegrator::new(
            Arc::new(MockRunner::new()),
            BuildDriver::MsBuild(PathBuf::from("MSBuild.exe")),
            Platform::Windows,
        );

        let report = integrator.redeploy(&plan, &output, false).unwrap();
        assert_eq!(report.cef_binary_dir.as_ref().unwrap().copied, 6);
        assert!(temp.path().join("app/cef/include/cef_app.h").is_file());

        let bin = temp.path().join("app/bin");
        assert!(bin.join("libcef.dll").is_file());
        assert!(bin.join("locales/en-US.pak").is_file());
        assert!(!bin.join("include").exists());
        assert!(!bin.join("libcef_dll_wrapper.lib").exists());
    }

    #[test]
    fn test_redeploy_dry_run_copies_nothing() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out");
        deployed(&output);
        let plan = IntegrationPlan {
            solution: temp.path().join("app.sln"),
            binary_dir: temp.path().join("app/bin"),
            cef_binary_dir: None,
        };
        let integrator = SolutionIntegrator::new(
            Arc::new(MockRunner::new()),
            BuildDriver::MsBuild(PathBuf::from("MSBuild.exe")),
            Platform::Windows,
        );
        let report = integrator.redeploy(&plan, &output, true).unwrap();
        assert!(report.binary_dir.copied > 0);
        assert!(!temp.path().join("app").exists());
    }
}
