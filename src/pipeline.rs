//! Phase orchestration
//!
//! One run = the security preflight followed by up to three workflows:
//! - acquire: detect, back up, download, install, verify
//! - build: provision CMake, configure, mutate the wrapper project, build, collect
//! - integrate: build the application solution, redeploy its runtime
//!
//! Phases run sequentially; each records its transition in the workflow
//! record and the run log. A fatal phase failure skips the rest of its
//! workflow, and workflows that depend on it are skipped in turn. A
//! security abort skips everything.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use ulid::Ulid;

use crate::backup::{BackupError, BackupManager};
use crate::config::{BuildConfiguration, RunPaths};
use crate::deploy::{source_roots, ArtifactCollector, CollectionError, DeploymentManifest};
use crate::detect::{default_search_roots, InstallationDetector, InstallationRecord};
use crate::download::{DownloadError, Downloader, RetryPolicy, CDN_BASE_URL};
use crate::http::{HttpClient, Progress};
use crate::install::{InstallClearance, InstallError, Installer};
use crate::integration::{IntegrationError, IntegrationPlan, SolutionIntegrator};
use crate::native::{
    is_visual_studio, locate_msbuild, solution_path, vswhere_path, wrapper_project_path,
    BuildDriver, BuildError, BuildRequest, Builder, ConfigureError, MutationError,
    ProjectConfigurer, ProjectMutator, WRAPPER_TARGET,
};
use crate::process::{CommandRunner, TranscriptRunner};
use crate::runlog::{EventLevel, RunLog, RunLogError};
use crate::security::{osv::OSV_QUERY_URL, GateVerdict, VulnerabilityGate};
use crate::state::{PhaseName, PhaseStateError, WorkflowName, WorkflowOutcome, WorkflowRecord};
use crate::summary::{FailureKind, RunReport};
use crate::toolchain::{ToolchainError, ToolchainProvisioner, RELEASE_BASE_URL};
use crate::verify::Verifier;

/// Errors that stop the orchestrator itself (phase failures are recorded, not returned)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("run log: {0}")]
    RunLog(#[from] RunLogError),

    #[error("state error: {0}")]
    State(#[from] PhaseStateError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Operator switches for one run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Decide everything, change nothing
    pub dry_run: bool,
    /// Skip the acquire workflow
    pub skip_download: bool,
    /// Skip the build workflow
    pub skip_build: bool,
}

/// External endpoints and tool locations; tests point these at fixtures
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub osv_query_url: String,
    pub cdn_base_url: String,
    pub cmake_base_url: String,
    pub retry: RetryPolicy,
    pub vswhere: PathBuf,
    /// Explicit MSBuild, skipping discovery
    pub msbuild: Option<PathBuf>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            osv_query_url: OSV_QUERY_URL.to_string(),
            cdn_base_url: CDN_BASE_URL.to_string(),
            cmake_base_url: RELEASE_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            vswhere: vswhere_path(),
            msbuild: None,
        }
    }
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub log_dir: PathBuf,
}

/// A classified phase failure
#[derive(Debug)]
struct PhaseFailure {
    kind: FailureKind,
    message: String,
}

impl PhaseFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn of<E: Classify>(error: E) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Maps a component error onto the failure taxonomy
trait Classify: std::fmt::Display {
    fn kind(&self) -> FailureKind;
}

impl Classify for BackupError {
    fn kind(&self) -> FailureKind {
        FailureKind::BackupFailure
    }
}

impl Classify for DownloadError {
    fn kind(&self) -> FailureKind {
        FailureKind::DownloadFailure
    }
}

impl Classify for InstallError {
    fn kind(&self) -> FailureKind {
        match self {
            InstallError::UnsupportedArchive(_) => FailureKind::UnsupportedArchive,
            _ => FailureKind::ExtractionFailure,
        }
    }
}

impl Classify for ToolchainError {
    fn kind(&self) -> FailureKind {
        FailureKind::ToolchainProvisionFailure
    }
}

impl Classify for ConfigureError {
    fn kind(&self) -> FailureKind {
        FailureKind::ConfigurationFailure
    }
}

impl Classify for MutationError {
    fn kind(&self) -> FailureKind {
        match self {
            MutationError::TargetNotFound { .. } => FailureKind::MutationTargetNotFound,
            // The project file is configure output
            MutationError::Xml { .. } | MutationError::Io { .. } => FailureKind::ConfigurationFailure,
        }
    }
}

impl Classify for BuildError {
    fn kind(&self) -> FailureKind {
        FailureKind::BuildFailure
    }
}

impl Classify for CollectionError {
    fn kind(&self) -> FailureKind {
        FailureKind::CollectionFailure
    }
}

impl Classify for IntegrationError {
    fn kind(&self) -> FailureKind {
        FailureKind::IntegrationFailure
    }
}

/// Cross-phase state of one run
struct RunContext<'a> {
    log: Arc<RunLog>,
    runner: Arc<dyn CommandRunner>,
    report: RunReport,
    progress: &'a mut dyn FnMut(PhaseName, Progress),
    clearance: InstallClearance,
    /// Framework tree produced by the acquire workflow
    framework_root: Option<PathBuf>,
    cmake: Option<PathBuf>,
    msbuild: Option<PathBuf>,
}

impl RunContext<'_> {
    fn event(&self, level: EventLevel, phase: Option<PhaseName>, message: &str, data: Option<serde_json::Value>) {
        if let Err(e) = self.log.event(level, phase, message, data) {
            tracing::warn!(error = %e, "failed to append run event");
        }
    }
}

/// Sequences phases for one configuration
pub struct Orchestrator {
    config: BuildConfiguration,
    paths: RunPaths,
    options: RunOptions,
    http: Arc<dyn HttpClient>,
    runner: Arc<dyn CommandRunner>,
    endpoints: Endpoints,
}

impl Orchestrator {
    pub fn new(
        config: BuildConfiguration,
        paths: RunPaths,
        options: RunOptions,
        http: Arc<dyn HttpClient>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            paths,
            options,
            http,
            runner,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Execute the run; `progress` receives transfer progress of downloads
    pub fn run(&self, progress: &mut dyn FnMut(PhaseName, Progress)) -> PipelineResult<RunOutcome> {
        let log = Arc::new(RunLog::create(&self.paths.log_dir)?);
        let runner: Arc<dyn CommandRunner> =
            Arc::new(TranscriptRunner::new(self.runner.clone(), log.clone()));
        let report = RunReport::new(
            Ulid::new().to_string(),
            self.config.version.to_string(),
            self.config.target.cdn_name(),
            self.options.dry_run,
        );

        let mut ctx = RunContext {
            log: log.clone(),
            runner,
            report,
            progress,
            clearance: InstallClearance::fresh(),
            framework_root: None,
            cmake: None,
            msbuild: None,
        };
        ctx.event(
            EventLevel::Info,
            None,
            "run started",
            Some(json!({
                "run_id": ctx.report.run_id,
                "version": ctx.report.version,
                "target": ctx.report.target,
                "dry_run": self.options.dry_run,
                "paths": self.paths,
            })),
        );
        tracing::info!(
            run_id = %ctx.report.run_id,
            version = %ctx.report.version,
            dry_run = self.options.dry_run,
            log_dir = %log.dir().display(),
            "run started"
        );

        let plan = IntegrationPlan::from_config(&self.config);
        let requested = !self.options.skip_download || !self.options.skip_build || plan.is_some();

        let mut preflight = WorkflowRecord::new(WorkflowName::Preflight);
        if requested {
            self.run_phase(&mut ctx, &mut preflight, PhaseName::SecurityGate, |ctx| {
                self.security_gate(ctx)
            })?;
        } else {
            preflight.skip_remaining("no workflow requested")?;
        }
        let aborted = preflight.outcome() == WorkflowOutcome::Failed;
        ctx.report.workflows.push(preflight);

        let mut acquire = WorkflowRecord::new(WorkflowName::Acquire);
        if aborted {
            acquire.skip_remaining("security gate aborted the run")?;
        } else if self.options.skip_download {
            acquire.skip_remaining("--skip-download")?;
        } else {
            self.acquire(&mut ctx, &mut acquire)?;
        }
        let acquire_failed = acquire.outcome() == WorkflowOutcome::Failed;
        ctx.report.workflows.push(acquire);

        let mut build = WorkflowRecord::new(WorkflowName::Build);
        if aborted {
            build.skip_remaining("security gate aborted the run")?;
        } else if self.options.skip_build {
            build.skip_remaining("--skip-build")?;
        } else if acquire_failed {
            build.skip_remaining("acquire workflow failed")?;
        } else {
            self.build(&mut ctx, &mut build)?;
        }
        let build_failed = build.outcome() == WorkflowOutcome::Failed;
        ctx.report.workflows.push(build);

        let mut integrate = WorkflowRecord::new(WorkflowName::Integrate);
        match &plan {
            _ if aborted => integrate.skip_remaining("security gate aborted the run")?,
            None => integrate.skip_remaining("application integration not configured")?,
            Some(_) if acquire_failed || build_failed => {
                integrate.skip_remaining("prerequisite workflow failed")?
            }
            Some(plan) => self.integrate(&mut ctx, &mut integrate, plan)?,
        }
        ctx.report.workflows.push(integrate);

        ctx.report.finish();
        ctx.event(
            if ctx.report.status.is_failure() {
                EventLevel::Error
            } else {
                EventLevel::Info
            },
            None,
            "run finished",
            Some(json!({
                "status": ctx.report.status,
                "exit_code": ctx.report.exit_code,
                "failure": ctx.report.failure,
            })),
        );
        if let Err(e) = log.write_summary(&ctx.report) {
            tracing::warn!(error = %e, "failed to write run summary");
        }
        tracing::info!(status = ?ctx.report.status, exit_code = ctx.report.exit_code, "run finished");

        Ok(RunOutcome {
            report: ctx.report,
            log_dir: log.dir().to_path_buf(),
        })
    }

    /// Drive one phase through its transitions; None when it did not complete
    fn run_phase<'a, T>(
        &self,
        ctx: &mut RunContext<'a>,
        workflow: &mut WorkflowRecord,
        name: PhaseName,
        body: impl FnOnce(&mut RunContext<'a>) -> Result<(T, String), PhaseFailure>,
    ) -> PipelineResult<Option<T>> {
        workflow.start(name)?;
        ctx.event(EventLevel::Info, Some(name), "phase started", None);
        tracing::info!(phase = %name, "phase started");

        match body(ctx) {
            Ok((value, detail)) => {
                ctx.event(
                    EventLevel::Info,
                    Some(name),
                    "phase completed",
                    Some(json!({ "detail": detail })),
                );
                tracing::info!(phase = %name, %detail, "phase completed");
                workflow.complete(name, Some(detail))?;
                Ok(Some(value))
            }
            Err(failure) => {
                let level = if failure.kind.is_fatal() {
                    EventLevel::Error
                } else {
                    EventLevel::Warn
                };
                ctx.event(
                    level,
                    Some(name),
                    "phase failed",
                    Some(json!({ "kind": failure.kind, "error": failure.message })),
                );
                if failure.kind.is_fatal() {
                    tracing::error!(phase = %name, kind = ?failure.kind, error = %failure.message, "phase failed");
                } else {
                    tracing::warn!(phase = %name, kind = ?failure.kind, error = %failure.message, "phase reported a problem");
                }
                workflow.fail(name, failure.kind, failure.message)?;
                Ok(None)
            }
        }
    }

    fn security_gate(&self, ctx: &mut RunContext<'_>) -> Result<((), String), PhaseFailure> {
        let gate = VulnerabilityGate::with_endpoint(self.http.clone(), self.endpoints.osv_query_url.clone());
        match gate.check(&self.config.version) {
            Ok(verdict) => {
                let detail = match &verdict {
                    GateVerdict::Clean(_) => "no known vulnerabilities".to_string(),
                    GateVerdict::Advisory(report) => {
                        let ids: Vec<&str> = report.findings.iter().map(|f| f.id.as_str()).collect();
                        let message = format!(
                            "{} medium/low vulnerabilit{} reported: {}",
                            ids.len(),
                            if ids.len() == 1 { "y" } else { "ies" },
                            ids.join(", ")
                        );
                        ctx.report.warn(message.clone());
                        message
                    }
                    GateVerdict::Unavailable { reason } => {
                        let message = format!(
                            "vulnerability check unavailable ({}); operator review required",
                            reason
                        );
                        ctx.report.warn(message.clone());
                        message
                    }
                };
                ctx.report.vulnerabilities = verdict.report().cloned();
                Ok(((), detail))
            }
            Err(abort) => {
                let message = abort.to_string();
                ctx.report.vulnerabilities = Some(abort.report);
                Err(PhaseFailure::new(FailureKind::SecurityAbort, message))
            }
        }
    }

    /// Installations to archive before anything is replaced.
    ///
    /// The installer replaces the install target whole, so a framework found
    /// inside it is archived from the target root. A framework detected under
    /// `--app-path` is archived as found and never replaced.
    fn backup_roots(&self, detected: Option<&InstallationRecord>) -> Vec<InstallationRecord> {
        let install_dir = &self.paths.install_dir;
        let mut found: Vec<InstallationRecord> = detected.filter(|r| r.found).cloned().into_iter().collect();
        if self.paths.app_path.is_some() {
            let target = InstallationDetector::new(self.config.target.platform).detect(install_dir);
            if target.found {
                found.push(target);
            }
        }

        let mut roots: Vec<InstallationRecord> = Vec::new();
        for mut record in found {
            if record.root_path.starts_with(install_dir) {
                record.root_path = install_dir.clone();
            }
            if !roots.iter().any(|r| record.root_path.starts_with(&r.root_path)) {
                roots.push(record);
            }
        }
        roots
    }

    fn acquire(&self, ctx: &mut RunContext<'_>, wf: &mut WorkflowRecord) -> PipelineResult<()> {
        let platform = self.config.target.platform;
        let dry_run = self.options.dry_run;
        let install_dir = self.paths.install_dir.clone();

        self.run_phase(ctx, wf, PhaseName::Detect, |ctx| {
            let detector = InstallationDetector::new(platform);
            let record = detector.try_detect(self.paths.detect_root()).map_err(|e| {
                PhaseFailure::new(
                    FailureKind::DetectionFailure,
                    format!("{}; treating as not installed", e),
                )
            })?;
            let mut detail = record.describe();
            if !record.found && self.paths.system_scan {
                if let Some(other) = detector.scan(&default_search_roots(platform)) {
                    detail.push_str(&format!("; also found {}", other.describe()));
                }
            }
            ctx.report.detected = Some(record);
            Ok(((), detail))
        })?;

        let backed_up = self.run_phase(ctx, wf, PhaseName::Backup, |ctx| {
            ctx.clearance = InstallClearance::fresh();
            let protect = self.backup_roots(ctx.report.detected.as_ref());
            if protect.is_empty() {
                return Ok(((), "nothing to back up".to_string()));
            }
            let manager = BackupManager::new(&self.paths.backup_dir);
            let mut details = Vec::new();
            for record in &protect {
                let Some(archive) = manager.backup(record, dry_run).map_err(PhaseFailure::of)? else {
                    continue;
                };
                if archive.simulated {
                    details.push(format!("[dry-run] would write {}", archive.archive_path.display()));
                } else {
                    ctx.report.restore.push(archive.restore_instructions());
                    details.push(format!("{} ({} bytes)", archive.archive_path.display(), archive.size_bytes));
                }
                let clearance = InstallClearance::backed_up(&archive);
                if clearance.covers(&install_dir) {
                    ctx.clearance = clearance;
                }
                ctx.report.backups.push(archive);
            }
            Ok(((), details.join("; ")))
        })?;
        if backed_up.is_none() {
            return Ok(());
        }

        let Some(artifact) = self.run_phase(ctx, wf, PhaseName::Download, |ctx| {
            let downloader = Downloader::new(self.http.clone())
                .with_base_url(self.endpoints.cdn_base_url.clone())
                .with_retry_policy(self.endpoints.retry);
            let progress = &mut *ctx.progress;
            let artifact = downloader
                .download(
                    &self.config.version,
                    self.config.target,
                    &self.paths.download_dir,
                    dry_run,
                    &mut |p| progress(PhaseName::Download, p),
                )
                .map_err(PhaseFailure::of)?;
            let detail = match (&artifact.local_path, artifact.size_bytes) {
                (Some(path), size) => format!("{} ({} bytes)", path.display(), size.unwrap_or(0)),
                (None, Some(size)) => format!("[dry-run] would fetch {} ({} bytes)", artifact.url, size),
                (None, None) => format!("[dry-run] would fetch {}", artifact.url),
            };
            ctx.report.download = Some(artifact.clone());
            Ok((artifact, detail))
        })?
        else {
            return Ok(());
        };

        let Some(installed) = self.run_phase(ctx, wf, PhaseName::Install, |ctx| {
            let installer = Installer::new(platform, &self.paths.scratch_dir);
            let record = installer
                .install(&artifact, &install_dir, &ctx.clearance, dry_run)
                .map_err(PhaseFailure::of)?;
            let detail = if dry_run {
                format!(
                    "[dry-run] would install CEF {} into {}",
                    self.config.version,
                    install_dir.display()
                )
            } else {
                record.describe()
            };
            if record.found {
                ctx.framework_root = Some(record.root_path.clone());
                ctx.report.installed = Some(record.clone());
            }
            Ok((record, detail))
        })?
        else {
            return Ok(());
        };

        self.run_phase(ctx, wf, PhaseName::Verify, |ctx| {
            if dry_run || !installed.found {
                return Ok(((), format!("[dry-run] would verify {}", install_dir.display())));
            }
            let verification = Verifier::new(platform).verify(&installed.root_path);
            let failed: Vec<String> = verification.failed_items().map(|c| c.item.clone()).collect();
            let passed = verification.passed;
            ctx.report.verification = Some(verification);
            if passed {
                Ok(((), "all checklist items present".to_string()))
            } else {
                Err(PhaseFailure::new(
                    FailureKind::VerificationFailure,
                    format!("missing: {}", failed.join(", ")),
                ))
            }
        })?;
        Ok(())
    }

    fn build(&self, ctx: &mut RunContext<'_>, wf: &mut WorkflowRecord) -> PipelineResult<()> {
        let dry_run = self.options.dry_run;
        let target = self.config.target;
        let build_type = self.config.build_type;
        let build_dir = self.paths.build_dir.clone();
        let source = ctx
            .framework_root
            .clone()
            .unwrap_or_else(|| self.paths.build_source().to_path_buf());

        let Some(cmake) = self.run_phase(ctx, wf, PhaseName::Toolchain, |ctx| {
            let provisioner = ToolchainProvisioner::new(self.http.clone(), &self.paths.cmake_cache_dir)
                .with_base_url(self.endpoints.cmake_base_url.clone())
                .with_retry_policy(self.endpoints.retry);
            let progress = &mut *ctx.progress;
            let tool = provisioner
                .provision(
                    &self.config.cmake_version,
                    target,
                    self.paths.cmake_path.as_deref(),
                    dry_run,
                    &mut |p| progress(PhaseName::Toolchain, p),
                )
                .map_err(PhaseFailure::of)?;
            let detail = format!("CMake {} ({:?}) at {}", tool.version, tool.source, tool.path.display());
            let path = tool.path.clone();
            ctx.report.toolchain = Some(tool);
            ctx.cmake = Some(path.clone());
            Ok((path, detail))
        })?
        else {
            return Ok(());
        };

        let Some(generator) = self.run_phase(ctx, wf, PhaseName::Configure, |ctx| {
            if !dry_run && !source.join("CMakeLists.txt").is_file() {
                return Err(PhaseFailure::new(
                    FailureKind::ConfigurationFailure,
                    format!("no CMakeLists.txt in {}", source.display()),
                ));
            }
            let configurer = ProjectConfigurer::new(ctx.runner.clone(), &cmake)
                .with_vswhere(self.endpoints.vswhere.clone());
            let outcome = configurer
                .configure(
                    &source,
                    &build_dir,
                    self.config.generator.as_deref(),
                    target,
                    build_type,
                    dry_run,
                )
                .map_err(PhaseFailure::of)?;
            let generator = outcome.generator.clone();
            let detail = if dry_run {
                format!("[dry-run] {}", outcome.command)
            } else {
                format!("configured with {}", generator)
            };
            ctx.report.configure = Some(outcome);
            Ok((generator, detail))
        })?
        else {
            return Ok(());
        };

        let msbuild_generator = is_visual_studio(&generator);
        if msbuild_generator {
            let mutated = self.run_phase(ctx, wf, PhaseName::Mutate, |_ctx| {
                let project = wrapper_project_path(&build_dir);
                let runtime = self.config.runtime_library;
                if dry_run && !project.exists() {
                    return Ok((
                        (),
                        format!(
                            "[dry-run] would set RuntimeLibrary={} for {} in {}",
                            runtime,
                            build_type,
                            project.display()
                        ),
                    ));
                }
                let changed = ProjectMutator
                    .mutate(&project, build_type.as_str(), runtime, dry_run)
                    .map_err(PhaseFailure::of)?;
                let detail = if changed {
                    format!("RuntimeLibrary set to {}", runtime)
                } else {
                    format!("RuntimeLibrary already {}", runtime)
                };
                Ok(((), detail))
            })?;
            if mutated.is_none() {
                return Ok(());
            }
        } else {
            wf.skip(
                PhaseName::Mutate,
                format!("generator '{}' produces no MSBuild project", generator),
            )?;
        }

        let built = self.run_phase(ctx, wf, PhaseName::Build, |ctx| {
            let (driver, project) = if msbuild_generator {
                let msbuild = self.msbuild(ctx)?;
                (BuildDriver::MsBuild(msbuild), solution_path(&build_dir))
            } else {
                (BuildDriver::CMake(cmake.clone()), build_dir.clone())
            };
            let request = BuildRequest {
                project,
                target: Some(WRAPPER_TARGET.to_string()),
                configuration: build_type,
                architecture: target.architecture,
                parallel: true,
            };
            let outcome = Builder::new(ctx.runner.clone(), driver)
                .build(&request, dry_run)
                .map_err(PhaseFailure::of)?;
            let detail = if dry_run {
                format!("[dry-run] {}", outcome.command)
            } else {
                format!("{} built", WRAPPER_TARGET)
            };
            ctx.report.build = Some(outcome);
            Ok(((), detail))
        })?;
        if built.is_none() {
            return Ok(());
        }

        self.run_phase(ctx, wf, PhaseName::Collect, |ctx| {
            let collector = ArtifactCollector::new(
                source_roots(&source, &build_dir, build_type),
                &self.paths.output_dir,
            );
            let report = collector
                .collect(&DeploymentManifest::default_for(target.platform), dry_run)
                .map_err(PhaseFailure::of)?;
            let pending: Vec<String> = report
                .missing_required()
                .map(|m| m.source_glob.clone())
                .collect();
            let mut detail = if dry_run {
                format!("[dry-run] would deploy {} files to {}", report.copied, self.paths.output_dir.display())
            } else {
                format!("{} files deployed to {}", report.copied, self.paths.output_dir.display())
            };
            if !pending.is_empty() {
                detail.push_str(&format!("; not yet built: {}", pending.join(", ")));
            }
            ctx.report.collection = Some(report);
            Ok(((), detail))
        })?;
        Ok(())
    }

    fn integrate(
        &self,
        ctx: &mut RunContext<'_>,
        wf: &mut WorkflowRecord,
        plan: &IntegrationPlan,
    ) -> PipelineResult<()> {
        let dry_run = self.options.dry_run;
        let platform = self.config.target.platform;

        let Some(integrator) = self.run_phase(ctx, wf, PhaseName::SolutionBuild, |ctx| {
            let driver = match platform {
                cef_version::Platform::Windows => BuildDriver::MsBuild(self.msbuild(ctx)?),
                _ => BuildDriver::CMake(ctx.cmake.clone().unwrap_or_else(|| PathBuf::from("cmake"))),
            };
            let integrator = SolutionIntegrator::new(ctx.runner.clone(), driver, platform);
            let outcome = integrator
                .build_solution(plan, &self.config, dry_run)
                .map_err(PhaseFailure::of)?;
            let detail = if dry_run {
                format!("[dry-run] {}", outcome.command)
            } else {
                format!("{} built", plan.solution.display())
            };
            ctx.report.solution_build = Some(outcome);
            Ok((integrator, detail))
        })?
        else {
            return Ok(());
        };

        self.run_phase(ctx, wf, PhaseName::Redeploy, |ctx| {
            let output = &self.paths.output_dir;
            if dry_run && !output.is_dir() {
                return Ok((
                    (),
                    format!("[dry-run] would redeploy {} into {}", output.display(), plan.binary_dir.display()),
                ));
            }
            let report = integrator
                .redeploy(plan, output, dry_run)
                .map_err(PhaseFailure::of)?;
            let detail = format!(
                "{}{} runtime files into {}",
                if dry_run { "[dry-run] would copy " } else { "" },
                report.binary_dir.copied,
                plan.binary_dir.display()
            );
            ctx.report.redeploy = Some(report);
            Ok(((), detail))
        })?;
        Ok(())
    }

    /// MSBuild location, discovered once per run
    fn msbuild(&self, ctx: &mut RunContext<'_>) -> Result<PathBuf, PhaseFailure> {
        if let Some(found) = &ctx.msbuild {
            return Ok(found.clone());
        }
        let found = locate_msbuild(
            ctx.runner.as_ref(),
            &self.endpoints.vswhere,
            self.endpoints.msbuild.as_deref(),
        );
        let path = match found {
            Some(path) => path,
            // A dry run only prints the command
            None if self.options.dry_run => PathBuf::from("MSBuild.exe"),
            None => return Err(PhaseFailure::of(BuildError::DriverNotFound)),
        };
        ctx.msbuild = Some(path.clone());
        Ok(path)
    }
}
