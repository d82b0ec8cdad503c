//! Final run report (summary.txt / run_summary.json)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use super::failure::{ExitCodeAggregator, FailureKind, RunStatus};
use crate::backup::{BackupArchive, RestoreInstructions};
use crate::deploy::CollectionReport;
use crate::detect::InstallationRecord;
use crate::download::DownloadArtifact;
use crate::integration::RedeployReport;
use crate::native::{BuildOutcome, ConfigureOutcome};
use crate::security::VulnerabilityReport;
use crate::state::{PhaseName, PhaseState, WorkflowName, WorkflowRecord};
use crate::toolchain::ProvisionedTool;
use crate::verify::VerificationReport;

/// Schema version for run_summary.json
pub const RUN_REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_summary.json
pub const RUN_REPORT_SCHEMA_ID: &str = "cef-lane/run_summary@1";

/// The phase that stopped a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub workflow: WorkflowName,
    pub phase: PhaseName,
    pub kind: FailureKind,
    pub error: String,
}

/// Everything a run did, or under dry-run would have done
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub version: String,
    pub target: String,

    pub status: RunStatus,
    pub exit_code: i32,

    pub workflows: Vec<WorkflowRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<VulnerabilityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<InstallationRecord>,
    /// The detected installation first, then the install target when it is
    /// a different tree
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<BackupArchive>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub restore: Vec<RestoreInstructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<InstallationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ProvisionedTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configure: Option<ConfigureOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution_build: Option<BuildOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeploy: Option<RedeployReport>,

    /// Non-fatal conditions the operator should look at
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, version: impl Into<String>, target: impl Into<String>, dry_run: bool) -> Self {
        Self {
            schema_version: RUN_REPORT_SCHEMA_VERSION,
            schema_id: RUN_REPORT_SCHEMA_ID.to_string(),
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            version: version.into(),
            target: target.into(),
            status: RunStatus::Succeeded,
            exit_code: 0,
            workflows: Vec::new(),
            failure: None,
            vulnerabilities: None,
            detected: None,
            backups: Vec::new(),
            restore: Vec::new(),
            download: None,
            installed: None,
            verification: None,
            toolchain: None,
            configure: None,
            build: None,
            collection: None,
            solution_build: None,
            redeploy: None,
            warnings: Vec::new(),
        }
    }

    pub fn workflow(&self, name: WorkflowName) -> Option<&WorkflowRecord> {
        self.workflows.iter().find(|w| w.workflow == name)
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Derive status, exit code and the failure summary from the workflows
    pub fn finish(&mut self) {
        let mut aggregator = ExitCodeAggregator::new();
        self.failure = None;

        for workflow in &self.workflows {
            for phase in &workflow.phases {
                if phase.state != PhaseState::Failed {
                    continue;
                }
                let kind = phase.failure_kind.unwrap_or(FailureKind::ExtractionFailure);
                aggregator.add_failure(kind);
                if kind.is_fatal() && self.failure.is_none() {
                    self.failure = Some(FailureSummary {
                        workflow: workflow.workflow,
                        phase: phase.phase,
                        kind,
                        error: phase.error.clone().unwrap_or_default(),
                    });
                }
            }
        }
        for _ in &self.warnings {
            aggregator.add_warning();
        }

        self.status = aggregator.status();
        self.exit_code = aggregator.exit_code().as_i32();
        self.finished_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering for summary.txt and the console
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let status = match self.status {
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::SucceededWithWarnings => "SUCCEEDED WITH WARNINGS",
            RunStatus::Failed => "FAILED",
            RunStatus::Aborted => "ABORTED",
        };

        let _ = writeln!(out, "CEF workflow run {}", self.run_id);
        let _ = writeln!(out, "Version: {}", self.version);
        let _ = writeln!(out, "Target:  {}", self.target);
        if self.dry_run {
            let _ = writeln!(out, "Mode:    dry-run (no changes made)");
        }
        let _ = writeln!(out, "Status:  {} (exit code {})", status, self.exit_code);

        for workflow in &self.workflows {
            let _ = writeln!(out, "\n[{}]", workflow.workflow);
            for phase in &workflow.phases {
                let state = format!("{:?}", phase.state).to_uppercase();
                let note = phase
                    .error
                    .as_deref()
                    .or(phase.detail.as_deref())
                    .unwrap_or("");
                let line = format!("  {:<15} {:<10} {}", phase.phase.as_str(), state, note);
                let _ = writeln!(out, "{}", line.trim_end());
            }
        }

        if let Some(failure) = &self.failure {
            let _ = writeln!(
                out,
                "\nFailed: {} / {}: {}",
                failure.workflow,
                failure.phase,
                failure.kind.description()
            );
            let _ = writeln!(out, "  {}", failure.error);
        }

        if let Some(report) = &self.vulnerabilities {
            if !report.findings.is_empty() {
                let _ = writeln!(out, "\nVulnerabilities ({}):", report.findings.len());
                for finding in &report.findings {
                    let _ = writeln!(
                        out,
                        "  {:<8} {} {} <{}>",
                        finding.severity.to_string(),
                        finding.id,
                        finding.summary,
                        finding.reference_url
                    );
                }
            }
        }

        if let Some(record) = &self.installed {
            let _ = writeln!(out, "\nInstalled: {}", record.describe());
        }
        if let Some(verification) = &self.verification {
            let _ = writeln!(out, "\nVerification of {}:", verification.root.display());
            for item in &verification.checklist {
                let mark = if item.ok { "ok" } else { "MISSING" };
                match &item.detail {
                    Some(detail) => {
                        let _ = writeln!(out, "  [{}] {} ({})", mark, item.item, detail);
                    }
                    None => {
                        let _ = writeln!(out, "  [{}] {}", mark, item.item);
                    }
                }
            }
        }

        for backup in &self.backups {
            if backup.simulated {
                let _ = writeln!(out, "\nBackup (dry-run): would write {}", backup.archive_path.display());
            } else {
                let _ = writeln!(
                    out,
                    "\nBackup: {} ({} bytes)",
                    backup.archive_path.display(),
                    backup.size_bytes
                );
            }
        }
        for restore in &self.restore {
            let _ = writeln!(out, "To restore {}:", restore.restores.display());
            let _ = writeln!(out, "  {}", restore.command);
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings:");
            for warning in &self.warnings {
                let _ = writeln!(out, "  - {}", warning);
            }
        }
        out
    }
}
