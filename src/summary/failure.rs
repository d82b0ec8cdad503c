//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every requested workflow completed
    Succeeded,
    /// Workflows completed but a non-fatal condition was reported
    /// (verification failure, vulnerability check unavailable, advisories)
    SucceededWithWarnings,
    /// At least one workflow failed
    Failed,
    /// The security gate blocked the run
    Aborted,
}

impl RunStatus {
    /// Check if this status should produce a non-zero exit code
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Aborted)
    }
}

/// Failure kind - categorizes the cause of a phase failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Configuration could not be loaded or validated
    ConfigInvalid,
    /// CRITICAL or HIGH vulnerability found
    SecurityAbort,
    /// Detection could not inspect the target (treated as not found)
    DetectionFailure,
    /// Existing installation could not be archived
    BackupFailure,
    /// Download failed after retries
    DownloadFailure,
    /// Archive extension not recognised
    UnsupportedArchive,
    /// Archive could not be extracted or installed
    ExtractionFailure,
    /// Installed tree is missing required files
    VerificationFailure,
    /// Build tool could not be resolved or downloaded
    ToolchainProvisionFailure,
    /// Build tool configuration step failed
    ConfigurationFailure,
    /// Expected project setting node absent
    MutationTargetNotFound,
    /// Build driver missing or returned non-zero
    BuildFailure,
    /// Required artifact missing or copy failed
    CollectionFailure,
    /// GUI-solution integration failed
    IntegrationFailure,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind.
    ///
    /// Non-fatal kinds never change the process exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::ConfigInvalid => ExitCode::ConfigInvalid,
            FailureKind::SecurityAbort => ExitCode::SecurityAbort,
            FailureKind::DetectionFailure => ExitCode::Success,
            FailureKind::BackupFailure => ExitCode::BackupFailed,
            FailureKind::DownloadFailure => ExitCode::DownloadFailed,
            FailureKind::UnsupportedArchive => ExitCode::UnsupportedArchive,
            FailureKind::ExtractionFailure => ExitCode::ExtractionFailed,
            FailureKind::VerificationFailure => ExitCode::Success,
            FailureKind::ToolchainProvisionFailure => ExitCode::ToolchainFailed,
            FailureKind::ConfigurationFailure => ExitCode::ConfigureFailed,
            FailureKind::MutationTargetNotFound => ExitCode::MutationTargetNotFound,
            FailureKind::BuildFailure => ExitCode::BuildFailed,
            FailureKind::CollectionFailure => ExitCode::CollectionFailed,
            FailureKind::IntegrationFailure => ExitCode::IntegrationFailed,
        }
    }

    /// Whether this kind halts the workflow it occurs in
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FailureKind::DetectionFailure | FailureKind::VerificationFailure
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::ConfigInvalid => "Configuration invalid",
            FailureKind::SecurityAbort => "Blocked by vulnerability gate",
            FailureKind::DetectionFailure => "Installation detection failed",
            FailureKind::BackupFailure => "Backup of existing installation failed",
            FailureKind::DownloadFailure => "Download failed",
            FailureKind::UnsupportedArchive => "Unsupported archive format",
            FailureKind::ExtractionFailure => "Extraction or installation failed",
            FailureKind::VerificationFailure => "Installation verification failed",
            FailureKind::ToolchainProvisionFailure => "Build tool provisioning failed",
            FailureKind::ConfigurationFailure => "Project configuration failed",
            FailureKind::MutationTargetNotFound => "Project setting to rewrite not found",
            FailureKind::BuildFailure => "Build failed",
            FailureKind::CollectionFailure => "Artifact collection failed",
            FailureKind::IntegrationFailure => "Application integration failed",
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration could not be loaded
    ConfigInvalid = 2,
    /// Vulnerability gate abort
    SecurityAbort = 10,
    /// Backup failed
    BackupFailed = 20,
    /// Download failed
    DownloadFailed = 30,
    /// Unsupported archive format
    UnsupportedArchive = 31,
    /// Extraction or installation failed
    ExtractionFailed = 32,
    /// Toolchain provisioning failed
    ToolchainFailed = 40,
    /// Project configuration failed
    ConfigureFailed = 41,
    /// Project mutation target missing
    MutationTargetNotFound = 42,
    /// Build failed
    BuildFailed = 50,
    /// Artifact collection failed
    CollectionFailed = 60,
    /// Integration workflow failed
    IntegrationFailed = 70,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Create from integer value
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            2 => Some(ExitCode::ConfigInvalid),
            10 => Some(ExitCode::SecurityAbort),
            20 => Some(ExitCode::BackupFailed),
            30 => Some(ExitCode::DownloadFailed),
            31 => Some(ExitCode::UnsupportedArchive),
            32 => Some(ExitCode::ExtractionFailed),
            40 => Some(ExitCode::ToolchainFailed),
            41 => Some(ExitCode::ConfigureFailed),
            42 => Some(ExitCode::MutationTargetNotFound),
            50 => Some(ExitCode::BuildFailed),
            60 => Some(ExitCode::CollectionFailed),
            70 => Some(ExitCode::IntegrationFailed),
            _ => None,
        }
    }

    /// Check if this exit code indicates success
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Success
    }
}

/// Aggregates phase outcomes into one run status and exit code.
///
/// A security abort outranks everything; otherwise the first fatal failure
/// decides the exit code.
#[derive(Debug, Default)]
pub struct ExitCodeAggregator {
    aborted: bool,
    warnings: usize,
    first_failure: Option<FailureKind>,
}

impl ExitCodeAggregator {
    /// Create a new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure of the given kind
    pub fn add_failure(&mut self, kind: FailureKind) {
        if kind == FailureKind::SecurityAbort {
            self.aborted = true;
        } else if !kind.is_fatal() {
            self.warnings += 1;
        } else if self.first_failure.is_none() {
            self.first_failure = Some(kind);
        }
    }

    /// Record a non-fatal warning
    pub fn add_warning(&mut self) {
        self.warnings += 1;
    }

    /// Aggregated run status
    pub fn status(&self) -> RunStatus {
        if self.aborted {
            RunStatus::Aborted
        } else if self.first_failure.is_some() {
            RunStatus::Failed
        } else if self.warnings > 0 {
            RunStatus::SucceededWithWarnings
        } else {
            RunStatus::Succeeded
        }
    }

    /// Aggregated exit code
    pub fn exit_code(&self) -> ExitCode {
        if self.aborted {
            ExitCode::SecurityAbort
        } else if let Some(kind) = self.first_failure {
            kind.exit_code()
        } else {
            ExitCode::Success
        }
    }
}
