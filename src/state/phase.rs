//! Per-phase state record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{next_seq, now_utc, TerminalState};
use crate::summary::FailureKind;

/// Every phase the orchestrator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    SecurityGate,
    Detect,
    Backup,
    Download,
    Install,
    Verify,
    Toolchain,
    Configure,
    Mutate,
    Build,
    Collect,
    SolutionBuild,
    Redeploy,
}

impl PhaseName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::SecurityGate => "security_gate",
            PhaseName::Detect => "detect",
            PhaseName::Backup => "backup",
            PhaseName::Download => "download",
            PhaseName::Install => "install",
            PhaseName::Verify => "verify",
            PhaseName::Toolchain => "toolchain",
            PhaseName::Configure => "configure",
            PhaseName::Mutate => "mutate",
            PhaseName::Build => "build",
            PhaseName::Collect => "collect",
            PhaseName::SolutionBuild => "solution_build",
            PhaseName::Redeploy => "redeploy",
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    /// Not started yet
    Pending,
    /// Executing
    Running,
    /// Finished successfully (including dry-run simulation)
    Completed,
    /// Not executed
    Skipped,
    /// Finished with an error
    Failed,
}

impl TerminalState for PhaseState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseState::Completed | PhaseState::Skipped | PhaseState::Failed
        )
    }
}

impl PhaseState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: PhaseState) -> bool {
        match (self, target) {
            (PhaseState::Pending, PhaseState::Running) => true,
            (PhaseState::Pending, PhaseState::Skipped) => true,

            (PhaseState::Running, PhaseState::Completed) => true,
            (PhaseState::Running, PhaseState::Failed) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }
}

/// Errors for phase state operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseStateError {
    #[error("invalid transition of phase {phase} from {from:?} to {to:?}")]
    InvalidTransition {
        phase: PhaseName,
        from: PhaseState,
        to: PhaseState,
    },

    #[error("phase {0} is not part of this workflow")]
    UnknownPhase(PhaseName),
}

/// State and outcome of one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseName,

    pub state: PhaseState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Outcome note, skip reason, or what a dry run would have done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Monotonic sequence counter for ordering
    pub seq: u64,
}

impl PhaseRecord {
    /// New phase in PENDING state
    pub fn new(phase: PhaseName) -> Self {
        Self {
            phase,
            state: PhaseState::Pending,
            started_at: None,
            finished_at: None,
            detail: None,
            failure_kind: None,
            error: None,
            seq: next_seq(),
        }
    }

    fn transition(&mut self, target: PhaseState) -> Result<(), PhaseStateError> {
        if !self.state.can_transition_to(target) {
            return Err(PhaseStateError::InvalidTransition {
                phase: self.phase,
                from: self.state,
                to: target,
            });
        }
        let now = now_utc();
        if target == PhaseState::Running {
            self.started_at = Some(now);
        } else {
            self.finished_at = Some(now);
        }
        self.state = target;
        self.seq = next_seq();
        Ok(())
    }

    /// PENDING → RUNNING
    pub fn start(&mut self) -> Result<(), PhaseStateError> {
        self.transition(PhaseState::Running)
    }

    /// RUNNING → COMPLETED
    pub fn complete(&mut self, detail: Option<String>) -> Result<(), PhaseStateError> {
        self.transition(PhaseState::Completed)?;
        self.detail = detail;
        Ok(())
    }

    /// RUNNING → FAILED
    pub fn fail(&mut self, kind: FailureKind, error: String) -> Result<(), PhaseStateError> {
        self.transition(PhaseState::Failed)?;
        self.failure_kind = Some(kind);
        self.error = Some(error);
        Ok(())
    }

    /// PENDING → SKIPPED
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), PhaseStateError> {
        self.transition(PhaseState::Skipped)?;
        self.detail = Some(reason.into());
        Ok(())
    }

    /// Duration in milliseconds, when both timestamps are known
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(PhaseState::Pending.can_transition_to(PhaseState::Running));
        assert!(PhaseState::Pending.can_transition_to(PhaseState::Skipped));
        assert!(PhaseState::Running.can_transition_to(PhaseState::Completed));
        assert!(PhaseState::Running.can_transition_to(PhaseState::Failed));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!PhaseState::Pending.can_transition_to(PhaseState::Completed));
        assert!(!PhaseState::Pending.can_transition_to(PhaseState::Failed));
        assert!(!PhaseState::Running.can_transition_to(PhaseState::Skipped));
        assert!(!PhaseState::Completed.can_transition_to(PhaseState::Running));
        assert!(!PhaseState::Failed.can_transition_to(PhaseState::Completed));
        assert!(!PhaseState::Skipped.can_transition_to(PhaseState::Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PhaseState::Pending.is_terminal());
        assert!(!PhaseState::Running.is_terminal());
        assert!(PhaseState::Completed.is_terminal());
        assert!(PhaseState::Skipped.is_terminal());
        assert!(PhaseState::Failed.is_terminal());
    }

    #[test]
    fn test_record_lifecycle() {
        let mut record = PhaseRecord::new(PhaseName::Download);
        let seq0 = record.seq;
        record.start().unwrap();
        assert!(record.started_at.is_some());
        assert!(record.seq > seq0);

        record
            .fail(FailureKind::DownloadFailure, "HTTP 404".to_string())
            .unwrap();
        assert_eq!(record.state, PhaseState::Failed);
        assert_eq!(record.failure_kind, Some(FailureKind::DownloadFailure));
        assert!(record.duration_ms().is_some());

        let err = record.start().unwrap_err();
        assert!(matches!(err, PhaseStateError::InvalidTransition { .. }));
    }

    #[test]
    fn test_skip_records_reason() {
        let mut record = PhaseRecord::new(PhaseName::Mutate);
        record.skip("generator produces no MSBuild project").unwrap();
        assert_eq!(record.state, PhaseState::Skipped);
        assert_eq!(
            record.detail.as_deref(),
            Some("generator produces no MSBuild project")
        );
        assert!(record.started_at.is_none());
    }

    #[test]
    fn test_serialization() {
        let record = PhaseRecord::new(PhaseName::SecurityGate);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["phase"], "security_gate");
        assert_eq!(json["state"], "PENDING");
        assert!(json.get("error").is_none());
    }
}
