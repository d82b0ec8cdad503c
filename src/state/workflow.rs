//! Workflow = ordered phases with fail-fast semantics

use serde::{Deserialize, Serialize};
use std::fmt;

use super::phase::{PhaseName, PhaseRecord, PhaseState, PhaseStateError};
use crate::summary::FailureKind;

/// Workflows a run can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowName {
    /// Vulnerability gate, always first
    Preflight,
    /// Detect, back up, download, install, verify
    Acquire,
    /// Provision toolchain, configure, mutate, build, collect
    Build,
    /// Build the consuming GUI solution and redeploy
    Integrate,
}

impl WorkflowName {
    /// Phases of this workflow in execution order
    pub fn phases(&self) -> &'static [PhaseName] {
        match self {
            WorkflowName::Preflight => &[PhaseName::SecurityGate],
            WorkflowName::Acquire => &[
                PhaseName::Detect,
                PhaseName::Backup,
                PhaseName::Download,
                PhaseName::Install,
                PhaseName::Verify,
            ],
            WorkflowName::Build => &[
                PhaseName::Toolchain,
                PhaseName::Configure,
                PhaseName::Mutate,
                PhaseName::Build,
                PhaseName::Collect,
            ],
            WorkflowName::Integrate => &[PhaseName::SolutionBuild, PhaseName::Redeploy],
        }
    }
}

impl fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowName::Preflight => "preflight",
            WorkflowName::Acquire => "acquire",
            WorkflowName::Build => "build",
            WorkflowName::Integrate => "integrate",
        };
        f.write_str(s)
    }
}

/// Aggregate outcome of a finished workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Completed,
    Skipped,
    Failed,
}

/// Phase records of one workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow: WorkflowName,
    pub phases: Vec<PhaseRecord>,
}

impl WorkflowRecord {
    /// New workflow with every phase PENDING
    pub fn new(workflow: WorkflowName) -> Self {
        Self {
            workflow,
            phases: workflow.phases().iter().map(|p| PhaseRecord::new(*p)).collect(),
        }
    }

    pub fn phase(&self, name: PhaseName) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.phase == name)
    }

    fn phase_mut(&mut self, name: PhaseName) -> Result<&mut PhaseRecord, PhaseStateError> {
        self.phases
            .iter_mut()
            .find(|p| p.phase == name)
            .ok_or(PhaseStateError::UnknownPhase(name))
    }

    pub fn start(&mut self, name: PhaseName) -> Result<(), PhaseStateError> {
        self.phase_mut(name)?.start()
    }

    pub fn complete(&mut self, name: PhaseName, detail: Option<String>) -> Result<(), PhaseStateError> {
        self.phase_mut(name)?.complete(detail)
    }

    /// Fail a phase; a fatal kind also skips every phase still pending
    pub fn fail(
        &mut self,
        name: PhaseName,
        kind: FailureKind,
        error: String,
    ) -> Result<(), PhaseStateError> {
        self.phase_mut(name)?.fail(kind, error)?;
        if kind.is_fatal() {
            self.skip_remaining(&format!("{} failed", name))?;
        }
        Ok(())
    }

    pub fn skip(&mut self, name: PhaseName, reason: impl Into<String>) -> Result<(), PhaseStateError> {
        self.phase_mut(name)?.skip(reason)
    }

    /// Skip every phase that has not started
    pub fn skip_remaining(&mut self, reason: &str) -> Result<(), PhaseStateError> {
        for phase in self.phases.iter_mut() {
            if phase.state == PhaseState::Pending {
                phase.skip(reason)?;
            }
        }
        Ok(())
    }

    /// First phase that failed fatally
    pub fn fatal_failure(&self) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| {
            p.state == PhaseState::Failed && p.failure_kind.map_or(true, |k| k.is_fatal())
        })
    }

    /// Phases that failed without halting the workflow
    pub fn warnings(&self) -> impl Iterator<Item = &PhaseRecord> {
        self.phases.iter().filter(|p| {
            p.state == PhaseState::Failed && p.failure_kind.map_or(false, |k| !k.is_fatal())
        })
    }

    /// Aggregate outcome
    pub fn outcome(&self) -> WorkflowOutcome {
        if self.fatal_failure().is_some() {
            WorkflowOutcome::Failed
        } else if self.phases.iter().all(|p| p.state == PhaseState::Skipped) {
            WorkflowOutcome::Skipped
        } else {
            WorkflowOutcome::Completed
        }
    }
}
