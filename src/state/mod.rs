//! Phase and workflow state machine
//!
//! Phase states: PENDING → RUNNING → {COMPLETED | SKIPPED | FAILED}
//! A phase may also go straight from PENDING to SKIPPED when a skip flag is
//! set or a prerequisite did not complete.

mod phase;
mod workflow;

pub use phase::{PhaseName, PhaseRecord, PhaseState, PhaseStateError};
pub use workflow::{WorkflowName, WorkflowOutcome, WorkflowRecord};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global sequence counter for ordering state changes within one process
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the next sequence number for ordering
pub fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Current UTC timestamp
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
