//! Shared run state.
//!
//! All process-wide coordination state lives in one explicit context object
//! handed to every component — nothing ambient. The active `ScenarioRun` is
//! frozen behind an `Arc` at construction; the orchestrator is the sole
//! writer of the terminal state.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use provbank_config::ScenarioRun;
use provbank_core::time::Clock;

/// Lifecycle of one run. `Failed` names the component that brought the run
/// down and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed { component: String, reason: String },
}

pub struct RunContext {
    pub run: Arc<ScenarioRun>,
    pub clock: Arc<dyn Clock>,
    state: RwLock<RunState>,
    cancel: watch::Sender<bool>,
}

impl RunContext {
    pub fn new(run: ScenarioRun, clock: Arc<dyn Clock>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            run: Arc::new(run),
            clock,
            state: RwLock::new(RunState::Pending),
            cancel,
        }
    }

    pub fn state(&self) -> RunState {
        self.state.read().clone()
    }

    /// Terminal states stick: a run that failed stays failed even if
    /// teardown afterwards goes cleanly.
    pub(crate) fn transition(&self, next: RunState) {
        let mut state = self.state.write();
        if matches!(*state, RunState::Completed | RunState::Failed { .. }) {
            return;
        }
        *state = next;
    }

    /// Requests cooperative cancellation of waits (passive mode, drains).
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }
}
