//! Process slots
//!
//! One slot per process kind the environment owns. A slot only moves forward:
//! `NotStarted -> Running -> Stopped`.

use std::sync::Arc;

use tracing::debug;

use crate::error::EnvResult;
use crate::traits::{HealthChecker, ManagedProcess};

#[derive(Default)]
pub enum ProcessSlot {
    #[default]
    NotStarted,
    Running(Arc<dyn ManagedProcess>),
    Stopped,
}

impl std::fmt::Debug for ProcessSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessSlot::NotStarted => write!(f, "NotStarted"),
            ProcessSlot::Running(process) => write!(f, "Running({})", process.name()),
            ProcessSlot::Stopped => write!(f, "Stopped"),
        }
    }
}

impl ProcessSlot {
    /// Record the handle, then start it.
    ///
    /// The handle is kept even if starting fails so teardown can still reclaim
    /// whatever the process managed to bring up.
    pub async fn start(&mut self, process: Arc<dyn ManagedProcess>) -> EnvResult<()> {
        *self = ProcessSlot::Running(process.clone());
        process.start_and_wait().await
    }

    /// Stop the running process. A no-op for a slot that never started or already stopped.
    pub async fn stop(&mut self) -> EnvResult<()> {
        match std::mem::replace(self, ProcessSlot::Stopped) {
            ProcessSlot::Running(process) => {
                debug!("Stopping {}", process.name());
                process.stop_and_wait().await
            }
            ProcessSlot::NotStarted => {
                *self = ProcessSlot::NotStarted;
                Ok(())
            }
            ProcessSlot::Stopped => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessSlot::Running(_))
    }

    pub fn process(&self) -> Option<&Arc<dyn ManagedProcess>> {
        match self {
            ProcessSlot::Running(process) => Some(process),
            _ => None,
        }
    }

    pub fn health_checker(&self) -> Option<Arc<dyn HealthChecker>> {
        self.process().and_then(|process| process.health_checker())
    }
}
