use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Registration of the update agent itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    /// The platform cannot run an agent; offline updates are disabled.
    Unsupported,
}

/// State of a newly installing worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    /// Installed and waiting to take over.
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPromptState {
    Unavailable,
    /// A deferred prompt is held and can be shown.
    Available,
    Consumed,
}

/// How many swallowed failures each operation has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFailureCounts {
    pub registration: u64,
    pub update_check: u64,
    pub activation: u64,
    pub prompt: u64,
}

impl AgentFailureCounts {
    pub fn total(&self) -> u64 {
        self.registration + self.update_check + self.activation + self.prompt
    }
}

#[derive(Debug, Default)]
pub(crate) struct FailureCounters {
    pub registration: AtomicU64,
    pub update_check: AtomicU64,
    pub activation: AtomicU64,
    pub prompt: AtomicU64,
}

impl FailureCounters {
    pub fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AgentFailureCounts {
        AgentFailureCounts {
            registration: self.registration.load(Ordering::Relaxed),
            update_check: self.update_check.load(Ordering::Relaxed),
            activation: self.activation.load(Ordering::Relaxed),
            prompt: self.prompt.load(Ordering::Relaxed),
        }
    }
}
