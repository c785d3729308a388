use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::state::WorkerState;
use crate::error::PlatformError;

/// Where the update agent script lives and what it controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub script_url: String,
    pub scope: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            script_url: "/sw.js".to_string(),
            scope: "/".to_string(),
        }
    }
}

/// Lifecycle notifications a registered agent reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLifecycle {
    /// A new version started installing.
    UpdateFound,
    /// The installing worker moved to a new state.
    WorkerStateChanged(WorkerState),
    /// A different agent took control of the page.
    ControllerChanged,
}

pub struct AgentRegistration {
    /// A worker was already installed and waiting when registration finished.
    pub waiting: bool,
    pub lifecycle: mpsc::Receiver<AgentLifecycle>,
}

/// The platform that hosts the background update agent.
///
/// Implementations wrap whatever the runtime offers (browser glue, a desktop
/// shell's updater, a mock). Every call may fail; the controller never lets
/// those failures escape.
#[async_trait]
pub trait AgentHost: Send + Sync {
    /// Whether a background update agent can run here at all.
    fn supports_update_agent(&self) -> bool;

    async fn register(&self, config: &AgentConfig) -> Result<AgentRegistration, PlatformError>;

    /// Ask the registered agent to look for a newer version.
    async fn check_for_update(&self) -> Result<(), PlatformError>;

    /// Tell the waiting worker to take over.
    async fn activate_waiting(&self) -> Result<(), PlatformError>;

    /// Whether an agent currently controls the page.
    fn has_active_controller(&self) -> bool;

    /// Whether the app runs in installed/standalone display mode.
    fn is_standalone_display(&self) -> bool;

    /// Full page reload.
    fn reload(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallChoice {
    Accepted,
    Dismissed,
}

/// A deferred install prompt captured from the platform. Shown at most once.
#[async_trait]
pub trait InstallPrompt: Send + Sync {
    async fn show(&self) -> Result<InstallChoice, PlatformError>;
}
