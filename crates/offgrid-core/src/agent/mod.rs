//! Background update agent lifecycle.
//!
//! This module provides:
//! - `UpdateAgentController`: registration, update detection, forced activation
//!   and the one-shot install prompt
//! - `AgentHost` / `InstallPrompt`: the platform seams a host implements
//!
//! The controller is constructed explicitly and injected where needed. Keep
//! one per running application.

pub mod controller;
pub mod host;
pub mod state;

pub use controller::UpdateAgentController;
pub use host::{
    AgentConfig, AgentHost, AgentLifecycle, AgentRegistration, InstallChoice, InstallPrompt,
};
pub use state::{AgentFailureCounts, InstallPromptState, RegistrationState, WorkerState};
