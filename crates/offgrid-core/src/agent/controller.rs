//! Registration and update lifecycle of the background update agent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::host::{AgentConfig, AgentHost, AgentLifecycle, InstallChoice, InstallPrompt};
use super::state::{
    AgentFailureCounts, FailureCounters, InstallPromptState, RegistrationState, WorkerState,
};
use crate::events::{EventBus, OfflineEvent};
use crate::task::BackgroundTask;

#[derive(Debug)]
struct AgentStatus {
    registration: RegistrationState,
    worker: Option<WorkerState>,
    prompt: InstallPromptState,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self {
            registration: RegistrationState::Unregistered,
            worker: None,
            prompt: InstallPromptState::Unavailable,
        }
    }
}

/// Owns the update agent registration and the deferred install prompt.
///
/// Nothing here ever returns an error to the caller: unsupported platforms and
/// failed platform calls degrade to "feature disabled", are logged, and are
/// counted in [`failure_counts`](Self::failure_counts).
pub struct UpdateAgentController {
    host: Arc<dyn AgentHost>,
    bus: EventBus,
    config: AgentConfig,
    supported: OnceLock<bool>,
    status: Mutex<AgentStatus>,
    prompt: Mutex<Option<Box<dyn InstallPrompt>>>,
    update_waiting: watch::Sender<bool>,
    failures: FailureCounters,
    update_claimed: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UpdateAgentController {
    pub fn new(host: Arc<dyn AgentHost>, bus: EventBus, config: AgentConfig) -> Arc<Self> {
        Arc::new(Self {
            host,
            bus,
            config,
            supported: OnceLock::new(),
            status: Mutex::new(AgentStatus::default()),
            prompt: Mutex::new(None),
            update_waiting: watch::Sender::new(false),
            failures: FailureCounters::default(),
            update_claimed: AtomicBool::new(false),
            listener: Mutex::new(None),
        })
    }

    /// Capability probe, done once and cached.
    pub fn is_supported(&self) -> bool {
        *self
            .supported
            .get_or_init(|| self.host.supports_update_agent())
    }

    /// Register the update agent and start listening to its lifecycle.
    ///
    /// Never fails and never blocks startup on missing support: an unsupported
    /// platform leaves the controller in [`RegistrationState::Unsupported`], a
    /// failed registration is logged and leaves it unregistered. Calling again
    /// after a successful registration does nothing.
    pub async fn initialize(self: &Arc<Self>) {
        if !self.is_supported() {
            lock(&self.status).registration = RegistrationState::Unsupported;
            info!("Update agent not supported on this platform - offline updates disabled");
            return;
        }

        {
            let mut status = lock(&self.status);
            match status.registration {
                RegistrationState::Unregistered => status.registration = RegistrationState::Registering,
                state => {
                    debug!(?state, "Update agent registration already handled");
                    return;
                }
            }
        }

        match self.host.register(&self.config).await {
            Ok(registration) => {
                info!(script = %self.config.script_url, scope = %self.config.scope, "Update agent registered");
                lock(&self.status).registration = RegistrationState::Registered;

                if registration.waiting && self.host.has_active_controller() {
                    self.mark_update_waiting();
                }
                self.listen(registration.lifecycle);
            }
            Err(e) if e.is_unsupported() => {
                lock(&self.status).registration = RegistrationState::Unsupported;
                info!(error = %e, "Update agent unsupported - offline updates disabled");
            }
            Err(e) => {
                FailureCounters::record(&self.failures.registration);
                lock(&self.status).registration = RegistrationState::Unregistered;
                warn!(error = %e, "Update agent registration failed");
            }
        }
    }

    fn listen(self: &Arc<Self>, mut lifecycle: mpsc::Receiver<AgentLifecycle>) {
        let controller: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = lifecycle.recv().await {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.handle_lifecycle(event);
            }
            debug!("Update agent lifecycle stream closed");
        });

        if let Some(previous) = lock(&self.listener).replace(task) {
            previous.abort();
        }
    }

    /// Apply one lifecycle notification from the registered agent.
    ///
    /// A worker reaching `Installed` while another agent already controls the
    /// page means a new version is waiting, which emits `update-available`.
    pub fn handle_lifecycle(&self, event: AgentLifecycle) {
        match event {
            AgentLifecycle::UpdateFound => {
                debug!("New update agent version installing");
                lock(&self.status).worker = Some(WorkerState::Installing);
            }
            AgentLifecycle::WorkerStateChanged(state) => {
                lock(&self.status).worker = Some(state);
                match state {
                    WorkerState::Installed if self.host.has_active_controller() => {
                        self.mark_update_waiting();
                    }
                    WorkerState::Installed => {
                        info!("Content cached for offline use");
                    }
                    WorkerState::Activated | WorkerState::Redundant => self.clear_update_waiting(),
                    WorkerState::Installing | WorkerState::Activating => {}
                }
            }
            AgentLifecycle::ControllerChanged => {
                debug!("Update agent controller changed");
                self.clear_update_waiting();
            }
        }
    }

    fn mark_update_waiting(&self) {
        self.update_waiting.send_replace(true);
        info!("New version available");
        self.bus.emit(OfflineEvent::UpdateAvailable);
    }

    fn clear_update_waiting(&self) {
        self.update_waiting.send_if_modified(|waiting| std::mem::replace(waiting, false));
    }

    /// Ask the registered agent to look for a newer version. No-op when
    /// nothing is registered; failures are logged and counted.
    pub async fn check_for_updates(&self) {
        if self.registration_state() != RegistrationState::Registered {
            debug!("No registered update agent - skipping update check");
            return;
        }

        match self.host.check_for_update().await {
            Ok(()) => debug!("Update check complete"),
            Err(e) => {
                FailureCounters::record(&self.failures.update_check);
                warn!(error = %e, "Update check failed");
            }
        }
    }

    /// Run [`check_for_updates`](Self::check_for_updates) every `every`.
    /// The first check happens after one full interval.
    pub fn spawn_update_checks(self: &Arc<Self>, every: Duration) -> BackgroundTask {
        let controller: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.check_for_updates().await;
            }
        });
        BackgroundTask::new("update-checks", task)
    }

    /// Hold a deferred install prompt until the user asks to install.
    pub fn capture_install_prompt(&self, prompt: Box<dyn InstallPrompt>) {
        *lock(&self.prompt) = Some(prompt);
        lock(&self.status).prompt = InstallPromptState::Available;
        debug!("Install prompt captured");
        self.bus.emit(OfflineEvent::InstallAvailable(true));
    }

    /// The app was installed by other means; any held prompt is stale.
    pub fn app_installed(&self) {
        let had_prompt = lock(&self.prompt).take().is_some();
        lock(&self.status).prompt = InstallPromptState::Unavailable;
        info!(had_prompt, "App installed");
        self.bus.emit(OfflineEvent::InstallAvailable(false));
    }

    /// Show the held install prompt and report whether the user accepted.
    ///
    /// The prompt is consumed on the first call; later calls return `false`
    /// until a new prompt is captured. Returns `false` right away if no prompt
    /// is held.
    pub async fn prompt_install(&self) -> bool {
        let Some(prompt) = lock(&self.prompt).take() else {
            debug!("No install prompt available");
            return false;
        };

        lock(&self.status).prompt = InstallPromptState::Consumed;
        self.bus.emit(OfflineEvent::InstallAvailable(false));

        match prompt.show().await {
            Ok(InstallChoice::Accepted) => {
                info!("User accepted install prompt");
                true
            }
            Ok(InstallChoice::Dismissed) => {
                info!("User dismissed install prompt");
                false
            }
            Err(e) => {
                FailureCounters::record(&self.failures.prompt);
                warn!(error = %e, "Install prompt failed");
                false
            }
        }
    }

    /// Hand control to the waiting worker, then reload once.
    ///
    /// No-op if no worker is waiting or another call already claimed the
    /// update. A failed activation releases the claim so a later call can retry.
    pub async fn apply_update(&self) {
        if !self.is_update_available() {
            debug!("No waiting update to apply");
            return;
        }
        if self.update_claimed.swap(true, Ordering::SeqCst) {
            debug!("Update already being applied");
            return;
        }

        if let Err(e) = self.host.activate_waiting().await {
            FailureCounters::record(&self.failures.activation);
            warn!(error = %e, "Failed to activate waiting update agent");
            self.update_claimed.store(false, Ordering::SeqCst);
            return;
        }

        info!("Reloading to apply update");
        self.host.reload();
    }

    pub fn can_install(&self) -> bool {
        lock(&self.prompt).is_some()
    }

    /// Derived from the platform display mode, not from anything tracked here.
    pub fn is_installed(&self) -> bool {
        self.host.is_standalone_display()
    }

    pub fn is_update_available(&self) -> bool {
        *self.update_waiting.borrow()
    }

    /// Follows [`is_update_available`](Self::is_update_available), including
    /// the drop back to `false` once the waiting worker takes over or goes away.
    pub fn watch_update_available(&self) -> watch::Receiver<bool> {
        self.update_waiting.subscribe()
    }

    pub fn registration_state(&self) -> RegistrationState {
        lock(&self.status).registration
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        lock(&self.status).worker
    }

    pub fn install_prompt_state(&self) -> InstallPromptState {
        lock(&self.status).prompt
    }

    pub fn failure_counts(&self) -> AgentFailureCounts {
        self.failures.snapshot()
    }
}

impl Drop for UpdateAgentController {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}
