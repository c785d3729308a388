//! Reactive view of the lifecycle and network signals for presentation code.
//!
//! A [`SignalBinding`] exposes four values (`can_install`, `update_available`,
//! `is_online`, `is_installed`) as `watch` channels. It reads the current
//! snapshot when attached, so a view that mounts late still starts with the
//! right values, and stops listening when detached or dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::agent::UpdateAgentController;
use crate::events::{EventBus, OfflineEvent};
use crate::network::NetworkStatusMonitor;
use crate::task::BackgroundTask;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SignalSnapshot {
    pub can_install: bool,
    pub update_available: bool,
    pub is_online: bool,
    pub is_installed: bool,
}

struct Senders {
    can_install: watch::Sender<bool>,
    update_available: watch::Sender<bool>,
    is_online: watch::Sender<bool>,
    is_installed: watch::Sender<bool>,
}

/// Publish `value` only if it differs, so receivers wake once per real change.
fn set(tx: &watch::Sender<bool>, value: bool) {
    tx.send_if_modified(|current| std::mem::replace(current, value) != value);
}

impl Senders {
    fn apply(&self, event: OfflineEvent, controller: &UpdateAgentController) {
        match event {
            OfflineEvent::InstallAvailable(available) => {
                set(&self.can_install, available);
                // Installation state can only change alongside prompt availability
                set(&self.is_installed, controller.is_installed());
            }
            // The event may trail a takeover; the controller holds the truth
            OfflineEvent::UpdateAvailable => set(&self.update_available, controller.is_update_available()),
            OfflineEvent::NetworkStatus(online) => set(&self.is_online, online),
        }
    }

    fn resync(&self, controller: &UpdateAgentController, monitor: &NetworkStatusMonitor) {
        set(&self.can_install, controller.can_install());
        set(&self.update_available, controller.is_update_available());
        set(&self.is_online, monitor.is_online());
        set(&self.is_installed, controller.is_installed());
    }
}

pub struct SignalBinding {
    can_install: watch::Receiver<bool>,
    update_available: watch::Receiver<bool>,
    is_online: watch::Receiver<bool>,
    is_installed: watch::Receiver<bool>,
    listener: BackgroundTask,
}

impl SignalBinding {
    /// Subscribe to `bus` and seed every signal from the current state.
    ///
    /// The bus subscription is taken before the snapshot is read, so an event
    /// fired in between is applied rather than lost. `update_available` also
    /// follows the controller directly, so it drops back to `false` once the
    /// waiting worker takes over.
    pub fn attach(
        controller: Arc<UpdateAgentController>,
        monitor: Arc<NetworkStatusMonitor>,
        bus: &EventBus,
    ) -> Self {
        let mut events = bus.subscribe();
        let mut update_waiting = controller.watch_update_available();

        let (can_install_tx, can_install) = watch::channel(controller.can_install());
        let (update_available_tx, update_available) = watch::channel(controller.is_update_available());
        let (is_online_tx, is_online) = watch::channel(monitor.is_online());
        let (is_installed_tx, is_installed) = watch::channel(controller.is_installed());

        let senders = Senders {
            can_install: can_install_tx,
            update_available: update_available_tx,
            is_online: is_online_tx,
            is_installed: is_installed_tx,
        };

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => senders.apply(event, &controller),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Signal binding lagged - resyncing from current state");
                            senders.resync(&controller, &monitor);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    // Clearing a waiting update has no event of its own
                    changed = update_waiting.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let waiting = *update_waiting.borrow_and_update();
                        set(&senders.update_available, waiting);
                    }
                }
            }
            debug!("Signal binding stopped");
        });

        Self {
            can_install,
            update_available,
            is_online,
            is_installed,
            listener: BackgroundTask::new("signal-binding", task),
        }
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            can_install: *self.can_install.borrow(),
            update_available: *self.update_available.borrow(),
            is_online: *self.is_online.borrow(),
            is_installed: *self.is_installed.borrow(),
        }
    }

    pub fn watch_can_install(&self) -> watch::Receiver<bool> {
        self.can_install.clone()
    }

    pub fn watch_update_available(&self) -> watch::Receiver<bool> {
        self.update_available.clone()
    }

    pub fn watch_is_online(&self) -> watch::Receiver<bool> {
        self.is_online.clone()
    }

    pub fn watch_is_installed(&self) -> watch::Receiver<bool> {
        self.is_installed.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_running()
    }

    /// Stop listening. Dropping the binding does the same.
    pub fn detach(self) {
        self.listener.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::agent::controller::tests::{FixedPrompt, MockHost};
    use crate::agent::{AgentConfig, AgentLifecycle, InstallChoice, WorkerState};
    use crate::network::StaticConnectivity;

    fn fixture() -> (Arc<UpdateAgentController>, Arc<MockHost>, Arc<NetworkStatusMonitor>, EventBus) {
        let bus = EventBus::new();
        let host = Arc::new(MockHost::default());
        let controller = UpdateAgentController::new(host.clone(), bus.clone(), AgentConfig::default());
        let monitor = Arc::new(NetworkStatusMonitor::new(Arc::new(StaticConnectivity(true)), bus.clone()));
        (controller, host, monitor, bus)
    }

    async fn changed(rx: &mut watch::Receiver<bool>) -> bool {
        timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("signal within a second")
            .expect("binding alive");
        *rx.borrow_and_update()
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_current_state() {
        let (controller, host, monitor, bus) = fixture();
        host.standalone.store(true, Ordering::SeqCst);
        controller.capture_install_prompt(Box::new(FixedPrompt(InstallChoice::Accepted)));
        monitor.handle_transition(false);

        let binding = SignalBinding::attach(controller, monitor, &bus);

        assert_eq!(
            binding.snapshot(),
            SignalSnapshot {
                can_install: true,
                update_available: false,
                is_online: false,
                is_installed: true,
            }
        );
    }

    #[tokio::test]
    async fn test_events_update_signals() {
        let (controller, host, monitor, bus) = fixture();
        host.controlled.store(true, Ordering::SeqCst);
        let binding = SignalBinding::attach(controller.clone(), monitor.clone(), &bus);

        let mut online = binding.watch_is_online();
        monitor.handle_transition(false);
        assert!(!changed(&mut online).await);

        let mut update = binding.watch_update_available();
        controller.handle_lifecycle(AgentLifecycle::WorkerStateChanged(WorkerState::Installed));
        assert!(changed(&mut update).await);

        let mut can_install = binding.watch_can_install();
        controller.capture_install_prompt(Box::new(FixedPrompt(InstallChoice::Accepted)));
        assert!(changed(&mut can_install).await);
        assert!(controller.prompt_install().await);
        assert!(!changed(&mut can_install).await);
    }

    #[tokio::test]
    async fn test_update_available_clears_after_takeover() {
        let (controller, host, monitor, bus) = fixture();
        host.controlled.store(true, Ordering::SeqCst);
        let binding = SignalBinding::attach(controller.clone(), monitor, &bus);
        let mut update = binding.watch_update_available();

        controller.handle_lifecycle(AgentLifecycle::WorkerStateChanged(WorkerState::Installed));
        assert!(changed(&mut update).await);

        controller.handle_lifecycle(AgentLifecycle::WorkerStateChanged(WorkerState::Activated));
        assert!(!changed(&mut update).await);
        assert!(!binding.snapshot().update_available);
    }

    #[tokio::test]
    async fn test_detach_releases_subscription() {
        let (controller, _host, monitor, bus) = fixture();
        let binding = SignalBinding::attach(controller, monitor, &bus);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(binding.is_attached());

        binding.detach();

        let released = timeout(Duration::from_secs(1), async {
            while bus.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(released.is_ok());
    }
}
