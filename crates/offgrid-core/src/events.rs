//! Named outward signals and the broadcast bus that carries them.
//!
//! Components never call into presentation code; they emit an
//! [`OfflineEvent`] and whoever subscribed picks it up.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const BUS_CAPACITY: usize = 64;

pub const EVENT_INSTALL_AVAILABLE: &str = "install-available";
pub const EVENT_UPDATE_AVAILABLE: &str = "update-available";
pub const EVENT_NETWORK_STATUS: &str = "network-status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(tag = "event", content = "detail", rename_all = "kebab-case")]
pub enum OfflineEvent {
    /// A deferred install prompt was captured (`true`) or consumed/cleared (`false`).
    InstallAvailable(bool),
    /// A new agent version is installed and waiting to take over.
    UpdateAvailable,
    /// Connectivity changed; `true` means online.
    NetworkStatus(bool),
}

impl OfflineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OfflineEvent::InstallAvailable(_) => EVENT_INSTALL_AVAILABLE,
            OfflineEvent::UpdateAvailable => EVENT_UPDATE_AVAILABLE,
            OfflineEvent::NetworkStatus(_) => EVENT_NETWORK_STATUS,
        }
    }
}

/// Cheap to clone; all clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OfflineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: OfflineEvent) {
        // No receivers is normal before the UI binds
        if self.tx.send(event).is_err() {
            debug!(event = event.name(), "No subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OfflineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
