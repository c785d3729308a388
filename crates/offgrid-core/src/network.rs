//! Online/offline tracking.
//!
//! The monitor holds the last known connectivity, emits `network-status` on
//! every transition, and answers snapshot queries with whatever connection
//! metadata the platform can offer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::{EventBus, OfflineEvent};

/// Best-effort connection metadata. A missing field means "unknown", not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downlink_mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_trip_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_saver_enabled: Option<bool>,
}

impl ConnectionInfo {
    pub fn is_empty(&self) -> bool {
        self.effective_type.is_none()
            && self.downlink_mbps.is_none()
            && self.round_trip_ms.is_none()
            && self.data_saver_enabled.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub online: bool,
    #[serde(flatten)]
    pub connection: ConnectionInfo,
}

/// Where connectivity readings come from.
pub trait ConnectivitySource: Send + Sync {
    fn is_online(&self) -> bool;

    /// `None` when the platform exposes no connection details.
    fn connection_info(&self) -> Option<ConnectionInfo> {
        None
    }
}

/// A source with a fixed answer, for hosts that only push transitions.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

impl ConnectivitySource for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.0
    }
}

pub struct NetworkStatusMonitor {
    source: Arc<dyn ConnectivitySource>,
    bus: EventBus,
    online: AtomicBool,
}

impl NetworkStatusMonitor {
    /// Seeds the online flag from `source`.
    pub fn new(source: Arc<dyn ConnectivitySource>, bus: EventBus) -> Self {
        let online = source.is_online();
        debug!(online, "Network monitor started");
        Self {
            source,
            bus,
            online: AtomicBool::new(online),
        }
    }

    /// Record an online/offline signal from the platform. Emits
    /// `network-status` when the state actually changes.
    pub fn handle_transition(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            debug!(online, "Network status unchanged");
            return;
        }

        if online {
            info!("Back online");
        } else {
            info!("Gone offline");
        }
        self.bus.emit(OfflineEvent::NetworkStatus(online));
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Current online flag plus whatever metadata the source can offer.
    pub fn get_network_status(&self) -> NetworkState {
        NetworkState {
            online: self.is_online(),
            connection: self.source.connection_info().unwrap_or_default(),
        }
    }
}
