//! Offline resilience for connected applications.
//!
//! This crate provides:
//! - `PersistenceStore`: durable drafts and a TTL cache on local SQLite
//! - `UpdateAgentController`: background agent registration, update detection
//!   and the deferred install prompt
//! - `NetworkStatusMonitor`: online/offline tracking with optional HTTP probing
//! - `SignalBinding`: reactive signals for presentation code
//!
//! Components talk to each other and to the UI through one `EventBus`.

pub mod agent;
pub mod binding;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod network;
pub mod probe;
pub mod store;
pub mod task;

pub use agent::{AgentConfig, AgentHost, InstallPrompt, UpdateAgentController};
pub use binding::{SignalBinding, SignalSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{PlatformError, StoreError};
pub use events::{EventBus, OfflineEvent};
pub use network::{ConnectionInfo, ConnectivitySource, NetworkState, NetworkStatusMonitor};
pub use probe::{spawn_probe_watch, HttpProbe};
pub use store::{spawn_sweeper, PersistenceStore, StoreLocation};
pub use task::BackgroundTask;
