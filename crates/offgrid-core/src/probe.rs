//! Native connectivity probe.
//!
//! Hosts without a platform online/offline signal can poll a known URL
//! instead. Any HTTP response counts as online; a transport failure counts as
//! offline.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::Client;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::network::{ConnectionInfo, ConnectivitySource, NetworkStatusMonitor};
use crate::task::BackgroundTask;

/// HTTP request timeout in seconds for a single probe.
const PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub online: bool,
    pub round_trip_ms: Option<u32>,
}

pub struct HttpProbe {
    client: Client,
    url: String,
    last: Mutex<Option<ProbeOutcome>>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            last: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe once and remember the result.
    pub async fn check(&self) -> ProbeOutcome {
        let started = Instant::now();
        let outcome = match self.client.head(&self.url).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis();
                debug!(url = %self.url, status = %response.status(), elapsed_ms = elapsed as u64, "Probe answered");
                ProbeOutcome {
                    online: true,
                    round_trip_ms: Some(u32::try_from(elapsed).unwrap_or(u32::MAX)),
                }
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                ProbeOutcome {
                    online: false,
                    round_trip_ms: None,
                }
            }
        };

        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome);
        outcome
    }

    pub fn last_outcome(&self) -> Option<ProbeOutcome> {
        *self.last.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ConnectivitySource for HttpProbe {
    /// Optimistic until the first probe completes.
    fn is_online(&self) -> bool {
        self.last_outcome().map(|o| o.online).unwrap_or(true)
    }

    fn connection_info(&self) -> Option<ConnectionInfo> {
        let round_trip_ms = self.last_outcome()?.round_trip_ms?;
        Some(ConnectionInfo {
            round_trip_ms: Some(round_trip_ms),
            ..Default::default()
        })
    }
}

/// Probe every `every`, starting immediately, and feed each result to the
/// monitor as a transition signal.
pub fn spawn_probe_watch(
    monitor: Arc<NetworkStatusMonitor>,
    probe: Arc<HttpProbe>,
    every: Duration,
) -> BackgroundTask {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = probe.check().await;
            monitor.handle_transition(outcome.online);
        }
    });
    BackgroundTask::new("connectivity-probe", task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::events::{EventBus, OfflineEvent};

    async fn one_shot_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });
        format!("http://{}/", addr)
    }

    async fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_probe_answer_is_online_with_round_trip() {
        let probe = HttpProbe::new(one_shot_server().await).unwrap();

        let outcome = probe.check().await;
        assert!(outcome.online);
        assert!(outcome.round_trip_ms.is_some());
        assert!(probe.connection_info().unwrap().round_trip_ms.is_some());
    }

    #[tokio::test]
    async fn test_refused_connection_is_offline() {
        let probe = HttpProbe::new(closed_port_url().await).unwrap();
        assert!(probe.is_online());

        let outcome = probe.check().await;
        assert!(!outcome.online);
        assert!(!probe.is_online());
        assert_eq!(probe.connection_info(), None);
    }

    #[tokio::test]
    async fn test_watch_feeds_monitor() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let probe = Arc::new(HttpProbe::new(closed_port_url().await).unwrap());
        let monitor = Arc::new(NetworkStatusMonitor::new(probe.clone(), bus));

        let watch = spawn_probe_watch(monitor.clone(), probe, Duration::from_secs(3600));
        let event = tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS + 2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event, OfflineEvent::NetworkStatus(false));
        assert!(!monitor.is_online());
        watch.stop();
    }
}
