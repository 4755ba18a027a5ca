//! Background latency probe feeding the network monitor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use perch_core::NetworkMonitor;
use perch_domain::ProbeConfig;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::debug;

/// Periodic reachability probe against the provider API host.
///
/// Each cycle issues a HEAD request to the target and reports the round
/// trip into the shared [`NetworkMonitor`]. Any HTTP response counts as
/// reachable regardless of status; only transport failures and timeouts
/// count against connectivity.
pub struct LatencyProbe {
    client: Client,
    monitor: Arc<NetworkMonitor>,
    target: String,
    config: ProbeConfig,
}

impl LatencyProbe {
    /// Create a probe against `target` (typically the API base URL).
    pub fn new(
        client: Client,
        monitor: Arc<NetworkMonitor>,
        target: impl Into<String>,
        config: ProbeConfig,
    ) -> Self {
        Self { client, monitor, target: target.into(), config }
    }

    /// Run the probe loop until the returned handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.interval_secs);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.probe_once().await;
            }
        })
    }

    /// Issue a single probe and record the outcome.
    pub async fn probe_once(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let started = Instant::now();

        match self.client.head(&self.target).timeout(timeout).send().await {
            Ok(response) => {
                let latency = started.elapsed();
                debug!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "probe completed"
                );
                self.monitor.record_success(latency);
            }
            Err(err) => {
                debug!(error = %err, "probe failed");
                self.monitor.record_failure();
            }
        }
    }
}
