//! Engine readiness polling.

use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, info};

/// Interval between readiness probes.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-probe request timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe the engine's readiness route once.
///
/// Only `200 OK` counts as ready; connection failures count as not ready.
pub async fn check_engine_ready(client: &Client, url: &str) -> bool {
    match client.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            debug!("Readiness probe failed: {e}");
            false
        }
    }
}

/// Poll the engine's readiness route until it answers `200 OK`.
///
/// There is no attempt cap: a worker is useless until its engine is up,
/// and the process supervisor owns the overall startup deadline.
pub async fn wait_for_engine_ready(client: &Client, url: &str, interval: Duration) {
    info!("Waiting for engine to be ready at {url}");
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        if check_engine_ready(client, url).await {
            info!(attempt, "Engine is ready at {url}");
            return;
        }
        debug!(attempt, "Engine not ready yet at {url}, retrying...");
        sleep(interval).await;
    }
}
