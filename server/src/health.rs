//! Liveness reporting and probing.
//!
//! The server answers `GET /health` with a [`HealthReport`]; the `health`
//! subcommand and the container tooling use [`probe`] and
//! [`wait_until_healthy`] to poll it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

pub const DEFAULT_HEALTH_URL: &str = "http://127.0.0.1:8000/health";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn ok(uptime: Duration) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Health request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service reported unhealthy (HTTP {status})")]
    Unhealthy { status: u16 },

    #[error("Service at {url} was not healthy after {seconds}s")]
    TimedOut { url: String, seconds: u64 },
}

pub type HealthResult<T> = Result<T, HealthError>;

/// Performs one GET against `url`.
pub async fn probe(url: &str, timeout: Duration) -> HealthResult<HealthReport> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(HealthError::Unhealthy {
            status: status.as_u16(),
        });
    }

    let report: HealthReport = response.json().await?;
    if !report.is_ok() {
        return Err(HealthError::Unhealthy {
            status: status.as_u16(),
        });
    }
    Ok(report)
}

/// Polls `url` every `interval` until it reports healthy or `timeout` elapses.
pub async fn wait_until_healthy(
    url: &str,
    timeout: Duration,
    interval: Duration,
) -> HealthResult<HealthReport> {
    let started = Instant::now();

    loop {
        match probe(url, interval.max(Duration::from_secs(1))).await {
            Ok(report) => return Ok(report),
            Err(e) if started.elapsed() < timeout => {
                debug!(url, error = %e, "service not healthy yet");
                sleep(interval).await;
            }
            Err(_) => {
                return Err(HealthError::TimedOut {
                    url: url.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_report() {
        let report = HealthReport::ok(Duration::from_secs(42));
        assert!(report.is_ok());
        assert_eq!(report.uptime_seconds, 42);
        assert_eq!(report.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_report_serialization() {
        let report = HealthReport::ok(Duration::from_secs(1));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptime_seconds"], 1);
        let parsed: HealthReport = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, report);
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let result = probe("http://127.0.0.1:9/health", Duration::from_millis(500)).await;
        assert!(matches!(result, Err(HealthError::Request(_))));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let result = wait_until_healthy(
            "http://127.0.0.1:9/health",
            Duration::from_millis(200),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(HealthError::TimedOut { .. })));
    }
}
