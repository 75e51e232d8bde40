//! Periodic liveness ping against a designated service.
//!
//! Purely observational: probes never feed back into dispatch decisions.

use std::time::{Duration, Instant};

use metrics::counter;
use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use super::error::InfraError;

pub struct Heartbeat {
    client: Client,
    health_url: Url,
    interval: Duration,
}

/// Result of one probe.
#[derive(Debug)]
pub enum ProbeOutcome {
    Responded(StatusCode),
    Unreachable(String),
}

impl Heartbeat {
    /// `target` is the base URL of the service; `/health` is resolved against it.
    pub fn new(target: &Url, interval: Duration) -> Result<Self, InfraError> {
        let health_url = target
            .join("/health")
            .map_err(|err| InfraError::configuration(format!("invalid heartbeat target: {err}")))?;
        let client = Client::builder()
            .user_agent(concat!("printrelay-heartbeat/", env!("CARGO_PKG_VERSION")))
            .timeout(interval.min(Duration::from_secs(30)))
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            health_url,
            interval,
        })
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    /// Probe on every interval tick until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await; // completes immediately
            loop {
                interval.tick().await;
                self.probe().await;
            }
        })
    }

    pub async fn probe(&self) -> ProbeOutcome {
        let started_at = Instant::now();
        match self.client.get(self.health_url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                counter!("printrelay_heartbeat_probes_total", "result" => "responded")
                    .increment(1);
                info!(
                    target = "printrelay::heartbeat",
                    op = "heartbeat::probe",
                    result = "ok",
                    url = %self.health_url,
                    status = status.as_u16(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Heartbeat answered"
                );
                ProbeOutcome::Responded(status)
            }
            Err(err) => {
                counter!("printrelay_heartbeat_probes_total", "result" => "unreachable")
                    .increment(1);
                warn!(
                    target = "printrelay::heartbeat",
                    op = "heartbeat::probe",
                    result = "error",
                    url = %self.health_url,
                    error = %err,
                    "Heartbeat failed"
                );
                ProbeOutcome::Unreachable(err.to_string())
            }
        }
    }
}
