//! Client for peer renderers exposing the same job contract over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    application::render::{PeerRender, RenderFailure},
    domain::{job::RenderJob, target::PeerTarget},
};

use super::error::InfraError;

#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    /// Build a client. Without `request_timeout` reqwest's defaults apply.
    pub fn new(request_timeout: Option<Duration>) -> Result<Self, InfraError> {
        let mut builder = Client::builder().user_agent(Self::user_agent());
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn user_agent() -> &'static str {
        concat!("printrelay/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl PeerRender for HttpPeerClient {
    async fn render(&self, job: &RenderJob, peer: &PeerTarget) -> Result<Vec<u8>, RenderFailure> {
        let started_at = Instant::now();
        let transport = |err: reqwest::Error| RenderFailure::PeerTransport {
            target: peer.name.clone(),
            cause: err.to_string(),
        };

        debug!(
            target = "printrelay::peer",
            op = "peer::render",
            job_id = %job.id(),
            peer = %peer.name,
            address = %peer.address,
            "Forwarding job to peer"
        );

        let response = self
            .client
            .post(peer.address.clone())
            .json(&job.payload())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderFailure::PeerHttp {
                target: peer.name.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!("printrelay_render_ms", "target" => peer.name.clone()).record(elapsed_ms as f64);
        info!(
            target = "printrelay::peer",
            op = "peer::render",
            result = "ok",
            job_id = %job.id(),
            peer = %peer.name,
            elapsed_ms,
            pdf_bytes = bytes.len(),
            "Peer render finished"
        );

        Ok(bytes.to_vec())
    }
}
