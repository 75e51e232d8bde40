//! Round-robin dispatch with per-job failover.
//!
//! The shared cursor picks where each new job starts; within one job every
//! target is tried at most once until one succeeds. The cursor lives in
//! process memory, so fairness is per process, not across a cluster.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use metrics::counter;
use thiserror::Error;
use tokio::time::timeout_at;
use tracing::{error, info, warn};

use crate::{
    application::render::{LocalRender, PeerRender, RenderFailure},
    domain::{job::RenderJob, target::ExecutionTarget},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("all {attempts} render targets failed")]
    Exhausted { attempts: usize },
    #[error("job deadline of {deadline:?} elapsed after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: usize, deadline: Duration },
}

#[derive(Debug, Error)]
pub enum RouterConfigError {
    #[error("at least one render target must be configured")]
    NoTargets,
}

pub struct DispatchRouter {
    targets: Vec<ExecutionTarget>,
    cursor: AtomicUsize,
    local: Arc<dyn LocalRender>,
    peers: Arc<dyn PeerRender>,
    job_deadline: Duration,
}

impl DispatchRouter {
    pub fn new(
        targets: Vec<ExecutionTarget>,
        local: Arc<dyn LocalRender>,
        peers: Arc<dyn PeerRender>,
        job_deadline: Duration,
    ) -> Result<Self, RouterConfigError> {
        if targets.is_empty() {
            return Err(RouterConfigError::NoTargets);
        }

        Ok(Self {
            targets,
            cursor: AtomicUsize::new(0),
            local,
            peers,
            job_deadline,
        })
    }

    pub fn targets(&self) -> &[ExecutionTarget] {
        &self.targets
    }

    /// Whether the in-process engine is one of the targets.
    pub fn includes_local(&self) -> bool {
        self.targets.iter().any(ExecutionTarget::is_local)
    }

    /// Current cursor position, already reduced modulo the target count.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed) % self.targets.len()
    }

    pub async fn dispatch(&self, job: &RenderJob) -> Result<Vec<u8>, DispatchError> {
        let len = self.targets.len();
        let deadline = tokio::time::Instant::now() + self.job_deadline;
        let started_at = Instant::now();

        // One advance per job; retries below only read the cursor.
        let mut next = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        let mut tried = vec![false; len];
        let mut attempts = 0usize;

        loop {
            tried[next] = true;
            attempts += 1;
            let target = &self.targets[next];
            counter!("printrelay_dispatch_attempts_total", "target" => target.name().to_string())
                .increment(1);

            match timeout_at(deadline, self.attempt(target, job)).await {
                Ok(Ok(bytes)) => {
                    info!(
                        target = "printrelay::dispatch",
                        op = "dispatch::job",
                        result = "ok",
                        job_id = %job.id(),
                        peer = target.name(),
                        attempts,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        pdf_bytes = bytes.len(),
                        "Render job completed"
                    );
                    return Ok(bytes);
                }
                Ok(Err(failure)) => {
                    counter!(
                        "printrelay_dispatch_failures_total",
                        "target" => target.name().to_string(),
                        "kind" => failure.kind()
                    )
                    .increment(1);
                    warn!(
                        target = "printrelay::dispatch",
                        op = "dispatch::attempt",
                        result = "error",
                        job_id = %job.id(),
                        peer = target.name(),
                        attempt = attempts,
                        error_code = failure.kind(),
                        error = %failure,
                        "Render target failed; trying next"
                    );
                }
                Err(_) => {
                    error!(
                        target = "printrelay::dispatch",
                        op = "dispatch::job",
                        result = "deadline",
                        job_id = %job.id(),
                        peer = target.name(),
                        attempts,
                        deadline_ms = self.job_deadline.as_millis() as u64,
                        "Render job deadline elapsed"
                    );
                    counter!("printrelay_dispatch_exhausted_total", "reason" => "deadline")
                        .increment(1);
                    return Err(DispatchError::DeadlineExceeded {
                        attempts,
                        deadline: self.job_deadline,
                    });
                }
            }

            match next_untried(&tried, self.cursor.load(Ordering::Relaxed) % len) {
                Some(index) => next = index,
                None => {
                    error!(
                        target = "printrelay::dispatch",
                        op = "dispatch::job",
                        result = "exhausted",
                        job_id = %job.id(),
                        attempts,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "All render targets failed"
                    );
                    counter!("printrelay_dispatch_exhausted_total", "reason" => "exhausted")
                        .increment(1);
                    return Err(DispatchError::Exhausted { attempts });
                }
            }
        }
    }

    async fn attempt(
        &self,
        target: &ExecutionTarget,
        job: &RenderJob,
    ) -> Result<Vec<u8>, RenderFailure> {
        match target {
            ExecutionTarget::Local => self.local.render(job.document()).await,
            ExecutionTarget::Remote(peer) => self.peers.render(job, peer).await,
        }
    }
}

/// First index at or after `from` (wrapping) that has not been tried yet.
fn next_untried(tried: &[bool], from: usize) -> Option<usize> {
    let len = tried.len();
    (0..len)
        .map(|offset| (from + offset) % len)
        .find(|&index| !tried[index])
}
