//! Caller-side status loop.
//!
//! Bounded by attempt count. Abandoning a poll does not stop the Worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::plan::canonical::JobKey;
use crate::plan::document::PlanDocument;
use crate::plan::jobs::{JobStatusView, JobStore, StatusKind};

/// Read-only view of job status, local or over HTTP.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, key: &JobKey) -> anyhow::Result<JobStatusView>;
}

/// Reads status straight from a job store.
pub struct StoreStatusSource(pub Arc<dyn JobStore>);

#[async_trait]
impl StatusSource for StoreStatusSource {
    async fn status(&self, key: &JobKey) -> anyhow::Result<JobStatusView> {
        Ok(JobStatusView::from(self.0.get(key).await?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(PlanDocument),
    Failed {
        error: String,
        preview: Option<String>,
    },
    /// No terminal status within the attempt budget.
    TimedOut { attempts: u32 },
}

/// Queries `source` until the job is terminal or the attempts run out.
/// Query failures are logged and count as an attempt; this never errors.
pub async fn poll<S>(source: &S, key: &JobKey, policy: PollPolicy) -> PollOutcome
where
    S: StatusSource + ?Sized,
{
    for attempt in 1..=policy.max_attempts {
        match source.status(key).await {
            Ok(view) => match view.status {
                StatusKind::Ready => match view.data {
                    Some(document) => return PollOutcome::Ready(document),
                    None => warn!(%key, attempt, "ready status without data"),
                },
                StatusKind::Error => {
                    return PollOutcome::Failed {
                        error: view.error.unwrap_or_else(|| "Generation failed".to_string()),
                        preview: view.preview,
                    }
                }
                status => debug!(%key, attempt, ?status, "not ready yet"),
            },
            Err(err) => warn!(%key, attempt, error = %err, "status query failed"),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    }
}
