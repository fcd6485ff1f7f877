//! Entry point of the generation protocol.
//!
//! Read-only: the Starter never writes a record. Claiming a key is the
//! Worker's first step.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::plan::canonical::{canonicalize, JobKey};
use crate::plan::document::PlanDocument;
use crate::plan::jobs::{JobStatus, JobStore};

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StartOutcome {
    /// Cache hit. No model call will be made.
    Ready { key: JobKey, data: PlanDocument },
    /// A Worker owns the key. Poll, do not trigger.
    Running { key: JobKey },
    /// Nothing usable is stored. Trigger the Worker once for `key`.
    Start { key: JobKey },
}

impl StartOutcome {
    pub fn key(&self) -> &JobKey {
        match self {
            StartOutcome::Ready { key, .. }
            | StartOutcome::Running { key }
            | StartOutcome::Start { key } => key,
        }
    }
}

pub async fn start(jobs: &dyn JobStore, raw_state: &Value) -> Result<StartOutcome, AppError> {
    let (_, key) = canonicalize(raw_state)?;
    let record = jobs.get(&key).await?;

    let outcome = match record {
        Some(record) if record.status == JobStatus::Ready => match record.data {
            Some(data) => {
                info!(%key, "cache-hit");
                StartOutcome::Ready { key, data }
            }
            // A ready record without data is unusable; regenerate.
            None => {
                info!(%key, "need-start (ready record had no data)");
                StartOutcome::Start { key }
            }
        },
        Some(record) if record.status == JobStatus::Running => {
            info!(%key, request_id = %record.request_id, "already-running");
            StartOutcome::Running { key }
        }
        Some(record) => {
            info!(
                %key,
                error = record.error.as_deref().unwrap_or(""),
                "need-start (previous run failed)"
            );
            StartOutcome::Start { key }
        }
        None => {
            info!(%key, "need-start");
            StartOutcome::Start { key }
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::jobs::{JobRecord, MemoryJobStore};
    use crate::plan::testing::{sample_document, sample_state};
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    fn store() -> MemoryJobStore {
        MemoryJobStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_unknown_key_asks_caller_to_start() {
        let jobs = store();
        let outcome = start(&jobs, &sample_state()).await.unwrap();

        let (_, expected) = canonicalize(&sample_state()).unwrap();
        assert_eq!(outcome, StartOutcome::Start { key: expected });
        // Reading never creates a record.
        assert!(jobs.get(outcome.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_running_record_is_reported_not_restarted() {
        let jobs = store();
        let (_, key) = canonicalize(&sample_state()).unwrap();
        jobs.claim(&key, &JobRecord::running(Uuid::new_v4())).await.unwrap();

        for _ in 0..2 {
            let outcome = start(&jobs, &sample_state()).await.unwrap();
            assert_eq!(outcome, StartOutcome::Running { key: key.clone() });
        }
    }

    #[tokio::test]
    async fn test_ready_record_is_served_from_cache() {
        let jobs = store();
        let (_, key) = canonicalize(&sample_state()).unwrap();
        let record = JobRecord::running(Uuid::new_v4()).into_ready(sample_document());
        jobs.set(&key, &record).await.unwrap();

        let outcome = start(&jobs, &sample_state()).await.unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Ready {
                key,
                data: sample_document()
            }
        );
    }

    #[tokio::test]
    async fn test_errored_record_is_retryable() {
        let jobs = store();
        let (_, key) = canonicalize(&sample_state()).unwrap();
        let record = JobRecord::running(Uuid::new_v4()).into_failed("Timeout".into(), None);
        jobs.set(&key, &record).await.unwrap();

        let outcome = start(&jobs, &sample_state()).await.unwrap();
        assert_eq!(outcome, StartOutcome::Start { key });
    }

    #[tokio::test]
    async fn test_ready_record_without_data_can_be_restarted() {
        let jobs = store();
        let (_, key) = canonicalize(&sample_state()).unwrap();
        let hollow = JobRecord {
            data: None,
            ..JobRecord::running(Uuid::new_v4()).into_ready(sample_document())
        };
        jobs.set(&key, &hollow).await.unwrap();

        let outcome = start(&jobs, &sample_state()).await.unwrap();
        assert_eq!(outcome, StartOutcome::Start { key: key.clone() });
        // The start answer must be honoured by the claim that follows.
        assert!(jobs.claim(&key, &JobRecord::running(Uuid::new_v4())).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_object_state_is_input_error() {
        let err = start(&store(), &json!([1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, AppError::Input(_)));
    }

    #[test]
    fn test_outcome_wire_format() {
        let (_, key) = canonicalize(&sample_state()).unwrap();
        let value = serde_json::to_value(StartOutcome::Start { key: key.clone() }).unwrap();
        assert_eq!(value, json!({ "status": "start", "key": key.as_str() }));
    }
}
