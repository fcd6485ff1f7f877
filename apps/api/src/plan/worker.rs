//! Background generation: claim the key, run Stage A, fall back to one
//! corrective Stage B, write exactly one terminal record.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::llm_client::{call_json, ChatModel, JsonReply, LlmError, Usage};
use crate::plan::canonical::{JobKey, SanitizedState};
use crate::plan::coerce::coerce;
use crate::plan::document::PlanDocument;
use crate::plan::jobs::{JobRecord, JobStore};
use crate::plan::prompts::{corrective_prompt, primary_prompt, system_prompt};
use crate::plan::validate::{validate, ShapeError};

/// Independent deadlines for the two model calls of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBudgets {
    pub stage_a: Duration,
    pub stage_b: Duration,
}

impl StageBudgets {
    pub fn total(&self) -> Duration {
        self.stage_a + self.stage_b
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// Another run owns the key, or it already holds a document.
    Skipped,
    /// `usage` sums the token counters of every stage that was answered.
    Ready { usage: Usage },
    Failed { error: String, usage: Usage },
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Primary,
    Corrective,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::Primary => "stage-a",
            Stage::Corrective => "stage-b",
        }
    }
}

/// Why a stage did not produce a document.
enum StageFailure {
    Call(LlmError),
    Shape { shape: ShapeError, preview: String },
}

impl StageFailure {
    /// Critique embedded in the corrective prompt.
    fn critique(&self) -> String {
        match self {
            StageFailure::Call(err) => err.to_string(),
            StageFailure::Shape { shape, .. } => shape.critique(),
        }
    }

    fn preview(&self) -> Option<String> {
        match self {
            StageFailure::Call(err) => err.preview().map(str::to_string),
            StageFailure::Shape { preview, .. } => Some(preview.clone()),
        }
    }
}

/// The `running` record a Worker wrote for one key. Only its holder may
/// write the terminal record.
#[derive(Debug, Clone)]
pub struct Claim {
    key: JobKey,
    running: JobRecord,
}

impl Claim {
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn request_id(&self) -> Uuid {
        self.running.request_id
    }
}

#[derive(Clone)]
pub struct Worker {
    jobs: Arc<dyn JobStore>,
    model: Arc<dyn ChatModel>,
    budgets: StageBudgets,
}

impl Worker {
    pub fn new(jobs: Arc<dyn JobStore>, model: Arc<dyn ChatModel>, budgets: StageBudgets) -> Self {
        Self {
            jobs,
            model,
            budgets,
        }
    }

    /// Claims `key` and runs the pipeline in one go.
    pub async fn run(
        &self,
        key: &JobKey,
        state: &SanitizedState,
        request_id: Uuid,
    ) -> Result<WorkerOutcome, StoreError> {
        match self.claim(key, request_id).await? {
            Some(claim) => self.generate(claim, state).await,
            None => Ok(WorkerOutcome::Skipped),
        }
    }

    /// First step of a run: writes `running` for `key`. `None` when another
    /// run owns the key or it already holds a document.
    pub async fn claim(
        &self,
        key: &JobKey,
        request_id: Uuid,
    ) -> Result<Option<Claim>, StoreError> {
        let running = JobRecord::running(request_id);
        if !self.jobs.claim(key, &running).await? {
            info!(%key, %request_id, "claim refused, another run owns this key");
            return Ok(None);
        }
        info!(%key, %request_id, "claimed");
        Ok(Some(Claim {
            key: key.clone(),
            running,
        }))
    }

    /// Runs Stage A and, when needed, Stage B for a claimed key. Model and
    /// shape failures end up in the stored record; only store failures are
    /// returned as errors.
    pub async fn generate(
        &self,
        claim: Claim,
        state: &SanitizedState,
    ) -> Result<WorkerOutcome, StoreError> {
        let mut usage = Usage::default();

        let stage_a = self
            .stage(
                Stage::Primary,
                &claim,
                &system_prompt(false),
                &primary_prompt(state),
                state,
                &mut usage,
            )
            .await;

        let first_failure = match stage_a {
            Ok(document) => return self.finish_ready(claim, document, usage).await,
            Err(failure) => failure,
        };
        let (key, request_id) = (claim.key(), claim.request_id());
        match &first_failure {
            StageFailure::Call(err) => warn!(%key, %request_id, error = %err, "stage-a-failed"),
            StageFailure::Shape { shape, .. } => {
                warn!(%key, %request_id, missing = ?shape.missing, "invalid-shape-a")
            }
        }

        let critique = first_failure.critique();
        let stage_b = self
            .stage(
                Stage::Corrective,
                &claim,
                &system_prompt(true),
                &corrective_prompt(state, &critique),
                state,
                &mut usage,
            )
            .await;

        match stage_b {
            Ok(document) => {
                info!(
                    key = %claim.key(),
                    request_id = %claim.request_id(),
                    "stage-b-recovered"
                );
                self.finish_ready(claim, document, usage).await
            }
            Err(StageFailure::Call(err)) => {
                warn!(
                    key = %claim.key(),
                    request_id = %claim.request_id(),
                    error = %err,
                    "stage-b-failed"
                );
                let preview = err
                    .preview()
                    .map(str::to_string)
                    .or_else(|| first_failure.preview());
                self.finish_failed(claim, err.to_string(), preview, usage).await
            }
            Err(StageFailure::Shape { shape, preview }) => {
                warn!(
                    key = %claim.key(),
                    request_id = %claim.request_id(),
                    missing = ?shape.missing,
                    "stage-b-invalid"
                );
                let message = format!("Validation failed after retry: {shape}");
                self.finish_failed(claim, message, Some(preview), usage).await
            }
        }
    }

    async fn stage(
        &self,
        stage: Stage,
        claim: &Claim,
        system: &str,
        user: &str,
        state: &SanitizedState,
        usage: &mut Usage,
    ) -> Result<PlanDocument, StageFailure> {
        let deadline = match stage {
            Stage::Primary => self.budgets.stage_a,
            Stage::Corrective => self.budgets.stage_b,
        };
        let JsonReply {
            object,
            preview,
            strategy,
            usage: reply_usage,
        } = call_json(self.model.as_ref(), system, user, deadline)
            .await
            .map_err(StageFailure::Call)?;

        let tokens = reply_usage.unwrap_or_default();
        usage.add(tokens);
        info!(
            key = %claim.key(),
            request_id = %claim.request_id(),
            stage = stage.label(),
            strategy,
            prompt_tokens = tokens.prompt_tokens,
            completion_tokens = tokens.completion_tokens,
            "reply parsed"
        );

        shape(&object, state).map_err(|shape| StageFailure::Shape { shape, preview })
    }

    async fn finish_ready(
        &self,
        claim: Claim,
        document: PlanDocument,
        usage: Usage,
    ) -> Result<WorkerOutcome, StoreError> {
        let Claim { key, running } = claim;
        let request_id = running.request_id;
        if self.jobs.finish(&key, &running.into_ready(document)).await? {
            info!(%key, %request_id, total_tokens = usage.total_tokens, "done");
        } else {
            warn!(%key, %request_id, "lost ownership before writing the document");
        }
        Ok(WorkerOutcome::Ready { usage })
    }

    async fn finish_failed(
        &self,
        claim: Claim,
        message: String,
        preview: Option<String>,
        usage: Usage,
    ) -> Result<WorkerOutcome, StoreError> {
        let Claim { key, running } = claim;
        let request_id = running.request_id;
        let record = running.into_failed(message.clone(), preview);
        if self.jobs.finish(&key, &record).await? {
            error!(
                %key,
                %request_id,
                error = %message,
                total_tokens = usage.total_tokens,
                "failed"
            );
        } else {
            warn!(%key, %request_id, "lost ownership before writing the failure");
        }
        Ok(WorkerOutcome::Failed {
            error: message,
            usage,
        })
    }
}

fn shape(object: &Map<String, Value>, state: &SanitizedState) -> Result<PlanDocument, ShapeError> {
    validate(coerce(object, state))
}
