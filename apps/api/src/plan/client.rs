//! HTTP client for the plan endpoints, used by the caller binary.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::plan::canonical::JobKey;
use crate::plan::jobs::JobStatusView;
use crate::plan::poller::StatusSource;
use crate::plan::starter::StartOutcome;

#[derive(Clone)]
pub struct PlanApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlanApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Current portfolio snapshot from the state store.
    pub async fn fetch_state(&self) -> Result<Value> {
        let response = self.http.get(self.url("/api/v1/state")).send().await?;
        let body: Value = read_json(response).await?;
        Ok(body.get("state").cloned().unwrap_or_else(|| json!({})))
    }

    pub async fn start(&self, state: &Value) -> Result<StartOutcome> {
        let response = self
            .http
            .post(self.url("/api/v1/plan/start"))
            .json(&json!({ "state": state }))
            .send()
            .await?;
        read_json(response).await
    }

    /// Fires the Worker for `key`. Returns once the server has accepted it.
    pub async fn trigger_generate(&self, key: &JobKey, state: &Value) -> Result<()> {
        let response = self
            .http
            .post(self.url("/api/v1/plan/generate"))
            .json(&json!({ "key": key, "state": state }))
            .send()
            .await?;
        let _: Value = read_json(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StatusSource for PlanApiClient {
    async fn status(&self, key: &JobKey) -> Result<JobStatusView> {
        let response = self
            .http
            .get(self.url("/api/v1/plan/status"))
            .query(&[("key", key.as_str())])
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        bail!(
            "server returned {status}: {}",
            crate::llm_client::preview(&body)
        );
    }
    serde_json::from_str(&body)
        .with_context(|| format!("unexpected response body from server ({status})"))
}
