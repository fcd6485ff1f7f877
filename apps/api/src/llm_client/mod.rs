//! LLM Client: the single point of entry for all model provider calls.
//!
//! ARCHITECTURAL RULE: No other module may call the provider directly.
//! Generation goes through [`call_json`], which bounds every call by a deadline
//! and runs the tolerant extraction cascade in [`extract`] over the reply.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub mod extract;
pub mod prompts;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Upper bound on any diagnostic preview kept from provider output.
pub const PREVIEW_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}")]
    Upstream { status: u16, preview: String },

    #[error("Provider envelope was not valid JSON")]
    Envelope { preview: String },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Assistant content was not a JSON object")]
    UnparsableContent { preview: String },
}

impl LlmError {
    /// Bounded slice of the offending payload, when one was received.
    pub fn preview(&self) -> Option<&str> {
        match self {
            LlmError::Upstream { preview, .. }
            | LlmError::Envelope { preview }
            | LlmError::UnparsableContent { preview } => Some(preview),
            _ => None,
        }
    }
}

/// Provider settings, injected at construction.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Adds the counters of one more call.
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl ChatResponse {
    /// Text of the first choice. Providers that hand back an already-parsed
    /// object get it re-serialized so the extraction cascade sees one shape.
    pub fn text(&self) -> Option<String> {
        match self.choices.first()?.message.content.as_ref()? {
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// One raw model reply.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

/// A chat-style completion backend. `LlmClient` is the production implementation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().build()?,
            settings,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let request_body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let envelope = response.text().await?;
        debug!(
            status = status.as_u16(),
            bytes = envelope.len(),
            "Provider envelope received"
        );

        if !status.is_success() {
            warn!("LLM API returned {}: {}", status, preview(&envelope));
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                preview: preview(&envelope),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&envelope).map_err(|_| LlmError::Envelope {
                preview: preview(&envelope),
            })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        let text = parsed.text().ok_or(LlmError::EmptyContent)?;
        Ok(Completion {
            text,
            usage: parsed.usage,
        })
    }
}

/// A JSON object recovered from a model reply.
#[derive(Debug, Clone)]
pub struct JsonReply {
    pub object: Map<String, Value>,
    /// Bounded slice of the raw reply text.
    pub preview: String,
    /// Which extraction strategy produced `object`.
    pub strategy: &'static str,
    pub usage: Option<Usage>,
}

/// Calls the model once under `deadline` and extracts a JSON object from the reply.
/// Objects without an explicit `version` are stamped with `version = 1`.
pub async fn call_json(
    model: &dyn ChatModel,
    system: &str,
    user: &str,
    deadline: Duration,
) -> Result<JsonReply, LlmError> {
    let completion = tokio::time::timeout(deadline, model.complete(system, user))
        .await
        .map_err(|_| LlmError::Timeout(deadline))??;

    let reply_preview = preview(&completion.text);
    let Some((mut object, strategy)) = extract::extract_json_object(&completion.text) else {
        return Err(LlmError::UnparsableContent {
            preview: reply_preview,
        });
    };
    debug!(strategy, "Assistant content parsed");

    if object.get("version").map_or(true, Value::is_null) {
        object.insert("version".to_string(), json!(1));
    }

    Ok(JsonReply {
        object,
        preview: reply_preview,
        strategy,
        usage: completion.usage,
    })
}

/// First [`PREVIEW_CHARS`] characters of `text`.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};

    struct CannedModel(String);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, LlmError> {
            Ok(Completion {
                text: self.0.clone(),
                usage: None,
            })
        }
    }

    struct SlowModel;

    #[async_trait]
    impl ChatModel for SlowModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<Completion, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Completion {
                text: "{}".to_string(),
                usage: None,
            })
        }
    }

    fn settings(api_url: String) -> LlmSettings {
        LlmSettings {
            api_url,
            api_key: "sk-test".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 900,
            temperature: 0.0,
            top_p: 0.1,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    #[tokio::test]
    async fn test_call_json_extracts_fenced_object() {
        let model = CannedModel("```json\n{\"market_pulse\": [], \"version\": 2}\n```".to_string());
        let reply = call_json(&model, "sys", "user", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.strategy, "fenced");
        assert_eq!(reply.object["version"], 2);
        assert!(reply.object["market_pulse"].is_array());
    }

    #[tokio::test]
    async fn test_call_json_stamps_missing_version() {
        let model = CannedModel(r#"{"market_pulse": [], "version": null}"#.to_string());
        let reply = call_json(&model, "sys", "user", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.object["version"], 1);
    }

    #[tokio::test]
    async fn test_call_json_reports_unparsable_with_preview() {
        let model = CannedModel("no json here ".repeat(100));
        let err = call_json(&model, "sys", "user", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            LlmError::UnparsableContent { preview } => {
                assert_eq!(preview.chars().count(), PREVIEW_CHARS);
                assert!(preview.starts_with("no json here"));
            }
            other => panic!("expected UnparsableContent, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_json_enforces_deadline() {
        let err = call_json(&SlowModel, "sys", "user", Duration::from_secs(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(d) if d == Duration::from_secs(20)));
    }

    #[test]
    fn test_response_text_accepts_object_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": {"version": 1}}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();
        assert_eq!(response.text().unwrap(), r#"{"version":1}"#);
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_response_text_missing_when_content_blank() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "   "}}]
        }))
        .unwrap();
        assert!(response.text().is_none());

        let empty: ChatResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn test_usage_accumulates_across_calls() {
        let mut total = Usage::default();
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [],
            "usage": {"prompt_tokens": 700, "completion_tokens": 250, "total_tokens": 950}
        }))
        .unwrap();
        total.add(response.usage.unwrap());
        total.add(response.usage.unwrap());
        assert_eq!(
            total,
            Usage {
                prompt_tokens: 1400,
                completion_tokens: 500,
                total_tokens: 1900,
            }
        );
    }

    #[test]
    fn test_settings_debug_redacts_key() {
        let rendered = format!("{:?}", settings("http://x".to_string()));
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_client_sends_json_hint_and_reads_reply() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer sk-test");
                if !authorized {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "choices": [{"message": {
                            "role": "assistant",
                            "content": body["response_format"]["type"]
                        }}],
                        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
                    })),
                )
            }),
        );
        let client = LlmClient::new(settings(serve(router).await)).unwrap();

        let completion = client.complete("sys", "user").await.unwrap();
        assert_eq!(completion.text, "json_object");
        assert_eq!(completion.usage.unwrap().completion_tokens, 1);
    }

    #[tokio::test]
    async fn test_client_maps_non_success_to_upstream() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let client = LlmClient::new(settings(serve(router).await)).unwrap();

        match client.complete("sys", "user").await.unwrap_err() {
            LlmError::Upstream { status, preview } => {
                assert_eq!(status, 429);
                assert_eq!(preview, "slow down");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_rejects_non_json_envelope() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { "<html>gateway</html>" }),
        );
        let client = LlmClient::new(settings(serve(router).await)).unwrap();

        let err = client.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, LlmError::Envelope { .. }));
        assert_eq!(err.preview(), Some("<html>gateway</html>"));
    }
}
