//! Fakes and fixtures shared by the plan tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm_client::{ChatModel, Completion, LlmError, Usage};
use crate::plan::document::{
    CashTracker, PlanDocument, PositionSize, PulseRow, Sentiment, Signal, SnapshotEntry,
    TradeStatus,
};

/// Counters attached to every scripted reply.
pub const REPLY_USAGE: Usage = Usage {
    prompt_tokens: 700,
    completion_tokens: 250,
    total_tokens: 950,
};

pub enum Step {
    /// Reply with this assistant text.
    Reply(String),
    /// Fail with an upstream status.
    Fail(u16),
    /// Never answer.
    Hang,
}

/// A `ChatModel` that plays back a fixed script and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[Value]) -> Self {
        Self::new(replies.iter().map(|r| Step::Reply(r.to_string())).collect())
    }

    /// `(system, user)` pairs in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(Completion {
                text,
                usage: Some(REPLY_USAGE),
            }),
            Some(Step::Fail(status)) => Err(LlmError::Upstream {
                status,
                preview: "scripted failure".to_string(),
            }),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(LlmError::Upstream {
                status: 500,
                preview: "script exhausted".to_string(),
            }),
        }
    }
}

/// Two owned positions with cash and a benchmark mapping.
pub fn sample_state() -> Value {
    json!({
        "cash": { "sleeve_value": 10000, "cash_available": 2500 },
        "benchmarks": { "AMZN": "XLY" },
        "positions": [
            {
                "ticker": "AMZN", "qty": 10, "avg": 178.5, "status": "buy",
                "notes": "resistance 235-240, breakout >240 to 245"
            },
            { "ticker": "KO", "qty": 40, "avg": 61.2, "sentiment": "bearish" }
        ],
        "owner": "not part of the key"
    })
}

/// Same positions, no cash: nothing to derive a cash tracker from.
pub fn cashless_state() -> Value {
    json!({
        "positions": [{ "ticker": "AMZN", "qty": 10, "avg": 178.5 }]
    })
}

/// A complete, conformant model reply for [`cashless_state`].
pub fn complete_reply() -> Value {
    json!({
        "version": 1,
        "market_pulse": [
            {
                "ticker": "AMZN", "benchmark": "QQQ",
                "signal": "outperform", "note": "bullish setup"
            }
        ],
        "cash_tracker": {
            "sleeve_value": 5000, "cash_available": 1000, "invested": 4000,
            "active_triggers": ["AMZN > 240"], "playbook": "Add AMZN on a close above 240."
        },
        "portfolio_snapshot": [
            { "ticker": "AMZN", "status": "BUY", "sentiment": "Bullish", "price": 231.4,
              "position": { "qty": 10, "avg": 178.5 }, "pl_pct": 29.6, "flow": "Positive tilt",
              "resistance": "235–240", "breakout_watch": { "gt": 240, "targets": [245] },
              "idea": "Add on breakout." }
        ]
    })
}

pub fn sample_document() -> PlanDocument {
    PlanDocument {
        version: 1,
        market_pulse: vec![PulseRow {
            ticker: "AMZN".to_string(),
            benchmark: "XLY".to_string(),
            signal: Signal::Outperform,
            note: "bullish setup".to_string(),
        }],
        cash_tracker: CashTracker {
            sleeve_value: Some(10000.0),
            cash_available: Some(2500.0),
            invested: Some(7500.0),
            active_triggers: vec![],
            playbook: "Watch breakouts on AMZN; deploy only on confirmation.".to_string(),
        },
        portfolio_snapshot: vec![SnapshotEntry {
            ticker: "AMZN".to_string(),
            status: TradeStatus::Buy,
            sentiment: Sentiment::Bullish,
            price: None,
            position: PositionSize {
                qty: Some(10.0),
                avg: Some(178.5),
            },
            pl_pct: None,
            flow: "Positive tilt".to_string(),
            resistance: None,
            breakout_watch: None,
            idea: String::new(),
        }],
    }
}
