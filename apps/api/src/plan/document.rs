//! The canonical plan document and its enumerated labels.

use serde::{Deserialize, Serialize};

/// Benchmark used when the portfolio names none for a ticker.
pub const DEFAULT_BENCHMARK: &str = "QQQ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Outperform,
    Inline,
    Lagging,
}

impl Signal {
    pub fn from_sentiment(sentiment: Sentiment) -> Self {
        match sentiment {
            Sentiment::Bullish => Signal::Outperform,
            Sentiment::Bearish => Signal::Lagging,
            Sentiment::Neutral => Signal::Inline,
        }
    }

    /// Short note used when the model supplied none.
    pub fn canned_note(self) -> &'static str {
        match self {
            Signal::Outperform => "bullish setup",
            Signal::Lagging => "under pressure",
            Signal::Inline => "holding steady",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    #[default]
    Hold,
    Buy,
    Trim,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    #[default]
    Neutral,
    Bearish,
}

impl Sentiment {
    /// Default `flow` text for a snapshot entry.
    pub fn default_flow(self) -> &'static str {
        match self {
            Sentiment::Bullish => "Positive tilt",
            Sentiment::Bearish => "Cautious",
            Sentiment::Neutral => "Neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseRow {
    pub ticker: String,
    pub benchmark: String,
    pub signal: Signal,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashTracker {
    pub sleeve_value: Option<f64>,
    pub cash_available: Option<f64>,
    pub invested: Option<f64>,
    pub active_triggers: Vec<String>,
    pub playbook: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub qty: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutWatch {
    pub gt: Option<f64>,
    pub targets: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub ticker: String,
    pub status: TradeStatus,
    pub sentiment: Sentiment,
    pub price: Option<f64>,
    pub position: PositionSize,
    pub pl_pct: Option<f64>,
    pub flow: String,
    pub resistance: Option<String>,
    pub breakout_watch: Option<BreakoutWatch>,
    pub idea: String,
}

/// A validated plan. Stored once under its job key and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub version: i64,
    pub market_pulse: Vec<PulseRow>,
    pub cash_tracker: CashTracker,
    pub portfolio_snapshot: Vec<SnapshotEntry>,
}
