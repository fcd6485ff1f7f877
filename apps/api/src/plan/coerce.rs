//! Schema coercion: upgrades a best-effort model object into plan sections,
//! using the sanitized input as the fallback source.
//!
//! Rules:
//! - `portfolio_snapshot` present → every item is normalized field by field;
//!   absent → one entry per position (the reply's own `positions` list when it
//!   sent one, otherwise the input positions).
//! - `market_pulse` absent → one row per snapshot entry, signal from sentiment.
//! - `cash_tracker` absent or malformed → computed from the input cash, when
//!   the input has any. Without a cash source the section stays missing and the
//!   draft fails validation.
//! - Entries whose ticker is not an input position are dropped.

use serde_json::{Map, Value};

use crate::plan::canonical::SanitizedState;
use crate::plan::document::{
    BreakoutWatch, CashTracker, PositionSize, PulseRow, Signal, SnapshotEntry, TradeStatus,
    DEFAULT_BENCHMARK,
};
use crate::plan::hints::{
    levels_from_notes, sentiment_from_label, status_from_label, status_from_notes,
};

const QTY_FIELDS: &[&str] = &["qty", "quantity", "shares"];
const AVG_FIELDS: &[&str] = &["avg", "avg_cost", "average_cost"];
const STATUS_FIELDS: &[&str] = &["status", "action"];
const NOTES_FIELDS: &[&str] = &["notes", "idea"];
const IDEA_FIELDS: &[&str] = &["idea", "notes"];
const SENTIMENT_FIELDS: &[&str] = &["sentiment"];

/// Coerced plan sections, before the shape check.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDraft {
    pub version: i64,
    pub market_pulse: Option<Vec<PulseRow>>,
    pub cash_tracker: Option<CashTracker>,
    pub portfolio_snapshot: Option<Vec<SnapshotEntry>>,
}

pub fn coerce(reply: &Map<String, Value>, state: &SanitizedState) -> PlanDraft {
    let owned = state.owned_tickers();

    let source_items: &[Value] = match (reply.get("portfolio_snapshot"), reply.get("positions")) {
        (Some(Value::Array(items)), _) => items.as_slice(),
        (_, Some(Value::Array(positions))) => positions.as_slice(),
        _ => state.positions.as_slice(),
    };
    let portfolio_snapshot: Vec<SnapshotEntry> = source_items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| snapshot_entry(item, state))
        .filter(|entry| owned.contains(&entry.ticker))
        .collect();

    let market_pulse: Vec<PulseRow> = match reply.get("market_pulse") {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| pulse_row(row, &portfolio_snapshot, state))
            .filter(|row| owned.contains(&row.ticker))
            .collect(),
        _ => portfolio_snapshot
            .iter()
            .map(|entry| derived_pulse_row(entry, state))
            .collect(),
    };

    let cash_tracker = match reply.get("cash_tracker") {
        Some(Value::Object(tracker)) => Some(cash_tracker(tracker, &portfolio_snapshot)),
        _ => state
            .cash_object()
            .map(|cash| cash_tracker(cash, &portfolio_snapshot)),
    };

    PlanDraft {
        version: reply.get("version").and_then(Value::as_i64).unwrap_or(1),
        market_pulse: Some(market_pulse),
        cash_tracker,
        portfolio_snapshot: Some(portfolio_snapshot),
    }
}

/// Normalizes one snapshot item, filling gaps from the matching input position.
fn snapshot_entry(item: &Map<String, Value>, state: &SanitizedState) -> Option<SnapshotEntry> {
    let ticker = text(item.get("ticker"))?.to_uppercase();
    let fallback = state.position(&ticker);
    let field = |name: &str| {
        item.get(name)
            .filter(|v| !v.is_null())
            .or_else(|| fallback.and_then(|p| p.get(name)))
    };
    let first_text = |names: &[&str]| names.iter().find_map(|&name| text(field(name)));

    let notes = first_text(NOTES_FIELDS).unwrap_or_default();
    let status = match first_text(STATUS_FIELDS) {
        Some(label) => status_from_label(&label),
        None => status_from_notes(&notes).unwrap_or(TradeStatus::Hold),
    };
    let sentiment = sentiment_from_label(&first_text(SENTIMENT_FIELDS).unwrap_or_default());
    let levels = levels_from_notes(&notes);

    let nested = item.get("position").and_then(Value::as_object);
    let size_field = |names: &[&str], short: &str| {
        nested
            .and_then(|p| number(p.get(short)))
            .or_else(|| names.iter().find_map(|&name| number(field(name))))
    };

    Some(SnapshotEntry {
        price: number(field("price")),
        position: PositionSize {
            qty: size_field(QTY_FIELDS, "qty"),
            avg: size_field(AVG_FIELDS, "avg"),
        },
        pl_pct: number(field("pl_pct")),
        flow: text(item.get("flow")).unwrap_or_else(|| sentiment.default_flow().to_string()),
        resistance: level_text(item.get("resistance")).or(levels.resistance),
        breakout_watch: item
            .get("breakout_watch")
            .and_then(Value::as_object)
            .map(breakout_watch)
            .or(levels.breakout_watch),
        idea: first_text(IDEA_FIELDS).unwrap_or_default(),
        ticker,
        status,
        sentiment,
    })
}

fn pulse_row(
    row: &Map<String, Value>,
    snapshot: &[SnapshotEntry],
    state: &SanitizedState,
) -> Option<PulseRow> {
    let ticker = text(row.get("ticker"))?.to_uppercase();
    let signal = text(row.get("signal"))
        .and_then(|label| signal_from_label(&label))
        .unwrap_or_else(|| {
            snapshot
                .iter()
                .find(|entry| entry.ticker == ticker)
                .map(|entry| Signal::from_sentiment(entry.sentiment))
                .unwrap_or(Signal::Inline)
        });
    Some(PulseRow {
        benchmark: text(row.get("benchmark")).unwrap_or_else(|| benchmark(&ticker, state)),
        note: text(row.get("note")).unwrap_or_else(|| signal.canned_note().to_string()),
        ticker,
        signal,
    })
}

fn derived_pulse_row(entry: &SnapshotEntry, state: &SanitizedState) -> PulseRow {
    let signal = Signal::from_sentiment(entry.sentiment);
    PulseRow {
        ticker: entry.ticker.clone(),
        benchmark: benchmark(&entry.ticker, state),
        signal,
        note: signal.canned_note().to_string(),
    }
}

/// Builds a tracker from either a model-supplied tracker or the input cash
/// record; both use the same field names.
fn cash_tracker(source: &Map<String, Value>, snapshot: &[SnapshotEntry]) -> CashTracker {
    let sleeve_value = number(source.get("sleeve_value"));
    let cash_available = number(source.get("cash_available"));
    let invested = number(source.get("invested")).or(match (sleeve_value, cash_available) {
        (Some(sleeve), Some(available)) => Some(sleeve - available),
        _ => None,
    });
    let active_triggers = match source.get("active_triggers") {
        Some(Value::Array(triggers)) => triggers
            .iter()
            .filter_map(|t| match t {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    CashTracker {
        sleeve_value,
        cash_available,
        invested,
        active_triggers,
        playbook: text(source.get("playbook")).unwrap_or_else(|| default_playbook(snapshot)),
    }
}

fn default_playbook(snapshot: &[SnapshotEntry]) -> String {
    let buyable: Vec<&str> = snapshot
        .iter()
        .filter(|entry| entry.status == TradeStatus::Buy)
        .map(|entry| entry.ticker.as_str())
        .collect();
    if buyable.is_empty() {
        "Maintain flexibility; deploy on high-conviction breakouts only.".to_string()
    } else {
        format!(
            "Watch breakouts on {}; deploy only on confirmation.",
            buyable.join(", ")
        )
    }
}

fn breakout_watch(source: &Map<String, Value>) -> BreakoutWatch {
    BreakoutWatch {
        gt: number(source.get("gt")),
        targets: match source.get("targets") {
            Some(Value::Array(targets)) => targets.iter().filter_map(|t| number(Some(t))).collect(),
            other => number(other).into_iter().collect(),
        },
    }
}

fn signal_from_label(label: &str) -> Option<Signal> {
    let label = label.to_lowercase();
    if label.contains("outperform") {
        Some(Signal::Outperform)
    } else if label.contains("lag") || label.contains("underperform") {
        Some(Signal::Lagging)
    } else if label.contains("inline") || label.contains("in line") || label.contains("in-line") {
        Some(Signal::Inline)
    } else {
        None
    }
}

fn benchmark(ticker: &str, state: &SanitizedState) -> String {
    state
        .benchmark_for(ticker)
        .unwrap_or(DEFAULT_BENCHMARK)
        .to_string()
}

/// Number or numeric string (`"$1,250.50"`, `"12%"`); anything else is null.
pub fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .trim_end_matches('%')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.trim().parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn level_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        other => text(Some(other)),
    }
}
