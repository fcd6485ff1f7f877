//! Free-text hint extraction.
//!
//! Every heuristic that reads meaning out of loosely-typed position text lives
//! here, as pure functions over `&str`. Pattern table (case-insensitive):
//!
//! | Hint | Pattern | Result |
//! |------|---------|--------|
//! | status label | contains `BUY` | `BUY` |
//! | status label | contains `TRIM` or `SELL` | `TRIM` |
//! | status label | anything else | `HOLD` |
//! | note verbs | `trim`, `reduce`, `sell`, `take profit` | `TRIM` |
//! | note verbs | `add`, `buy`, `enter`, `scale in` | `BUY` |
//! | sentiment label | starts with `bull` / `bear` | `Bullish` / `Bearish`, else `Neutral` |
//! | resistance | first `N-N` (hyphen, en or em dash) | `"N–N"` |
//! | breakout level | first `>N` not part of `->`, else `above N` / `over N` / `break(s) above N` | `gt = N` |
//! | breakout targets | first `to N`, `-> N` or `→ N` after the breakout level; `N/N` lists | `targets` |
//!
//! Tie-breaks: status labels are checked for `BUY` before `TRIM`; note verbs for
//! `TRIM` before `BUY`. A level word must be followed directly by a number, so
//! "breakout above resistance near 240–245" yields a resistance range and no
//! breakout level. Targets are only read after a breakout level was found.

use std::sync::LazyLock;

use regex::Regex;

use crate::plan::document::{BreakoutWatch, Sentiment, TradeStatus};

static TRIM_VERBS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:trim|reduce|sell|take\s*profits?)\b").unwrap());

static BUY_VERBS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:add|buy|enter|scale\s*in)\b").unwrap());

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$?(\d+(?:\.\d+)?)\s*[-–—]\s*\$?(\d+(?:\.\d+)?)").unwrap()
});

/// `>` that is not the tail of an ASCII arrow.
static GT_SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^-])>\s*\$?(\d+(?:\.\d+)?)").unwrap());

static GT_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:breaks?\s+(?:above|over)|above|over)\s*\$?(\d+(?:\.\d+)?)").unwrap()
});

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bto\b|->|→)\s*\$?(\d+(?:\.\d+)?(?:\s*/\s*\$?\d+(?:\.\d+)?)*)").unwrap()
});

/// Price levels read from position notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Levels {
    pub resistance: Option<String>,
    pub breakout_watch: Option<BreakoutWatch>,
}

/// Maps an explicit status/action label by substring.
pub fn status_from_label(label: &str) -> TradeStatus {
    let label = label.to_uppercase();
    if label.contains("BUY") {
        TradeStatus::Buy
    } else if label.contains("TRIM") || label.contains("SELL") {
        TradeStatus::Trim
    } else {
        TradeStatus::Hold
    }
}

/// Infers a status from trade verbs in free text. `None` when no verb is present.
pub fn status_from_notes(notes: &str) -> Option<TradeStatus> {
    if TRIM_VERBS_RE.is_match(notes) {
        Some(TradeStatus::Trim)
    } else if BUY_VERBS_RE.is_match(notes) {
        Some(TradeStatus::Buy)
    } else {
        None
    }
}

pub fn sentiment_from_label(label: &str) -> Sentiment {
    let label = label.trim().to_lowercase();
    if label.starts_with("bull") {
        Sentiment::Bullish
    } else if label.starts_with("bear") {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

pub fn levels_from_notes(notes: &str) -> Levels {
    let resistance = RANGE_RE
        .captures(notes)
        .map(|caps| format!("{}–{}", &caps[1], &caps[2]));

    let breakout = GT_SYMBOL_RE
        .captures(notes)
        .or_else(|| GT_WORD_RE.captures(notes))
        .and_then(|caps| {
            let level = caps[1].parse::<f64>().ok()?;
            Some((level, caps.get(0)?.end()))
        });

    let breakout_watch = breakout.map(|(gt, end)| BreakoutWatch {
        gt: Some(gt),
        targets: targets_after(&notes[end..]),
    });

    Levels {
        resistance,
        breakout_watch,
    }
}

fn targets_after(rest: &str) -> Vec<f64> {
    TARGET_RE
        .captures(rest)
        .map(|caps| {
            caps[1]
                .split('/')
                .filter_map(|t| t.trim().trim_start_matches('$').parse::<f64>().ok())
                .collect()
        })
        .unwrap_or_default()
}
