// LLM prompt constants for plan generation.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, STRICT_NO_PROSE};
use crate::plan::canonical::SanitizedState;

/// Role and data rules shared by both stages.
pub const PLAN_SYSTEM: &str = "You are a brokerage trade agent that returns structured DATA ONLY.

RULES:
- Keys and types must match the schema. Unknown values are null.
- Include OWNED tickers ONLY (from STATE.positions).";

/// Document schema, names and types.
pub const PLAN_SCHEMA: &str = r#"{
  "version": number,
  "market_pulse": [
    { "ticker": string, "benchmark": string, "signal": "outperform"|"inline"|"lagging", "note": string }
  ],
  "cash_tracker": {
    "sleeve_value": number|null,
    "cash_available": number|null,
    "invested": number|null,
    "active_triggers": string[],
    "playbook": string
  },
  "portfolio_snapshot": [
    {
      "ticker": string,
      "status": "HOLD"|"BUY"|"TRIM",
      "sentiment": "Bullish"|"Neutral"|"Bearish",
      "price": number|null,
      "position": { "qty": number|null, "avg": number|null },
      "pl_pct": number|null,
      "flow": string,
      "resistance": string|null,
      "breakout_watch": { "gt": number|null, "targets": number[] }|null,
      "idea": string
    }
  ]
}"#;

/// Stage A prompt. Replace `{state_json}` and `{schema}` before sending.
pub const PRIMARY_PROMPT_TEMPLATE: &str = "STATE (owned only):
{state_json}

SCHEMA (names + types):
{schema}

Return ONLY one JSON object matching the SCHEMA. version = 1.";

/// Stage B prompt. Replace `{critique}`, `{state_json}` and `{schema}` before sending.
pub const CORRECTIVE_PROMPT_TEMPLATE: &str = "Previous reply invalid: {critique}
Fix it now. Return ONLY one JSON object matching the SCHEMA. No prose; unknowns are null. version = 1.

STATE:
{state_json}

SCHEMA (names + types):
{schema}";

/// System message for a stage. The corrective stage adds the strict no-prose rule.
pub fn system_prompt(corrective: bool) -> String {
    if corrective {
        format!("{PLAN_SYSTEM}\n\n{JSON_ONLY_SYSTEM} {STRICT_NO_PROSE}")
    } else {
        format!("{PLAN_SYSTEM}\n\n{JSON_ONLY_SYSTEM}")
    }
}

pub fn primary_prompt(state: &SanitizedState) -> String {
    PRIMARY_PROMPT_TEMPLATE
        .replace("{state_json}", &state.canonical_json())
        .replace("{schema}", PLAN_SCHEMA)
}

pub fn corrective_prompt(state: &SanitizedState, critique: &str) -> String {
    CORRECTIVE_PROMPT_TEMPLATE
        .replace("{critique}", critique)
        .replace("{state_json}", &state.canonical_json())
        .replace("{schema}", PLAN_SCHEMA)
}
