//! Top-level shape check gating whether a coerced draft may be stored.
//!
//! Only section presence is checked. Individual fields inside a validated
//! document can still be null.

use thiserror::Error;

use crate::plan::coerce::PlanDraft;
use crate::plan::document::PlanDocument;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plan is missing {}", .missing.join(", "))]
pub struct ShapeError {
    /// Names of the missing top-level sections, in document order.
    pub missing: Vec<&'static str>,
}

impl ShapeError {
    /// Deterministic critique embedded in the corrective prompt.
    pub fn critique(&self) -> String {
        self.missing
            .iter()
            .map(|section| match *section {
                "cash_tracker" => "missing cash_tracker{}".to_string(),
                other => format!("missing {other}[]"),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn validate(draft: PlanDraft) -> Result<PlanDocument, ShapeError> {
    match draft {
        PlanDraft {
            version,
            market_pulse: Some(market_pulse),
            cash_tracker: Some(cash_tracker),
            portfolio_snapshot: Some(portfolio_snapshot),
        } => Ok(PlanDocument {
            version,
            market_pulse,
            cash_tracker,
            portfolio_snapshot,
        }),
        draft => {
            let mut missing = Vec::new();
            if draft.market_pulse.is_none() {
                missing.push("market_pulse");
            }
            if draft.cash_tracker.is_none() {
                missing.push("cash_tracker");
            }
            if draft.portfolio_snapshot.is_none() {
                missing.push("portfolio_snapshot");
            }
            Err(ShapeError { missing })
        }
    }
}
