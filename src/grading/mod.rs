//! Scoring paths: AI-response reconciliation and manual selection scoring.
//!
//! Both paths produce the same [`GradeOutcome`] and both take every point
//! value from the canonical rubric, never from the caller or the model.

pub mod extract;
pub mod reconcile;
pub mod selection;

use serde::{Deserialize, Serialize};

pub use extract::{extract_json_span, parse_model_json, repair_trailing_commas};
pub use reconcile::{reconcile, try_reconcile, ItemIndex, ReconcileError};
pub use selection::{score_selections, selections_from_feedback, MANUAL_SELECTION_COMMENT};

/// A rubric item asserted as satisfied, with its point value and justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedHit {
    pub section: String,
    pub criterion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub points: u64,
    #[serde(default)]
    pub comment: String,
}

/// Result of a grading pass; `hits` is the submission's feedback list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub total: u64,
    pub hits: Vec<GradedHit>,
}

impl GradeOutcome {
    /// The fail-open default: full credit, no hits.
    pub fn full_credit(declared_total: u64) -> Self {
        Self {
            total: declared_total,
            hits: Vec::new(),
        }
    }
}
