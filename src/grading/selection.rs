//! Manual selection scoring and the feedback → selection bridge.

use std::collections::BTreeSet;

use super::reconcile::ItemIndex;
use super::{GradeOutcome, GradedHit};
use crate::rubric::Rubric;

pub const MANUAL_SELECTION_COMMENT: &str = "Manually selected";

/// Score a set of selected item ids against the canonical rubric.
///
/// Items are emitted in document order; unselected items are skipped and
/// unknown ids are ignored.
pub fn score_selections(selected: &BTreeSet<String>, rubric: &Rubric) -> GradeOutcome {
    let mut outcome = GradeOutcome::default();
    for entry in rubric.items().filter(|r| selected.contains(&r.item.id)) {
        outcome.total = outcome.total.saturating_add(entry.item.points);
        outcome.hits.push(GradedHit {
            section: entry.section.title.clone(),
            criterion: entry.item.title.clone(),
            item_id: Some(entry.item.id.clone()),
            points: entry.item.points,
            comment: MANUAL_SELECTION_COMMENT.to_string(),
        });
    }
    outcome
}

/// Recover the selection set implied by a stored feedback list.
///
/// Lets a manual editing session start from an AI-graded result so the two
/// paths converge. Hits are resolved the same way the reconciler does it.
pub fn selections_from_feedback(feedback: &[GradedHit], rubric: &Rubric) -> BTreeSet<String> {
    let index = ItemIndex::build(rubric);
    feedback
        .iter()
        .filter_map(|hit| {
            index.resolve(
                hit.item_id.as_deref(),
                Some(hit.section.as_str()),
                Some(hit.criterion.as_str()),
            )
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::reconcile;
    use crate::rubric::normalize;
    use serde_json::json;

    fn rubric() -> Rubric {
        normalize(Some(&json!({
            "sections": [
                {"title": "Method 1",
                 "rubricItems": [{"title": "Setup", "points": 5}],
                 "parts": [{"title": "(a)", "rubricItems": [{"title": "Answer", "points": 3}]}]},
                {"title": "Method 2", "criteria": [{"text": "Alt setup", "points": 8}]}
            ]
        })))
    }

    #[test]
    fn emits_selected_items_in_document_order() {
        let selected: BTreeSet<String> = ["item-1-0", "item-0-0-0", "item-0-0", "ghost"]
            .into_iter()
            .map(String::from)
            .collect();
        let outcome = score_selections(&selected, &rubric());
        assert_eq!(outcome.total, 16);
        let ids: Vec<_> = outcome.hits.iter().map(|h| h.item_id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["item-0-0", "item-0-0-0", "item-1-0"]);
        assert!(outcome.hits.iter().all(|h| h.comment == MANUAL_SELECTION_COMMENT));
        assert_eq!(outcome.hits[1].section, "Method 1");
    }

    #[test]
    fn empty_selection_scores_zero() {
        let outcome = score_selections(&BTreeSet::new(), &rubric());
        assert_eq!(outcome, GradeOutcome::default());
    }

    #[test]
    fn ai_feedback_round_trips_into_the_same_score() {
        let rubric = rubric();
        let ai = reconcile(
            r#"{"hits": [{"section": "Method 1", "criterion": "Answer", "points": 30}, {"itemId": "item-0-0"}]}"#,
            &rubric,
            8,
        );
        let selected = selections_from_feedback(&ai.hits, &rubric);
        let manual = score_selections(&selected, &rubric);
        assert_eq!(manual.total, ai.total);

        // legacy feedback without item ids still resolves by titles
        let legacy = vec![GradedHit {
            section: "Method 2".into(),
            criterion: "Alt setup".into(),
            item_id: None,
            points: 0,
            comment: String::new(),
        }];
        let selected = selections_from_feedback(&legacy, &rubric);
        assert!(selected.contains("item-1-0"));
    }
}
