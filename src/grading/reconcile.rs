//! Map untrusted model hits onto canonical rubric items.
//!
//! Each raw hit is resolved by exact `itemId` first, then by the composite key
//! `"{section title}||{criterion title}"`. Part items are keyed by their parent
//! section's title, not the part's. Unresolved hits are dropped, as are later
//! hits resolving to an item already hit. Points always come from the rubric;
//! the model's per-hit points and its `total` are never trusted.
//!
//! Note that the hit list is deduplicated, not passed through: when the model
//! lists one item twice, only the first hit is kept and the item is paid once.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use super::extract::parse_model_json;
use super::{GradeOutcome, GradedHit};
use crate::rubric::Rubric;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("empty model response")]
    Empty,
    #[error("no JSON object in model response")]
    NoJsonObject,
    #[error("invalid JSON in model response: {0}")]
    Parse(String),
    #[error("model response has no `hits` array")]
    MissingHits,
}

#[derive(Debug, Clone)]
struct IndexedItem {
    id: String,
    section_title: String,
    title: String,
    points: u64,
}

/// Flattened lookup tables over a canonical rubric.
#[derive(Debug, Clone, Default)]
pub struct ItemIndex {
    items: Vec<IndexedItem>,
    by_id: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
}

pub fn composite_key(section: &str, criterion: &str) -> String {
    format!("{}||{}", section.trim(), criterion.trim())
}

impl ItemIndex {
    pub fn build(rubric: &Rubric) -> Self {
        let mut index = Self::default();
        for entry in rubric.items() {
            let pos = index.items.len();
            index.items.push(IndexedItem {
                id: entry.item.id.clone(),
                section_title: entry.section.title.clone(),
                title: entry.item.title.clone(),
                points: entry.item.points,
            });
            index.by_id.entry(entry.item.id.clone()).or_insert(pos);
            // first item in document order wins a title collision
            index
                .by_key
                .entry(composite_key(&entry.section.title, &entry.item.title))
                .or_insert(pos);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Resolve to an item id, preferring `item_id` over the title pair.
    pub fn resolve(
        &self,
        item_id: Option<&str>,
        section: Option<&str>,
        criterion: Option<&str>,
    ) -> Option<&str> {
        self.resolve_pos(item_id, section, criterion)
            .map(|pos| self.items[pos].id.as_str())
    }

    fn resolve_pos(
        &self,
        item_id: Option<&str>,
        section: Option<&str>,
        criterion: Option<&str>,
    ) -> Option<usize> {
        if let Some(pos) = item_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| self.by_id.get(id))
        {
            return Some(*pos);
        }
        match (section, criterion) {
            (Some(section), Some(criterion)) => {
                self.by_key.get(&composite_key(section, criterion)).copied()
            }
            _ => None,
        }
    }
}

fn str_field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| raw.get(*k).and_then(Value::as_str))
}

/// Reconcile model text against the canonical rubric, surfacing failures.
pub fn try_reconcile(model_text: &str, rubric: &Rubric) -> Result<GradeOutcome, ReconcileError> {
    let parsed = parse_model_json(model_text)?;
    let raw_hits = parsed
        .get("hits")
        .and_then(Value::as_array)
        .ok_or(ReconcileError::MissingHits)?;

    let index = ItemIndex::build(rubric);
    let mut seen: HashSet<usize> = HashSet::new();
    let mut hits = Vec::with_capacity(raw_hits.len());
    let mut total: u64 = 0;

    for (n, raw) in raw_hits.iter().enumerate() {
        let section = str_field(raw, &["section"]);
        let criterion = str_field(raw, &["criterion"]);
        let item_id = str_field(raw, &["itemId", "item_id"]);

        let Some(pos) = index.resolve_pos(item_id, section, criterion) else {
            debug!(hit = n, ?section, ?criterion, ?item_id, "dropping unmatched hit");
            continue;
        };
        if !seen.insert(pos) {
            debug!(hit = n, item = %index.items[pos].id, "dropping duplicate hit");
            continue;
        }

        let item = &index.items[pos];
        if let Some(claimed) = raw.get("points").and_then(Value::as_f64) {
            if claimed != item.points as f64 {
                debug!(item = %item.id, claimed, canonical = item.points, "overriding model points");
            }
        }
        total = total.saturating_add(item.points);
        hits.push(GradedHit {
            section: item.section_title.clone(),
            criterion: item.title.clone(),
            item_id: Some(item.id.clone()),
            points: item.points,
            comment: str_field(raw, &["comment"]).unwrap_or_default().to_string(),
        });
    }

    if let Some(hint) = parsed.get("total").and_then(Value::as_f64) {
        if hint != total as f64 {
            debug!(model_total = hint, total, "model total disagrees with recomputed total");
        }
    }

    Ok(GradeOutcome { total, hits })
}

/// Reconcile model text, failing open to full credit on any failure.
pub fn reconcile(model_text: &str, rubric: &Rubric, declared_total: u64) -> GradeOutcome {
    match try_reconcile(model_text, rubric) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, declared_total, "unusable grading response; defaulting to full credit");
            GradeOutcome::full_credit(declared_total)
        }
    }
}
