//! Canonical rubric model.
//!
//! Every persisted or generated rubric, whatever shape it arrived in, is
//! turned into this one hierarchical form by [`normalize`]. Nothing downstream
//! (points, validity, reconciliation, manual scoring) ever looks at the legacy
//! shapes again.

pub mod edit;
pub mod normalize;
pub mod points;

use serde::{Deserialize, Serialize};

pub use edit::{EditError, RubricEditor};
pub use normalize::{normalize, normalize_json};
pub use points::{
    assess, is_valid, part_points, section_points, total_points, PointsBreakdown, RubricStatus,
    SectionPoints,
};

// =============================================================================
// Types
// =============================================================================

/// A single point-bearing rubric entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricItem {
    pub id: String,
    pub title: String,
    pub points: u64,
    #[serde(default)]
    pub feedback: String,
    /// Alternative phrasings carried over from legacy `criteria` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

impl RubricItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, points: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            points,
            feedback: String::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }
}

/// Optional grouping of items under a section (e.g. "Part (a)").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricPart {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub rubric_items: Vec<RubricItem>,
}

/// One top-level section; conceptually an alternative solution path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub rubric_items: Vec<RubricItem>,
    #[serde(default)]
    pub parts: Vec<RubricPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    pub sections: Vec<RubricSection>,
}

/// An item together with where it sits in the rubric.
#[derive(Debug, Clone, Copy)]
pub struct ItemRef<'a> {
    pub section: &'a RubricSection,
    pub part: Option<&'a RubricPart>,
    pub item: &'a RubricItem,
}

impl Rubric {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Walk every item in document order: a section's direct items first,
    /// then each of its parts' items.
    pub fn items(&self) -> impl Iterator<Item = ItemRef<'_>> {
        self.sections.iter().flat_map(|section| {
            let direct = section.rubric_items.iter().map(move |item| ItemRef {
                section,
                part: None,
                item,
            });
            let nested = section.parts.iter().flat_map(move |part| {
                part.rubric_items.iter().map(move |item| ItemRef {
                    section,
                    part: Some(part),
                    item,
                })
            });
            direct.chain(nested)
        })
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn find_item(&self, id: &str) -> Option<ItemRef<'_>> {
        self.items().find(|r| r.item.id == id)
    }

    /// Content hash of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}
