//! Point aggregation and validity checking over canonical rubrics.

use serde::{Deserialize, Serialize};

use super::{Rubric, RubricPart, RubricSection};

/// Saturating sum; point values come from untrusted JSON and may be huge.
pub(crate) fn sum_points(points: impl IntoIterator<Item = u64>) -> u64 {
    points.into_iter().fold(0, u64::saturating_add)
}

/// Sum of a part's item points.
pub fn part_points(part: &RubricPart) -> u64 {
    sum_points(part.rubric_items.iter().map(|it| it.points))
}

fn direct_points(section: &RubricSection) -> u64 {
    sum_points(section.rubric_items.iter().map(|it| it.points))
}

/// A section's total contribution: direct items plus every part's items.
pub fn section_points(section: &RubricSection) -> u64 {
    direct_points(section).saturating_add(sum_points(section.parts.iter().map(part_points)))
}

/// Total points across all sections combined.
pub fn total_points(rubric: &Rubric) -> u64 {
    sum_points(rubric.sections.iter().map(section_points))
}

/// Whether the rubric-wide total equals the assignment's declared total.
///
/// The check is over all sections combined, not per section. Exact equality,
/// no tolerance.
pub fn is_valid(rubric: &Rubric, declared_total: u64) -> bool {
    total_points(rubric) == declared_total
}

/// The validity pair persisted on an assignment after every rubric mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricStatus {
    pub rubric_valid: bool,
    pub rubric_points: u64,
}

pub fn assess(rubric: &Rubric, declared_total: u64) -> RubricStatus {
    let rubric_points = total_points(rubric);
    RubricStatus {
        rubric_valid: rubric_points == declared_total,
        rubric_points,
    }
}

// =============================================================================
// Breakdown
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartPoints {
    pub id: String,
    pub title: String,
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPoints {
    pub id: String,
    pub title: String,
    pub direct_points: u64,
    pub parts: Vec<PartPoints>,
    pub total: u64,
}

/// Points at section, part and whole-rubric granularity.
///
/// Per-section totals are informational: alternative-path rubrics often have
/// each section worth the full total, but validity only looks at `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsBreakdown {
    pub sections: Vec<SectionPoints>,
    pub total: u64,
}

impl PointsBreakdown {
    pub fn of(rubric: &Rubric) -> Self {
        let sections: Vec<SectionPoints> = rubric
            .sections
            .iter()
            .map(|section| SectionPoints {
                id: section.id.clone(),
                title: section.title.clone(),
                direct_points: direct_points(section),
                parts: section
                    .parts
                    .iter()
                    .map(|part| PartPoints {
                        id: part.id.clone(),
                        title: part.title.clone(),
                        points: part_points(part),
                    })
                    .collect(),
                total: section_points(section),
            })
            .collect();
        let total = sum_points(sections.iter().map(|s| s.total));
        Self { sections, total }
    }
}
