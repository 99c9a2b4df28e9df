//! Schema normalizer: any supported rubric shape in, one canonical [`Rubric`] out.
//!
//! Two historical shapes are accepted:
//!
//! - legacy flat sections: `{ title, points, criteria: [{ text, points, comment, alternatives }] }`
//! - hierarchical sections: `{ id, title, rubricItems: [...], parts: [{ id, title, rubricItems }] }`
//!
//! Missing ids are derived from position only (`section-{s}`, `part-{s}-{p}`,
//! `item-{s}-{i}`, `item-{s}-{p}-{i}`), so normalizing the same input twice
//! yields the same ids, and normalizing canonical output changes nothing.
//! Malformed input never fails; it degrades to empty or default structures.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use super::{Rubric, RubricItem, RubricPart, RubricSection};

/// Normalize an arbitrary JSON value into the canonical rubric form.
pub fn normalize(raw: Option<&Value>) -> Rubric {
    let Some(sections) = raw
        .and_then(|v| v.get("sections"))
        .and_then(Value::as_array)
    else {
        return Rubric::empty();
    };

    let mut ids = IdRegistry::reserving(sections);
    let sections = sections
        .iter()
        .enumerate()
        .map(|(s_idx, raw_section)| normalize_section(s_idx, raw_section, &mut ids))
        .collect();

    Rubric { sections }
}

/// Normalize rubric JSON text. Unparsable text yields an empty rubric.
pub fn normalize_json(text: &str) -> Rubric {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => normalize(Some(&value)),
        Err(err) => {
            debug!(error = %err, "rubric text is not JSON; using empty rubric");
            Rubric::empty()
        }
    }
}

fn normalize_section(s_idx: usize, raw: &Value, ids: &mut IdRegistry) -> RubricSection {
    let id = ids.claim(non_empty_str(raw, "id"), format!("section-{s_idx}"));
    let title = non_empty_str(raw, "title")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Section {}", s_idx + 1));

    let rubric_items = match section_items(raw) {
        Some((items, true)) => items
            .iter()
            .enumerate()
            .map(|(i_idx, it)| normalize_item(it, format!("item-{s_idx}-{i_idx}"), i_idx, ids))
            .collect(),
        Some((criteria, false)) => criteria
            .iter()
            .enumerate()
            .map(|(i_idx, c)| normalize_criterion(c, format!("item-{s_idx}-{i_idx}"), i_idx, ids))
            .collect(),
        None => Vec::new(),
    };

    let parts = raw
        .get("parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .enumerate()
                .map(|(p_idx, p)| normalize_part(s_idx, p_idx, p, ids))
                .collect()
        })
        .unwrap_or_default();

    RubricSection {
        id,
        title,
        rubric_items,
        parts,
    }
}

fn normalize_part(s_idx: usize, p_idx: usize, raw: &Value, ids: &mut IdRegistry) -> RubricPart {
    let id = ids.claim(non_empty_str(raw, "id"), format!("part-{s_idx}-{p_idx}"));
    let title = non_empty_str(raw, "title")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Part {}", p_idx + 1));
    let rubric_items = raw
        .get("rubricItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(i_idx, it)| {
                    normalize_item(it, format!("item-{s_idx}-{p_idx}-{i_idx}"), i_idx, ids)
                })
                .collect()
        })
        .unwrap_or_default();

    RubricPart {
        id,
        title,
        rubric_items,
    }
}

/// Hierarchical `rubricItems` entry.
fn normalize_item(raw: &Value, positional: String, i_idx: usize, ids: &mut IdRegistry) -> RubricItem {
    RubricItem {
        id: ids.claim(non_empty_str(raw, "id"), positional),
        title: non_empty_str(raw, "title")
            .or_else(|| non_empty_str(raw, "text"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Item {}", i_idx + 1)),
        points: coerce_points(raw.get("points")),
        feedback: non_empty_str(raw, "feedback")
            .or_else(|| non_empty_str(raw, "comment"))
            .unwrap_or_default()
            .to_string(),
        alternatives: alternatives(raw),
    }
}

/// Legacy `criteria` entry: `text` becomes the title, `comment` the feedback.
fn normalize_criterion(
    raw: &Value,
    positional: String,
    i_idx: usize,
    ids: &mut IdRegistry,
) -> RubricItem {
    RubricItem {
        id: ids.claim(non_empty_str(raw, "id"), positional),
        title: non_empty_str(raw, "text")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Item {}", i_idx + 1)),
        points: coerce_points(raw.get("points")),
        feedback: non_empty_str(raw, "comment").unwrap_or_default().to_string(),
        alternatives: alternatives(raw),
    }
}

/// A section's direct items and whether they are hierarchical `rubricItems`.
/// A present `rubricItems` array wins over legacy `criteria`, even when empty.
fn section_items(raw: &Value) -> Option<(&Vec<Value>, bool)> {
    match raw.get("rubricItems").and_then(Value::as_array) {
        Some(items) => Some((items, true)),
        None => raw
            .get("criteria")
            .and_then(Value::as_array)
            .map(|criteria| (criteria, false)),
    }
}

fn alternatives(raw: &Value) -> Vec<String> {
    raw.get("alternatives")
        .and_then(Value::as_array)
        .map(|alts| {
            alts.iter()
                .filter_map(|alt| match alt {
                    Value::String(s) => Some(s.trim()),
                    other => other.get("text").and_then(Value::as_str).map(str::trim),
                })
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_str<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Coerce an untyped points value to a non-negative integer.
///
/// Negative values clamp to 0, fractional values round, numeric strings parse,
/// anything else counts as 0.
pub(crate) fn coerce_points(raw: Option<&Value>) -> u64 {
    match raw {
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                float_points(f)
            } else {
                0
            }
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().map(float_points).unwrap_or(0),
        _ => 0,
    }
}

fn float_points(f: f64) -> u64 {
    if f.is_finite() && f > 0.0 {
        f.round() as u64
    } else {
        0
    }
}

/// Tracks ids already handed out so every node ends up with a unique id.
///
/// Every explicit id in the input is reserved up front, so a derived id never
/// takes a string that a later node carries as its own.
#[derive(Default)]
struct IdRegistry {
    reserved: HashSet<String>,
    seen: HashSet<String>,
}

impl IdRegistry {
    fn reserving(sections: &[Value]) -> Self {
        let mut reserved = HashSet::new();
        let mut reserve = |node: &Value| {
            if let Some(id) = non_empty_str(node, "id") {
                reserved.insert(id.to_string());
            }
        };
        for section in sections {
            reserve(section);
            if let Some((items, _)) = section_items(section) {
                items.iter().for_each(&mut reserve);
            }
            for part in section.get("parts").and_then(Value::as_array).into_iter().flatten() {
                reserve(part);
                part.get("rubricItems")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .for_each(&mut reserve);
            }
        }
        Self {
            reserved,
            seen: HashSet::new(),
        }
    }

    /// Keep `existing` on its first use. Otherwise derive from `positional`,
    /// suffixing it while it is taken or reserved.
    fn claim(&mut self, existing: Option<&str>, positional: String) -> String {
        if let Some(id) = existing {
            if self.seen.insert(id.to_string()) {
                return id.to_string();
            }
            debug!(id, "duplicate rubric id; re-deriving from position");
        }
        if self.take_derived(&positional) {
            return positional;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{positional}-{n}");
            if self.take_derived(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn take_derived(&mut self, candidate: &str) -> bool {
        !self.reserved.contains(candidate) && self.seen.insert(candidate.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_or_sectionless_input_is_empty() {
        assert!(normalize(None).is_empty());
        assert!(normalize(Some(&Value::Null)).is_empty());
        assert!(normalize(Some(&json!({"title": "no sections"}))).is_empty());
        assert!(normalize(Some(&json!({"sections": "nope"}))).is_empty());
        assert!(normalize_json("not json").is_empty());
    }

    #[test]
    fn legacy_criteria_become_items_with_positional_ids() {
        let raw = json!({
            "sections": [{
                "title": "Single-polynomial approach",
                "points": 10,
                "criteria": [
                    {"text": "Writes generating function", "points": 4, "comment": "key step"},
                    {"points": 6, "alternatives": [{"text": "closed form"}, "sum form"]}
                ]
            }]
        });
        let rubric = normalize(Some(&raw));
        let section = &rubric.sections[0];
        assert_eq!(section.id, "section-0");
        assert_eq!(section.title, "Single-polynomial approach");
        assert!(section.parts.is_empty());

        let items = &section.rubric_items;
        assert_eq!(items[0].id, "item-0-0");
        assert_eq!(items[0].title, "Writes generating function");
        assert_eq!(items[0].feedback, "key step");
        assert_eq!(items[1].id, "item-0-1");
        assert_eq!(items[1].title, "Item 2");
        assert_eq!(items[1].alternatives, vec!["closed form", "sum form"]);
    }

    #[test]
    fn hierarchical_ids_are_preserved_and_missing_ones_derived() {
        let raw = json!({
            "sections": [
                {"title": "A"},
                {
                    "id": "custom-section",
                    "rubricItems": [{"id": "keep-me", "title": "x", "points": 1}, {"title": "y", "points": 2}],
                    "parts": [
                        {"title": "Part (a)", "rubricItems": [{"title": "z", "points": 3}]},
                        {"id": "p-b", "rubricItems": [{"id": "", "points": 1}]}
                    ]
                }
            ]
        });
        let rubric = normalize(Some(&raw));
        assert_eq!(rubric.sections[0].id, "section-0");
        assert!(rubric.sections[0].rubric_items.is_empty());

        let s1 = &rubric.sections[1];
        assert_eq!(s1.id, "custom-section");
        assert_eq!(s1.title, "Section 2");
        assert_eq!(s1.rubric_items[0].id, "keep-me");
        assert_eq!(s1.rubric_items[1].id, "item-1-1");
        assert_eq!(s1.parts[0].id, "part-1-0");
        assert_eq!(s1.parts[0].rubric_items[0].id, "item-1-0-0");
        assert_eq!(s1.parts[1].id, "p-b");
        assert_eq!(s1.parts[1].title, "Part 2");
        assert_eq!(s1.parts[1].rubric_items[0].id, "item-1-1-0");
    }

    #[test]
    fn empty_rubric_items_array_wins_over_criteria() {
        let raw = json!({"sections": [{"rubricItems": [], "criteria": [{"text": "t", "points": 5}]}]});
        let rubric = normalize(Some(&raw));
        assert!(rubric.sections[0].rubric_items.is_empty());
    }

    #[test]
    fn duplicate_ids_are_made_unique() {
        let raw = json!({
            "sections": [{
                "rubricItems": [
                    {"id": "dup", "title": "a", "points": 1},
                    {"id": "dup", "title": "b", "points": 1},
                    {"id": "item-0-1", "title": "c", "points": 1}
                ]
            }]
        });
        let rubric = normalize(Some(&raw));
        let ids: Vec<&str> = rubric.items().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["dup", "item-0-1-2", "item-0-1"]);
    }

    #[test]
    fn derived_ids_never_take_a_later_explicit_id() {
        let raw = json!({
            "sections": [
                {"rubricItems": [
                    {"title": "new, no id", "points": 1},
                    {"id": "item-0-0", "title": "stored item", "points": 4}
                ]},
                {"id": "section-0", "title": "moved"}
            ]
        });
        let rubric = normalize(Some(&raw));
        assert_eq!(rubric.sections[0].id, "section-0-2");
        assert_eq!(rubric.sections[1].id, "section-0");
        let ids: Vec<(&str, &str)> = rubric
            .items()
            .map(|r| (r.item.id.as_str(), r.item.title.as_str()))
            .collect();
        assert_eq!(ids, vec![("item-0-0-2", "new, no id"), ("item-0-0", "stored item")]);
        assert_eq!(normalize(Some(&serde_json::to_value(&rubric).unwrap())), rubric);
    }

    #[test]
    fn normalizing_canonical_output_is_a_no_op() {
        let raw = json!({
            "sections": [
                {"title": "A", "criteria": [{"text": "one", "points": 2}, {"text": "two", "points": 3}]},
                {"rubricItems": [{"title": "x", "points": 1}], "parts": [{"rubricItems": [{"title": "y", "points": 4}]}]}
            ]
        });
        let first = normalize(Some(&raw));
        let again = normalize(Some(&serde_json::to_value(&first).unwrap()));
        assert_eq!(first, again);
        assert_eq!(normalize(Some(&raw)), first);
    }

    #[test]
    fn points_are_coerced_to_non_negative_integers() {
        assert_eq!(coerce_points(Some(&json!(7))), 7);
        assert_eq!(coerce_points(Some(&json!(-3))), 0);
        assert_eq!(coerce_points(Some(&json!(2.6))), 3);
        assert_eq!(coerce_points(Some(&json!(" 4 "))), 4);
        assert_eq!(coerce_points(Some(&json!("four"))), 0);
        assert_eq!(coerce_points(Some(&json!(null))), 0);
        assert_eq!(coerce_points(None), 0);
    }
}
