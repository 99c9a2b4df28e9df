//! Recover a JSON object from loosely formatted model output.
//!
//! Pipeline: trim, strip a markdown fence, slice from the first `{` to the last
//! `}`, drop trailing commas before `}`/`]`, then parse.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::reconcile::ReconcileError;

static OPENING_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*\r?\n").expect("valid fence regex")
});

/// Slice the candidate JSON object out of `raw`.
///
/// Returns `None` when there is no `{ ... }` span at all.
pub fn extract_json_span(raw: &str) -> Option<&str> {
    let mut text = raw.trim();

    if text.starts_with("```") {
        text = match OPENING_FENCE.find(text) {
            Some(m) => &text[m.end()..],
            None => text.trim_start_matches('`'),
        };
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Remove commas that directly precede `}` or `]`, ignoring string contents.
pub fn repair_trailing_commas(json: &str) -> Cow<'_, str> {
    if !json.contains(',') {
        return Cow::Borrowed(json);
    }

    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escape = false;
    let mut changed = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    changed = true;
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(json)
    }
}

/// Extract, repair and parse model output into a JSON value.
pub fn parse_model_json(raw: &str) -> Result<Value, ReconcileError> {
    if raw.trim().is_empty() {
        return Err(ReconcileError::Empty);
    }
    let span = extract_json_span(raw).ok_or(ReconcileError::NoJsonObject)?;
    let repaired = repair_trailing_commas(span);
    serde_json::from_str(&repaired).map_err(|e| ReconcileError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_prose() {
        let raw = "```json\n{\"total\": 3}\n```";
        assert_eq!(extract_json_span(raw), Some("{\"total\": 3}"));

        let raw = "Here is the grading:\n{\"hits\": []}\nHope that helps!";
        assert_eq!(extract_json_span(raw), Some("{\"hits\": []}"));

        let raw = "```{\"a\": 1}```";
        assert_eq!(extract_json_span(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn no_object_is_none() {
        assert_eq!(extract_json_span("not json"), None);
        assert_eq!(extract_json_span("} backwards {"), None);
    }

    #[test]
    fn trailing_commas_are_removed_outside_strings() {
        let fixed = repair_trailing_commas(r#"{"a": [1, 2, ], "b": "x,}", }"#);
        assert_eq!(fixed, r#"{"a": [1, 2 ], "b": "x,}" }"#);
        let untouched = repair_trailing_commas(r#"{"a": 1, "b": 2}"#);
        assert!(matches!(untouched, Cow::Borrowed(_)));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let fixed = repair_trailing_commas(r#"{"c": "say \",]\" ok",}"#);
        assert_eq!(fixed, r#"{"c": "say \",]\" ok"}"#);
    }

    #[test]
    fn parse_reports_each_failure() {
        assert!(matches!(parse_model_json("   "), Err(ReconcileError::Empty)));
        assert!(matches!(parse_model_json("nope"), Err(ReconcileError::NoJsonObject)));
        assert!(matches!(parse_model_json("{oops}"), Err(ReconcileError::Parse(_))));
        let value = parse_model_json("```\n{\"hits\": [{\"section\": \"A\",},],}\n```").unwrap();
        assert_eq!(value["hits"][0]["section"], "A");
    }
}
