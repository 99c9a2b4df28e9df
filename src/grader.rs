//! Model-backed grading and rubric generation.
//!
//! Both entry points always return a usable result. A provider error or an
//! unusable response is logged and replaced: grading falls back to full
//! credit, generation falls back to a single-item stub rubric.

use serde_json::json;
use tracing::{debug, warn};

use crate::config::GraderConfig;
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, ImageRef};
use crate::grading::{parse_model_json, reconcile, GradeOutcome};
use crate::prompts::{render_generation, render_grading};
use crate::rubric::{assess, normalize, Rubric, RubricStatus};

// =============================================================================
// Grading
// =============================================================================

#[derive(Debug, Clone)]
pub struct GradingRequest {
    pub rubric: Rubric,
    pub declared_total: u64,
    /// Prompt image followed by answer pages, already captioned.
    pub images: Vec<ImageRef>,
    pub model: String,
    pub max_tokens: u32,
    pub assignment_id: Option<String>,
    pub submission_id: Option<String>,
}

impl GradingRequest {
    pub fn new(rubric: Rubric, declared_total: u64) -> Self {
        let config = GraderConfig::default();
        Self {
            rubric,
            declared_total,
            images: Vec::new(),
            model: config.model,
            max_tokens: config.grade_max_tokens,
            assignment_id: None,
            submission_id: None,
        }
    }

    pub fn with_config(mut self, config: &GraderConfig) -> Self {
        self.model = config.model.clone();
        self.max_tokens = config.grade_max_tokens;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    pub fn for_submission(
        mut self,
        assignment_id: impl Into<String>,
        submission_id: impl Into<String>,
    ) -> Self {
        self.assignment_id = Some(assignment_id.into());
        self.submission_id = Some(submission_id.into());
        self
    }

    fn attribution(&self) -> Attribution {
        let mut attribution = Attribution::new("grader::grade");
        if let Some(id) = &self.assignment_id {
            attribution = attribution.with_assignment(id);
        }
        if let Some(id) = &self.submission_id {
            attribution = attribution.with_submission(id);
        }
        attribution
    }
}

/// Grade one submission. Never fails: any provider error yields full credit.
pub async fn grade_submission(gateway: &dyn ChatGateway, req: &GradingRequest) -> GradeOutcome {
    let prompt = render_grading(&req.rubric, req.declared_total, req.images.clone());
    let chat = ChatRequest::new(
        ChatModel::openrouter(&req.model),
        prompt.to_messages(),
        req.attribution(),
    )
    .max_tokens(req.max_tokens);

    match gateway.chat(chat).await {
        Ok(resp) => {
            debug!(
                submission = req.submission_id.as_deref().unwrap_or(""),
                tokens = resp.input_tokens + resp.output_tokens,
                "grading response received"
            );
            reconcile(&resp.content, &req.rubric, req.declared_total)
        }
        Err(err) => {
            warn!(
                error = %err,
                submission = req.submission_id.as_deref().unwrap_or(""),
                declared_total = req.declared_total,
                "grading call failed; defaulting to full credit"
            );
            GradeOutcome::full_credit(req.declared_total)
        }
    }
}

// =============================================================================
// Rubric generation
// =============================================================================

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub declared_total: u64,
    /// Prompt image and any solution images, already captioned.
    pub images: Vec<ImageRef>,
    pub model: String,
    pub max_tokens: u32,
    pub assignment_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(declared_total: u64) -> Self {
        let config = GraderConfig::default();
        Self {
            declared_total,
            images: Vec::new(),
            model: config.model,
            max_tokens: config.generate_max_tokens,
            assignment_id: None,
        }
    }

    pub fn with_config(mut self, config: &GraderConfig) -> Self {
        self.model = config.model.clone();
        self.max_tokens = config.generate_max_tokens;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    pub fn for_assignment(mut self, assignment_id: impl Into<String>) -> Self {
        self.assignment_id = Some(assignment_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedRubric {
    pub rubric: Rubric,
    pub status: RubricStatus,
    /// True when the stub rubric replaced an unusable model response.
    pub fallback: bool,
}

pub const STUB_SECTION_TITLE: &str = "Overall Correctness";
pub const STUB_CRITERION_TEXT: &str = "Matches provided solution";

/// Legacy-shaped single-criterion rubric worth the whole declared total.
pub fn stub_rubric(declared_total: u64) -> serde_json::Value {
    json!({
        "sections": [{
            "title": STUB_SECTION_TITLE,
            "points": declared_total,
            "criteria": [{
                "text": STUB_CRITERION_TEXT,
                "points": declared_total,
                "alternatives": []
            }]
        }]
    })
}

/// Draft a rubric for an assignment, normalized and assessed.
///
/// A response that does not parse, or normalizes to no sections, is replaced
/// by [`stub_rubric`].
pub async fn generate_rubric(gateway: &dyn ChatGateway, req: &GenerationRequest) -> GeneratedRubric {
    let prompt = render_generation(req.declared_total, req.images.clone());
    let mut attribution = Attribution::new("grader::generate");
    if let Some(id) = &req.assignment_id {
        attribution = attribution.with_assignment(id);
    }
    let chat = ChatRequest::new(
        ChatModel::openrouter(&req.model),
        prompt.to_messages(),
        attribution,
    )
    .max_tokens(req.max_tokens);

    let drafted = match gateway.chat(chat).await {
        Ok(resp) => match parse_model_json(&resp.content) {
            Ok(value) => Some(normalize(Some(&value))).filter(|r| !r.is_empty()),
            Err(err) => {
                warn!(error = %err, "unparsable rubric draft; using stub rubric");
                None
            }
        },
        Err(err) => {
            warn!(error = %err, "rubric generation failed; using stub rubric");
            None
        }
    };

    let fallback = drafted.is_none();
    let rubric = drafted.unwrap_or_else(|| normalize(Some(&stub_rubric(req.declared_total))));
    let status = assess(&rubric, req.declared_total);
    if !status.rubric_valid {
        debug!(
            rubric_points = status.rubric_points,
            declared_total = req.declared_total,
            "generated rubric does not sum to the declared total"
        );
    }
    GeneratedRubric {
        rubric,
        status,
        fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_rubric_is_valid_for_its_total() {
        let rubric = normalize(Some(&stub_rubric(7)));
        let status = assess(&rubric, 7);
        assert!(status.rubric_valid);
        assert_eq!(status.rubric_points, 7);
        assert_eq!(rubric.sections[0].title, STUB_SECTION_TITLE);
        assert_eq!(rubric.sections[0].rubric_items[0].title, STUB_CRITERION_TEXT);
        assert_eq!(rubric.sections[0].rubric_items[0].id, "item-0-0");
    }

    #[test]
    fn grading_request_attribution_carries_ids() {
        let req = GradingRequest::new(Rubric::empty(), 3).for_submission("a1", "s1");
        let attribution = req.attribution();
        assert_eq!(attribution.caller, "grader::grade");
        assert_eq!(attribution.assignment_id.as_deref(), Some("a1"));
        assert_eq!(attribution.submission_id.as_deref(), Some("s1"));
    }
}
