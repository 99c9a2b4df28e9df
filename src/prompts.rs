//! Prompt templates for grading and rubric generation.
//!
//! Rendering only. Provider-agnostic: the output is a list of gateway
//! messages, with page images attached as captioned image parts.

use crate::gateway::{ImageRef, Message};
use crate::rubric::Rubric;

// =============================================================================
// Image captions
// =============================================================================

pub const PROMPT_IMAGE_CAPTION: &str = "Prompt image:";
pub const ANSWER_PAGE_CAPTION: &str = "Student answer page:";

/// The assignment prompt page, captioned for the model.
pub fn prompt_image(url: impl Into<String>) -> ImageRef {
    ImageRef::new(PROMPT_IMAGE_CAPTION, url)
}

/// One page of a student's answer.
pub fn answer_page(url: impl Into<String>) -> ImageRef {
    ImageRef::new(ANSWER_PAGE_CAPTION, url)
}

/// A reference solution page; numbered from 1 after the prompt image.
pub fn solution_image(index: usize, url: impl Into<String>) -> ImageRef {
    ImageRef::new(format!("Solution image {index}"), url)
}

// =============================================================================
// Rendered prompt
// =============================================================================

#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: String,
    pub images: Vec<ImageRef>,
    /// Text turns sent after the image turn, in order.
    pub user: Vec<String>,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = vec![Message::system(&self.system)];
        if !self.images.is_empty() {
            messages.push(Message::user_images(self.images.clone(), ""));
        }
        messages.extend(self.user.iter().map(Message::user));
        messages
    }
}

// =============================================================================
// Grading
// =============================================================================

pub const GRADING_SLUG: &str = "grade_v1";

const GRADING_SYSTEM: &str = r#"You are an auto-grader. Using the rubric JSON provided, decide which rubric items are satisfied by the student answer. Only award items that are clearly shown in the answer pages.

Respond ONLY with JSON of the form {"total":int, "hits":[{"section":"string","criterion":"string","itemId":"string","points":int,"comment":"string"}]}.
"section" is the section title, "criterion" is the item title and "itemId" is the item's "id" exactly as written in the rubric. Items inside a part belong to their section. Leave out items that are not satisfied."#;

/// Render the grading prompt for one submission.
///
/// The rubric is serialized in canonical form so every item carries the id
/// the model is asked to echo back.
pub fn render_grading(rubric: &Rubric, declared_total: u64, images: Vec<ImageRef>) -> PromptInstance {
    let rubric_json = serde_json::to_string(rubric).unwrap_or_else(|_| "{}".to_string());
    PromptInstance {
        template_slug: GRADING_SLUG,
        system: GRADING_SYSTEM.to_string(),
        images,
        user: vec![
            format!("Rubric JSON:\n{rubric_json}"),
            format!("The exam is worth {declared_total} points. Provide grading."),
        ],
    }
}

// =============================================================================
// Rubric generation
// =============================================================================

pub const GENERATION_SLUG: &str = "rubric_v1";

const GENERATION_SYSTEM: &str = r#"You are an expert Discrete Math / Probability TA writing detailed, Gradescope-style rubrics in pure JSON.

Design requirements:
1. Create one top-level "section" for each distinct fully-correct solution method you see in the provided image(s). A student only needs to satisfy one section to earn full credit.
2. Inside every section list fine-grained "criteria" for the concrete steps, intermediate results or final answers visible in that method.
3. Reference only information explicitly visible in the images. No guesses, no style or clarity remarks.
4. If the prompt has multiple sub-parts, label their criteria clearly ("Part (a)", "Part (b)").
5. Use the "alternatives" list when a single criterion can be met by clearly different but correct lines.
6. Be maximally specific: include variable names, numeric answers and equation forms exactly as shown.
7. Any one complete solution path earns the full total of {total} points.
8. JSON schema (return only this object, no markdown):
{"sections":[{"title":"string","points":int,"criteria":[{"text":"string","points":int,"alternatives":[{"text":"string"}]}]}]}

Return nothing except valid JSON."#;

/// Render the rubric-generation prompt for an assignment.
pub fn render_generation(declared_total: u64, images: Vec<ImageRef>) -> PromptInstance {
    PromptInstance {
        template_slug: GENERATION_SLUG,
        system: GENERATION_SYSTEM.replace("{total}", &declared_total.to_string()),
        images,
        user: vec![format!(
            "The assignment is worth {declared_total} points. Generate a rubric."
        )],
    }
}
