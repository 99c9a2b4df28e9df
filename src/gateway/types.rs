//! Core types for the model gateway.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Which record and code path a model call belongs to, for usage logs.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Assignment the call concerns (rubric generation, grading).
    pub assignment_id: Option<String>,
    /// Submission being graded, if any.
    pub submission_id: Option<String>,
    /// Static code path label like "grader::grade".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_assignment(mut self, id: impl Into<String>) -> Self {
        self.assignment_id = Some(id.into());
        self
    }

    pub fn with_submission(mut self, id: impl Into<String>) -> Self {
        self.submission_id = Some(id.into());
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// An image attached to a message, as a URL or `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Short caption sent as a text part right before the image.
    pub caption: String,
    pub url: String,
}

impl ImageRef {
    pub fn new(caption: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            url: url.into(),
        }
    }

    /// Build a `data:` URL from raw image bytes.
    pub fn from_bytes(caption: impl Into<String>, mime: &str, bytes: &[u8]) -> Self {
        Self::new(caption, data_url(mime, bytes))
    }
}

/// `data:<mime>;base64,<payload>` for inline image parts.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub images: Vec<ImageRef>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// User turn made of captioned images, followed by optional text.
    pub fn user_images(images: Vec<ImageRef>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images,
        }
    }
}

/// Chat model specification.
#[derive(Debug, Clone)]
pub enum ChatModel {
    /// OpenRouter model, e.g. "openai/gpt-4o"
    OpenRouter(String),
}

impl ChatModel {
    pub fn openrouter(model_id: impl Into<String>) -> Self {
        ChatModel::OpenRouter(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        match self {
            ChatModel::OpenRouter(id) => id,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ChatModel::OpenRouter(_) => "openrouter",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: ChatModel,
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: ChatModel, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: None,
            json_mode: false,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn image_count(&self) -> usize {
        self.messages.iter().map(|m| m.images.len()).sum()
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Cost in nanodollars (1e-9 USD).
    pub cost_nanodollars: i64,
    pub latency: Duration,
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    /// A bare text response, as returned by scripted gateways in tests and demos.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            latency: Duration::ZERO,
            finish_reason: FinishReason::Stop,
        }
    }
}
