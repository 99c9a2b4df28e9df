//! Per-token prices for the vision models used for grading.
//!
//! Costs are in nanodollars (1e-9 USD) per token.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_nanos_per_token: i64,
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn new(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        (input_tokens as i64) * self.input_nanos_per_token
            + (output_tokens as i64) * self.output_nanos_per_token
    }
}

// GPT-4o: $2.50/1M input, $10.00/1M output
const GPT_4O: ModelPricing = ModelPricing::new(2_500, 10_000);
// GPT-4o-mini: $0.15/1M input, $0.60/1M output
const GPT_4O_MINI: ModelPricing = ModelPricing::new(150, 600);
// Claude 3.5 Sonnet: $3.00/1M input, $15.00/1M output
const CLAUDE_35_SONNET: ModelPricing = ModelPricing::new(3_000, 15_000);
// Gemini 1.5 Pro: $1.25/1M input, $5.00/1M output
const GEMINI_15_PRO: ModelPricing = ModelPricing::new(1_250, 5_000);

/// Used for models missing from the table.
const FALLBACK: ModelPricing = ModelPricing::new(1_000, 5_000);

static PRICING_MAP: OnceLock<HashMap<&'static str, ModelPricing>> = OnceLock::new();

fn init_pricing() -> HashMap<&'static str, ModelPricing> {
    HashMap::from([
        ("openai/gpt-4o", GPT_4O),
        ("openai/gpt-4o-2024-08-06", GPT_4O),
        ("openai/gpt-4o-mini", GPT_4O_MINI),
        ("anthropic/claude-3.5-sonnet", CLAUDE_35_SONNET),
        ("google/gemini-pro-1.5", GEMINI_15_PRO),
    ])
}

pub fn get_pricing(model_id: &str) -> Option<ModelPricing> {
    PRICING_MAP.get_or_init(init_pricing).get(model_id).copied()
}

pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    get_pricing(model)
        .unwrap_or(FALLBACK)
        .calculate_cost(input_tokens, output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_cost() {
        // 1K input * 2500 + 1K output * 10000 = 12,500,000 nanos
        assert_eq!(chat_cost("openai/gpt-4o", 1_000, 1_000), 12_500_000);
    }

    #[test]
    fn test_unknown_model_uses_fallback() {
        assert_eq!(chat_cost("acme/unknown", 10, 10), 60_000);
    }
}
