//! Language-model extraction, the last strategy in the chain
//!
//! Failures here never fail a work item: API errors become
//! `ExtractionOutcome::Error`, a `NOT_FOUND` answer or a too-short answer
//! becomes `ExtractionOutcome::NotFound`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::extraction::{
    ExtractionContext, ExtractionOutcome, LLM_STRATEGY_NAME, LlmCallRecord,
};
use crate::domain::services::{ChatPrompt, DescriptionNormalizer, TextGenerator};

const NOT_FOUND_MARKER: &str = "NOT_FOUND";

const SYSTEM_PROMPT: &str =
    "You extract product descriptions from the text of merchant web pages.";

/// Outcome of one fallback call plus what the audit log needs about it
#[derive(Debug, Clone)]
pub struct LlmAttempt {
    pub outcome: ExtractionOutcome,
    pub call: LlmCallRecord,
}

pub struct LlmFallback {
    generator: Arc<dyn TextGenerator>,
    normalizer: DescriptionNormalizer,
    temperature: f32,
    max_tokens: u32,
}

impl LlmFallback {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        normalizer: DescriptionNormalizer,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            generator,
            normalizer,
            temperature,
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub fn prompt(&self, context: &ExtractionContext, page_text: &str) -> ChatPrompt {
        let product = if context.product_name.trim().is_empty() {
            "Unknown"
        } else {
            context.product_name.trim()
        };

        let user = format!(
            "Find the description of the product below in the page content.\n\n\
             Product name: {product}\n\
             Page URL: {url}\n\n\
             Page content:\n{page_text}\n\n\
             Rules:\n\
             - Use only the main product description; ignore menus, footers, reviews and unrelated text.\n\
             - The description must be at least {min} characters long.\n\
             - If the page lists several products (search results, category page), answer {NOT_FOUND_MARKER}.\n\
             - If there is no clear description of this product, answer {NOT_FOUND_MARKER}.\n\
             - Answer with the description text only.\n\n\
             Description:",
            url = context.url,
            min = self.normalizer.min_length(),
        );

        ChatPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub async fn extract(&self, context: &ExtractionContext, page_text: &str) -> LlmAttempt {
        let prompt = self.prompt(context, page_text);
        let model = self.generator.model().to_string();

        match self.generator.complete(&prompt).await {
            Ok(completion) => {
                let call = LlmCallRecord {
                    model,
                    usage: completion.usage,
                    error: None,
                };
                let answer = completion.text.trim();
                if answer.eq_ignore_ascii_case(NOT_FOUND_MARKER) {
                    info!("🤖 Model found no description for {}", context.url);
                    return LlmAttempt {
                        outcome: ExtractionOutcome::NotFound,
                        call,
                    };
                }

                let outcome = self.normalizer.accept(answer).map_or(
                    ExtractionOutcome::NotFound,
                    |text| ExtractionOutcome::found(text, LLM_STRATEGY_NAME),
                );
                LlmAttempt { outcome, call }
            }
            Err(e) => {
                warn!("Language model fallback failed for {}: {}", context.url, e);
                LlmAttempt {
                    outcome: ExtractionOutcome::Error(e.to_string()),
                    call: LlmCallRecord {
                        model,
                        usage: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        }
    }
}
