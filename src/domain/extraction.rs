//! Extraction results and page classification

use serde::{Deserialize, Serialize};

use crate::domain::services::TokenUsage;

/// Strategy name recorded for text produced by the language-model fallback
pub const LLM_STRATEGY_NAME: &str = "llm";

/// Whether a fetched page shows one product or many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageClassification {
    SingleProduct,
    Listing,
}

impl PageClassification {
    pub const fn is_listing(self) -> bool {
        matches!(self, Self::Listing)
    }
}

/// Outcome of one extraction attempt.
///
/// `Error` is reserved for attempts that could not complete (the language-model
/// call failing, for instance); it never fails the work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Found { text: String, strategy: String },
    NotFound,
    Error(String),
}

impl ExtractionOutcome {
    pub fn found(text: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self::Found {
            text: text.into(),
            strategy: strategy.into(),
        }
    }

    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// One strategy evaluated against a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    /// Character count of the normalized candidate, if the strategy produced one
    pub candidate_length: Option<usize>,
    pub accepted: bool,
}

/// The language-model call made for a work item, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCallRecord {
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

/// Everything learned about one work item's page
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub outcome: ExtractionOutcome,
    pub http_status: u16,
    pub final_url: String,
    pub classification: PageClassification,
    /// Strategies in the order they were tried
    pub attempts: Vec<StrategyAttempt>,
    pub llm_call: Option<LlmCallRecord>,
}

impl ExtractionResult {
    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            ExtractionOutcome::Found { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn strategy(&self) -> Option<&str> {
        match &self.outcome {
            ExtractionOutcome::Found { strategy, .. } => Some(strategy),
            _ => None,
        }
    }
}

/// Per-item context handed to every strategy
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub product_name: String,
    pub url: String,
    pub host: Option<String>,
    /// Candidates shorter than this are passed over inside a strategy
    pub min_length: usize,
}

impl ExtractionContext {
    pub fn new(product_name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let host = url::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));

        Self {
            product_name: product_name.into(),
            url,
            host,
            min_length: 50,
        }
    }

    #[must_use]
    pub const fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    /// True when `text` has at least `min_length` characters after trimming
    pub fn long_enough(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.min_length
    }
}
