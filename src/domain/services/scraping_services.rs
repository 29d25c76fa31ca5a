//! Service traits for the outside world the scraper talks to
//!
//! Implementations are constructed once per run and handed to the orchestrator,
//! so tests can substitute fakes for the network and the language model.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{FetchError, LlmError};

/// A fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: String,
    /// URL after redirects
    pub final_url: String,
}

/// A fetched binary resource (image candidates)
#[derive(Debug, Clone)]
pub struct FetchedBinary {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub bytes: Vec<u8>,
    pub final_url: String,
}

/// Polite HTTP access to merchant sites
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page, retrying transient failures.
    ///
    /// Non-retryable 4xx/5xx responses and exhausted retries both surface as errors.
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Fetch a binary resource with `referer` set to the page it was found on.
    ///
    /// Fails with `FetchError::BodyTooLarge` as soon as the declared or streamed
    /// size exceeds `max_bytes`.
    async fn fetch_binary(
        &self,
        url: &str,
        referer: &str,
        max_bytes: u64,
    ) -> Result<FetchedBinary, FetchError>;
}

/// Chat-style prompt sent to the text-generation service
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Text-generation backend used by the language-model fallback
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, recorded in the audit log
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &ChatPrompt) -> Result<Completion, LlmError>;
}
