//! Domain services
//!
//! Pure text processing plus the trait seams the pipeline depends on.

pub mod description_normalizer;
pub mod name_matching;
pub mod scraping_services;

pub use description_normalizer::DescriptionNormalizer;
pub use name_matching::{slugify, string_similarity};
pub use scraping_services::{
    ChatPrompt, Completion, FetchedBinary, FetchedPage, PageFetcher, TextGenerator, TokenUsage,
};
