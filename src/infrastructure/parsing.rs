//! HTML parsing for merchant product pages
//!
//! Everything in here is synchronous and works on a borrowed `scraper::Html`.
//! `Html` is not `Send`, so callers parse, run every structural step and drop
//! the document before awaiting anything.

pub mod generic;
pub mod image_locator;
pub mod json_ld;
pub mod page_classifier;
pub mod page_text;
pub mod site_rules;

pub use generic::generic_strategies;
pub use image_locator::ImageLocator;
pub use page_classifier::PageClassifier;
pub use page_text::llm_page_text;
pub use site_rules::SiteRuleRegistry;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::domain::extraction::ExtractionContext;

/// A named, pure extraction rule over a parsed page
pub trait ExtractionStrategy: Send + Sync {
    /// Stable name recorded in the audit log, e.g. `"generic:meta_description"`
    fn name(&self) -> &str;

    /// Raw candidate text, or `None` when the rule does not apply to this page
    fn extract(&self, html: &Html, context: &ExtractionContext) -> Option<String>;
}

/// Compile CSS selectors, skipping (and logging) any that fail to parse
pub fn compile_selectors(selector_strings: &[&str]) -> Vec<Selector> {
    selector_strings
        .iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", s, e);
                None
            }
        })
        .collect()
}

pub fn compile_selector(selector: &str) -> Option<Selector> {
    compile_selectors(&[selector]).into_iter().next()
}

/// Trimmed, non-empty text fragments of an element joined with `separator`
pub fn element_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed `content` attribute of the first element matching `selector`
pub fn meta_content(html: &Html, selector: &Selector) -> Option<String> {
    html.select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_selectors_are_skipped() {
        let selectors = compile_selectors(&["div.ok", "div[", "p"]);
        assert_eq!(selectors.len(), 2);
    }

    #[test]
    fn element_text_joins_fragments() {
        let html = Html::parse_fragment("<div> Hello <b> world </b>\n<i></i> again </div>");
        let div = html.select(&Selector::parse("div").unwrap()).next().unwrap();
        assert_eq!(element_text(div, " "), "Hello world again");
        assert_eq!(element_text(div, "\n"), "Hello\nworld\nagain");
    }
}
