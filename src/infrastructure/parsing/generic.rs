//! Domain-agnostic description heuristics, tried in order after site rules

use scraper::{Html, Selector};

use super::json_ld::json_ld_descriptions;
use super::{
    ExtractionStrategy, collapse_whitespace, compile_selector, compile_selectors, element_text,
    meta_content,
};
use crate::domain::extraction::ExtractionContext;

const DESCRIPTION_SELECTORS: [&str; 14] = [
    "div.product-description",
    "div.description",
    "div.product-details",
    "div.product-info",
    "section.description",
    r#"div[class*="description"]"#,
    r#"div[class*="product-description"]"#,
    r#"div[class*="product-details"]"#,
    r#"div[class*="product-info"]"#,
    "p.product-description",
    "p.description",
    "article.product-description",
    "div.content",
    "div.product-content",
];

/// The generic chain in evaluation order
pub fn generic_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(MetaDescription::new()),
        Box::new(OpenGraphDescription::new()),
        Box::new(DescriptionContainers::new()),
        Box::new(MainContentParagraphs::new()),
        Box::new(JsonLdDescription),
    ]
}

/// `<meta name="description">`
pub struct MetaDescription {
    selector: Option<Selector>,
}

impl MetaDescription {
    pub fn new() -> Self {
        Self {
            selector: compile_selector(r#"meta[name="description"]"#),
        }
    }
}

impl ExtractionStrategy for MetaDescription {
    fn name(&self) -> &str {
        "generic:meta_description"
    }

    fn extract(&self, html: &Html, _context: &ExtractionContext) -> Option<String> {
        meta_content(html, self.selector.as_ref()?)
    }
}

/// `<meta property="og:description">`
pub struct OpenGraphDescription {
    selector: Option<Selector>,
}

impl OpenGraphDescription {
    pub fn new() -> Self {
        Self {
            selector: compile_selector(r#"meta[property="og:description"]"#),
        }
    }
}

impl ExtractionStrategy for OpenGraphDescription {
    fn name(&self) -> &str {
        "generic:og_description"
    }

    fn extract(&self, html: &Html, _context: &ExtractionContext) -> Option<String> {
        meta_content(html, self.selector.as_ref()?)
    }
}

/// Common "product description" containers; first one long enough wins
pub struct DescriptionContainers {
    selectors: Vec<Selector>,
}

impl DescriptionContainers {
    pub fn new() -> Self {
        Self {
            selectors: compile_selectors(&DESCRIPTION_SELECTORS),
        }
    }
}

impl ExtractionStrategy for DescriptionContainers {
    fn name(&self) -> &str {
        "generic:css_selectors"
    }

    fn extract(&self, html: &Html, context: &ExtractionContext) -> Option<String> {
        self.selectors.iter().find_map(|selector| {
            html.select(selector)
                .map(|el| collapse_whitespace(&element_text(el, " ")))
                .find(|text| context.long_enough(text))
        })
    }
}

/// Paragraphs of the main content region, one per line
pub struct MainContentParagraphs {
    regions: Vec<Selector>,
    paragraphs: Option<Selector>,
}

impl MainContentParagraphs {
    pub fn new() -> Self {
        Self {
            regions: compile_selectors(&[
                "main",
                "article",
                r#"div[class*="content"], div[class*="main"], div[class*="product"]"#,
            ]),
            paragraphs: compile_selector("p"),
        }
    }
}

impl ExtractionStrategy for MainContentParagraphs {
    fn name(&self) -> &str {
        "generic:main_content"
    }

    fn extract(&self, html: &Html, _context: &ExtractionContext) -> Option<String> {
        let paragraphs = self.paragraphs.as_ref()?;
        let region = self
            .regions
            .iter()
            .find_map(|selector| html.select(selector).next())?;

        let texts: Vec<String> = region
            .select(paragraphs)
            .map(|p| collapse_whitespace(&element_text(p, " ")))
            .filter(|t| !t.is_empty())
            .collect();

        (!texts.is_empty()).then(|| texts.join("\n"))
    }
}

/// JSON-LD `description` / `about` / `offers.description`
pub struct JsonLdDescription;

impl ExtractionStrategy for JsonLdDescription {
    fn name(&self) -> &str {
        "generic:json_ld"
    }

    fn extract(&self, html: &Html, context: &ExtractionContext) -> Option<String> {
        json_ld_descriptions(html)
            .into_iter()
            .find(|text| context.long_enough(text))
    }
}
