//! Single-product vs. listing page classification
//!
//! Two heuristics, either of which marks a page as a listing:
//! - more than `element_threshold` repeated product/item/card containers
//! - a results container or a results heading (English and French vocabulary)
//!
//! Misclassifying a product page as a listing only costs a skipped item, the
//! reverse can attach another product's text, so ties go to "listing".

use scraper::{Html, Selector};
use tracing::debug;

use super::{compile_selector, compile_selectors, element_text};
use crate::domain::extraction::PageClassification;

const PRODUCT_LIKE_SELECTORS: [&str; 4] = [
    r#"div[class*="product"]"#,
    r#"article[class*="product"]"#,
    r#"div[class*="item"]"#,
    r#"div[class*="card"]"#,
];

/// Class-name fragments of result containers. A bare "search" is left out so
/// that ordinary search boxes in page headers do not count.
const RESULTS_CLASS_FRAGMENTS: [&str; 4] = ["search-result", "results", "listing", "catalog-grid"];

/// Heading words that announce a result list
const RESULTS_HEADING_WORDS: [&str; 5] = ["results", "résultats", "resultats", "trouvé", "produits"];

pub struct PageClassifier {
    element_threshold: usize,
    product_like: Vec<Selector>,
    containers: Option<Selector>,
    headings: Option<Selector>,
}

impl PageClassifier {
    pub fn new(element_threshold: usize) -> Self {
        Self {
            element_threshold,
            product_like: compile_selectors(&PRODUCT_LIKE_SELECTORS),
            containers: compile_selector("div[class], section[class], ul[class]"),
            headings: compile_selector("h1"),
        }
    }

    pub fn classify(&self, html: &Html) -> PageClassification {
        if self.is_listing_page(html) {
            PageClassification::Listing
        } else {
            PageClassification::SingleProduct
        }
    }

    pub fn is_listing_page(&self, html: &Html) -> bool {
        let mut product_count = 0;
        for selector in &self.product_like {
            product_count += html.select(selector).count();
            if product_count > self.element_threshold {
                debug!(
                    "Listing page: {} product-like elements (threshold {})",
                    product_count, self.element_threshold
                );
                return true;
            }
        }

        if let Some(containers) = &self.containers {
            let has_results_container = html.select(containers).any(|el| {
                el.value().classes().any(|class| {
                    let class = class.to_lowercase();
                    RESULTS_CLASS_FRAGMENTS.iter().any(|f| class.contains(f))
                })
            });
            if has_results_container {
                debug!("Listing page: results container found");
                return true;
            }
        }

        if let Some(headings) = &self.headings {
            let has_results_heading = html.select(headings).any(|h| {
                let text = element_text(h, " ").to_lowercase();
                RESULTS_HEADING_WORDS.iter().any(|w| text.contains(w))
            });
            if has_results_heading {
                debug!("Listing page: results heading found");
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classify(body: &str) -> PageClassification {
        PageClassifier::new(5).classify(&Html::parse_document(body))
    }

    #[test]
    fn eight_product_cards_is_a_listing() {
        let cards = "<div class=\"product-card\">Phone</div>".repeat(8);
        let page = format!("<html><body>{cards}</body></html>");
        assert_eq!(classify(&page), PageClassification::Listing);
    }

    #[test]
    fn five_product_elements_is_not_enough() {
        let cards = "<div class=\"product-card\">Phone</div>".repeat(5);
        let page = format!("<html><body><h1>Samsung Galaxy A15</h1>{cards}</body></html>");
        assert_eq!(classify(&page), PageClassification::SingleProduct);
    }

    #[test]
    fn counts_accumulate_across_patterns() {
        let page = format!(
            "<html><body>{}{}</body></html>",
            "<div class=\"item\">a</div>".repeat(3),
            "<div class=\"card\">b</div>".repeat(3)
        );
        assert_eq!(classify(&page), PageClassification::Listing);
    }

    #[rstest]
    #[case("<h1>Résultats pour « galaxy »</h1>")]
    #[case("<h1>12 produits trouvés</h1>")]
    #[case("<h1>Search results</h1>")]
    #[case("<div class=\"search-results\"><p>one</p></div>")]
    #[case("<section class=\"ProductListing\"></section>")]
    fn vocabulary_marks_listing(#[case] fragment: &str) {
        let page = format!("<html><body>{fragment}</body></html>");
        assert_eq!(classify(&page), PageClassification::Listing);
    }

    #[test]
    fn plain_product_page_with_search_box() {
        let page = r#"<html><head><meta name="description" content="x"></head><body>
            <header><div class="search-box"><input type="search"></div></header>
            <h1>Lenovo IdeaPad Slim 3</h1>
            <div class="product-description"><p>Un ordinateur portable fin et léger.</p></div>
        </body></html>"#;
        assert_eq!(classify(page), PageClassification::SingleProduct);
    }

    #[test]
    fn threshold_is_configurable() {
        let cards = "<div class=\"product-card\">Phone</div>".repeat(8);
        let page = Html::parse_document(&format!("<html><body>{cards}</body></html>"));
        assert!(!PageClassifier::new(10).is_listing_page(&page));
    }
}
