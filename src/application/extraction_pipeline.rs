//! Classification and the ordered strategy chain for one fetched page
//!
//! Structural work (classification, site rule, generic heuristics, image
//! candidates, page text for the model) runs synchronously on a parsed
//! document that is dropped before the language-model call is awaited.

use scraper::Html;
use tracing::{debug, info};

use crate::application::llm_fallback::LlmFallback;
use crate::domain::extraction::{
    ExtractionContext, ExtractionOutcome, ExtractionResult, LLM_STRATEGY_NAME,
    PageClassification, StrategyAttempt,
};
use crate::domain::services::{DescriptionNormalizer, FetchedPage};
use crate::infrastructure::config::ExtractionConfig;
use crate::infrastructure::parsing::{
    ExtractionStrategy, ImageLocator, PageClassifier, SiteRuleRegistry, generic_strategies,
    llm_page_text,
};

/// Everything the structural pass learned about a page
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub classification: PageClassification,
    pub attempts: Vec<StrategyAttempt>,
    /// Accepted text and the strategy that produced it
    pub found: Option<(String, String)>,
    /// Visible text for the model, only computed when it may be needed
    pub page_text: Option<String>,
    /// Empty for listing pages
    pub image_candidates: Vec<String>,
}

/// Description extraction plus image candidates for one page
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub result: ExtractionResult,
    pub image_candidates: Vec<String>,
}

pub struct DescriptionExtractor {
    classifier: PageClassifier,
    site_rules: SiteRuleRegistry,
    generic: Vec<Box<dyn ExtractionStrategy>>,
    normalizer: DescriptionNormalizer,
    image_locator: ImageLocator,
    llm: Option<LlmFallback>,
    page_text_limit: usize,
}

impl DescriptionExtractor {
    pub fn new(config: &ExtractionConfig, max_image_candidates: usize) -> Self {
        Self {
            classifier: PageClassifier::new(config.listing_element_threshold),
            site_rules: SiteRuleRegistry::default(),
            generic: generic_strategies(),
            normalizer: DescriptionNormalizer::new(
                config.min_description_length,
                config.max_description_length,
                config.min_line_length,
            ),
            image_locator: ImageLocator::new(max_image_candidates),
            llm: None,
            page_text_limit: config.llm_page_text_limit,
        }
    }

    #[must_use]
    pub fn with_llm(mut self, llm: LlmFallback) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn with_site_rules(mut self, site_rules: SiteRuleRegistry) -> Self {
        self.site_rules = site_rules;
        self
    }

    pub const fn normalizer(&self) -> &DescriptionNormalizer {
        &self.normalizer
    }

    pub const fn llm_enabled(&self) -> bool {
        self.llm.is_some()
    }

    pub fn context(&self, product_name: &str, url: &str) -> ExtractionContext {
        ExtractionContext::new(product_name, url).with_min_length(self.normalizer.min_length())
    }

    /// Synchronous structural pass over the page body
    pub fn analyze(&self, page: &FetchedPage, context: &ExtractionContext, want_images: bool) -> PageAnalysis {
        let html = Html::parse_document(&page.body);
        let classification = self.classifier.classify(&html);

        if classification.is_listing() {
            info!("📋 Listing page detected at {}, structural strategies skipped", page.final_url);
            return PageAnalysis {
                classification,
                attempts: Vec::new(),
                found: None,
                page_text: self.page_text_for_model(&html),
                image_candidates: Vec::new(),
            };
        }

        let site_rule = context
            .host
            .as_deref()
            .and_then(|host| self.site_rules.rule_for(host));
        let chain = site_rule
            .into_iter()
            .chain(self.generic.iter().map(AsRef::as_ref));

        let mut attempts = Vec::new();
        let mut found = None;
        for strategy in chain {
            let candidate = strategy
                .extract(&html, context)
                .map(|raw| self.normalizer.normalize(&raw))
                .filter(|text| !text.is_empty());
            let candidate_length = candidate.as_ref().map(|t| t.chars().count());
            let accepted = candidate_length.is_some_and(|len| len >= self.normalizer.min_length());

            debug!(
                "Strategy {} on {}: {:?} chars, accepted={}",
                strategy.name(),
                context.url,
                candidate_length,
                accepted
            );
            attempts.push(StrategyAttempt {
                strategy: strategy.name().to_string(),
                candidate_length,
                accepted,
            });

            if accepted {
                found = candidate.map(|text| (text, strategy.name().to_string()));
                break;
            }
        }

        let page_text = if found.is_none() {
            self.page_text_for_model(&html)
        } else {
            None
        };
        let image_candidates = if want_images {
            self.image_locator.locate(&html, &page.final_url)
        } else {
            Vec::new()
        };

        PageAnalysis {
            classification,
            attempts,
            found,
            page_text,
            image_candidates,
        }
    }

    fn page_text_for_model(&self, html: &Html) -> Option<String> {
        self.llm
            .as_ref()
            .and_then(|_| llm_page_text(html, self.page_text_limit))
    }

    /// Run the whole chain, ending with the language model when it is enabled
    pub async fn extract(
        &self,
        page: &FetchedPage,
        context: &ExtractionContext,
        want_images: bool,
    ) -> PageExtraction {
        let analysis = self.analyze(page, context, want_images);
        let mut attempts = analysis.attempts;

        let (outcome, llm_call) = match (analysis.found, &self.llm, analysis.page_text) {
            (Some((text, strategy)), _, _) => (ExtractionOutcome::found(text, strategy), None),
            (None, Some(llm), Some(page_text)) => {
                let attempt = llm.extract(context, &page_text).await;
                attempts.push(StrategyAttempt {
                    strategy: LLM_STRATEGY_NAME.to_string(),
                    candidate_length: match &attempt.outcome {
                        ExtractionOutcome::Found { text, .. } => Some(text.chars().count()),
                        _ => None,
                    },
                    accepted: attempt.outcome.is_found(),
                });
                (attempt.outcome, Some(attempt.call))
            }
            _ => (ExtractionOutcome::NotFound, None),
        };

        PageExtraction {
            result: ExtractionResult {
                outcome,
                http_status: page.status,
                final_url: page.final_url.clone(),
                classification: analysis.classification,
                attempts,
                llm_call,
            },
            image_candidates: analysis.image_candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::test_utils::FakeTextGenerator;

    const LONG: &str = "Smartphone 6,5 pouces avec écran AMOLED, 128 Go de stockage et batterie 5000 mAh.";

    fn page(url: &str, body: &str) -> FetchedPage {
        FetchedPage {
            status: 200,
            headers: HashMap::new(),
            body: body.to_string(),
            final_url: url.to_string(),
        }
    }

    fn extractor() -> DescriptionExtractor {
        DescriptionExtractor::new(&ExtractionConfig::default(), 3)
    }

    fn with_model(answer: &str) -> (DescriptionExtractor, Arc<FakeTextGenerator>) {
        let generator = Arc::new(FakeTextGenerator::answering(answer));
        let llm = LlmFallback::new(generator.clone(), DescriptionNormalizer::default(), 0.3, 500);
        (extractor().with_llm(llm), generator)
    }

    fn listing_body() -> String {
        let cards: String = (0..8)
            .map(|i| format!(r#"<div class="product-card">Produit {i}</div>"#))
            .collect();
        format!(
            r#"<html><head><meta name="description" content="{LONG}"></head><body><main>{cards}</main></body></html>"#
        )
    }

    #[tokio::test]
    async fn site_rule_runs_before_generic() {
        let body = format!(
            r#"<html><head><meta name="description" content="{LONG}"></head><body>
                <div class="product-description">{LONG} Garantie 2 ans.</div>
            </body></html>"#
        );
        let url = "https://www.jumia.ma/galaxy.html";
        let ex = extractor();
        let out = ex.extract(&page(url, &body), &ex.context("Galaxy", url), false).await;

        assert_eq!(out.result.strategy(), Some("site:jumia"));
        assert_eq!(out.result.attempts.len(), 1);
        assert!(out.result.text().unwrap().ends_with("Garantie 2 ans."));
    }

    #[tokio::test]
    async fn same_page_extracts_identically_twice() {
        let body = format!(
            r#"<html><head><meta name="description" content="  {LONG}  "></head><body>
                <img src="/img/phone.jpg"><p>{LONG}</p>
            </body></html>"#
        );
        let url = "https://shop.example/p/7";
        let ex = extractor();
        let fetched = page(url, &body);
        let ctx = ex.context("Phone", url);

        let first = ex.extract(&fetched, &ctx, true).await;
        let second = ex.extract(&fetched, &ctx, true).await;

        assert!(first.result.text().is_some());
        assert_eq!(first.result.strategy(), second.result.strategy());
        assert_eq!(first.result.text(), second.result.text());
        assert_eq!(first.result.attempts.len(), second.result.attempts.len());
        assert_eq!(first.image_candidates, second.image_candidates);
    }

    #[tokio::test]
    async fn short_candidates_fall_through_to_next_strategy() {
        let body = format!(
            r#"<html><head>
                <meta name="description" content="Achetez en ligne">
                <meta property="og:description" content="{LONG}">
            </head><body></body></html>"#
        );
        let url = "https://shop.example/p/1";
        let ex = extractor();
        let out = ex.extract(&page(url, &body), &ex.context("Phone", url), false).await;

        assert_eq!(out.result.strategy(), Some("generic:og_description"));
        let first = &out.result.attempts[0];
        assert_eq!(first.strategy, "generic:meta_description");
        assert!(!first.accepted);
        assert_eq!(first.candidate_length, None);
    }

    #[tokio::test]
    async fn listing_pages_only_reach_the_model() {
        let (ex, generator) = with_model(LONG);
        let url = "https://www.jumia.ma/catalog/?q=galaxy";
        let out = ex
            .extract(&page(url, &listing_body()), &ex.context("Galaxy", url), true)
            .await;

        assert_eq!(out.result.classification, PageClassification::Listing);
        assert_eq!(out.result.strategy(), Some(LLM_STRATEGY_NAME));
        assert_eq!(out.result.attempts.len(), 1);
        assert!(out.image_candidates.is_empty());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn listing_without_model_is_not_found() {
        let url = "https://www.jumia.ma/catalog/?q=galaxy";
        let ex = extractor();
        let out = ex
            .extract(&page(url, &listing_body()), &ex.context("Galaxy", url), false)
            .await;

        assert_eq!(out.result.outcome, ExtractionOutcome::NotFound);
        assert!(out.result.attempts.is_empty());
        assert!(out.result.llm_call.is_none());
    }

    #[tokio::test]
    async fn model_is_skipped_when_structure_succeeds() {
        let (ex, generator) = with_model("NOT_FOUND");
        let body = format!(r#"<html><head><meta name="description" content="{LONG}"></head></html>"#);
        let url = "https://shop.example/p/2";
        let out = ex.extract(&page(url, &body), &ex.context("Phone", url), false).await;

        assert!(out.result.outcome.is_found());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn model_not_found_leaves_item_without_text() {
        let (ex, generator) = with_model("NOT_FOUND");
        let url = "https://shop.example/p/3";
        let body = "<html><body><main><p>Livraison partout au Maroc</p></main></body></html>";
        let out = ex.extract(&page(url, body), &ex.context("Phone", url), false).await;

        assert_eq!(out.result.outcome, ExtractionOutcome::NotFound);
        assert_eq!(generator.calls(), 1);
        assert!(out.result.llm_call.is_some());
        assert_eq!(out.result.attempts.last().map(|a| a.accepted), Some(false));
    }

    #[test]
    fn images_are_located_on_product_pages() {
        let ex = extractor();
        let url = "https://shop.example/p/4";
        let body = r#"<html><head><meta property="og:image" content="/img/p4.jpg"></head></html>"#;
        let analysis = ex.analyze(&page(url, body), &ex.context("P4", url), true);
        assert_eq!(analysis.image_candidates, vec!["https://shop.example/img/p4.jpg".to_string()]);
        assert!(analysis.page_text.is_none());
    }
}
