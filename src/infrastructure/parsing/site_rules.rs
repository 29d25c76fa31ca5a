//! Structural rules for merchants whose page layout is known
//!
//! The registry maps a host suffix to one named rule; hosts without a rule go
//! straight to the generic heuristics.

use scraper::{ElementRef, Html, Selector};

use super::json_ld::json_ld_descriptions;
use super::{ExtractionStrategy, collapse_whitespace, compile_selector, compile_selectors, element_text};
use crate::domain::extraction::ExtractionContext;

/// Domain suffix → rule table
pub struct SiteRuleRegistry {
    rules: Vec<(&'static str, Box<dyn ExtractionStrategy>)>,
}

impl Default for SiteRuleRegistry {
    fn default() -> Self {
        Self::with_rules(vec![
            rule("iris.ma", HeadingSiblingsRule::new("site:iris.ma")),
            rule("primini.ma", KeywordBlockRule::new("site:primini.ma")),
            rule("biougnach.ma", DescriptionTabRule::new("site:biougnach.ma")),
            rule("jumia.ma", DescriptionContainerRule::new("site:jumia")),
            rule("jumia.com", DescriptionContainerRule::new("site:jumia")),
        ])
    }
}

fn rule(
    domain: &'static str,
    strategy: impl ExtractionStrategy + 'static,
) -> (&'static str, Box<dyn ExtractionStrategy>) {
    (domain, Box::new(strategy))
}

impl SiteRuleRegistry {
    pub fn with_rules(rules: Vec<(&'static str, Box<dyn ExtractionStrategy>)>) -> Self {
        Self { rules }
    }

    /// Rule registered for `host` (exact match or any subdomain of it)
    pub fn rule_for(&self, host: &str) -> Option<&dyn ExtractionStrategy> {
        let host = host.trim_end_matches('.').to_lowercase();
        self.rules
            .iter()
            .find(|(domain, _)| {
                host == *domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(|(_, rule)| rule.as_ref())
    }
}

/// Description sits right below the product title:
/// take the block siblings after the heading, else the paragraphs of its container.
pub struct HeadingSiblingsRule {
    name: &'static str,
    title: Vec<Selector>,
    paragraphs: Option<Selector>,
}

impl HeadingSiblingsRule {
    const MIN_PART_LENGTH: usize = 21;
    const MAX_SIBLINGS: usize = 5;

    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            title: compile_selectors(&[
                "h1",
                r#"h2[class*="title"], h2[class*="product"], h2[class*="Title"], h2[class*="Product"]"#,
            ]),
            paragraphs: compile_selector("p"),
        }
    }

    fn long_part(text: &str) -> bool {
        text.chars().count() >= Self::MIN_PART_LENGTH
    }
}

impl ExtractionStrategy for HeadingSiblingsRule {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, html: &Html, _context: &ExtractionContext) -> Option<String> {
        let title = self
            .title
            .iter()
            .find_map(|selector| html.select(selector).next())?;

        let parts: Vec<String> = title
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "p" | "div" | "section"))
            .take(Self::MAX_SIBLINGS)
            .map(|el| collapse_whitespace(&element_text(el, " ")))
            .filter(|text| Self::long_part(text))
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("\n"));
        }

        let container = title
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| matches!(el.value().name(), "div" | "section" | "article"))?;
        let paragraphs: Vec<String> = container
            .select(self.paragraphs.as_ref()?)
            .map(|p| collapse_whitespace(&element_text(p, " ")))
            .filter(|text| Self::long_part(text))
            .collect();

        (!paragraphs.is_empty()).then(|| paragraphs.join("\n"))
    }
}

/// Description follows a localized keyword ("Caractéristiques"):
/// take the text of the nearest block containing it, keyword stripped.
pub struct KeywordBlockRule {
    name: &'static str,
    keywords: Vec<&'static str>,
}

impl KeywordBlockRule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            keywords: vec!["caractéristiques", "caracteristiques"],
        }
    }

    fn strip_keyword(&self, text: &str) -> String {
        let trimmed = text.trim_start();
        let lower = trimmed.to_lowercase();
        for keyword in &self.keywords {
            if lower.starts_with(keyword) {
                let rest: String = trimmed.chars().skip(keyword.chars().count()).collect();
                return rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace()).to_string();
            }
        }
        trimmed.to_string()
    }
}

impl ExtractionStrategy for KeywordBlockRule {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, html: &Html, context: &ExtractionContext) -> Option<String> {
        let keyword_node = html.tree.root().descendants().find(|node| {
            node.value().as_text().is_some_and(|text| {
                let lower = text.to_lowercase();
                self.keywords.iter().any(|k| lower.contains(k))
            })
        })?;

        let block = keyword_node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| matches!(el.value().name(), "div" | "section" | "article" | "p"))?;

        let text = self.strip_keyword(&collapse_whitespace(&element_text(block, " ")));
        context.long_enough(&text).then_some(text)
    }
}

/// Description lives in a tab panel: follow the "Description" tab's target,
/// else any panel tagged as the description, else any description container.
pub struct DescriptionTabRule {
    name: &'static str,
    tabs: Vec<Selector>,
    with_id: Option<Selector>,
    data_tabs: Option<Selector>,
    panels: Option<Selector>,
    fallback: Option<Selector>,
}

impl DescriptionTabRule {
    const MAX_TAB_LABEL: usize = 40;

    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tabs: compile_selectors(&["a", "button", "li"]),
            with_id: compile_selector("[id]"),
            data_tabs: compile_selector("div[data-tab]"),
            panels: compile_selector("div[class]"),
            fallback: compile_selector("div[id], div[class]"),
        }
    }

    fn tab_target(&self, html: &Html) -> Option<String> {
        // links first, then buttons, then bare list items
        let tab = self.tabs.iter().find_map(|selector| {
            html.select(selector).find(|el| {
                let label = element_text(*el, " ");
                label.chars().count() <= Self::MAX_TAB_LABEL
                    && label.to_lowercase().contains("description")
            })
        })?;

        let attrs = tab.value();
        attrs
            .attr("data-target")
            .or_else(|| attrs.attr("data-bs-target"))
            .or_else(|| attrs.attr("href"))
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
    }

    fn target_text(&self, html: &Html, target: &str) -> Option<String> {
        let by_id = self
            .with_id
            .as_ref()
            .and_then(|s| html.select(s).find(|el| el.value().id() == Some(target)));
        let by_data_tab = || {
            self.data_tabs
                .as_ref()
                .and_then(|s| html.select(s).find(|el| el.value().attr("data-tab") == Some(target)))
        };

        by_id
            .or_else(by_data_tab)
            .map(|el| collapse_whitespace(&element_text(el, " ")))
    }

    fn is_description_panel(el: ElementRef<'_>) -> bool {
        let is_panel = el.value().classes().any(|c| {
            let c = c.to_lowercase();
            c.contains("tab") || c.contains("panel") || c.contains("content")
        });
        let tagged = el.value().classes().any(|c| c.eq_ignore_ascii_case("description"))
            || el
                .value()
                .id()
                .is_some_and(|id| id.to_lowercase().contains("description"));
        is_panel && tagged
    }

    fn mentions_description(el: ElementRef<'_>) -> bool {
        let in_id = el
            .value()
            .id()
            .is_some_and(|id| id.to_lowercase().contains("description"));
        in_id
            || el
                .value()
                .classes()
                .any(|c| c.to_lowercase().contains("description"))
    }
}

impl ExtractionStrategy for DescriptionTabRule {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, html: &Html, context: &ExtractionContext) -> Option<String> {
        if let Some(target) = self.tab_target(html) {
            if let Some(text) = self
                .target_text(html, &target)
                .filter(|t| context.long_enough(t))
            {
                return Some(text);
            }
        }

        let from_panel = self.panels.as_ref().and_then(|panels| {
            html.select(panels)
                .filter(|el| Self::is_description_panel(*el))
                .map(|el| collapse_whitespace(&element_text(el, " ")))
                .find(|t| context.long_enough(t))
        });
        if from_panel.is_some() {
            return from_panel;
        }

        html.select(self.fallback.as_ref()?)
            .filter(|el| Self::mentions_description(*el))
            .map(|el| collapse_whitespace(&element_text(el, " ")))
            .find(|t| context.long_enough(t))
    }
}

/// Known description containers in priority order, then JSON-LD `description`
pub struct DescriptionContainerRule {
    name: &'static str,
    containers: Vec<Selector>,
}

impl DescriptionContainerRule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            containers: compile_selectors(&[
                r#"div[data-name="Description"]"#,
                "div.markup",
                "div.product-description",
                "section.product-description",
                r#"div[class*="description"]"#,
            ]),
        }
    }
}

impl ExtractionStrategy for DescriptionContainerRule {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, html: &Html, context: &ExtractionContext) -> Option<String> {
        self.containers
            .iter()
            .find_map(|selector| {
                html.select(selector)
                    .map(|el| collapse_whitespace(&element_text(el, " ")))
                    .find(|t| context.long_enough(t))
            })
            .or_else(|| {
                json_ld_descriptions(html)
                    .into_iter()
                    .find(|t| context.long_enough(t))
            })
    }
}
