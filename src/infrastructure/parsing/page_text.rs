//! Visible page text handed to the language-model fallback

use scraper::{ElementRef, Html, Selector};

const SKIPPED_TAGS: [&str; 7] = ["script", "style", "nav", "header", "footer", "noscript", "template"];

/// Text of `main`, else `article`, else `body`, one fragment per line, with
/// scripts, styles and page chrome removed. Truncated to `limit` characters.
pub fn llm_page_text(html: &Html, limit: usize) -> Option<String> {
    let region = ["main", "article", "body"].iter().find_map(|tag| {
        Selector::parse(tag)
            .ok()
            .and_then(|selector| html.select(&selector).next())
    })?;

    let lines: Vec<&str> = region
        .descendants()
        .filter(|node| {
            !node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| SKIPPED_TAGS.contains(&el.value().name()))
        })
        .filter_map(|node| node.value().as_text().map(|t| t.trim()))
        .filter(|t| !t.is_empty())
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(lines.join("\n").chars().take(limit).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_chrome_and_scripts() {
        let html = Html::parse_document(
            r"<html><head><style>body{}</style></head><body>
                <header>Logo</header><nav>Menu</nav>
                <div>Produit <b>Alpha</b></div>
                <script>var x = 1;</script>
                <footer>Contact</footer>
            </body></html>",
        );
        assert_eq!(llm_page_text(&html, 8000).as_deref(), Some("Produit\nAlpha"));
    }

    #[test]
    fn prefers_main_region() {
        let html = Html::parse_document(
            "<html><body><p>Sidebar</p><main><p>Main text</p></main></body></html>",
        );
        assert_eq!(llm_page_text(&html, 8000).as_deref(), Some("Main text"));
    }

    #[test]
    fn truncates_to_limit() {
        let body = format!("<html><body><p>{}</p></body></html>", "é".repeat(100));
        let html = Html::parse_document(&body);
        assert_eq!(llm_page_text(&html, 10).unwrap().chars().count(), 10);
    }

    #[test]
    fn empty_page_has_no_text() {
        let html = Html::parse_document("<html><body><script>x</script></body></html>");
        assert!(llm_page_text(&html, 8000).is_none());
    }
}
