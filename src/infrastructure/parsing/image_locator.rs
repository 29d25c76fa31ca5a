//! Representative product image candidates on a fetched page

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{compile_selector, compile_selectors, meta_content};

const PRODUCT_IMAGE_SELECTORS: [&str; 8] = [
    r#"img[itemprop="image"]"#,
    "img.product-image",
    ".product-image img",
    r#"[class*="product-image"] img"#,
    r#"[class*="product-gallery"] img"#,
    r#"[class*="gallery"] img"#,
    r#"img[class*="product"]"#,
    "#product img",
];

const MAIN_REGIONS: [&str; 4] = ["main", "article", r#"[role="main"]"#, r#"div[class*="product"]"#];

/// Attributes that carry the real source on lazy-loading pages, most specific first
const SOURCE_ATTRS: [&str; 5] = ["data-zoom-image", "data-large_image", "data-src", "data-lazy-src", "src"];

/// Fragments marking decorative images
const ICON_MARKERS: [&str; 7] = ["icon", "logo", "sprite", "placeholder", "avatar", "badge", "loader"];

/// Images with declared dimensions below this are treated as icons
const MIN_DIMENSION: u32 = 150;

pub struct ImageLocator {
    max_candidates: usize,
    og_image: Option<Selector>,
    product_images: Vec<Selector>,
    regions: Vec<Selector>,
    images: Option<Selector>,
}

impl ImageLocator {
    pub fn new(max_candidates: usize) -> Self {
        Self {
            max_candidates,
            og_image: compile_selector(r#"meta[property="og:image"], meta[property="og:image:secure_url"]"#),
            product_images: compile_selectors(&PRODUCT_IMAGE_SELECTORS),
            regions: compile_selectors(&MAIN_REGIONS),
            images: compile_selector("img"),
        }
    }

    /// Up to `max_candidates` absolute image URLs: Open Graph image, then
    /// product-image patterns, then the first large non-icon image of the main
    /// content region.
    pub fn locate(&self, html: &Html, page_url: &str) -> Vec<String> {
        let base = Url::parse(page_url).ok();
        let mut candidates: Vec<String> = Vec::new();
        let push = |raw: &str, candidates: &mut Vec<String>| {
            if let Some(url) = resolve(base.as_ref(), raw) {
                if !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        };

        if let Some(og) = self.og_image.as_ref().and_then(|s| meta_content(html, s)) {
            push(&og, &mut candidates);
        }

        for selector in &self.product_images {
            for img in html.select(selector) {
                if let Some(src) = image_source(img).filter(|src| !looks_like_icon(img, src)) {
                    push(src, &mut candidates);
                }
            }
        }

        if let Some(images) = &self.images {
            let main_image = self
                .regions
                .iter()
                .find_map(|region| html.select(region).next())
                .and_then(|region| {
                    region.select(images).find_map(|img| {
                        image_source(img).filter(|src| !looks_like_icon(img, src))
                    })
                });
            if let Some(src) = main_image {
                push(src, &mut candidates);
            }
        }

        candidates.truncate(self.max_candidates);
        candidates
    }
}

fn image_source(img: ElementRef<'_>) -> Option<&str> {
    SOURCE_ATTRS
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
}

fn looks_like_icon(img: ElementRef<'_>, src: &str) -> bool {
    let lower = src.to_lowercase();
    if lower.ends_with(".svg") || lower.ends_with(".ico") || lower.ends_with(".gif") {
        return true;
    }

    let class_and_alt = format!(
        "{} {}",
        img.value().attr("class").unwrap_or_default(),
        img.value().attr("alt").unwrap_or_default()
    )
    .to_lowercase();
    let path = lower.rsplit('/').next().unwrap_or(&lower);
    if ICON_MARKERS
        .iter()
        .any(|m| path.contains(m) || class_and_alt.contains(m))
    {
        return true;
    }

    let declared = |attr: &str| {
        img.value()
            .attr(attr)
            .and_then(|v| v.trim().trim_end_matches("px").parse::<u32>().ok())
    };
    [declared("width"), declared("height")]
        .into_iter()
        .flatten()
        .any(|d| d < MIN_DIMENSION)
}

fn resolve(base: Option<&Url>, raw: &str) -> Option<String> {
    let url = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://www.iris.ma/produits/tv-55";

    fn locate(body: &str) -> Vec<String> {
        ImageLocator::new(3).locate(&Html::parse_document(body), PAGE)
    }

    #[test]
    fn open_graph_first_then_patterns() {
        let urls = locate(
            r#"<html><head><meta property="og:image" content="https://cdn.iris.ma/tv-55.jpg"></head><body>
                <div class="product-image"><img src="/media/tv-55-front.jpg"></div>
                <img itemprop="image" src="https://cdn.iris.ma/tv-55.jpg">
            </body></html>"#,
        );
        assert_eq!(
            urls,
            vec![
                "https://cdn.iris.ma/tv-55.jpg".to_string(),
                "https://www.iris.ma/media/tv-55-front.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn main_region_skips_icons() {
        let urls = locate(
            r#"<html><body><header><img src="/logo.png"></header><main>
                <img src="/static/cart-icon.png">
                <img src="/img/spinner.gif">
                <img src="/img/thumb.jpg" width="40" height="40">
                <img data-src="/img/tv-large.webp" src="data:image/gif;base64,AAAA" width="600">
            </main></body></html>"#,
        );
        assert_eq!(urls, vec!["https://www.iris.ma/img/tv-large.webp".to_string()]);
    }

    #[test]
    fn caps_candidate_count() {
        let imgs: String = (0..6)
            .map(|i| format!(r#"<img class="product-photo" src="/p/{i}.jpg">"#))
            .collect();
        let urls = locate(&format!("<html><body>{imgs}</body></html>"));
        assert_eq!(urls.len(), 3);
        assert!(urls[0].ends_with("/p/0.jpg"));
    }

    #[test]
    fn page_without_images() {
        assert!(locate("<html><body><p>Rien</p></body></html>").is_empty());
    }
}
