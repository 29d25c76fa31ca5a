//! Realistic browser header sets, rotated per request

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, REFERER, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};

/// What a request is for; navigation and image fetches send different `Accept` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Document,
    Image,
}

#[derive(Debug, Clone, Copy)]
struct BrowserProfile {
    user_agent: &'static str,
    accept_document: &'static str,
    accept_image: &'static str,
    /// Chromium-based browsers send fetch metadata headers
    sends_fetch_metadata: bool,
}

const PROFILES: [BrowserProfile; 5] = [
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept_document: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_image: "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
        sends_fetch_metadata: true,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        accept_document: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_image: "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
        sends_fetch_metadata: true,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        accept_document: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_image: "image/avif,image/webp,*/*",
        sends_fetch_metadata: false,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        accept_document: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_image: "image/webp,image/avif,image/*,*/*;q=0.8",
        sends_fetch_metadata: false,
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
        accept_document: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_image: "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
        sends_fetch_metadata: true,
    },
];

const ACCEPT_LANGUAGES: [&str; 4] = [
    "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7",
    "fr-MA,fr;q=0.9,ar;q=0.8,en;q=0.7",
    "en-US,en;q=0.9,fr;q=0.8",
    "fr,fr-FR;q=0.8,en-US;q=0.5,en;q=0.3",
];

/// Pick a random profile and language and build the header set.
///
/// `referer` is only attached when given; image requests pass the page URL.
pub fn random_headers(kind: RequestKind, referer: Option<&str>) -> HeaderMap {
    let profile = PROFILES[fastrand::usize(..PROFILES.len())];
    let language = ACCEPT_LANGUAGES[fastrand::usize(..ACCEPT_LANGUAGES.len())];

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(profile.user_agent));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));

    match kind {
        RequestKind::Document => {
            headers.insert(ACCEPT, HeaderValue::from_static(profile.accept_document));
            headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        }
        RequestKind::Image => {
            headers.insert(ACCEPT, HeaderValue::from_static(profile.accept_image));
        }
    }

    if profile.sends_fetch_metadata {
        let (dest, mode, site) = match kind {
            RequestKind::Document => ("document", "navigate", "none"),
            RequestKind::Image => ("image", "no-cors", "cross-site"),
        };
        headers.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static(dest));
        headers.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static(mode));
        headers.insert(HeaderName::from_static("sec-fetch-site"), HeaderValue::from_static(site));
    }

    if let Some(value) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
        headers.insert(REFERER, value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn document_headers_look_like_a_browser() {
        let headers = random_headers(RequestKind::Document, None);
        let ua = headers.get(USER_AGENT).unwrap().to_str().unwrap();
        assert!(ua.starts_with("Mozilla/5.0"));
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().contains("text/html"));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
        assert!(!headers.contains_key(REFERER));
    }

    #[test]
    fn image_headers_carry_referer() {
        let headers = random_headers(RequestKind::Image, Some("https://www.iris.ma/p/123"));
        assert_eq!(headers.get(REFERER).unwrap(), "https://www.iris.ma/p/123");
        assert!(headers.get(ACCEPT).unwrap().to_str().unwrap().contains("image/"));
    }

    #[test]
    fn user_agents_rotate() {
        let seen: HashSet<String> = (0..200)
            .map(|_| {
                random_headers(RequestKind::Document, None)
                    .get(USER_AGENT)
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert!(seen.len() > 1);
    }
}
