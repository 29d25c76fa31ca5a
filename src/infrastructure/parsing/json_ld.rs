//! Description fields from embedded JSON-LD blocks

use scraper::{Html, Selector};
use serde_json::Value;

/// Deepest `@graph`/array nesting that is still searched
const MAX_DEPTH: usize = 4;

/// Parsed JSON-LD documents of a page; malformed blocks are ignored
pub fn json_ld_documents(html: &Html) -> Vec<Value> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    html.select(&selector)
        .filter_map(|el| {
            let raw: String = el.text().collect();
            serde_json::from_str::<Value>(raw.trim()).ok()
        })
        .collect()
}

/// Candidate descriptions in document order: `description`, then `about`,
/// then `offers.description` of every object, including `@graph` members and
/// top-level arrays.
pub fn json_ld_descriptions(html: &Html) -> Vec<String> {
    let mut found = Vec::new();
    for doc in json_ld_documents(html) {
        collect_descriptions(&doc, 0, &mut found);
    }
    found
}

fn collect_descriptions(value: &Value, depth: usize, out: &mut Vec<String>) {
    if depth > MAX_DEPTH {
        return;
    }

    match value {
        Value::Array(items) => {
            for item in items {
                collect_descriptions(item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            let offers_description = match map.get("offers") {
                Some(Value::Object(offers)) => offers.get("description"),
                Some(Value::Array(offers)) => offers.iter().find_map(|o| o.get("description")),
                _ => None,
            };

            let own = [map.get("description"), map.get("about"), offers_description]
                .into_iter()
                .flatten()
                .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()));
            if let Some(text) = own {
                out.push(text.to_string());
            }

            if let Some(graph) = map.get("@graph") {
                collect_descriptions(graph, depth + 1, out);
            }
        }
        _ => {}
    }
}
