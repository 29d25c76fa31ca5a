//! In-memory fakes for the catalog, the fetch layer and the language model
//!
//! Shared by the unit tests of the application layer so they run without a
//! network or a database file.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::entities::{CatalogProduct, Offer, ProductId};
use crate::domain::errors::{CatalogError, FetchError, LlmError};
use crate::domain::repositories::{CatalogResult, CatalogStore, CatalogWrite, DescriptionStats};
use crate::domain::services::{
    ChatPrompt, Completion, FetchedBinary, FetchedPage, PageFetcher, TextGenerator, TokenUsage,
};

/// Catalog kept in memory; `apply` is atomic like the SQLite store
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<Vec<CatalogProduct>>,
    offers: Mutex<Vec<Offer>>,
    fail_writes: AtomicBool,
    fail_offers: AtomicBool,
    apply_calls: AtomicUsize,
    min_length: usize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            min_length: 50,
            ..Self::default()
        }
    }

    pub fn with_product(self, id: ProductId, name: &str, description: Option<&str>) -> Self {
        self.products.lock().unwrap().push(CatalogProduct {
            id,
            name: name.to_string(),
            slug: crate::domain::services::slugify(name),
            description: description.map(str::to_string),
            image: None,
        });
        self
    }

    pub fn with_offer(self, product_id: ProductId, merchant: &str, url: &str) -> Self {
        self.offers.lock().unwrap().push(Offer {
            product_id,
            merchant_name: merchant.to_string(),
            url: url.to_string(),
        });
        self
    }

    /// Make every subsequent `apply` fail
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Toggle failures of `offers_for_product`
    pub fn fail_offer_lookups(&self, fail: bool) {
        self.fail_offers.store(fail, Ordering::SeqCst);
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn product(&self, id: ProductId) -> Option<CatalogProduct> {
        self.products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn description(&self, id: ProductId) -> Option<String> {
        self.product(id).and_then(|p| p.description)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn products_needing_description(
        &self,
        limit: Option<u32>,
        include_described: bool,
    ) -> CatalogResult<Vec<CatalogProduct>> {
        let mut products: Vec<CatalogProduct> = self
            .products
            .lock()
            .unwrap()
            .iter()
            .filter(|p| include_described || !p.has_description(self.min_length))
            .cloned()
            .collect();
        products.sort_by_key(|p| p.id);
        if let Some(limit) = limit {
            products.truncate(limit as usize);
        }
        Ok(products)
    }

    async fn offers_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Offer>> {
        if self.fail_offers.load(Ordering::SeqCst) {
            return Err(CatalogError::Persistence("database is locked".into()));
        }
        Ok(self
            .offers
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn product_by_id(&self, product_id: ProductId) -> CatalogResult<Option<CatalogProduct>> {
        Ok(self.product(product_id))
    }

    async fn find_product_by_slug(&self, slug: &str) -> CatalogResult<Option<CatalogProduct>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn all_products(&self) -> CatalogResult<Vec<CatalogProduct>> {
        Ok(self.products.lock().unwrap().clone())
    }

    async fn apply(&self, writes: &[CatalogWrite]) -> CatalogResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CatalogError::Persistence("database is locked".into()));
        }

        let mut products = self.products.lock().unwrap();
        if let Some(missing) = writes
            .iter()
            .find(|w| !products.iter().any(|p| p.id == w.product_id()))
        {
            return Err(CatalogError::NotFound(missing.product_id()));
        }

        for write in writes {
            let Some(product) = products.iter_mut().find(|p| p.id == write.product_id()) else {
                continue;
            };
            match write {
                CatalogWrite::SetDescription { text, .. } => product.description = Some(text.clone()),
                CatalogWrite::SetImage { path, .. } => product.image = Some(path.clone()),
            }
        }
        Ok(())
    }

    async fn description_stats(&self) -> CatalogResult<DescriptionStats> {
        let products = self.products.lock().unwrap();
        let total = products.len() as u64;
        let with_description = products
            .iter()
            .filter(|p| p.description.as_deref().is_some_and(|d| !d.trim().is_empty()))
            .count() as u64;
        Ok(DescriptionStats {
            total_products: total,
            with_description,
            without_description: total - with_description,
            needing_processing: products
                .iter()
                .filter(|p| !p.has_description(self.min_length))
                .count() as u64,
            with_image: products.iter().filter(|p| p.image.is_some()).count() as u64,
        })
    }
}

enum FakeResponse {
    Page(String),
    Binary { content_type: String, bytes: Vec<u8> },
    Fail(FetchError),
}

/// Canned responses keyed by URL; unknown URLs answer 404
#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, FakeResponse>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), FakeResponse::Page(body.to_string()));
        self
    }

    pub fn with_binary(mut self, url: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.responses.insert(
            url.to_string(),
            FakeResponse::Binary {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        self
    }

    pub fn with_network_error(mut self, url: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            FakeResponse::Fail(FetchError::Network {
                url: url.to_string(),
                message: "connection reset".into(),
                attempts: 3,
            }),
        );
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Result<&FakeResponse, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.responses.get(url) {
            Some(FakeResponse::Fail(e)) => Err(e.clone()),
            Some(response) => Ok(response),
            None => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let body = match self.lookup(url)? {
            FakeResponse::Page(body) => body.clone(),
            _ => String::new(),
        };
        Ok(FetchedPage {
            status: 200,
            headers: HashMap::new(),
            body,
            final_url: url.to_string(),
        })
    }

    async fn fetch_binary(
        &self,
        url: &str,
        _referer: &str,
        max_bytes: u64,
    ) -> Result<FetchedBinary, FetchError> {
        let (content_type, bytes) = match self.lookup(url)? {
            FakeResponse::Binary {
                content_type,
                bytes,
            } => (Some(content_type.clone()), bytes.clone()),
            FakeResponse::Page(body) => (Some("text/html".to_string()), body.clone().into_bytes()),
            FakeResponse::Fail(e) => return Err(e.clone()),
        };

        let length = bytes.len() as u64;
        if length > max_bytes {
            return Err(FetchError::BodyTooLarge {
                url: url.to_string(),
                declared: Some(length),
                limit: max_bytes,
            });
        }

        Ok(FetchedBinary {
            status: 200,
            content_type,
            content_length: Some(length),
            bytes,
            final_url: url.to_string(),
        })
    }
}

/// Scripted language model that counts its calls
pub struct FakeTextGenerator {
    answer: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl FakeTextGenerator {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self {
            answer: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, _prompt: &ChatPrompt) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map(|text| Completion {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            }),
        })
    }
}
