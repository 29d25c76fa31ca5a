//! HTTP client for merchant pages with retry, backoff and politeness delay
//!
//! Every request (page or image) waits a jittered delay first; this is the only
//! pacing applied toward external sites. Transient failures are retried with
//! exponential backoff, everything else surfaces immediately.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::errors::FetchError;
use crate::domain::services::{FetchedBinary, FetchedPage, PageFetcher};
use crate::infrastructure::browser_headers::{RequestKind, random_headers};
use crate::infrastructure::config::FetchConfig;

/// Jittered delay: `base ± variance`, never below `floor`.
///
/// A zero base with zero variance disables the delay entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolitenessDelay {
    pub base_secs: f64,
    pub variance_secs: f64,
    pub floor_secs: f64,
}

impl PolitenessDelay {
    pub const fn disabled() -> Self {
        Self {
            base_secs: 0.0,
            variance_secs: 0.0,
            floor_secs: 0.0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        if self.base_secs <= 0.0 && self.variance_secs <= 0.0 {
            return Duration::ZERO;
        }
        let jitter = (fastrand::f64() * 2.0 - 1.0) * self.variance_secs;
        let secs = (self.base_secs + jitter).max(self.floor_secs).max(0.0);
        Duration::from_secs_f64(secs)
    }
}

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    /// Total attempts for a retryable request
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub delay: PolitenessDelay,
    pub verify_tls: bool,
    pub max_redirects: usize,
}

impl HttpClientConfig {
    pub fn from_fetch_config(fetch: &FetchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(fetch.timeout_secs),
            max_retries: fetch.max_retries.max(1),
            backoff_base: Duration::from_secs(fetch.backoff_base_secs),
            delay: PolitenessDelay {
                base_secs: fetch.request_delay_secs,
                variance_secs: fetch.delay_variance_secs,
                floor_secs: fetch.min_delay_secs,
            },
            verify_tls: fetch.verify_tls,
            max_redirects: fetch.max_redirects,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_fetch_config(&FetchConfig::default())
    }
}

/// Upper bound of the exponential backoff between attempts
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Statuses worth another attempt
const fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// HTTP client shared by page and image fetches for one run
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn with_config(config: HttpClientConfig) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub const fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn validate_url(url: &str) -> Result<(), FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    fn backoff_for(&self, attempt: u32, response: Option<&Response>) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let mut delay = self
            .config
            .backoff_base
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF));
        // Respect Retry-After if present on 429/503
        if let Some(retry_after) = response
            .and_then(|r| r.headers().get(reqwest::header::RETRY_AFTER))
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            delay = delay.max(Duration::from_secs(retry_after));
        }
        delay
    }

    /// GET with the politeness delay, rotating headers and the retry policy
    async fn send_with_policy(
        &self,
        url: &str,
        kind: RequestKind,
        referer: Option<&str>,
    ) -> Result<Response, FetchError> {
        Self::validate_url(url)?;

        let pause = self.config.delay.next_delay();
        if !pause.is_zero() {
            debug!("Waiting {:?} before request to {}", pause, url);
            sleep(pause).await;
        }

        let max_attempts = self.config.max_retries;
        let mut attempt = 1;
        loop {
            info!("🌐 HTTP GET (attempt {}/{}) : {}", attempt, max_attempts, url);
            let request = self.client.get(url).headers(random_headers(kind, referer));

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if is_retryable(status) && attempt < max_attempts {
                        let delay = self.backoff_for(attempt, Some(&response));
                        warn!(
                            "⚠️ HTTP {} on attempt {}/{} for {}, retrying in {:?}",
                            status, attempt, max_attempts, url, delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    warn!("❌ HTTP error {}: {}", status, url);
                    return Err(FetchError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(e) => {
                    if attempt < max_attempts {
                        let delay = self.backoff_for(attempt, None);
                        warn!(
                            "⚠️ Network error on attempt {}/{} for {}: {}, retrying in {:?}",
                            attempt, max_attempts, url, e, delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    warn!("❌ Request failed after {} attempts: {}: {}", attempt, url, e);
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

fn header_map(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.send_with_policy(url, RequestKind::Document, None).await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = header_map(&response);
        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!("Fetched {} bytes from {} (final URL: {})", body.len(), url, final_url);

        Ok(FetchedPage {
            status,
            headers,
            body,
            final_url,
        })
    }

    async fn fetch_binary(
        &self,
        url: &str,
        referer: &str,
        max_bytes: u64,
    ) -> Result<FetchedBinary, FetchError> {
        let mut response = self
            .send_with_policy(url, RequestKind::Image, Some(referer))
            .await?;

        let content_length = response.content_length();
        if let Some(declared) = content_length.filter(|len| *len > max_bytes) {
            return Err(FetchError::BodyTooLarge {
                url: url.to_string(),
                declared: Some(declared),
                limit: max_bytes,
            });
        }

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > max_bytes {
                return Err(FetchError::BodyTooLarge {
                    url: url.to_string(),
                    declared: content_length,
                    limit: max_bytes,
                });
            }
        }

        Ok(FetchedBinary {
            status,
            content_type,
            content_length,
            bytes,
            final_url,
        })
    }
}
