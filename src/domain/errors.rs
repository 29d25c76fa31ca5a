//! Error taxonomy shared by the pipeline layers
//!
//! Only `ItemError` can fail a work item. Everything else is either surfaced at
//! startup or downgraded to a "nothing found" outcome by its owner.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failures raised by the fetch layer
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        message: String,
        attempts: u32,
    },

    #[error("HTTP error {status}: {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("Response from {url} exceeds {limit} bytes (declared: {declared:?})")]
    BodyTooLarge {
        url: String,
        declared: Option<u64>,
        limit: u64,
    },

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    /// HTTP status carried by the error, if the server answered at all
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of the catalog read/write interface
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog persistence failed: {0}")]
    Persistence(String),

    #[error("Product {0} not found in catalog")]
    NotFound(i64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Failures of the text-generation service
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Language model configuration error: {0}")]
    Config(String),

    #[error("Language model request failed: {0}")]
    Network(String),

    #[error("Language model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Language model response could not be parsed: {0}")]
    Parse(String),
}

/// Ledger-facing classification of a work item failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NetworkError,
    PersistenceError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkError => write!(f, "NetworkError"),
            Self::PersistenceError => write!(f, "PersistenceError"),
        }
    }
}

/// The only errors that fail a work item, populate the ledger, and count toward the error total
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Network(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] CatalogError),
}

impl ItemError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Persistence(_) => ErrorKind::PersistenceError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_error_kinds() {
        let network: ItemError = FetchError::HttpStatus {
            url: "https://shop.example/p".into(),
            status: 404,
        }
        .into();
        assert_eq!(network.kind(), ErrorKind::NetworkError);
        assert_eq!(network.to_string(), "HTTP error 404: https://shop.example/p");

        let persistence: ItemError = CatalogError::Persistence("disk full".into()).into();
        assert_eq!(persistence.kind(), ErrorKind::PersistenceError);
    }

    #[test]
    fn fetch_error_status() {
        let err = FetchError::Network {
            url: "https://shop.example".into(),
            message: "connection refused".into(),
            attempts: 3,
        };
        assert_eq!(err.status(), None);
        assert_eq!(
            FetchError::HttpStatus { url: String::new(), status: 503 }.status(),
            Some(503)
        );
    }
}
