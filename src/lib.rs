//! Catalog Scraper - fills missing product descriptions from merchant pages
//!
//! Products lacking a usable description are looked up through their
//! merchant offer links. Each page is fetched politely, classified, and run
//! through a chain of extraction strategies with an optional language-model
//! fallback. Results are written back to the catalog in per-item or
//! all-or-nothing transactions, with a failure ledger for later replay.

pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
mod test_utils;
