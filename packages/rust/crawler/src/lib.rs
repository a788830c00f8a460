//! Page fetching, reference text extraction, and source-site ingestion.
//!
//! This crate provides:
//! - [`fetch`]: the [`PageFetcher`] capability and its HTTP implementation
//! - [`extractor`]: container-strategy based text extraction for reference pages
//! - [`ingest`]: the paginated source-site scraper that stores origin articles

pub mod extractor;
pub mod fetch;
pub mod ingest;

pub use extractor::{
    BodyStrategy, ContainerRegistry, ContainerStrategy, ContentExtractor, MIN_CONTENT_CHARS,
    SelectorStrategy,
};
pub use fetch::{FETCH_TIMEOUT, HttpFetcher, PageFetcher, USER_AGENT};
pub use ingest::{IngestOptions, IngestReport, IngestionScraper, ScrapedArticle, scrape_article};
