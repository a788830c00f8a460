//! Shared types, error model, configuration, and the persistence contract.
//!
//! This crate is the foundation depended on by all other Rewritex crates.
//! It provides:
//! - [`RewritexError`], the unified error type
//! - Domain types ([`Article`], [`ArticleId`], [`ArticleSource`], pipeline values)
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`ArticleStore`], the storage seam injected into batch jobs

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, IngestConfig, LlmConfig, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{Result, RewritexError};
pub use store::ArticleStore;
pub use types::{
    Article, ArticleFilter, ArticleId, ArticlePatch, ArticleSource, DEFAULT_AUTHOR,
    ExtractedContent, NewArticle, ReferenceCandidate, RewriteResult, SortOrder,
};
