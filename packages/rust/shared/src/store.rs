//! Persistence contract consumed by the ingestion scraper and the pipeline.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Article, ArticleFilter, ArticleId, NewArticle};

/// Article persistence as seen by the batch jobs.
///
/// Implementations must enforce source URL uniqueness and report a clash as
/// [`crate::RewritexError::Duplicate`].
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert a new article and return the stored record.
    async fn create(&self, article: NewArticle) -> Result<Article>;

    /// Look up an article by id.
    async fn find_by_id(&self, id: &ArticleId) -> Result<Option<Article>>;

    /// Look up the article ingested from `source_url`.
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Article>>;

    /// List articles matching `filter`, in the filter's order.
    async fn find(&self, filter: ArticleFilter) -> Result<Vec<Article>>;

    /// The most recent derived article produced from `origin`, if any.
    async fn find_derived(&self, origin: &ArticleId) -> Result<Option<Article>>;
}
