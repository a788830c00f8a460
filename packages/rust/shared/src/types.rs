//! Core domain types for Rewritex articles and pipeline values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RewritexError;

/// Author recorded when an article arrives without one.
pub const DEFAULT_AUTHOR: &str = "Unknown";

// ---------------------------------------------------------------------------
// ArticleId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for article identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub Uuid);

impl ArticleId {
    /// Generate a new time-sortable article identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ArticleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArticleId {
    type Err = RewritexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| RewritexError::validation(format!("invalid article id: {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// ArticleSource
// ---------------------------------------------------------------------------

/// Where an article came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSource {
    /// Ingested from the source site; input to the rewrite pipeline.
    Origin,
    /// Produced by the rewrite pipeline from an origin article.
    Derived,
    /// Written through the CRUD boundary.
    Manual,
}

impl ArticleSource {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Derived => "derived",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ArticleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArticleSource {
    type Err = RewritexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "origin" => Ok(Self::Origin),
            "derived" => Ok(Self::Derived),
            "manual" => Ok(Self::Manual),
            other => Err(RewritexError::validation(format!(
                "invalid source {other:?}, expected one of origin, derived, manual"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A persisted article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    /// Sanitized HTML body.
    pub content: String,
    pub source: ArticleSource,
    pub author: String,
    /// Set only on derived articles; points at the origin they were produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_article_id: Option<ArticleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Unique across the corpus; only origin articles carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating an article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub source: ArticleSource,
    /// Defaults to [`DEFAULT_AUTHOR`] when absent or blank.
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub original_article_id: Option<ArticleId>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl NewArticle {
    /// Minimal payload; optional fields start empty.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        source: ArticleSource,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source,
            author: None,
            original_article_id: None,
            published_at: None,
            source_url: None,
            references: Vec::new(),
        }
    }
}

/// Partial update for an article. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticlePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<ArticleSource>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub original_article_id: Option<ArticleId>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub references: Option<Vec<String>>,
}

impl ArticlePatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.source.is_none()
            && self.author.is_none()
            && self.original_article_id.is_none()
            && self.published_at.is_none()
            && self.references.is_none()
    }
}

/// Ordering for article listings (by creation time).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Oldest,
    Newest,
}

/// Filter for [`crate::ArticleStore::find`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ArticleFilter {
    pub source: Option<ArticleSource>,
    pub order: SortOrder,
}

impl ArticleFilter {
    /// All articles of one source, oldest first.
    pub fn by_source(source: ArticleSource) -> Self {
        Self {
            source: Some(source),
            order: SortOrder::Oldest,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline values (never persisted)
// ---------------------------------------------------------------------------

/// A search result link with its blog-likeness score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCandidate {
    pub url: String,
    pub score: u8,
}

/// Text pulled from a reference page. Empty `text` means extraction failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub url: String,
    pub text: String,
}

impl ExtractedContent {
    /// Extraction result signalling failure.
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: String::new(),
        }
    }

    /// Whether the extraction produced usable text.
    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// The object recovered from a model completion.
///
/// Fields are read leniently: a missing or mistyped field becomes `None`
/// (or an empty list) instead of failing the whole rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteResult {
    pub title: Option<String>,
    /// Rewritten HTML body.
    pub content: Option<String>,
    pub source: Option<String>,
    pub references: Vec<String>,
    pub author: Option<String>,
}

impl RewriteResult {
    /// Read the expected fields out of a decoded JSON object.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };

        let references = value
            .get("references")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            title: text("title"),
            content: text("content"),
            source: text("source"),
            references,
            author: text("author"),
        }
    }
}
