//! Turso Embedded / libSQL storage layer for articles.
//!
//! The [`Storage`] struct wraps a libSQL database holding origin, derived and
//! manual articles. It is the only writer of article rows and it enforces the
//! write-boundary rules:
//!
//! - `source_url` is unique (schema constraint, surfaced as
//!   [`RewritexError::Duplicate`])
//! - derived articles, and only derived articles, carry an
//!   `original_article_id`, and it must point at an existing article
//! - every HTML body is passed through [`rewritex_html::sanitize`] and must
//!   still carry text afterwards
//!
//! **Access rules:**
//! - batch jobs and CRUD commands: read-write via [`Storage::open`]
//! - listing and inspection: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use rewritex_shared::{
    Article, ArticleFilter, ArticleId, ArticlePatch, ArticleSource, ArticleStore, DEFAULT_AUTHOR,
    NewArticle, Result, RewritexError, SortOrder,
};

const ARTICLE_COLUMNS: &str = "id, title, content, source, author, original_article_id, \
     published_at, source_url, references_json, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RewritexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RewritexError::not_found(format!(
                "database {} does not exist",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RewritexError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(RewritexError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Article operations
    // -----------------------------------------------------------------------

    /// Validate, sanitize and insert a new article.
    pub async fn create_article(&self, new: NewArticle) -> Result<Article> {
        self.check_writable()?;

        let title = required_text("title", &new.title)?;
        let content = sanitized_content(&new.content)?;
        check_lineage(new.source, new.original_article_id.as_ref())?;
        if let Some(original) = &new.original_article_id {
            self.ensure_exists(original).await?;
        }

        let now = Utc::now().trunc_subsecs(6);
        let article = Article {
            id: ArticleId::new(),
            title,
            content,
            source: new.source,
            author: author_or_default(new.author.as_deref()),
            original_article_id: new.original_article_id,
            published_at: new.published_at,
            source_url: new
                .source_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            references: new.references,
            created_at: now,
            updated_at: now,
        };

        let references_json = encode_references(&article.references)?;
        let sql = format!(
            "INSERT INTO articles ({ARTICLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    article.id.to_string(),
                    article.title.as_str(),
                    article.content.as_str(),
                    article.source.as_str(),
                    article.author.as_str(),
                    article.original_article_id.map(|id| id.to_string()),
                    article.published_at.map(format_ts),
                    article.source_url.as_deref(),
                    references_json,
                    format_ts(article.created_at),
                    format_ts(article.updated_at),
                ],
            )
            .await
            .map_err(|e| map_insert_err(e, article.source_url.as_deref()))?;

        debug!(id = %article.id, source = %article.source, "article created");
        Ok(article)
    }

    /// Get an article by id.
    pub async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1");
        self.query_one(&sql, id.to_string()).await
    }

    /// Get the article ingested from `source_url`.
    pub async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE source_url = ?1");
        self.query_one(&sql, source_url.trim().to_string()).await
    }

    /// List articles, optionally restricted to one source.
    pub async fn list_articles(&self, filter: ArticleFilter) -> Result<Vec<Article>> {
        let direction = match filter.order {
            SortOrder::Oldest => "ASC",
            SortOrder::Newest => "DESC",
        };
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE (?1 IS NULL OR source = ?1)
             ORDER BY created_at {direction}, id {direction}"
        );

        let mut rows = self
            .conn
            .query(&sql, params![filter.source.map(|s| s.as_str())])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_article(&row)?);
        }
        Ok(results)
    }

    /// The most recently created derived article of `origin`.
    pub async fn find_derived(&self, origin: &ArticleId) -> Result<Option<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE source = 'derived' AND original_article_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        );
        self.query_one(&sql, origin.to_string()).await
    }

    /// Apply a partial update and bump `updated_at`.
    pub async fn update_article(&self, id: &ArticleId, patch: ArticlePatch) -> Result<Article> {
        self.check_writable()?;

        let mut article = self
            .get_article(id)
            .await?
            .ok_or_else(|| RewritexError::not_found(format!("article {id}")))?;

        if let Some(title) = patch.title {
            article.title = required_text("title", &title)?;
        }
        if let Some(content) = patch.content {
            article.content = sanitized_content(&content)?;
        }
        if let Some(source) = patch.source {
            // Leaving `derived` drops the link unless the patch sets a new one.
            if source != ArticleSource::Derived && patch.original_article_id.is_none() {
                article.original_article_id = None;
            }
            article.source = source;
        }
        if let Some(author) = patch.author {
            article.author = author_or_default(Some(&author));
        }
        if let Some(original) = patch.original_article_id {
            if original == *id {
                return Err(RewritexError::validation(
                    "an article cannot be its own original",
                ));
            }
            self.ensure_exists(&original).await?;
            article.original_article_id = Some(original);
        }
        if let Some(published_at) = patch.published_at {
            article.published_at = Some(published_at);
        }
        if let Some(references) = patch.references {
            article.references = references;
        }
        check_lineage(article.source, article.original_article_id.as_ref())?;
        article.updated_at = Utc::now().trunc_subsecs(6);

        let references_json = encode_references(&article.references)?;
        self.conn
            .execute(
                "UPDATE articles SET title = ?1, content = ?2, source = ?3, author = ?4,
                   original_article_id = ?5, published_at = ?6, references_json = ?7,
                   updated_at = ?8
                 WHERE id = ?9",
                params![
                    article.title.as_str(),
                    article.content.as_str(),
                    article.source.as_str(),
                    article.author.as_str(),
                    article.original_article_id.map(|o| o.to_string()),
                    article.published_at.map(format_ts),
                    references_json,
                    format_ts(article.updated_at),
                    id.to_string(),
                ],
            )
            .await
            .map_err(storage_err)?;

        debug!(%id, "article updated");
        Ok(article)
    }

    /// Delete an article by id.
    pub async fn delete_article(&self, id: &ArticleId) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM articles WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(storage_err)?;

        if affected == 0 {
            return Err(RewritexError::not_found(format!("article {id}")));
        }
        debug!(%id, "article deleted");
        Ok(())
    }

    async fn ensure_exists(&self, id: &ArticleId) -> Result<()> {
        if self.get_article(id).await?.is_none() {
            return Err(RewritexError::validation(format!(
                "original article {id} does not exist"
            )));
        }
        Ok(())
    }

    async fn query_one(&self, sql: &str, key: String) -> Result<Option<Article>> {
        let mut rows = self
            .conn
            .query(sql, params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_article(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ArticleStore for Storage {
    async fn create(&self, article: NewArticle) -> Result<Article> {
        self.create_article(article).await
    }

    async fn find_by_id(&self, id: &ArticleId) -> Result<Option<Article>> {
        self.get_article(id).await
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Article>> {
        Storage::find_by_source_url(self, source_url).await
    }

    async fn find(&self, filter: ArticleFilter) -> Result<Vec<Article>> {
        self.list_articles(filter).await
    }

    async fn find_derived(&self, origin: &ArticleId) -> Result<Option<Article>> {
        Storage::find_derived(self, origin).await
    }
}

// ---------------------------------------------------------------------------
// Row mapping and validation helpers
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> RewritexError {
    RewritexError::Storage(e.to_string())
}

fn map_insert_err(e: libsql::Error, source_url: Option<&str>) -> RewritexError {
    let message = e.to_string();
    match source_url {
        Some(url) if message.contains("UNIQUE constraint failed") => RewritexError::Duplicate {
            source_url: url.to_string(),
        },
        _ => RewritexError::Storage(message),
    }
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RewritexError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Derived articles must name their original; other sources must not.
fn check_lineage(source: ArticleSource, original: Option<&ArticleId>) -> Result<()> {
    match (source, original) {
        (ArticleSource::Derived, None) => Err(RewritexError::validation(
            "derived articles require original_article_id",
        )),
        (ArticleSource::Origin | ArticleSource::Manual, Some(_)) => Err(
            RewritexError::validation(format!(
                "original_article_id is only allowed on derived articles, not {source}"
            )),
        ),
        _ => Ok(()),
    }
}

fn sanitized_content(html: &str) -> Result<String> {
    let clean = rewritex_html::sanitize(html);
    if !rewritex_html::has_text(&clean) {
        return Err(RewritexError::validation(
            "content is required and must contain text after sanitization",
        ));
    }
    Ok(clean)
}

fn author_or_default(author: Option<&str>) -> String {
    match author.map(str::trim) {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => DEFAULT_AUTHOR.to_string(),
    }
}

fn encode_references(references: &[String]) -> Result<String> {
    serde_json::to_string(references)
        .map_err(|e| RewritexError::Storage(format!("encode references: {e}")))
}

/// Fixed-width UTC timestamps so lexicographic order is chronological.
/// Values are stored at microsecond precision.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RewritexError::Storage(format!("invalid date {s:?}: {e}")))
}

/// Convert a database row to an [`Article`].
fn row_to_article(row: &libsql::Row) -> Result<Article> {
    let text = |idx: i32| row.get::<String>(idx).map_err(storage_err);

    let id = text(0)?
        .parse::<ArticleId>()
        .map_err(|e| RewritexError::Storage(e.to_string()))?;
    let source = text(3)?
        .parse::<ArticleSource>()
        .map_err(|e| RewritexError::Storage(e.to_string()))?;
    let original_article_id = match row.get::<String>(5).ok() {
        Some(s) => Some(
            s.parse::<ArticleId>()
                .map_err(|e| RewritexError::Storage(e.to_string()))?,
        ),
        None => None,
    };
    let published_at = match row.get::<String>(6).ok() {
        Some(s) => Some(parse_ts(&s)?),
        None => None,
    };
    let references: Vec<String> = serde_json::from_str(&text(8)?)
        .map_err(|e| RewritexError::Storage(format!("decode references: {e}")))?;

    Ok(Article {
        id,
        title: text(1)?,
        content: text(2)?,
        source,
        author: text(4)?,
        original_article_id,
        published_at,
        source_url: row.get::<String>(7).ok(),
        references,
        created_at: parse_ts(&text(9)?)?,
        updated_at: parse_ts(&text(10)?)?,
    })
}
