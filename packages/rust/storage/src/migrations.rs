//! SQL migration definitions for the Rewritex article database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: articles with unique source_url",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Origin, derived and manual articles
CREATE TABLE IF NOT EXISTS articles (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    content             TEXT NOT NULL,
    source              TEXT NOT NULL CHECK (source IN ('origin', 'derived', 'manual')),
    author              TEXT NOT NULL,
    original_article_id TEXT REFERENCES articles(id) ON DELETE SET NULL,
    published_at        TEXT,
    source_url          TEXT UNIQUE,
    references_json     TEXT NOT NULL DEFAULT '[]',
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source, created_at);
CREATE INDEX IF NOT EXISTS idx_articles_original ON articles(original_article_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
