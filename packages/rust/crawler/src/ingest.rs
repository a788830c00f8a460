//! Source-site ingestion.
//!
//! Walks the paginated article listing from the last page back to the first,
//! so the oldest articles are collected first, then scrapes each article page
//! into an origin [`NewArticle`]. Articles whose source URL is already stored
//! are skipped, which makes repeated runs idempotent.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use rewritex_shared::{
    ArticleSource, ArticleStore, DEFAULT_AUTHOR, IngestConfig, NewArticle, Result, RewritexError,
};

use crate::fetch::PageFetcher;

const TITLE_SELECTORS: &[&str] = &["h1.entry-title", "h1"];
const AUTHOR_SELECTORS: &[&str] = &[".entry-meta .author-name", ".entry-meta .author", "span.author"];
const DATE_SELECTORS: &[&str] = &[".entry-meta time", "time.entry-date", "time"];
const BODY_CONTAINERS: &[&str] = &[".entry-content", "article"];
const BODY_ELEMENTS: &str = "p, h2, h3, h4, ul, ol, blockquote";

/// Settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Listing root; page `n > 1` lives at `<root>page/<n>/`.
    pub listing_url: Url,
    /// Maximum number of article links collected.
    pub max_articles: usize,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let listing_url = Url::parse(&config.listing_url).map_err(|e| {
            RewritexError::config(format!("invalid listing_url {:?}: {e}", config.listing_url))
        })?;
        Ok(Self {
            listing_url,
            max_articles: config.max_articles,
        })
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Article links gathered from the listing pages.
    pub links_collected: usize,
    /// Origin articles stored by this run.
    pub created: usize,
    /// Links skipped because their source URL was already stored.
    pub duplicates: usize,
    /// Articles that could not be ingested (URL, error message).
    pub failures: Vec<(String, String)>,
}

/// Fields scraped from one article page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedArticle {
    pub title: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Outer HTML of the body's content elements, one per line.
    pub content: String,
}

/// Collects the oldest articles of the source site.
pub struct IngestionScraper {
    fetcher: Arc<dyn PageFetcher>,
    opts: IngestOptions,
}

impl IngestionScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, mut opts: IngestOptions) -> Self {
        if !opts.listing_url.path().ends_with('/') {
            let path = format!("{}/", opts.listing_url.path());
            opts.listing_url.set_path(&path);
        }
        Self { fetcher, opts }
    }

    /// Run one ingestion pass, storing new articles in `store`.
    ///
    /// Fails only when the listing root cannot be fetched; every per-article
    /// problem is recorded in the report and the run continues.
    #[instrument(skip_all, fields(listing_url = %self.opts.listing_url))]
    pub async fn run(&self, store: &dyn ArticleStore) -> Result<IngestReport> {
        let links = self.collect_links().await?;
        let mut report = IngestReport {
            links_collected: links.len(),
            ..Default::default()
        };
        info!(links = links.len(), "article links collected");

        for link in links {
            match self.ingest_one(&link, store).await {
                Ok(true) => report.created += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) => {
                    warn!(url = %link, error = %e, "article ingestion failed");
                    report.failures.push((link, e.to_string()));
                }
            }
        }

        info!(
            created = report.created,
            duplicates = report.duplicates,
            failed = report.failures.len(),
            "ingestion complete"
        );
        Ok(report)
    }

    /// Gather up to `max_articles` links, last listing page first.
    async fn collect_links(&self) -> Result<Vec<String>> {
        let root = &self.opts.listing_url;
        let root_html = self.fetcher.fetch(root.as_str()).await?;
        let last_page = last_page_number(&root_html);
        debug!(last_page, "pagination parsed");

        let mut links = Vec::new();
        let mut page = last_page;
        while page > 0 && links.len() < self.opts.max_articles {
            let url = page_url(root, page);
            let html = if page == 1 {
                root_html.clone()
            } else {
                match self.fetcher.fetch(url.as_str()).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!(page, error = %e, "listing page fetch failed");
                        page -= 1;
                        continue;
                    }
                }
            };

            for link in entry_links(&html, &url) {
                if links.len() >= self.opts.max_articles {
                    break;
                }
                if !links.contains(&link) {
                    links.push(link);
                }
            }
            page -= 1;
        }

        Ok(links)
    }

    /// Store one article. `Ok(false)` means it was already present.
    async fn ingest_one(&self, url: &str, store: &dyn ArticleStore) -> Result<bool> {
        if store.find_by_source_url(url).await?.is_some() {
            debug!(%url, "already ingested");
            return Ok(false);
        }

        let html = self.fetcher.fetch(url).await?;
        let scraped = scrape_article(&html).ok_or_else(|| {
            RewritexError::parse(format!("{url}: missing title or body content"))
        })?;

        let new = NewArticle {
            author: Some(scraped.author),
            published_at: scraped.published_at,
            source_url: Some(url.to_string()),
            ..NewArticle::new(scraped.title, scraped.content, ArticleSource::Origin)
        };

        match store.create(new).await {
            Ok(article) => {
                info!(id = %article.id, title = %article.title, "origin article stored");
                Ok(true)
            }
            Err(RewritexError::Duplicate { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Listing and article parsing
// ---------------------------------------------------------------------------

/// URL of listing page `page` (1-based).
pub fn page_url(root: &Url, page: u32) -> Url {
    if page <= 1 {
        return root.clone();
    }
    root.join(&format!("page/{page}/"))
        .unwrap_or_else(|_| root.clone())
}

/// Highest page number shown in the pagination control, or 1.
pub fn last_page_number(html: &str) -> u32 {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse(".page-numbers") else {
        return 1;
    };
    doc.select(&sel)
        .filter_map(|el| el.text().collect::<String>().trim().parse::<u32>().ok())
        .max()
        .unwrap_or(1)
        .max(1)
}

/// Entry-title links on a listing page, resolved against `page_url`.
pub fn entry_links(html: &str, page_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse(".entry-title a") else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .filter_map(|href| page_url.join(href.trim()).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Scrape title, author, date and body from an article page.
///
/// Returns `None` when the page has no title or no non-empty body element.
pub fn scrape_article(html: &str) -> Option<ScrapedArticle> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, TITLE_SELECTORS)?;
    let author = first_text(&doc, AUTHOR_SELECTORS).unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
    let published_at = first_match(&doc, DATE_SELECTORS).and_then(|el| {
        let raw = el
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(&el));
        parse_date(&raw)
    });

    let body_sel = Selector::parse(BODY_ELEMENTS).ok()?;
    let content = BODY_CONTAINERS
        .iter()
        .filter_map(|css| first_match(&doc, &[*css]))
        .map(|container| {
            container
                .select(&body_sel)
                .filter(|el| !element_text(el).is_empty())
                .filter(|el| !nested_in_block(el, &body_sel))
                .map(|el| el.html())
                .collect::<Vec<_>>()
        })
        .find(|blocks| !blocks.is_empty())?
        .join("\n");

    Some(ScrapedArticle {
        title,
        author,
        published_at,
        content,
    })
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn first_match<'a>(doc: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|css| {
        let sel = Selector::parse(css).ok()?;
        doc.select(&sel).next()
    })
}

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let sel = Selector::parse(css).ok()?;
        doc.select(&sel)
            .map(|el| element_text(&el))
            .find(|t| !t.is_empty())
    })
}

/// Whether `el` sits inside another body element (kept via its parent's HTML).
fn nested_in_block(el: &ElementRef<'_>, body_sel: &Selector) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| body_sel.matches(&ancestor))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use rewritex_shared::ArticleFilter;
    use rewritex_storage::Storage;
    use uuid::Uuid;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn listing(page_numbers: &[u32], hrefs: &[&str]) -> String {
        let pagination: String = page_numbers
            .iter()
            .map(|n| format!(r#"<a class="page-numbers" href="/blogs/page/{n}/">{n}</a>"#))
            .collect();
        let entries: String = hrefs
            .iter()
            .map(|h| format!(r#"<h2 class="entry-title"><a href="{h}">Post</a></h2>"#))
            .collect();
        format!(
            r#"<html><body>{entries}<nav class="pagination">{pagination}<a class="page-numbers next">Next</a></nav></body></html>"#
        )
    }

    fn article_page(title: &str) -> String {
        format!(
            r#"<html><body><article><h1 class="entry-title">{title}</h1>
            <div class="entry-meta"><span class="author-name">Dana</span><time datetime="2023-01-02">Jan 2</time></div>
            <div class="entry-content"><p>Body of {title}.</p></div></article></body></html>"#
        )
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("rx_ingest_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[test]
    fn pagination_takes_highest_number() {
        assert_eq!(last_page_number(&listing(&[1, 2, 14], &[])), 14);
        assert_eq!(last_page_number(&listing(&[], &[])), 1);
        assert_eq!(last_page_number("<p>no pagination</p>"), 1);
    }

    #[test]
    fn page_urls() {
        let root = Url::parse("https://site.test/blogs/").unwrap();
        assert_eq!(page_url(&root, 1).as_str(), "https://site.test/blogs/");
        assert_eq!(page_url(&root, 3).as_str(), "https://site.test/blogs/page/3/");
    }

    #[test]
    fn entry_links_resolve_relative_hrefs() {
        let page = Url::parse("https://site.test/blogs/page/2/").unwrap();
        let html = listing(&[], &["/blogs/first/", "https://site.test/blogs/second/", ""]);
        assert_eq!(
            entry_links(&html, &page),
            vec![
                "https://site.test/blogs/first/".to_string(),
                "https://site.test/blogs/second/".to_string(),
            ]
        );
    }

    #[test]
    fn scrape_article_fields() {
        let scraped = scrape_article(&load_fixture("source-article.html")).unwrap();
        assert_eq!(scraped.title, "How to Bake Bread");
        assert_eq!(scraped.author, "Dana Baker");
        assert_eq!(
            scraped.published_at,
            Some(
                DateTime::parse_from_rfc3339("2023-04-05T10:30:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            )
        );
        assert!(scraped.content.starts_with("<p>Baking bread at home is easier than it looks.</p>"));
        assert!(scraped.content.contains("<h2>Ingredients</h2>"));
        assert!(scraped.content.contains("<li>Yeast</li>"));
        assert!(scraped.content.contains("<blockquote>"));
        assert!(!scraped.content.contains("<p>   </p>"));

        let nested = "<html><body><h1>T</h1><div class=\"entry-content\">\
            <blockquote><p>Quoted.</p></blockquote></div></body></html>";
        let scraped = scrape_article(nested).unwrap();
        assert_eq!(scraped.content, "<blockquote><p>Quoted.</p></blockquote>");
    }

    #[test]
    fn scrape_article_defaults() {
        let html = "<html><body><h1>Plain</h1><article><p>Only text.</p></article></body></html>";
        let scraped = scrape_article(html).unwrap();
        assert_eq!(scraped.title, "Plain");
        assert_eq!(scraped.author, DEFAULT_AUTHOR);
        assert_eq!(scraped.published_at, None);
        assert_eq!(scraped.content, "<p>Only text.</p>");

        assert!(scrape_article("<html><body><p>No heading</p></body></html>").is_none());
        assert!(scrape_article("<html><body><h1>No body</h1></body></html>").is_none());
    }

    #[test]
    fn date_parsing() {
        assert!(parse_date("2023-04-05").is_some());
        assert!(parse_date("2023-04-05T10:30:00+02:00").is_some());
        assert!(parse_date("April 5, 2023").is_none());
    }

    #[tokio::test]
    async fn ingest_walks_pages_oldest_first_and_dedups() {
        let server = wiremock::MockServer::start().await;

        // Page 1 (root) holds the newest posts, page 3 the oldest.
        let pages = [
            ("/blogs/", listing(&[1, 2, 3], &["/blogs/p6/", "/blogs/p5/"])),
            ("/blogs/page/2/", listing(&[1, 2, 3], &["/blogs/p4/", "/blogs/p3/"])),
            ("/blogs/page/3/", listing(&[1, 2, 3], &["/blogs/p2/", "/blogs/p1/"])),
        ];
        for (path, body) in pages {
            wiremock::Mock::given(wiremock::matchers::method("GET"))
                .and(wiremock::matchers::path(path))
                .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }
        for n in 1..=6 {
            wiremock::Mock::given(wiremock::matchers::method("GET"))
                .and(wiremock::matchers::path(format!("/blogs/p{n}/")))
                .respond_with(
                    wiremock::ResponseTemplate::new(200)
                        .set_body_string(article_page(&format!("Post {n}"))),
                )
                .mount(&server)
                .await;
        }

        let storage = test_storage().await;
        let opts = IngestOptions {
            listing_url: Url::parse(&format!("{}/blogs/", server.uri())).unwrap(),
            max_articles: 5,
        };
        let fetcher = Arc::new(HttpFetcher::new().unwrap().allow_private_hosts());
        let scraper = IngestionScraper::new(fetcher, opts);

        let report = scraper.run(&storage).await.unwrap();
        assert_eq!(report.links_collected, 5);
        assert_eq!(report.created, 5);
        assert_eq!(report.duplicates, 0);
        assert!(report.failures.is_empty());

        let stored = storage
            .list_articles(ArticleFilter::by_source(ArticleSource::Origin))
            .await
            .unwrap();
        let titles: Vec<&str> = stored.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Post 2", "Post 1", "Post 4", "Post 3", "Post 6"]);
        assert_eq!(stored[0].author, "Dana");
        assert!(stored[0].published_at.is_some());

        // A second run finds every link already stored.
        let report = scraper.run(&storage).await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.duplicates, 5);
        let all = storage.list_articles(ArticleFilter::default()).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn broken_article_does_not_stop_the_run() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/blogs/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(listing(&[], &["/blogs/gone/", "/blogs/ok/"])),
            )
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/blogs/gone/"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/blogs/ok/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(article_page("Ok")))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let opts = IngestOptions {
            listing_url: Url::parse(&format!("{}/blogs", server.uri())).unwrap(),
            max_articles: 5,
        };
        let fetcher = Arc::new(HttpFetcher::new().unwrap().allow_private_hosts());
        let report = IngestionScraper::new(fetcher, opts)
            .run(&storage)
            .await
            .unwrap();

        assert_eq!(report.links_collected, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("/blogs/gone/"));
    }

    #[tokio::test]
    async fn unreachable_listing_aborts() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let opts = IngestOptions {
            listing_url: Url::parse(&format!("{}/blogs/", server.uri())).unwrap(),
            max_articles: 5,
        };
        let fetcher = Arc::new(HttpFetcher::new().unwrap().allow_private_hosts());
        let err = IngestionScraper::new(fetcher, opts)
            .run(&storage)
            .await
            .unwrap_err();
        assert!(matches!(err, RewritexError::Network(_)));
    }

    /// Serves canned pages by URL.
    struct PageMap(std::collections::HashMap<String, String>);

    #[async_trait::async_trait]
    impl PageFetcher for PageMap {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| RewritexError::Network(format!("{url}: 404")))
        }
    }

    /// A store that passes the lookup but loses the insert to a concurrent
    /// writer, as a unique-constraint clash would.
    #[derive(Default)]
    struct RacedStore {
        inserts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ArticleStore for RacedStore {
        async fn create(&self, article: NewArticle) -> Result<rewritex_shared::Article> {
            let source_url = article.source_url.unwrap_or_default();
            self.inserts.lock().unwrap().push(source_url.clone());
            Err(RewritexError::Duplicate { source_url })
        }

        async fn find_by_id(
            &self,
            _id: &rewritex_shared::ArticleId,
        ) -> Result<Option<rewritex_shared::Article>> {
            Ok(None)
        }

        async fn find_by_source_url(
            &self,
            _source_url: &str,
        ) -> Result<Option<rewritex_shared::Article>> {
            Ok(None)
        }

        async fn find(&self, _filter: ArticleFilter) -> Result<Vec<rewritex_shared::Article>> {
            Ok(Vec::new())
        }

        async fn find_derived(
            &self,
            _origin: &rewritex_shared::ArticleId,
        ) -> Result<Option<rewritex_shared::Article>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn insert_clash_counts_as_duplicate() {
        let root = "https://site.test/blogs/";
        let pages = std::collections::HashMap::from([
            (root.to_string(), listing(&[], &["/blogs/a/", "/blogs/b/"])),
            ("https://site.test/blogs/a/".to_string(), article_page("A")),
            ("https://site.test/blogs/b/".to_string(), article_page("B")),
        ]);
        let opts = IngestOptions {
            listing_url: Url::parse(root).unwrap(),
            max_articles: 5,
        };
        let store = RacedStore::default();

        let report = IngestionScraper::new(Arc::new(PageMap(pages)), opts)
            .run(&store)
            .await
            .unwrap();

        assert_eq!(report.links_collected, 2);
        assert_eq!(report.created, 0);
        assert_eq!(report.duplicates, 2);
        assert!(report.failures.is_empty());
        assert_eq!(
            *store.inserts.lock().unwrap(),
            vec![
                "https://site.test/blogs/a/".to_string(),
                "https://site.test/blogs/b/".to_string(),
            ]
        );
    }
}
