//! Reference discovery: find external articles to guide a rewrite.
//!
//! Given an article title, Rewritex queries a SerpApi-compatible search
//! service for `"<title> blog article"`, then keeps at most two links that
//! look like static, scrapable blog posts (see [`filter`]). Discovery never
//! fails: a search error is logged and yields no references, which the
//! pipeline turns into a skip.

pub mod filter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use rewritex_shared::{Result, RewritexError, SearchConfig, resolve_api_key};

pub use filter::{MAX_REFERENCES, rank_candidates, select_references};

/// Maximum number of redirects to follow when querying the search API.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("Rewritex/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Search service contract
// ---------------------------------------------------------------------------

/// One organic search result. Only the link is consumed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub link: Option<String>,
}

/// An external web search capability.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Run `query` and return up to `result_count` organic results, in rank order.
    async fn search(&self, query: &str, result_count: u32) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// SerpApi client
// ---------------------------------------------------------------------------

/// Settings for [`SerpApiClient`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub endpoint: String,
    pub engine: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl SearchOptions {
    /// Build options from the `[search]` config section, resolving the API key
    /// from the configured environment variable.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint.clone(),
            engine: config.engine.clone(),
            api_key: resolve_api_key(&config.api_key_env)?,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

/// [`SearchService`] backed by the SerpApi `GET /search` endpoint.
pub struct SerpApiClient {
    client: Client,
    opts: SearchOptions,
}

impl SerpApiClient {
    pub fn new(opts: SearchOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(opts.timeout_secs)?,
            opts,
        })
    }
}

#[async_trait]
impl SearchService for SerpApiClient {
    async fn search(&self, query: &str, result_count: u32) -> Result<Vec<SearchHit>> {
        let num = result_count.to_string();
        let response = self
            .client
            .get(&self.opts.endpoint)
            .query(&[
                ("q", query),
                ("engine", self.opts.engine.as_str()),
                ("api_key", self.opts.api_key.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RewritexError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RewritexError::Network(format!("search API: HTTP {status}")));
        }

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|e| RewritexError::parse(format!("search API response: {e}")))?;

        if let Some(error) = body.error {
            return Err(RewritexError::Network(format!("search API: {error}")));
        }

        debug!(results = body.organic_results.len(), "search completed");
        Ok(body.organic_results)
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RewritexError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Search query sent for an article title.
pub fn build_query(title: &str) -> String {
    format!("{} blog article", title.trim())
}

/// Finds reference links for article titles.
#[derive(Clone)]
pub struct ReferenceDiscovery {
    service: Arc<dyn SearchService>,
    result_count: u32,
}

impl ReferenceDiscovery {
    pub fn new(service: Arc<dyn SearchService>, result_count: u32) -> Self {
        Self {
            service,
            result_count,
        }
    }

    /// Return at most [`MAX_REFERENCES`] filtered reference links for `title`.
    ///
    /// Never fails. A blank title or a search error yields an empty list.
    #[instrument(skip_all, fields(title = %title))]
    pub async fn discover(&self, title: &str) -> Vec<String> {
        if title.trim().is_empty() {
            debug!("blank title, skipping search");
            return Vec::new();
        }

        let hits = match self
            .service
            .search(&build_query(title), self.result_count)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "reference search failed");
                return Vec::new();
            }
        };

        let total = hits.len();
        let selected = select_references(hits.into_iter().map(|h| h.link));
        info!(total, selected = selected.len(), "references discovered");
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSearch {
        links: Vec<Option<&'static str>>,
        calls: AtomicUsize,
    }

    impl FixedSearch {
        fn new(links: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                links,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchService for FixedSearch {
        async fn search(&self, _query: &str, _result_count: u32) -> Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .links
                .iter()
                .map(|l| SearchHit {
                    link: l.map(str::to_string),
                })
                .collect())
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl SearchService for FailingSearch {
        async fn search(&self, _query: &str, _result_count: u32) -> Result<Vec<SearchHit>> {
            Err(RewritexError::Network("connection reset".into()))
        }
    }

    fn opts(endpoint: String) -> SearchOptions {
        SearchOptions {
            endpoint,
            engine: "google".into(),
            api_key: "test-key".into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn query_template() {
        assert_eq!(build_query(" How to Bake Bread "), "How to Bake Bread blog article");
    }

    #[tokio::test]
    async fn discover_keeps_score_order_with_stable_ties() {
        // Scores [1, 0, 1] select candidates 0 and 2.
        let search = FixedSearch::new(vec![
            Some("https://bakery.example/blog/bread-basics"),
            Some("https://flour.example/recipes/sourdough"),
            Some("https://ovens.example/insights/crust"),
        ]);
        let discovery = ReferenceDiscovery::new(search.clone(), 10);

        let links = discovery.discover("How to Bake Bread").await;
        assert_eq!(
            links,
            vec![
                "https://bakery.example/blog/bread-basics".to_string(),
                "https://ovens.example/insights/crust".to_string(),
            ]
        );
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_title_skips_search() {
        let search = FixedSearch::new(vec![Some("https://a.example/blog/x")]);
        let discovery = ReferenceDiscovery::new(search.clone(), 10);
        assert!(discovery.discover("   ").await.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_failure_yields_empty_list() {
        let discovery = ReferenceDiscovery::new(Arc::new(FailingSearch), 10);
        assert!(discovery.discover("How to Bake Bread").await.is_empty());
    }

    #[tokio::test]
    async fn serpapi_client_with_mock_server() {
        let server = wiremock::MockServer::start().await;

        let body = serde_json::json!({
            "organic_results": [
                { "link": "https://bakery.example/blog/bread-basics", "title": "Bread" },
                { "title": "no link" },
                { "link": "https://www.youtube.com/watch?v=abc" }
            ]
        });

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/search"))
            .and(wiremock::matchers::query_param("q", "How to Bake Bread blog article"))
            .and(wiremock::matchers::query_param("engine", "google"))
            .and(wiremock::matchers::query_param("api_key", "test-key"))
            .and(wiremock::matchers::query_param("num", "10"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = SerpApiClient::new(opts(format!("{}/search", server.uri()))).unwrap();
        let hits = client
            .search("How to Bake Bread blog article", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[1].link.is_none());

        let discovery = ReferenceDiscovery::new(Arc::new(client), 10);
        assert_eq!(
            discovery.discover("How to Bake Bread").await,
            vec!["https://bakery.example/blog/bread-basics".to_string()]
        );
    }

    #[tokio::test]
    async fn serpapi_error_status_is_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/search"))
            .respond_with(wiremock::ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SerpApiClient::new(opts(format!("{}/search", server.uri()))).unwrap();
        let err = client.search("anything", 10).await.unwrap_err();
        assert!(matches!(err, RewritexError::Network(_)));
    }

    #[tokio::test]
    async fn serpapi_error_body_is_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/search"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "error": "Invalid API key." })),
            )
            .mount(&server)
            .await;

        let client = SerpApiClient::new(opts(format!("{}/search", server.uri()))).unwrap();
        let err = client.search("anything", 10).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }
}
