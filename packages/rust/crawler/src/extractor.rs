//! Reference page text extraction.
//!
//! Pages are de-chromed (scripts, navigation, headers, footers, frames), then a
//! single content container is chosen by the first matching strategy in a
//! [`ContainerRegistry`]. Text blocks inside it are trimmed and filtered for
//! boilerplate; anything under [`MIN_CONTENT_CHARS`] counts as a failed
//! extraction.

use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

use rewritex_shared::ExtractedContent;

use crate::fetch::PageFetcher;

/// Shortest joined text accepted as a successful extraction.
pub const MIN_CONTENT_CHARS: usize = 200;

/// Blocks of this many characters or fewer are dropped.
const MIN_BLOCK_CHARS: usize = 40;

/// Blocks mentioning any of these (case-insensitively) are dropped.
const BOILERPLATE_MARKERS: &[&str] = &["cookie", "subscribe"];

const CHROME_ELEMENTS: &str = "script, style, nav, footer, header, iframe";

const TEXT_ELEMENTS: &str = "p, h1, h2, h3, h4, ul, ol, li";

// ---------------------------------------------------------------------------
// Container strategies
// ---------------------------------------------------------------------------

/// One way of locating the main content container of a page.
///
/// Strategies are tried in priority order; [`BodyStrategy`] is the always-last
/// fallback.
pub trait ContainerStrategy: Send + Sync {
    /// The container this strategy finds in `doc`, if any.
    fn locate<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

/// Picks the first element matching a CSS selector.
pub struct SelectorStrategy {
    css: &'static str,
}

impl SelectorStrategy {
    pub const fn new(css: &'static str) -> Self {
        Self { css }
    }
}

impl ContainerStrategy for SelectorStrategy {
    fn locate<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        let sel = Selector::parse(self.css).ok()?;
        doc.select(&sel).next()
    }

    fn name(&self) -> &str {
        self.css
    }
}

/// The whole `<body>`, or the document root when there is none.
pub struct BodyStrategy;

impl ContainerStrategy for BodyStrategy {
    fn locate<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| doc.select(&sel).next());
        Some(body.unwrap_or_else(|| doc.root_element()))
    }

    fn name(&self) -> &str {
        "body"
    }
}

/// Holds container strategies in priority order.
pub struct ContainerRegistry {
    strategies: Vec<Box<dyn ContainerStrategy>>,
}

impl ContainerRegistry {
    /// `article`, `main`, `.post-content`, `.article-content`, `.content`, then body.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(SelectorStrategy::new("article")),
                Box::new(SelectorStrategy::new("main")),
                Box::new(SelectorStrategy::new(".post-content")),
                Box::new(SelectorStrategy::new(".article-content")),
                Box::new(SelectorStrategy::new(".content")),
                Box::new(BodyStrategy),
            ],
        }
    }

    /// Find the content container and the name of the strategy that chose it.
    pub fn locate<'a>(&self, doc: &'a Html) -> (&str, ElementRef<'a>) {
        for strategy in &self.strategies {
            if let Some(container) = strategy.locate(doc) {
                return (strategy.name(), container);
            }
        }
        ("root", doc.root_element())
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Fetches reference pages and pulls their readable text.
pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    registry: ContainerRegistry,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            registry: ContainerRegistry::new(),
        }
    }

    /// Fetch `url` and extract its text.
    ///
    /// Never fails: fetch errors and thin pages yield empty content.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract(&self, url: &str) -> ExtractedContent {
        let html = match self.fetcher.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "reference fetch failed");
                return ExtractedContent::empty(url);
            }
        };

        let text = self.extract_text(&html);
        if text.is_empty() {
            info!("reference too thin, treating as failed extraction");
        } else {
            info!(chars = text.chars().count(), "reference extracted");
        }

        ExtractedContent {
            url: url.to_string(),
            text,
        }
    }

    /// Extract de-boilerplated text from raw HTML.
    ///
    /// Returns an empty string unless the result has at least
    /// [`MIN_CONTENT_CHARS`] characters.
    pub fn extract_text(&self, html: &str) -> String {
        let mut doc = Html::parse_document(html);
        strip_chrome(&mut doc);

        let (strategy, container) = self.registry.locate(&doc);
        debug!(strategy, "content container selected");

        let Ok(text_sel) = Selector::parse(TEXT_ELEMENTS) else {
            return String::new();
        };

        let text = container
            .select(&text_sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|block| is_content_block(block))
            .collect::<Vec<_>>()
            .join("\n\n");

        if text.chars().count() < MIN_CONTENT_CHARS {
            return String::new();
        }
        text
    }
}

fn is_content_block(block: &str) -> bool {
    if block.chars().count() <= MIN_BLOCK_CHARS {
        return false;
    }
    let lower = block.to_lowercase();
    !BOILERPLATE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Detach chrome elements from the tree before container selection.
fn strip_chrome(doc: &mut Html) {
    let Ok(sel) = Selector::parse(CHROME_ELEMENTS) else {
        return;
    };
    let ids: Vec<_> = doc.select(&sel).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}
