//! Rule-based filtering and ranking of search result links.
//!
//! Links pass through, in order: PDF rejection, domain blacklist, article
//! shape check. Survivors are scored by blog-indicative keywords and sorted
//! with a stable sort, so equal scores keep their search order.

use rewritex_shared::ReferenceCandidate;
use url::Url;

/// Number of references handed to the rewriter.
pub const MAX_REFERENCES: usize = 2;

/// Hosts that are JS-heavy, documentation, social, or the source site itself.
pub const DOMAIN_BLACKLIST: &[&str] = &[
    "nodejs.org",
    "medium.com",
    "dev.to",
    "github.com",
    "stackoverflow.com",
    "npmjs.com",
    "youtube.com",
    "reddit.com",
    "twitter.com",
    "linkedin.com",
    "beyondchats.com",
    "fabcomlive.com",
];

/// URL fragments that suggest static blog content.
pub const SCORE_KEYWORDS: &[&str] = &["blog", "marketing", "insights", "resources", "articles"];

/// Path fragments that mark an article page.
const ARTICLE_MARKERS: &[&str] = &["/blog", "/article", "/post"];

pub fn is_pdf(link: &str) -> bool {
    link.to_ascii_lowercase().ends_with(".pdf")
}

/// Whether the link's host is (a subdomain of) a blacklisted domain.
///
/// Links without a parseable host are treated as blacklisted.
pub fn is_blacklisted(link: &str) -> bool {
    let Some(host) = Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return true;
    };

    DOMAIN_BLACKLIST.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Whether the link points at an article rather than a home or listing page.
pub fn looks_like_article(link: &str) -> bool {
    let lower = link.to_ascii_lowercase();
    ARTICLE_MARKERS.iter().any(|m| lower.contains(m)) || link.split('/').count() > 4
}

/// 1 when the link contains a blog-indicative keyword, else 0.
pub fn score(link: &str) -> u8 {
    let lower = link.to_ascii_lowercase();
    u8::from(SCORE_KEYWORDS.iter().any(|kw| lower.contains(kw)))
}

/// Apply every filter and return the survivors, best first.
///
/// `Vec::sort_by` is stable, so candidates with equal scores keep the order
/// the search service returned them in.
pub fn rank_candidates<I, S>(links: I) -> Vec<ReferenceCandidate>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut candidates: Vec<ReferenceCandidate> = links
        .into_iter()
        .flatten()
        .map(|l| l.as_ref().trim().to_string())
        .filter(|l| !l.is_empty())
        .filter(|l| !is_pdf(l))
        .filter(|l| !is_blacklisted(l))
        .filter(|l| looks_like_article(l))
        .map(|url| ReferenceCandidate {
            score: score(&url),
            url,
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

/// The top [`MAX_REFERENCES`] links after ranking.
pub fn select_references<I, S>(links: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    rank_candidates(links)
        .into_iter()
        .take(MAX_REFERENCES)
        .map(|c| c.url)
        .collect()
}
