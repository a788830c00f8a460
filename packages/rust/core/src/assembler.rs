//! Derived article assembly.
//!
//! Takes a model rewrite and the links discovered for its origin, appends the
//! references trailer, and produces the payload persisted as the derived
//! article.

use tracing::debug;

use rewritex_html::escape;
use rewritex_shared::{Article, ArticleSource, NewArticle, Result, RewriteResult, RewritexError};

/// Author recorded on derived articles when the rewrite names none.
pub const DERIVED_AUTHOR: &str = "ai";

/// Append the references trailer to rewritten HTML.
///
/// The trailer lists `links` in order, each as an escaped anchor.
pub fn append_references(content: &str, links: &[String]) -> String {
    let items: String = links
        .iter()
        .map(|link| {
            let link = escape(link);
            format!("<li><a href=\"{link}\">{link}</a></li>")
        })
        .collect();

    format!(
        "{}\n<hr />\n<h3>References</h3>\n<ul>{items}</ul>\n",
        content.trim_end()
    )
}

/// Build the derived article for `origin` from a rewrite.
///
/// `links` are the reference links discovered for the origin, whether or not
/// their pages extracted. A rewrite without content is a validation error.
pub fn assemble(origin: &Article, rewrite: &RewriteResult, links: &[String]) -> Result<NewArticle> {
    let content = non_blank(rewrite.content.as_deref()).ok_or_else(|| {
        RewritexError::validation(format!("rewrite of {} returned no content", origin.id))
    })?;

    let title = non_blank(rewrite.title.as_deref()).unwrap_or(&origin.title);
    let author = non_blank(rewrite.author.as_deref()).unwrap_or(DERIVED_AUTHOR);

    debug!(origin = %origin.id, references = links.len(), "assembling derived article");

    let mut article = NewArticle::new(
        title,
        append_references(content, links),
        ArticleSource::Derived,
    );
    article.author = Some(author.to_string());
    article.original_article_id = Some(origin.id);
    article.references = links.to_vec();
    Ok(article)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
