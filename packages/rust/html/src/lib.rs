//! HTML helpers shared by the storage layer, the pipeline, and the CLI.
//!
//! - [`sanitize`]: allow-list cleaning for every article body written to storage
//! - [`to_markdown`]: terminal-friendly rendering of stored article HTML
//! - [`escape`]: text/attribute escaping for HTML we assemble ourselves

mod sanitize;

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use rewritex_shared::{Result, RewritexError};

pub use sanitize::{ALLOWED_TAGS, has_text, sanitize};

/// Render article HTML as Markdown.
pub fn to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript", "svg"])
        .build();

    let markdown = converter
        .convert(html)
        .map_err(|e| RewritexError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(html_len = html.len(), md_len = markdown.len(), "rendered markdown");
    Ok(clean_blank_lines(markdown.trim()))
}

/// Collapse runs of 3+ blank lines into a single blank line.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

/// Escape text for use in HTML content or a double-quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_renders_headings_and_lists() {
        let html = "<h2>Proofing</h2><p>Let it rise.</p><ul><li>Warm spot</li></ul>";
        let md = to_markdown(html).unwrap();
        assert!(md.contains("## Proofing"));
        assert!(md.contains("Let it rise."));
        assert!(md.contains("Warm spot"));
        assert!(!md.contains("<p>"));
    }

    #[test]
    fn markdown_has_no_blank_runs() {
        let md = to_markdown("<p>a</p>\n\n\n\n<p>b</p>").unwrap();
        assert!(!md.contains("\n\n\n"));
    }

    #[test]
    fn escape_handles_attribute_breakers() {
        assert_eq!(
            escape(r#"https://a.com/?q="x"&y=<z>"#),
            "https://a.com/?q=&quot;x&quot;&amp;y=&lt;z&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }
}
