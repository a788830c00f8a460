//! Allow-list HTML sanitizer applied at the persistence boundary.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ammonia::Builder;

/// Tags that survive sanitization.
pub const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "p", "ul", "ol", "li", "strong", "em", "b", "i", "a", "blockquote",
    "code", "pre", "hr",
];

/// Relationship forced onto every link.
const LINK_REL: &str = "noopener noreferrer";

static SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect::<HashSet<_>>())
        .tag_attributes(HashMap::from([("a", HashSet::from(["href"]))]))
        .generic_attributes(HashSet::new())
        .link_rel(Some(LINK_REL))
        .set_tag_attribute_value("a", "target", "_blank");
    builder
});

/// Clean untrusted HTML down to the allow-list.
///
/// Disallowed elements are unwrapped (their text survives) except for
/// script-like content, which is dropped entirely. Links keep only `href`
/// and gain `rel="noopener noreferrer"` and `target="_blank"`.
pub fn sanitize(html: &str) -> String {
    SANITIZER.clean(html).to_string()
}

/// Entity spellings of the no-break space, which renders as blank.
const BLANK_ENTITIES: &[&str] = &["&nbsp;", "&#160;", "&#xa0;"];

/// Whether sanitized HTML still carries any visible text.
///
/// Whitespace, including encoded no-break spaces, does not count.
pub fn has_text(html: &str) -> bool {
    let mut in_tag = false;
    let mut rest = html;
    while let Some(c) = rest.chars().next() {
        if !in_tag && c == '&' {
            if let Some(entity) = BLANK_ENTITIES
                .iter()
                .find(|e| rest.get(..e.len()).is_some_and(|s| s.eq_ignore_ascii_case(e)))
            {
                rest = &rest[entity.len()..];
                continue;
            }
        }
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag && !c.is_whitespace() => return true,
            _ => {}
        }
        rest = &rest[c.len_utf8()..];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_allowed_structure() {
        let html = "<h2>Title</h2><p>Some <strong>bold</strong> text</p><ul><li>one</li></ul>";
        assert_eq!(sanitize(html), html);
    }

    #[test]
    fn strips_scripts_and_unknown_tags() {
        let html = r#"<div class="x"><p onclick="evil()">Hi</p><script>alert(1)</script></div>"#;
        let cleaned = sanitize(html);
        assert_eq!(cleaned, "<p>Hi</p>");
    }

    #[test]
    fn hardens_links() {
        let cleaned = sanitize(r#"<a href="https://a.com/blog/x" rel="opener" style="c">A</a>"#);
        assert!(cleaned.contains(r#"href="https://a.com/blog/x""#));
        assert!(cleaned.contains(r#"rel="noopener noreferrer""#));
        assert!(cleaned.contains(r#"target="_blank""#));
        assert!(!cleaned.contains("style"));
        assert_eq!(cleaned.matches("rel=").count(), 1);
    }

    #[test]
    fn keeps_reference_trailer_divider() {
        let cleaned = sanitize("<p>Body</p><hr /><h3>References</h3>");
        assert!(cleaned.contains("<hr>"));
        assert!(cleaned.contains("<h3>References</h3>"));
    }

    #[test]
    fn text_detection() {
        assert!(has_text("<p>x</p>"));
        assert!(!has_text("<p> </p><hr>"));
        assert!(!has_text(""));
    }

    #[test]
    fn no_break_spaces_are_not_text() {
        for html in ["<p>&nbsp;</p>", "<p>&#160; &NBSP;</p>", "<p>&#xA0;</p>", "<p>\u{a0}</p>"] {
            assert!(!has_text(html), "{html}");
            assert!(!has_text(&sanitize(html)), "{html}");
        }
        assert!(has_text("<p>&nbsp;x</p>"));
        assert!(has_text("<p>&amp;</p>"));
    }
}
