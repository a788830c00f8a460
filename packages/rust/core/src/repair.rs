//! Recovery of a JSON object from free-form model output.
//!
//! Models asked for "JSON only" still wrap answers in markdown fences or add
//! a sentence of commentary. [`JsonRepair`] runs an ordered list of
//! [`RecoveryStrategy`]s and returns the first JSON **object** any of them
//! produces. Only when every strategy fails is
//! [`RewritexError::MalformedOutput`] raised.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, error};

use rewritex_shared::{Result, RewritexError};

/// Matches opening and closing markdown code fences (with optional language tag).
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("fence regex"));

/// One way of turning raw model output into a JSON object.
pub trait RecoveryStrategy: Send + Sync {
    fn recover(&self, raw: &str) -> Option<Value>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

/// The text is already a JSON object.
pub struct DirectParse;

impl RecoveryStrategy for DirectParse {
    fn recover(&self, raw: &str) -> Option<Value> {
        parse_object(raw.trim())
    }

    fn name(&self) -> &str {
        "direct"
    }
}

/// The object is wrapped in markdown code fences.
pub struct StripFences;

impl RecoveryStrategy for StripFences {
    fn recover(&self, raw: &str) -> Option<Value> {
        parse_object(strip_fences(raw).trim())
    }

    fn name(&self) -> &str {
        "strip_fences"
    }
}

/// The object is surrounded by other text: slice from the first `{` to the
/// last `}` after removing fences.
pub struct BraceSlice;

impl RecoveryStrategy for BraceSlice {
    fn recover(&self, raw: &str) -> Option<Value> {
        let text = strip_fences(raw);
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        parse_object(&text[start..=end])
    }

    fn name(&self) -> &str {
        "brace_slice"
    }
}

/// Remove every markdown fence marker. A no-op when there are none.
pub fn strip_fences(raw: &str) -> String {
    FENCE_RE.replace_all(raw, "").into_owned()
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

/// Ordered chain of recovery strategies.
pub struct JsonRepair {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl JsonRepair {
    /// Direct parse, then fence stripping, then brace slicing.
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(DirectParse),
                Box::new(StripFences),
                Box::new(BraceSlice),
            ],
        }
    }

    /// Recover a JSON object from `raw`.
    ///
    /// Logs the raw text and returns `MalformedOutput` when no strategy succeeds.
    pub fn recover(&self, raw: &str) -> Result<Value> {
        for strategy in &self.strategies {
            if let Some(value) = strategy.recover(raw) {
                debug!(strategy = strategy.name(), "model output recovered");
                return Ok(value);
            }
        }

        error!(raw = %raw, "model output is not a recoverable JSON object");
        Err(RewritexError::MalformedOutput {
            raw: raw.to_string(),
        })
    }
}

impl Default for JsonRepair {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expected() -> Value {
        json!({
            "title": "Better Bread",
            "content": "<h2>Flour</h2><p>Use {strong} flour.</p>",
            "source": "ai",
            "references": ["https://a.example/blog/x"],
            "author": "ai"
        })
    }

    #[test]
    fn valid_json_is_unchanged() {
        let raw = expected().to_string();
        let repair = JsonRepair::new();
        let once = repair.recover(&raw).unwrap();
        assert_eq!(once, expected());
        let twice = repair.recover(&once.to_string()).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn fenced_json_recovers_same_structure() {
        let raw = format!("```json\n{}\n```", expected());
        assert_eq!(JsonRepair::new().recover(&raw).unwrap(), expected());

        let bare_fence = format!("```\n{}\n```\n", expected());
        assert_eq!(JsonRepair::new().recover(&bare_fence).unwrap(), expected());
    }

    #[test]
    fn commentary_around_object_is_sliced_away() {
        let raw = format!("Here is the rewrite:\n```json\n{}\n```\nHope this helps!", expected());
        assert_eq!(JsonRepair::new().recover(&raw).unwrap(), expected());
    }

    #[test]
    fn strategies_individually() {
        let raw = format!("```json\n{}\n```", expected());
        assert!(DirectParse.recover(&raw).is_none());
        assert!(StripFences.recover(&raw).is_some());
        assert!(BraceSlice.recover("noise { \"a\": 1 } noise").is_some());
        assert!(BraceSlice.recover("} backwards {").is_none());
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(DirectParse.recover("[1, 2, 3]").is_none());
        assert!(DirectParse.recover("\"just a string\"").is_none());
    }

    #[test]
    fn unrecoverable_output_is_malformed() {
        for raw in ["I cannot help with that.", "{ not: json }", ""] {
            let err = JsonRepair::new().recover(raw).unwrap_err();
            match err {
                RewritexError::MalformedOutput { raw: kept } => assert_eq!(kept, raw),
                other => panic!("expected MalformedOutput, got {other:?}"),
            }
        }
    }

    #[test]
    fn fence_stripping_is_noop_without_fences() {
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
    }
}
