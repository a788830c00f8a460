//! Prompt construction and model invocation for article rewrites.

use std::sync::Arc;

use tracing::{info, instrument};

use rewritex_shared::{ExtractedContent, LlmConfig, Result, RewriteResult, RewritexError};

use crate::llm::{CompletionRequest, CompletionService};
use crate::repair::JsonRepair;

/// Number of references a rewrite requires.
pub const REQUIRED_REFERENCES: usize = 2;

const TRUNCATION_MARKER: &str = "\n\n[... content truncated for LLM context window ...]";

/// Fixed instruction sent as the system message.
pub const SYSTEM_PROMPT: &str = "\
You are an expert SEO content editor.
You will receive an original article and two reference articles.
The reference articles are high-quality examples: use them only as guides for structure and style, \
and make your rewrite better than the original by learning from them.
Rewrite the original to improve clarity, structure and SEO quality.
Never copy sentences from the references. Do not plagiarize.
Respond with exactly one JSON object. Do not wrap it in markdown code fences \
and do not add any commentary or explanation.";

/// Model selection for a rewrite.
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    pub model: String,
    pub temperature: f32,
    /// Character cap per reference text; `None` embeds references whole.
    pub max_reference_chars: Option<usize>,
}

impl RewriteOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_reference_chars: config.max_reference_chars,
        }
    }
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// Turns an original article plus two references into a structured rewrite.
pub struct Rewriter {
    llm: Arc<dyn CompletionService>,
    repair: JsonRepair,
    opts: RewriteOptions,
}

impl Rewriter {
    pub fn new(llm: Arc<dyn CompletionService>, opts: RewriteOptions) -> Self {
        Self {
            llm,
            repair: JsonRepair::new(),
            opts,
        }
    }

    /// Rewrite `original` using the first two usable `references`.
    ///
    /// Fails with `InvalidInput` before any model call when the original is
    /// blank or fewer than two references carry text. Unrecoverable model
    /// output is `MalformedOutput`.
    #[instrument(skip_all, fields(references = references.len()))]
    pub async fn rewrite(
        &self,
        original: &str,
        references: &[ExtractedContent],
    ) -> Result<RewriteResult> {
        if original.trim().is_empty() {
            return Err(RewritexError::invalid_input("original article text is empty"));
        }

        let usable: Vec<&ExtractedContent> = references
            .iter()
            .filter(|r| r.is_usable())
            .take(REQUIRED_REFERENCES)
            .collect();
        if usable.len() < REQUIRED_REFERENCES {
            return Err(RewritexError::invalid_input(format!(
                "a rewrite needs {REQUIRED_REFERENCES} usable references, got {}",
                usable.len()
            )));
        }

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_user_prompt(original, &usable, self.opts.max_reference_chars),
            model: self.opts.model.clone(),
            temperature: self.opts.temperature,
        };

        let raw = self.llm.complete(request).await?;
        let value = self.repair.recover(&raw)?;
        let result = RewriteResult::from_value(&value);

        info!(
            has_title = result.title.is_some(),
            has_content = result.content.is_some(),
            "rewrite received"
        );
        Ok(result)
    }
}

/// The user message: the original, each reference, then the task and output shape.
///
/// References are embedded as extracted unless `max_reference_chars` caps them.
pub fn build_user_prompt(
    original: &str,
    references: &[&ExtractedContent],
    max_reference_chars: Option<usize>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("ORIGINAL ARTICLE:\n");
    prompt.push_str(original.trim());
    prompt.push_str("\n\n");

    for (i, reference) in references.iter().enumerate() {
        prompt.push_str(&format!("REFERENCE ARTICLE {} ({}):\n", i + 1, reference.url));
        let text = reference.text.trim();
        match max_reference_chars {
            Some(max) => prompt.push_str(&truncate_content(text, max)),
            None => prompt.push_str(text),
        }
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "\
TASK:
- Improve structure and readability
- Use proper headings (h2, h3)
- Add bullet points where useful
- Expand explanations where helpful
- Preserve the original meaning
- Do NOT plagiarize the reference articles
- Keep the tone professional and informative
- Put the reference article URLs in the references array

OUTPUT FORMAT:
Return only a JSON object with this shape:
{
  \"title\": \"string\",
  \"content\": \"string (HTML)\",
  \"source\": \"ai\",
  \"references\": [\"string\"],
  \"author\": \"ai\"
}
Do NOT add any extra text. Do NOT wrap the object in markdown.
",
    );
    prompt
}

/// Truncate to at most `max_chars` characters, appending a marker when cut.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every request and answers with a canned completion.
    struct FakeLlm {
        calls: AtomicUsize,
        last: Mutex<Option<CompletionRequest>>,
        reply: String,
    }

    impl FakeLlm {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
                reply: reply.to_string(),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionService for FakeLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request);
            Ok(self.reply.clone())
        }
    }

    fn reference(url: &str, text: &str) -> ExtractedContent {
        ExtractedContent {
            url: url.into(),
            text: text.into(),
        }
    }

    fn two_refs() -> Vec<ExtractedContent> {
        vec![
            reference("https://a.example/blog/bread", "Reference one on kneading."),
            reference("https://b.example/post/oven", "Reference two on baking."),
        ]
    }

    const REPLY: &str = r#"```json
{"title":"Better Bread","content":"<h2>Knead</h2><p>Knead well.</p>","source":"ai","references":["https://a.example/blog/bread"],"author":"ai"}
```"#;

    #[tokio::test]
    async fn rewrite_sends_one_exchange_and_repairs_output() {
        let llm = FakeLlm::replying(REPLY);
        let rewriter = Rewriter::new(llm.clone(), RewriteOptions::default());

        let result = rewriter
            .rewrite("<p>Bread is flour and water.</p>", &two_refs())
            .await
            .unwrap();

        assert_eq!(result.title.as_deref(), Some("Better Bread"));
        assert_eq!(result.content.as_deref(), Some("<h2>Knead</h2><p>Knead well.</p>"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let request = llm.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.model, "gemini-2.5-flash");
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.system, SYSTEM_PROMPT);
        assert!(request.user.contains("Bread is flour and water."));
        assert!(request.user.contains("Reference one on kneading."));
        assert!(request.user.contains("Reference two on baking."));
    }

    #[tokio::test]
    async fn blank_original_makes_no_call() {
        let llm = FakeLlm::replying(REPLY);
        let rewriter = Rewriter::new(llm.clone(), RewriteOptions::default());

        let err = rewriter.rewrite("   ", &two_refs()).await.unwrap_err();
        assert!(matches!(err, RewritexError::InvalidInput { .. }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fewer_than_two_usable_references_makes_no_call() {
        let llm = FakeLlm::replying(REPLY);
        let rewriter = Rewriter::new(llm.clone(), RewriteOptions::default());

        let refs = vec![
            reference("https://a.example/blog/bread", "Reference one."),
            reference("https://b.example/post/oven", "  \n "),
        ];
        let err = rewriter.rewrite("Original.", &refs).await.unwrap_err();
        assert!(matches!(err, RewritexError::InvalidInput { .. }));

        let err = rewriter.rewrite("Original.", &[]).await.unwrap_err();
        assert!(matches!(err, RewritexError::InvalidInput { .. }));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn only_first_two_usable_references_are_prompted() {
        let llm = FakeLlm::replying(REPLY);
        let rewriter = Rewriter::new(llm.clone(), RewriteOptions::default());

        let refs = vec![
            reference("https://a.example/blog/1", ""),
            reference("https://b.example/blog/2", "Second reference text."),
            reference("https://c.example/blog/3", "Third reference text."),
            reference("https://d.example/blog/4", "Fourth reference text."),
        ];
        rewriter.rewrite("Original.", &refs).await.unwrap();

        let user = llm.last.lock().unwrap().clone().unwrap().user;
        assert!(user.contains("Second reference text."));
        assert!(user.contains("Third reference text."));
        assert!(!user.contains("Fourth reference text."));
        assert!(!user.contains("REFERENCE ARTICLE 3"));
    }

    #[tokio::test]
    async fn unrecoverable_output_is_malformed() {
        let llm = FakeLlm::replying("Sorry, I can't rewrite this article.");
        let rewriter = Rewriter::new(llm, RewriteOptions::default());

        let err = rewriter.rewrite("Original.", &two_refs()).await.unwrap_err();
        assert!(matches!(err, RewritexError::MalformedOutput { .. }));
    }

    #[test]
    fn user_prompt_layout() {
        let refs = two_refs();
        let usable: Vec<&ExtractedContent> = refs.iter().collect();
        let prompt = build_user_prompt("Original text.", &usable, None);

        let original_at = prompt.find("ORIGINAL ARTICLE:").unwrap();
        let first_at = prompt.find("REFERENCE ARTICLE 1 (https://a.example/blog/bread):").unwrap();
        let second_at = prompt.find("REFERENCE ARTICLE 2 (https://b.example/post/oven):").unwrap();
        let task_at = prompt.find("TASK:").unwrap();
        assert!(original_at < first_at && first_at < second_at && second_at < task_at);
        assert!(prompt.contains("\"author\": \"ai\""));
    }

    #[test]
    fn truncation_is_char_based() {
        assert_eq!(truncate_content("short", 10), "short");

        let long = "é".repeat(20);
        let cut = truncate_content(&long, 5);
        assert!(cut.starts_with("ééééé\n\n[..."));
        assert!(cut.ends_with("context window ...]"));
    }

    #[test]
    fn long_references_are_embedded_whole_by_default() {
        let long = "x".repeat(20_000);
        let refs = vec![
            reference("https://a.example/blog/1", &long),
            reference("https://b.example/blog/2", "Short reference."),
        ];
        let usable: Vec<&ExtractedContent> = refs.iter().collect();
        let prompt = build_user_prompt("Original.", &usable, None);
        assert!(prompt.contains(&long));
        assert!(!prompt.contains("content truncated"));
    }

    #[test]
    fn configured_cap_truncates_references() {
        let refs = vec![
            reference("https://a.example/blog/1", &"x".repeat(600)),
            reference("https://b.example/blog/2", "Short reference."),
        ];
        let usable: Vec<&ExtractedContent> = refs.iter().collect();
        let prompt = build_user_prompt("Original.", &usable, Some(500));
        assert!(prompt.contains("content truncated"));
        assert!(!prompt.contains(&"x".repeat(501)));
        assert!(prompt.contains("Short reference."));
    }

    #[tokio::test]
    async fn rewrite_sends_references_verbatim() {
        let llm = FakeLlm::replying(REPLY);
        let rewriter = Rewriter::new(llm.clone(), RewriteOptions::default());
        let long = "kneading ".repeat(3_000);
        let refs = vec![
            reference("https://a.example/blog/bread", &long),
            reference("https://b.example/post/oven", "Reference two on baking."),
        ];
        rewriter.rewrite("Original.", &refs).await.unwrap();

        let user = llm.last.lock().unwrap().clone().unwrap().user;
        assert!(user.contains(long.trim()));
    }
}
