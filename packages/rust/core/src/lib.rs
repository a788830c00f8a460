//! Rewrite pipeline orchestration and model integration for Rewritex.
//!
//! This crate ties reference discovery, page extraction, the model rewrite
//! and derived article assembly into the batch job run by `rewritex rewrite`.

pub mod assembler;
pub mod llm;
pub mod pipeline;
pub mod repair;
pub mod rewriter;

pub use assembler::{DERIVED_AUTHOR, append_references, assemble};
pub use llm::{ChatClient, CompletionRequest, CompletionService, LlmOptions};
pub use pipeline::{
    ArticleState, BatchReport, ItemOutcome, ItemReport, ProgressReporter, RerunPolicy,
    RewritePipeline, SilentProgress, SkipReason,
};
pub use repair::{BraceSlice, DirectParse, JsonRepair, RecoveryStrategy, StripFences};
pub use rewriter::{RewriteOptions, Rewriter, SYSTEM_PROMPT, build_user_prompt};
