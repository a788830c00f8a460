//! Batch rewrite pipeline: origin article → discovery → extraction → rewrite →
//! assembly → derived article.
//!
//! Each origin article is an isolated item. A skip or failure is recorded in
//! the [`BatchReport`] and the batch moves on; only failing to read the batch
//! snapshot aborts a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use rewritex_crawler::ContentExtractor;
use rewritex_discovery::{MAX_REFERENCES, ReferenceDiscovery};
use rewritex_shared::{
    Article, ArticleFilter, ArticleId, ArticleSource, ArticleStore, ExtractedContent, Result,
    RewritexError,
};

use crate::assembler;
use crate::rewriter::Rewriter;

/// Where an item is in its journey through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleState {
    Pending,
    DiscoveringReferences,
    Extracting,
    Rewriting,
    Assembling,
    Persisting,
    Done,
}

impl std::fmt::Display for ArticleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::DiscoveringReferences => "discovering references",
            Self::Extracting => "extracting",
            Self::Rewriting => "rewriting",
            Self::Assembling => "assembling",
            Self::Persisting => "persisting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why an origin article was left without a new derived article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Discovery found fewer than two reference links.
    InsufficientReferences { found: usize },
    /// Fewer than two reference pages yielded text.
    InsufficientExtractions { extracted: usize },
    /// A derived article already exists and the policy does not re-rewrite.
    AlreadyRewritten { derived_id: ArticleId },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientReferences { found } => {
                write!(f, "only {found} reference link(s) found")
            }
            Self::InsufficientExtractions { extracted } => {
                write!(f, "only {extracted} reference page(s) extracted")
            }
            Self::AlreadyRewritten { derived_id } => {
                write!(f, "already rewritten as {derived_id}")
            }
        }
    }
}

/// Result of processing one origin article.
#[derive(Debug)]
pub enum ItemOutcome {
    Rewritten { derived_id: ArticleId },
    Skipped(SkipReason),
    Failed {
        stage: ArticleState,
        error: RewritexError,
    },
}

/// One origin article and what happened to it.
#[derive(Debug)]
pub struct ItemReport {
    pub origin_id: ArticleId,
    pub title: String,
    pub outcome: ItemOutcome,
}

/// Result of a whole batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per origin article, in processing order.
    pub items: Vec<ItemReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn rewritten(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Rewritten { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }
}

/// What to do with origin articles that already have a derived article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RerunPolicy {
    /// Skip them with [`SkipReason::AlreadyRewritten`].
    #[default]
    SkipRewritten,
    /// Rewrite them again, adding another derived article.
    Always,
}

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called once the origin snapshot is taken.
    fn batch_started(&self, total: usize);
    /// Called when an item enters a new stage.
    fn stage(&self, title: &str, current: usize, total: usize, state: ArticleState);
    /// Called when an item reaches a terminal outcome.
    fn item_finished(&self, item: &ItemReport);
    /// Called when the batch completes.
    fn done(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn batch_started(&self, _total: usize) {}
    fn stage(&self, _title: &str, _current: usize, _total: usize, _state: ArticleState) {}
    fn item_finished(&self, _item: &ItemReport) {}
    fn done(&self, _report: &BatchReport) {}
}

/// The rewrite batch job with its injected collaborators.
pub struct RewritePipeline {
    discovery: ReferenceDiscovery,
    extractor: ContentExtractor,
    rewriter: Rewriter,
    store: Arc<dyn ArticleStore>,
    policy: RerunPolicy,
}

/// Position of an item within the batch, for progress reporting.
struct Slot<'a> {
    title: &'a str,
    current: usize,
    total: usize,
}

impl RewritePipeline {
    pub fn new(
        discovery: ReferenceDiscovery,
        extractor: ContentExtractor,
        rewriter: Rewriter,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            discovery,
            extractor,
            rewriter,
            store,
            policy: RerunPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RerunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Rewrite every origin article in the store.
    ///
    /// The batch is the snapshot of origin articles (oldest first) taken at
    /// the start. Articles are processed one at a time and every one of them
    /// gets an entry in the report.
    #[instrument(skip_all, fields(policy = ?self.policy))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<BatchReport> {
        let start = Instant::now();
        let origins = self
            .store
            .find(ArticleFilter::by_source(ArticleSource::Origin))
            .await?;

        let total = origins.len();
        info!(total, "starting rewrite batch");
        progress.batch_started(total);

        let mut report = BatchReport::default();
        for (i, origin) in origins.iter().enumerate() {
            let slot = Slot {
                title: &origin.title,
                current: i + 1,
                total,
            };
            let outcome = self.process(origin, &slot, progress).await;
            log_outcome(origin, &outcome);

            let item = ItemReport {
                origin_id: origin.id,
                title: origin.title.clone(),
                outcome,
            };
            progress.item_finished(&item);
            report.items.push(item);
        }

        report.elapsed = start.elapsed();
        info!(
            rewritten = report.rewritten(),
            skipped = report.skipped(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis(),
            "rewrite batch complete"
        );
        progress.done(&report);
        Ok(report)
    }

    #[instrument(skip_all, fields(origin = %origin.id))]
    async fn process(
        &self,
        origin: &Article,
        slot: &Slot<'_>,
        progress: &dyn ProgressReporter,
    ) -> ItemOutcome {
        let enter = |state: ArticleState| {
            debug!(%state, "stage");
            progress.stage(slot.title, slot.current, slot.total, state);
        };

        enter(ArticleState::Pending);
        if self.policy == RerunPolicy::SkipRewritten {
            match self.store.find_derived(&origin.id).await {
                Ok(Some(derived)) => {
                    return ItemOutcome::Skipped(SkipReason::AlreadyRewritten {
                        derived_id: derived.id,
                    });
                }
                Ok(None) => {}
                Err(error) => {
                    return ItemOutcome::Failed {
                        stage: ArticleState::Pending,
                        error,
                    };
                }
            }
        }

        enter(ArticleState::DiscoveringReferences);
        let links = self.discovery.discover(&origin.title).await;
        if links.len() < MAX_REFERENCES {
            return ItemOutcome::Skipped(SkipReason::InsufficientReferences {
                found: links.len(),
            });
        }

        enter(ArticleState::Extracting);
        let mut extracted: Vec<ExtractedContent> = Vec::with_capacity(links.len());
        for link in &links {
            extracted.push(self.extractor.extract(link).await);
        }
        let usable = extracted.iter().filter(|e| e.is_usable()).count();
        if usable < MAX_REFERENCES {
            return ItemOutcome::Skipped(SkipReason::InsufficientExtractions { extracted: usable });
        }

        enter(ArticleState::Rewriting);
        let rewrite = match self.rewriter.rewrite(&origin.content, &extracted).await {
            Ok(rewrite) => rewrite,
            Err(error) => {
                return ItemOutcome::Failed {
                    stage: ArticleState::Rewriting,
                    error,
                };
            }
        };

        enter(ArticleState::Assembling);
        let derived = match assembler::assemble(origin, &rewrite, &links) {
            Ok(derived) => derived,
            Err(error) => {
                return ItemOutcome::Failed {
                    stage: ArticleState::Assembling,
                    error,
                };
            }
        };

        enter(ArticleState::Persisting);
        match self.store.create(derived).await {
            Ok(article) => {
                enter(ArticleState::Done);
                ItemOutcome::Rewritten {
                    derived_id: article.id,
                }
            }
            Err(error) => ItemOutcome::Failed {
                stage: ArticleState::Persisting,
                error,
            },
        }
    }
}

fn log_outcome(origin: &Article, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Rewritten { derived_id } => {
            info!(origin = %origin.id, title = %origin.title, %derived_id, "article rewritten");
        }
        ItemOutcome::Skipped(reason) => {
            info!(origin = %origin.id, title = %origin.title, %reason, "article skipped");
        }
        ItemOutcome::Failed { stage, error } => {
            warn!(origin = %origin.id, title = %origin.title, %stage, %error, "article failed");
        }
    }
}
