//! Run coordinator - main run orchestration logic
//!
//! This module drives one run through its state machine:
//! - Selecting a fresh or resumed run and resolving its targets
//! - Draining the pending queue with a bounded pool of workers
//! - Aggregating per-URL outcomes into a `RunSummary`
//! - Handing the summary to the configured sinks

use crate::config::Config;
use crate::crawler::checkpoint::CheckpointTracker;
use crate::crawler::detector::{classify_and_commit, Detection};
use crate::crawler::extractor::{BookPageExtractor, ExtractionError, Extractor};
use crate::crawler::fetcher::{Fetch, HttpFetcher};
use crate::crawler::resolver::{PaginatedCatalogResolver, StaticTargets, TargetResolver};
use crate::crawler::retry::{fetch_with_retry, FetchError, RetryPolicy};
use crate::crawler::stop::StopHandle;
use crate::model::{
    ChangeEntry, Classification, ClassificationCounts, FailedUrl, FailureKind, RunId, RunSummary,
};
use crate::output::{MarkdownSummarySink, SqliteReportSink, SummarySink};
use crate::state::RunState;
use crate::storage::{lock, open_storage, share, SharedStorage, StorageError};
use crate::ShelfError;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

/// Externally supplied parameters of one invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Identifier of the run to start or resume; generated when absent
    pub run_id: Option<RunId>,
    /// Resume an unfinished run instead of starting a new one
    pub resume: bool,
    /// Hash of the configuration, recorded with a new run
    pub config_hash: String,
}

/// Terminal failure of one URL within a run
#[derive(Debug, Error)]
pub enum UrlFailure {
    #[error("permanent fetch failure: {0}")]
    Permanent(String),

    #[error("transient failures exhausted after {attempts} attempts: {reason}")]
    TransientExhausted { attempts: u32, reason: String },

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("store write failed: {0}")]
    StoreWrite(#[from] StorageError),
}

impl UrlFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Permanent(_) => FailureKind::Permanent,
            Self::TransientExhausted { .. } => FailureKind::TransientExhausted,
            Self::Extraction(_) => FailureKind::Extraction,
            Self::StoreWrite(_) => FailureKind::StoreWrite,
        }
    }

    fn into_failed(self, url: &Url) -> FailedUrl {
        FailedUrl {
            url: url.to_string(),
            kind: self.kind(),
            reason: self.to_string(),
        }
    }
}

/// How one URL settled
#[derive(Debug)]
enum UrlOutcome {
    Committed {
        classification: Classification,
        change: Option<ChangeEntry>,
    },
    Failed(FailedUrl),
    /// The run was stopped before the URL settled; it stays pending
    Abandoned,
}

/// State of one run, owned by the coordinator for the run's duration
#[derive(Debug)]
pub struct RunContext {
    pub run_id: RunId,
    /// Timestamp shared by every write of the run, kept across resumes
    pub run_ts: DateTime<Utc>,
    pub state: RunState,
    pub targets: Vec<Url>,
    pub pending: Vec<Url>,
    pub skipped: u64,
}

impl RunContext {
    fn new(run_id: RunId, run_ts: DateTime<Utc>) -> Self {
        Self {
            run_id,
            run_ts,
            state: RunState::Initializing,
            targets: Vec::new(),
            pending: Vec::new(),
            skipped: 0,
        }
    }

    /// Moves the run to `next`, rejecting moves the state machine forbids
    pub fn transition(&mut self, next: RunState) -> Result<(), ShelfError> {
        if !self.state.can_transition_to(next) {
            return Err(ShelfError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(run_id = %self.run_id, from = %self.state, to = %next, "run state transition");
        self.state = next;
        Ok(())
    }
}

/// Everything a worker needs to settle one URL
#[derive(Clone)]
struct Worker {
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extractor>,
    storage: SharedStorage,
    checkpoint: CheckpointTracker,
    policy: RetryPolicy,
    stop: StopHandle,
    run_ts: DateTime<Utc>,
}

impl Worker {
    /// Takes URLs off the shared queue until it is empty or the run is stopped
    async fn drain(self, queue: Arc<Mutex<VecDeque<Url>>>) -> Vec<UrlOutcome> {
        let mut outcomes = Vec::new();

        loop {
            if self.stop.is_stopped() {
                break;
            }

            let next = match queue.lock() {
                Ok(mut q) => q.pop_front(),
                Err(poisoned) => poisoned.into_inner().pop_front(),
            };
            let Some(url) = next else {
                break;
            };

            outcomes.push(self.process(&url).await);
        }

        outcomes
    }

    async fn process(&self, url: &Url) -> UrlOutcome {
        let payload =
            match fetch_with_retry(self.fetcher.as_ref(), url, &self.policy, &self.stop).await {
                Ok(payload) => payload,
                Err(FetchError::Stopped) => {
                    debug!(url = %url, "abandoned by stop request");
                    return UrlOutcome::Abandoned;
                }
                Err(FetchError::Permanent { reason, .. }) => {
                    return self.failed(url, UrlFailure::Permanent(reason));
                }
                Err(FetchError::TransientExhausted {
                    attempts,
                    last_reason,
                }) => {
                    return self.failed(
                        url,
                        UrlFailure::TransientExhausted {
                            attempts,
                            reason: last_reason,
                        },
                    );
                }
            };

        match self.commit(url, &payload.body) {
            Ok(detection) => {
                debug!(url = %url, classification = %detection.classification, "committed");
                UrlOutcome::Committed {
                    classification: detection.classification,
                    change: detection.change,
                }
            }
            Err(failure) => self.failed(url, failure),
        }
    }

    /// Extracts, classifies and commits one payload, then checkpoints the URL
    ///
    /// The URL is only marked done after the record write succeeded.
    fn commit(&self, url: &Url, body: &str) -> Result<Detection, UrlFailure> {
        let candidate = self.extractor.extract(body, url)?;

        let detection = {
            let mut storage = lock(&self.storage)?;
            classify_and_commit(&mut *storage, candidate, self.checkpoint.run_id(), self.run_ts)?
        };

        if let Err(e) = self.checkpoint.mark_done(url) {
            warn!(
                run_id = %self.checkpoint.run_id(),
                url = %url,
                "record committed but checkpoint write failed: {}",
                e
            );
        }

        Ok(detection)
    }

    fn failed(&self, url: &Url, failure: UrlFailure) -> UrlOutcome {
        warn!(url = %url, kind = failure.kind().as_str(), "URL failed: {}", failure);
        UrlOutcome::Failed(failure.into_failed(url))
    }
}

/// Main run coordinator structure
pub struct RunCoordinator {
    storage: SharedStorage,
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extractor>,
    resolver: Arc<dyn TargetResolver>,
    policy: RetryPolicy,
    width: usize,
    stop: StopHandle,
    sinks: Vec<Box<dyn SummarySink>>,
}

impl RunCoordinator {
    /// Creates a coordinator from its collaborators
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared persistent store
    /// * `fetcher` - Source of raw pages
    /// * `extractor` - Turns payloads into records
    /// * `resolver` - Supplies the target set at initialization
    /// * `policy` - Retry policy for every fetch
    /// * `width` - Maximum number of in-flight fetches
    pub fn new(
        storage: SharedStorage,
        fetcher: Arc<dyn Fetch>,
        extractor: Arc<dyn Extractor>,
        resolver: Arc<dyn TargetResolver>,
        policy: RetryPolicy,
        width: usize,
    ) -> Self {
        Self {
            storage,
            fetcher,
            extractor,
            resolver,
            policy,
            width: width.max(1),
            stop: StopHandle::new(),
            sinks: Vec::new(),
        }
    }

    /// Builds a coordinator wired to HTTP, the book page extractor and the
    /// default sinks
    ///
    /// An explicit target list in the config replaces catalog enumeration.
    pub fn from_config(config: &Config, storage: SharedStorage) -> Result<Self, ShelfError> {
        let policy = RetryPolicy::from_config(&config.retry);
        let stop = StopHandle::new();
        let fetcher: Arc<dyn Fetch> =
            Arc::new(HttpFetcher::from_config(&config.crawler, &config.user_agent)?);

        let resolver: Arc<dyn TargetResolver> = if config.catalog.targets.is_empty() {
            let index_url = Url::parse(&config.catalog.base_url)?.join(&config.catalog.index_path)?;
            Arc::new(
                PaginatedCatalogResolver::new(fetcher.clone(), policy.clone(), index_url)
                    .with_stop(stop.clone()),
            )
        } else {
            Arc::new(StaticTargets::new(config.catalog.targets.clone()))
        };

        let mut coordinator = Self::new(
            storage.clone(),
            fetcher,
            Arc::new(BookPageExtractor::new()),
            resolver,
            policy,
            config.crawler.max_concurrent_fetches as usize,
        )
        .with_sink(Box::new(MarkdownSummarySink::new(&config.output.summary_path)))
        .with_sink(Box::new(SqliteReportSink::new(
            storage,
            config.output.changelog_limit,
        )));
        coordinator.stop = stop;

        Ok(coordinator)
    }

    /// Adds a consumer of the finished run's summary
    pub fn with_sink(mut self, sink: Box<dyn SummarySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Handle that requests a cooperative stop of the running run
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs one invocation to a terminal state
    ///
    /// Per-URL failures never abort the run; they end up in the summary's
    /// failed set. Only initialization problems are returned as errors.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run reached a terminal state
    /// * `Err(ShelfError)` - The run could not be initialized or finalized
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary, ShelfError> {
        let mut ctx = self.initialize(&options).await?;

        ctx.transition(RunState::Fetching)?;
        lock(&self.storage)?.update_run_state(&ctx.run_id, ctx.state)?;
        info!(
            run_id = %ctx.run_id,
            targets = ctx.targets.len(),
            pending = ctx.pending.len(),
            skipped = ctx.skipped,
            "fetching"
        );

        let outcomes = self.fetch_all(&ctx).await?;

        ctx.transition(RunState::Finalizing)?;
        lock(&self.storage)?.update_run_state(&ctx.run_id, ctx.state)?;

        let summary = self.finalize(&mut ctx, outcomes)?;
        self.emit(&summary);

        Ok(summary)
    }

    /// Selects the run, resolves targets and loads the checkpoint
    async fn initialize(&self, options: &RunOptions) -> Result<RunContext, ShelfError> {
        let resumed = if options.resume {
            self.select_resumable(options.run_id.as_ref(), &options.config_hash)?
        } else {
            None
        };

        let targets = self.resolver.resolve().await?;
        if targets.is_empty() {
            return Err(ShelfError::Initialization(
                "target resolver returned no URLs".to_string(),
            ));
        }

        let mut ctx = match resumed {
            Some((run_id, started_at)) => {
                info!(run_id = %run_id, started_at = %started_at, "resuming run");
                lock(&self.storage)?.update_run_state(&run_id, RunState::Initializing)?;
                RunContext::new(run_id, started_at)
            }
            None => {
                let run_id = options.run_id.clone().unwrap_or_else(RunId::generate);
                let started_at = Utc::now();
                let mut storage = lock(&self.storage)?;
                match storage.get_run(&run_id) {
                    Ok(_) => {
                        return Err(ShelfError::Initialization(format!(
                            "run {} already exists; pass --resume to continue it",
                            run_id
                        )))
                    }
                    Err(StorageError::RunNotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                storage.create_run(&run_id, started_at, &options.config_hash)?;
                info!(run_id = %run_id, "starting new run");
                RunContext::new(run_id, started_at)
            }
        };

        let checkpoint = CheckpointTracker::new(self.storage.clone(), ctx.run_id.clone());
        ctx.pending = checkpoint.load_pending(&targets)?;
        ctx.skipped = (targets.len() - ctx.pending.len()) as u64;
        ctx.targets = targets;

        Ok(ctx)
    }

    /// Finds the run to resume
    ///
    /// Returns `None` when no explicit id was given and every stored run is
    /// completed, in which case a new run starts.
    fn select_resumable(
        &self,
        requested: Option<&RunId>,
        config_hash: &str,
    ) -> Result<Option<(RunId, DateTime<Utc>)>, ShelfError> {
        let storage = lock(&self.storage)?;

        let run = match requested {
            Some(run_id) => match storage.get_run(run_id) {
                Ok(run) => run,
                Err(StorageError::RunNotFound(_)) => {
                    return Err(ShelfError::Initialization(format!(
                        "cannot resume unknown run {}",
                        run_id
                    )))
                }
                Err(e) => return Err(e.into()),
            },
            None => match storage.latest_resumable_run()? {
                Some(run) => run,
                None => {
                    info!("no unfinished run to resume");
                    return Ok(None);
                }
            },
        };

        if !run.state.is_resumable() {
            return Err(ShelfError::Initialization(format!(
                "run {} is {} and cannot be resumed",
                run.id, run.state
            )));
        }

        if !run.state.is_terminal() {
            warn!(
                run_id = %run.id,
                state = %run.state,
                "run was left in an active state; resuming after an unclean shutdown"
            );
        }

        if run.config_hash != config_hash {
            warn!(run_id = %run.id, "configuration changed since the run started");
        }

        Ok(Some((run.id, run.started_at)))
    }

    /// Drains the pending queue with up to `width` concurrent workers
    async fn fetch_all(&self, ctx: &RunContext) -> Result<Vec<UrlOutcome>, ShelfError> {
        if ctx.pending.is_empty() {
            return Ok(Vec::new());
        }

        let queue = Arc::new(Mutex::new(ctx.pending.iter().cloned().collect::<VecDeque<_>>()));
        let worker = Worker {
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            storage: self.storage.clone(),
            checkpoint: CheckpointTracker::new(self.storage.clone(), ctx.run_id.clone()),
            policy: self.policy.clone(),
            stop: self.stop.clone(),
            run_ts: ctx.run_ts,
        };

        let mut workers = JoinSet::new();
        for _ in 0..self.width.min(ctx.pending.len()) {
            workers.spawn(worker.clone().drain(queue.clone()));
        }

        let mut outcomes = Vec::with_capacity(ctx.pending.len());
        while let Some(joined) = workers.join_next().await {
            let batch = joined.map_err(|e| ShelfError::Worker(e.to_string()))?;
            outcomes.extend(batch);
        }

        Ok(outcomes)
    }

    /// Aggregates outcomes, picks the terminal state and persists the summary
    fn finalize(
        &self,
        ctx: &mut RunContext,
        outcomes: Vec<UrlOutcome>,
    ) -> Result<RunSummary, ShelfError> {
        let mut counts = ClassificationCounts::default();
        let mut changes = Vec::new();
        let mut failed = Vec::new();
        let mut settled = 0usize;

        for outcome in outcomes {
            match outcome {
                UrlOutcome::Committed {
                    classification,
                    change,
                } => {
                    counts.record(classification);
                    changes.extend(change);
                    settled += 1;
                }
                UrlOutcome::Failed(failure) => {
                    failed.push(failure);
                    settled += 1;
                }
                UrlOutcome::Abandoned => {}
            }
        }
        counts.failed = failed.len() as u64;
        failed.sort_by(|a, b| a.url.cmp(&b.url));

        let terminal = if settled < ctx.pending.len() {
            RunState::Interrupted
        } else if failed.is_empty() {
            RunState::Completed
        } else {
            RunState::CompletedWithFailures
        };
        ctx.transition(terminal)?;

        let summary = RunSummary {
            run_id: ctx.run_id.clone(),
            state: ctx.state,
            started_at: ctx.run_ts,
            finished_at: Utc::now(),
            total_targets: ctx.targets.len() as u64,
            skipped: ctx.skipped,
            counts,
            changes,
            failed,
        };

        lock(&self.storage)?.finish_run(&summary)?;

        if summary.state == RunState::Completed {
            CheckpointTracker::new(self.storage.clone(), ctx.run_id.clone()).discard()?;
        }

        info!(
            run_id = %summary.run_id,
            state = %summary.state,
            new = summary.counts.new,
            updated = summary.counts.updated,
            unchanged = summary.counts.unchanged,
            failed = summary.counts.failed,
            skipped = summary.skipped,
            "run finished"
        );

        Ok(summary)
    }

    fn emit(&self, summary: &RunSummary) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(summary) {
                error!(sink = sink.name(), "failed to emit run summary: {}", e);
            }
        }
    }
}

/// Opens the configured store and runs one invocation
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `options` - Run identifier and resume flag
pub async fn run_crawl(config: &Config, options: RunOptions) -> Result<RunSummary, ShelfError> {
    let storage = share(open_storage(Path::new(&config.output.database_path))?);
    RunCoordinator::from_config(config, storage)?.run(options).await
}

/// Blocking entry point for external schedulers
///
/// Builds its own runtime, so it must not be called from inside one.
pub fn run_once(config: &Config, options: RunOptions) -> Result<RunSummary, ShelfError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_crawl(config, options))
}
