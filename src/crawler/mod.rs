//! Crawler module for catalog harvesting and change detection
//!
//! This module contains the run pipeline, including:
//! - Target resolution through the catalog's category listings
//! - HTTP fetching with retry and exponential backoff
//! - Record extraction from product pages
//! - Change detection against the stored version of each item
//! - Per-run checkpoints and overall run coordination

mod checkpoint;
mod coordinator;
mod detector;
mod extractor;
mod fetcher;
mod resolver;
mod retry;
mod stop;

#[cfg(test)]
mod fixtures;

pub use checkpoint::CheckpointTracker;
pub use coordinator::{run_crawl, run_once, RunContext, RunCoordinator, RunOptions, UrlFailure};
pub use detector::{classify_and_commit, detect, diff_content, Detection};
pub use extractor::{BookPageExtractor, ExtractionError, Extractor};
pub use fetcher::{build_http_client, is_retryable_status, Fetch, FetchOutcome, HttpFetcher, Payload};
pub use resolver::{PaginatedCatalogResolver, StaticTargets, TargetResolver};
pub use retry::{fetch_with_retry, FetchError, RetryPolicy};
pub use stop::StopHandle;
