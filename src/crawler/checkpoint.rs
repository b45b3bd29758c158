//! Per-run progress tracking
//!
//! The checkpoint of a run is the set of target URLs whose record and change
//! entry were committed. It lives in the store so a crashed or stopped run can
//! be resumed without reprocessing committed URLs.

use crate::model::RunId;
use crate::storage::{lock, SharedStorage, StorageResult};
use url::Url;

/// Checkpoint of one run
#[derive(Clone)]
pub struct CheckpointTracker {
    storage: SharedStorage,
    run_id: RunId,
}

impl CheckpointTracker {
    /// Opens the checkpoint of `run_id`; a resumed run sees its earlier marks
    pub fn new(storage: SharedStorage, run_id: RunId) -> Self {
        Self { storage, run_id }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn is_done(&self, url: &Url) -> StorageResult<bool> {
        lock(&self.storage)?.is_done(&self.run_id, url.as_str())
    }

    /// Marks `url` committed; durable once this returns
    ///
    /// Must only be called after the URL's record write succeeded.
    pub fn mark_done(&self, url: &Url) -> StorageResult<()> {
        lock(&self.storage)?.mark_done(&self.run_id, url.as_str())
    }

    /// Returns the targets not yet committed in this run, in input order
    pub fn load_pending(&self, targets: &[Url]) -> StorageResult<Vec<Url>> {
        let done = lock(&self.storage)?.done_urls(&self.run_id)?;
        Ok(targets
            .iter()
            .filter(|url| !done.contains(url.as_str()))
            .cloned()
            .collect())
    }

    /// Discards the checkpoint once the run completed cleanly
    pub fn discard(&self) -> StorageResult<()> {
        lock(&self.storage)?.clear_checkpoint(&self.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{share, SqliteStorage, Storage};
    use chrono::Utc;

    fn tracker() -> CheckpointTracker {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = RunId::new("run-1");
        storage.create_run(&run_id, Utc::now(), "h").unwrap();
        CheckpointTracker::new(share(storage), run_id)
    }

    fn urls(n: usize) -> Vec<Url> {
        (1..=n)
            .map(|i| Url::parse(&format!("https://books.example/catalogue/book-{}/index.html", i)).unwrap())
            .collect()
    }

    #[test]
    fn test_load_pending_excludes_done() {
        let tracker = tracker();
        let targets = urls(4);
        tracker.mark_done(&targets[1]).unwrap();
        tracker.mark_done(&targets[3]).unwrap();

        let pending = tracker.load_pending(&targets).unwrap();
        assert_eq!(pending, vec![targets[0].clone(), targets[2].clone()]);
        assert!(tracker.is_done(&targets[1]).unwrap());
        assert!(!tracker.is_done(&targets[0]).unwrap());
    }

    #[test]
    fn test_mark_done_is_idempotent() {
        let tracker = tracker();
        let targets = urls(1);
        tracker.mark_done(&targets[0]).unwrap();
        tracker.mark_done(&targets[0]).unwrap();
        assert!(tracker.load_pending(&targets).unwrap().is_empty());
    }

    #[test]
    fn test_discard() {
        let tracker = tracker();
        let targets = urls(2);
        tracker.mark_done(&targets[0]).unwrap();
        tracker.discard().unwrap();
        assert_eq!(tracker.load_pending(&targets).unwrap().len(), 2);
    }
}
