use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::progress::model::{CatalogModule, ProgressKey, ProgressRecord};
use crate::progress::store::{CommitOutcome, DocumentStore};

#[derive(Default)]
struct Documents {
    modules: HashMap<String, CatalogModule>,
    progress: HashMap<ProgressKey, ProgressRecord>,
    points: HashMap<String, u64>,
}

/// Process-local DocumentStore. Commits apply under a single lock, so the
/// progress write and the increment are observed together or not at all.
///
/// Failure switches let tests knock out individual store steps.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: Mutex<Documents>,
    fail_reads: AtomicBool,
    fail_increments: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read fail until switched off.
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Makes the points increment of every commit fail until switched off.
    pub fn fail_increments(&self, on: bool) {
        self.fail_increments.store(on, Ordering::SeqCst);
    }

    pub fn progress(&self, key: &ProgressKey) -> Option<ProgressRecord> {
        self.docs.lock().progress.get(key).cloned()
    }

    pub fn progress_len(&self) -> usize {
        self.docs.lock().progress.len()
    }

    /// Stores a progress record directly, bypassing the completion commit.
    pub fn put_progress(&self, record: ProgressRecord) {
        self.docs.lock().progress.insert(record.id.clone(), record);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("document store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch_progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>> {
        self.check_reads()?;
        Ok(self.docs.lock().progress.get(key).cloned())
    }

    async fn fetch_module(&self, module_id: &str) -> Result<Option<CatalogModule>> {
        self.check_reads()?;
        Ok(self.docs.lock().modules.get(module_id).cloned())
    }

    async fn commit_completion(&self, record: &ProgressRecord) -> Result<CommitOutcome> {
        let mut docs = self.docs.lock();

        if docs
            .progress
            .get(&record.id)
            .is_some_and(|existing| existing.is_completed)
        {
            return Ok(CommitOutcome::AlreadyCompleted);
        }

        // Both halves are computed before anything is written.
        let current = docs.points.get(&record.user_id).copied().unwrap_or(0);
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(anyhow!("points increment rejected"));
        }
        let next = current
            .checked_add(record.points_earned)
            .ok_or_else(|| anyhow!("points overflow for user {}", record.user_id))?;

        docs.progress.insert(record.id.clone(), record.clone());
        docs.points.insert(record.user_id.clone(), next);

        Ok(CommitOutcome::Committed)
    }

    async fn fetch_points(&self, user_id: &str) -> Result<Option<u64>> {
        self.check_reads()?;
        Ok(self.docs.lock().points.get(user_id).copied())
    }

    async fn put_module(&self, module: &CatalogModule) -> Result<()> {
        if module.id.is_empty() {
            return Err(anyhow!("catalog module without id"));
        }
        self.docs
            .lock()
            .modules
            .insert(module.id.clone(), module.clone());
        Ok(())
    }
}
