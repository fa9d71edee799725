use anyhow::Result;
use async_trait::async_trait;

use crate::progress::model::{CatalogModule, ProgressKey, ProgressRecord};

/// Result of an atomic completion commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Progress record written and points incremented together.
    Committed,
    /// A completed record already existed at the key; nothing was written.
    AlreadyCompleted,
}

/// Transactional document store backing the completion workflow.
///
/// Implementations are responsible only for persistence and document
/// mapping; validation and reward resolution live in the service.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>>;

    async fn fetch_module(&self, module_id: &str) -> Result<Option<CatalogModule>>;

    /// Writes `record` and increments `users[record.user_id].points` by
    /// `record.points_earned` as one all-or-nothing unit.
    ///
    /// The write is conditional: if a completed record already exists at
    /// `record.id`, nothing changes and `AlreadyCompleted` is returned.
    /// This is what settles two racing first-time completions.
    async fn commit_completion(&self, record: &ProgressRecord) -> Result<CommitOutcome>;

    async fn fetch_points(&self, user_id: &str) -> Result<Option<u64>>;

    /// Catalog upsert. Authoring is external; this exists for seeding.
    async fn put_module(&self, module: &CatalogModule) -> Result<()>;
}
