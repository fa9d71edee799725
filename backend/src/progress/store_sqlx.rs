use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use crate::progress::model::{CatalogModule, ProgressKey, ProgressRecord};
use crate::progress::store::{CommitOutcome, DocumentStore};

/// SQLx-backed implementation of DocumentStore.
/// Responsible only for persistence and document mapping.
pub struct SqlxDocumentStore {
    pool: AnyPool,
}

impl SqlxDocumentStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqlxDocumentStore {
    async fn fetch_progress(&self, key: &ProgressKey) -> anyhow::Result<Option<ProgressRecord>> {
        let row = sqlx::query(
            r#"
SELECT
  progress_id, user_id, course_id, module_id, activity_id,
  is_completed, points_earned, completed_at_ms
FROM user_progress
WHERE progress_id = ?;
"#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_progress(&r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_module(&self, module_id: &str) -> anyhow::Result<Option<CatalogModule>> {
        let row = sqlx::query("SELECT doc FROM modules WHERE module_id = ?;")
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let doc: String = r.try_get("doc")?;
        let mut module: CatalogModule = serde_json::from_str(&doc)
            .with_context(|| format!("malformed catalog document for module {module_id}"))?;
        if module.id.is_empty() {
            module.id = module_id.to_string();
        }

        Ok(Some(module))
    }

    async fn commit_completion(&self, record: &ProgressRecord) -> anyhow::Result<CommitOutcome> {
        let points = u64_to_i64(record.points_earned)?;
        let completed_at = u64_to_i64(record.completed_at_ms)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open completion transaction")?;

        // Create-if-absent. An existing incomplete record may be overwritten;
        // a completed one never is, so zero affected rows means we lost.
        let written = sqlx::query(
            r#"
INSERT INTO user_progress (
  progress_id, user_id, course_id, module_id, activity_id,
  is_completed, points_earned, completed_at_ms
)
VALUES (?, ?, ?, ?, ?, 1, ?, ?)
ON CONFLICT (progress_id) DO UPDATE SET
  user_id = excluded.user_id,
  course_id = excluded.course_id,
  module_id = excluded.module_id,
  activity_id = excluded.activity_id,
  is_completed = 1,
  points_earned = excluded.points_earned,
  completed_at_ms = excluded.completed_at_ms
WHERE user_progress.is_completed = 0;
"#,
        )
        .bind(record.id.as_str())
        .bind(record.user_id.as_str())
        .bind(record.course_id.as_str())
        .bind(record.module_id.as_str())
        .bind(record.activity_id.as_deref().unwrap_or(""))
        .bind(points)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .context("failed to write progress record")?;

        if written.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("failed to roll back completion transaction")?;
            return Ok(CommitOutcome::AlreadyCompleted);
        }

        // Relative delta; the database applies it, never application code.
        // SQLite turns an overflowing sum into a REAL, so the update only
        // applies while the total stays within BIGINT.
        let incremented = sqlx::query(
            r#"
INSERT INTO users (user_id, points)
VALUES (?, ?)
ON CONFLICT (user_id) DO UPDATE SET
  points = users.points + excluded.points
WHERE users.points <= 9223372036854775807 - excluded.points;
"#,
        )
        .bind(record.user_id.as_str())
        .bind(points)
        .execute(&mut *tx)
        .await
        .context("failed to increment user points")?;

        if incremented.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("failed to roll back completion transaction")?;
            return Err(anyhow!(
                "points overflow for user {}",
                record.user_id
            ));
        }

        tx.commit()
            .await
            .context("failed to commit completion transaction")?;

        Ok(CommitOutcome::Committed)
    }

    async fn fetch_points(&self, user_id: &str) -> anyhow::Result<Option<u64>> {
        let row = sqlx::query("SELECT points FROM users WHERE user_id = ?;")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(i64_to_u64(r.try_get("points")?)?)),
            None => Ok(None),
        }
    }

    async fn put_module(&self, module: &CatalogModule) -> anyhow::Result<()> {
        if module.id.is_empty() {
            return Err(anyhow!("catalog module without id"));
        }
        let doc = serde_json::to_string(module).context("failed to encode catalog module")?;

        sqlx::query(
            r#"
INSERT INTO modules (module_id, doc)
VALUES (?, ?)
ON CONFLICT (module_id) DO UPDATE SET doc = excluded.doc;
"#,
        )
        .bind(module.id.as_str())
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_progress(r: &sqlx::any::AnyRow) -> anyhow::Result<ProgressRecord> {
    let activity_id: String = r.try_get("activity_id")?;
    let is_completed: i64 = r.try_get("is_completed")?;

    Ok(ProgressRecord {
        id: ProgressKey::from_stored(r.try_get("progress_id")?),
        user_id: r.try_get("user_id")?,
        course_id: r.try_get("course_id")?,
        module_id: r.try_get("module_id")?,
        activity_id: (!activity_id.is_empty()).then_some(activity_id),
        is_completed: is_completed == 1,
        points_earned: i64_to_u64(r.try_get("points_earned")?)?,
        completed_at_ms: i64_to_u64(r.try_get("completed_at_ms")?)?,
    })
}

/* =========================
Numeric safety helpers
========================= */

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
