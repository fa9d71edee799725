use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Catalog: one JSON document per module, authored elsewhere.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS modules (
  module_id TEXT PRIMARY KEY,
  doc TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Progress: keyed by `{user_id}_{target_id}`; activity_id is '' for modules.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS user_progress (
  progress_id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  course_id TEXT NOT NULL,
  module_id TEXT NOT NULL,
  activity_id TEXT NOT NULL DEFAULT '',
  is_completed INTEGER NOT NULL CHECK (is_completed IN (0,1)),
  points_earned BIGINT NOT NULL CHECK (points_earned >= 0),
  completed_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Users: points only ever move by relative increments.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS users (
  user_id TEXT PRIMARY KEY,
  points BIGINT NOT NULL DEFAULT 0 CHECK (points >= 0)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_user_progress_user ON user_progress(user_id);"#)
        .execute(pool)
        .await?;

    Ok(())
}
