pub mod schema;

use anyhow::bail;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    /// Queries are written in SQLite's dialect (`?` placeholders, upsert
    /// syntax), so only `sqlite:` urls are accepted.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        if !database_url.starts_with("sqlite:") {
            let scheme = database_url.split(':').next().unwrap_or_default();
            bail!("unsupported database scheme {scheme:?}: only sqlite: urls are supported");
        }

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await
    }
}
