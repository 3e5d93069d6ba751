use anyhow::Result;
use sqlx::SqlitePool;

/// Create the local collection table. Idempotent.
///
/// Each row holds one whole collection, serialized as a JSON array, under
/// its storage key.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            storage_key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
