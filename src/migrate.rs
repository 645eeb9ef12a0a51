use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Repositories table. `status` doubles as the sync lock.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'idle',
            last_synced INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(owner, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Issues table, keyed by repository slug and issue number.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            repo TEXT NOT NULL,
            number INTEGER NOT NULL,
            title TEXT NOT NULL,
            body TEXT,
            state TEXT NOT NULL,
            labels_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            analysis_json TEXT,
            synced_at INTEGER NOT NULL,
            UNIQUE(repo, number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Issue vectors, one row per live index entry.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issue_vectors (
            repo TEXT NOT NULL,
            number INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            state TEXT NOT NULL,
            PRIMARY KEY (repo, number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_issues_repo ON issues(repo)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_issues_updated_at ON issues(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
