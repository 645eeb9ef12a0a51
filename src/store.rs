//! Metadata store for repositories and analyzed issues.
//!
//! Backed by the same SQLite database as the vector index. The
//! `repositories` table doubles as the sync lock: a repository's `status`
//! column is flipped to `'syncing'` with a conditional update, and only the
//! caller whose update takes effect may proceed. The lock survives process
//! restarts, so a crashed sync must be cleared with `finish_sync` (the CLI
//! does this on fetch failure before propagating the error).

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::index::repo_slug;
use crate::models::{IssueAnalysis, RawIssue, RepoSummary, StoredIssue};

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_SYNCING: &str = "syncing";

/// Current sync bookkeeping for one repository.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub status: String,
    pub last_synced: Option<DateTime<Utc>>,
}

/// SQLite-backed repository and issue metadata.
#[derive(Clone)]
pub struct MetaStore {
    pool: SqlitePool,
}

impl MetaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Try to acquire the sync lock for a repository.
    ///
    /// Inserts the repository row if it does not exist yet. Returns `true`
    /// when this caller flipped the status to `'syncing'`; `false` means
    /// another sync currently holds the lock and the caller must back off.
    pub async fn try_begin_sync(&self, owner: &str, name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO repositories (owner, name, status, created_at)
            VALUES (?, ?, 'syncing', ?)
            ON CONFLICT(owner, name) DO UPDATE SET status = 'syncing'
            WHERE repositories.status != 'syncing'
            "#,
        )
        .bind(owner)
        .bind(name)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("failed to acquire sync lock")?;

        Ok(result.rows_affected() > 0)
    }

    /// Release the sync lock. Pass `last_synced` only when the sync
    /// completed; a failed sync releases the lock without advancing the
    /// incremental checkpoint.
    pub async fn finish_sync(
        &self,
        owner: &str,
        name: &str,
        last_synced: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match last_synced {
            Some(ts) => {
                sqlx::query(
                    "UPDATE repositories SET status = 'idle', last_synced = ? WHERE owner = ? AND name = ?",
                )
                .bind(ts.timestamp())
                .bind(owner)
                .bind(name)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE repositories SET status = 'idle' WHERE owner = ? AND name = ?",
                )
                .bind(owner)
                .bind(name)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Sync status and checkpoint for a repository, if it is known.
    pub async fn get_sync_state(&self, owner: &str, name: &str) -> Result<Option<SyncState>> {
        let row = sqlx::query(
            "SELECT status, last_synced FROM repositories WHERE owner = ? AND name = ?",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let last_synced: Option<i64> = row.get("last_synced");
            SyncState {
                status: row.get("status"),
                last_synced: last_synced.and_then(|s| Utc.timestamp_opt(s, 0).single()),
            }
        }))
    }

    /// Whether the repository was synced within the last `window_secs`
    /// seconds. Unknown repositories are never fresh.
    pub async fn is_fresh(&self, owner: &str, name: &str, window_secs: i64) -> Result<bool> {
        let state = self.get_sync_state(owner, name).await?;
        Ok(match state.and_then(|s| s.last_synced) {
            Some(ts) => (Utc::now() - ts).num_seconds() < window_secs,
            None => false,
        })
    }

    /// Insert or replace an issue together with its analysis.
    pub async fn upsert_issue_analysis(
        &self,
        owner: &str,
        name: &str,
        issue: &RawIssue,
        analysis: &IssueAnalysis,
    ) -> Result<()> {
        let repo = repo_slug(owner, name);
        let labels_json = serde_json::to_string(
            &issue.labels.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
        )?;
        let analysis_json = serde_json::to_string(analysis)?;

        sqlx::query(
            r#"
            INSERT INTO issues
                (repo, number, title, body, state, labels_json,
                 created_at, updated_at, analysis_json, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(repo, number) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                state = excluded.state,
                labels_json = excluded.labels_json,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                analysis_json = excluded.analysis_json,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&repo)
        .bind(issue.number)
        .bind(&issue.title)
        .bind(issue.body.as_deref())
        .bind(&issue.state)
        .bind(labels_json)
        .bind(issue.created_at.timestamp())
        .bind(issue.updated_at.timestamp())
        .bind(analysis_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store issue {repo}#{}", issue.number))?;

        Ok(())
    }

    /// Fetch one stored issue with its cached analysis, if present.
    pub async fn get_issue(
        &self,
        owner: &str,
        name: &str,
        number: i64,
    ) -> Result<Option<StoredIssue>> {
        let repo = repo_slug(owner, name);
        let row = sqlx::query(
            "SELECT number, title, body, state, analysis_json FROM issues WHERE repo = ? AND number = ?",
        )
        .bind(&repo)
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let analysis_json: Option<String> = row.get("analysis_json");
        let analysis = match analysis_json {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .with_context(|| format!("corrupt analysis for {repo}#{number}"))?,
            ),
            None => None,
        };

        let body: Option<String> = row.get("body");
        Ok(Some(StoredIssue {
            number: row.get("number"),
            title: row.get("title"),
            body: body.unwrap_or_default(),
            state: row.get("state"),
            analysis,
        }))
    }

    /// All known repositories with issue counts, most recently synced first.
    pub async fn list_repositories(&self) -> Result<Vec<RepoSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT r.owner, r.name, r.status, r.last_synced,
                   (SELECT COUNT(*) FROM issues i
                     WHERE i.repo = r.owner || '/' || r.name) AS issue_count
            FROM repositories r
            ORDER BY r.last_synced DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let last_synced: Option<i64> = row.get("last_synced");
                RepoSummary {
                    owner: row.get("owner"),
                    name: row.get("name"),
                    status: row.get("status"),
                    issue_count: row.get("issue_count"),
                    last_synced: last_synced.and_then(|s| Utc.timestamp_opt(s, 0).single()),
                }
            })
            .collect())
    }

    /// Remove a repository and all of its issues. Returns the number of
    /// issues deleted. The caller is responsible for resetting the
    /// repository's vector collection as well.
    pub async fn delete_repository(&self, owner: &str, name: &str) -> Result<u64> {
        let repo = repo_slug(owner, name);
        let result = sqlx::query("DELETE FROM issues WHERE repo = ?")
            .bind(&repo)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM repositories WHERE owner = ? AND name = ?")
            .bind(owner)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db;
    use crate::migrate::run_migrations;
    use crate::models::{Classification, Criticality, Label, ReuseAdvice};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, MetaStore) {
        let dir = TempDir::new().unwrap();
        let pool = open_db(dir.path().join("meta.db").to_str().unwrap())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        (dir, MetaStore::new(pool))
    }

    fn issue(number: i64, title: &str) -> RawIssue {
        RawIssue {
            number,
            title: title.to_string(),
            body: Some("body".to_string()),
            state: "open".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            labels: vec![Label {
                name: "bug".to_string(),
            }],
        }
    }

    fn analysis() -> IssueAnalysis {
        IssueAnalysis {
            category: "bug".to_string(),
            categories: vec!["bug".to_string()],
            category_confidence: 0.8,
            classification: Classification::New,
            criticality: Criticality::Low,
            confidence: 0.0,
            reuse: ReuseAdvice::Minimal,
            similar_issues: vec![],
        }
    }

    #[tokio::test]
    async fn test_sync_lock_is_exclusive() {
        let (_dir, store) = test_store().await;

        assert!(store.try_begin_sync("a", "b").await.unwrap());
        // Second acquire fails while the first holds the lock.
        assert!(!store.try_begin_sync("a", "b").await.unwrap());

        store.finish_sync("a", "b", Some(Utc::now())).await.unwrap();
        assert!(store.try_begin_sync("a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_is_per_repository() {
        let (_dir, store) = test_store().await;

        assert!(store.try_begin_sync("a", "b").await.unwrap());
        assert!(store.try_begin_sync("c", "d").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_checkpoint() {
        let (_dir, store) = test_store().await;
        let first = Utc::now() - Duration::hours(2);

        store.try_begin_sync("a", "b").await.unwrap();
        store.finish_sync("a", "b", Some(first)).await.unwrap();

        // A failed sync releases the lock but does not advance last_synced.
        store.try_begin_sync("a", "b").await.unwrap();
        store.finish_sync("a", "b", None).await.unwrap();

        let state = store.get_sync_state("a", "b").await.unwrap().unwrap();
        assert_eq!(state.status, STATUS_IDLE);
        assert_eq!(
            state.last_synced.unwrap().timestamp(),
            first.timestamp()
        );
    }

    #[tokio::test]
    async fn test_freshness_window() {
        let (_dir, store) = test_store().await;

        assert!(!store.is_fresh("a", "b", 3600).await.unwrap());

        store.try_begin_sync("a", "b").await.unwrap();
        store.finish_sync("a", "b", Some(Utc::now())).await.unwrap();
        assert!(store.is_fresh("a", "b", 3600).await.unwrap());
        assert!(!store.is_fresh("a", "b", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_upsert_last_write_wins() {
        let (_dir, store) = test_store().await;

        store
            .upsert_issue_analysis("a", "b", &issue(1, "first title"), &analysis())
            .await
            .unwrap();
        store
            .upsert_issue_analysis("a", "b", &issue(1, "edited title"), &analysis())
            .await
            .unwrap();

        let stored = store.get_issue("a", "b", 1).await.unwrap().unwrap();
        assert_eq!(stored.title, "edited title");
        assert!(stored.analysis.is_some());

        assert!(store.get_issue("a", "b", 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete_repository() {
        let (_dir, store) = test_store().await;

        store.try_begin_sync("a", "b").await.unwrap();
        store.finish_sync("a", "b", Some(Utc::now())).await.unwrap();
        store
            .upsert_issue_analysis("a", "b", &issue(1, "one"), &analysis())
            .await
            .unwrap();
        store
            .upsert_issue_analysis("a", "b", &issue(2, "two"), &analysis())
            .await
            .unwrap();

        let repos = store.list_repositories().await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].issue_count, 2);
        assert_eq!(repos[0].status, STATUS_IDLE);

        let deleted = store.delete_repository("a", "b").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.list_repositories().await.unwrap().is_empty());
        assert!(store.get_issue("a", "b", 1).await.unwrap().is_none());
    }
}
