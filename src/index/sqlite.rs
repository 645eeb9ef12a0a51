//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs in the `issue_vectors`
//! table (one row per `(repo, number)`, enforced by the primary key).
//! Queries load the repository's vectors and compute cosine similarity in
//! Rust; collections are per-repository issue sets, small enough that
//! brute force beats an approximate index.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};

use super::{unit_similarity, EntryMeta, Neighbor, VectorIndex};

/// Vector index persisted in the shared SQLite database.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(
        &self,
        repo: &str,
        number: i64,
        embedding: &[f32],
        meta: &EntryMeta,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issue_vectors (repo, number, embedding, title, category, state)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(repo, number) DO UPDATE SET
                embedding = excluded.embedding,
                title = excluded.title,
                category = excluded.category,
                state = excluded.state
            "#,
        )
        .bind(repo)
        .bind(number)
        .bind(vec_to_blob(embedding))
        .bind(&meta.title)
        .bind(&meta.category)
        .bind(&meta.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn exists(&self, repo: &str, number: i64) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM issue_vectors WHERE repo = ? AND number = ?",
        )
        .bind(repo)
        .bind(number)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn query(&self, repo: &str, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query(
            "SELECT number, embedding, title, category, state FROM issue_vectors WHERE repo = ?",
        )
        .bind(repo)
        .fetch_all(&self.pool)
        .await?;

        let mut neighbors: Vec<Neighbor> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                Neighbor {
                    similarity: unit_similarity(cosine_similarity(embedding, &vector)),
                    meta: EntryMeta {
                        number: row.get("number"),
                        title: row.get("title"),
                        category: row.get("category"),
                        state: row.get("state"),
                    },
                }
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    async fn count(&self, repo: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issue_vectors WHERE repo = ?")
            .bind(repo)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn delete(&self, repo: &str, number: i64) -> Result<()> {
        sqlx::query("DELETE FROM issue_vectors WHERE repo = ? AND number = ?")
            .bind(repo)
            .bind(number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset(&self, repo: &str) -> Result<()> {
        sqlx::query("DELETE FROM issue_vectors WHERE repo = ?")
            .bind(repo)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
