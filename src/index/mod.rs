//! Per-repository vector index.
//!
//! The [`VectorIndex`] trait defines the collection operations the pipeline
//! relies on, keyed by a repository slug (`owner/name`). Each repository's
//! entries form an isolated collection: no query ever crosses repositories.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside each issue vector. Enough to build a
/// classification verdict without a metadata-store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub number: i64,
    pub title: String,
    pub category: String,
    pub state: String,
}

/// A neighbor returned from a similarity query, most similar first.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Similarity in [0, 1], 1 = identical. See [`unit_similarity`].
    pub similarity: f64,
    pub meta: EntryMeta,
}

/// Abstract per-repository vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace an issue's vector |
/// | [`exists`](VectorIndex::exists) | Check for a live entry |
/// | [`query`](VectorIndex::query) | k-nearest neighbors by similarity |
/// | [`count`](VectorIndex::count) | Collection size |
/// | [`delete`](VectorIndex::delete) | Remove one entry |
/// | [`reset`](VectorIndex::reset) | Drop the whole collection |
///
/// Upsert is the concurrency-safety primitive: re-running a sync replaces
/// entries instead of duplicating them, so at most one live entry exists
/// per `(repo, number)`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector and metadata for an issue.
    async fn upsert(
        &self,
        repo: &str,
        number: i64,
        embedding: &[f32],
        meta: &EntryMeta,
    ) -> Result<()>;

    /// Whether an entry exists for `(repo, number)`.
    async fn exists(&self, repo: &str, number: i64) -> Result<bool>;

    /// Return up to `k` entries ordered by descending similarity to
    /// `embedding`. `k` larger than the collection is clamped.
    async fn query(&self, repo: &str, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Number of live entries in the repository's collection.
    async fn count(&self, repo: &str) -> Result<u64>;

    /// Remove one issue's entry. Removing a missing entry is not an error.
    async fn delete(&self, repo: &str, number: i64) -> Result<()>;

    /// Drop the repository's entire collection.
    async fn reset(&self, repo: &str) -> Result<()>;
}

/// Map raw cosine similarity into the system-wide similarity measure:
/// [0, 1], 1 = identical. Every consumer of neighbor scores assumes this
/// scale, never a raw distance.
pub fn unit_similarity(raw: f32) -> f64 {
    (raw as f64).clamp(0.0, 1.0)
}

/// Repository slug used as the collection key.
pub fn repo_slug(owner: &str, name: &str) -> String {
    format!("{owner}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_similarity_clamps() {
        assert_eq!(unit_similarity(-0.4), 0.0);
        assert_eq!(unit_similarity(0.0), 0.0);
        assert!((unit_similarity(0.73) - 0.73).abs() < 1e-6);
        assert_eq!(unit_similarity(1.2), 1.0);
    }

    #[test]
    fn test_repo_slug() {
        assert_eq!(repo_slug("rust-lang", "cargo"), "rust-lang/cargo");
    }
}
