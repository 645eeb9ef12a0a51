//! In-memory [`VectorIndex`] implementation for tests.
//!
//! Uses a `HashMap` of per-repository entry lists behind `std::sync::RwLock`.
//! Queries are brute-force cosine similarity over the collection.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{unit_similarity, EntryMeta, Neighbor, VectorIndex};

struct Entry {
    number: i64,
    vector: Vec<f32>,
    meta: EntryMeta,
}

/// In-memory vector index keyed by repository slug.
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Vec<Entry>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(
        &self,
        repo: &str,
        number: i64,
        embedding: &[f32],
        meta: &EntryMeta,
    ) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        let entries = collections.entry(repo.to_string()).or_default();
        entries.retain(|e| e.number != number);
        entries.push(Entry {
            number,
            vector: embedding.to_vec(),
            meta: meta.clone(),
        });
        Ok(())
    }

    async fn exists(&self, repo: &str, number: i64) -> Result<bool> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(repo)
            .is_some_and(|entries| entries.iter().any(|e| e.number == number)))
    }

    async fn query(&self, repo: &str, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let collections = self.collections.read().unwrap();
        let mut neighbors: Vec<Neighbor> = collections
            .get(repo)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| Neighbor {
                        similarity: unit_similarity(cosine_similarity(embedding, &e.vector)),
                        meta: e.meta.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    async fn count(&self, repo: &str) -> Result<u64> {
        let collections = self.collections.read().unwrap();
        Ok(collections.get(repo).map(|e| e.len() as u64).unwrap_or(0))
    }

    async fn delete(&self, repo: &str, number: i64) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        if let Some(entries) = collections.get_mut(repo) {
            entries.retain(|e| e.number != number);
        }
        Ok(())
    }

    async fn reset(&self, repo: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        collections.remove(repo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(number: i64, title: &str) -> EntryMeta {
        EntryMeta {
            number,
            title: title.to_string(),
            category: "bug".to_string(),
            state: "open".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = MemoryIndex::new();
        index
            .upsert("a/b", 1, &[1.0, 0.0], &meta(1, "first"))
            .await
            .unwrap();
        index
            .upsert("a/b", 1, &[0.0, 1.0], &meta(1, "first edited"))
            .await
            .unwrap();

        assert_eq!(index.count("a/b").await.unwrap(), 1);

        // Last write wins: the stored vector is now orthogonal to [1, 0].
        let neighbors = index.query("a/b", &[0.0, 1.0], 5).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].meta.title, "first edited");
        assert!((neighbors[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_repositories_are_isolated() {
        let index = MemoryIndex::new();
        index
            .upsert("a/b", 1, &[1.0, 0.0], &meta(1, "in a/b"))
            .await
            .unwrap();
        index
            .upsert("c/d", 2, &[1.0, 0.0], &meta(2, "in c/d"))
            .await
            .unwrap();

        let neighbors = index.query("c/d", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].meta.number, 2);
        assert_eq!(index.count("a/b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity_and_clamps_k() {
        let index = MemoryIndex::new();
        index
            .upsert("a/b", 1, &[1.0, 0.0], &meta(1, "exact"))
            .await
            .unwrap();
        index
            .upsert("a/b", 2, &[1.0, 1.0], &meta(2, "diagonal"))
            .await
            .unwrap();
        index
            .upsert("a/b", 3, &[0.0, 1.0], &meta(3, "orthogonal"))
            .await
            .unwrap();

        let neighbors = index.query("a/b", &[1.0, 0.0], 100).await.unwrap();
        assert_eq!(neighbors.len(), 3);
        let numbers: Vec<i64> = neighbors.iter().map(|n| n.meta.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(neighbors[0].similarity >= neighbors[1].similarity);
        assert!(neighbors[1].similarity >= neighbors[2].similarity);
    }

    #[tokio::test]
    async fn test_similarity_is_clamped_to_unit_range() {
        let index = MemoryIndex::new();
        index
            .upsert("a/b", 1, &[-1.0, 0.0], &meta(1, "opposite"))
            .await
            .unwrap();

        let neighbors = index.query("a/b", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(neighbors[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_delete_and_reset() {
        let index = MemoryIndex::new();
        index
            .upsert("a/b", 1, &[1.0], &meta(1, "one"))
            .await
            .unwrap();
        index
            .upsert("a/b", 2, &[1.0], &meta(2, "two"))
            .await
            .unwrap();

        index.delete("a/b", 1).await.unwrap();
        assert!(!index.exists("a/b", 1).await.unwrap());
        assert!(index.exists("a/b", 2).await.unwrap());

        index.reset("a/b").await.unwrap();
        assert_eq!(index.count("a/b").await.unwrap(), 0);

        // Deleting from an empty collection is a no-op, not an error.
        index.delete("a/b", 2).await.unwrap();
    }
}
