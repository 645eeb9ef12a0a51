//! Sync and analysis orchestration.
//!
//! [`Analyzer`] wires the pipeline together: fetch issues from the source,
//! categorize, embed, upsert into the vector index, query neighbors, and
//! persist the resulting analysis. One instance serves both batch sync and
//! one-off analysis queries.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::categorize::Categorizer;
use crate::classify::evaluate_neighbors;
use crate::embedding::IssueEmbedder;
use crate::github::IssueSource;
use crate::index::{repo_slug, EntryMeta, VectorIndex};
use crate::models::{Classification, IssueAnalysis, RawIssue, SyncReport};
use crate::store::MetaStore;

pub struct Analyzer {
    embedder: IssueEmbedder,
    index: Arc<dyn VectorIndex>,
    store: MetaStore,
    source: Arc<dyn IssueSource>,
    categorizer: Categorizer,
    neighbor_k: usize,
}

impl Analyzer {
    pub fn new(
        embedder: IssueEmbedder,
        index: Arc<dyn VectorIndex>,
        store: MetaStore,
        source: Arc<dyn IssueSource>,
        neighbor_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            source,
            categorizer: Categorizer::new(),
            neighbor_k,
        }
    }

    pub fn store(&self) -> &MetaStore {
        &self.store
    }

    /// Sync a repository: fetch issues, analyze each, persist everything.
    ///
    /// At most one sync runs per repository at a time; a second caller gets
    /// a skipped report instead of an error. Individual issue failures are
    /// counted and logged but do not abort the run. A fetch failure
    /// releases the lock without advancing the incremental checkpoint.
    pub async fn sync_repository(
        &self,
        owner: &str,
        repo: &str,
        force_full: bool,
    ) -> Result<SyncReport> {
        if !self.store.try_begin_sync(owner, repo).await? {
            info!(owner, repo, "sync already in progress, skipping");
            return Ok(SyncReport::skipped());
        }

        let since = if force_full {
            None
        } else {
            self.store
                .get_sync_state(owner, repo)
                .await?
                .and_then(|s| s.last_synced)
        };

        info!(owner, repo, ?since, "starting sync");

        let issues = match self.source.fetch_issues(owner, repo, since).await {
            Ok(issues) => issues,
            Err(e) => {
                // The fetch error is what the caller needs to see; a lock
                // release failure on top of it is only logged.
                if let Err(release_err) = self.store.finish_sync(owner, repo, None).await {
                    warn!(owner, repo, error = %release_err, "failed to release sync lock");
                }
                return Err(e).context("issue fetch failed");
            }
        };

        let total_fetched = issues.len() as u64;
        let mut synced = 0;
        let mut failed = 0;

        for issue in &issues {
            match self.process_issue(owner, repo, issue).await {
                Ok(()) => synced += 1,
                Err(e) => {
                    warn!(owner, repo, number = issue.number, error = %e, "issue failed");
                    failed += 1;
                }
            }
        }

        self.store.finish_sync(owner, repo, Some(Utc::now())).await?;
        info!(owner, repo, synced, failed, total_fetched, "sync complete");

        Ok(SyncReport {
            synced,
            failed,
            total_fetched,
            skipped: false,
        })
    }

    /// Analyze one issue end to end and persist both the vector and the
    /// analysis. The issue's own entry is upserted before the neighbor
    /// query; self-matches are excluded downstream.
    async fn process_issue(&self, owner: &str, repo: &str, issue: &RawIssue) -> Result<()> {
        let slug = repo_slug(owner, repo);
        let body = issue.body_text();
        let cat = self.categorizer.categorize(&issue.title, body);

        let embedding = self
            .embedder
            .embed_issue_with_category(&issue.title, body, cat.primary)
            .await?;

        self.index
            .upsert(
                &slug,
                issue.number,
                &embedding,
                &EntryMeta {
                    number: issue.number,
                    title: issue.title.clone(),
                    category: cat.primary.as_str().to_string(),
                    state: issue.state.clone(),
                },
            )
            .await?;

        // k + 1 because the issue's own fresh entry is among the results.
        let neighbors = self
            .index
            .query(&slug, &embedding, self.neighbor_k + 1)
            .await?;
        let collection_size = self.index.count(&slug).await?;
        let verdict = evaluate_neighbors(issue.number, &issue.title, &neighbors, collection_size);

        let analysis = IssueAnalysis {
            category: cat.primary.as_str().to_string(),
            categories: cat.categories.iter().map(|c| c.as_str().to_string()).collect(),
            category_confidence: cat.confidence,
            classification: verdict.classification,
            criticality: verdict.criticality,
            confidence: verdict.confidence,
            reuse: verdict.reuse,
            similar_issues: verdict.similar_issues,
        };

        self.store
            .upsert_issue_analysis(owner, repo, issue, &analysis)
            .await
    }

    /// Analyze an issue against the current index without persisting
    /// anything. Embedding and index failures degrade to the unknown
    /// analysis rather than erroring, so a flaky backend cannot take the
    /// query path down.
    pub async fn analyze_issue(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        title: &str,
        body: &str,
    ) -> Result<IssueAnalysis> {
        let slug = repo_slug(owner, repo);
        let cat = self.categorizer.categorize(title, body);

        let embedding = match self
            .embedder
            .embed_issue_with_category(title, body, cat.primary)
            .await
        {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(owner, repo, number, error = %e, "embedding failed, degrading");
                return Ok(IssueAnalysis::unknown());
            }
        };

        let queried = match self.index.query(&slug, &embedding, self.neighbor_k + 1).await {
            Ok(neighbors) => match self.index.count(&slug).await {
                Ok(collection_size) => Some((neighbors, collection_size)),
                Err(e) => {
                    warn!(owner, repo, number, error = %e, "index count failed, degrading");
                    None
                }
            },
            Err(e) => {
                warn!(owner, repo, number, error = %e, "index query failed, degrading");
                None
            }
        };
        let Some((neighbors, collection_size)) = queried else {
            return Ok(IssueAnalysis::unknown());
        };
        let verdict = evaluate_neighbors(number, title, &neighbors, collection_size);

        Ok(IssueAnalysis {
            category: cat.primary.as_str().to_string(),
            categories: cat.categories.iter().map(|c| c.as_str().to_string()).collect(),
            category_confidence: cat.confidence,
            classification: verdict.classification,
            criticality: verdict.criticality,
            confidence: verdict.confidence,
            reuse: verdict.reuse,
            similar_issues: verdict.similar_issues,
        })
    }

    /// Duplicate status for a stored issue. Prefers the cached analysis;
    /// falls back to a live query when the issue was stored without one.
    pub async fn is_duplicate_of(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Classification> {
        let Some(stored) = self.store.get_issue(owner, repo, number).await? else {
            bail!("issue {owner}/{repo}#{number} is not cached; run a sync first");
        };

        if let Some(analysis) = stored.analysis {
            return Ok(analysis.classification);
        }

        let analysis = self
            .analyze_issue(owner, repo, number, &stored.title, &stored.body)
            .await?;
        Ok(analysis.classification)
    }

    /// Remove a repository's issues, metadata, and vector collection.
    /// Returns the number of issues deleted.
    pub async fn delete_repository(&self, owner: &str, repo: &str) -> Result<u64> {
        let deleted = self.store.delete_repository(owner, repo).await?;
        self.index.reset(&repo_slug(owner, repo)).await?;
        info!(owner, repo, deleted, "repository deleted");
        Ok(deleted)
    }
}
