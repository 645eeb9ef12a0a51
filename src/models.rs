//! Core data models used throughout Issue Radar.
//!
//! These types represent the issues, analysis results, and sync reports that
//! flow through the categorize → embed → index → classify pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw issue as returned by the issue source, before any analysis.
///
/// Deserializes directly from the GitHub REST issue shape; fields this
/// system does not consume are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIssue {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl RawIssue {
    /// Body text with the `null` body GitHub sends for empty issues
    /// flattened to `""`.
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// An issue label. Only the name is carried; colors and descriptions are
/// presentation concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Three-way classification of an issue relative to prior issues in the
/// same repository.
///
/// The derived ordering is the severity ordering: `New < Related < Duplicate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    New,
    Related,
    Duplicate,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Related => "related",
            Classification::Duplicate => "duplicate",
        }
    }
}

/// Criticality label derived from the best-neighbor similarity.
///
/// `Unknown` is reserved for fallback results produced when the embedding
/// or index backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Unknown,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Low => "low",
            Criticality::Medium => "medium",
            Criticality::High => "high",
            Criticality::Unknown => "unknown",
        }
    }
}

/// How much of a prior issue's solution is expected to carry over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseAdvice {
    Minimal,
    Reference,
    Adapt,
    Direct,
}

impl ReuseAdvice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReuseAdvice::Minimal => "minimal",
            ReuseAdvice::Reference => "reference",
            ReuseAdvice::Adapt => "adapt",
            ReuseAdvice::Direct => "direct",
        }
    }
}

/// A prior issue surfaced as similar to the one under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIssue {
    pub number: i64,
    pub title: String,
    /// Similarity in [0, 1], 1 = identical. Rounded to 3 decimals.
    pub similarity: f64,
}

/// Composite analysis result for one issue. Persisted as JSON in the
/// metadata store and overwritten on every resync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueAnalysis {
    /// Primary category from the rule-based categorizer.
    pub category: String,
    /// All categories scoring within the multi-label threshold.
    pub categories: Vec<String>,
    /// Categorizer confidence in [0, 1].
    pub category_confidence: f64,
    pub classification: Classification,
    pub criticality: Criticality,
    /// Best-neighbor similarity, rounded to 2 decimals. 0.0 when there was
    /// nothing to compare against.
    pub confidence: f64,
    pub reuse: ReuseAdvice,
    pub similar_issues: Vec<SimilarIssue>,
}

impl IssueAnalysis {
    /// The defined fallback result returned when the embedding or index
    /// backend fails during a single-issue analysis. Callers receive this
    /// shape instead of an error.
    pub fn unknown() -> Self {
        Self {
            category: "unknown".to_string(),
            categories: Vec::new(),
            category_confidence: 0.0,
            classification: Classification::New,
            criticality: Criticality::Unknown,
            confidence: 0.0,
            reuse: ReuseAdvice::Minimal,
            similar_issues: Vec::new(),
        }
    }
}

/// An issue as persisted in the metadata store, with its cached analysis.
#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub analysis: Option<IssueAnalysis>,
}

/// Outcome of one `sync_repository` pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Issues fully processed and persisted.
    pub synced: u64,
    /// Issues that failed mid-pipeline and were skipped.
    pub failed: u64,
    /// Issues returned by the issue source before processing.
    pub total_fetched: u64,
    /// True when the pass was a no-op because a sync was already in flight.
    pub skipped: bool,
}

impl SyncReport {
    /// Report for a sync request rejected by the single-flight guard.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Per-repository summary for the `repos` listing.
#[derive(Debug, Clone)]
pub struct RepoSummary {
    pub owner: String,
    pub name: String,
    pub status: String,
    pub issue_count: i64,
    pub last_synced: Option<DateTime<Utc>>,
}
