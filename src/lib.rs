//! # Issue Radar
//!
//! Duplicate and similarity analysis for GitHub issue trackers.
//!
//! Issue Radar syncs a repository's issues, categorizes each one with a
//! keyword model, embeds category-tagged issue text, and classifies every
//! issue against its nearest neighbors in a per-repository vector index:
//! duplicate, related, or new, plus reuse advice pointing at the closest
//! existing issues.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//! │  GitHub  │──▶│ Categorize │──▶│   Embed   │──▶│  SQLite  │
//! │  issues  │   │  keywords  │   │ + index   │   │ meta+vec │
//! └──────────┘   └────────────┘   └─────┬─────┘   └────┬─────┘
//!                                       │              │
//!                                       ▼              ▼
//!                                 ┌───────────┐  ┌──────────┐
//!                                 │ Classify  │  │   CLI    │
//!                                 │ neighbors │  │   (ir)   │
//!                                 └───────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ir init                          # create database
//! ir sync rust-lang/cargo          # fetch and analyze issues
//! ir analyze rust-lang/cargo 1234  # classification for one issue
//! ir similar rust-lang/cargo 1234  # closest existing issues
//! ir repos                         # synced repositories
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`categorize`] | Keyword-based issue categorization |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Per-repository vector index |
//! | [`classify`] | Similarity thresholds and verdicts |
//! | [`github`] | GitHub issue source |
//! | [`store`] | Repository and issue metadata store |
//! | [`sync`] | Sync and analysis orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod categorize;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod github;
pub mod index;
pub mod migrate;
pub mod models;
pub mod store;
pub mod sync;
