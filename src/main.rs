//! # Issue Radar CLI (`ir`)
//!
//! The `ir` binary is the primary interface for Issue Radar. It provides
//! commands for database initialization, repository syncing, issue
//! analysis, and repository management.
//!
//! ## Usage
//!
//! ```bash
//! ir --config ./config/ir.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ir init` | Create the SQLite database and run schema migrations |
//! | `ir sync <owner/repo>` | Fetch and analyze a repository's issues |
//! | `ir analyze <owner/repo> <number>` | Show the analysis for one issue |
//! | `ir similar <owner/repo> <number>` | List the closest existing issues |
//! | `ir repos` | List synced repositories |
//! | `ir delete <owner/repo>` | Remove a repository and its analyses |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! ir init --config ./config/ir.toml
//!
//! # Sync a repository incrementally
//! ir sync rust-lang/cargo
//!
//! # Force a full resync
//! ir sync rust-lang/cargo --full
//!
//! # Duplicate classification for one issue
//! ir analyze rust-lang/cargo 1234
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use issue_radar::config::{self, Config};
use issue_radar::db;
use issue_radar::embedding::{create_backend, IssueEmbedder};
use issue_radar::github::GithubSource;
use issue_radar::index::sqlite::SqliteIndex;
use issue_radar::migrate;
use issue_radar::models::IssueAnalysis;
use issue_radar::store::MetaStore;
use issue_radar::sync::Analyzer;

/// Issue Radar CLI — duplicate and similarity analysis for GitHub issue
/// trackers.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ir.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ir",
    about = "Issue Radar — duplicate and similarity analysis for GitHub issue trackers",
    version,
    long_about = "Issue Radar syncs a repository's issues, categorizes and embeds each one, \
    and classifies every issue against its nearest neighbors in a per-repository vector index: \
    duplicate, related, or new, plus reuse advice pointing at the closest existing issues."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ir.toml`. Database, embedding, GitHub, and
    /// analysis settings are read from this file.
    #[arg(long, global = true, default_value = "./config/ir.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (repositories, issues, issue_vectors). This command is idempotent —
    /// running it multiple times is safe.
    Init,

    /// Fetch and analyze a repository's issues.
    ///
    /// Pulls issues from GitHub (incrementally, unless `--full`), runs each
    /// through the categorize + embed + classify pipeline, and persists the
    /// results. At most one sync runs per repository at a time.
    Sync {
        /// Repository in `owner/name` form, e.g. `rust-lang/cargo`.
        repo: String,

        /// Ignore the incremental checkpoint and freshness window —
        /// refetch and reanalyze every issue from scratch.
        #[arg(long)]
        full: bool,
    },

    /// Show the stored analysis for one issue.
    ///
    /// Prints the category, duplicate classification, confidence, reuse
    /// advice, and similar issues. Requires the repository to have been
    /// synced first.
    Analyze {
        /// Repository in `owner/name` form.
        repo: String,
        /// Issue number.
        number: i64,
    },

    /// List the closest existing issues to one issue.
    Similar {
        /// Repository in `owner/name` form.
        repo: String,
        /// Issue number.
        number: i64,
    },

    /// List synced repositories with status and issue counts.
    Repos,

    /// Remove a repository, its issues, and its vector collection.
    Delete {
        /// Repository in `owner/name` form.
        repo: String,
    },
}

/// Split `owner/name` into its two parts.
fn split_repo(repo: &str) -> Result<(&str, &str)> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => bail!("repository must be in owner/name form, got '{repo}'"),
    }
}

fn build_analyzer(cfg: &Config, pool: sqlx::SqlitePool) -> Result<Analyzer> {
    let backend = create_backend(&cfg.embedding)?;
    let embedder = IssueEmbedder::new(backend);
    let index = Arc::new(SqliteIndex::new(pool.clone()));
    let store = MetaStore::new(pool);
    let source = Arc::new(GithubSource::new(&cfg.github)?);
    Ok(Analyzer::new(
        embedder,
        index,
        store,
        source,
        cfg.analysis.neighbors,
    ))
}

fn print_analysis(repo: &str, number: i64, analysis: &IssueAnalysis) {
    println!("{repo}#{number}");
    println!("  category:       {}", analysis.category);
    if analysis.categories.len() > 1 {
        println!("  also:           {}", analysis.categories[1..].join(", "));
    }
    println!(
        "  classification: {} (confidence {:.2})",
        analysis.classification.as_str(),
        analysis.confidence
    );
    println!("  criticality:    {}", analysis.criticality.as_str());
    println!("  reuse advice:   {}", analysis.reuse.as_str());
    if analysis.similar_issues.is_empty() {
        println!("  similar issues: none");
    } else {
        println!("  similar issues:");
        for similar in &analysis.similar_issues {
            println!(
                "    #{:<6} {:.3}  {}",
                similar.number, similar.similarity, similar.title
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;

    match cli.command {
        Commands::Init => {
            // Migrations already ran above; this just confirms.
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Sync { repo, full } => {
            let (owner, name) = split_repo(&repo)?;
            let analyzer = build_analyzer(&cfg, pool.clone())?;

            if !full
                && analyzer
                    .store()
                    .is_fresh(owner, name, cfg.analysis.freshness_secs as i64)
                    .await?
            {
                println!("{repo} was synced recently; use --full to force a resync.");
                return Ok(());
            }

            let report = analyzer.sync_repository(owner, name, full).await?;
            if report.skipped {
                println!("A sync for {repo} is already in progress; skipped.");
            } else {
                println!(
                    "Synced {repo}: {} analyzed, {} failed, {} fetched.",
                    report.synced, report.failed, report.total_fetched
                );
            }
        }
        Commands::Analyze { repo, number } => {
            let (owner, name) = split_repo(&repo)?;
            let analyzer = build_analyzer(&cfg, pool.clone())?;

            let Some(stored) = analyzer.store().get_issue(owner, name, number).await? else {
                bail!("issue {repo}#{number} is not cached; run `ir sync {repo}` first");
            };
            let analysis = match stored.analysis {
                Some(analysis) => analysis,
                None => {
                    analyzer
                        .analyze_issue(owner, name, number, &stored.title, &stored.body)
                        .await?
                }
            };
            print_analysis(&repo, number, &analysis);
        }
        Commands::Similar { repo, number } => {
            let (owner, name) = split_repo(&repo)?;
            let analyzer = build_analyzer(&cfg, pool.clone())?;

            let Some(stored) = analyzer.store().get_issue(owner, name, number).await? else {
                bail!("issue {repo}#{number} is not cached; run `ir sync {repo}` first");
            };
            let analysis = match stored.analysis {
                Some(analysis) => analysis,
                None => {
                    analyzer
                        .analyze_issue(owner, name, number, &stored.title, &stored.body)
                        .await?
                }
            };

            if analysis.similar_issues.is_empty() {
                println!("No similar issues found for {repo}#{number}.");
            } else {
                println!("{:<8} {:<10} TITLE", "NUMBER", "SIMILARITY");
                for similar in &analysis.similar_issues {
                    println!(
                        "#{:<7} {:<10.3} {}",
                        similar.number, similar.similarity, similar.title
                    );
                }
            }
        }
        Commands::Repos => {
            let store = MetaStore::new(pool.clone());
            let repos = store.list_repositories().await?;
            if repos.is_empty() {
                println!("No repositories synced yet.");
            } else {
                println!("{:<32} {:<10} {:<8} LAST SYNCED", "REPOSITORY", "STATUS", "ISSUES");
                for repo in repos {
                    let last_synced = repo
                        .last_synced
                        .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<32} {:<10} {:<8} {}",
                        format!("{}/{}", repo.owner, repo.name),
                        repo.status,
                        repo.issue_count,
                        last_synced
                    );
                }
            }
        }
        Commands::Delete { repo } => {
            let (owner, name) = split_repo(&repo)?;
            let analyzer = build_analyzer(&cfg, pool.clone())?;
            let deleted = analyzer.delete_repository(owner, name).await?;
            println!("Deleted {repo} ({deleted} issues removed).");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::split_repo;

    #[test]
    fn test_split_repo() {
        assert_eq!(split_repo("rust-lang/cargo").unwrap(), ("rust-lang", "cargo"));
        assert!(split_repo("no-slash").is_err());
        assert!(split_repo("/name").is_err());
        assert!(split_repo("owner/").is_err());
    }
}
