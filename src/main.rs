mod cli;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use marktrack::config::{self, MarktrackConfig};
use marktrack::git::{
    Commit, CommitHistory, DiffEngine, DiffSource, GitDiffSource, RepoCache,
};
use marktrack::location::{
    CachedLocationStore, FinderContext, LineShiftCalculator, Location, LocationStore,
    LocationsById, Marker, MarkerLocationFinder,
};
use marktrack::logging;

use crate::cli::{Cli, Command};

const MARKER_ID: &str = "cli";
const STREAM_ID: &str = "cli";
const TEAM_ID: &str = "local";

/// Remote side of the location store for one-off runs: nothing is recorded
/// beyond what the command line seeds into the cache.
struct NoRemote;

#[async_trait]
impl LocationStore for NoRemote {
    async fn marker_locations(
        &self,
        _team_id: &str,
        _stream_id: &str,
        _commit_hash: &str,
    ) -> Result<LocationsById> {
        Ok(LocationsById::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().ok();

    let cli = Cli::parse();

    // Load config, apply CLI overrides (CLI wins)
    let mut config = config::load_config();
    if let Some(limit) = cli.limit {
        config.history_limit = limit;
    }
    if cli.no_fetch {
        config.fetch_missing_commits = false;
    }
    logging::init(config.log_filter.as_deref());

    let result = run(cli, config).await;
    if let Err(ref e) = result {
        eprintln!("marktrack: {e:#}");
    }
    result
}

async fn run(cli: Cli, config: MarktrackConfig) -> Result<()> {
    let start = match cli.repo {
        Some(ref path) => path.clone(),
        None => env::current_dir()?,
    };
    let repo = RepoCache::open(&start)?;
    let repo_path = repo.workdir().to_path_buf();
    let source = Arc::new(GitDiffSource::new(&repo_path, config.source_options()));

    match cli.command {
        Command::Deltas { old, new, patch } => {
            let deltas = match (patch, old) {
                (Some(patch), _) => {
                    let text = std::fs::read_to_string(&patch)
                        .with_context(|| format!("reading {}", patch.display()))?;
                    Arc::new(DiffEngine::diff_patch_text(&text)?)
                }
                (None, Some(old)) => {
                    let old_commit = resolve(source.as_ref(), &old).await?;
                    match new {
                        Some(new) => {
                            let new_commit = resolve(source.as_ref(), &new).await?;
                            source.diffs_between(&old_commit, &new_commit).await?
                        }
                        None => source.diffs_for_commit(&old_commit).await?,
                    }
                }
                (None, None) => bail!("either a commit or --patch is required"),
            };
            println!("{}", serde_json::to_string_pretty(&**deltas)?);
        }
        Command::History { path } => {
            let rel = repo.relative_path(&absolute(&path)?);
            let commits = source
                .commit_history_for_file(&rel, config.history_limit)
                .await?;
            let listed: Vec<_> = commits
                .iter()
                .map(|c| json!({ "hash": c.hash, "summary": c.summary }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        Command::Relocate {
            path,
            commit,
            lines: (line_start, line_end),
            buffer,
        } => {
            let rel = repo.relative_path(&absolute(&path)?);
            let recorded_at = resolve(source.as_ref(), &commit).await?;

            let store = Arc::new(CachedLocationStore::new(TEAM_ID, Arc::new(NoRemote)));
            let mut seed = LocationsById::new();
            seed.insert(MARKER_ID.to_string(), Location::lines(line_start, line_end));
            store.record(STREAM_ID, &recorded_at.hash, seed).await?;

            let finder = MarkerLocationFinder::new(
                FinderContext {
                    team_id: TEAM_ID.to_string(),
                    stream_id: STREAM_ID.to_string(),
                    file_path: rel,
                },
                source.clone(),
                source.clone(),
                store,
                Arc::new(LineShiftCalculator),
            )
            .with_history_limit(config.history_limit);

            let marker = Marker::new(MARKER_ID, STREAM_ID, recorded_at.hash.clone());
            let report = finder.locate_markers(&[marker]).await?;
            let buffered = match buffer {
                Some(buffer) => {
                    let text = std::fs::read_to_string(&buffer)
                        .with_context(|| format!("reading buffer {}", buffer.display()))?;
                    let mapped = finder
                        .find_locations_for_uncommitted_changes(&report.locations, &text)
                        .await?;
                    Some(mapped)
                }
                None => None,
            };
            let out = json!({
                "head": report.locations.get(MARKER_ID),
                "missing": report.missing.get(MARKER_ID),
                "buffer": buffered.as_ref().and_then(|b| b.get(MARKER_ID)),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

async fn resolve(source: &GitDiffSource, rev: &str) -> Result<Commit> {
    match source.commit(rev).await? {
        Some(commit) => Ok(commit),
        None => bail!("unknown commit {rev}"),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    // Deleted files can't be canonicalized; keep the joined path for those.
    Ok(joined.canonicalize().unwrap_or(joined))
}
