use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::DiffError;

use super::commands::GitCli;
use super::diff::{DiffEngine, EngineOptions};
use super::repository::{to_commit, RepoCache};
use super::types::{Commit, Delta};

/// Commit lookups needed by the location finder.
#[async_trait]
pub trait CommitHistory: Send + Sync {
    async fn current_commit(&self) -> Result<Commit, DiffError>;

    /// Resolve a commit by hash. Unknown commits are `Ok(None)`.
    async fn commit(&self, hash: &str) -> Result<Option<Commit>, DiffError>;

    /// Commits that touched `path`, newest first, at most `limit`.
    async fn commit_history_for_file(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, DiffError>;
}

/// Produces deltas between revisions, or between a revision and a buffer.
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn diffs_between(&self, old: &Commit, new: &Commit) -> Result<Arc<Vec<Delta>>, DiffError>;

    /// Diff of `commit` against its sole parent.
    async fn diffs_for_commit(&self, commit: &Commit) -> Result<Arc<Vec<Delta>>, DiffError>;

    /// Diff of `path` from its blob at the current commit to `text`.
    async fn diff_for_buffer(&self, path: &str, text: &str) -> Result<Delta, DiffError>;

    async fn diff_for_texts(&self, path: &str, old: &str, new: &str) -> Result<Delta, DiffError> {
        DiffEngine::diff_texts(path, old, new, 3)
    }
}

#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub engine: EngineOptions,
    /// Run `git fetch` once when a commit is not found locally.
    pub fetch_missing_commits: bool,
    pub remote: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            fetch_missing_commits: true,
            remote: "origin".to_string(),
        }
    }
}

type DeltaCache = HashMap<(String, String), Arc<Vec<Delta>>>;

/// [`CommitHistory`] and [`DiffSource`] over a local repository.
///
/// git2 handles aren't `Sync`, so every call opens the repository inside a
/// blocking task. Commit-pair results are cached for the lifetime of the
/// source.
pub struct GitDiffSource {
    repo_path: PathBuf,
    options: SourceOptions,
    deltas: Mutex<DeltaCache>,
    fetched: AtomicBool,
}

impl GitDiffSource {
    pub fn new(repo_path: &Path, options: SourceOptions) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            options,
            deltas: Mutex::new(HashMap::new()),
            fetched: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, DiffError>
    where
        T: Send + 'static,
        F: FnOnce(&RepoCache) -> Result<T, DiffError> + Send + 'static,
    {
        let path = self.repo_path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = RepoCache::open(&path)?;
            f(&repo)
        })
        .await?
    }

    fn cached(&self, key: &(String, String)) -> Option<Arc<Vec<Delta>>> {
        self.deltas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn remember(&self, key: (String, String), deltas: Vec<Delta>) -> Arc<Vec<Delta>> {
        let deltas = Arc::new(deltas);
        self.deltas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, deltas.clone());
        deltas
    }

    pub fn cached_pairs(&self) -> usize {
        self.deltas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CommitHistory for GitDiffSource {
    async fn current_commit(&self) -> Result<Commit, DiffError> {
        self.blocking(|repo| Ok(to_commit(&repo.head_commit()?)))
            .await
    }

    async fn commit(&self, hash: &str) -> Result<Option<Commit>, DiffError> {
        let rev = hash.to_string();
        let found = self
            .blocking(move |repo| Ok(repo.find_commit(&rev)?.map(|c| to_commit(&c))))
            .await?;
        if found.is_some() || !self.options.fetch_missing_commits {
            return Ok(found);
        }
        // Only the first miss pays for a fetch.
        if self.fetched.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let remote = self.options.remote.clone();
        let rev = hash.to_string();
        tracing::debug!(commit = %hash, %remote, "commit not found locally - fetching");
        self.blocking(move |repo| {
            if let Err(e) = GitCli::new(repo.workdir()).fetch(&remote) {
                tracing::warn!(error = %format!("{e:#}"), "fetch failed");
                return Ok(None);
            }
            Ok(repo.find_commit(&rev)?.map(|c| to_commit(&c)))
        })
        .await
    }

    async fn commit_history_for_file(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, DiffError> {
        let path = path.to_string();
        self.blocking(move |repo| repo.history_for_file(&path, limit))
            .await
    }
}

#[async_trait]
impl DiffSource for GitDiffSource {
    async fn diffs_between(&self, old: &Commit, new: &Commit) -> Result<Arc<Vec<Delta>>, DiffError> {
        let key = (old.hash.clone(), new.hash.clone());
        if let Some(hit) = self.cached(&key) {
            tracing::trace!(old = old.short_hash(), new = new.short_hash(), "delta cache hit");
            return Ok(hit);
        }

        let (old_hash, new_hash) = key.clone();
        let engine = self.options.engine.clone();
        let deltas = self
            .blocking(move |repo| {
                let old = repo
                    .find_commit(&old_hash)?
                    .ok_or_else(|| DiffError::unavailable(format!("unknown commit {old_hash}")))?;
                let new = repo
                    .find_commit(&new_hash)?
                    .ok_or_else(|| DiffError::unavailable(format!("unknown commit {new_hash}")))?;
                DiffEngine::diff_commits(repo.repo(), Some(&old), &new, &engine)
            })
            .await?;
        Ok(self.remember(key, deltas))
    }

    async fn diffs_for_commit(&self, commit: &Commit) -> Result<Arc<Vec<Delta>>, DiffError> {
        let hash = commit.hash.clone();
        // Root commits diff against the empty tree, keyed by an empty parent.
        let parent = self
            .blocking(move |repo| {
                let commit = repo
                    .find_commit(&hash)?
                    .ok_or_else(|| DiffError::unavailable(format!("unknown commit {hash}")))?;
                match commit.parent_count() {
                    0 => Ok(String::new()),
                    1 => Ok(commit.parent_id(0)?.to_string()),
                    n => Err(DiffError::unavailable(format!(
                        "commit {hash} has {n} parents"
                    ))),
                }
            })
            .await?;

        let key = (parent, commit.hash.clone());
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let (parent_hash, hash) = key.clone();
        let engine = self.options.engine.clone();
        let deltas = self
            .blocking(move |repo| {
                let commit = repo
                    .find_commit(&hash)?
                    .ok_or_else(|| DiffError::unavailable(format!("unknown commit {hash}")))?;
                let parent = if parent_hash.is_empty() {
                    None
                } else {
                    Some(commit.parent(0)?)
                };
                DiffEngine::diff_commits(repo.repo(), parent.as_ref(), &commit, &engine)
            })
            .await?;
        Ok(self.remember(key, deltas))
    }

    async fn diff_for_buffer(&self, path: &str, text: &str) -> Result<Delta, DiffError> {
        let rel = path.to_string();
        let committed = self
            .blocking(move |repo| {
                let head = repo.head_commit()?;
                repo.blob_text(&head, &rel)
            })
            .await?
            .ok_or_else(|| DiffError::unavailable(format!("{path} does not exist at HEAD")))?;
        DiffEngine::diff_texts(
            path,
            &committed,
            text,
            self.options.engine.context_lines as usize,
        )
    }

    async fn diff_for_texts(&self, path: &str, old: &str, new: &str) -> Result<Delta, DiffError> {
        DiffEngine::diff_texts(path, old, new, self.options.engine.context_lines as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::types::edits_for_path;
    use git2::{Repository, Signature};
    use std::fs;
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, dir: &Path, rel: &str, text: &str, msg: &str) -> String {
        let full = dir.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, text).unwrap();
        let mut index = repo.index().unwrap();
        index.add_all(["*"], git2::IndexAddOption::DEFAULT, None).unwrap();
        index.update_all(["*"], None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs)
            .unwrap()
            .to_string()
    }

    fn no_fetch() -> SourceOptions {
        SourceOptions {
            fetch_missing_commits: false,
            ..SourceOptions::default()
        }
    }

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    #[tokio::test]
    async fn test_history_and_current_commit() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let c1 = commit_file(&repo, dir.path(), "a.txt", "one\n", "c1");
        let _c2 = commit_file(&repo, dir.path(), "b.txt", "other\n", "c2");
        let c3 = commit_file(&repo, dir.path(), "a.txt", "one\ntwo\n", "c3");

        let source = GitDiffSource::new(dir.path(), no_fetch());
        assert_eq!(source.current_commit().await.unwrap().hash, c3);

        let history = source.commit_history_for_file("a.txt", 10).await.unwrap();
        let hashes: Vec<_> = history.iter().map(|c| c.hash.clone()).collect();
        assert_eq!(hashes, vec![c3.clone(), c1]);

        let limited = source.commit_history_for_file("a.txt", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].hash, c3);
    }

    #[tokio::test]
    async fn test_unknown_commit_is_none() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, dir.path(), "a.txt", "one\n", "c1");

        let source = GitDiffSource::new(dir.path(), no_fetch());
        let missing = source
            .commit("0123456789abcdef0123456789abcdef01234567")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_diffs_between_is_cached() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let c1 = commit_file(&repo, dir.path(), "a.txt", &numbered(10), "c1");
        let c2 = commit_file(
            &repo,
            dir.path(),
            "a.txt",
            &numbered(10).replace("line 5\n", "line five\n"),
            "c2",
        );

        let source = GitDiffSource::new(dir.path(), no_fetch());
        let (old, new) = (Commit::new(&c1), Commit::new(&c2));
        let first = source.diffs_between(&old, &new).await.unwrap();
        let second = source.diffs_between(&old, &new).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.cached_pairs(), 1);

        let edits = edits_for_path(&first, "a.txt");
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].del_start, 5);
        assert_eq!(edits[0].dels, vec!["line 5"]);
        assert_eq!(edits[0].adds, vec!["line five"]);
    }

    #[tokio::test]
    async fn test_diffs_between_unknown_commit_fails() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let c1 = commit_file(&repo, dir.path(), "a.txt", "x\n", "c1");

        let source = GitDiffSource::new(dir.path(), no_fetch());
        let err = source
            .diffs_between(
                &Commit::new("0123456789abcdef0123456789abcdef01234567"),
                &Commit::new(c1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DiffError::DiffUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_rename_with_modification_is_detected() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let body = numbered(20);
        let c1 = commit_file(&repo, dir.path(), "old_name.txt", &body, "c1");
        fs::remove_file(dir.path().join("old_name.txt")).unwrap();
        let c2 = commit_file(
            &repo,
            dir.path(),
            "new_name.txt",
            &body.replace("line 3\n", "line three\n"),
            "rename",
        );

        let source = GitDiffSource::new(dir.path(), no_fetch());
        let deltas = source
            .diffs_between(&Commit::new(c1), &Commit::new(c2))
            .await
            .unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].old_file, "old_name.txt");
        assert_eq!(deltas[0].new_file, "new_name.txt");
        assert_eq!(deltas[0].edits.len(), 1);
        assert_eq!(deltas[0].edits[0].del_start, 3);
    }

    #[tokio::test]
    async fn test_diffs_for_commit_against_parent_and_root() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let c1 = commit_file(&repo, dir.path(), "a.txt", "a\nb\n", "c1");
        let c2 = commit_file(&repo, dir.path(), "a.txt", "a\nB\n", "c2");

        let source = GitDiffSource::new(dir.path(), no_fetch());
        let root = source.diffs_for_commit(&Commit::new(c1)).await.unwrap();
        assert_eq!(root[0].edits[0].add_length, 2);

        let second = source.diffs_for_commit(&Commit::new(c2)).await.unwrap();
        assert_eq!(second[0].edits[0].del_start, 2);
        assert_eq!(second[0].edits[0].adds, vec!["B"]);
    }

    #[tokio::test]
    async fn test_diff_for_buffer_against_head() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, dir.path(), "src/x.rs", "fn a() {}\nfn b() {}\n", "c1");

        let source = GitDiffSource::new(dir.path(), no_fetch());
        let unchanged = source
            .diff_for_buffer("src/x.rs", "fn a() {}\r\nfn b() {}")
            .await
            .unwrap();
        assert!(unchanged.edits.is_empty());

        let edited = source
            .diff_for_buffer("src/x.rs", "// header\nfn a() {}\nfn b() {}\n")
            .await
            .unwrap();
        assert_eq!(edited.edits.len(), 1);
        assert_eq!(edited.edits[0].add_start, 1);
        assert_eq!(edited.edits[0].del_length, 0);

        let missing = source.diff_for_buffer("nope.rs", "x").await;
        assert!(matches!(missing, Err(DiffError::DiffUnavailable { .. })));
    }
}
