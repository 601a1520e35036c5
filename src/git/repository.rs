use git2::{ErrorCode, Oid, Repository, Sort};
use std::path::{Path, PathBuf};

use crate::error::DiffError;

use super::types::Commit;

pub struct RepoCache {
    repo: Repository,
    workdir: PathBuf,
}

impl RepoCache {
    pub fn open(path: &Path) -> Result<Self, DiffError> {
        let repo = Repository::discover(path).map_err(|e| {
            DiffError::unavailable(format!(
                "not a git repository (or any parent directory): {}: {e}",
                path.display()
            ))
        })?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| DiffError::unavailable("bare repositories are not supported"))?;
        let workdir = workdir
            .canonicalize()
            .unwrap_or_else(|_| workdir.to_path_buf());
        Ok(Self { repo, workdir })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn head_commit(&self) -> Result<git2::Commit<'_>, DiffError> {
        let head = self
            .repo
            .head()
            .map_err(|e| DiffError::unavailable(format!("cannot resolve HEAD: {e}")))?;
        Ok(head.peel_to_commit()?)
    }

    /// Look up a commit by full or abbreviated hash (or any revspec).
    /// Unknown revisions are `Ok(None)`.
    pub fn find_commit(&self, rev: &str) -> Result<Option<git2::Commit<'_>>, DiffError> {
        let obj = match self.repo.revparse_single(rev) {
            Ok(obj) => obj,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::Ambiguous) => {
                return Ok(None)
            }
            Err(e) if e.class() == git2::ErrorClass::Odb => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match obj.peel_to_commit() {
            Ok(c) => Ok(Some(c)),
            Err(e) if e.code() == ErrorCode::InvalidSpec || e.code() == ErrorCode::Peel => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commits reachable from HEAD that changed `path`, newest first.
    pub fn history_for_file(&self, path: &str, limit: usize) -> Result<Vec<Commit>, DiffError> {
        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let rel = Path::new(path);
        let mut history = Vec::new();
        for oid in walk {
            if history.len() >= limit {
                break;
            }
            let commit = self.repo.find_commit(oid?)?;
            let current = entry_id(&commit.tree()?, rel);
            let touched = if commit.parent_count() == 0 {
                current.is_some()
            } else {
                commit
                    .parents()
                    .map(|p| p.tree().map(|t| entry_id(&t, rel)))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .all(|parent| parent != current)
            };
            if touched {
                history.push(to_commit(&commit));
            }
        }
        Ok(history)
    }

    /// Text of `path` at `commit`, or `None` when the file does not exist there.
    pub fn blob_text(&self, commit: &git2::Commit<'_>, path: &str) -> Result<Option<String>, DiffError> {
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = self.repo.find_blob(entry.id())?;
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }

    /// Repository-relative form of `path`, accepting either an absolute
    /// path inside the work tree or an already-relative one.
    pub fn relative_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.workdir).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}

fn entry_id(tree: &git2::Tree<'_>, path: &Path) -> Option<Oid> {
    tree.get_path(path).ok().map(|e| e.id())
}

pub fn to_commit(commit: &git2::Commit<'_>) -> Commit {
    Commit {
        hash: commit.id().to_string(),
        summary: commit.summary().map(str::to_string),
    }
}
