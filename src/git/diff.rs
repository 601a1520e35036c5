use git2::{DiffFindOptions, DiffOptions, Repository};
use similar::{ChangeTag, TextDiff};

use crate::error::DiffError;

use super::delta::DeltaBuilder;
use super::types::{Delta, Patch, PatchHunk};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Similarity percentage at which an add/delete pair counts as a rename.
    pub rename_threshold: u16,
    pub context_lines: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            rename_threshold: 50,
            context_lines: 3,
        }
    }
}

pub struct DiffEngine;

impl DiffEngine {
    /// Deltas between two commits, or from the empty tree when `old` is `None`.
    /// Rename detection runs before the patches are enumerated.
    pub fn diff_commits(
        repo: &Repository,
        old: Option<&git2::Commit<'_>>,
        new: &git2::Commit<'_>,
        options: &EngineOptions,
    ) -> Result<Vec<Delta>, DiffError> {
        let mut diff_opts = DiffOptions::new();
        diff_opts.context_lines(options.context_lines);

        let old_tree = match old {
            Some(c) => Some(c.tree()?),
            None => None,
        };
        let new_tree = new.tree()?;
        let mut diff =
            repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut diff_opts))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts
            .renames(true)
            .rename_threshold(options.rename_threshold);
        diff.find_similar(Some(&mut find_opts))?;

        Self::collect_deltas(&diff)
    }

    /// Deltas described by unified diff text, e.g. saved `git diff` output.
    /// libgit2 does the parsing; malformed input is a [`DiffError::Git`].
    pub fn diff_patch_text(text: &str) -> Result<Vec<Delta>, DiffError> {
        let diff = git2::Diff::from_buffer(text.as_bytes())?;
        Self::collect_deltas(&diff)
    }

    fn collect_deltas(diff: &git2::Diff<'_>) -> Result<Vec<Delta>, DiffError> {
        let mut deltas = Vec::new();
        for idx in 0..diff.deltas().len() {
            let Some(patch) = git2::Patch::from_diff(diff, idx)? else {
                continue;
            };
            let delta = patch.delta();
            if delta.flags().is_binary() {
                continue;
            }
            let mut old_file_name = path_of(delta.old_file().path());
            let mut new_file_name = path_of(delta.new_file().path());
            // Parsed patches leave the /dev/null side of an add or delete unset.
            if old_file_name.is_empty() {
                old_file_name = new_file_name.clone();
            } else if new_file_name.is_empty() {
                new_file_name = old_file_name.clone();
            }

            let mut hunks = Vec::with_capacity(patch.num_hunks());
            for h in 0..patch.num_hunks() {
                let (hunk, line_count) = patch.hunk(h)?;
                let mut lines = Vec::with_capacity(line_count);
                for l in 0..line_count {
                    let line = patch.line_in_hunk(h, l)?;
                    let tag = match line.origin() {
                        ' ' | '+' | '-' => line.origin(),
                        // end-of-file newline markers
                        '=' | '>' | '<' => '\\',
                        _ => continue,
                    };
                    let content = String::from_utf8_lossy(line.content());
                    lines.push(format!("{tag}{}", trim_eol(&content)));
                }
                hunks.push(PatchHunk {
                    old_start: hunk.old_start(),
                    old_lines: hunk.old_lines(),
                    new_start: hunk.new_start(),
                    new_lines: hunk.new_lines(),
                    lines,
                });
            }

            deltas.push(DeltaBuilder::build_delta(&Patch {
                old_file_name,
                new_file_name,
                hunks,
            })?);
        }
        Ok(deltas)
    }

    /// Delta between two in-memory texts of the same file. Both sides are
    /// line-ending normalized first.
    pub fn diff_texts(
        path: &str,
        old_text: &str,
        new_text: &str,
        context_lines: usize,
    ) -> Result<Delta, DiffError> {
        let old_norm = normalize_text(old_text);
        let new_norm = normalize_text(new_text);
        // A missing final newline is not a change; trailing blank lines are.
        let old_lines: Vec<&str> = old_norm.split_terminator('\n').collect();
        let new_lines: Vec<&str> = new_norm.split_terminator('\n').collect();
        let diff = TextDiff::from_slices(&old_lines, &new_lines);

        let mut hunks = Vec::new();
        for group in diff.grouped_ops(context_lines) {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;
            let old_count = old_range.len() as u32;
            let new_count = new_range.len() as u32;

            let mut lines = Vec::new();
            for op in &group {
                for change in diff.iter_changes(op) {
                    let tag = match change.tag() {
                        ChangeTag::Equal => ' ',
                        ChangeTag::Delete => '-',
                        ChangeTag::Insert => '+',
                    };
                    lines.push(format!("{tag}{}", change.value()));
                }
            }

            hunks.push(PatchHunk {
                old_start: unified_start(old_range.start, old_count),
                old_lines: old_count,
                new_start: unified_start(new_range.start, new_count),
                new_lines: new_count,
                lines,
            });
        }

        DeltaBuilder::build_delta(&Patch {
            old_file_name: path.to_string(),
            new_file_name: path.to_string(),
            hunks,
        })
    }
}

/// CRLF and lone CR become LF.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// Unified diff headers name the line before the hunk for an empty side.
fn unified_start(zero_based: usize, count: u32) -> u32 {
    if count == 0 {
        zero_based as u32
    } else {
        zero_based as u32 + 1
    }
}

fn trim_eol(content: &str) -> &str {
    let content = content.strip_suffix('\n').unwrap_or(content);
    content.strip_suffix('\r').unwrap_or(content)
}

fn path_of(path: Option<&std::path::Path>) -> String {
    path.map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}
