use serde::{Deserialize, Serialize};

use crate::error::DiffError;

/// Operation tag carried by the first character of a hunk line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Sync,
    Add,
    Del,
}

impl LineOp {
    /// Classify a raw hunk line. Returns `Ok(None)` for the
    /// `\ No newline at end of file` marker, which carries no content.
    pub fn classify(line: &str) -> Result<Option<(LineOp, &str)>, DiffError> {
        let mut chars = line.chars();
        let Some(tag) = chars.next() else {
            return Err(DiffError::MalformedPatch {
                line: line.to_string(),
                tag: '\0',
            });
        };
        let op = match tag {
            ' ' => LineOp::Sync,
            '+' => LineOp::Add,
            '-' => LineOp::Del,
            '\\' => return Ok(None),
            _ => {
                return Err(DiffError::MalformedPatch {
                    line: line.to_string(),
                    tag,
                })
            }
        };
        Ok(Some((op, chars.as_str())))
    }
}

/// One hunk of a parsed diff. `lines` keep their one-character operation tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<String>,
}

/// A parsed single-file diff, the input of [`super::DeltaBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub old_file_name: String,
    pub new_file_name: String,
    pub hunks: Vec<PatchHunk>,
}

/// A single contiguous replacement. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub del_start: u32,
    pub add_start: u32,
    pub del_length: u32,
    pub add_length: u32,
    pub dels: Vec<String>,
    pub adds: Vec<String>,
}

impl Edit {
    /// Swap the deleted and added sides, so the edit maps new-file lines
    /// back onto the old file.
    pub fn reversed(&self) -> Edit {
        Edit {
            del_start: self.add_start,
            add_start: self.del_start,
            del_length: self.add_length,
            add_length: self.del_length,
            dels: self.adds.clone(),
            adds: self.dels.clone(),
        }
    }
}

pub fn reverse_edits(edits: &[Edit]) -> Vec<Edit> {
    edits.iter().map(Edit::reversed).collect()
}

/// The line-level changes of one file between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub old_file: String,
    pub new_file: String,
    pub edits: Vec<Edit>,
}

impl Delta {
    pub fn empty(path: &str) -> Self {
        Self {
            old_file: path.to_string(),
            new_file: path.to_string(),
            edits: Vec::new(),
        }
    }

    pub fn touches(&self, path: &str) -> bool {
        self.new_file == path || self.old_file == path
    }

    pub fn is_rename(&self) -> bool {
        self.old_file != self.new_file
    }
}

/// Edits for `path` among the deltas of a commit range. Renames match on
/// either side.
pub fn edits_for_path<'a>(deltas: &'a [Delta], path: &str) -> &'a [Edit] {
    deltas
        .iter()
        .find(|d| d.new_file == path)
        .or_else(|| deltas.iter().find(|d| d.touches(path)))
        .map(|d| d.edits.as_slice())
        .unwrap_or(&[])
}

/// A commit identity. Parents are resolved on demand by the history backend.
#[derive(Debug, Clone, Eq)]
pub struct Commit {
    pub hash: String,
    pub summary: Option<String>,
}

impl Commit {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            summary: None,
        }
    }

    pub fn short_hash(&self) -> &str {
        self.hash.get(..8).unwrap_or(&self.hash)
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for Commit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}
