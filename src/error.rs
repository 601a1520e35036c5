use thiserror::Error;

/// Failures while producing deltas from a repository or a patch.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("diff unavailable: {reason}")]
    DiffUnavailable { reason: String },

    #[error("malformed patch line {line:?}: unrecognized operation tag {tag:?}")]
    MalformedPatch { line: String, tag: char },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background git task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DiffError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        DiffError::DiffUnavailable {
            reason: reason.into(),
        }
    }
}

/// Failures raised by [`crate::cache::EntityCache`].
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No {kind} index declared for fields {fields}")]
    NoIndexDeclared { kind: &'static str, fields: String },

    #[error("Entity {id} has no numeric value for sequence field {field}")]
    InvalidSequence { id: String, field: String },

    #[error("fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),
}
