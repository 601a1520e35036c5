pub mod commands;
pub mod delta;
pub mod diff;
pub mod repository;
pub mod source;
pub mod types;

pub use delta::DeltaBuilder;
pub use diff::{DiffEngine, EngineOptions};
pub use repository::RepoCache;
pub use source::{CommitHistory, DiffSource, GitDiffSource, SourceOptions};
pub use types::{reverse_edits, Commit, Delta, Edit, Patch, PatchHunk};
