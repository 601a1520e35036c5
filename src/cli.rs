use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "marktrack",
    version,
    about = "Follow code annotations through git history"
)]
pub struct Cli {
    /// Repository to operate on (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Number of commits searched per file (overrides history_limit)
    #[arg(long, global = true)]
    pub limit: Option<usize>,

    /// Never run `git fetch` for unknown commits
    #[arg(long, global = true)]
    pub no_fetch: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the deltas between two commits as JSON
    Deltas {
        /// Old commit
        #[arg(required_unless_present = "patch")]
        old: Option<String>,
        /// New commit; when omitted, `old` is diffed against its parent
        new: Option<String>,
        /// Read a saved unified diff instead of diffing commits
        #[arg(long, conflicts_with_all = ["old", "new"])]
        patch: Option<PathBuf>,
    },

    /// List commits that touched a file, newest first
    History {
        path: PathBuf,
    },

    /// Map a line range recorded at a commit onto HEAD (and a buffer)
    Relocate {
        path: PathBuf,

        /// Commit the range was recorded at
        #[arg(long)]
        commit: String,

        /// `start` or `start:end`, 1-based and inclusive
        #[arg(long, value_parser = parse_lines)]
        lines: (u32, u32),

        /// Unsaved contents of the file to map onto after HEAD
        #[arg(long)]
        buffer: Option<PathBuf>,
    },
}

pub fn parse_lines(s: &str) -> Result<(u32, u32), String> {
    let parse = |part: &str| -> Result<u32, String> {
        match part.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("invalid line number {part:?}")),
            Ok(n) => Ok(n),
        }
    };
    let (start, end) = match s.split_once(':') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let line = parse(s)?;
            (line, line)
        }
    };
    if end < start {
        return Err(format!("range {s} ends before it starts"));
    }
    Ok((start, end))
}
