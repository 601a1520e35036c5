use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::git::{EngineOptions, SourceOptions};
use crate::location::finder::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarktrackConfig {
    /// How many commits touching the file are searched for recorded locations.
    pub history_limit: usize,
    pub rename_threshold: u16,
    pub context_lines: u32,
    pub fetch_missing_commits: bool,
    pub remote: String,
    pub log_filter: Option<String>,
}

impl Default for MarktrackConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            rename_threshold: 50,
            context_lines: 3,
            fetch_missing_commits: true,
            remote: "origin".to_string(),
            log_filter: None,
        }
    }
}

impl MarktrackConfig {
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            engine: EngineOptions {
                rename_threshold: self.rename_threshold,
                context_lines: self.context_lines,
            },
            fetch_missing_commits: self.fetch_missing_commits,
            remote: self.remote.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    history_limit: Option<usize>,
    #[serde(default)]
    rename_threshold: Option<u16>,
    #[serde(default)]
    context_lines: Option<u32>,
    #[serde(default)]
    fetch_missing_commits: Option<bool>,
    #[serde(default)]
    remote: Option<String>,
    #[serde(default)]
    log_filter: Option<String>,
}

fn config_path() -> PathBuf {
    let mut path = dirs_home().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("marktrack");
    path.push("config.toml");
    path
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Load config from `~/.config/marktrack/config.toml`, falling back to defaults.
pub fn load_config() -> MarktrackConfig {
    load_config_from(&config_path())
}

/// A missing or unparsable file yields the defaults; absent keys keep theirs.
pub fn load_config_from(path: &Path) -> MarktrackConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return MarktrackConfig::default(),
    };

    let file: ConfigFile = match toml::from_str(&contents) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
            return MarktrackConfig::default();
        }
    };

    let defaults = MarktrackConfig::default();
    MarktrackConfig {
        history_limit: file.history_limit.unwrap_or(defaults.history_limit),
        rename_threshold: file
            .rename_threshold
            .map(|t| t.min(100))
            .unwrap_or(defaults.rename_threshold),
        context_lines: file.context_lines.unwrap_or(defaults.context_lines),
        fetch_missing_commits: file
            .fetch_missing_commits
            .unwrap_or(defaults.fetch_missing_commits),
        remote: file.remote.unwrap_or(defaults.remote),
        log_filter: file.log_filter,
    }
}
