use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Operations that libgit2 can't do for us without credential plumbing;
/// these shell out to the user's `git`.
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
        }
    }

    /// Fetch from `remote` so commits created on other clones become resolvable.
    pub fn fetch(&self, remote: &str) -> Result<()> {
        self.run(&["fetch", remote])
            .with_context(|| format!("Failed to fetch from {remote}"))
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {} failed: {stderr}", args.join(" "));
        }
        Ok(())
    }
}
