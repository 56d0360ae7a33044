//! Archive step for a single repository
//!
//! Each repository is archived into `<destination>/<domain>/<owner>/<name>/`
//! as a timestamped git bundle, produced from a transient mirror clone.
//! Retention pruning keeps only the newest bundles. The layout gives every
//! repository its own subtree, so different repositories can be archived
//! concurrently under one destination root.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::repository::Repository;

const BUNDLE_SUFFIX: &str = ".bundle";
/// Transient mirror-clone directory inside a repository's archive dir.
const WORK_DIR: &str = ".work";

/// Executes the archive step for one repository record.
///
/// The engine depends on this seam rather than on git directly, so tests can
/// substitute instrumented executors.
#[async_trait]
pub trait BackupExecutor: Send + Sync {
    /// Archive `repo` under `destination`, then enforce the retention count
    /// (`backups_to_keep == 0` keeps everything). Must be safe to invoke
    /// concurrently for different repositories sharing one destination root.
    async fn process(
        &self,
        repo: &Repository,
        destination: &Path,
        backups_to_keep: u32,
    ) -> Result<()>;
}

/// Archives repositories with the system git binary.
pub struct GitBackup;

impl GitBackup {
    /// Archive directory for one repository: `<destination>/<domain>/<owner>/<name>`.
    pub fn repo_directory(destination: &Path, repo: &Repository) -> PathBuf {
        destination
            .join(&repo.domain)
            .join(&repo.owner)
            .join(&repo.name)
    }

    async fn run_git<I, S>(args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = AsyncCommand::new("git")
            .args(args)
            .output()
            .await
            .context("Failed to execute git")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git exited with {}: {}", output.status, stderr.trim()));
        }

        Ok(())
    }
}

#[async_trait]
impl BackupExecutor for GitBackup {
    async fn process(
        &self,
        repo: &Repository,
        destination: &Path,
        backups_to_keep: u32,
    ) -> Result<()> {
        let clone_url = repo
            .url_with_token
            .as_deref()
            .ok_or_else(|| anyhow!("repository {} has no authenticated clone URL", repo.full_name()))?;

        let repo_dir = Self::repo_directory(destination, repo);
        tokio::fs::create_dir_all(&repo_dir)
            .await
            .with_context(|| format!("Failed to create {}", repo_dir.display()))?;

        // A fresh mirror per run: nothing is written next to the existing
        // bundles until the clone has fully succeeded.
        let work_dir = repo_dir.join(WORK_DIR);
        if work_dir.exists() {
            tokio::fs::remove_dir_all(&work_dir)
                .await
                .context("Failed to clear leftover working clone")?;
        }

        debug!(repo = repo.full_name(), "creating mirror clone");
        Self::run_git([
            OsStr::new("clone"),
            OsStr::new("--mirror"),
            OsStr::new(clone_url),
            work_dir.as_os_str(),
        ])
        .await
        .context("`git clone --mirror` failed")?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let bundle_path = repo_dir.join(format!("{}.{stamp}{BUNDLE_SUFFIX}", repo.name));

        debug!(bundle = %bundle_path.display(), "writing bundle");
        Self::run_git([
            OsStr::new("-C"),
            work_dir.as_os_str(),
            OsStr::new("bundle"),
            OsStr::new("create"),
            bundle_path.as_os_str(),
            OsStr::new("--all"),
        ])
        .await
        .context("`git bundle create` failed")?;

        tokio::fs::remove_dir_all(&work_dir)
            .await
            .context("Failed to remove working clone")?;

        let removed = prune_bundles(&repo_dir, &repo.name, backups_to_keep)?;
        info!(
            repo = repo.full_name(),
            bundle = %bundle_path.display(),
            pruned = removed,
            "archived"
        );

        Ok(())
    }
}

/// Delete the oldest bundles of `repo_name` in `repo_dir`, keeping the
/// newest `keep`. A `keep` of 0 deletes nothing. Returns how many bundles
/// were removed.
///
/// Bundle names embed a fixed-width UTC timestamp, so lexicographic order is
/// chronological order.
pub fn prune_bundles(repo_dir: &Path, repo_name: &str, keep: u32) -> Result<usize> {
    if keep == 0 {
        return Ok(0);
    }

    let prefix = format!("{repo_name}.");
    let mut bundles: Vec<PathBuf> = std::fs::read_dir(repo_dir)
        .with_context(|| format!("Failed to list {}", repo_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(OsStr::to_str)
                .map(|name| name.starts_with(&prefix) && name.ends_with(BUNDLE_SUFFIX))
                .unwrap_or(false)
        })
        .collect();

    bundles.sort();

    let keep = keep as usize;
    if bundles.len() <= keep {
        return Ok(0);
    }

    let excess = bundles.len() - keep;
    for stale in &bundles[..excess] {
        debug!(bundle = %stale.display(), "pruning old bundle");
        std::fs::remove_file(stale)
            .with_context(|| format!("Failed to remove {}", stale.display()))?;
    }

    Ok(excess)
}
