//! The diff oracle: which files differ from a reference.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GitConfig;
use crate::diff::{DiffRecord, parse_name_only, parse_porcelain};
use crate::error::{GitError, Result};

/// Which git listing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// `git diff --name-only --relative <ref>`.
    #[default]
    NameOnly,

    /// `git status --porcelain`.
    Porcelain,
}

/// Source of changed-file lists.
#[async_trait]
pub trait DiffOracle: Send + Sync {
    /// List changes in `repo` against `reference`.
    async fn get_changes(&self, repo: &Path, reference: &str) -> Result<Vec<DiffRecord>>;

    /// The checked-out branch, when it can be determined.
    async fn current_branch(&self, _repo: &Path) -> Option<String> {
        None
    }

    /// Like [`DiffOracle::get_changes`], but an unavailable diff becomes an
    /// empty list and a warning.
    async fn changes_or_empty(&self, repo: &Path, reference: &str) -> Vec<DiffRecord> {
        match self.get_changes(repo, reference).await {
            Ok(records) => records,
            Err(e) => {
                warn!("{e}; continuing without diff");
                Vec::new()
            }
        }
    }
}

/// [`DiffOracle`] backed by the git command line.
#[derive(Debug, Clone)]
pub struct GitDiffOracle {
    program: PathBuf,
    mode: DiffMode,
    timeout: Duration,
}

impl GitDiffOracle {
    /// Create an oracle with the given mode and per-invocation timeout.
    pub fn new(mode: DiffMode, timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("git"),
            mode,
            timeout,
        }
    }

    /// Create an oracle from the `gitConfig` section.
    pub fn from_config(config: &GitConfig) -> Self {
        let mode = if config.show_git_status {
            DiffMode::Porcelain
        } else {
            DiffMode::NameOnly
        };
        Self::new(mode, Duration::from_millis(config.timeout_ms))
    }

    /// Use a different git executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn mode(&self) -> DiffMode {
        self.mode
    }

    /// Fail unless `repo` exists and lies inside a git working tree.
    pub async fn ensure_work_tree(&self, repo: &Path) -> Result<()> {
        if !tokio::fs::try_exists(repo).await.unwrap_or(false) {
            return Err(GitError::PathNotFound(repo.to_path_buf()));
        }

        match self.run(repo, &["rev-parse", "--is-inside-work-tree"]).await {
            Ok(stdout) if stdout.trim() == "true" => Ok(()),
            Ok(_) | Err(GitError::CommandFailed { .. }) => {
                Err(GitError::NotARepository(repo.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }

    async fn run(&self, repo: &Path, args: &[&str]) -> Result<String> {
        let command_line = args.join(" ");
        debug!("Executing git {command_line} in {}", repo.display());

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| GitError::Timeout {
                command: command_line.clone(),
                timeout: self.timeout,
            })??;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DiffOracle for GitDiffOracle {
    async fn get_changes(&self, repo: &Path, reference: &str) -> Result<Vec<DiffRecord>> {
        self.ensure_work_tree(repo).await?;

        let records = match self.mode {
            DiffMode::NameOnly => {
                let stdout = self
                    .run(repo, &["diff", "--name-only", "--relative", reference])
                    .await?;
                parse_name_only(&stdout, repo).await
            }
            DiffMode::Porcelain => {
                let stdout = self.run(repo, &["status", "--porcelain"]).await?;
                parse_porcelain(&stdout)
            }
        };

        info!("Git diff returned {} changes", records.len());
        Ok(records)
    }

    async fn current_branch(&self, repo: &Path) -> Option<String> {
        let stdout = self
            .run(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok()?;
        let branch = stdout.trim();
        (!branch.is_empty()).then(|| branch.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn oracle() -> GitDiffOracle {
        GitDiffOracle::new(DiffMode::NameOnly, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn missing_path_is_unavailable_without_running_git() {
        let oracle = oracle().with_program("/definitely/not/git");
        let err = oracle
            .get_changes(Path::new("/nonexistent/repo/12345"), "HEAD")
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn non_repository_yields_empty_changes() {
        let temp_dir = TempDir::new().unwrap();

        let err = oracle()
            .get_changes(temp_dir.path(), "HEAD")
            .await
            .unwrap_err();
        // Without git installed this is a spawn failure, which is equally
        // "unavailable".
        assert!(matches!(
            err,
            GitError::NotARepository(_) | GitError::Spawn(_)
        ));

        assert!(oracle().changes_or_empty(temp_dir.path(), "HEAD").await.is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let temp_dir = TempDir::new().unwrap();
        let oracle = oracle().with_program(temp_dir.path().join("no-such-git"));

        let err = oracle.get_changes(temp_dir.path(), "HEAD").await.unwrap_err();
        assert!(matches!(err, GitError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_process_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("slow-git");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let oracle = GitDiffOracle::new(DiffMode::NameOnly, Duration::from_millis(100))
            .with_program(&script);
        let err = oracle.get_changes(temp_dir.path(), "HEAD").await.unwrap_err();

        assert!(matches!(err, GitError::Timeout { .. }));
    }
}
