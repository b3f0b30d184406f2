use std::fmt;
use std::path::PathBuf;

use crate::git::GitError;
use crate::layout::LayoutError;
use crate::provider::ProviderError;
use crate::repository::Repository;
use crate::store::StoreError;

/// What a successful repository backup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new bundle was written.
    Created(PathBuf),
    /// Remote refs matched the latest bundle; nothing was cloned.
    Unchanged,
    /// The new bundle was identical to the previous one and was removed.
    Duplicate,
    /// The remote has no objects; no bundle was written.
    Empty,
}

impl Outcome {
    /// Whether the backup left the bundle set as it was.
    pub fn is_skip(&self) -> bool {
        !matches!(self, Outcome::Created(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created(path) => write!(f, "created {}", path.display()),
            Outcome::Unchanged => f.write_str("unchanged"),
            Outcome::Duplicate => f.write_str("duplicate"),
            Outcome::Empty => f.write_str("empty"),
        }
    }
}

/// Why a single repository's backup failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackupError {
    #[error("invalid repository path: {0}")]
    Layout(#[from] LayoutError),

    #[error("failed to prepare working directory: {0}")]
    Prepare(String),

    #[error("clone failed: {0}")]
    Clone(#[from] GitError),

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] StoreError),

    #[error("worker exited before reporting a result")]
    WorkerLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Ok,
    Failed,
}

/// Outcome of one repository's backup. Exactly one is produced per
/// submitted repository.
#[derive(Debug, Clone)]
pub struct RepoBackupResult {
    /// `domain/path_with_namespace`
    pub repo: String,
    pub outcome: Result<Outcome, BackupError>,
}

impl RepoBackupResult {
    pub fn new(repo: &Repository, outcome: Result<Outcome, BackupError>) -> Self {
        Self {
            repo: repo.id(),
            outcome,
        }
    }

    pub fn status(&self) -> BackupStatus {
        match self.outcome {
            Ok(_) => BackupStatus::Ok,
            Err(_) => BackupStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&BackupError> {
        self.outcome.as_ref().err()
    }
}

/// Everything one provider's run produced.
#[derive(Debug, Clone)]
pub struct ProviderBackupResult {
    pub provider: String,
    pub results: Vec<RepoBackupResult>,
    /// Set only when enumeration failed and no repository was attempted.
    pub error: Option<ProviderError>,
}

impl ProviderBackupResult {
    pub fn failed(provider: impl Into<String>, error: ProviderError) -> Self {
        Self {
            provider: provider.into(),
            results: Vec::new(),
            error: Some(error),
        }
    }

    pub fn ok_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status() == BackupStatus::Ok)
            .count()
    }

    /// Successful results that left the bundle set untouched.
    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(&r.outcome, Ok(outcome) if outcome.is_skip()))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.ok_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &BackupError)> {
        self.results
            .iter()
            .filter_map(|r| r.error().map(|e| (r.repo.as_str(), e)))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed_count() == 0
    }
}
