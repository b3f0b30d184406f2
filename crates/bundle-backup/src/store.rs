//! Bundle files for a single repository.
//!
//! The store owns one backup directory. Ordering always comes from the
//! timestamp embedded in the file name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::bundle::{self, BundleFile};
use crate::git::{Git, GitError};
use crate::refs::GitRefs;

/// Markers git prints when a file is not a readable bundle.
const INVALID_BUNDLE_MARKERS: &[&str] = &["does not look like a v", "not a valid bundle"];

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("{path} is not a valid bundle: {message}")]
    InvalidBundle { path: PathBuf, message: String },

    #[error("failed to hash {path}: {message}")]
    Hash { path: PathBuf, message: String },
}

impl StoreError {
    fn io(path: &Path, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Result of [`BundleStore::create_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Created(BundleFile),
    /// The mirror holds no objects; nothing was written.
    Empty,
}

/// Result of [`BundleStore::deduplicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dedup {
    /// The newest bundle matched its predecessor and was deleted.
    Removed(BundleFile),
    Distinct,
    /// Fewer than two bundles.
    NothingToCompare,
}

/// Bundle files of one repository, kept in
/// `<backup root>/<domain>/<path_with_namespace>/`.
#[derive(Debug, Clone)]
pub struct BundleStore {
    dir: PathBuf,
    repo_name: String,
    git: Git,
}

impl BundleStore {
    pub fn new(dir: impl Into<PathBuf>, repo_name: impl Into<String>, git: Git) -> Self {
        Self {
            dir: dir.into(),
            repo_name: repo_name.into(),
            git,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every bundle in the directory, oldest first. A missing directory is
    /// an empty store; files that do not follow the naming contract are
    /// ignored.
    pub async fn bundles(&self) -> Result<Vec<BundleFile>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut bundles = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(&entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(bundle) = BundleFile::from_path(entry.path()) {
                bundles.push(bundle);
            }
        }

        bundles.sort_by(|a, b| a.created().cmp(&b.created()).then_with(|| a.path().cmp(b.path())));
        Ok(bundles)
    }

    pub async fn latest_bundle(&self) -> Result<Option<BundleFile>, StoreError> {
        Ok(self.bundles().await?.pop())
    }

    /// Refs recorded in `bundle`. A file git cannot parse yields
    /// [`StoreError::InvalidBundle`].
    pub async fn read_heads(&self, bundle: &BundleFile) -> Result<GitRefs, StoreError> {
        let output = self.git.bundle_list_heads(bundle.path()).await?;

        if output.success() {
            return Ok(GitRefs::parse(&output.stdout));
        }

        let stderr = output.stderr.trim();
        if INVALID_BUNDLE_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Err(StoreError::InvalidBundle {
                path: bundle.path().to_path_buf(),
                message: stderr.to_owned(),
            });
        }

        Err(StoreError::Git(GitError::Failed {
            command: format!("git bundle list-heads {}", bundle.path().display()),
            status: output
                .status
                .map_or_else(|| "signal".into(), |code| format!("exit code {code}")),
            stderr: stderr.to_owned(),
        }))
    }

    /// Rename a corrupt bundle to `<name>.bundle.invalid`. The file is kept.
    pub async fn quarantine(&self, bundle: &BundleFile) -> Result<PathBuf, StoreError> {
        let target = bundle.invalid_path();
        tokio::fs::rename(bundle.path(), &target)
            .await
            .map_err(|e| StoreError::io(bundle.path(), e))?;

        warn!(bundle = %bundle, "quarantined invalid bundle");
        Ok(target)
    }

    /// Bundle the mirror clone at `mirror` into this store.
    ///
    /// The bundle is written inside the mirror first and moved into place
    /// once git has finished, so the store never holds a partial file.
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub async fn create_snapshot(&self, mirror: &Path) -> Result<Snapshot, StoreError> {
        let counts = self.git.count_objects(mirror).await?;
        if counts.is_empty() {
            info!("repository has no objects, skipping bundle");
            return Ok(Snapshot::Empty);
        }

        let latest = self.latest_bundle().await?.map(|b| b.created());
        let created = bundle::next_timestamp(Local::now().naive_local(), latest);
        let name = bundle::file_name(&self.repo_name, created);

        let staging = mirror.join(&name);
        self.git.bundle_create(mirror, &staging).await?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let target = self.dir.join(&name);
        move_file(&staging, &target).await?;

        let bundle = BundleFile::from_path(&target).ok_or_else(|| StoreError::Io {
            path: target.clone(),
            message: "bundle name does not round-trip".into(),
        })?;

        info!(bundle = %bundle, "bundle created");
        Ok(Snapshot::Created(bundle))
    }

    /// Compare the two most recent bundles by size, then by SHA-256, and
    /// delete the newer one when they match.
    pub async fn deduplicate(&self) -> Result<Dedup, StoreError> {
        let mut bundles = self.bundles().await?;
        let (Some(newest), Some(previous)) = (bundles.pop(), bundles.pop()) else {
            return Ok(Dedup::NothingToCompare);
        };

        let newest_size = newest
            .size()
            .await
            .map_err(|e| StoreError::io(newest.path(), e))?;
        let previous_size = previous
            .size()
            .await
            .map_err(|e| StoreError::io(previous.path(), e))?;
        if newest_size != previous_size {
            debug!(newest = %newest, previous = %previous, "bundle sizes differ");
            return Ok(Dedup::Distinct);
        }

        if hash(&newest).await? != hash(&previous).await? {
            debug!(newest = %newest, previous = %previous, "bundle hashes differ");
            return Ok(Dedup::Distinct);
        }

        tokio::fs::remove_file(newest.path())
            .await
            .map_err(|e| StoreError::io(newest.path(), e))?;

        info!(removed = %newest, kept = %previous, "removed duplicate bundle");
        Ok(Dedup::Removed(newest))
    }

    /// Keep the `retain` most recent bundles and delete the rest, oldest
    /// first. `0` keeps everything.
    pub async fn prune(&self, retain: usize) -> Result<Vec<BundleFile>, StoreError> {
        if retain == 0 {
            return Ok(Vec::new());
        }

        let bundles = self.bundles().await?;
        let excess = bundles.len().saturating_sub(retain);
        let mut removed = Vec::with_capacity(excess);

        for bundle in bundles.into_iter().take(excess) {
            tokio::fs::remove_file(bundle.path())
                .await
                .map_err(|e| StoreError::io(bundle.path(), e))?;
            debug!(bundle = %bundle, "pruned bundle");
            removed.push(bundle);
        }

        Ok(removed)
    }
}

async fn hash(bundle: &BundleFile) -> Result<String, StoreError> {
    bundle.content_hash().await.map_err(|e| StoreError::Hash {
        path: bundle.path().to_path_buf(),
        message: e.to_string(),
    })
}

/// Rename, falling back to copy and delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(from, to)
        .await
        .map_err(|e| StoreError::io(to, e))?;
    tokio::fs::remove_file(from)
        .await
        .map_err(|e| StoreError::io(from, e))
}
