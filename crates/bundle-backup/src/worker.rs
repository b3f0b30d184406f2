//! The per-repository backup pipeline.
//!
//! prepare → diff check (refs mode) → clone → snapshot → dedup → prune →
//! cleanup. Every failure is contained in the repository's own result.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{Instrument, error, info, info_span, warn};

use crate::context::{BackupContext, DiffMode};
use crate::diff::remote_matches_local;
use crate::layout::RepoPaths;
use crate::repository::Repository;
use crate::result::{BackupError, Outcome, RepoBackupResult};
use crate::store::{BundleStore, Dedup, Snapshot};

/// Back up one repository from `clone_url`. Always returns a result, never
/// panics on git or filesystem failures.
pub async fn backup_repository(
    ctx: &BackupContext,
    repo: &Repository,
    clone_url: &str,
) -> RepoBackupResult {
    let span = info_span!("repo", repo = %repo.id());

    let outcome = run(ctx, repo, clone_url).instrument(span.clone()).await;

    let _enter = span.enter();
    match &outcome {
        Ok(outcome) => info!(%outcome, "backup complete"),
        Err(e) => error!(error = %e, "backup failed"),
    }

    RepoBackupResult::new(repo, outcome)
}

async fn run(
    ctx: &BackupContext,
    repo: &Repository,
    clone_url: &str,
) -> Result<Outcome, BackupError> {
    let paths = ctx.layout.paths_for(repo)?;
    prepare(&paths).await?;

    let store = BundleStore::new(&paths.backup_dir, &repo.name, ctx.git.clone());
    let outcome = back_up(ctx, &store, &paths, clone_url).await;

    if let Err(e) = remove_dir(&paths.working_dir).await {
        warn!(
            dir = %paths.working_dir.display(),
            error = %e,
            "failed to remove working directory"
        );
    }

    outcome
}

/// Clear any mirror a previous, interrupted run left behind.
async fn prepare(paths: &RepoPaths) -> Result<(), BackupError> {
    remove_dir(&paths.working_dir).await.map_err(|e| {
        BackupError::Prepare(format!("{}: {e}", paths.working_dir.display()))
    })?;

    if let Some(parent) = paths.working_dir.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BackupError::Prepare(format!("{}: {e}", parent.display())))?;
    }

    Ok(())
}

async fn back_up(
    ctx: &BackupContext,
    store: &BundleStore,
    paths: &RepoPaths,
    clone_url: &str,
) -> Result<Outcome, BackupError> {
    if ctx.options.diff_mode == DiffMode::Refs
        && remote_matches_local(&ctx.git, clone_url, store).await
    {
        return Ok(Outcome::Unchanged);
    }

    ctx.git
        .clone_mirror(clone_url, &paths.working_dir)
        .await
        .map_err(BackupError::Clone)?;

    let bundle = match store.create_snapshot(&paths.working_dir).await? {
        Snapshot::Created(bundle) => bundle,
        Snapshot::Empty => return Ok(Outcome::Empty),
    };

    let mut outcome = Outcome::Created(bundle.path().to_path_buf());

    // Post-processing never fails the backup.
    match store.deduplicate().await {
        Ok(Dedup::Removed(_)) => outcome = Outcome::Duplicate,
        Ok(_) => {}
        Err(e) => warn!(error = %e, "deduplication failed"),
    }

    if ctx.options.retention > 0 {
        match store.prune(ctx.options.retention).await {
            Ok(removed) if !removed.is_empty() => {
                info!(removed = removed.len(), "pruned old bundles");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pruning failed"),
        }
    }

    Ok(outcome)
}

async fn remove_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
