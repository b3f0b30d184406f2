use tracing::{debug, instrument, warn};

use crate::git::Git;
use crate::refs::GitRefs;
use crate::store::{BundleStore, StoreError};

/// Whether the remote at `clone_url` still has exactly the refs recorded in
/// the most recent valid local bundle.
///
/// Corrupt bundles met along the way are quarantined and the next most
/// recent one is tried. Any error on either side answers `false`, so an
/// unreadable store or an unreachable remote never causes a backup to be
/// skipped.
#[instrument(skip_all, fields(dir = %store.dir().display()))]
pub async fn remote_matches_local(git: &Git, clone_url: &str, store: &BundleStore) -> bool {
    match compare(git, clone_url, store).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "could not compare remote refs, backing up anyway");
            false
        }
    }
}

async fn compare(git: &Git, clone_url: &str, store: &BundleStore) -> Result<bool, StoreError> {
    let Some(local) = latest_valid_heads(store).await? else {
        debug!("no valid local bundle");
        return Ok(false);
    };

    let remote = git.ls_remote(clone_url).await?;

    if local == remote {
        debug!(refs = local.len(), "remote refs match latest bundle");
        return Ok(true);
    }

    let delta = local.delta(&remote);
    debug!(
        added = delta.added.len(),
        removed = delta.removed.len(),
        changed = delta.changed.len(),
        "remote refs differ from latest bundle"
    );
    Ok(false)
}

async fn latest_valid_heads(store: &BundleStore) -> Result<Option<GitRefs>, StoreError> {
    loop {
        let Some(bundle) = store.latest_bundle().await? else {
            return Ok(None);
        };

        match store.read_heads(&bundle).await {
            Ok(refs) => return Ok(Some(refs)),
            // Renaming takes the file out of the store, so the loop ends.
            Err(StoreError::InvalidBundle { message, .. }) => {
                warn!(bundle = %bundle, %message, "latest bundle is invalid");
                store.quarantine(&bundle).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Snapshot;
    use crate::test_support::SourceRepo;

    /// Mirror `source` and bundle it into a fresh store under `root`.
    async fn backed_up(source: &SourceRepo, root: &std::path::Path) -> BundleStore {
        let git = Git::default();
        let mirror = root.join("mirror");
        git.clone_mirror(&source.url(), &mirror).await.unwrap();

        let store = BundleStore::new(root.join("backup"), "test", git);
        assert!(matches!(
            store.create_snapshot(&mirror).await.unwrap(),
            Snapshot::Created(_)
        ));
        std::fs::remove_dir_all(&mirror).unwrap();
        store
    }

    #[tokio::test]
    async fn no_bundles_means_changed() {
        let source = SourceRepo::new();
        source.commit("a.txt", "a");
        let tmp = tempfile::tempdir().unwrap();
        let store = BundleStore::new(tmp.path().join("none"), "test", Git::default());

        assert!(!remote_matches_local(&Git::default(), &source.url(), &store).await);
    }

    #[tokio::test]
    async fn unchanged_remote_matches() {
        let source = SourceRepo::new();
        source.commit("a.txt", "a");
        source.tag("v1");
        let tmp = tempfile::tempdir().unwrap();
        let store = backed_up(&source, tmp.path()).await;

        assert!(remote_matches_local(&Git::default(), &source.url(), &store).await);
    }

    #[tokio::test]
    async fn new_commit_or_tag_is_a_change() {
        let source = SourceRepo::new();
        source.commit("a.txt", "a");
        let tmp = tempfile::tempdir().unwrap();
        let store = backed_up(&source, tmp.path()).await;

        source.tag("v2");
        assert!(!remote_matches_local(&Git::default(), &source.url(), &store).await);

        source.commit("a.txt", "b");
        assert!(!remote_matches_local(&Git::default(), &source.url(), &store).await);
    }

    #[tokio::test]
    async fn unreachable_remote_fails_open() {
        let source = SourceRepo::new();
        source.commit("a.txt", "a");
        let tmp = tempfile::tempdir().unwrap();
        let store = backed_up(&source, tmp.path()).await;

        let missing = tmp.path().join("does-not-exist");
        assert!(!remote_matches_local(&Git::default(), &missing.to_string_lossy(), &store).await);
    }

    #[tokio::test]
    async fn corrupt_latest_is_quarantined_and_older_bundle_used() {
        let source = SourceRepo::new();
        source.commit("a.txt", "a");
        let tmp = tempfile::tempdir().unwrap();
        let store = backed_up(&source, tmp.path()).await;

        let corrupt = store.dir().join("test.29991231235959.bundle");
        std::fs::write(&corrupt, b"garbage").unwrap();

        assert!(remote_matches_local(&Git::default(), &source.url(), &store).await);
        assert!(!corrupt.exists());
        assert!(store.dir().join("test.29991231235959.bundle.invalid").exists());
        assert_eq!(store.bundles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_corrupt_bundles_means_changed() {
        let source = SourceRepo::new();
        source.commit("a.txt", "a");
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("backup");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("test.20200401111111.bundle"), b"junk").unwrap();
        std::fs::write(dir.join("test.20200402111111.bundle"), b"more junk").unwrap();
        let store = BundleStore::new(&dir, "test", Git::default());

        assert!(!remote_matches_local(&Git::default(), &source.url(), &store).await);
        assert!(store.bundles().await.unwrap().is_empty());
        assert!(dir.join("test.20200401111111.bundle.invalid").exists());
        assert!(dir.join("test.20200402111111.bundle.invalid").exists());
    }
}
