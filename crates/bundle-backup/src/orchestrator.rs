//! Fans one provider's repositories out to a fixed pool of workers.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::task;
use tracing::{Instrument, error, info, info_span, instrument};

use crate::context::BackupContext;
use crate::provider::Provider;
use crate::repository::Repository;
use crate::result::{BackupError, ProviderBackupResult, RepoBackupResult};
use crate::worker::backup_repository;

/// One unit of work for the pool.
#[derive(Debug, Clone)]
struct Job {
    repo: Repository,
    clone_url: String,
}

/// Back up every repository `provider` lists, `provider.workers()` at a
/// time, and collect exactly one result per repository.
///
/// An enumeration failure is returned as the provider's error with no
/// results; repository failures never stop the others.
#[instrument(skip_all, fields(provider = provider.name()))]
pub async fn backup_provider<P>(ctx: &BackupContext, provider: &P) -> ProviderBackupResult
where
    P: Provider + ?Sized,
{
    let repos = match provider.list_repositories().await {
        Ok(repos) => repos,
        Err(e) => {
            error!(error = %e, "failed to list repositories");
            return ProviderBackupResult::failed(provider.name(), e);
        }
    };

    let workers = provider.workers().max(1);
    info!(repositories = repos.len(), workers, "starting backup");

    let jobs = repos
        .into_iter()
        .map(|repo| Job {
            clone_url: provider.clone_url(&repo),
            repo,
        })
        .collect();

    let ctx = Arc::new(ctx.clone());
    let results = run_pool(jobs, workers, move |job: Job| {
        let ctx = ctx.clone();
        async move { backup_repository(&ctx, &job.repo, &job.clone_url).await }
    })
    .await;

    let summary = ProviderBackupResult {
        provider: provider.name().to_owned(),
        results,
        error: None,
    };
    info!(
        ok = summary.ok_count(),
        skipped = summary.skipped_count(),
        failed = summary.failed_count(),
        "provider backup finished"
    );
    summary
}

/// Run `backup` over `jobs` on `workers` tasks sharing one MPMC queue.
///
/// Completion is counted, not inferred from channel closure. If the pool
/// dies before every job reports, the missing ones are recorded as
/// [`BackupError::WorkerLost`].
async fn run_pool<F, Fut>(jobs: Vec<Job>, workers: usize, backup: F) -> Vec<RepoBackupResult>
where
    F: Fn(Job) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = RepoBackupResult> + Send + 'static,
{
    let total = jobs.len();
    let (job_tx, job_rx) = flume::bounded::<Job>(total.max(1));
    let (result_tx, result_rx) = flume::bounded::<RepoBackupResult>(workers);

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let backup = backup.clone();

        let worker = async move {
            while let Ok(job) = job_rx.recv_async().await {
                let work = backup(job);
                let result = work.await;
                if result_tx.send_async(result).await.is_err() {
                    break;
                }
            }
        };
        handles.push(task::spawn(worker.instrument(info_span!("worker", id))));
    }
    drop(job_rx);
    drop(result_tx);

    let mut pending: Vec<Repository> = Vec::with_capacity(total);
    for job in jobs {
        pending.push(job.repo.clone());
        // The queue holds every job, so this only fails once all workers
        // are gone; the job is then accounted for below.
        let _ = job_tx.send_async(job).await;
    }
    drop(job_tx);

    let mut results = Vec::with_capacity(total);
    while results.len() < total {
        match result_rx.recv_async().await {
            Ok(result) => results.push(result),
            Err(_) => break,
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "backup worker panicked");
        }
    }

    if results.len() < total {
        let reported: HashSet<String> = results.iter().map(|r| r.repo.clone()).collect();
        for repo in pending.iter().filter(|r| !reported.contains(&r.id())) {
            error!(repo = %repo.id(), "no result from worker pool");
            results.push(RepoBackupResult::new(repo, Err(BackupError::WorkerLost)));
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::context::DiffMode;
    use crate::provider::ProviderError;
    use crate::result::{BackupStatus, Outcome};
    use crate::test_support::{
        InMemoryProvider, SourceRepo, backup_context, backup_dir, file_names,
        unreachable_repository,
    };

    fn job(path: &str) -> Job {
        let repo = unreachable_repository(path);
        Job {
            clone_url: repo.clone_url().to_owned(),
            repo,
        }
    }

    #[tokio::test]
    async fn enumeration_failure_starts_no_workers() {
        let root = tempfile::tempdir().unwrap();
        let ctx = backup_context(root.path(), DiffMode::Clone, 0);
        let provider =
            InMemoryProvider::new("github").failing(ProviderError::Auth("bad token".into()));

        let result = backup_provider(&ctx, &provider).await;

        assert_eq!(result.provider, "github");
        assert!(result.results.is_empty());
        assert!(matches!(result.error, Some(ProviderError::Auth(_))));
        assert!(file_names(root.path()).is_empty());
    }

    #[tokio::test]
    async fn empty_listing_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let ctx = backup_context(root.path(), DiffMode::Clone, 0);
        let provider = InMemoryProvider::new("gitea");

        let result = backup_provider(&ctx, &provider).await;

        assert!(result.results.is_empty());
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn failures_are_isolated_per_repository() {
        let root = tempfile::tempdir().unwrap();
        let ctx = backup_context(root.path(), DiffMode::Clone, 0);

        let sources: Vec<SourceRepo> = (0..4)
            .map(|i| {
                let source = SourceRepo::new();
                source.commit("README.md", &format!("repo {i}"));
                source
            })
            .collect();

        let mut provider = InMemoryProvider::new("local").with_workers(2);
        for (i, source) in sources.iter().enumerate() {
            provider.add(source.repository(&format!("soba/ok{i}")));
        }
        provider.add(unreachable_repository("soba/gone0"));
        provider.add(unreachable_repository("soba/gone1"));

        let result = backup_provider(&ctx, &provider).await;

        assert!(result.error.is_none());
        assert_eq!(result.results.len(), 6);
        assert_eq!(result.ok_count(), 4);
        assert_eq!(result.failed_count(), 2);

        let mut failed: Vec<&str> = result.failures().map(|(id, _)| id).collect();
        failed.sort();
        assert_eq!(failed, ["local.test/soba/gone0", "local.test/soba/gone1"]);
        assert!(
            result
                .failures()
                .all(|(_, e)| matches!(e, BackupError::Clone(_)))
        );

        for i in 0..4 {
            let names = file_names(&backup_dir(root.path(), &format!("soba/ok{i}")));
            assert_eq!(names.len(), 1, "ok{i}: {names:?}");
        }
    }

    #[tokio::test]
    async fn refs_mode_run_reports_unchanged_repositories() {
        let root = tempfile::tempdir().unwrap();
        let ctx = backup_context(root.path(), DiffMode::Refs, 0);
        let source = SourceRepo::new();
        source.commit("README.md", "hello");

        let mut provider = InMemoryProvider::new("local");
        provider.add(source.repository("soba/test"));

        let first = backup_provider(&ctx, &provider).await;
        let second = backup_provider(&ctx, &provider).await;

        assert!(matches!(first.results[0].outcome, Ok(Outcome::Created(_))));
        assert!(matches!(second.results[0].outcome, Ok(Outcome::Unchanged)));
        assert_eq!(second.skipped_count(), 1);
        assert_eq!(provider.list_calls(), 2);
    }

    #[tokio::test]
    async fn pool_never_exceeds_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..12).map(|i| job(&format!("soba/r{i}"))).collect();
        let results = run_pool(jobs, 3, {
            let active = active.clone();
            let peak = peak.clone();
            move |job: Job| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    RepoBackupResult::new(&job.repo, Ok(Outcome::Unchanged))
                }
            }
        })
        .await;

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(results.iter().all(|r| r.status() == BackupStatus::Ok));
    }

    #[tokio::test]
    async fn panicking_worker_is_recorded_as_lost() {
        let jobs: Vec<Job> = (0..5).map(|i| job(&format!("soba/r{i}"))).collect();

        let results = run_pool(jobs, 2, |job: Job| async move {
            if job.repo.path_with_namespace == "soba/r2" {
                panic!("boom");
            }
            RepoBackupResult::new(&job.repo, Ok(Outcome::Unchanged))
        })
        .await;

        assert_eq!(results.len(), 5);
        let lost: Vec<&str> = results
            .iter()
            .filter(|r| matches!(r.error(), Some(BackupError::WorkerLost)))
            .map(|r| r.repo.as_str())
            .collect();
        assert_eq!(lost, ["local.test/soba/r2"]);
    }

    #[tokio::test]
    async fn every_job_is_lost_when_all_workers_die() {
        let jobs: Vec<Job> = (0..4).map(|i| job(&format!("soba/r{i}"))).collect();

        let results = run_pool(jobs, 1, |job: Job| async move {
            if job.repo.path_with_namespace.starts_with("soba/") {
                panic!("boom");
            }
            RepoBackupResult::new(&job.repo, Ok(Outcome::Unchanged))
        })
        .await;

        assert_eq!(results.len(), 4);
        assert!(
            results
                .iter()
                .all(|r| matches!(r.error(), Some(BackupError::WorkerLost)))
        );
    }
}
