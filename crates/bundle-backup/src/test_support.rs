use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::{
    BackupContext, BackupLayout, BackupOptions, DiffMode, Provider, ProviderError, Repository,
};

/// Domain used for repositories backed by local fixtures.
pub const LOCAL_DOMAIN: &str = "local.test";

/// In-memory provider for testing. Serves a fixed repository list, or a
/// fixed enumeration error.
pub struct InMemoryProvider {
    name: String,
    workers: usize,
    repositories: Vec<Repository>,
    error: Option<ProviderError>,
    list_calls: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers: crate::provider::DEFAULT_WORKERS,
            repositories: Vec::new(),
            error: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn failing(mut self, error: ProviderError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn add(&mut self, repository: Repository) {
        self.repositories.push(repository);
    }

    /// How many times the repository list was requested.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.repositories.clone()),
        }
    }
}

/// A throwaway git repository on local disk, driven by the real `git`
/// binary. Serves as the "remote" for backup tests.
pub struct SourceRepo {
    dir: TempDir,
    commits: AtomicUsize,
}

impl SourceRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create source tempdir");
        git(dir.path(), &["init", "--quiet"]);
        Self {
            dir,
            commits: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Local path usable as a clone URL.
    pub fn url(&self) -> String {
        self.path().to_string_lossy().into_owned()
    }

    /// Write `contents` to `file` and commit it.
    pub fn commit(&self, file: &str, contents: &str) {
        std::fs::write(self.path().join(file), contents).expect("write source file");
        git(self.path(), &["add", "--all"]);

        let n = self.commits.fetch_add(1, Ordering::SeqCst);
        git(
            self.path(),
            &[
                "-c",
                "user.name=Backup Test",
                "-c",
                "user.email=backup@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                &format!("commit {n}"),
            ],
        );
    }

    pub fn tag(&self, name: &str) {
        git(self.path(), &["tag", name]);
    }

    /// A repository record for this source under `path_with_namespace`.
    pub fn repository(&self, path_with_namespace: &str) -> Repository {
        Repository::new(LOCAL_DOMAIN, path_with_namespace, self.url())
    }
}

impl Default for SourceRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// A repository record whose clone URL points nowhere.
pub fn unreachable_repository(path_with_namespace: &str) -> Repository {
    Repository::new(
        LOCAL_DOMAIN,
        path_with_namespace,
        format!("/nonexistent/{path_with_namespace}"),
    )
}

/// Backup context rooted at `root`.
pub fn backup_context(root: &Path, diff_mode: DiffMode, retention: usize) -> BackupContext {
    let layout = BackupLayout::new(root).expect("absolute backup root");
    BackupContext::new(
        layout,
        BackupOptions {
            diff_mode,
            retention,
        },
    )
}

/// Directory holding the bundles of `path_with_namespace` under `root`.
pub fn backup_dir(root: &Path, path_with_namespace: &str) -> PathBuf {
    root.join(LOCAL_DOMAIN).join(path_with_namespace)
}

/// Bundle file names in `dir`, sorted. Includes `.invalid` files.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

fn git(cwd: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
