use std::sync::Arc;

use crate::repository::Repository;

/// Number of concurrent workers a provider gets unless it says otherwise.
pub const DEFAULT_WORKERS: usize = 5;

/// Errors that can occur when enumerating a provider's repositories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// A git hosting service whose repositories get backed up.
///
/// Workers and the orchestrator only talk to providers through this trait;
/// nothing downstream branches on which service it is.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable label identifying this provider, e.g. `github`.
    fn name(&self) -> &str;

    /// Upper bound on repositories backed up concurrently.
    fn workers(&self) -> usize {
        DEFAULT_WORKERS
    }

    /// Enumerate every repository to back up.
    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError>;

    /// URL handed to `git clone` and `git ls-remote`.
    /// Default implementation prefers the credentialed URL.
    fn clone_url(&self, repo: &Repository) -> String {
        repo.clone_url().to_owned()
    }
}

#[async_trait::async_trait]
impl<T: Provider + ?Sized> Provider for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn workers(&self) -> usize {
        (**self).workers()
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError> {
        (**self).list_repositories().await
    }

    fn clone_url(&self, repo: &Repository) -> String {
        (**self).clone_url(repo)
    }
}

#[async_trait::async_trait]
impl<T: Provider + ?Sized> Provider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn workers(&self) -> usize {
        (**self).workers()
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError> {
        (**self).list_repositories().await
    }

    fn clone_url(&self, repo: &Repository) -> String {
        (**self).clone_url(repo)
    }
}
