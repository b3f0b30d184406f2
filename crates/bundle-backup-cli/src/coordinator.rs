use bundle_backup::{BackupContext, Provider, ProviderBackupResult, backup_provider};
use tracing::{info, warn};

/// Merged results of one backup run across every configured provider.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub providers: Vec<ProviderBackupResult>,
}

impl RunSummary {
    pub fn ok(&self) -> usize {
        self.providers.iter().map(|p| p.ok_count()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.providers.iter().map(|p| p.skipped_count()).sum()
    }

    pub fn failed(&self) -> usize {
        self.providers.iter().map(|p| p.failed_count()).sum()
    }

    /// Providers whose repositories could not be listed at all.
    pub fn failed_providers(&self) -> usize {
        self.providers.iter().filter(|p| p.error.is_some()).count()
    }

    pub fn is_success(&self) -> bool {
        self.providers.iter().all(ProviderBackupResult::is_success)
    }
}

/// Back up every provider in turn.
pub async fn run(ctx: &BackupContext, providers: &[Box<dyn Provider>]) -> RunSummary {
    let mut summary = RunSummary::default();

    for provider in providers {
        let result = backup_provider(ctx, provider.as_ref()).await;

        match &result.error {
            Some(e) => warn!(provider = %result.provider, error = %e, "provider skipped"),
            None => info!(
                provider = %result.provider,
                ok = result.ok_count(),
                skipped = result.skipped_count(),
                failed = result.failed_count(),
                "provider done"
            ),
        }

        summary.providers.push(result);
    }

    summary
}
