use std::time::Duration;

use anyhow::Result;
use bundle_backup::{BackupContext, Provider};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::format;
use crate::coordinator;

/// Back up every provider once, or every `every` until the process is
/// stopped. A single run fails when any repository or provider failed;
/// repeated runs only log failures and keep going.
pub async fn run(
    ctx: &BackupContext,
    providers: &[Box<dyn Provider>],
    every: Option<Duration>,
) -> Result<()> {
    let Some(every) = every else {
        let summary = coordinator::run(ctx, providers).await;
        format::print_run_summary(&summary);

        if !summary.is_success() {
            anyhow::bail!(
                "backup finished with {} failed repositories and {} failed providers",
                summary.failed(),
                summary.failed_providers()
            );
        }
        return Ok(());
    };

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let summary = coordinator::run(ctx, providers).await;
        format::print_run_summary(&summary);

        if summary.is_success() {
            info!(next_in_secs = every.as_secs(), "backup run complete");
        } else {
            warn!(
                failed = summary.failed(),
                failed_providers = summary.failed_providers(),
                next_in_secs = every.as_secs(),
                "backup run had failures"
            );
        }
    }
}
