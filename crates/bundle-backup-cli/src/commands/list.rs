use anyhow::Result;
use bundle_backup::Provider;

use super::format;

/// Enumerate every provider's repositories without backing anything up.
pub async fn run(providers: &[Box<dyn Provider>]) -> Result<()> {
    let mut failed = 0usize;

    for provider in providers {
        match provider.list_repositories().await {
            Ok(repos) => format::print_repositories(provider.name(), &repos),
            Err(e) => {
                eprintln!("warning: listing failed for [{}]: {e}", provider.name());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} providers failed to list", providers.len());
    }

    Ok(())
}
