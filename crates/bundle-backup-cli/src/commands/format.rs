use bundle_backup::Repository;

use crate::coordinator::RunSummary;

/// Print one line per provider, then every failure with its cause.
pub fn print_run_summary(summary: &RunSummary) {
    for provider in &summary.providers {
        match &provider.error {
            Some(e) => println!("{}: failed to list repositories: {e}", provider.provider),
            None => println!(
                "{}: {} repositories, {} ok ({} unchanged), {} failed",
                provider.provider,
                provider.results.len(),
                provider.ok_count(),
                provider.skipped_count(),
                provider.failed_count()
            ),
        }
    }

    let failures: Vec<_> = summary
        .providers
        .iter()
        .flat_map(|p| p.failures())
        .collect();
    if !failures.is_empty() {
        println!();
        for (repo, error) in failures {
            println!("  FAILED {repo}: {error}");
        }
    }

    println!(
        "\n{} ok, {} unchanged, {} failed, {} providers failed",
        summary.ok(),
        summary.skipped(),
        summary.failed(),
        summary.failed_providers()
    );
}

pub fn print_repositories(provider: &str, repos: &[Repository]) {
    println!("{provider} ({})", repos.len());
    for repo in repos {
        println!("  {}", repo.id());
    }
}
