use anyhow::{Context, Result};
use bundle_backup::Provider;
use bundle_backup_forges::{
    GitHubConfig, GitHubProvider, GitLabConfig, GitLabProvider, GiteaConfig, GiteaProvider,
    HttpOptions,
};

use crate::config::{ProviderEntry, ProviderKind};

/// Build a provider from its config entry. `env` looks up the token
/// variable.
pub fn build_provider(
    entry: &ProviderEntry,
    http: &HttpOptions,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn Provider>> {
    let token_env = entry.token_env();
    let token = env(token_env)
        .filter(|t| !t.trim().is_empty())
        .with_context(|| format!("environment variable {token_env} is not set"))?;

    let provider: Box<dyn Provider> = match &entry.kind {
        ProviderKind::GitHub { api_url, orgs } => {
            let mut config = GitHubConfig::new(token);
            config.api_url = api_url.clone();
            config.orgs = orgs.clone();
            config.http = http.clone();
            if let Some(per_page) = entry.per_page {
                config.per_page = per_page;
            }
            if let Some(workers) = entry.workers {
                config.workers = workers;
            }
            Box::new(GitHubProvider::new(config)?)
        }
        ProviderKind::GitLab { api_url, groups } => {
            let mut config = GitLabConfig::new(token);
            config.api_url = api_url.clone();
            config.groups = groups.clone();
            config.http = http.clone();
            if let Some(per_page) = entry.per_page {
                config.per_page = per_page;
            }
            if let Some(workers) = entry.workers {
                config.workers = workers;
            }
            Box::new(GitLabProvider::new(config)?)
        }
        ProviderKind::Gitea {
            api_url,
            username,
            orgs,
        } => {
            let mut config = GiteaConfig::new(api_url.clone(), token);
            config.username = username.clone();
            config.orgs = orgs.clone();
            config.http = http.clone();
            if let Some(per_page) = entry.per_page {
                config.per_page = per_page;
            }
            if let Some(workers) = entry.workers {
                config.workers = workers;
            }
            Box::new(GiteaProvider::new(config)?)
        }
    };

    Ok(provider)
}

/// Build every enabled provider.
pub fn build_providers(
    entries: &[ProviderEntry],
    http: &HttpOptions,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Vec<Box<dyn Provider>>> {
    entries
        .iter()
        .filter(|entry| entry.enabled)
        .map(|entry| build_provider(entry, http, &env))
        .collect()
}
