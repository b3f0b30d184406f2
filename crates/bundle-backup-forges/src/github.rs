use std::collections::HashSet;

use bundle_backup::{Provider, ProviderError, Repository};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::credentials;
use crate::http::{ApiClient, HttpOptions, encode_segment, endpoint};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// User GitHub expects in token-authenticated HTTPS clone URLs.
const CLONE_USER: &str = "x-access-token";

/// GitHub caps pages at this size.
const MAX_PER_PAGE: usize = 100;

/// Configuration for a GitHub provider.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    pub api_url: Option<String>,
    /// Organizations to back up. Empty means the token owner's own repos.
    pub orgs: Vec<String>,
    pub per_page: usize,
    pub workers: usize,
    pub http: HttpOptions,
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: None,
            orgs: Vec::new(),
            per_page: 100,
            workers: bundle_backup::provider::DEFAULT_WORKERS,
            http: HttpOptions::default(),
        }
    }
}

/// One entry of `GET /user/repos` or `GET /orgs/{org}/repos`.
#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    clone_url: String,
}

/// Lists repositories through the GitHub REST API.
pub struct GitHubProvider {
    config: GitHubConfig,
    client: ApiClient,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| ProviderError::Config("GitHub token is not a valid header".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        let client = ApiClient::new(config.http.clone(), headers)?;
        Ok(Self { config, client })
    }

    fn api_base(&self) -> &str {
        self.config.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    async fn list_all(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<RepoResponse>, ProviderError> {
        let mut url = endpoint(self.api_base(), path)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        self.client
            .get_all(&url, "per_page", self.config.per_page.min(MAX_PER_PAGE))
            .await
    }

    fn to_repository(&self, response: RepoResponse) -> Result<Repository, ProviderError> {
        let domain = credentials::domain(&response.clone_url)?;
        let credentialed =
            credentials::embed(&response.clone_url, CLONE_USER, Some(&self.config.token))?;

        Ok(Repository::new(domain, response.full_name, response.clone_url)
            .with_credentialed_url(credentialed))
    }
}

#[async_trait::async_trait]
impl Provider for GitHubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn workers(&self) -> usize {
        self.config.workers
    }

    #[instrument(skip_all, fields(provider = "github"))]
    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError> {
        let mut responses = Vec::new();

        if self.config.orgs.is_empty() {
            responses.extend(
                self.list_all("user/repos", &[("affiliation", "owner")])
                    .await?,
            );
        } else {
            for org in &self.config.orgs {
                let path = format!("orgs/{}/repos", encode_segment(org));
                responses.extend(self.list_all(&path, &[]).await?);
            }
        }

        let mut seen = HashSet::new();
        let mut repos = Vec::with_capacity(responses.len());
        for response in responses {
            if seen.insert(response.full_name.clone()) {
                repos.push(self.to_repository(response)?);
            }
        }

        debug!(count = repos.len(), "listed repositories");
        Ok(repos)
    }
}
