use std::collections::HashSet;

use bundle_backup::{Provider, ProviderError, Repository};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::credentials;
use crate::http::{ApiClient, HttpOptions, encode_segment, endpoint};

/// Default `MAX_RESPONSE_ITEMS` of a Gitea server. Servers configured lower
/// are still paged to the end through their `Link` headers.
const MAX_PER_PAGE: usize = 50;

/// Configuration for a Gitea provider. Gitea is self-hosted, so the API URL
/// (e.g. `https://gitea.example.com/api/v1`) is required.
#[derive(Debug, Clone)]
pub struct GiteaConfig {
    pub token: String,
    pub api_url: String,
    /// Clone as this user with the token as password. Without it the token
    /// itself is the username.
    pub username: Option<String>,
    pub orgs: Vec<String>,
    pub per_page: usize,
    pub workers: usize,
    pub http: HttpOptions,
}

impl GiteaConfig {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: api_url.into(),
            username: None,
            orgs: Vec::new(),
            per_page: 50,
            workers: bundle_backup::provider::DEFAULT_WORKERS,
            http: HttpOptions::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    clone_url: String,
}

pub struct GiteaProvider {
    config: GiteaConfig,
    client: ApiClient,
}

impl GiteaProvider {
    pub fn new(config: GiteaConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("token {}", config.token))
                .map_err(|_| ProviderError::Config("Gitea token is not a valid header".into()))?,
        );

        let client = ApiClient::new(config.http.clone(), headers)?;
        Ok(Self { config, client })
    }

    async fn list_all(&self, path: &str) -> Result<Vec<RepoResponse>, ProviderError> {
        let url = endpoint(&self.config.api_url, path)?;
        self.client
            .get_all(&url, "limit", self.config.per_page.min(MAX_PER_PAGE))
            .await
    }

    fn to_repository(&self, response: RepoResponse) -> Result<Repository, ProviderError> {
        let domain = credentials::domain(&response.clone_url)?;
        let credentialed = match &self.config.username {
            Some(user) => credentials::embed(&response.clone_url, user, Some(&self.config.token))?,
            None => credentials::embed(&response.clone_url, &self.config.token, None)?,
        };

        Ok(Repository::new(domain, response.full_name, response.clone_url)
            .with_credentialed_url(credentialed))
    }
}

#[async_trait::async_trait]
impl Provider for GiteaProvider {
    fn name(&self) -> &str {
        "gitea"
    }

    fn workers(&self) -> usize {
        self.config.workers
    }

    #[instrument(skip_all, fields(provider = "gitea"))]
    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError> {
        let mut responses = Vec::new();

        if self.config.orgs.is_empty() {
            responses.extend(self.list_all("user/repos").await?);
        } else {
            for org in &self.config.orgs {
                let path = format!("orgs/{}/repos", encode_segment(org));
                responses.extend(self.list_all(&path).await?);
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
