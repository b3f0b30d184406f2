use std::collections::HashSet;

use bundle_backup::{Provider, ProviderError, Repository};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::credentials;
use crate::http::{ApiClient, HttpOptions, encode_segment, endpoint};

pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

const CLONE_USER: &str = "oauth2";

/// GitLab caps pages at this size.
const MAX_PER_PAGE: usize = 100;

/// Configuration for a GitLab provider.
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    pub token: String,
    pub api_url: Option<String>,
    /// Groups to back up, subgroups included. Empty means every project the
    /// token's user is a member of.
    pub groups: Vec<String>,
    pub per_page: usize,
    pub workers: usize,
    pub http: HttpOptions,
}

impl GitLabConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: None,
            groups: Vec::new(),
            per_page: 100,
            workers: bundle_backup::provider::DEFAULT_WORKERS,
            http: HttpOptions::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    path_with_namespace: String,
    http_url_to_repo: String,
}

/// Lists projects through the GitLab REST API (v4).
pub struct GitLabProvider {
    config: GitLabConfig,
    client: ApiClient,
}

impl GitLabProvider {
    pub fn new(config: GitLabConfig) -> Result<Self, ProviderError> {
        let token = HeaderValue::from_str(&config.token)
            .map_err(|_| ProviderError::Config("GitLab token is not a valid header".into()))?;
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("private-token"), token);

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
    ) -> Result<Vec<ProjectResponse>, ProviderError> {
        let mut url = endpoint(self.api_base(), path)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        self.client
            .get_all(&url, "per_page", self.config.per_page.min(MAX_PER_PAGE))
            .await
    }

    fn to_repository(&self, project: ProjectResponse) -> Result<Repository, ProviderError> {
        let domain = credentials::domain(&project.http_url_to_repo)?;
        let credentialed =
            credentials::embed(&project.http_url_to_repo, CLONE_USER, Some(&self.config.token))?;

        Ok(
            Repository::new(domain, project.path_with_namespace, project.http_url_to_repo)
                .with_credentialed_url(credentialed),
        )
    }
}

#[async_trait::async_trait]
impl Provider for GitLabProvider {
    fn name(&self) -> &str {
        "gitlab"
    }

    fn workers(&self) -> usize {
        self.config.workers
    }

    #[instrument(skip_all, fields(provider = "gitlab"))]
    async fn list_repositories(&self) -> Result<Vec<Repository>, ProviderError> {
        let mut projects = Vec::new();

        if self.config.groups.is_empty() {
            projects.extend(self.list_all("projects", &[("membership", "true")]).await?);
        } else {
            for group in &self.config.groups {
                let path = format!("groups/{}/projects", encode_segment(group));
                projects.extend(
                    self.list_all(&path, &[("include_subgroups", "true")])
                        .await?,
                );
            }
        }

        // A project can show up under several overlapping groups.
        let mut seen = HashSet::new();
        let mut repos = Vec::with_capacity(projects.len());
        for project in projects {
            if seen.insert(project.path_with_namespace.clone()) {
                repos.push(self.to_repository(project)?);
            }
        }

        debug!(count = repos.len(), "listed projects");
        Ok(repos)
    }
}
