use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bundle_backup::DiffMode;
use bundle_backup_forges::HttpOptions;
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub backup_root: PathBuf,
    #[serde(default)]
    pub diff_mode: DiffMode,
    /// Bundles kept per repository; `0` keeps all of them.
    #[serde(default)]
    pub retention: usize,
    /// `0` disables the timeout.
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// `0` disables the request timeout.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let options = HttpOptions::default();
        Self {
            timeout_secs: options.timeout.map_or(0, |t| t.as_secs()),
            max_attempts: options.max_attempts,
            min_backoff_ms: options.min_backoff.as_millis() as u64,
            max_backoff_ms: options.max_backoff.as_millis() as u64,
        }
    }
}

impl HttpConfig {
    pub fn to_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            max_attempts: self.max_attempts,
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// A single configured hosting provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Environment variable holding the API token.
    pub token_env: Option<String>,
    pub workers: Option<usize>,
    pub per_page: Option<usize>,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

/// The kind of hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub {
        api_url: Option<String>,
        #[serde(default)]
        orgs: Vec<String>,
    },
    GitLab {
        api_url: Option<String>,
        #[serde(default)]
        groups: Vec<String>,
    },
    Gitea {
        api_url: String,
        username: Option<String>,
        #[serde(default)]
        orgs: Vec<String>,
    },
}

impl ProviderEntry {
    /// The configured token variable, or the provider's conventional one.
    pub fn token_env(&self) -> &str {
        if let Some(name) = &self.token_env {
            return name;
        }
        match self.kind {
            ProviderKind::GitHub { .. } => "GITHUB_TOKEN",
            ProviderKind::GitLab { .. } => "GITLAB_TOKEN",
            ProviderKind::Gitea { .. } => "GITEA_TOKEN",
        }
    }
}

impl AppConfig {
    pub fn git_timeout(&self) -> Option<Duration> {
        (self.git_timeout_secs > 0).then(|| Duration::from_secs(self.git_timeout_secs))
    }
}

fn default_true() -> bool {
    true
}

fn default_git_timeout_secs() -> u64 {
    3600
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

/// Config file path: `~/.config/bundle-backup/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bundle-backup").join("config.toml"))
}

/// Load config from `path`, or from [`config_path`] when none is given.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path().context("could not determine config directory")?,
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str(r#"backup_root = "/srv/backups""#).unwrap();

        assert_eq!(config.backup_root, PathBuf::from("/srv/backups"));
        assert_eq!(config.diff_mode, DiffMode::Clone);
        assert_eq!(config.retention, 0);
        assert_eq!(config.git_timeout(), Some(Duration::from_secs(3600)));
        assert_eq!(config.git_binary, PathBuf::from("git"));
        assert_eq!(config.http, HttpConfig::default());
        assert!(config.providers.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
backup_root = "/srv/backups"
diff_mode = "refs"
retention = 7
git_timeout_secs = 0
git_binary = "/usr/local/bin/git"

[http]
timeout_secs = 10
max_attempts = 5

[[providers]]
type = "github"
orgs = ["acme"]
workers = 8

[[providers]]
type = "gitlab"
api_url = "https://gitlab.example.com/api/v4"
groups = ["parent/child"]
token_env = "WORK_GITLAB_TOKEN"
per_page = 50

[[providers]]
type = "gitea"
api_url = "https://gitea.example.com/api/v1"
username = "soba"
enabled = false
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.diff_mode, DiffMode::Refs);
        assert_eq!(config.retention, 7);
        assert_eq!(config.git_timeout(), None);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.http.min_backoff_ms, HttpConfig::default().min_backoff_ms);
        assert_eq!(config.providers.len(), 3);

        let github = &config.providers[0];
        assert!(github.enabled);
        assert_eq!(github.workers, Some(8));
        assert_eq!(github.token_env(), "GITHUB_TOKEN");
        assert_eq!(
            github.kind,
            ProviderKind::GitHub {
                api_url: None,
                orgs: vec!["acme".into()]
            }
        );

        let gitlab = &config.providers[1];
        assert_eq!(gitlab.token_env(), "WORK_GITLAB_TOKEN");
        assert_eq!(gitlab.per_page, Some(50));
        assert!(matches!(&gitlab.kind, ProviderKind::GitLab { groups, .. } if groups == &["parent/child"]));

        let gitea = &config.providers[2];
        assert!(!gitea.enabled);
        assert_eq!(gitea.token_env(), "GITEA_TOKEN");
        match &gitea.kind {
            ProviderKind::Gitea {
                api_url, username, ..
            } => {
                assert_eq!(api_url, "https://gitea.example.com/api/v1");
                assert_eq!(username.as_deref(), Some("soba"));
            }
            other => panic!("expected Gitea, got {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_type_is_rejected() {
        let toml_str = r#"
backup_root = "/srv/backups"

[[providers]]
type = "bitbucket"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }

    #[test]
    fn gitea_requires_api_url() {
        let toml_str = r#"
backup_root = "/srv/backups"

[[providers]]
type = "gitea"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }

    #[test]
    fn missing_backup_root_is_rejected() {
        assert!(toml::from_str::<AppConfig>("retention = 3").is_err());
    }

    #[test]
    fn http_config_converts_to_options() {
        let http = HttpConfig {
            timeout_secs: 5,
            max_attempts: 4,
            min_backoff_ms: 100,
            max_backoff_ms: 2000,
        };
        let options = http.to_options();
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.max_attempts, 4);
        assert_eq!(options.min_backoff, Duration::from_millis(100));
        assert_eq!(options.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn zero_http_timeout_disables_it() {
        let config: AppConfig = toml::from_str(
            r#"
backup_root = "/b"

[http]
timeout_secs = 0
"#,
        )
        .unwrap();

        assert_eq!(config.http.to_options().timeout, None);
        assert_eq!(config.http.max_attempts, HttpOptions::default().max_attempts);
    }

    #[test]
    fn load_config_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backup_root = \"/b\"\nretention = 2\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.retention, 2);

        let err = load_config(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
