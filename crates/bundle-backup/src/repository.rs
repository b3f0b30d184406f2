use std::fmt;

/// A remote repository to back up, as produced by a provider's lister.
#[derive(Clone, PartialEq, Eq)]
pub struct Repository {
    /// Hostname of the hosting service, e.g. `github.com`.
    pub domain: String,
    /// `owner/repo`, possibly with nested groups. Keys the on-disk directory.
    pub path_with_namespace: String,
    pub name: String,
    /// Plain HTTPS clone URL.
    pub http_url: String,
    /// Clone URL with a token or basic-auth credentials embedded.
    pub credentialed_url: Option<String>,
}

impl Repository {
    pub fn new(
        domain: impl Into<String>,
        path_with_namespace: impl Into<String>,
        http_url: impl Into<String>,
    ) -> Self {
        let path_with_namespace = path_with_namespace.into();
        let name = path_with_namespace
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned();

        Self {
            domain: domain.into(),
            path_with_namespace,
            name,
            http_url: http_url.into(),
            credentialed_url: None,
        }
    }

    pub fn with_credentialed_url(mut self, url: impl Into<String>) -> Self {
        self.credentialed_url = Some(url.into());
        self
    }

    /// `domain/path_with_namespace`, used to identify results.
    pub fn id(&self) -> String {
        format!("{}/{}", self.domain, self.path_with_namespace)
    }

    /// The URL to clone from: the credentialed variant when there is one.
    pub fn clone_url(&self) -> &str {
        self.credentialed_url.as_deref().unwrap_or(&self.http_url)
    }
}

// Credentials never reach debug output.
impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("domain", &self.domain)
            .field("path_with_namespace", &self.path_with_namespace)
            .field("name", &self.name)
            .field("http_url", &self.http_url)
            .field(
                "credentialed_url",
                &self.credentialed_url.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path_with_namespace)
    }
}
