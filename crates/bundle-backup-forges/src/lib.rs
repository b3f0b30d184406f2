pub mod credentials;
pub mod gitea;
pub mod github;
pub mod gitlab;
pub mod http;

pub use gitea::{GiteaConfig, GiteaProvider};
pub use github::{GitHubConfig, GitHubProvider};
pub use gitlab::{GitLabConfig, GitLabProvider};
pub use http::{ApiClient, HttpOptions};
