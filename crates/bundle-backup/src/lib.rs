pub mod bundle;
pub mod context;
pub mod diff;
pub mod git;
pub mod layout;
pub mod orchestrator;
pub mod provider;
pub mod refs;
pub mod repository;
pub mod result;
pub mod store;
pub mod worker;

pub use bundle::BundleFile;
pub use context::{BackupContext, BackupOptions, DiffMode};
pub use diff::remote_matches_local;
pub use git::{Git, GitError, GitOutput};
pub use layout::{BackupLayout, LayoutError, RepoPaths};
pub use orchestrator::backup_provider;
pub use provider::{Provider, ProviderError};
pub use refs::{GitRefs, RefsDelta};
pub use repository::Repository;
pub use result::{BackupError, BackupStatus, Outcome, ProviderBackupResult, RepoBackupResult};
pub use store::{BundleStore, Dedup, Snapshot, StoreError};
pub use worker::backup_repository;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
