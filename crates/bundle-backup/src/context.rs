use serde::{Deserialize, Serialize};

use crate::git::Git;
use crate::layout::BackupLayout;

/// How a worker decides whether a repository needs a new bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Always clone, then let deduplication drop an identical bundle.
    #[default]
    Clone,
    /// Compare remote refs with the latest bundle and skip the clone when
    /// they match.
    Refs,
}

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub diff_mode: DiffMode,
    /// Bundles kept per repository; `0` keeps all of them.
    pub retention: usize,
}

/// Shared, read-only state for one backup run.
#[derive(Debug, Clone)]
pub struct BackupContext {
    pub layout: BackupLayout,
    pub options: BackupOptions,
    pub git: Git,
}

impl BackupContext {
    pub fn new(layout: BackupLayout, options: BackupOptions) -> Self {
        Self {
            layout,
            options,
            git: Git::default(),
        }
    }

    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }
}
