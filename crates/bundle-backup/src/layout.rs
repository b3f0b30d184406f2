use std::path::{Component, Path, PathBuf};

use crate::repository::Repository;

/// Name of the scratch area under the backup root.
pub const WORKING_DIR: &str = ".working";

/// Maps repositories onto the backup tree:
///
/// - bundles: `<root>/<domain>/<owner>/<repo>/`
/// - scratch mirrors: `<root>/.working/<domain>/<owner>/<repo>/`
#[derive(Debug, Clone)]
pub struct BackupLayout {
    root: PathBuf,
}

/// The two directories one repository's backup touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    pub backup_dir: PathBuf,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("invalid path segment {segment:?} in {value:?}")]
    InvalidSegment { value: String, segment: String },

    #[error("cannot resolve backup root {0}: {1}")]
    Root(PathBuf, String),
}

impl BackupLayout {
    /// The root is made absolute so git invocations with a different working
    /// directory still resolve paths under it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let root = root.as_ref();
        let root = std::path::absolute(root)
            .map_err(|e| LayoutError::Root(root.to_path_buf(), e.to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn working_root(&self) -> PathBuf {
        self.root.join(WORKING_DIR)
    }

    /// Resolve a repository's directories. Domains and namespaces with empty,
    /// `.` or `..` segments are rejected so no repository can escape its
    /// subtree or collide with the scratch area.
    pub fn paths_for(&self, repo: &Repository) -> Result<RepoPaths, LayoutError> {
        let domain = checked_relative(&repo.domain)?;
        if domain.components().count() != 1 || repo.domain == WORKING_DIR {
            return Err(LayoutError::InvalidSegment {
                value: repo.domain.clone(),
                segment: repo.domain.clone(),
            });
        }
        let namespace = checked_relative(&repo.path_with_namespace)?;

        Ok(RepoPaths {
            backup_dir: self.root.join(&domain).join(&namespace),
            working_dir: self.working_root().join(&domain).join(&namespace),
        })
    }
}

fn checked_relative(value: &str) -> Result<PathBuf, LayoutError> {
    let invalid = |segment: &str| LayoutError::InvalidSegment {
        value: value.to_owned(),
        segment: segment.to_owned(),
    };

    if value.is_empty() {
        return Err(invalid(value));
    }

    for segment in value.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(invalid(segment));
        }
    }

    let path = PathBuf::from(value);
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(invalid(value));
    }

    Ok(path)
}
