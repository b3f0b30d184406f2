use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use sha2::{Digest, Sha256};

/// Extension of every bundle file.
pub const BUNDLE_EXTENSION: &str = "bundle";

/// Suffix appended to bundles git cannot read.
pub const INVALID_SUFFIX: &str = ".invalid";

/// `YYYYMMDDHHMMSS`, the timestamp segment of a bundle file name.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const TIMESTAMP_LEN: usize = 14;

/// A bundle file on disk, named `<repo>.<YYYYMMDDHHMMSS>.bundle`.
///
/// The embedded timestamp is the only ordering key; file modification times
/// are never consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    path: PathBuf,
    created: NaiveDateTime,
}

impl BundleFile {
    /// Recognise `path` as a bundle file. Returns `None` when the file name
    /// does not follow the naming contract.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let created = parse_file_name(path.file_name()?.to_str()?)?;
        Some(Self { path, created })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    /// Size in bytes, read from file metadata.
    pub async fn size(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Hex-encoded SHA-256 of the file contents.
    pub async fn content_hash(&self) -> std::io::Result<String> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            Ok::<_, std::io::Error>(hex::encode(hasher.finalize()))
        })
        .await
        .map_err(std::io::Error::other)?
    }

    /// Where this bundle goes when it is found to be corrupt.
    pub fn invalid_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(INVALID_SUFFIX);
        PathBuf::from(name)
    }
}

impl fmt::Display for BundleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// `<repo>.<timestamp>.bundle`
pub fn file_name(repo_name: &str, created: NaiveDateTime) -> String {
    format!(
        "{repo_name}.{}.{BUNDLE_EXTENSION}",
        created.format(TIMESTAMP_FORMAT)
    )
}

/// Timestamp for a new bundle: now, or one second past the latest existing
/// bundle if that is not earlier. Keeps each new bundle strictly the most
/// recent even when runs land in the same second or the clock steps back.
pub fn next_timestamp(now: NaiveDateTime, latest: Option<NaiveDateTime>) -> NaiveDateTime {
    // Bundle names only carry whole seconds.
    let now = now.with_nanosecond(0).unwrap_or(now);

    match latest {
        Some(latest) if latest >= now => latest + TimeDelta::seconds(1),
        _ => now,
    }
}

/// Parse the timestamp out of a bundle file name. The name is read from the
/// right so repository names containing dots are accepted.
fn parse_file_name(name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(BUNDLE_EXTENSION)?.strip_suffix('.')?;
    let (prefix, timestamp) = stem.rsplit_once('.')?;

    if prefix.is_empty() {
        return None;
    }

    if timestamp.len() != TIMESTAMP_LEN || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()
}
