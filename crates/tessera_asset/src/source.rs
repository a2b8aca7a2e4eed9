//! Byte sources the asset manager reads from

use crate::AssetError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

/// Where asset text comes from.
///
/// Paths are relative, `/`-separated (`blueprint/crate.json`).
pub trait AssetSource: Send + Sync {
    /// Contents of `path`, or `None` if nothing exists there.
    fn read(&self, path: &str) -> Result<Option<String>, AssetError>;

    /// Monotonic version of `path`. Any change to the file must produce a
    /// larger value.
    fn modified(&self, path: &str) -> Option<u64>;
}

/// Files under a root directory, versioned by modification time.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl AssetSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Option<String>, AssetError> {
        let full = self.resolve(path);
        let bytes = match std::fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AssetError::Io {
                    path: full.display().to_string(),
                    source,
                })
            }
        };
        String::from_utf8(bytes).map(Some).map_err(|_| AssetError::InvalidUtf8 {
            path: full.display().to_string(),
        })
    }

    fn modified(&self, path: &str) -> Option<u64> {
        let modified = std::fs::metadata(self.resolve(path)).ok()?.modified().ok()?;
        let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
        u64::try_from(nanos).ok()
    }
}

/// In-memory files. Every write bumps a shared version counter, so hot
/// reload can be driven without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, (String, u64)>>,
    version: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        self.files
            .write()
            .insert(path.into(), (content.into(), version));
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Option<String>, AssetError> {
        Ok(self.files.read().get(path).map(|(content, _)| content.clone()))
    }

    fn modified(&self, path: &str) -> Option<u64> {
        self.files.read().get(path).map(|&(_, version)| version)
    }
}
