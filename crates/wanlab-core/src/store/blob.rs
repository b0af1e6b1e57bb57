// ── Opaque blob storage ──
//
// The config store persists a handful of JSON documents by name. No
// transactions: each `put` replaces one blob atomically and that is all.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::error::CoreError;

/// Named string blobs.
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when the blob does not exist.
    fn get(&self, name: &str) -> Result<Option<String>, CoreError>;
    /// Replace the blob. Readers see either the old or the new content.
    fn put(&self, name: &str, contents: &str) -> Result<(), CoreError>;
    /// Delete the blob; deleting a missing blob is not an error.
    fn remove(&self, name: &str) -> Result<(), CoreError>;
}

// ── FileBlobStore ────────────────────────────────────────────────────

/// One `<name>.json` file per blob under a directory, written via a temp
/// file and rename.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, name: &str) -> Result<Option<String>, CoreError> {
        match std::fs::read_to_string(self.path_for(name)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, name: &str, contents: &str) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), bytes = contents.len(), "blob written");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), CoreError> {
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ── MemoryBlobStore ──────────────────────────────────────────────────

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, name: &str) -> Result<Option<String>, CoreError> {
        Ok(self.blobs.get(name).map(|r| r.value().clone()))
    }

    fn put(&self, name: &str, contents: &str) -> Result<(), CoreError> {
        self.blobs.insert(name.to_owned(), contents.to_owned());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), CoreError> {
        self.blobs.remove(name);
        Ok(())
    }
}
