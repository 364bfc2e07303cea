//! Storage backends for the serialized preference file.
//!
//! - [`FileStorage`]: a single text file, replaced atomically on write
//! - [`MemoryStorage`]: in-memory contents (testing and hosts without a file system)

use async_trait::async_trait;
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{PreferencesError, Result};

/// The medium the preference file lives on.
///
/// Implementations only move whole documents; parsing lives in
/// [`crate::format`] and locking in [`crate::persist`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the whole document.
    ///
    /// Returns `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<String>>;

    /// Replace the whole document.
    ///
    /// Readers must never observe a partially written document.
    async fn store(&self, contents: &str) -> Result<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// File-backed storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    sync: bool,
}

impl FileStorage {
    /// Storage at `path`, fsyncing each write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sync: true,
        }
    }

    /// Enable or disable `sync_all` before the rename.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        if self.sync {
            file.sync_all().await?;
        }
        drop(file);

        fs::rename(&temp, &self.path).await?;
        debug!("Replaced {} ({} bytes)", self.path.display(), contents.len());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory storage.
///
/// Reads and writes can be made to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    contents: RwLock<Option<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that already holds a document.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        let storage = Self::new();
        *storage.contents.write() = Some(contents.into());
        storage
    }

    /// The current document.
    pub fn contents(&self) -> Option<String> {
        self.contents.read().clone()
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PreferencesError::Storage("medium unavailable".to_string()));
        }
        Ok(self.contents())
    }

    async fn store(&self, contents: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PreferencesError::Storage("medium is read-only".to_string()));
        }
        *self.contents.write() = Some(contents.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
