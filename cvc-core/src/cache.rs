//! Persistent uncommitted-context cache.
//!
//! A single `context_cache.json` under the `.cvc/` directory mirrors the
//! in-memory context window so a crash between commits loses nothing.
//! Writes always go through a temp file and an atomic rename; readers
//! tolerate unknown fields, and a corrupt file degrades to "no cache".

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::error::{CvcError, Result};
use crate::model::{now_seconds, Message, Mode};

/// On-disk cache schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub messages: Vec<Message>,
    pub timestamp: f64,
    pub mode: Mode,
    pub branch: String,
}

/// Single-writer crash-recovery file for the context window
pub struct PersistentCache {
    path: PathBuf,
}

impl PersistentCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Replace the cache with the current window state
    pub fn save(&self, messages: &[Message], mode: Mode, branch: &str) -> Result<()> {
        let snapshot = CacheSnapshot {
            messages: messages.to_vec(),
            timestamp: now_seconds(),
            mode,
            branch: branch.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the cached window, or `None` when the file is missing or
    /// unreadable (logged, never fatal)
    pub fn load(&self) -> Option<CacheSnapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("context cache unreadable, ignoring: {e}");
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<CacheSnapshot>> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: CacheSnapshot = serde_json::from_slice(&data)
            .map_err(|e| CvcError::CacheCorrupt(e.to_string()))?;
        Ok(Some(snapshot))
    }

    /// Drop the cache after its content has been committed
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
