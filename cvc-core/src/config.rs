//! Typed configuration, directory layout, and the workspace discovery
//! contract consumed by front-ends.
//!
//! On-disk layout under the repository root:
//! ```text
//! <repo>/.cvc/
//!   cvc.db               — SQLite index
//!   objects/<aa>/<…>     — content-addressed blob store
//!   context_cache.json   — persistent context cache
//!   chroma/              — optional semantic store
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::model::Mode;

/// Max commits between anchors on a linear history
pub const DEFAULT_ANCHOR_INTERVAL: u32 = 10;
/// Delta abandoned if larger than this fraction of the anchor size
pub const DEFAULT_DELTA_RATIO: f64 = 0.5;
/// Below this raw size, never delta
pub const DEFAULT_DELTA_MIN_SIZE: usize = 4096;
/// Zstandard compression level for anchors and deltas
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;
/// Assistant turns per auto-commit in interactive mode
pub const AUTO_COMMIT_INTERVAL_CLI: u32 = 2;
/// Assistant turns per auto-commit behind a pass-through proxy
pub const AUTO_COMMIT_INTERVAL_PROXY: u32 = 3;

/// Runtime configuration for one engine session
#[derive(Debug, Clone)]
pub struct CvcConfig {
    /// Absolute repository root; the `.cvc/` directory lives beneath it
    pub repo_root: PathBuf,
    pub agent_id: String,
    pub default_branch: String,
    pub mode: Mode,
    pub anchor_interval: u32,
    pub auto_commit_interval: u32,
    pub delta_ratio: f64,
    pub delta_min_size: usize,
    pub zstd_level: i32,
    pub vector_enabled: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl CvcConfig {
    /// Defaults for a repository root; `auto_commit_interval` follows the
    /// front-end mode
    pub fn new(repo_root: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            repo_root: repo_root.into(),
            agent_id: "agent".to_string(),
            default_branch: "main".to_string(),
            mode,
            anchor_interval: DEFAULT_ANCHOR_INTERVAL,
            auto_commit_interval: default_auto_commit_interval(mode),
            delta_ratio: DEFAULT_DELTA_RATIO,
            delta_min_size: DEFAULT_DELTA_MIN_SIZE,
            zstd_level: DEFAULT_ZSTD_LEVEL,
            vector_enabled: false,
            provider: None,
            model: None,
        }
    }

    pub fn cvc_dir(&self) -> PathBuf {
        self.repo_root.join(".cvc")
    }

    pub fn db_path(&self) -> PathBuf {
        self.cvc_dir().join("cvc.db")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.cvc_dir().join("objects")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cvc_dir().join("context_cache.json")
    }

    pub fn chroma_dir(&self) -> PathBuf {
        self.cvc_dir().join("chroma")
    }

    /// Create all required directories
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.objects_dir())?;
        if self.vector_enabled {
            std::fs::create_dir_all(self.chroma_dir())?;
        }
        Ok(())
    }
}

fn default_auto_commit_interval(mode: Mode) -> u32 {
    match mode {
        Mode::Proxy => AUTO_COMMIT_INTERVAL_PROXY,
        _ => AUTO_COMMIT_INTERVAL_CLI,
    }
}

/// Markers that identify a workspace root during the ancestor walk
const ROOT_MARKERS: &[&str] = &[".cvc", ".git", "Cargo.toml", "pyproject.toml", "package.json"];

/// Resolve the workspace root for a front-end, first match wins:
/// explicit override, the `CVC_WORKSPACE` environment variable, an ancestor
/// walk from the working directory stopping at the first marker, and
/// finally the working directory itself (with a warning).
///
/// The engine never calls this; it requires a `repo_root` at construction.
pub fn discover_workspace(explicit: Option<&Path>) -> PathBuf {
    if let Some(root) = explicit {
        return root.to_path_buf();
    }
    if let Ok(env_root) = env::var("CVC_WORKSPACE") {
        if !env_root.is_empty() {
            return PathBuf::from(env_root);
        }
    }
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut current = cwd.as_path();
    loop {
        if ROOT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    tracing::warn!(
        "no workspace marker found above {}; using working directory",
        cwd.display()
    );
    cwd
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let cfg = CvcConfig::new("/tmp/proj", Mode::Cli);
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/proj/.cvc/cvc.db"));
        assert_eq!(cfg.objects_dir(), PathBuf::from("/tmp/proj/.cvc/objects"));
        assert_eq!(
            cfg.cache_path(),
            PathBuf::from("/tmp/proj/.cvc/context_cache.json")
        );
    }

    #[test]
    fn test_auto_commit_interval_follows_mode() {
        assert_eq!(CvcConfig::new("/p", Mode::Cli).auto_commit_interval, 2);
        assert_eq!(CvcConfig::new("/p", Mode::Proxy).auto_commit_interval, 3);
    }

    #[test]
    fn test_discover_explicit_override_wins() {
        let dir = TempDir::new().unwrap();
        let found = discover_workspace(Some(dir.path()));
        assert_eq!(found, dir.path());
    }
}
