//! Optional embedding-based recall over commit summaries.
//!
//! The semantic tier is advisory: absence, failure, or staleness never
//! blocks a commit or a restore, so every operation here degrades to a
//! logged no-op instead of surfacing an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::model::Digest;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorRecord {
    summary: String,
    vector: Vec<f32>,
}

/// Similarity store persisted as a JSON sidecar under the chroma directory
pub struct SemanticStore {
    enabled: bool,
    path: PathBuf,
    records: HashMap<String, VectorRecord>,
}

impl SemanticStore {
    pub fn open(chroma_dir: PathBuf, enabled: bool) -> Self {
        let path = chroma_dir.join("vectors.json");
        let mut store = Self {
            enabled,
            path,
            records: HashMap::new(),
        };
        if enabled {
            store.load();
        }
        store
    }

    pub fn available(&self) -> bool {
        self.enabled
    }

    fn load(&mut self) {
        match fs::read(&self.path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(records) => self.records = records,
                Err(e) => warn!("semantic store sidecar unreadable, starting empty: {e}"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("semantic store sidecar unreadable, starting empty: {e}"),
        }
    }

    fn persist(&self) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp = self.path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
            let data = serde_json::to_vec(&self.records)?;
            fs::write(&tmp, data)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!("semantic store persist failed (non-fatal): {e}");
        }
    }

    /// Insert or replace the summary and vector for a commit
    pub fn upsert(&mut self, commit_hash: &Digest, summary: &str, vector: Vec<f32>) {
        if !self.enabled {
            return;
        }
        self.records.insert(
            commit_hash.to_hex(),
            VectorRecord {
                summary: summary.to_string(),
                vector,
            },
        );
        self.persist();
    }

    /// The `k` nearest commits by cosine distance (lower is closer).
    /// Returns an empty list when the tier is disabled.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(Digest, f64)> {
        if !self.enabled {
            return Vec::new();
        }
        let mut scored: Vec<(Digest, f64)> = self
            .records
            .iter()
            .filter_map(|(hex, rec)| {
                let hash = Digest::from_hex(hex).ok()?;
                Some((hash, cosine_distance(query, &rec.vector)))
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        scored
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_disabled_store_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = SemanticStore::open(dir.path().join("chroma"), false);
        store.upsert(&Digest::from_data(b"c"), "summary", vec![1.0]);
        assert!(store.nearest(&[1.0], 5).is_empty());
        assert!(!dir.path().join("chroma/vectors.json").exists());
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let mut store = SemanticStore::open(dir.path().join("chroma"), true);
        let close = Digest::from_data(b"close");
        let far = Digest::from_data(b"far");
        store.upsert(&close, "close", vec![1.0, 0.0]);
        store.upsert(&far, "far", vec![0.0, 1.0]);

        let hits = store.nearest(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, close);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let hash = Digest::from_data(b"c");
        {
            let mut store = SemanticStore::open(dir.path().join("chroma"), true);
            store.upsert(&hash, "summary", vec![0.5, 0.5]);
        }
        let store = SemanticStore::open(dir.path().join("chroma"), true);
        let hits = store.nearest(&[0.5, 0.5], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, hash);
    }
}
