//! Anchor/delta decision and blob reconstruction.
//!
//! Deltas are Zstandard dictionary-compressed payloads whose dictionary is
//! the decompressed bytes of their anchor. Chains run strictly backwards to
//! exactly one anchor and are bounded by the anchor interval, so replay is
//! a single dictionary decompression against one anchor load.

use crate::blob_store::{BlobKind, BlobStore, StoredBlob};
use crate::error::{CvcError, Result};
use crate::model::Digest;

/// The write decision for one canonical payload
#[derive(Debug)]
pub struct WritePlan {
    pub kind: BlobKind,
    pub anchor_hash: Option<Digest>,
    pub compressed: Vec<u8>,
    pub decompressed_size: u64,
}

/// Context the planner needs about the predecessor's anchor
#[derive(Debug)]
pub struct AnchorContext {
    /// Content hash of the nearest reachable anchor
    pub anchor_hash: Digest,
    /// Decompressed canonical bytes of that anchor (the delta dictionary)
    pub anchor_bytes: Vec<u8>,
    /// Delta commits between the predecessor and the anchor, inclusive of
    /// the predecessor when it is itself a delta
    pub chain_len: u32,
}

/// Decides anchor vs delta at write time and replays chains on read
pub struct DeltaEngine {
    zstd_level: i32,
    anchor_interval: u32,
    delta_ratio: f64,
    delta_min_size: usize,
}

impl DeltaEngine {
    pub fn new(
        zstd_level: i32,
        anchor_interval: u32,
        delta_ratio: f64,
        delta_min_size: usize,
    ) -> Self {
        Self {
            zstd_level,
            anchor_interval: anchor_interval.max(1),
            delta_ratio,
            delta_min_size,
        }
    }

    /// Choose how to store `raw` given the predecessor's anchor context
    /// (`None` for genesis or when no anchor is reachable).
    pub fn plan(&self, raw: &[u8], anchor: Option<&AnchorContext>) -> Result<WritePlan> {
        let anchor = match anchor {
            Some(a) => a,
            None => return self.plan_anchor(raw),
        };
        // The candidate would sit chain_len + 1 deltas past the anchor
        if anchor.chain_len + 1 >= self.anchor_interval {
            return self.plan_anchor(raw);
        }
        if raw.len() < self.delta_min_size {
            return self.plan_anchor(raw);
        }

        let mut compressor =
            zstd::bulk::Compressor::with_dictionary(self.zstd_level, &anchor.anchor_bytes)?;
        let delta = compressor.compress(raw)?;

        let limit = (anchor.anchor_bytes.len() as f64 * self.delta_ratio) as usize;
        if delta.len() > limit {
            return self.plan_anchor(raw);
        }

        Ok(WritePlan {
            kind: BlobKind::Delta,
            anchor_hash: Some(anchor.anchor_hash),
            compressed: delta,
            decompressed_size: raw.len() as u64,
        })
    }

    fn plan_anchor(&self, raw: &[u8]) -> Result<WritePlan> {
        let compressed = zstd::bulk::compress(raw, self.zstd_level)?;
        Ok(WritePlan {
            kind: BlobKind::Anchor,
            anchor_hash: None,
            compressed,
            decompressed_size: raw.len() as u64,
        })
    }

    /// Write a planned blob and verify it reconstructs to its content hash.
    /// A failed verification deletes the file and aborts the write.
    pub fn write_verified(
        &self,
        store: &BlobStore,
        content_hash: &Digest,
        plan: &WritePlan,
    ) -> Result<()> {
        store.put(
            content_hash,
            plan.kind,
            plan.anchor_hash.as_ref(),
            plan.decompressed_size,
            &plan.compressed,
        )?;
        match self.reconstruct(store, content_hash) {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = store.delete(content_hash);
                Err(e)
            }
        }
    }

    /// Reconstruct the full canonical bytes for a content hash, replaying
    /// the delta chain to its anchor and verifying the digest.
    pub fn reconstruct(&self, store: &BlobStore, content_hash: &Digest) -> Result<Vec<u8>> {
        let record = store.get(content_hash)?;
        let raw = match record.kind {
            BlobKind::Anchor => decompress_anchor(&record)?,
            BlobKind::Delta => {
                let anchor_hash = record.anchor_hash.ok_or_else(|| CvcError::Integrity {
                    hash: *content_hash,
                    detail: "delta record lost its anchor hash".into(),
                })?;
                let anchor_record = store.get(&anchor_hash)?;
                if anchor_record.kind != BlobKind::Anchor {
                    return Err(CvcError::Integrity {
                        hash: *content_hash,
                        detail: format!("anchor {anchor_hash} is itself a delta"),
                    });
                }
                let dictionary = decompress_anchor(&anchor_record)?;
                let mut decompressor = zstd::bulk::Decompressor::with_dictionary(&dictionary)?;
                decompressor.decompress(&record.payload, record.decompressed_size as usize)?
            }
        };
        let digest = Digest::from_data(&raw);
        if digest != *content_hash {
            return Err(CvcError::Integrity {
                hash: *content_hash,
                detail: format!("reconstructed bytes hash to {digest}"),
            });
        }
        Ok(raw)
    }
}

fn decompress_anchor(record: &StoredBlob) -> Result<Vec<u8>> {
    Ok(zstd::bulk::decompress(
        &record.payload,
        record.decompressed_size as usize,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> DeltaEngine {
        DeltaEngine::new(3, 3, 0.5, 64)
    }

    fn store() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    fn payload(tag: &str) -> Vec<u8> {
        // Large, highly self-similar body so deltas pass the ratio guard
        format!("{{\"messages\":{}}}", "abcdefgh".repeat(512))
            .replace("abcd", tag)
            .into_bytes()
    }

    #[test]
    fn test_no_anchor_means_anchor() {
        let plan = engine().plan(b"genesis bytes", None).unwrap();
        assert_eq!(plan.kind, BlobKind::Anchor);
        assert!(plan.anchor_hash.is_none());
    }

    #[test]
    fn test_small_payload_never_deltas() {
        let eng = engine();
        let anchor_bytes = payload("anch");
        let ctx = AnchorContext {
            anchor_hash: Digest::from_data(&anchor_bytes),
            anchor_bytes,
            chain_len: 0,
        };
        let plan = eng.plan(b"tiny", Some(&ctx)).unwrap();
        assert_eq!(plan.kind, BlobKind::Anchor);
    }

    #[test]
    fn test_interval_forces_anchor() {
        let eng = engine();
        let anchor_bytes = payload("anch");
        let raw = payload("next");
        let ctx = AnchorContext {
            anchor_hash: Digest::from_data(&anchor_bytes),
            anchor_bytes,
            chain_len: 2, // candidate would be the 3rd delta with interval 3
        };
        let plan = eng.plan(&raw, Some(&ctx)).unwrap();
        assert_eq!(plan.kind, BlobKind::Anchor);
    }

    #[test]
    fn test_similar_payload_deltas_and_reconstructs() {
        let eng = engine();
        let (_dir, store) = store();

        let anchor_raw = payload("anch");
        let anchor_hash = Digest::from_data(&anchor_raw);
        let anchor_plan = eng.plan(&anchor_raw, None).unwrap();
        eng.write_verified(&store, &anchor_hash, &anchor_plan).unwrap();

        let delta_raw = payload("next");
        let ctx = AnchorContext {
            anchor_hash,
            anchor_bytes: anchor_raw.clone(),
            chain_len: 0,
        };
        let delta_plan = eng.plan(&delta_raw, Some(&ctx)).unwrap();
        assert_eq!(delta_plan.kind, BlobKind::Delta);
        assert_eq!(delta_plan.anchor_hash, Some(anchor_hash));

        let delta_hash = Digest::from_data(&delta_raw);
        eng.write_verified(&store, &delta_hash, &delta_plan).unwrap();
        assert_eq!(eng.reconstruct(&store, &delta_hash).unwrap(), delta_raw);
        assert_eq!(eng.reconstruct(&store, &anchor_hash).unwrap(), anchor_raw);
    }

    #[test]
    fn test_interval_one_forces_every_anchor() {
        let eng = DeltaEngine::new(3, 1, 0.5, 0);
        let anchor_bytes = payload("anch");
        let raw = payload("next");
        let ctx = AnchorContext {
            anchor_hash: Digest::from_data(&anchor_bytes),
            anchor_bytes,
            chain_len: 0,
        };
        let plan = eng.plan(&raw, Some(&ctx)).unwrap();
        assert_eq!(plan.kind, BlobKind::Anchor);
    }

    #[test]
    fn test_corrupt_blob_fails_reconstruction() {
        let eng = engine();
        let (_dir, store) = store();
        let raw = payload("anch");
        let hash = Digest::from_data(&raw);
        // Store bytes that do not hash to the claimed name
        let wrong = zstd::bulk::compress(b"different", 3).unwrap();
        store
            .put(&hash, BlobKind::Anchor, None, 9, &wrong)
            .unwrap();
        assert!(matches!(
            eng.reconstruct(&store, &hash),
            Err(CvcError::Integrity { .. })
        ));
    }
}
