//! Content-addressed blob store for anchor and delta payloads.
//!
//! Objects are stored as `objects/<hash[..2]>/<hash[2..]>` where the name is
//! the content hash of the canonical blob bytes. Each file carries a small
//! binary header followed by a Zstandard frame:
//!
//! ```text
//! offset 0   1 byte   kind tag (0x01 = anchor, 0x02 = delta)
//! offset 1   8 bytes  little-endian decompressed size
//! offset 9   32 bytes anchor hash (zeroed for anchors)
//! offset 41  …        zstd frame to EOF
//! ```

use bytes::Bytes;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CvcError, Result};
use crate::model::Digest;

const TAG_ANCHOR: u8 = 0x01;
const TAG_DELTA: u8 = 0x02;
const HEADER_LEN: usize = 1 + 8 + 32;

/// Whether a stored payload is a full anchor or a delta against one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Anchor,
    Delta,
}

/// One stored payload, as read back from disk
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub kind: BlobKind,
    /// Anchor this delta chains to; `None` for anchors
    pub anchor_hash: Option<Digest>,
    pub decompressed_size: u64,
    /// The Zstandard frame (still compressed)
    pub payload: Bytes,
}

/// Git-style content-addressed store of compressed blob files
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open or create the store under `objects_dir`
    pub fn open(objects_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = objects_dir.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, hash: &Digest) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Store a compressed payload under its content hash.
    ///
    /// Idempotent: writing a hash that already exists is a no-op, and
    /// concurrent writers of the same hash are safe because the final
    /// rename is atomic and both payloads are byte-identical.
    pub fn put(
        &self,
        content_hash: &Digest,
        kind: BlobKind,
        anchor_hash: Option<&Digest>,
        decompressed_size: u64,
        compressed: &[u8],
    ) -> Result<()> {
        let path = self.path_for(content_hash);
        if path.exists() {
            return Ok(());
        }
        let shard = path
            .parent()
            .ok_or_else(|| CvcError::Storage("blob path has no parent".into()))?;
        fs::create_dir_all(shard)?;

        let tmp = shard.join(format!("tmp-{}", uuid::Uuid::new_v4()));
        let mut file = File::create(&tmp)?;
        let tag = match kind {
            BlobKind::Anchor => TAG_ANCHOR,
            BlobKind::Delta => TAG_DELTA,
        };
        file.write_all(&[tag])?;
        file.write_all(&decompressed_size.to_le_bytes())?;
        match anchor_hash {
            Some(a) => file.write_all(a.as_bytes())?,
            None => file.write_all(&[0u8; 32])?,
        }
        file.write_all(compressed)?;
        file.sync_all()?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            // A concurrent writer may have won the rename with identical bytes
            if !path.exists() {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Read a stored blob record by content hash
    pub fn get(&self, content_hash: &Digest) -> Result<StoredBlob> {
        let path = self.path_for(content_hash);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CvcError::NotFound(format!("blob {content_hash}")))
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(content_hash, data)
    }

    fn parse(content_hash: &Digest, data: Vec<u8>) -> Result<StoredBlob> {
        if data.len() < HEADER_LEN {
            return Err(CvcError::Integrity {
                hash: *content_hash,
                detail: format!("truncated blob file ({} bytes)", data.len()),
            });
        }
        let kind = match data[0] {
            TAG_ANCHOR => BlobKind::Anchor,
            TAG_DELTA => BlobKind::Delta,
            other => {
                return Err(CvcError::Integrity {
                    hash: *content_hash,
                    detail: format!("unknown blob kind tag 0x{other:02x}"),
                })
            }
        };
        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&data[1..9]);
        let decompressed_size = u64::from_le_bytes(size_bytes);
        let mut anchor_bytes = [0u8; 32];
        anchor_bytes.copy_from_slice(&data[9..41]);
        let anchor_hash = if anchor_bytes == [0u8; 32] {
            None
        } else {
            Some(Digest::new(anchor_bytes))
        };
        if kind == BlobKind::Delta && anchor_hash.is_none() {
            return Err(CvcError::Integrity {
                hash: *content_hash,
                detail: "delta blob without anchor hash".into(),
            });
        }
        Ok(StoredBlob {
            kind,
            anchor_hash,
            decompressed_size,
            payload: Bytes::from(data).slice(HEADER_LEN..),
        })
    }

    pub fn has(&self, content_hash: &Digest) -> bool {
        self.path_for(content_hash).exists()
    }

    /// Remove a blob file; used to discard writes that fail verification
    pub fn delete(&self, content_hash: &Digest) -> Result<bool> {
        let path = self.path_for(content_hash);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Lazily walk every stored record. The sequence is finite; it is not
    /// restartable mid-read after the store has been mutated.
    pub fn iter(&self) -> BlobIter {
        let shards = match fs::read_dir(&self.root) {
            Ok(rd) => {
                let mut dirs: Vec<PathBuf> = rd
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect();
                dirs.sort();
                dirs
            }
            Err(_) => Vec::new(),
        };
        BlobIter {
            shards,
            shard_idx: 0,
            entries: Vec::new(),
        }
    }
}

/// Iterator over `(content_hash, StoredBlob)` pairs
pub struct BlobIter {
    shards: Vec<PathBuf>,
    shard_idx: usize,
    entries: Vec<PathBuf>,
}

impl Iterator for BlobIter {
    type Item = Result<(Digest, StoredBlob)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.entries.pop() {
                match read_entry(&path) {
                    Some(item) => return Some(item),
                    None => continue, // skip tmp files and strays
                }
            }
            if self.shard_idx >= self.shards.len() {
                return None;
            }
            let shard = &self.shards[self.shard_idx];
            self.shard_idx += 1;
            if let Ok(rd) = fs::read_dir(shard) {
                self.entries = rd
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect();
                self.entries.sort();
                self.entries.reverse();
            }
        }
    }
}

fn read_entry(path: &Path) -> Option<Result<(Digest, StoredBlob)>> {
    let shard = path.parent()?.file_name()?.to_str()?;
    let rest = path.file_name()?.to_str()?;
    if rest.starts_with("tmp-") {
        return None;
    }
    let hash = Digest::from_hex(&format!("{shard}{rest}")).ok()?;
    match fs::read(path) {
        Ok(data) => Some(BlobStore::parse(&hash, data).map(|b| (hash, b))),
        Err(e) => Some(Err(e.into())),
    }
}
