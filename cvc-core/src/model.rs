//! Core data model for the cognitive Merkle DAG.
//!
//! Every cognitive commit is a node in a content-addressed DAG. The SHA-256
//! hash of a node is derived from its sorted parent hashes, the canonical
//! bytes of its content blob, and the canonical bytes of its metadata, so
//! altering any ancestor invalidates every descendant hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{CvcError, Result};

/// SHA-256 digest identifying a commit or a content blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Create a digest from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the SHA-256 digest of arbitrary data
    pub fn from_data(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hash.into())
    }

    /// Lowercase 64-hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated 12-hex rendering for logs and summaries
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    /// Parse from a full 64-hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CvcError::Encoding(format!("bad hash '{hex_str}': {e}")))?;
        if bytes.len() != 32 {
            return Err(CvcError::Encoding(format!(
                "bad hash length {} for '{hex_str}'",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Message author role within a context window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Which front-end originated a commit; informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Cli,
    Proxy,
    Mcp,
    #[default]
    Unknown,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Cli => "cli",
            Mode::Proxy => "proxy",
            Mode::Mcp => "mcp",
            Mode::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Classification of cognitive commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    Genesis,
    #[default]
    Checkpoint,
    Anchor,
    Rollback,
    Merge,
    Analysis,
    Generation,
}

/// Reference to binary content attached to a message (never inlined)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Content hash of the attached bytes
    pub content_hash: Digest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// A single message in the agent's context window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentRef>>,
}

impl Message {
    /// Plain message with only a role and content
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            attachments: None,
        }
    }
}

/// The serialized cognitive state at the moment of a commit.
///
/// Contains the full conversation context, any tool outputs, the agent's
/// reasoning trace, and references to source files by content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContentBlob {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_outputs: Option<BTreeMap<String, String>>,
    /// Relative path → file-content hash; a reference, never file bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_files: Option<BTreeMap<String, String>>,
    /// Token count reported by the producing model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

impl ContentBlob {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.reasoning_trace.is_none()
            && self.tool_outputs.is_none()
            && self.source_files.is_none()
    }
}

/// Immutable metadata attached to every cognitive commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMetadata {
    pub timestamp_seconds: f64,
    pub agent_id: String,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Linked codebase commit (40-hex Git SHA)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub message: String,
    pub commit_type: CommitType,
    pub is_delta: bool,
    /// Operation-specific stamps: `restored_from`, `source_branch`,
    /// `target_branch`, `lca`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CommitMetadata {
    pub fn new(agent_id: impl Into<String>, mode: Mode, message: impl Into<String>) -> Self {
        Self {
            timestamp_seconds: now_seconds(),
            agent_id: agent_id.into(),
            mode,
            provider: None,
            model: None,
            git_commit_sha: None,
            tags: BTreeSet::new(),
            message: message.into(),
            commit_type: CommitType::Checkpoint,
            is_delta: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Wall-clock time as fractional seconds since the Unix epoch
pub fn now_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A single node in the Merkle DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveCommit {
    pub commit_hash: Digest,
    /// Zero parents for genesis, one for linear commits, two for merges
    pub parent_hashes: Vec<Digest>,
    /// SHA-256 of the canonical content blob bytes
    pub content_hash: Digest,
    pub metadata: CommitMetadata,
}

impl CognitiveCommit {
    /// Derive the Merkle hash from sorted parents + canonical blob bytes +
    /// canonical metadata bytes
    pub fn derive_hash(
        parent_hashes: &[Digest],
        canonical_blob: &[u8],
        canonical_metadata: &[u8],
    ) -> Digest {
        let mut sorted: Vec<String> = parent_hashes.iter().map(|h| h.to_hex()).collect();
        sorted.sort();
        let mut hasher = Sha256::new();
        for ph in &sorted {
            hasher.update(ph.as_bytes());
        }
        hasher.update(canonical_blob);
        hasher.update(canonical_metadata);
        Digest::new(hasher.finalize().into())
    }

    pub fn short_hash(&self) -> String {
        self.commit_hash.short()
    }
}

/// A named mutable pointer to the tip of a commit chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchPointer {
    pub name: String,
    pub head_hash: Digest,
    pub created_at: f64,
    pub description: String,
}

/// Branch names are restricted to `[A-Za-z0-9_./-]+`
pub fn validate_branch_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'/' | b'-'));
    if ok {
        Ok(())
    } else {
        Err(CvcError::InvariantViolation(format!(
            "invalid branch name '{name}'"
        )))
    }
}

/// Git SHAs linked into the DAG must be full 40-hex
pub fn validate_git_sha(sha: &str) -> Result<()> {
    if sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(CvcError::InvariantViolation(format!(
            "invalid git sha '{sha}'"
        )))
    }
}
