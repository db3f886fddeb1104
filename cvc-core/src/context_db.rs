//! Unified facade over the three storage tiers.
//!
//! Higher layers never touch the index, blob store, or delta engine
//! directly: this facade enforces the cross-tier invariants (parent
//! existence, blob-before-row ordering, branch-head safety) and keeps the
//! index transaction boundaries in one place.

use tracing::{debug, info};

use crate::blob_store::{BlobKind, BlobStore};
use crate::codec;
use crate::config::CvcConfig;
use crate::delta::{AnchorContext, DeltaEngine, WritePlan};
use crate::error::{CvcError, Result};
use crate::index_db::{AncestryIter, IndexDB};
use crate::model::{
    BranchPointer, CognitiveCommit, CommitMetadata, CommitType, ContentBlob, Digest,
};
use crate::semantic::SemanticStore;

/// Facade enforcing atomicity across index, blobs, and the semantic tier
pub struct ContextDatabase {
    index: IndexDB,
    blobs: BlobStore,
    delta: DeltaEngine,
    vectors: SemanticStore,
}

impl ContextDatabase {
    /// Open all tiers under the configured repository root
    pub fn open(config: &CvcConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let index = IndexDB::open(&config.db_path())?;
        let blobs = BlobStore::open(config.objects_dir())?;
        let delta = DeltaEngine::new(
            config.zstd_level,
            config.anchor_interval,
            config.delta_ratio,
            config.delta_min_size,
        );
        let vectors = SemanticStore::open(config.chroma_dir(), config.vector_enabled);
        Ok(Self {
            index,
            blobs,
            delta,
            vectors,
        })
    }

    // -- Commit storage ----------------------------------------------------

    /// Persist a content blob and its commit row, optionally advancing a
    /// branch head in the same index transaction.
    ///
    /// The blob write precedes the index transaction; a failure after the
    /// blob write leaves at most an orphaned (garbage-collectable) blob and
    /// never a visible index inconsistency.
    pub fn store_commit(
        &mut self,
        parents: &[Digest],
        blob: &ContentBlob,
        mut metadata: CommitMetadata,
        advance: Option<&str>,
    ) -> Result<CognitiveCommit> {
        match metadata.commit_type {
            CommitType::Genesis => {
                if !parents.is_empty() {
                    return Err(CvcError::InvariantViolation(
                        "genesis commits take no parents".into(),
                    ));
                }
            }
            _ => {
                if parents.is_empty() || parents.len() > 2 {
                    return Err(CvcError::InvariantViolation(format!(
                        "commit requires one or two parents, got {}",
                        parents.len()
                    )));
                }
            }
        }
        for parent in parents {
            if !self.index.has_commit(parent)? {
                return Err(CvcError::InvariantViolation(format!(
                    "parent {parent} does not exist"
                )));
            }
        }

        let raw = codec::canonical_bytes(blob)?;
        let content_hash = Digest::from_data(&raw);

        // Deduplicated content keeps whatever representation it already has
        let plan: Option<WritePlan> = if self.blobs.has(&content_hash) {
            let existing = self.blobs.get(&content_hash)?;
            metadata.is_delta = existing.kind == BlobKind::Delta;
            None
        } else {
            let anchor_ctx = match parents.first() {
                None => None,
                Some(pred) => self.anchor_context_for(pred)?,
            };
            let plan = self.delta.plan(&raw, anchor_ctx.as_ref())?;
            metadata.is_delta = plan.kind == BlobKind::Delta;
            Some(plan)
        };

        let canonical_metadata = codec::canonical_bytes(&metadata)?;
        let commit_hash = CognitiveCommit::derive_hash(parents, &raw, &canonical_metadata);
        let commit = CognitiveCommit {
            commit_hash,
            parent_hashes: parents.to_vec(),
            content_hash,
            metadata,
        };

        if let Some(plan) = plan {
            self.delta.write_verified(&self.blobs, &content_hash, &plan)?;
        }
        self.index
            .insert_commit(&commit, advance.map(|b| (b, &commit.commit_hash)))?;

        info!(
            "stored commit {} [{}] {}",
            commit.short_hash(),
            if commit.metadata.is_delta { "delta" } else { "full" },
            &commit.metadata.message.chars().take(80).collect::<String>(),
        );
        Ok(commit)
    }

    fn anchor_context_for(&self, predecessor: &Digest) -> Result<Option<AnchorContext>> {
        let anchor = match self.index.nearest_anchor(predecessor)? {
            Some(a) => a,
            None => return Ok(None),
        };
        let anchor_bytes = self.delta.reconstruct(&self.blobs, &anchor.content_hash)?;
        let chain_len = self.index.delta_chain_len(predecessor)?;
        Ok(Some(AnchorContext {
            anchor_hash: anchor.content_hash,
            anchor_bytes,
            chain_len,
        }))
    }

    // -- Blob retrieval ----------------------------------------------------

    /// Reconstruct a content blob by its content hash, verifying the digest
    pub fn retrieve_blob(&self, content_hash: &Digest) -> Result<ContentBlob> {
        let raw = self.delta.reconstruct(&self.blobs, content_hash)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Reconstruct the content blob of a commit
    pub fn retrieve_blob_for(&self, commit_hash: &Digest) -> Result<ContentBlob> {
        let commit = self.require_commit(commit_hash)?;
        self.retrieve_blob(&commit.content_hash)
    }

    // -- Index passthroughs ------------------------------------------------

    pub fn get_commit(&self, hash: &Digest) -> Result<Option<CognitiveCommit>> {
        self.index.get_commit(hash)
    }

    pub fn require_commit(&self, hash: &Digest) -> Result<CognitiveCommit> {
        self.index
            .get_commit(hash)?
            .ok_or_else(|| CvcError::NotFound(format!("commit {hash}")))
    }

    pub fn resolve_prefix(&self, reference: &str) -> Result<Digest> {
        self.index.resolve_prefix(reference)
    }

    pub fn count_commits(&self) -> Result<u64> {
        self.index.count_commits()
    }

    pub fn find_genesis(&self) -> Result<Option<Digest>> {
        self.index.find_genesis()
    }

    pub fn get_branch(&self, name: &str) -> Result<BranchPointer> {
        self.index
            .get_branch(name)?
            .ok_or_else(|| CvcError::NotFound(format!("branch '{name}'")))
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.index.get_branch(name)?.is_some())
    }

    pub fn create_branch(&self, branch: &BranchPointer) -> Result<()> {
        if !self.index.has_commit(&branch.head_hash)? {
            return Err(CvcError::InvariantViolation(format!(
                "branch head {} does not resolve to a commit",
                branch.head_hash
            )));
        }
        self.index.create_branch(branch)
    }

    pub fn list_branches(&self) -> Result<Vec<BranchPointer>> {
        self.index.list_branches()
    }

    pub fn set_branch_head(&self, name: &str, head: &Digest) -> Result<()> {
        if !self.index.has_commit(head)? {
            return Err(CvcError::InvariantViolation(format!(
                "head {head} does not resolve to a commit"
            )));
        }
        self.index.set_branch_head(name, head)
    }

    pub fn set_branch_head_if(
        &self,
        name: &str,
        expected_prev: &Digest,
        head: &Digest,
    ) -> Result<()> {
        if !self.index.has_commit(head)? {
            return Err(CvcError::InvariantViolation(format!(
                "head {head} does not resolve to a commit"
            )));
        }
        self.index.set_branch_head_if(name, expected_prev, head)
    }

    pub fn ancestors(&self, start: Digest) -> AncestryIter<'_> {
        self.index.ancestors(start)
    }

    pub fn descendants(&self, start: Digest) -> AncestryIter<'_> {
        self.index.descendants(start)
    }

    pub fn lca(&self, a: &Digest, b: &Digest) -> Result<Option<Digest>> {
        self.index.lca(a, b)
    }

    pub fn search_commits(&self, query: &str, limit: usize) -> Result<Vec<CognitiveCommit>> {
        self.index.search_commits(query, limit)
    }

    pub fn set_git_link(&self, git_sha: &str, commit_hash: &Digest, ts: f64) -> Result<()> {
        self.index.set_git_link(git_sha, commit_hash, ts)
    }

    pub fn git_link_for(&self, git_sha: &str) -> Result<Option<Digest>> {
        self.index.git_link_for(git_sha)
    }

    // -- Semantic tier (advisory) ------------------------------------------

    /// Record a summary vector for a commit; no-op when the tier is off
    pub fn semantic_upsert(&mut self, commit_hash: &Digest, summary: &str, vector: Vec<f32>) {
        self.vectors.upsert(commit_hash, summary, vector);
        debug!("semantic upsert for {}", commit_hash.short());
    }

    /// Nearest commits by summary-vector distance; empty when the tier is off
    pub fn semantic_nearest(&self, query: &[f32], k: usize) -> Vec<(Digest, f64)> {
        self.vectors.nearest(query, k)
    }
}
