//! The engine owning the context window and the public operation surface.
//!
//! One engine instance serves one session over one repository root. It is
//! the sole mutator of on-disk state outside facade internals, and it is
//! deliberately not thread-safe: callers serialise operations or place the
//! engine behind their own exclusive lock.

use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::cache::PersistentCache;
use crate::config::CvcConfig;
use crate::context_db::ContextDatabase;
use crate::error::{CvcError, Result};
use crate::merge::{merge_branches, Synthesizer};
use crate::model::{
    now_seconds, validate_branch_name, validate_git_sha, BranchPointer, CognitiveCommit,
    CommitMetadata, CommitType, ContentBlob, Digest, Message, Role,
};

/// Snapshot of session state for front-ends
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub active_branch: String,
    pub head_hash: Digest,
    pub window_size: usize,
    pub token_count: Option<u64>,
}

/// Stateful engine exposing commit / branch / switch / merge / restore /
/// log over the context database
pub struct Engine {
    config: CvcConfig,
    db: ContextDatabase,
    cache: PersistentCache,
    active_branch: String,
    window: Vec<Message>,
    reasoning_trace: Option<String>,
    tool_outputs: BTreeMap<String, String>,
    source_files: BTreeMap<String, String>,
    token_count: Option<u64>,
    current_git_sha: Option<String>,
    turns_since_commit: u32,
    assistant_turns_total: u64,
    auto_commit_enabled: bool,
    synthesizer: Option<Box<dyn Synthesizer>>,
    /// Content hashes that failed digest verification; refused from then on
    poisoned: HashSet<Digest>,
}

impl Engine {
    /// Open (or bootstrap) the repository and restore the context window.
    ///
    /// On a fresh repository this creates the default branch with a single
    /// genesis commit over the empty content blob.
    pub fn init(config: CvcConfig) -> Result<Self> {
        let db = ContextDatabase::open(&config)?;
        let cache = PersistentCache::new(config.cache_path());
        let active_branch = config.default_branch.clone();
        let mut engine = Self {
            config,
            db,
            cache,
            active_branch,
            window: Vec::new(),
            reasoning_trace: None,
            tool_outputs: BTreeMap::new(),
            source_files: BTreeMap::new(),
            token_count: None,
            current_git_sha: None,
            turns_since_commit: 0,
            assistant_turns_total: 0,
            auto_commit_enabled: true,
            synthesizer: None,
            poisoned: HashSet::new(),
        };
        engine.ensure_genesis()?;
        engine.auto_restore()?;
        Ok(engine)
    }

    fn ensure_genesis(&mut self) -> Result<()> {
        if self.db.branch_exists(&self.active_branch)? {
            return Ok(());
        }
        // A crash between genesis write and branch creation leaves a
        // parentless commit behind; adopt it instead of minting a second.
        let genesis_hash = match self.db.find_genesis()? {
            Some(existing) => existing,
            None => {
                let mut metadata = self.base_metadata("Genesis");
                metadata.commit_type = CommitType::Genesis;
                let commit =
                    self.db
                        .store_commit(&[], &ContentBlob::default(), metadata, None)?;
                commit.commit_hash
            }
        };
        self.db.create_branch(&BranchPointer {
            name: self.active_branch.clone(),
            head_hash: genesis_hash,
            created_at: now_seconds(),
            description: "Default branch".to_string(),
        })?;
        info!(
            "created branch '{}' at genesis {}",
            self.active_branch,
            genesis_hash.short()
        );
        Ok(())
    }

    /// Startup hydration: the head blob wins when it has messages, else a
    /// cache newer than the head commit, else an empty window.
    fn auto_restore(&mut self) -> Result<()> {
        let head = self.db.get_branch(&self.active_branch)?.head_hash;
        let head_commit = self.db.require_commit(&head)?;
        match self.fetch_blob(&head_commit) {
            Ok(blob) if !blob.messages.is_empty() => {
                info!(
                    "restored {} messages from head {}",
                    blob.messages.len(),
                    head.short()
                );
                self.adopt_blob(blob);
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!("head blob hydration failed (non-fatal): {e}"),
        }
        if let Some(snapshot) = self.cache.load() {
            if snapshot.timestamp > head_commit.metadata.timestamp_seconds {
                if snapshot.mode != self.config.mode {
                    info!(
                        "cache written by mode {} differs from session mode {}",
                        snapshot.mode, self.config.mode
                    );
                }
                info!("restored {} messages from cache", snapshot.messages.len());
                self.window = snapshot.messages;
            }
        }
        Ok(())
    }

    fn base_metadata(&self, message: impl Into<String>) -> CommitMetadata {
        let mut metadata = CommitMetadata::new(&self.config.agent_id, self.config.mode, message);
        metadata.provider = self.config.provider.clone();
        metadata.model = self.config.model.clone();
        metadata.git_commit_sha = self.current_git_sha.clone();
        metadata
    }

    fn adopt_blob(&mut self, blob: ContentBlob) {
        self.window = blob.messages;
        self.reasoning_trace = blob.reasoning_trace;
        self.tool_outputs = blob.tool_outputs.unwrap_or_default();
        self.source_files = blob.source_files.unwrap_or_default();
        self.token_count = blob.token_count;
    }

    fn fetch_blob(&mut self, commit: &CognitiveCommit) -> Result<ContentBlob> {
        if self.poisoned.contains(&commit.content_hash) {
            return Err(CvcError::Integrity {
                hash: commit.content_hash,
                detail: "blob previously failed verification".into(),
            });
        }
        match self.db.retrieve_blob(&commit.content_hash) {
            Err(e @ CvcError::Integrity { .. }) => {
                self.poisoned.insert(commit.content_hash);
                Err(e)
            }
            other => other,
        }
    }

    fn snapshot_blob(&self) -> ContentBlob {
        ContentBlob {
            messages: self.window.clone(),
            reasoning_trace: self.reasoning_trace.clone(),
            tool_outputs: if self.tool_outputs.is_empty() {
                None
            } else {
                Some(self.tool_outputs.clone())
            },
            source_files: if self.source_files.is_empty() {
                None
            } else {
                Some(self.source_files.clone())
            },
            token_count: self.token_count,
        }
    }

    fn write_cache(&self) -> Result<()> {
        self.cache
            .save(&self.window, self.config.mode, &self.active_branch)
    }

    // -- Context window ----------------------------------------------------

    /// Append a message, mirror the window to the persistent cache, and
    /// trigger an auto-checkpoint when the assistant-turn threshold is hit
    pub fn push_message(&mut self, message: Message) -> Result<()> {
        let is_assistant = message.role == Role::Assistant;
        self.window.push(message);
        self.write_cache()?;
        if is_assistant {
            self.turns_since_commit += 1;
            self.assistant_turns_total += 1;
            if self.auto_commit_enabled
                && self.config.auto_commit_interval > 0
                && self.turns_since_commit >= self.config.auto_commit_interval
            {
                let message = format!("Auto-checkpoint at turn {}", self.assistant_turns_total);
                if let Err(e) = self.commit(&message, CommitType::Checkpoint, &[], None) {
                    // The push itself succeeded; a failed checkpoint must
                    // not lose it
                    warn!("auto-commit failed (non-fatal): {e}");
                }
            }
        }
        Ok(())
    }

    /// Borrowed view of the live context window
    pub fn current_window(&self) -> &[Message] {
        &self.window
    }

    /// Clear the window and rewrite the cache
    pub fn reset_window(&mut self) -> Result<()> {
        self.window.clear();
        self.reasoning_trace = None;
        self.tool_outputs.clear();
        self.source_files.clear();
        self.token_count = None;
        self.turns_since_commit = 0;
        self.write_cache()
    }

    /// Attach the agent's reasoning trace to the next commit
    pub fn set_reasoning_trace(&mut self, trace: impl Into<String>) {
        self.reasoning_trace = Some(trace.into());
    }

    /// Attach a tool invocation result to the next commit
    pub fn record_tool_output(&mut self, call_id: impl Into<String>, output: impl Into<String>) {
        self.tool_outputs.insert(call_id.into(), output.into());
    }

    /// Reference a source file (by content hash) from the next commit
    pub fn record_source_file(&mut self, path: impl Into<String>, file_hash: impl Into<String>) {
        self.source_files.insert(path.into(), file_hash.into());
    }

    /// Token count reported by the producing model
    pub fn set_token_count(&mut self, tokens: Option<u64>) {
        self.token_count = tokens;
    }

    /// Front-ends may opt out of auto-checkpoints
    pub fn set_auto_commit(&mut self, enabled: bool) {
        self.auto_commit_enabled = enabled;
    }

    /// Install the merge synthesis callback
    pub fn set_synthesizer(&mut self, synthesizer: Box<dyn Synthesizer>) {
        self.synthesizer = Some(synthesizer);
    }

    // -- Operations --------------------------------------------------------

    pub fn status(&self) -> Result<EngineStatus> {
        let head = self.db.get_branch(&self.active_branch)?.head_hash;
        Ok(EngineStatus {
            active_branch: self.active_branch.clone(),
            head_hash: head,
            window_size: self.window.len(),
            token_count: self.token_count,
        })
    }

    pub fn active_branch(&self) -> &str {
        &self.active_branch
    }

    /// Freeze the current window into a new commit on the active branch.
    /// `parents_override` replaces the implicit `[head]` parent list for
    /// front-ends that manage their own graph shape.
    pub fn commit(
        &mut self,
        message: &str,
        commit_type: CommitType,
        tags: &[String],
        parents_override: Option<&[Digest]>,
    ) -> Result<CognitiveCommit> {
        if commit_type == CommitType::Genesis {
            return Err(CvcError::InvariantViolation(
                "genesis commits are created only at repository init".into(),
            ));
        }
        let head = self.db.get_branch(&self.active_branch)?.head_hash;
        let parents: Vec<Digest> = match parents_override {
            Some(parents) => parents.to_vec(),
            None => vec![head],
        };
        let blob = self.snapshot_blob();
        let mut metadata = self.base_metadata(message);
        metadata.commit_type = commit_type;
        metadata.tags = tags.iter().cloned().collect();

        let branch = self.active_branch.clone();
        let commit = self
            .db
            .store_commit(&parents, &blob, metadata, Some(&branch))?;
        self.turns_since_commit = 0;
        // The cache now duplicates committed state; dropping it is safe and
        // a failure here only leaves a stale duplicate behind
        if let Err(e) = self.cache.clear() {
            warn!("cache clear after commit failed (non-fatal): {e}");
        }
        info!(
            "commit {} on {}: {}",
            commit.short_hash(),
            self.active_branch,
            message
        );
        Ok(commit)
    }

    /// Create a branch at the current head and switch to it. The window
    /// and cache are unchanged: branching only duplicates the head pointer.
    pub fn branch(&mut self, name: &str, description: &str) -> Result<BranchPointer> {
        validate_branch_name(name)?;
        if self.db.branch_exists(name)? {
            return Err(CvcError::InvariantViolation(format!(
                "branch '{name}' already exists"
            )));
        }
        let head = self.db.get_branch(&self.active_branch)?.head_hash;
        let pointer = BranchPointer {
            name: name.to_string(),
            head_hash: head,
            created_at: now_seconds(),
            description: description.to_string(),
        };
        self.db.create_branch(&pointer)?;
        info!(
            "branch '{}' created from {} at {}",
            name,
            self.active_branch,
            head.short()
        );
        self.active_branch = name.to_string();
        Ok(pointer)
    }

    /// Switch to another branch, replacing the window with its head state
    pub fn switch(&mut self, name: &str) -> Result<()> {
        let pointer = self.db.get_branch(name)?;
        let head_commit = self.db.require_commit(&pointer.head_hash)?;
        let blob = self.fetch_blob(&head_commit)?;
        self.adopt_blob(blob);
        self.active_branch = name.to_string();
        self.turns_since_commit = 0;
        self.write_cache()?;
        info!("switched to '{}' at {}", name, pointer.head_hash.short());
        Ok(())
    }

    /// Time-travel: load a past commit's state into the window and record
    /// the jump as a rollback commit on the active branch.
    ///
    /// Returns the restored target commit, not the rollback commit.
    pub fn restore(&mut self, reference: &str) -> Result<CognitiveCommit> {
        let target_hash = self.db.resolve_prefix(reference)?;
        let target = self.db.require_commit(&target_hash)?;
        let blob = self.fetch_blob(&target)?;

        self.adopt_blob(blob.clone());
        self.write_cache()?;

        let head = self.db.get_branch(&self.active_branch)?.head_hash;
        let mut metadata = self.base_metadata(format!(
            "Restored to {}: {}",
            target.short_hash(),
            target.metadata.message.chars().take(60).collect::<String>()
        ));
        metadata.commit_type = CommitType::Rollback;
        metadata
            .extra
            .insert("restored_from".into(), target_hash.to_hex());

        let branch = self.active_branch.clone();
        let rollback = self
            .db
            .store_commit(&[head], &blob, metadata, Some(&branch))?;
        self.turns_since_commit = 0;
        info!(
            "restore to {} recorded as rollback {}",
            target.short_hash(),
            rollback.short_hash()
        );
        Ok(target)
    }

    /// Merge `source` into `target` (default: the active branch)
    pub fn merge(&mut self, source: &str, target: Option<&str>) -> Result<CognitiveCommit> {
        let target_name = target.unwrap_or(&self.active_branch).to_string();
        merge_branches(
            &mut self.db,
            &self.config,
            source,
            &target_name,
            self.synthesizer.as_deref(),
        )
    }

    /// Walk a branch's history from its head, first parent preferred.
    /// The sequence is finite and restartable (call `log` again).
    pub fn log(
        &self,
        branch: Option<&str>,
        limit: Option<usize>,
    ) -> Result<impl Iterator<Item = Result<CognitiveCommit>> + '_> {
        let name = branch.unwrap_or(&self.active_branch);
        let head = self.db.get_branch(name)?.head_hash;
        Ok(self.db.ancestors(head).take(limit.unwrap_or(usize::MAX)))
    }

    pub fn list_branches(&self) -> Result<Vec<BranchPointer>> {
        self.db.list_branches()
    }

    /// Reconstruct the content blob of a commit (full hash or ≥ 8 prefix)
    pub fn get_blob(&mut self, reference: &str) -> Result<ContentBlob> {
        let hash = self.db.resolve_prefix(reference)?;
        let commit = self.db.require_commit(&hash)?;
        self.fetch_blob(&commit)
    }

    /// Case-insensitive search over commit messages, newest first
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<CognitiveCommit>> {
        self.db.search_commits(query, limit)
    }

    /// Link a source-level Git commit to a cognitive commit. The SHA also
    /// stamps the metadata of subsequent commits in this session.
    pub fn set_git_link(&mut self, git_sha: &str, reference: &str) -> Result<()> {
        validate_git_sha(git_sha)?;
        let commit_hash = self.db.resolve_prefix(reference)?;
        self.db.set_git_link(git_sha, &commit_hash, now_seconds())?;
        self.current_git_sha = Some(git_sha.to_string());
        Ok(())
    }

    pub fn git_link_for(&self, git_sha: &str) -> Result<Option<Digest>> {
        self.db.git_link_for(git_sha)
    }

    /// Advisory semantic tier passthroughs; no-ops when disabled
    pub fn semantic_upsert(&mut self, commit_hash: &Digest, summary: &str, vector: Vec<f32>) {
        self.db.semantic_upsert(commit_hash, summary, vector);
    }

    pub fn semantic_nearest(&self, query: &[f32], k: usize) -> Vec<(Digest, f64)> {
        self.db.semantic_nearest(query, k)
    }
}
