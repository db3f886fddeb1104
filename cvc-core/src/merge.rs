//! Three-way semantic merge of conversation states.
//!
//! The merge base is the lowest common ancestor of the two branch heads.
//! Messages are treated as an ordered set keyed by canonical content hash:
//! base messages first, then target-only, then source-only, duplicates
//! collapsed. An optional synthesiser callback may contribute a short
//! textual synthesis; its failure never aborts the merge.

use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::codec;
use crate::config::CvcConfig;
use crate::context_db::ContextDatabase;
use crate::error::{CvcError, Result};
use crate::model::{CognitiveCommit, CommitMetadata, CommitType, ContentBlob, Message};

/// Front-end-provided semantic synthesiser.
///
/// Implementations receive the base, target (ours), and source (theirs)
/// message sets and return a short synthesis string, or `None` to skip.
pub trait Synthesizer {
    fn synthesize(
        &self,
        base: &[Message],
        ours: &[Message],
        theirs: &[Message],
    ) -> Option<String>;
}

/// Merge `source` into `target`, creating a merge commit and advancing the
/// target head. The source branch is never mutated.
pub fn merge_branches(
    db: &mut ContextDatabase,
    config: &CvcConfig,
    source: &str,
    target: &str,
    synthesizer: Option<&dyn Synthesizer>,
) -> Result<CognitiveCommit> {
    if source == target {
        return Err(CvcError::InvariantViolation(format!(
            "cannot merge branch '{source}' into itself"
        )));
    }
    let source_bp = db.get_branch(source)?;
    let target_bp = db.get_branch(target)?;

    let lca = db
        .lca(&target_bp.head_hash, &source_bp.head_hash)?
        .ok_or_else(|| CvcError::NoCommonAncestor {
            from: source.to_string(),
            target: target.to_string(),
        })?;

    let base = db.retrieve_blob_for(&lca)?;
    let ours = db.retrieve_blob_for(&target_bp.head_hash)?;
    let theirs = db.retrieve_blob_for(&source_bp.head_hash)?;

    let messages = three_way_messages(&base.messages, &ours.messages, &theirs.messages)?;

    let synthesis = synthesizer.and_then(|s| {
        let out = s.synthesize(&base.messages, &ours.messages, &theirs.messages);
        if out.is_none() {
            warn!("merge synthesis declined, proceeding without");
        }
        out
    });
    let mut trace = ours.reasoning_trace.clone().unwrap_or_default();
    if let Some(extra) = synthesis {
        if !trace.is_empty() {
            trace.push('\n');
        }
        trace.push_str(&extra);
    }

    let merged = ContentBlob {
        messages,
        reasoning_trace: if trace.is_empty() { None } else { Some(trace) },
        tool_outputs: union_maps(ours.tool_outputs.as_ref(), theirs.tool_outputs.as_ref()),
        source_files: union_maps(ours.source_files.as_ref(), theirs.source_files.as_ref()),
        token_count: None,
    };

    let mut metadata = CommitMetadata::new(
        &config.agent_id,
        config.mode,
        format!("Merged '{source}' into '{target}'"),
    );
    metadata.commit_type = CommitType::Merge;
    metadata.provider = config.provider.clone();
    metadata.model = config.model.clone();
    metadata
        .extra
        .insert("source_branch".into(), source.to_string());
    metadata
        .extra
        .insert("target_branch".into(), target.to_string());
    metadata.extra.insert("lca".into(), lca.to_hex());

    let commit = db.store_commit(
        &[target_bp.head_hash, source_bp.head_hash],
        &merged,
        metadata,
        Some(target),
    )?;
    info!(
        "merged '{}' into '{}' as {} (lca {})",
        source,
        target,
        commit.short_hash(),
        lca.short()
    );
    Ok(commit)
}

/// Ordered union keyed by canonical message hash: base, then target-only,
/// then source-only, each preserving its original order
pub fn three_way_messages(
    base: &[Message],
    ours: &[Message],
    theirs: &[Message],
) -> Result<Vec<Message>> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for message in base.iter().chain(ours).chain(theirs) {
        let key = codec::canonical_digest(message)?;
        if seen.insert(key) {
            merged.push(message.clone());
        }
    }
    Ok(merged)
}

fn union_maps(
    ours: Option<&BTreeMap<String, String>>,
    theirs: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (ours, theirs) {
        (None, None) => None,
        (a, b) => {
            let mut out = BTreeMap::new();
            if let Some(m) = b {
                out.extend(m.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            // Target-side entries win on key collisions
            if let Some(m) = a {
                out.extend(m.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn msg(role: Role, content: &str) -> Message {
        Message::new(role, content)
    }

    #[test]
    fn test_union_preserves_base_then_ours_then_theirs() {
        let base = vec![msg(Role::User, "hi"), msg(Role::Assistant, "hello")];
        let mut ours = base.clone();
        ours.push(msg(Role::Assistant, "B"));
        let mut theirs = base.clone();
        theirs.push(msg(Role::Assistant, "A"));

        let merged = three_way_messages(&base, &ours, &theirs).unwrap();
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello", "B", "A"]);
    }

    #[test]
    fn test_duplicates_collapse_by_canonical_hash() {
        let base = vec![msg(Role::User, "hi")];
        let ours = vec![msg(Role::User, "hi"), msg(Role::Assistant, "same")];
        let theirs = vec![msg(Role::User, "hi"), msg(Role::Assistant, "same")];

        let merged = three_way_messages(&base, &ours, &theirs).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_role_distinguishes_identical_content() {
        let merged = three_way_messages(
            &[],
            &[msg(Role::User, "ping")],
            &[msg(Role::Assistant, "ping")],
        )
        .unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_map_union_prefers_target_side() {
        let ours = BTreeMap::from([("t1".to_string(), "ours".to_string())]);
        let theirs = BTreeMap::from([
            ("t1".to_string(), "theirs".to_string()),
            ("t2".to_string(), "theirs".to_string()),
        ]);
        let out = union_maps(Some(&ours), Some(&theirs)).unwrap();
        assert_eq!(out["t1"], "ours");
        assert_eq!(out["t2"], "theirs");
        assert!(union_maps(None, None).is_none());
    }
}
