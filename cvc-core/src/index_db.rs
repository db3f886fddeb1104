//! SQLite-backed index of the commit graph and branch pointers.
//!
//! The index holds commit rows, branch heads, a materialised parent-edge
//! table for ancestry queries, and Git↔CVC links. Blob payloads never live
//! here; a commit row only references its content hash.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::error::{CvcError, Result};
use crate::model::{BranchPointer, CognitiveCommit, CommitMetadata, Digest};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key             TEXT PRIMARY KEY,
    value           TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS commits (
    commit_hash     TEXT PRIMARY KEY,
    content_hash    TEXT    NOT NULL,
    parent_hashes   TEXT    NOT NULL DEFAULT '[]',
    commit_type     TEXT    NOT NULL DEFAULT 'checkpoint',
    message         TEXT    NOT NULL DEFAULT '',
    is_delta        INTEGER NOT NULL DEFAULT 0,
    metadata_json   TEXT    NOT NULL,
    created_at      REAL    NOT NULL
);

CREATE TABLE IF NOT EXISTS branches (
    name            TEXT PRIMARY KEY,
    head_hash       TEXT    NOT NULL,
    created_at      REAL    NOT NULL,
    description     TEXT    NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS parent_edges (
    child_hash      TEXT NOT NULL,
    parent_hash     TEXT NOT NULL,
    PRIMARY KEY (child_hash, parent_hash)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS git_links (
    git_sha         TEXT PRIMARY KEY,
    commit_hash     TEXT NOT NULL,
    created_at      REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS refs (
    name            TEXT PRIMARY KEY,
    commit_hash     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_commits_content ON commits(content_hash);
CREATE INDEX IF NOT EXISTS idx_commits_created ON commits(created_at);
CREATE INDEX IF NOT EXISTS idx_edges_parent    ON parent_edges(parent_hash);
CREATE INDEX IF NOT EXISTS idx_git_links_cvc   ON git_links(commit_hash);
";

/// Transactional relational index (WAL mode, single writer)
pub struct IndexDB {
    conn: Connection,
}

impl IndexDB {
    /// Open or create the index at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.execute_batch(SCHEMA_SQL)?;

        let db = Self { conn };
        db.check_schema_version()?;
        Ok(db)
    }

    // Migrations are forward-only: refuse to open a newer schema.
    fn check_schema_version(&self) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .optional()?;
        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
                Ok(())
            }
            Some(v) => {
                let found: i64 = v.parse().unwrap_or(0);
                if found > SCHEMA_VERSION {
                    Err(CvcError::Storage(format!(
                        "index schema version {found} is newer than supported {SCHEMA_VERSION}"
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    // -- Commits -----------------------------------------------------------

    /// Insert a commit row and its parent edges; advance a branch head in
    /// the same transaction when requested. Duplicate hashes are no-ops.
    pub fn insert_commit(
        &self,
        commit: &CognitiveCommit,
        advance: Option<(&str, &Digest)>,
    ) -> Result<()> {
        let parents_json = serde_json::to_string(
            &commit
                .parent_hashes
                .iter()
                .map(|h| h.to_hex())
                .collect::<Vec<_>>(),
        )?;
        let metadata_json = serde_json::to_string(&commit.metadata)?;
        let commit_type = serde_json::to_value(commit.metadata.commit_type)?
            .as_str()
            .unwrap_or("checkpoint")
            .to_string();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO commits
               (commit_hash, content_hash, parent_hashes, commit_type,
                message, is_delta, metadata_json, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                commit.commit_hash.to_hex(),
                commit.content_hash.to_hex(),
                parents_json,
                commit_type,
                commit.metadata.message,
                commit.metadata.is_delta as i64,
                metadata_json,
                commit.metadata.timestamp_seconds,
            ],
        )?;
        for parent in &commit.parent_hashes {
            tx.execute(
                "INSERT OR IGNORE INTO parent_edges (child_hash, parent_hash) VALUES (?1, ?2)",
                params![commit.commit_hash.to_hex(), parent.to_hex()],
            )?;
        }
        if let Some((branch, head)) = advance {
            let updated = tx.execute(
                "UPDATE branches SET head_hash = ?1 WHERE name = ?2",
                params![head.to_hex(), branch],
            )?;
            if updated == 0 {
                return Err(CvcError::NotFound(format!("branch '{branch}'")));
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_commit(&self, hash: &Digest) -> Result<Option<CognitiveCommit>> {
        self.conn
            .query_row(
                "SELECT commit_hash, content_hash, parent_hashes, metadata_json
                   FROM commits WHERE commit_hash = ?1",
                params![hash.to_hex()],
                row_to_commit,
            )
            .optional()?
            .transpose()
    }

    pub fn has_commit(&self, hash: &Digest) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE commit_hash = ?1",
            params![hash.to_hex()],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn count_commits(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Resolve a full hash or a short prefix (8 hex minimum) to a commit
    /// hash. Shorter prefixes are rejected as ambiguous by construction.
    pub fn resolve_prefix(&self, reference: &str) -> Result<Digest> {
        if reference.len() == 64 {
            let hash = Digest::from_hex(reference)?;
            return if self.has_commit(&hash)? {
                Ok(hash)
            } else {
                Err(CvcError::NotFound(format!("commit {reference}")))
            };
        }
        if reference.len() < 8 || !reference.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CvcError::Ambiguous {
                prefix: reference.to_string(),
                matches: 0,
            });
        }
        let pattern = format!("{reference}%");
        let mut stmt = self
            .conn
            .prepare_cached("SELECT commit_hash FROM commits WHERE commit_hash LIKE ?1 LIMIT 2")?;
        let hits: Vec<String> = stmt
            .query_map(params![pattern], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        match hits.len() {
            0 => Err(CvcError::NotFound(format!("commit {reference}"))),
            1 => Digest::from_hex(&hits[0]),
            n => Err(CvcError::Ambiguous {
                prefix: reference.to_string(),
                matches: n,
            }),
        }
    }

    /// Find a genesis commit (zero parents), if any exists
    pub fn find_genesis(&self) -> Result<Option<Digest>> {
        let hex: Option<String> = self
            .conn
            .query_row(
                "SELECT commit_hash FROM commits WHERE parent_hashes = '[]'
                   ORDER BY created_at ASC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        hex.map(|h| Digest::from_hex(&h)).transpose()
    }

    /// Case-insensitive substring search over commit messages, newest first
    pub fn search_commits(&self, query: &str, limit: usize) -> Result<Vec<CognitiveCommit>> {
        let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare_cached(
            "SELECT commit_hash, content_hash, parent_hashes, metadata_json
               FROM commits WHERE message LIKE ?1 ESCAPE '\\'
               ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], row_to_commit)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    // -- Branches ----------------------------------------------------------

    pub fn create_branch(&self, branch: &BranchPointer) -> Result<()> {
        self.conn.execute(
            "INSERT INTO branches (name, head_hash, created_at, description)
               VALUES (?1, ?2, ?3, ?4)",
            params![
                branch.name,
                branch.head_hash.to_hex(),
                branch.created_at,
                branch.description
            ],
        )?;
        Ok(())
    }

    pub fn get_branch(&self, name: &str) -> Result<Option<BranchPointer>> {
        self.conn
            .query_row(
                "SELECT name, head_hash, created_at, description FROM branches WHERE name = ?1",
                params![name],
                row_to_branch,
            )
            .optional()?
            .transpose()
    }

    pub fn list_branches(&self) -> Result<Vec<BranchPointer>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, head_hash, created_at, description FROM branches ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_branch)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    pub fn set_branch_head(&self, name: &str, head: &Digest) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE branches SET head_hash = ?1 WHERE name = ?2",
            params![head.to_hex(), name],
        )?;
        if updated == 0 {
            return Err(CvcError::NotFound(format!("branch '{name}'")));
        }
        Ok(())
    }

    /// Optimistic head update: fails with `Conflict` (carrying the current
    /// head) when another writer advanced the branch first
    pub fn set_branch_head_if(
        &self,
        name: &str,
        expected_prev: &Digest,
        head: &Digest,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE branches SET head_hash = ?1 WHERE name = ?2 AND head_hash = ?3",
            params![head.to_hex(), name, expected_prev.to_hex()],
        )?;
        if updated == 0 {
            let current = self
                .get_branch(name)?
                .ok_or_else(|| CvcError::NotFound(format!("branch '{name}'")))?;
            return Err(CvcError::Conflict {
                branch: name.to_string(),
                current_head: current.head_hash,
            });
        }
        Ok(())
    }

    // -- Ancestry ----------------------------------------------------------

    /// Walk ancestors breadth-first from `start`, first parent preferred at
    /// merge nodes. The sequence is finite and terminates at genesis.
    pub fn ancestors(&self, start: Digest) -> AncestryIter<'_> {
        AncestryIter::new(self, start, Direction::Up)
    }

    /// Walk descendants breadth-first from `start` via the edge table
    pub fn descendants(&self, start: Digest) -> AncestryIter<'_> {
        AncestryIter::new(self, start, Direction::Down)
    }

    fn children_of(&self, hash: &Digest) -> Result<Vec<Digest>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT child_hash FROM parent_edges WHERE parent_hash = ?1 ORDER BY child_hash",
        )?;
        let rows = stmt.query_map(params![hash.to_hex()], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(Digest::from_hex(&row?)?);
        }
        Ok(out)
    }

    /// Lowest common ancestor by simultaneous BFS from both sides.
    /// Returns `None` for disjoint histories.
    pub fn lca(&self, a: &Digest, b: &Digest) -> Result<Option<Digest>> {
        let mut seen_a: HashSet<Digest> = HashSet::from([*a]);
        let mut seen_b: HashSet<Digest> = HashSet::from([*b]);
        let mut queue_a: VecDeque<Digest> = VecDeque::from([*a]);
        let mut queue_b: VecDeque<Digest> = VecDeque::from([*b]);

        if seen_b.contains(a) {
            return Ok(Some(*a));
        }

        while !queue_a.is_empty() || !queue_b.is_empty() {
            if let Some(h) = queue_a.pop_front() {
                if seen_b.contains(&h) {
                    return Ok(Some(h));
                }
                if let Some(commit) = self.get_commit(&h)? {
                    for parent in commit.parent_hashes {
                        if seen_a.insert(parent) {
                            if seen_b.contains(&parent) {
                                return Ok(Some(parent));
                            }
                            queue_a.push_back(parent);
                        }
                    }
                }
            }
            if let Some(h) = queue_b.pop_front() {
                if seen_a.contains(&h) {
                    return Ok(Some(h));
                }
                if let Some(commit) = self.get_commit(&h)? {
                    for parent in commit.parent_hashes {
                        if seen_b.insert(parent) {
                            if seen_a.contains(&parent) {
                                return Ok(Some(parent));
                            }
                            queue_b.push_back(parent);
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// Number of delta commits from `hash` (inclusive) back to the nearest
    /// anchor (exclusive), following first parents
    pub fn delta_chain_len(&self, hash: &Digest) -> Result<u32> {
        let mut count = 0u32;
        let mut cursor = Some(*hash);
        while let Some(h) = cursor {
            let commit = self
                .get_commit(&h)?
                .ok_or_else(|| CvcError::InvariantViolation(format!("dangling commit {h}")))?;
            if !commit.metadata.is_delta {
                break;
            }
            count += 1;
            cursor = commit.parent_hashes.first().copied();
        }
        Ok(count)
    }

    /// Nearest non-delta ancestor (first-parent walk), including `hash`
    /// itself when it is an anchor
    pub fn nearest_anchor(&self, hash: &Digest) -> Result<Option<CognitiveCommit>> {
        let mut cursor = Some(*hash);
        while let Some(h) = cursor {
            match self.get_commit(&h)? {
                None => return Ok(None),
                Some(commit) => {
                    if !commit.metadata.is_delta {
                        return Ok(Some(commit));
                    }
                    cursor = commit.parent_hashes.first().copied();
                }
            }
        }
        Ok(None)
    }

    // -- Git links ---------------------------------------------------------

    pub fn set_git_link(&self, git_sha: &str, commit_hash: &Digest, ts: f64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO git_links (git_sha, commit_hash, created_at)
               VALUES (?1, ?2, ?3)",
            params![git_sha, commit_hash.to_hex(), ts],
        )?;
        Ok(())
    }

    pub fn git_link_for(&self, git_sha: &str) -> Result<Option<Digest>> {
        let hex: Option<String> = self
            .conn
            .query_row(
                "SELECT commit_hash FROM git_links WHERE git_sha = ?1",
                params![git_sha],
                |r| r.get(0),
            )
            .optional()?;
        hex.map(|h| Digest::from_hex(&h)).transpose()
    }
}

enum Direction {
    Up,
    Down,
}

/// Lazy breadth-first walk over the commit graph
pub struct AncestryIter<'a> {
    db: &'a IndexDB,
    direction: Direction,
    queue: VecDeque<Digest>,
    seen: HashSet<Digest>,
}

impl<'a> AncestryIter<'a> {
    fn new(db: &'a IndexDB, start: Digest, direction: Direction) -> Self {
        Self {
            db,
            direction,
            queue: VecDeque::from([start]),
            seen: HashSet::from([start]),
        }
    }
}

impl Iterator for AncestryIter<'_> {
    type Item = Result<CognitiveCommit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let hash = self.queue.pop_front()?;
            let commit = match self.db.get_commit(&hash) {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            };
            let next: Vec<Digest> = match self.direction {
                Direction::Up => commit.parent_hashes.clone(),
                Direction::Down => match self.db.children_of(&hash) {
                    Ok(children) => children,
                    Err(e) => return Some(Err(e)),
                },
            };
            for n in next {
                if self.seen.insert(n) {
                    self.queue.push_back(n);
                }
            }
            return Some(Ok(commit));
        }
    }
}

fn row_to_commit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<CognitiveCommit>> {
    let commit_hash: String = row.get(0)?;
    let content_hash: String = row.get(1)?;
    let parents_json: String = row.get(2)?;
    let metadata_json: String = row.get(3)?;
    Ok(build_commit(
        &commit_hash,
        &content_hash,
        &parents_json,
        &metadata_json,
    ))
}

fn build_commit(
    commit_hash: &str,
    content_hash: &str,
    parents_json: &str,
    metadata_json: &str,
) -> Result<CognitiveCommit> {
    let parent_hex: Vec<String> = serde_json::from_str(parents_json)?;
    let parent_hashes = parent_hex
        .iter()
        .map(|h| Digest::from_hex(h))
        .collect::<Result<Vec<_>>>()?;
    let metadata: CommitMetadata = serde_json::from_str(metadata_json)?;
    Ok(CognitiveCommit {
        commit_hash: Digest::from_hex(commit_hash)?,
        parent_hashes,
        content_hash: Digest::from_hex(content_hash)?,
        metadata,
    })
}

fn row_to_branch(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<BranchPointer>> {
    let name: String = row.get(0)?;
    let head_hex: String = row.get(1)?;
    let created_at: f64 = row.get(2)?;
    let description: String = row.get(3)?;
    Ok(Digest::from_hex(&head_hex).map(|head_hash| BranchPointer {
        name,
        head_hash,
        created_at,
        description,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now_seconds, CommitMetadata, CommitType, Mode};
    use tempfile::TempDir;

    fn commit_with(parents: Vec<Digest>, tag: &str, is_delta: bool) -> CognitiveCommit {
        let mut metadata = CommitMetadata::new("agent", Mode::Cli, tag);
        metadata.is_delta = is_delta;
        if parents.is_empty() {
            metadata.commit_type = CommitType::Genesis;
        }
        let content_hash = Digest::from_data(tag.as_bytes());
        let commit_hash = CognitiveCommit::derive_hash(
            &parents,
            content_hash.as_bytes(),
            tag.as_bytes(),
        );
        CognitiveCommit {
            commit_hash,
            parent_hashes: parents,
            content_hash,
            metadata,
        }
    }

    fn open_db(dir: &TempDir) -> IndexDB {
        IndexDB::open(&dir.path().join("cvc.db")).unwrap()
    }

    #[test]
    fn test_insert_and_get_commit() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let c = commit_with(vec![], "genesis", false);
        db.insert_commit(&c, None).unwrap();

        let got = db.get_commit(&c.commit_hash).unwrap().unwrap();
        assert_eq!(got.commit_hash, c.commit_hash);
        assert_eq!(got.metadata.message, "genesis");
        assert!(got.parent_hashes.is_empty());
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let c = commit_with(vec![], "genesis", false);
        db.insert_commit(&c, None).unwrap();
        db.insert_commit(&c, None).unwrap();
        assert_eq!(db.count_commits().unwrap(), 1);
    }

    #[test]
    fn test_prefix_resolution_rules() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let c = commit_with(vec![], "only", false);
        db.insert_commit(&c, None).unwrap();

        let hex = c.commit_hash.to_hex();
        assert_eq!(db.resolve_prefix(&hex).unwrap(), c.commit_hash);
        assert_eq!(db.resolve_prefix(&hex[..8]).unwrap(), c.commit_hash);
        assert!(matches!(
            db.resolve_prefix(&hex[..7]),
            Err(CvcError::Ambiguous { .. })
        ));
        assert!(matches!(
            db.resolve_prefix("0000000000"),
            Err(CvcError::NotFound(_)) | Err(CvcError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_branch_head_conditional_update() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let g = commit_with(vec![], "genesis", false);
        let c1 = commit_with(vec![g.commit_hash], "c1", false);
        db.insert_commit(&g, None).unwrap();
        db.insert_commit(&c1, None).unwrap();
        db.create_branch(&BranchPointer {
            name: "main".into(),
            head_hash: g.commit_hash,
            created_at: now_seconds(),
            description: String::new(),
        })
        .unwrap();

        db.set_branch_head_if("main", &g.commit_hash, &c1.commit_hash)
            .unwrap();
        // Stale expectation loses the race
        let err = db
            .set_branch_head_if("main", &g.commit_hash, &c1.commit_hash)
            .unwrap_err();
        match err {
            CvcError::Conflict { current_head, .. } => assert_eq!(current_head, c1.commit_hash),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_lca_linear_and_disjoint() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let g = commit_with(vec![], "genesis", false);
        let a = commit_with(vec![g.commit_hash], "a", false);
        let b = commit_with(vec![g.commit_hash], "b", false);
        for c in [&g, &a, &b] {
            db.insert_commit(c, None).unwrap();
        }
        assert_eq!(
            db.lca(&a.commit_hash, &b.commit_hash).unwrap(),
            Some(g.commit_hash)
        );
        assert_eq!(
            db.lca(&a.commit_hash, &a.commit_hash).unwrap(),
            Some(a.commit_hash)
        );

        let orphan = commit_with(vec![], "orphan", false);
        db.insert_commit(&orphan, None).unwrap();
        assert_eq!(
            db.lca(&a.commit_hash, &orphan.commit_hash).unwrap(),
            None
        );
    }

    #[test]
    fn test_ancestors_first_parent_order() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let g = commit_with(vec![], "genesis", false);
        let a = commit_with(vec![g.commit_hash], "a", false);
        let b = commit_with(vec![a.commit_hash], "b", false);
        for c in [&g, &a, &b] {
            db.insert_commit(c, None).unwrap();
        }
        let walk: Vec<_> = db
            .ancestors(b.commit_hash)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let hashes: Vec<_> = walk.iter().map(|c| c.commit_hash).collect();
        assert_eq!(hashes, vec![b.commit_hash, a.commit_hash, g.commit_hash]);
    }

    #[test]
    fn test_delta_chain_len() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let g = commit_with(vec![], "genesis", false);
        let d1 = commit_with(vec![g.commit_hash], "d1", true);
        let d2 = commit_with(vec![d1.commit_hash], "d2", true);
        for c in [&g, &d1, &d2] {
            db.insert_commit(c, None).unwrap();
        }
        assert_eq!(db.delta_chain_len(&g.commit_hash).unwrap(), 0);
        assert_eq!(db.delta_chain_len(&d2.commit_hash).unwrap(), 2);
        let anchor = db.nearest_anchor(&d2.commit_hash).unwrap().unwrap();
        assert_eq!(anchor.commit_hash, g.commit_hash);
    }

    #[test]
    fn test_git_links() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let c = commit_with(vec![], "genesis", false);
        db.insert_commit(&c, None).unwrap();
        let sha = "a".repeat(40);
        db.set_git_link(&sha, &c.commit_hash, now_seconds()).unwrap();
        assert_eq!(db.git_link_for(&sha).unwrap(), Some(c.commit_hash));
        assert_eq!(db.git_link_for(&"b".repeat(40)).unwrap(), None);
    }

    #[test]
    fn test_search_commits() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let c1 = commit_with(vec![], "fix the parser", false);
        let c2 = commit_with(vec![c1.commit_hash], "add Parser tests", false);
        let c3 = commit_with(vec![c2.commit_hash], "unrelated", false);
        for c in [&c1, &c2, &c3] {
            db.insert_commit(c, None).unwrap();
        }
        let hits = db.search_commits("parser", 10).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
