//! Commit Log
//!
//! Records state mutations as commits. Each commit links to the previous
//! via a hash chain, so any edit to a recorded mutation breaks
//! `verify_integrity`.

use alloc::vec;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use ownsim_core::CommitType;

use crate::types::{CommitId, EventId};

/// A state mutation record.
///
/// Commits are append-only and form a hash chain for integrity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    /// Hash of this commit (computed from contents + prev_commit)
    pub id: CommitId,
    /// Hash of the previous commit (chain integrity)
    pub prev_commit: CommitId,
    /// Sequence number (monotonic)
    pub seq: u64,
    /// Timestamp (nanos)
    pub timestamp: u64,
    /// The state mutation
    pub commit_type: CommitType,
    /// The OpLog request that caused this commit
    pub caused_by: Option<EventId>,
}

/// Maximum number of commits to keep in memory
const MAX_COMMITLOG_ENTRIES: usize = 100000;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Commit log.
///
/// Every successful (or partially successful) operation's mutations are
/// recorded here, in order.
pub struct CommitLog {
    /// Commit entries (append-only)
    commits: Vec<Commit>,
    /// Next sequence number
    next_seq: u64,
    /// Hash of the last commit
    last_hash: CommitId,
    /// Timestamp of the genesis commit (kept after trimming)
    genesis_timestamp: u64,
}

impl CommitLog {
    /// Create a new CommitLog with a genesis commit.
    pub fn new(timestamp: u64) -> Self {
        let genesis = Commit {
            id: [0u8; 32],
            prev_commit: [0u8; 32],
            seq: 0,
            timestamp,
            commit_type: CommitType::Genesis,
            caused_by: None,
        };
        let id = Self::compute_hash(&genesis);
        let genesis = Commit { id, ..genesis };

        Self {
            commits: vec![genesis],
            next_seq: 1,
            last_hash: id,
            genesis_timestamp: timestamp,
        }
    }

    /// Append a new commit to the log.
    ///
    /// Returns the commit ID (hash).
    pub fn append(
        &mut self,
        commit_type: CommitType,
        caused_by: Option<EventId>,
        timestamp: u64,
    ) -> CommitId {
        let commit = Commit {
            id: [0u8; 32],
            prev_commit: self.last_hash,
            seq: self.next_seq,
            timestamp,
            commit_type,
            caused_by,
        };
        let id = Self::compute_hash(&commit);
        let commit = Commit { id, ..commit };

        self.last_hash = id;
        self.next_seq += 1;
        self.commits.push(commit);

        self.trim_if_needed();
        id
    }

    /// Compute hash for a commit.
    ///
    /// FNV-1a over the chain link, header fields, cause and the canonical
    /// JSON encoding of the mutation, expanded to 32 bytes.
    fn compute_hash(commit: &Commit) -> CommitId {
        fn mix(hash: &mut u64, bytes: &[u8]) {
            for byte in bytes {
                *hash ^= *byte as u64;
                *hash = hash.wrapping_mul(FNV_PRIME);
            }
        }

        let mut hash = FNV_OFFSET;
        mix(&mut hash, &commit.prev_commit);
        mix(&mut hash, &commit.seq.to_le_bytes());
        mix(&mut hash, &commit.timestamp.to_le_bytes());
        match commit.caused_by {
            Some(event) => {
                mix(&mut hash, &[1]);
                mix(&mut hash, &event.to_le_bytes());
            }
            None => mix(&mut hash, &[0]),
        }
        // Serializing a plain enum into a Vec cannot fail
        let body = serde_json::to_vec(&commit.commit_type).unwrap_or_default();
        mix(&mut hash, &body);

        // Expand to 32 bytes
        let mut result = [0u8; 32];
        let mut h = hash;
        for chunk in result.chunks_mut(8) {
            chunk.copy_from_slice(&h.to_le_bytes()[..chunk.len()]);
            h = h.wrapping_mul(FNV_PRIME);
        }
        result
    }

    /// Get all retained commits.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// Get commits in a sequence range.
    pub fn get_range(&self, start_seq: u64, end_seq: u64) -> Vec<&Commit> {
        self.commits
            .iter()
            .filter(|c| c.seq >= start_seq && c.seq < end_seq)
            .collect()
    }

    /// Get the most recent N commits.
    pub fn get_recent(&self, count: usize) -> Vec<&Commit> {
        self.commits.iter().rev().take(count).collect()
    }

    /// Commits caused by one OpLog request.
    pub fn caused_by(&self, event: EventId) -> Vec<&Commit> {
        self.commits
            .iter()
            .filter(|c| c.caused_by == Some(event))
            .collect()
    }

    /// Get the head commit ID (hash of the most recent commit).
    pub fn head(&self) -> CommitId {
        self.last_hash
    }

    /// Get the current sequence number (of the last commit).
    pub fn current_seq(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }

    pub fn genesis_timestamp(&self) -> u64 {
        self.genesis_timestamp
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Never true in practice: the log always keeps at least one commit.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Verify hash chain integrity over the retained commits.
    pub fn verify_integrity(&self) -> bool {
        let Some(first) = self.commits.first() else {
            return true;
        };

        // A trimmed log starts mid-chain; only genesis links to zero
        let mut expected_prev = if first.seq == 0 {
            [0u8; 32]
        } else {
            first.prev_commit
        };
        let mut expected_seq = first.seq;

        for commit in &self.commits {
            if commit.prev_commit != expected_prev || commit.seq != expected_seq {
                return false;
            }
            if Self::compute_hash(commit) != commit.id {
                return false;
            }
            expected_prev = commit.id;
            expected_seq += 1;
        }

        expected_prev == self.last_hash
    }

    #[cfg(test)]
    pub(crate) fn tamper(&mut self, seq: u64, commit_type: CommitType) {
        if let Some(c) = self.commits.iter_mut().find(|c| c.seq == seq) {
            c.commit_type = commit_type;
        }
    }

    fn trim_if_needed(&mut self) {
        if self.commits.len() > MAX_COMMITLOG_ENTRIES {
            let drain_count = self.commits.len() - MAX_COMMITLOG_ENTRIES;
            self.commits.drain(0..drain_count);
        }
    }
}

impl Default for CommitLog {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use ownsim_core::{Address, BindingId, FrameId};

    fn declared(n: u64) -> CommitType {
        CommitType::BindingDeclared {
            binding: BindingId(n),
            name: "x".to_string(),
            frame: FrameId(1),
            kind: None,
        }
    }

    #[test]
    fn test_commitlog_creation() {
        let log = CommitLog::new(0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.current_seq(), 0);
        assert!(matches!(log.commits()[0].commit_type, CommitType::Genesis));
    }

    #[test]
    fn test_commitlog_append() {
        let mut log = CommitLog::new(0);

        let id1 = log.append(CommitType::FrameEntered { frame: FrameId(1) }, Some(0), 1000);
        assert_eq!(log.len(), 2);
        assert_eq!(log.current_seq(), 1);
        assert_ne!(id1, [0u8; 32]);

        let id2 = log.append(declared(1), Some(2), 2000);
        assert_eq!(log.current_seq(), 2);
        assert_ne!(id2, id1);
        assert_eq!(log.head(), id2);
    }

    #[test]
    fn test_commitlog_integrity() {
        let mut log = CommitLog::new(0);
        for i in 1..=10 {
            log.append(declared(i), Some(i), i * 1000);
        }
        assert!(log.verify_integrity());
    }

    #[test]
    fn test_commitlog_detects_tampering() {
        let mut log = CommitLog::new(0);
        for i in 1..=3 {
            log.append(declared(i), None, i);
        }
        log.tamper(2, CommitType::AllocationFreed { address: Address(0x1000) });
        assert!(!log.verify_integrity());
    }

    #[test]
    fn test_commitlog_payload_changes_hash() {
        let mut a = CommitLog::new(0);
        let mut b = CommitLog::new(0);
        let ha = a.append(declared(1), None, 5);
        let hb = b.append(declared(2), None, 5);
        assert_ne!(ha, hb);
    }

    #[test]
    fn test_commitlog_get_range_and_recent() {
        let mut log = CommitLog::new(0);
        for i in 1..=10 {
            log.append(declared(i), None, i * 1000);
        }

        let range = log.get_range(1, 4);
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].seq, 1);
        assert_eq!(range[2].seq, 3);

        let recent = log.get_recent(3);
        assert_eq!(recent[0].seq, 10);
        assert_eq!(recent[2].seq, 8);
    }

    #[test]
    fn test_commitlog_caused_by() {
        let mut log = CommitLog::new(0);
        log.append(declared(1), Some(4), 1);
        log.append(
            CommitType::AllocationCreated {
                address: Address(0x1000),
                size: 3,
                capacity: 3,
                owner: BindingId(1),
            },
            Some(4),
            1,
        );
        log.append(declared(2), Some(6), 2);
        assert_eq!(log.caused_by(4).len(), 2);
        assert_eq!(log.caused_by(6).len(), 1);
    }

    #[test]
    fn test_commitlog_hash_determinism() {
        let mut log1 = CommitLog::new(1000);
        let mut log2 = CommitLog::new(1000);
        for i in 1..=3 {
            let id1 = log1.append(declared(i), Some(i), i * 1000);
            let id2 = log2.append(declared(i), Some(i), i * 1000);
            assert_eq!(id1, id2);
        }
        assert_eq!(log1.head(), log2.head());
    }
}
