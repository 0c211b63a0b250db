//! Axiom Gateway
//!
//! Entry point for every driver operation. The gateway:
//! 1. Logs the operation request to OpLog
//! 2. Executes it (through the closure supplied by the runtime)
//! 3. Appends any resulting commits to CommitLog
//! 4. Logs the response to OpLog

use alloc::vec::Vec;

use ownsim_core::{CommitType, Op, Outcome, StepResult, Violation};

use crate::commitlog::CommitLog;
use crate::oplog::OpLog;
use crate::types::CommitId;

/// Axiom gateway: entry point for all operations.
pub struct AxiomGateway {
    /// Operation audit log
    oplog: OpLog,
    /// State mutation log
    commitlog: CommitLog,
}

impl AxiomGateway {
    /// Create a new gateway whose genesis commit carries `timestamp`.
    pub fn new(timestamp: u64) -> Self {
        Self::with_oplog(OpLog::new(), timestamp)
    }

    /// Create a new gateway around a pre-configured OpLog.
    pub fn with_oplog(oplog: OpLog, timestamp: u64) -> Self {
        Self {
            oplog,
            commitlog: CommitLog::new(timestamp),
        }
    }

    /// Process one operation through Axiom.
    ///
    /// `exec` receives the operation and returns the pure step result; the
    /// gateway keeps a copy of the request for the audit trail.
    ///
    /// Returns the operation result and the IDs of any commits created.
    pub fn submit<F>(
        &mut self,
        op: Op,
        timestamp: u64,
        exec: F,
    ) -> (Result<Outcome, Violation>, Vec<CommitId>)
    where
        F: FnOnce(Op) -> StepResult,
    {
        // 1. Log request
        let request_id = self.oplog.log_request(op.clone(), timestamp);

        // 2. Execute
        let StepResult { result, commits } = exec(op);

        // 3. Append commits
        let commit_ids: Vec<CommitId> = commits
            .into_iter()
            .map(|ct| self.commitlog.append(ct, Some(request_id), timestamp))
            .collect();

        // 4. Log response
        self.oplog
            .log_response(request_id, result.clone(), timestamp);

        (result, commit_ids)
    }

    /// Get the OpLog (for inspection/auditing).
    pub fn oplog(&self) -> &OpLog {
        &self.oplog
    }

    /// Get the CommitLog (for replay/inspection).
    pub fn commitlog(&self) -> &CommitLog {
        &self.commitlog
    }

    /// Append a commit directly (bypassing OpLog).
    pub fn append_internal_commit(&mut self, commit_type: CommitType, timestamp: u64) -> CommitId {
        self.commitlog.append(commit_type, None, timestamp)
    }

    /// Split into the two logs.
    pub fn into_parts(self) -> (OpLog, CommitLog) {
        (self.oplog, self.commitlog)
    }

    /// Verify integrity of the commit chain.
    pub fn verify_integrity(&self) -> bool {
        self.commitlog.verify_integrity()
    }

    /// Get current state for reporting.
    pub fn state_summary(&self) -> GatewayState {
        GatewayState {
            oplog_len: self.oplog.len(),
            oplog_next_id: self.oplog.next_id(),
            commitlog_len: self.commitlog.len(),
            commitlog_seq: self.commitlog.current_seq(),
            commitlog_head: self.commitlog.head(),
        }
    }
}

/// Summary of gateway state (for debugging/monitoring).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayState {
    /// Number of events in OpLog
    pub oplog_len: usize,
    /// Next event ID in OpLog
    pub oplog_next_id: u64,
    /// Number of commits in CommitLog
    pub commitlog_len: usize,
    /// Current sequence number in CommitLog
    pub commitlog_seq: u64,
    /// Head commit hash
    pub commitlog_head: CommitId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;
    use ownsim_core::{FrameId, ViolationKind};

    fn ok(outcome: Outcome, commits: Vec<CommitType>) -> StepResult {
        StepResult {
            result: Ok(outcome),
            commits,
        }
    }

    #[test]
    fn test_gateway_submit_no_commits() {
        let mut gateway = AxiomGateway::new(0);

        let (result, commits) = gateway.submit(Op::Read { name: "x".to_string() }, 1000, |_| {
            ok(Outcome::Accessed, Vec::new())
        });

        assert_eq!(result, Ok(Outcome::Accessed));
        assert!(commits.is_empty());
        assert_eq!(gateway.oplog().len(), 2);
        assert_eq!(gateway.commitlog().len(), 1);
    }

    #[test]
    fn test_gateway_submit_with_commits() {
        let mut gateway = AxiomGateway::new(0);

        let (_, commits) = gateway.submit(Op::Enter, 1000, |op| {
            assert_eq!(op, Op::Enter);
            ok(
                Outcome::FrameEntered(FrameId(1)),
                vec![CommitType::FrameEntered { frame: FrameId(1) }],
            )
        });

        assert_eq!(commits.len(), 1);
        assert_eq!(gateway.commitlog().len(), 2);
        assert_eq!(gateway.commitlog().commits()[1].caused_by, Some(0));
    }

    #[test]
    fn test_gateway_logs_violations() {
        let mut gateway = AxiomGateway::new(0);

        let (result, commits) = gateway.submit(Op::Exit, 5, |_| StepResult {
            result: Err(Violation::new(ViolationKind::FrameUnderflow, None)),
            commits: Vec::new(),
        });

        assert!(result.is_err());
        assert!(commits.is_empty());
        assert_eq!(gateway.oplog().len(), 2);
    }

    #[test]
    fn test_gateway_state_summary() {
        let mut gateway = AxiomGateway::new(1000);

        gateway.submit(Op::Enter, 2000, |_| {
            ok(
                Outcome::FrameEntered(FrameId(1)),
                vec![CommitType::FrameEntered { frame: FrameId(1) }],
            )
        });

        let state = gateway.state_summary();
        assert_eq!(state.oplog_len, 2);
        assert_eq!(state.oplog_next_id, 2);
        assert_eq!(state.commitlog_len, 2);
        assert_eq!(state.commitlog_seq, 1);
        assert_eq!(state.commitlog_head, gateway.commitlog().head());
    }

    #[test]
    fn test_gateway_internal_commit() {
        let mut gateway = AxiomGateway::new(0);
        let id = gateway.append_internal_commit(CommitType::FrameExited { frame: FrameId(1) }, 10);
        assert_ne!(id, [0u8; 32]);
        assert_eq!(gateway.oplog().len(), 0);
        assert_eq!(gateway.commitlog().len(), 2);
        assert!(gateway.verify_integrity());
    }
}
