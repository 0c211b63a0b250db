//! Deterministic Replay
//!
//! Re-executes the requests recorded in an OpLog against a fresh state:
//!
//! ```text
//! reduce(empty, requests) -> (state, commits)
//! ```
//!
//! `step` is pure, so a faithful log always reproduces the same responses
//! and the same CommitLog head.

use alloc::string::String;

use ownsim_core::{step, SimState};

use crate::commitlog::CommitLog;
use crate::gateway::AxiomGateway;
use crate::oplog::{OpEventType, OpLog};
use crate::types::{short_id, CommitId, EventId};

/// Errors that can occur during replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayError {
    /// The OpLog no longer starts at the first request
    Truncated { first_event: EventId },
    /// A replayed response differs from the recorded one
    ResponseMismatch { request_id: EventId },
    /// Replay produced a different CommitLog head
    HeadMismatch {
        expected: CommitId,
        actual: CommitId,
    },
}

impl core::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReplayError::Truncated { first_event } => {
                write!(f, "op log truncated, first retained event is {}", first_event)
            }
            ReplayError::ResponseMismatch { request_id } => {
                write!(f, "replayed response differs for request {}", request_id)
            }
            ReplayError::HeadMismatch { expected, actual } => write!(
                f,
                "commit head mismatch: expected {}, got {}",
                short_id(expected),
                short_id(actual)
            ),
        }
    }
}

/// Result of a replay step.
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Replay every request in `oplog` on a fresh state.
///
/// Returns the rebuilt state and the gateway holding the rebuilt logs.
pub fn replay(oplog: &OpLog, genesis_timestamp: u64) -> ReplayResult<(SimState, AxiomGateway)> {
    if oplog.is_truncated() {
        let first_event = oplog.events().first().map_or(oplog.next_id(), |e| e.id);
        return Err(ReplayError::Truncated { first_event });
    }

    let mut state = SimState::new();
    let mut gateway = AxiomGateway::new(genesis_timestamp);
    for (op, timestamp) in oplog.requests() {
        gateway.submit(op.clone(), timestamp, |op| step(&mut state, op, timestamp));
    }
    Ok((state, gateway))
}

/// Replay a gateway's OpLog and check it reproduces every recorded response
/// and the recorded CommitLog head.
pub fn replay_and_verify(original: &AxiomGateway) -> ReplayResult<CommitLog> {
    let (_, rebuilt) = replay(original.oplog(), original.commitlog().genesis_timestamp())?;

    let recorded = original.oplog().events().iter();
    let replayed = rebuilt.oplog().events().iter();
    for (a, b) in recorded.zip(replayed) {
        if let (
            OpEventType::Response { request_id, result },
            OpEventType::Response { result: again, .. },
        ) = (&a.event_type, &b.event_type)
        {
            if result != again {
                return Err(ReplayError::ResponseMismatch {
                    request_id: *request_id,
                });
            }
        }
    }

    let expected = original.commitlog().head();
    let actual = rebuilt.commitlog().head();
    if expected != actual {
        return Err(ReplayError::HeadMismatch { expected, actual });
    }

    Ok(rebuilt.into_parts().1)
}

/// Human-readable one-line summary of a replay failure.
pub fn describe(err: &ReplayError) -> String {
    alloc::format!("replay failed: {}", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use ownsim_core::{CommitType, DeclValue, FrameId, Op, Place};

    fn record(ops: &[Op]) -> AxiomGateway {
        let mut state = SimState::new();
        let mut gateway = AxiomGateway::new(7);
        for (i, op) in ops.iter().enumerate() {
            let ts = (i as u64 + 1) * 100;
            gateway.submit(op.clone(), ts, |op| step(&mut state, op, ts));
        }
        gateway
    }

    fn program() -> alloc::vec::Vec<Op> {
        alloc::vec![
            Op::Enter,
            Op::Declare {
                name: "s".to_string(),
                value: DeclValue::Heap { len: 2, capacity: 2 },
            },
            Op::BorrowExclusive {
                owner: "s".to_string(),
                reference: "r".to_string(),
                place: Place::Whole,
            },
            Op::Grow {
                name: "r".to_string(),
                capacity: 8,
            },
            Op::EndBorrow {
                reference: "r".to_string(),
            },
            Op::Read {
                name: "missing".to_string(),
            },
            Op::Exit,
        ]
    }

    #[test]
    fn test_replay_reproduces_state() {
        let gateway = record(&program());
        let (state, rebuilt) = replay(gateway.oplog(), 7).unwrap();
        assert_eq!(state.memory.depth(), 0);
        assert!(state.memory.live_allocations().is_empty());
        assert_eq!(rebuilt.commitlog().head(), gateway.commitlog().head());
    }

    #[test]
    fn test_replay_and_verify_accepts_faithful_log() {
        let gateway = record(&program());
        let rebuilt = replay_and_verify(&gateway).unwrap();
        assert_eq!(rebuilt.len(), gateway.commitlog().len());
    }

    #[test]
    fn test_replay_detects_foreign_commit() {
        let mut gateway = record(&program());
        gateway.append_internal_commit(CommitType::FrameExited { frame: FrameId(9) }, 1);
        assert!(matches!(
            replay_and_verify(&gateway),
            Err(ReplayError::HeadMismatch { .. })
        ));
    }

    #[test]
    fn test_replay_rejects_truncated_log() {
        let mut oplog = OpLog::with_max_events(2);
        oplog.log_request(Op::Enter, 0);
        oplog.log_request(Op::Enter, 1);
        oplog.log_request(Op::Exit, 2);
        let err = replay(&oplog, 0).err().unwrap();
        assert_eq!(err, ReplayError::Truncated { first_event: 1 });
        assert!(describe(&err).contains("truncated"));
    }
}
