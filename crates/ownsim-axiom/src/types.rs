//! Common types for the Axiom layer.

use alloc::string::String;
use core::fmt::Write;

/// Event identifier (monotonic, unique within the OpLog)
pub type EventId = u64;

/// Commit identifier (32-byte hash)
pub type CommitId = [u8; 32];

/// Short hex form of a commit id, for log lines
pub fn short_id(id: &CommitId) -> String {
    let mut out = String::with_capacity(16);
    for byte in &id[..8] {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
