//! Whole-log validation and the leak report
//!
//! `validate` runs a complete command log through `step` on a fresh state
//! and collects every result. It has no side effects beyond its own
//! bookkeeping, so it can run before (or instead of) any execution pass.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::state::SimState;
use crate::step::{step, Op, Outcome, Violation};
use crate::types::{Address, SlotValue, ValueKind};

/// An allocation still live at the end of a run (informational, not an error)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leak {
    /// Address of the allocation
    pub address: Address,
    /// Length in bytes
    pub size: usize,
    /// Reserved capacity
    pub capacity: usize,
    /// Live binding that still owns it, if any
    pub owner: Option<String>,
}

/// Every allocation not yet freed, with its current owner
pub fn leak_report(state: &SimState) -> Vec<Leak> {
    state
        .memory
        .live_allocations()
        .into_iter()
        .map(|alloc| {
            let owner = state
                .bindings
                .bindings
                .values()
                .filter(|b| b.kind == Some(ValueKind::Heap) && b.state.is_live())
                .find(|b| {
                    matches!(
                        state.slot_value(b.id),
                        Some(SlotValue::Fat { addr, .. }) if addr == alloc.address
                    )
                })
                .map(|b| b.name.to_string());
            Leak {
                address: alloc.address,
                size: alloc.size,
                capacity: alloc.capacity,
                owner,
            }
        })
        .collect()
}

/// Result of validating a whole command log
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    /// One result per executed operation, in order
    pub outcomes: Vec<Result<Outcome, Violation>>,
    /// Index of the fatal operation that stopped the run
    pub halted_at: Option<usize>,
    /// Allocations still live when the run ended
    pub leaks: Vec<Leak>,
}

impl ValidationReport {
    /// Every rejected operation with its index
    pub fn violations(&self) -> Vec<(usize, &Violation)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|v| (i, v)))
            .collect()
    }

    /// No violations at all (leaks are allowed)
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|r| r.is_ok())
    }
}

/// Validate a command log: pure pass over a fresh state.
///
/// Stops at the first fatal (driver misuse) violation; other violations are
/// recorded and the run continues.
pub fn validate(ops: &[Op]) -> ValidationReport {
    let mut state = SimState::new();
    let mut outcomes = Vec::with_capacity(ops.len());
    let mut halted_at = None;

    for (index, op) in ops.iter().enumerate() {
        let result = step(&mut state, op.clone(), index as u64).result;
        let fatal = matches!(&result, Err(v) if v.kind.is_fatal());
        outcomes.push(result);
        if fatal {
            halted_at = Some(index);
            break;
        }
    }

    ValidationReport {
        outcomes,
        halted_at,
        leaks: leak_report(&state),
    }
}
