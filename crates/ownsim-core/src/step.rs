//! Pure step function - the heart of the verification target
//!
//! This module contains the pure `step(state, op) -> (state', result)` function.
//! All state transformations happen here - no host, no I/O, no side effects.
//!
//! # Design
//!
//! The step function takes:
//! - Current simulator state
//! - An operation from the command log
//! - Current timestamp
//!
//! And returns:
//! - Updated state (via mutation)
//! - Operation result (`Outcome` or `Violation`)
//! - List of commits (state mutations for the audit log)
//!
//! A rejected operation produces no commits and leaves the state as it was,
//! with one exception: `Exit` always pops the frame.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::borrow;
use crate::detector::{check_access, Access, ViolationKind};
use crate::ownership;
use crate::state::SimState;
use crate::types::{Address, BindingId, BorrowId, BorrowKind, FrameId, Place, ValueKind};

// ============================================================================
// Operation definitions
// ============================================================================

/// Initial value of a declaration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclValue {
    /// `let x;`
    Uninit,
    /// `let x = 5;`
    Scalar { value: u64 },
    /// `let v = vec![0; len];` (zero-filled)
    Heap {
        len: usize,
        #[serde(default)]
        capacity: usize,
    },
}

/// Operation variants - every record a command log can hold
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Enter a lexical scope
    Enter,
    /// Leave the innermost scope
    Exit,
    /// Declare a binding in the top frame
    Declare { name: String, value: DeclValue },
    /// Move `from` into `to`
    Move { from: String, to: String },
    /// Copy `from` into `to`
    Copy { from: String, to: String },
    /// Make `name` own a fresh allocation
    Allocate {
        name: String,
        size: usize,
        #[serde(default)]
        capacity: usize,
    },
    /// Reallocate the allocation owned by (or exclusively borrowed through) `name`
    Grow { name: String, capacity: usize },
    /// `let reference = &owner;`
    BorrowShared {
        owner: String,
        reference: String,
        #[serde(default)]
        place: Place,
    },
    /// `let reference = &mut owner;`
    BorrowExclusive {
        owner: String,
        reference: String,
        #[serde(default)]
        place: Place,
    },
    /// `let to = &mut *reference;`
    Reborrow { reference: String, to: String },
    /// Last use of `reference`
    EndBorrow { reference: String },
    /// Read through `name`
    Read { name: String },
    /// Write through `name`
    Write { name: String },
    /// Explicit `drop(name)`
    Drop { name: String },
}

impl Op {
    /// Short name of the operation
    pub fn label(&self) -> &'static str {
        match self {
            Op::Enter => "enter",
            Op::Exit => "exit",
            Op::Declare { .. } => "declare",
            Op::Move { .. } => "move",
            Op::Copy { .. } => "copy",
            Op::Allocate { .. } => "allocate",
            Op::Grow { .. } => "grow",
            Op::BorrowShared { .. } => "borrow_shared",
            Op::BorrowExclusive { .. } => "borrow_exclusive",
            Op::Reborrow { .. } => "reborrow",
            Op::EndBorrow { .. } => "end_borrow",
            Op::Read { .. } => "read",
            Op::Write { .. } => "write",
            Op::Drop { .. } => "drop",
        }
    }

    /// The binding name a violation of this operation is reported against
    pub fn subject(&self) -> Option<&str> {
        match self {
            Op::Enter | Op::Exit => None,
            Op::Declare { name, .. }
            | Op::Allocate { name, .. }
            | Op::Grow { name, .. }
            | Op::Read { name }
            | Op::Write { name }
            | Op::Drop { name } => Some(name),
            Op::Move { from, .. } | Op::Copy { from, .. } => Some(from),
            Op::BorrowShared { owner, .. } | Op::BorrowExclusive { owner, .. } => Some(owner),
            Op::Reborrow { reference, .. } | Op::EndBorrow { reference } => Some(reference),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Move { from, to } | Op::Copy { from, to } => {
                write!(f, "{}({} -> {})", self.label(), from, to)
            }
            Op::BorrowShared { owner, reference, .. }
            | Op::BorrowExclusive { owner, reference, .. } => {
                write!(f, "{}({} -> {})", self.label(), owner, reference)
            }
            Op::Reborrow { reference, to } => write!(f, "reborrow({} -> {})", reference, to),
            _ => match self.subject() {
                Some(name) => write!(f, "{}({})", self.label(), name),
                None => write!(f, "{}", self.label()),
            },
        }
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// What a successful operation did
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// New top frame
    FrameEntered(FrameId),
    /// Frame popped, its bindings dropped
    FrameExited(FrameId),
    /// Binding declared
    Declared(BindingId),
    /// Binding now owns a fresh allocation
    Allocated { binding: BindingId, address: Address },
    /// Ownership transferred
    Moved { from: BindingId, to: BindingId },
    /// Value duplicated
    Copied { from: BindingId, to: BindingId },
    /// Allocation reallocated
    Grown { from: Address, to: Address },
    /// Borrow created
    Borrowed { borrow: BorrowId, reference: BindingId },
    /// Borrow retired
    BorrowEnded(BorrowId),
    /// Read or write permitted
    Accessed,
    /// Binding dropped (and its allocation freed, if any)
    Dropped {
        binding: BindingId,
        freed: Option<Address>,
    },
    /// Drop of a binding with nothing left to drop
    Skipped,
}

/// A rejected operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Classified reason
    pub kind: ViolationKind,
    /// Name of the binding the operation targeted
    pub binding: Option<String>,
}

impl Violation {
    /// Create a violation against a named binding
    pub fn new(kind: ViolationKind, binding: Option<&str>) -> Self {
        Self {
            kind,
            binding: binding.map(|b| b.to_string()),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(name) => write!(f, "{} on `{}`", self.kind, name),
            None => write!(f, "{}", self.kind),
        }
    }
}

// ============================================================================
// Commit types (state mutations)
// ============================================================================

/// Types of state mutations (for the audit log).
///
/// Each variant represents a discrete state change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitType {
    /// Genesis commit (empty state)
    Genesis,
    /// Frame pushed
    FrameEntered { frame: FrameId },
    /// Frame popped
    FrameExited { frame: FrameId },
    /// Binding declared
    BindingDeclared {
        binding: BindingId,
        name: String,
        frame: FrameId,
        kind: Option<ValueKind>,
    },
    /// Uninitialized binding given a value in place
    BindingInitialized { binding: BindingId, kind: ValueKind },
    /// Ownership transferred
    BindingMoved { from: BindingId, to: BindingId },
    /// Value duplicated
    BindingCopied { from: BindingId, to: BindingId },
    /// Binding destroyed
    BindingDropped { binding: BindingId },
    /// Allocation created
    AllocationCreated {
        address: Address,
        size: usize,
        capacity: usize,
        owner: BindingId,
    },
    /// Allocation moved to a bigger region (old one freed)
    AllocationGrown {
        from: Address,
        to: Address,
        capacity: usize,
    },
    /// Allocation freed
    AllocationFreed { address: Address },
    /// Borrow created
    BorrowCreated {
        borrow: BorrowId,
        kind: BorrowKind,
        referent: BindingId,
        reference: BindingId,
        parent: Option<BorrowId>,
    },
    /// Borrow retired
    BorrowEnded { borrow: BorrowId },
    /// Borrow outlived its referent
    BorrowDangling { borrow: BorrowId },
}

/// Result of a step operation
#[derive(Clone, Debug)]
pub struct StepResult {
    /// The operation result
    pub result: Result<Outcome, Violation>,
    /// Commits generated by this step
    pub commits: Vec<CommitType>,
}

// ============================================================================
// The pure step function - THE verification target
// ============================================================================

/// Execute an operation on the simulator state.
///
/// This is the core state transition function. It is pure in the sense
/// that it only modifies the provided state and returns a result - no I/O
/// or other side effects.
///
/// # Arguments
/// - `state`: Mutable reference to simulator state
/// - `op`: The operation to execute
/// - `timestamp`: Current time in nanoseconds
///
/// # Returns
/// StepResult containing the outcome and any commits generated
pub fn step(state: &mut SimState, op: Op, timestamp: u64) -> StepResult {
    // Update metrics
    state.update_op_metrics(timestamp);

    let mut commits = Vec::new();
    let subject = op.subject().map(|s| s.to_string());
    let result = match op {
        Op::Enter => Ok(ownership::push_frame(state, &mut commits)),

        Op::Exit => {
            return match ownership::pop_frame(state, &mut commits) {
                Ok(outcome) => StepResult {
                    result: Ok(outcome),
                    commits,
                },
                Err((kind, binding)) => {
                    let name = binding.and_then(|b| state.name_of(b));
                    StepResult {
                        result: Err(Violation::new(kind, name)),
                        commits,
                    }
                }
            };
        }

        Op::Declare { name, value } => ownership::declare(state, &name, value, &mut commits),

        Op::Move { from, to } => state
            .lookup(&from)
            .and_then(|id| ownership::move_binding(state, id, &to, &mut commits)),

        Op::Copy { from, to } => state
            .lookup(&from)
            .and_then(|id| ownership::copy_binding(state, id, &to, &mut commits)),

        Op::Allocate {
            name,
            size,
            capacity,
        } => ownership::allocate(state, &name, size, capacity, &mut commits),

        Op::Grow { name, capacity } => state
            .lookup(&name)
            .and_then(|id| ownership::grow(state, id, capacity, &mut commits)),

        Op::BorrowShared {
            owner,
            reference,
            place,
        } => state.lookup(&owner).and_then(|id| {
            borrow::borrow(state, id, &reference, BorrowKind::Shared, place, &mut commits)
        }),

        Op::BorrowExclusive {
            owner,
            reference,
            place,
        } => state.lookup(&owner).and_then(|id| {
            borrow::borrow(
                state,
                id,
                &reference,
                BorrowKind::Exclusive,
                place,
                &mut commits,
            )
        }),

        Op::Reborrow { reference, to } => state
            .lookup(&reference)
            .and_then(|id| borrow::reborrow(state, id, &to, &mut commits)),

        Op::EndBorrow { reference } => state
            .lookup(&reference)
            .and_then(|id| borrow::end_borrow(state, id, &mut commits)),

        Op::Read { name } => step_access(state, &name, Access::Read),
        Op::Write { name } => step_access(state, &name, Access::Write),

        Op::Drop { name } => state
            .lookup(&name)
            .and_then(|id| ownership::drop_binding(state, id, &mut commits)),
    };

    StepResult {
        result: result.map_err(|kind| Violation::new(kind, subject.as_deref())),
        commits,
    }
}

// ============================================================================
// Operation handlers
// ============================================================================

fn step_access(state: &SimState, name: &str, access: Access) -> Result<Outcome, ViolationKind> {
    let id = state.lookup(name)?;
    check_access(state, id, access)?;
    Ok(Outcome::Accessed)
}
