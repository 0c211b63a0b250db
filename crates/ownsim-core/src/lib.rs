//! ownsim Core - Pure Ownership/Borrow State Machine
//!
//! This crate contains the **pure, host-free** state machine that models a
//! running program's stack frames and heap allocations, and tracks the
//! Read/Write/Own permissions of every binding as the program moves,
//! copies, borrows and drops values.
//!
//! # Design Principles
//!
//! 1. **No host dependency**: logging and clocks live in `ownsim`
//! 2. **No I/O or side effects**: Pure state transformations only
//! 3. **Deterministic**: Same operation log always produces the same result
//! 4. **Fail closed**: Every operation is checked before it mutates anything
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ownsim-core                           │
//! │                  (Pure State Machine)                       │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                    │
//! │   │   SimState    │    │    step()     │                    │
//! │   │  - memory     │───▶│  Pure state   │                    │
//! │   │  - bindings   │    │  transformer  │                    │
//! │   │  - borrows    │    └───────────────┘                    │
//! │   └───────────────┘                                         │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                    │
//! │   │   Detector    │    │  Invariants   │                    │
//! │   │ check_access  │    │  Assertions   │                    │
//! │   └───────────────┘    └───────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              │ used by
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         ownsim                              │
//! │                   (Runtime Wrapper)                         │
//! │                                                             │
//! │   - HAL integration (debug output, timing)                  │
//! │   - CommitLog recording                                     │
//! │   - OpLog audit trail                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `types` - Identifiers, permission triples, slots, frames, bindings, borrows
//! - `memory` - Stack of frames and the heap of allocations
//! - `bindings` - Binding table with lexical (shadowing) lookup
//! - `state` - SimState struct with all simulator data
//! - `detector` - `check_access`, the gate every operation passes through
//! - `ownership` - Move, copy, allocate, grow and drop
//! - `borrow` - Shared/exclusive borrows, reborrows and their retirement
//! - `step` - Pure `step(state, op) -> StepResult` function
//! - `report` - Whole-log validation pass and the leak report
//! - `invariants` - Invariant assertions over reachable states

#![no_std]
extern crate alloc;

pub mod bindings;
pub mod borrow;
pub mod detector;
pub mod invariants;
pub mod memory;
pub mod ownership;
pub mod report;
pub mod state;
pub mod step;
pub mod types;

// Re-export all public types for convenient access
pub use bindings::BindingTable;
pub use detector::{check_access, Access, ViolationKind};
pub use invariants::{assert_invariants, check_all_invariants, InvariantViolation};
pub use memory::{MemoryError, MemoryModel};
pub use report::{leak_report, validate, Leak, ValidationReport};
pub use state::SimState;
pub use step::{step, CommitType, DeclValue, Op, Outcome, StepResult, Violation};
pub use types::{
    Address, Allocation, Binding, BindingId, BindingState, Borrow, BorrowId, BorrowKind, Frame,
    FrameId, Permissions, Place, Pointee, SavedPermissions, SlotValue, StackSlot, ValueKind,
};
