//! Formal invariants for simulator verification
//!
//! This module contains runtime-checkable invariants that should always hold.
//! These are used for:
//! 1. Runtime assertion checking during development
//! 2. Property-based testing with proptest
//! 3. Formal verification with Kani
//!
//! # Invariants
//!
//! 1. **Single Owner**: At most one live binding owns any allocation, and a
//!    live owner's allocation is live
//! 2. **Borrow Exclusivity**: A referent never has a live exclusive borrow
//!    alongside any other active borrow (suspended reborrow parents excluded)
//! 3. **Frame Consistency**: Every slot of a live frame belongs to a binding
//!    declared in that frame, and frames are ordered oldest first
//! 4. **Borrow Consistency**: Arena, per-referent stacks and reference
//!    bindings agree; a live binding is `Borrowed` exactly while lent out
//! 5. **ID Monotonicity**: Next IDs are always greater than existing IDs

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::state::SimState;
use crate::types::{Address, BindingId, BindingState, BorrowKind, SlotValue, ValueKind};

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all simulator invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(state: &SimState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_single_owner(state));
    violations.extend(check_borrow_exclusivity(state));
    violations.extend(check_frame_consistency(state));
    violations.extend(check_borrow_consistency(state));
    violations.extend(check_id_monotonicity(state));

    violations
}

/// Invariant 1: single-deallocator
fn check_single_owner(state: &SimState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut owners: BTreeMap<Address, Vec<BindingId>> = BTreeMap::new();

    for binding in state.bindings.bindings.values() {
        if binding.kind != Some(ValueKind::Heap) || !binding.state.is_live() {
            continue;
        }
        if let Some(SlotValue::Fat { addr, .. }) = state.slot_value(binding.id) {
            owners.entry(addr).or_default().push(binding.id);
            if !state.memory.is_live(addr) {
                violations.push(InvariantViolation {
                    invariant: "single_owner",
                    description: alloc::format!(
                        "Live binding {} owns freed allocation {}",
                        binding.id.0,
                        addr
                    ),
                });
            }
        }
    }

    for (addr, ids) in owners {
        if ids.len() > 1 {
            violations.push(InvariantViolation {
                invariant: "single_owner",
                description: alloc::format!(
                    "Allocation {} has {} live owners",
                    addr,
                    ids.len()
                ),
            });
        }
    }

    violations
}

/// Invariant 2: shared XOR exclusive, per referent
fn check_borrow_exclusivity(state: &SimState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (referent, stack) in &state.borrow_stacks {
        let active: Vec<BorrowKind> = stack
            .iter()
            .filter(|id| !state.is_suspended(**id))
            .filter_map(|id| state.borrows.get(id).map(|b| b.kind))
            .collect();
        let conflicting = active
            .iter()
            .enumerate()
            .any(|(i, a)| active[i + 1..].iter().any(|b| a.conflicts_with(*b)));

        if conflicting {
            violations.push(InvariantViolation {
                invariant: "borrow_exclusivity",
                description: alloc::format!(
                    "Binding {} has an exclusive borrow alongside {} other active borrows",
                    referent.0,
                    active.len() - 1
                ),
            });
        }
    }

    violations
}

/// Invariant 3: frames and slots agree with the binding table
fn check_frame_consistency(state: &SimState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for pair in state.memory.frames.windows(2) {
        if pair[0].id >= pair[1].id {
            violations.push(InvariantViolation {
                invariant: "frame_consistency",
                description: alloc::format!(
                    "Frame {} is stacked on top of newer frame {}",
                    pair[1].id.0,
                    pair[0].id.0
                ),
            });
        }
    }

    for frame in &state.memory.frames {
        for slot in &frame.slots {
            match state.binding(slot.binding) {
                Some(b) if b.frame == frame.id => {}
                Some(b) => violations.push(InvariantViolation {
                    invariant: "frame_consistency",
                    description: alloc::format!(
                        "Slot in frame {} holds binding {} declared in frame {}",
                        frame.id.0,
                        b.id.0,
                        b.frame.0
                    ),
                }),
                None => violations.push(InvariantViolation {
                    invariant: "frame_consistency",
                    description: alloc::format!(
                        "Slot in frame {} holds unknown binding {}",
                        frame.id.0,
                        slot.binding.0
                    ),
                }),
            }
        }
    }

    violations
}

/// Invariant 4: borrow arena, stacks and bindings agree
fn check_borrow_consistency(state: &SimState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut violation = |description: String| {
        violations.push(InvariantViolation {
            invariant: "borrow_consistency",
            description,
        })
    };

    for (id, borrow) in &state.borrows {
        if !state.borrows_on(borrow.referent).contains(id) {
            violation(alloc::format!(
                "Borrow {} missing from the stack of binding {}",
                id.0,
                borrow.referent.0
            ));
        }
        if state.binding(borrow.reference).and_then(|r| r.borrow) != Some(*id) {
            violation(alloc::format!(
                "Borrow {} is not held by its reference {}",
                id.0,
                borrow.reference.0
            ));
        }
        if let Some(parent) = borrow.parent {
            match state.borrows.get(&parent) {
                Some(p) if p.referent == borrow.referent => {}
                _ => violation(alloc::format!(
                    "Reborrow {} has no live parent on the same referent",
                    id.0
                )),
            }
        }
    }

    for (referent, stack) in &state.borrow_stacks {
        for id in stack {
            if !state.borrows.contains_key(id) {
                violation(alloc::format!(
                    "Stack of binding {} holds retired borrow {}",
                    referent.0,
                    id.0
                ));
            }
        }
    }

    for binding in state.bindings.bindings.values() {
        if let Some(id) = binding.borrow {
            if !state.borrows.contains_key(&id) {
                violation(alloc::format!(
                    "Binding {} holds retired borrow {}",
                    binding.id.0,
                    id.0
                ));
            }
        }

        if !binding.state.is_live() {
            continue;
        }
        let lent = state.has_live_borrows(binding.id)
            || binding
                .borrow
                .map(|id| state.is_suspended(id))
                .unwrap_or(false);
        let borrowed = matches!(binding.state, BindingState::Borrowed(_));
        if lent != borrowed || borrowed != binding.saved.is_some() {
            violation(alloc::format!(
                "Binding {} is {:?} but lent out: {}",
                binding.id.0,
                binding.state,
                lent
            ));
        }
    }

    violations
}

/// Invariant 5: ID counters are ahead of every issued ID
fn check_id_monotonicity(state: &SimState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if let Some(max) = state.bindings.bindings.keys().next_back() {
        if max.0 >= state.bindings.next_id {
            violations.push(InvariantViolation {
                invariant: "id_monotonicity",
                description: alloc::format!(
                    "Max binding ID {} >= next_id {}",
                    max.0,
                    state.bindings.next_id
                ),
            });
        }
    }

    if let Some(max) = state.borrows.keys().next_back() {
        if max.0 >= state.next_borrow_id {
            violations.push(InvariantViolation {
                invariant: "id_monotonicity",
                description: alloc::format!(
                    "Max borrow ID {} >= next_borrow_id {}",
                    max.0,
                    state.next_borrow_id
                ),
            });
        }
    }

    if let Some(top) = state.memory.frames.last() {
        if top.id.0 >= state.memory.next_frame_id {
            violations.push(InvariantViolation {
                invariant: "id_monotonicity",
                description: alloc::format!(
                    "Top frame ID {} >= next_frame_id {}",
                    top.id.0,
                    state.memory.next_frame_id
                ),
            });
        }
    }

    if let Some(max) = state.memory.heap.keys().next_back() {
        if max.0 >= state.memory.next_address {
            violations.push(InvariantViolation {
                invariant: "id_monotonicity",
                description: alloc::format!(
                    "Max address {} >= next_address {:#x}",
                    max,
                    state.memory.next_address
                ),
            });
        }
    }

    violations
}

/// Assert all invariants hold (panic if not)
pub fn assert_invariants(state: &SimState) {
    let violations = check_all_invariants(state);
    if let Some(v) = violations.first() {
        panic!("Invariant violated: {} ({})", v.invariant, v.description);
    }
}

// ============================================================================
// Kani proofs for invariants
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;
    use crate::step::{step, DeclValue, Op};
    use crate::types::Place;
    use alloc::string::ToString;

    /// Proof: a borrow/end-borrow round trip maintains invariants
    #[kani::proof]
    #[kani::unwind(5)]
    fn borrow_round_trip_maintains_invariants() {
        let mut state = SimState::new();
        step(&mut state, Op::Enter, 0);
        step(
            &mut state,
            Op::Declare {
                name: "x".to_string(),
                value: DeclValue::Scalar { value: kani::any() },
            },
            1,
        );

        let exclusive: bool = kani::any();
        let op = if exclusive {
            Op::BorrowExclusive {
                owner: "x".to_string(),
                reference: "r".to_string(),
                place: Place::Whole,
            }
        } else {
            Op::BorrowShared {
                owner: "x".to_string(),
                reference: "r".to_string(),
                place: Place::Whole,
            }
        };
        step(&mut state, op, 2);
        kani::assert(
            check_all_invariants(&state).is_empty(),
            "Borrowing should maintain invariants",
        );

        step(
            &mut state,
            Op::EndBorrow {
                reference: "r".to_string(),
            },
            3,
        );
        kani::assert(
            check_all_invariants(&state).is_empty(),
            "Ending a borrow should maintain invariants",
        );
    }
}
