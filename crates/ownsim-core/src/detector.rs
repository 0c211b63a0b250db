//! Violation detector - the access gate every operation passes through
//!
//! `check_access` compares a binding's current permissions with what an
//! access requires and, on failure, classifies the violation. It never
//! mutates state: operations call it first and only mutate on `Ok`.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryError;
use crate::state::SimState;
use crate::types::{Binding, BindingId, BindingState, Permissions, ValueKind};

/// Violation taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Binding's ownership was already transferred away (or never given)
    UseAfterMove,
    /// Allocation already freed
    DoubleFree,
    /// Access conflicts with a live borrow
    ConflictingBorrow,
    /// Reference used after its referent was dropped or reallocated
    DanglingReference,
    /// Exit with no frame, or declaration with no frame
    FrameUnderflow,
    /// Name not found in any live frame
    UnknownBinding,
    /// Reference holds no live borrow
    UnknownBorrow,
    /// Allocation request larger than the heap can model
    CapacityOverflow,
}

impl ViolationKind {
    /// Driver misuse: the run cannot continue meaningfully
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ViolationKind::FrameUnderflow
                | ViolationKind::UnknownBinding
                | ViolationKind::UnknownBorrow
                | ViolationKind::CapacityOverflow
        )
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::UseAfterMove => write!(f, "use after move"),
            ViolationKind::DoubleFree => write!(f, "double free"),
            ViolationKind::ConflictingBorrow => write!(f, "conflicting borrow"),
            ViolationKind::DanglingReference => write!(f, "dangling reference"),
            ViolationKind::FrameUnderflow => write!(f, "frame underflow"),
            ViolationKind::UnknownBinding => write!(f, "unknown binding"),
            ViolationKind::UnknownBorrow => write!(f, "unknown borrow"),
            ViolationKind::CapacityOverflow => write!(f, "capacity overflow"),
        }
    }
}

impl From<MemoryError> for ViolationKind {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::FrameUnderflow => ViolationKind::FrameUnderflow,
            MemoryError::AlreadyFreed(_) => ViolationKind::DoubleFree,
            MemoryError::CapacityOverflow { .. } => ViolationKind::CapacityOverflow,
            // Addresses only come from slots the simulator wrote itself, so
            // these mean the driver fed inconsistent state.
            MemoryError::UnknownAllocation(_) | MemoryError::OutOfBounds { .. } => {
                ViolationKind::UnknownBinding
            }
        }
    }
}

// ============================================================================
// Accesses
// ============================================================================

/// Kind of access an operation performs on a binding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Read the value (through a reference: read the referent)
    Read,
    /// Mutate the value (through a reference: mutate the referent)
    Write,
    /// Transfer ownership
    Move,
    /// Destroy the value
    Drop,
    /// Duplicate the value
    Copy,
    /// Take a shared borrow
    BorrowShared,
    /// Take an exclusive borrow
    BorrowExclusive,
    /// Reborrow through an exclusive reference
    Reborrow,
    /// Reallocate the owned heap region
    Grow,
}

impl Access {
    /// Minimum permissions this access needs
    pub fn required(self) -> Permissions {
        match self {
            Access::Read | Access::Copy | Access::BorrowShared => Permissions::read_only(),
            Access::Write | Access::BorrowExclusive | Access::Reborrow | Access::Grow => {
                Permissions::read_write()
            }
            Access::Move => Permissions::pointer(),
            Access::Drop => Permissions {
                read: false,
                write: false,
                own: true,
            },
        }
    }

    /// Whether a reference performs this access on its referent rather
    /// than on the pointer itself
    fn goes_through_reference(self) -> bool {
        matches!(
            self,
            Access::Read | Access::Write | Access::Reborrow | Access::Grow
        )
    }
}

// ============================================================================
// The access gate
// ============================================================================

/// Check whether `id` may perform `access` in the current state.
///
/// # Returns
/// - `Ok(())`: the access is permitted
/// - `Err(ViolationKind)`: the classified reason it is not
///
/// # Properties
/// 1. **Fail Closed**: an unknown binding is rejected, never defaulted
/// 2. **Exact**: `Ok` exactly when the binding's (or, through a reference,
///    the view's) permissions cover `access.required()` and no live borrow
///    or freed allocation forbids it
/// 3. **Pure**: this function never modifies any state
pub fn check_access(state: &SimState, id: BindingId, access: Access) -> Result<(), ViolationKind> {
    // 1. Lookup binding - FAIL CLOSED on unknown ID
    let binding = state.binding(id).ok_or(ViolationKind::UnknownBinding)?;

    if binding.is_reference() && access.goes_through_reference() {
        check_through_reference(state, binding, access)
    } else if access == Access::Reborrow {
        // Only references can be reborrowed
        Err(ViolationKind::UnknownBorrow)
    } else {
        check_direct(state, binding, access)
    }
}

/// Access on the binding's own value
fn check_direct(state: &SimState, binding: &Binding, access: Access) -> Result<(), ViolationKind> {
    // 2. Check permissions over the binding itself
    if !binding.perms.satisfies(&access.required()) {
        return Err(classify_missing(binding, access));
    }

    // 3. Borrow exclusivity
    match access {
        Access::BorrowShared if state.has_live_exclusive(binding.id) => {
            return Err(ViolationKind::ConflictingBorrow)
        }
        Access::BorrowExclusive if state.has_live_borrows(binding.id) => {
            return Err(ViolationKind::ConflictingBorrow)
        }
        _ => {}
    }

    // 4. A heap owner's allocation must still exist
    if binding.kind == Some(ValueKind::Heap) {
        if let Some(addr) = state.slot_value(binding.id).and_then(|v| v.heap_address()) {
            if !state.memory.is_live(addr) {
                return Err(ViolationKind::DoubleFree);
            }
        }
    }

    Ok(())
}

/// Access on a reference's referent
fn check_through_reference(
    state: &SimState,
    reference: &Binding,
    access: Access,
) -> Result<(), ViolationKind> {
    // 2. The pointer itself must be readable
    if !reference.perms.read {
        return Err(classify_missing(reference, access));
    }

    let pointee = state
        .slot_value(reference.id)
        .and_then(|v| v.pointee())
        .ok_or(ViolationKind::UnknownBorrow)?;

    // 3. The borrow must still be live
    let Some(borrow) = reference.borrow.and_then(|b| state.borrows.get(&b)) else {
        return Err(if reference.severed || !state.pointee_alive(pointee) {
            ViolationKind::DanglingReference
        } else {
            ViolationKind::UnknownBorrow
        });
    };

    // 4. The referent must still exist
    if borrow.dangling || !state.pointee_alive(pointee) {
        return Err(ViolationKind::DanglingReference);
    }

    // 5. The view must cover the access
    let view = reference.view.unwrap_or_default();
    if !view.satisfies(&access.required()) {
        return Err(ViolationKind::ConflictingBorrow);
    }

    Ok(())
}

/// Classify a binding that lacks the permissions an access needs.
///
/// A move out of a live binding that cannot give up ownership is reported
/// as a use after move, like a move out of a moved-from binding.
fn classify_missing(binding: &Binding, access: Access) -> ViolationKind {
    match (binding.state, access) {
        (BindingState::Uninitialized | BindingState::MovedFrom | BindingState::Dropped, _) => {
            ViolationKind::UseAfterMove
        }
        (BindingState::Owned | BindingState::Borrowed(_), Access::Move) => {
            ViolationKind::UseAfterMove
        }
        (BindingState::Owned | BindingState::Borrowed(_), _) => ViolationKind::ConflictingBorrow,
    }
}

// ============================================================================
// Kani Proofs for the access gate
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;
    use crate::types::{FrameId, SlotValue};

    fn any_access() -> Access {
        match kani::any::<u8>() % 9 {
            0 => Access::Read,
            1 => Access::Write,
            2 => Access::Move,
            3 => Access::Drop,
            4 => Access::Copy,
            5 => Access::BorrowShared,
            6 => Access::BorrowExclusive,
            7 => Access::Reborrow,
            _ => Access::Grow,
        }
    }

    /// Proof: unknown bindings are always rejected
    #[kani::proof]
    fn fail_closed_on_unknown_binding() {
        let state = SimState::new();
        let result = check_access(&state, BindingId(kani::any()), any_access());
        kani::assert(
            result == Err(ViolationKind::UnknownBinding),
            "Unknown binding must be rejected",
        );
    }

    /// Proof: a scalar owner is granted an access only if its permissions
    /// cover the requirement
    #[kani::proof]
    fn no_rights_escalation() {
        let mut state = SimState::new();
        let frame: FrameId = state.memory.push_frame();
        let id = match state.bindings.declare(
            &mut state.memory,
            frame,
            "x",
            Some(ValueKind::Scalar),
            SlotValue::Scalar(0),
        ) {
            Ok(id) => id,
            Err(_) => return,
        };
        let perms = Permissions {
            read: kani::any(),
            write: kani::any(),
            own: kani::any(),
        };
        if let Some(b) = state.binding_mut(id) {
            b.perms = perms;
        }

        let access = any_access();
        if access == Access::Reborrow {
            return;
        }
        if check_access(&state, id, access).is_ok() {
            kani::assert(
                perms.satisfies(&access.required()),
                "Granted access must be covered by the binding's permissions",
            );
        }
    }
}
