//! Ownership engine - move, copy, allocate, grow and drop
//!
//! Every public operation checks the access first and only mutates state on
//! success, so a rejected operation leaves `SimState` untouched. Scope exit
//! is the one exception: a frame is always popped, even if one of its drops
//! reports a violation.

use alloc::string::ToString;
use alloc::vec::Vec;

use crate::borrow;
use crate::detector::{check_access, Access, ViolationKind};
use crate::state::SimState;
use crate::step::{CommitType, DeclValue, Outcome};
use crate::types::{
    Address, BindingId, BindingState, Borrow, BorrowKind, FrameId, Permissions, SlotValue,
    ValueKind,
};

/// Where the destination of a move/copy/allocate/borrow lands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// An uninitialized binding visible under the name, initialized in place
    Uninit(BindingId),
    /// A fresh binding declared in the top frame
    Fresh,
}

/// Resolve a destination name.
///
/// Fails with `FrameUnderflow` if a fresh binding is needed but no frame is
/// live. Never mutates state.
pub fn resolve_target(state: &SimState, name: &str) -> Result<Target, ViolationKind> {
    if let Some(id) = state.bindings.lookup(&state.memory, name) {
        if state.state_of(id) == Some(BindingState::Uninitialized) {
            return Ok(Target::Uninit(id));
        }
    }
    if state.memory.depth() == 0 {
        return Err(ViolationKind::FrameUnderflow);
    }
    Ok(Target::Fresh)
}

/// Give `target` a value of `kind`
pub(crate) fn bind_target(
    state: &mut SimState,
    target: Target,
    name: &str,
    kind: ValueKind,
    value: SlotValue,
    commits: &mut Vec<CommitType>,
) -> Result<BindingId, ViolationKind> {
    match target {
        Target::Uninit(id) => {
            state.set_slot_value(id, value);
            if let Some(b) = state.binding_mut(id) {
                b.kind = Some(kind);
                b.state = BindingState::Owned;
                b.perms = if kind.is_reference() {
                    Permissions::pointer()
                } else {
                    Permissions::full()
                };
            }
            commits.push(CommitType::BindingInitialized { binding: id, kind });
            Ok(id)
        }
        Target::Fresh => {
            let frame = state
                .memory
                .top_frame()
                .map(|f| f.id)
                .ok_or(ViolationKind::FrameUnderflow)?;
            let id = state
                .bindings
                .declare(&mut state.memory, frame, name, Some(kind), value)?;
            commits.push(CommitType::BindingDeclared {
                binding: id,
                name: name.to_string(),
                frame,
                kind: Some(kind),
            });
            Ok(id)
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Enter a new lexical scope
pub fn push_frame(state: &mut SimState, commits: &mut Vec<CommitType>) -> Outcome {
    let frame = state.memory.push_frame();
    commits.push(CommitType::FrameEntered { frame });
    Outcome::FrameEntered(frame)
}

/// Leave the innermost scope.
///
/// Drops every live binding of the top frame, last declared first, then
/// removes the frame. The first failing drop is reported, but the frame is
/// popped regardless.
pub fn pop_frame(
    state: &mut SimState,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, (ViolationKind, Option<BindingId>)> {
    let Some(top) = state.memory.top_frame() else {
        return Err((ViolationKind::FrameUnderflow, None));
    };
    let frame: FrameId = top.id;
    let unwind: Vec<BindingId> = top.slots.iter().rev().map(|s| s.binding).collect();

    let mut first_error = None;
    for id in unwind {
        if let Err(kind) = drop_on_exit(state, id, commits) {
            first_error.get_or_insert((kind, Some(id)));
        }
    }

    state
        .memory
        .pop_frame()
        .map_err(|e| (ViolationKind::from(e), None))?;
    commits.push(CommitType::FrameExited { frame });

    match first_error {
        Some(err) => Err(err),
        None => Ok(Outcome::FrameExited(frame)),
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Declare a new binding in the top frame (always shadows)
pub fn declare(
    state: &mut SimState,
    name: &str,
    value: DeclValue,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    let frame = state
        .memory
        .top_frame()
        .map(|f| f.id)
        .ok_or(ViolationKind::FrameUnderflow)?;

    let (kind, slot, allocation) = match value {
        DeclValue::Uninit => (None, SlotValue::Uninit, None),
        DeclValue::Scalar { value } => (Some(ValueKind::Scalar), SlotValue::Scalar(value), None),
        DeclValue::Heap { len, capacity } => {
            let addr = state.memory.allocate(len, capacity)?;
            let capacity = state.memory.get(addr).map(|a| a.capacity).unwrap_or(capacity);
            (
                Some(ValueKind::Heap),
                SlotValue::Fat {
                    addr,
                    len,
                    capacity,
                },
                Some((addr, len, capacity)),
            )
        }
    };

    let id = state
        .bindings
        .declare(&mut state.memory, frame, name, kind, slot)?;
    commits.push(CommitType::BindingDeclared {
        binding: id,
        name: name.to_string(),
        frame,
        kind,
    });
    if let Some((address, size, capacity)) = allocation {
        commits.push(CommitType::AllocationCreated {
            address,
            size,
            capacity,
            owner: id,
        });
    }
    Ok(Outcome::Declared(id))
}

/// Make `name` the owner of a fresh allocation
pub fn allocate(
    state: &mut SimState,
    name: &str,
    size: usize,
    capacity: usize,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    let target = resolve_target(state, name)?;

    let address = state.memory.allocate(size, capacity)?;
    let capacity = state
        .memory
        .get(address)
        .map(|a| a.capacity)
        .unwrap_or(capacity);
    let owner = bind_target(
        state,
        target,
        name,
        ValueKind::Heap,
        SlotValue::Fat {
            addr: address,
            len: size,
            capacity,
        },
        commits,
    )?;
    commits.push(CommitType::AllocationCreated {
        address,
        size,
        capacity,
        owner,
    });
    Ok(Outcome::Allocated {
        binding: owner,
        address,
    })
}

// ============================================================================
// Move / copy
// ============================================================================

/// Transfer `from`'s value to `to`.
///
/// Copy-capable kinds are copied instead and `from` keeps its permissions.
pub fn move_binding(
    state: &mut SimState,
    from: BindingId,
    to: &str,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    check_access(state, from, Access::Move)?;

    let source = state.binding(from).ok_or(ViolationKind::UnknownBinding)?;
    let kind = source.kind.ok_or(ViolationKind::UseAfterMove)?;
    if kind.is_copy() {
        return copy_binding(state, from, to, commits);
    }
    let (view, held) = (source.view, source.borrow);
    let value = state.slot_value(from).ok_or(ViolationKind::UnknownBinding)?;

    let target = resolve_target(state, to)?;
    let dest = bind_target(state, target, to, kind, value, commits)?;

    // An exclusive reference takes its borrow along
    if kind == ValueKind::ExclusiveRef {
        if let Some(bid) = held {
            if let Some(record) = state.borrows.get_mut(&bid) {
                record.reference = dest;
            }
        }
        if let Some(d) = state.binding_mut(dest) {
            d.view = view;
            d.borrow = held;
        }
    }

    if let Some(src) = state.binding_mut(from) {
        src.state = BindingState::MovedFrom;
        src.perms = Permissions::none();
        src.view = None;
        src.borrow = None;
    }
    state.set_slot_value(from, SlotValue::Uninit);

    commits.push(CommitType::BindingMoved { from, to: dest });
    Ok(Outcome::Moved { from, to: dest })
}

/// Duplicate `from` into `to`; `from` keeps its permissions
pub fn copy_binding(
    state: &mut SimState,
    from: BindingId,
    to: &str,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    check_access(state, from, Access::Copy)?;

    let source = state.binding(from).ok_or(ViolationKind::UnknownBinding)?;
    let kind = source.kind.ok_or(ViolationKind::UseAfterMove)?;
    let held = source.borrow;
    let value = state.slot_value(from).ok_or(ViolationKind::UnknownBinding)?;

    let dest = match kind {
        // &mut T is not Copy
        ValueKind::ExclusiveRef => return Err(ViolationKind::ConflictingBorrow),

        ValueKind::Scalar => {
            let target = resolve_target(state, to)?;
            bind_target(state, target, to, kind, value, commits)?
        }

        ValueKind::Heap => {
            let (addr, len) = match value {
                SlotValue::Fat { addr, len, .. } => (addr, len),
                _ => return Err(ViolationKind::UnknownBinding),
            };
            let bytes = state.memory.read(addr)?.to_vec();
            let target = resolve_target(state, to)?;

            let address = state.memory.allocate(len, len)?;
            state.memory.write(address, 0, &bytes)?;
            let dest = bind_target(
                state,
                target,
                to,
                kind,
                SlotValue::Fat {
                    addr: address,
                    len,
                    capacity: len,
                },
                commits,
            )?;
            commits.push(CommitType::AllocationCreated {
                address,
                size: len,
                capacity: len,
                owner: dest,
            });
            dest
        }

        ValueKind::SharedRef => {
            let original = held.and_then(|b| state.borrows.get(&b)).cloned();
            let target = resolve_target(state, to)?;
            let dest = bind_target(state, target, to, kind, value, commits)?;

            // The copy is a borrow of its own on the same referent
            if let Some(original) = original {
                let id = state.alloc_borrow_id();
                state.borrows.insert(
                    id,
                    Borrow {
                        id,
                        kind: BorrowKind::Shared,
                        referent: original.referent,
                        reference: dest,
                        place: original.place,
                        parent: None,
                        dangling: original.dangling,
                    },
                );
                state
                    .borrow_stacks
                    .entry(original.referent)
                    .or_default()
                    .push(id);
                if let Some(d) = state.binding_mut(dest) {
                    d.view = Some(BorrowKind::Shared.view());
                    d.borrow = Some(id);
                }
                commits.push(CommitType::BorrowCreated {
                    borrow: id,
                    kind: BorrowKind::Shared,
                    referent: original.referent,
                    reference: dest,
                    parent: None,
                });
            }
            dest
        }
    };

    commits.push(CommitType::BindingCopied { from, to: dest });
    Ok(Outcome::Copied { from, to: dest })
}

// ============================================================================
// Grow
// ============================================================================

/// Reallocate the heap region owned by `id` (or by the owner an exclusive
/// reference `id` points at). The old region is freed immediately.
pub fn grow(
    state: &mut SimState,
    id: BindingId,
    new_capacity: usize,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    check_access(state, id, Access::Grow)?;

    let binding = state.binding(id).ok_or(ViolationKind::UnknownBinding)?;
    let owner = if binding.is_reference() {
        let pointee = state
            .slot_value(id)
            .and_then(|v| v.pointee())
            .ok_or(ViolationKind::UnknownBorrow)?;
        state
            .heap_owner_of(pointee)
            .ok_or(ViolationKind::UnknownBinding)?
    } else if binding.kind == Some(ValueKind::Heap) {
        id
    } else {
        return Err(ViolationKind::UnknownBinding);
    };

    let (from, len) = match state.slot_value(owner) {
        Some(SlotValue::Fat { addr, len, .. }) => (addr, len),
        _ => return Err(ViolationKind::UnknownBinding),
    };

    let to = state.memory.grow(from, new_capacity)?;
    let capacity = state
        .memory
        .get(to)
        .map(|a| a.capacity)
        .unwrap_or(new_capacity);
    state.set_slot_value(
        owner,
        SlotValue::Fat {
            addr: to,
            len,
            capacity,
        },
    );

    commits.push(CommitType::AllocationGrown { from, to, capacity });
    Ok(Outcome::Grown { from, to })
}

// ============================================================================
// Drop
// ============================================================================

/// Explicitly drop a binding.
///
/// A binding that is not live (moved-from, dropped or uninitialized) is
/// left alone and `Outcome::Skipped` returned, as is a reference that has
/// lent out its Own through a reborrow. Dropping an owner with live
/// borrows is a `ConflictingBorrow`.
pub fn drop_binding(
    state: &mut SimState,
    id: BindingId,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    let binding = state.binding(id).ok_or(ViolationKind::UnknownBinding)?;
    if !binding.state.is_live() || (binding.is_reference() && !binding.perms.own) {
        return Ok(Outcome::Skipped);
    }

    check_access(state, id, Access::Drop)?;
    let freed = release(state, id, commits)?;
    Ok(Outcome::Dropped { binding: id, freed })
}

/// Drop performed by scope exit: borrowed owners are destroyed too and
/// their outstanding borrows left dangling.
pub fn drop_on_exit(
    state: &mut SimState,
    id: BindingId,
    commits: &mut Vec<CommitType>,
) -> Result<Option<Address>, ViolationKind> {
    let live = state
        .binding(id)
        .map(|b| b.state.is_live())
        .unwrap_or(false);
    if !live {
        return Ok(None);
    }
    release(state, id, commits)
}

/// Destroy a live binding: give back the borrow it holds, leave borrows of
/// it dangling, free its allocation and mark it `Dropped`.
///
/// The binding ends up `Dropped` even if freeing fails.
pub(crate) fn release(
    state: &mut SimState,
    id: BindingId,
    commits: &mut Vec<CommitType>,
) -> Result<Option<Address>, ViolationKind> {
    let (kind, held) = match state.binding(id) {
        Some(b) => (b.kind, b.borrow),
        None => return Err(ViolationKind::UnknownBinding),
    };

    let freed = match (kind, state.slot_value(id)) {
        (Some(ValueKind::Heap), Some(SlotValue::Fat { addr, .. })) => {
            Some(state.memory.free(addr).map(|_| addr))
        }
        _ => None,
    };

    if let Some(bid) = held {
        borrow::sever(state, bid, commits);
    }
    borrow::dangle_all(state, id, commits);

    if let Some(b) = state.binding_mut(id) {
        b.state = BindingState::Dropped;
        b.perms = Permissions::none();
        b.view = None;
        b.saved = None;
        b.borrow = None;
    }
    commits.push(CommitType::BindingDropped { binding: id });

    match freed {
        Some(Ok(address)) => {
            commits.push(CommitType::AllocationFreed { address });
            Ok(Some(address))
        }
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SimState, Vec<CommitType>) {
        let mut state = SimState::new();
        let mut commits = Vec::new();
        push_frame(&mut state, &mut commits);
        (state, commits)
    }

    fn declare_heap(state: &mut SimState, name: &str, len: usize, commits: &mut Vec<CommitType>) -> BindingId {
        match declare(state, name, DeclValue::Heap { len, capacity: len }, commits) {
            Ok(Outcome::Declared(id)) => id,
            other => panic!("Expected Declared, got {:?}", other),
        }
    }

    fn heap_address(state: &SimState, id: BindingId) -> Address {
        state.slot_value(id).and_then(|v| v.heap_address()).unwrap()
    }

    #[test]
    fn test_move_heap_owner() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        let addr = heap_address(&state, x);

        let result = move_binding(&mut state, x, "y", &mut commits);
        let y = match result {
            Ok(Outcome::Moved { from, to }) => {
                assert_eq!(from, x);
                to
            }
            other => panic!("Expected Moved, got {:?}", other),
        };

        let src = state.binding(x).unwrap();
        assert_eq!(src.state, BindingState::MovedFrom);
        assert_eq!(src.perms, Permissions::none());
        assert_eq!(state.binding(y).unwrap().perms, Permissions::full());
        assert_eq!(heap_address(&state, y), addr);
    }

    #[test]
    fn test_move_after_move_is_use_after_move() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        move_binding(&mut state, x, "y", &mut commits).unwrap();

        assert_eq!(
            move_binding(&mut state, x, "z", &mut commits),
            Err(ViolationKind::UseAfterMove)
        );
    }

    #[test]
    fn test_move_scalar_copies() {
        let (mut state, mut commits) = setup();
        let x = match declare(&mut state, "x", DeclValue::Scalar { value: 7 }, &mut commits) {
            Ok(Outcome::Declared(id)) => id,
            other => panic!("Expected Declared, got {:?}", other),
        };

        let result = move_binding(&mut state, x, "y", &mut commits);
        assert!(matches!(result, Ok(Outcome::Copied { .. })));
        assert_eq!(state.binding(x).unwrap().perms, Permissions::full());
        assert_eq!(state.binding(x).unwrap().state, BindingState::Owned);
    }

    #[test]
    fn test_move_into_uninitialized_binding() {
        let (mut state, mut commits) = setup();
        let slot = match declare(&mut state, "y", DeclValue::Uninit, &mut commits) {
            Ok(Outcome::Declared(id)) => id,
            other => panic!("Expected Declared, got {:?}", other),
        };
        let x = declare_heap(&mut state, "x", 2, &mut commits);

        let result = move_binding(&mut state, x, "y", &mut commits);
        assert_eq!(result, Ok(Outcome::Moved { from: x, to: slot }));
        assert_eq!(state.binding(slot).unwrap().kind, Some(ValueKind::Heap));
        assert_eq!(state.binding(slot).unwrap().state, BindingState::Owned);
    }

    #[test]
    fn test_copy_heap_is_deep() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        let addr = heap_address(&state, x);
        state.memory.write(addr, 0, &[1, 2, 3]).unwrap();

        let y = match copy_binding(&mut state, x, "y", &mut commits) {
            Ok(Outcome::Copied { to, .. }) => to,
            other => panic!("Expected Copied, got {:?}", other),
        };

        let copy_addr = heap_address(&state, y);
        assert_ne!(copy_addr, addr);
        assert_eq!(state.memory.read(copy_addr).unwrap(), &[1, 2, 3]);
        assert_eq!(state.binding(x).unwrap().perms, Permissions::full());
    }

    #[test]
    fn test_copy_exclusive_reference_rejected() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        let r = match borrow::borrow(&mut state, x, "r", BorrowKind::Exclusive, Default::default(), &mut commits) {
            Ok(Outcome::Borrowed { reference, .. }) => reference,
            other => panic!("Expected Borrowed, got {:?}", other),
        };

        assert_eq!(
            copy_binding(&mut state, r, "r2", &mut commits),
            Err(ViolationKind::ConflictingBorrow)
        );
    }

    #[test]
    fn test_drop_frees_allocation() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        let addr = heap_address(&state, x);

        let result = drop_binding(&mut state, x, &mut commits);
        assert_eq!(
            result,
            Ok(Outcome::Dropped {
                binding: x,
                freed: Some(addr)
            })
        );
        assert!(!state.memory.is_live(addr));
        assert_eq!(state.binding(x).unwrap().state, BindingState::Dropped);

        // Second drop is a no-op
        assert_eq!(drop_binding(&mut state, x, &mut commits), Ok(Outcome::Skipped));
    }

    #[test]
    fn test_drop_through_second_owner_is_double_free() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        let addr = heap_address(&state, x);

        // Forge a second owner of the same allocation
        let frame = state.memory.top_frame().unwrap().id;
        let alias = state
            .bindings
            .declare(
                &mut state.memory,
                frame,
                "alias",
                Some(ValueKind::Heap),
                SlotValue::Fat {
                    addr,
                    len: 3,
                    capacity: 3,
                },
            )
            .unwrap();

        drop_binding(&mut state, x, &mut commits).unwrap();
        assert_eq!(
            drop_binding(&mut state, alias, &mut commits),
            Err(ViolationKind::DoubleFree)
        );
        // Rejected: the alias is untouched
        assert_eq!(state.binding(alias).unwrap().state, BindingState::Owned);
    }

    #[test]
    fn test_drop_borrowed_owner_conflicts() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        borrow::borrow(&mut state, x, "r", BorrowKind::Shared, Default::default(), &mut commits).unwrap();
        commits.clear();

        assert_eq!(
            drop_binding(&mut state, x, &mut commits),
            Err(ViolationKind::ConflictingBorrow)
        );
        assert!(commits.is_empty());
        assert!(state.memory.is_live(heap_address(&state, x)));
        assert_eq!(
            state.binding(x).unwrap().state,
            BindingState::Borrowed(BorrowKind::Shared)
        );
    }

    #[test]
    fn test_drop_exclusively_borrowed_owner_conflicts_until_end_borrow() {
        let (mut state, mut commits) = setup();
        let x = declare_heap(&mut state, "x", 3, &mut commits);
        borrow::borrow(&mut state, x, "r", BorrowKind::Exclusive, Default::default(), &mut commits).unwrap();

        assert_eq!(
            drop_binding(&mut state, x, &mut commits),
            Err(ViolationKind::ConflictingBorrow)
        );

        let r = state.lookup("r").unwrap();
        borrow::end_borrow(&mut state, r, &mut commits).unwrap();
        assert!(matches!(
            drop_binding(&mut state, x, &mut commits),
            Ok(Outcome::Dropped { .. })
        ));
    }

    #[test]
    fn test_pop_frame_drops_in_reverse_order() {
        let (mut state, mut commits) = setup();
        let a = declare_heap(&mut state, "a", 1, &mut commits);
        let b = declare_heap(&mut state, "b", 1, &mut commits);
        commits.clear();

        let result = pop_frame(&mut state, &mut commits);
        assert!(matches!(result, Ok(Outcome::FrameExited(_))));

        let dropped: Vec<BindingId> = commits
            .iter()
            .filter_map(|c| match c {
                CommitType::BindingDropped { binding } => Some(*binding),
                _ => None,
            })
            .collect();
        assert_eq!(dropped, alloc::vec![b, a]);
        assert!(state.memory.live_allocations().is_empty());
    }

    #[test]
    fn test_pop_frame_underflow() {
        let mut state = SimState::new();
        let mut commits = Vec::new();
        assert_eq!(
            pop_frame(&mut state, &mut commits),
            Err((ViolationKind::FrameUnderflow, None))
        );
    }

    #[test]
    fn test_grow_retargets_owner() {
        let (mut state, mut commits) = setup();
        let v = declare_heap(&mut state, "v", 3, &mut commits);
        let old = heap_address(&state, v);

        let result = grow(&mut state, v, 8, &mut commits);
        let new = match result {
            Ok(Outcome::Grown { from, to }) => {
                assert_eq!(from, old);
                to
            }
            other => panic!("Expected Grown, got {:?}", other),
        };

        assert!(!state.memory.is_live(old));
        assert_eq!(heap_address(&state, v), new);
        assert_eq!(state.memory.get(new).unwrap().capacity, 8);
    }

    #[test]
    fn test_grow_scalar_rejected() {
        let (mut state, mut commits) = setup();
        let x = match declare(&mut state, "x", DeclValue::Scalar { value: 1 }, &mut commits) {
            Ok(Outcome::Declared(id)) => id,
            other => panic!("Expected Declared, got {:?}", other),
        };
        assert_eq!(
            grow(&mut state, x, 8, &mut commits),
            Err(ViolationKind::UnknownBinding)
        );
    }

    #[test]
    fn test_allocate_without_frame() {
        let mut state = SimState::new();
        let mut commits = Vec::new();
        assert_eq!(
            allocate(&mut state, "v", 3, 3, &mut commits),
            Err(ViolationKind::FrameUnderflow)
        );
        assert!(state.memory.heap.is_empty());
    }
}
