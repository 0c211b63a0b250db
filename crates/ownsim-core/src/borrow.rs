//! Borrow engine - shared/exclusive borrows, reborrows and their retirement
//!
//! Borrows live in an arena (`SimState::borrows`) indexed by [`BorrowId`],
//! with an explicit stack of live ids per referent. A reborrow records its
//! parent borrow instead of pointing at the parent reference, so chains of
//! reborrows never form cycles between bindings.
//!
//! # Permission deltas
//!
//! | operation        | owner       | reference | referent view |
//! |------------------|-------------|-----------|---------------|
//! | shared borrow    | keeps R     | R,O       | R             |
//! | exclusive borrow | loses all   | R,O       | R,W           |
//! | reborrow         | untouched   | R,O       | R,W           |
//!
//! A reborrow suspends the parent reference (no permissions, empty view)
//! until the reborrow ends.

use alloc::vec::Vec;

use crate::detector::{check_access, Access, ViolationKind};
use crate::ownership::{bind_target, resolve_target};
use crate::state::SimState;
use crate::step::{CommitType, Outcome};
use crate::types::{
    BindingId, BindingState, Borrow, BorrowId, BorrowKind, Permissions, Place, Pointee,
    SavedPermissions, SlotValue, ValueKind,
};

/// Borrow `owner` into a new reference named `reference`
pub fn borrow(
    state: &mut SimState,
    owner: BindingId,
    reference: &str,
    kind: BorrowKind,
    place: Place,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    let access = match kind {
        BorrowKind::Shared => Access::BorrowShared,
        BorrowKind::Exclusive => Access::BorrowExclusive,
    };
    check_access(state, owner, access)?;

    let pointee = match place {
        Place::Whole => Pointee::Slot(owner),
        Place::Contents => state
            .slot_value(owner)
            .and_then(|v| v.heap_address())
            .map(Pointee::Heap)
            .unwrap_or(Pointee::Slot(owner)),
    };

    let target = resolve_target(state, reference)?;
    let holder = bind_target(
        state,
        target,
        reference,
        kind.reference_kind(),
        SlotValue::Thin(pointee),
        commits,
    )?;

    suspend(state, owner, kind);

    let id = state.alloc_borrow_id();
    state.borrows.insert(
        id,
        Borrow {
            id,
            kind,
            referent: owner,
            reference: holder,
            place,
            parent: None,
            dangling: false,
        },
    );
    state.borrow_stacks.entry(owner).or_default().push(id);
    if let Some(r) = state.binding_mut(holder) {
        r.view = Some(kind.view());
        r.borrow = Some(id);
    }

    commits.push(CommitType::BorrowCreated {
        borrow: id,
        kind,
        referent: owner,
        reference: holder,
        parent: None,
    });
    Ok(Outcome::Borrowed {
        borrow: id,
        reference: holder,
    })
}

/// Reborrow through the exclusive reference `reference` into `to`
pub fn reborrow(
    state: &mut SimState,
    reference: BindingId,
    to: &str,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    check_access(state, reference, Access::Reborrow)?;

    let parent = state
        .binding(reference)
        .and_then(|r| r.borrow)
        .and_then(|b| state.borrows.get(&b))
        .cloned()
        .ok_or(ViolationKind::UnknownBorrow)?;
    if !parent.kind.is_exclusive() {
        return Err(ViolationKind::ConflictingBorrow);
    }
    let pointee = state
        .slot_value(reference)
        .and_then(|v| v.pointee())
        .ok_or(ViolationKind::UnknownBorrow)?;

    let target = resolve_target(state, to)?;
    let holder = bind_target(
        state,
        target,
        to,
        ValueKind::ExclusiveRef,
        SlotValue::Thin(pointee),
        commits,
    )?;

    // Parent reference is unusable until the reborrow ends
    if let Some(r) = state.binding_mut(reference) {
        if r.saved.is_none() {
            r.saved = Some(SavedPermissions {
                perms: r.perms,
                view: r.view,
            });
        }
        r.perms = Permissions::none();
        r.view = Some(Permissions::none());
        r.state = BindingState::Borrowed(BorrowKind::Exclusive);
    }

    let id = state.alloc_borrow_id();
    state.borrows.insert(
        id,
        Borrow {
            id,
            kind: BorrowKind::Exclusive,
            referent: parent.referent,
            reference: holder,
            place: parent.place,
            parent: Some(parent.id),
            dangling: false,
        },
    );
    state
        .borrow_stacks
        .entry(parent.referent)
        .or_default()
        .push(id);
    if let Some(r) = state.binding_mut(holder) {
        r.view = Some(BorrowKind::Exclusive.view());
        r.borrow = Some(id);
    }

    commits.push(CommitType::BorrowCreated {
        borrow: id,
        kind: BorrowKind::Exclusive,
        referent: parent.referent,
        reference: holder,
        parent: Some(parent.id),
    });
    Ok(Outcome::Borrowed {
        borrow: id,
        reference: holder,
    })
}

/// End the borrow held by `reference`
pub fn end_borrow(
    state: &mut SimState,
    reference: BindingId,
    commits: &mut Vec<CommitType>,
) -> Result<Outcome, ViolationKind> {
    let binding = state
        .binding(reference)
        .ok_or(ViolationKind::UnknownBinding)?;
    let id = binding
        .borrow
        .filter(|b| state.borrows.contains_key(b))
        .ok_or(ViolationKind::UnknownBorrow)?;

    retire(state, id, commits);
    Ok(Outcome::BorrowEnded(id))
}

/// Retire a borrow and every reborrow derived from it.
///
/// The reference loses its view (it keeps its permissions over the pointer
/// itself). When a reborrow ends its parent reference is restored; when the
/// last borrow on a referent ends the referent is restored.
pub(crate) fn retire(state: &mut SimState, id: BorrowId, commits: &mut Vec<CommitType>) {
    let children: Vec<BorrowId> = state
        .borrows
        .values()
        .filter(|b| b.parent == Some(id))
        .map(|b| b.id)
        .collect();
    for child in children {
        retire(state, child, commits);
    }

    let Some(record) = state.borrows.remove(&id) else {
        return;
    };
    if let Some(stack) = state.borrow_stacks.get_mut(&record.referent) {
        stack.retain(|b| *b != id);
        if stack.is_empty() {
            state.borrow_stacks.remove(&record.referent);
        }
    }

    if let Some(r) = state.binding_mut(record.reference) {
        if r.borrow == Some(id) {
            r.borrow = None;
            r.view = None;
        }
    }

    match record.parent {
        Some(parent) => {
            if let Some(holder) = state.borrows.get(&parent).map(|b| b.reference) {
                restore(state, holder);
            }
        }
        None => {
            if !state.has_live_borrows(record.referent) {
                restore(state, record.referent);
            }
        }
    }

    commits.push(CommitType::BorrowEnded { borrow: id });
}

/// Retire a borrow whose holder is being destroyed. References reborrowed
/// from it lose their borrow too and are marked `severed`, so a later use
/// through them reports a dangling reference.
pub(crate) fn sever(state: &mut SimState, id: BorrowId, commits: &mut Vec<CommitType>) {
    let mut pending = alloc::vec![id];
    while let Some(parent) = pending.pop() {
        let children: Vec<(BorrowId, BindingId)> = state
            .borrows
            .values()
            .filter(|b| b.parent == Some(parent))
            .map(|b| (b.id, b.reference))
            .collect();
        for (child, reference) in children {
            if let Some(r) = state.binding_mut(reference) {
                r.severed = true;
            }
            pending.push(child);
        }
    }
    retire(state, id, commits);
}

/// Mark every live borrow of `referent` dangling (its referent is going away)
pub(crate) fn dangle_all(state: &mut SimState, referent: BindingId, commits: &mut Vec<CommitType>) {
    let ids: Vec<BorrowId> = state.borrows_on(referent).to_vec();
    for id in ids {
        if let Some(b) = state.borrows.get_mut(&id) {
            if !b.dangling {
                b.dangling = true;
                commits.push(CommitType::BorrowDangling { borrow: id });
            }
        }
    }
}

/// Lend permissions out of `owner`, saving them on the first borrow
fn suspend(state: &mut SimState, owner: BindingId, kind: BorrowKind) {
    let Some(b) = state.binding_mut(owner) else {
        return;
    };
    if b.saved.is_none() {
        b.saved = Some(SavedPermissions {
            perms: b.perms,
            view: b.view,
        });
    }
    match kind {
        BorrowKind::Shared => {
            b.perms = Permissions::read_only();
            b.view = b.view.map(|v| Permissions {
                read: v.read,
                write: false,
                own: false,
            });
        }
        BorrowKind::Exclusive => {
            b.perms = Permissions::none();
            b.view = b.view.map(|_| Permissions::none());
        }
    }
    b.state = BindingState::Borrowed(kind);
}

/// Put back the permissions saved before the first borrow
fn restore(state: &mut SimState, id: BindingId) {
    let Some(b) = state.binding_mut(id) else {
        return;
    };
    let saved = b.saved.take();
    if !b.state.is_live() {
        return;
    }
    if let Some(saved) = saved {
        b.perms = saved.perms;
        b.view = saved.view;
    }
    b.state = BindingState::Owned;
}
