//! Core simulator types
//!
//! This module contains the fundamental types used throughout the core.
//! All types here are pure data - no behavior that depends on the host.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Binding identifier (unique per run, never reused)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindingId(pub u64);

/// Stack frame identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// Borrow record identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BorrowId(pub u64);

/// Heap address of an allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ============================================================================
// Permissions
// ============================================================================

/// Access permissions held by a binding
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permissions {
    /// Can read the value
    pub read: bool,
    /// Can mutate the value
    pub write: bool,
    /// Can move or destroy the value
    pub own: bool,
}

impl Permissions {
    /// Full permissions (read, write, own)
    pub fn full() -> Self {
        Self {
            read: true,
            write: true,
            own: true,
        }
    }

    /// Read-only permission
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            own: false,
        }
    }

    /// Read and write, no ownership (exclusive referent view)
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            own: false,
        }
    }

    /// What a reference holds over the pointer itself
    pub fn pointer() -> Self {
        Self {
            read: true,
            write: false,
            own: true,
        }
    }

    /// No permissions at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Check if this permission set is a subset of another
    pub fn is_subset_of(&self, other: &Self) -> bool {
        (!self.read || other.read) && (!self.write || other.write) && (!self.own || other.own)
    }

    /// Check if this permission set covers everything `required` asks for
    pub fn satisfies(&self, required: &Self) -> bool {
        required.is_subset_of(self)
    }

    /// Whether any permission is present
    pub fn is_empty(&self) -> bool {
        !self.read && !self.write && !self.own
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.read { 'R' } else { '-' };
        let w = if self.write { 'W' } else { '-' };
        let o = if self.own { 'O' } else { '-' };
        write!(f, "{}{}{}", r, w, o)
    }
}

/// Permissions stashed while a binding is borrowed, restored on borrow end
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPermissions {
    /// The binding's own triple
    pub perms: Permissions,
    /// The referent view, for references
    pub view: Option<Permissions>,
}

// ============================================================================
// Values and slots
// ============================================================================

/// What kind of value a binding holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Plain scalar (`Copy`)
    Scalar,
    /// Owner of a heap allocation (Box/Vec/String)
    Heap,
    /// Shared reference `&T` (`Copy`)
    SharedRef,
    /// Exclusive reference `&mut T`
    ExclusiveRef,
}

impl ValueKind {
    /// Whether a move of this kind duplicates the bits instead of transferring
    pub fn is_copy(self) -> bool {
        matches!(self, ValueKind::Scalar | ValueKind::SharedRef)
    }

    /// Whether this is a reference
    pub fn is_reference(self) -> bool {
        matches!(self, ValueKind::SharedRef | ValueKind::ExclusiveRef)
    }
}

/// Kind of borrow: shared or exclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorrowKind {
    /// Shared/immutable borrow (`&T`)
    Shared,
    /// Exclusive/mutable borrow (`&mut T`)
    Exclusive,
}

impl BorrowKind {
    /// Check if this is an exclusive borrow
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive)
    }

    /// Check if two borrow kinds conflict
    pub const fn conflicts_with(self, other: Self) -> bool {
        matches!((self, other), (Self::Exclusive, _) | (_, Self::Exclusive))
    }

    /// Kind of the reference binding this borrow produces
    pub fn reference_kind(self) -> ValueKind {
        match self {
            Self::Shared => ValueKind::SharedRef,
            Self::Exclusive => ValueKind::ExclusiveRef,
        }
    }

    /// Referent view handed to the reference
    pub fn view(self) -> Permissions {
        match self {
            Self::Shared => Permissions::read_only(),
            Self::Exclusive => Permissions::read_write(),
        }
    }
}

/// Which part of the owner a borrow designates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Place {
    /// The owner's stack slot (`&v`)
    #[default]
    Whole,
    /// The owner's heap contents (`&v[..]`)
    Contents,
}

/// Where a reference points
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pointee {
    /// Another binding's stack slot
    Slot(BindingId),
    /// A heap location
    Heap(Address),
}

/// Contents of a stack slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotValue {
    /// Declared but not yet assigned
    Uninit,
    /// Scalar bits
    Scalar(u64),
    /// Thin pointer (address only)
    Thin(Pointee),
    /// Fat pointer (address + length metadata) to a growable allocation
    Fat {
        addr: Address,
        len: usize,
        capacity: usize,
    },
}

impl SlotValue {
    /// Heap address this slot refers to, if any
    pub fn heap_address(&self) -> Option<Address> {
        match self {
            SlotValue::Fat { addr, .. } => Some(*addr),
            SlotValue::Thin(Pointee::Heap(addr)) => Some(*addr),
            _ => None,
        }
    }

    /// Pointee of a reference slot
    pub fn pointee(&self) -> Option<Pointee> {
        match self {
            SlotValue::Thin(p) => Some(*p),
            _ => None,
        }
    }
}

/// A fixed-size stack cell
#[derive(Clone, Debug)]
pub struct StackSlot {
    /// Binding that lives in this slot
    pub binding: BindingId,
    /// Current bits
    pub value: SlotValue,
}

/// A stack frame: an ordered collection of slots
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame ID
    pub id: FrameId,
    /// Slots in declaration order
    pub slots: Vec<StackSlot>,
}

impl Frame {
    /// Create an empty frame
    pub fn new(id: FrameId) -> Self {
        Self {
            id,
            slots: Vec::new(),
        }
    }

    /// Slot of a binding declared in this frame
    pub fn slot(&self, binding: BindingId) -> Option<&StackSlot> {
        self.slots.iter().find(|s| s.binding == binding)
    }

    /// Mutable slot of a binding declared in this frame
    pub fn slot_mut(&mut self, binding: BindingId) -> Option<&mut StackSlot> {
        self.slots.iter_mut().find(|s| s.binding == binding)
    }
}

/// Heap-resident byte region
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Unique address
    pub address: Address,
    /// Length in bytes
    pub size: usize,
    /// Reserved capacity (>= size)
    pub capacity: usize,
    /// Bytes (len == size)
    pub contents: Vec<u8>,
    /// Whether the region has been released
    pub freed: bool,
}

// ============================================================================
// Bindings and borrows
// ============================================================================

/// Lifecycle state of a binding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingState {
    /// Declared, no value yet
    Uninitialized,
    /// Holds its value with its own permissions
    Owned,
    /// Permissions lent out to a live borrow
    Borrowed(BorrowKind),
    /// Value moved away (terminal)
    MovedFrom,
    /// Value destroyed (terminal)
    Dropped,
}

impl BindingState {
    /// Whether the binding still holds a value
    pub fn is_live(self) -> bool {
        matches!(self, BindingState::Owned | BindingState::Borrowed(_))
    }
}

/// A named entity tied to a stack slot
#[derive(Clone, Debug)]
pub struct Binding {
    /// Binding ID
    pub id: BindingId,
    /// Source name
    pub name: String,
    /// Frame the slot lives in
    pub frame: FrameId,
    /// Value kind (None while uninitialized)
    pub kind: Option<ValueKind>,
    /// Lifecycle state
    pub state: BindingState,
    /// Permissions over the binding itself
    pub perms: Permissions,
    /// Permissions over the referent, for references
    pub view: Option<Permissions>,
    /// Pre-borrow permissions, present while borrowed
    pub saved: Option<SavedPermissions>,
    /// Borrow this reference holds
    pub borrow: Option<BorrowId>,
    /// Borrow was retired because the reference it was reborrowed from
    /// went out of scope
    pub severed: bool,
}

impl Binding {
    /// Whether this binding owns a heap allocation
    pub fn is_heap_owner(&self) -> bool {
        self.kind == Some(ValueKind::Heap) && self.state.is_live()
    }

    /// Whether this binding is a reference
    pub fn is_reference(&self) -> bool {
        self.kind.map(ValueKind::is_reference).unwrap_or(false)
    }
}

/// A live borrow relationship
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Borrow {
    /// Borrow ID
    pub id: BorrowId,
    /// Shared or exclusive
    pub kind: BorrowKind,
    /// Binding whose data is designated
    pub referent: BindingId,
    /// Reference binding holding the borrow
    pub reference: BindingId,
    /// Whole binding or heap contents
    pub place: Place,
    /// Borrow this one was reborrowed from
    pub parent: Option<BorrowId>,
    /// Referent was dropped while this borrow was live
    pub dangling: bool,
}
