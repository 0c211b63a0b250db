//! Simulator state - pure data structure holding all simulator state
//!
//! This module contains the SimState struct which holds all mutable
//! simulator state. It has NO host dependency - logging and timing are in
//! the runtime wrapper (`ownsim`).

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::bindings::BindingTable;
use crate::detector::ViolationKind;
use crate::memory::MemoryModel;
use crate::types::{
    Binding, BindingId, BindingState, Borrow, BorrowId, BorrowKind, Pointee, SlotValue, ValueKind,
};

/// The pure simulator state - no host, no I/O, no side effects.
///
/// All state transformations are done via the `step` function.
pub struct SimState {
    /// Stack frames and heap
    pub memory: MemoryModel,
    /// Every binding declared so far
    pub bindings: BindingTable,
    /// Live borrows, indexed by ID
    pub borrows: BTreeMap<BorrowId, Borrow>,
    /// Stack of live borrows per referent, oldest first
    pub borrow_stacks: BTreeMap<BindingId, Vec<BorrowId>>,
    /// Next borrow ID to allocate
    pub next_borrow_id: u64,
    /// Number of operations stepped so far
    pub op_count: u64,
    /// Timestamp of the most recent operation
    pub last_op_ns: u64,
}

impl SimState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self {
            memory: MemoryModel::new(),
            bindings: BindingTable::new(),
            borrows: BTreeMap::new(),
            borrow_stacks: BTreeMap::new(),
            next_borrow_id: 1,
            op_count: 0,
            last_op_ns: 0,
        }
    }

    /// Generate next borrow ID
    pub fn alloc_borrow_id(&mut self) -> BorrowId {
        let id = BorrowId(self.next_borrow_id);
        self.next_borrow_id += 1;
        id
    }

    /// Update per-run operation metrics
    pub fn update_op_metrics(&mut self, timestamp: u64) {
        self.op_count += 1;
        self.last_op_ns = timestamp;
    }

    // ========================================================================
    // Read-only accessors
    // ========================================================================

    /// Resolve a name against the live frames
    pub fn lookup(&self, name: &str) -> Result<BindingId, ViolationKind> {
        self.bindings
            .lookup(&self.memory, name)
            .ok_or(ViolationKind::UnknownBinding)
    }

    /// Get a binding
    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id)
    }

    /// Get a mutable binding
    pub fn binding_mut(&mut self, id: BindingId) -> Option<&mut Binding> {
        self.bindings.get_mut(id)
    }

    /// Current slot bits of a binding (None once its frame is gone)
    pub fn slot_value(&self, id: BindingId) -> Option<SlotValue> {
        let frame = self.bindings.get(id)?.frame;
        self.memory.frame(frame)?.slot(id).map(|s| s.value)
    }

    /// Overwrite the slot bits of a binding in a live frame
    pub fn set_slot_value(&mut self, id: BindingId, value: SlotValue) {
        let Some(frame) = self.bindings.get(id).map(|b| b.frame) else {
            return;
        };
        if let Some(slot) = self.memory.frame_mut(frame).and_then(|f| f.slot_mut(id)) {
            slot.value = value;
        }
    }

    /// Live borrows whose referent is `id`, oldest first
    pub fn borrows_on(&self, id: BindingId) -> &[BorrowId] {
        self.borrow_stacks
            .get(&id)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    /// Whether any borrow on `id` is live
    pub fn has_live_borrows(&self, id: BindingId) -> bool {
        !self.borrows_on(id).is_empty()
    }

    /// Whether an exclusive borrow on `id` is live
    pub fn has_live_exclusive(&self, id: BindingId) -> bool {
        self.borrows_on(id).iter().any(|b| {
            self.borrows
                .get(b)
                .map(|b| b.kind == BorrowKind::Exclusive)
                .unwrap_or(false)
        })
    }

    /// Whether a borrow has been reborrowed from (its holder is suspended)
    pub fn is_suspended(&self, id: BorrowId) -> bool {
        self.borrows.values().any(|b| b.parent == Some(id))
    }

    /// Whether the memory a pointer designates still exists
    pub fn pointee_alive(&self, pointee: Pointee) -> bool {
        match pointee {
            Pointee::Slot(b) => self
                .bindings
                .get(b)
                .map(|b| b.state.is_live())
                .unwrap_or(false),
            Pointee::Heap(addr) => self.memory.is_live(addr),
        }
    }

    /// Heap owner ultimately designated by a reference pointee, if any
    pub fn heap_owner_of(&self, pointee: Pointee) -> Option<BindingId> {
        match pointee {
            Pointee::Slot(b) => {
                let binding = self.bindings.get(b)?;
                (binding.kind == Some(ValueKind::Heap)).then_some(b)
            }
            Pointee::Heap(_) => None,
        }
    }

    /// Live bindings in the order they would be dropped (innermost frame
    /// first, reverse declaration order)
    pub fn live_bindings(&self) -> Vec<BindingId> {
        self.memory
            .frames
            .iter()
            .rev()
            .flat_map(|f| f.slots.iter().rev().map(|s| s.binding))
            .filter(|id| {
                self.bindings
                    .get(*id)
                    .map(|b| b.state.is_live())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Name of a binding, for diagnostics
    pub fn name_of(&self, id: BindingId) -> Option<&str> {
        self.bindings.get(id).map(|b| b.name.as_str())
    }

    /// Current lifecycle state of a binding
    pub fn state_of(&self, id: BindingId) -> Option<BindingState> {
        self.bindings.get(id).map(|b| b.state)
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}
