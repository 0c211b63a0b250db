//! Binding table
//!
//! Maps binding IDs to [`Binding`] records and resolves source names with
//! lexical shadowing: the innermost live frame wins, and within a frame the
//! latest declaration wins. Bindings outlive their frames in the table so
//! diagnostics can still name them, but only bindings of live frames are
//! visible to `lookup`.

use alloc::collections::BTreeMap;
use alloc::string::ToString;

use crate::memory::{MemoryError, MemoryModel};
use crate::types::{
    Binding, BindingId, BindingState, FrameId, Permissions, SlotValue, StackSlot, ValueKind,
};

/// Arena of every binding declared during a run
pub struct BindingTable {
    /// Binding records
    pub bindings: BTreeMap<BindingId, Binding>,
    /// Next binding ID to allocate
    pub next_id: u64,
}

impl BindingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Generate next binding ID
    pub fn alloc_id(&mut self) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Declare a binding in `frame`, placing its slot at the end of the frame.
    ///
    /// A binding that holds a value directly starts with full (R,W,O); a
    /// reference starts with (R,O) over the pointer (its referent view is
    /// installed by the borrow engine); an uninitialized one has nothing.
    pub fn declare(
        &mut self,
        memory: &mut MemoryModel,
        frame: FrameId,
        name: &str,
        kind: Option<ValueKind>,
        value: SlotValue,
    ) -> Result<BindingId, MemoryError> {
        if memory.frame(frame).is_none() {
            return Err(MemoryError::FrameUnderflow);
        }

        let id = self.alloc_id();
        let (state, perms) = match kind {
            None => (BindingState::Uninitialized, Permissions::none()),
            Some(k) if k.is_reference() => (BindingState::Owned, Permissions::pointer()),
            Some(_) => (BindingState::Owned, Permissions::full()),
        };

        if let Some(f) = memory.frame_mut(frame) {
            f.slots.push(StackSlot { binding: id, value });
        }

        self.bindings.insert(
            id,
            Binding {
                id,
                name: name.to_string(),
                frame,
                kind,
                state,
                perms,
                view: None,
                saved: None,
                borrow: None,
                severed: false,
            },
        );
        Ok(id)
    }

    /// Resolve a name, innermost live frame first
    pub fn lookup(&self, memory: &MemoryModel, name: &str) -> Option<BindingId> {
        memory.frames.iter().rev().find_map(|frame| {
            frame
                .slots
                .iter()
                .rev()
                .map(|slot| slot.binding)
                .find(|id| self.bindings.get(id).map(|b| b.name == name).unwrap_or(false))
        })
    }

    /// Get a binding
    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    /// Get a mutable binding
    pub fn get_mut(&mut self, id: BindingId) -> Option<&mut Binding> {
        self.bindings.get_mut(&id)
    }

    /// Number of bindings ever declared
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}
