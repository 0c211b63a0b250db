//! Memory model - the stack of frames and the heap of allocations
//!
//! The stack is a strict LIFO of [`Frame`]s; only the top frame can be
//! popped. The heap is a map from [`Address`] to [`Allocation`]. Freed
//! allocations stay in the map (marked `freed`) so stale addresses can be
//! told apart from addresses that never existed.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::types::{Address, Allocation, Frame, FrameId};

/// First address handed out by the heap
pub const HEAP_BASE: u64 = 0x1000;

/// Alignment of every allocation
pub const HEAP_ALIGN: u64 = 16;

/// Largest size or capacity a single allocation may request
pub const MAX_ALLOCATION: usize = 1 << 24;

/// Errors raised by the memory model itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// Pop on an empty stack, or no frame to declare into
    FrameUnderflow,
    /// Address was never allocated
    UnknownAllocation(Address),
    /// Allocation already released
    AlreadyFreed(Address),
    /// Access past the allocation's length
    OutOfBounds {
        address: Address,
        offset: usize,
        len: usize,
    },
    /// Requested size or capacity exceeds [`MAX_ALLOCATION`], or the
    /// address space is exhausted
    CapacityOverflow { requested: usize },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::FrameUnderflow => write!(f, "Frame underflow"),
            MemoryError::UnknownAllocation(a) => write!(f, "Unknown allocation at {}", a),
            MemoryError::AlreadyFreed(a) => write!(f, "Allocation at {} already freed", a),
            MemoryError::OutOfBounds {
                address,
                offset,
                len,
            } => write!(
                f,
                "Access at {}+{} past allocation length {}",
                address, offset, len
            ),
            MemoryError::CapacityOverflow { requested } => {
                write!(f, "Allocation of {} bytes exceeds heap limit", requested)
            }
        }
    }
}

/// Stack frames plus heap allocations
pub struct MemoryModel {
    /// Live frames, innermost last
    pub frames: Vec<Frame>,
    /// Every allocation ever made, freed ones included
    pub heap: BTreeMap<Address, Allocation>,
    /// Next frame ID to allocate
    pub next_frame_id: u64,
    /// Next heap address to hand out
    pub next_address: u64,
}

impl MemoryModel {
    /// Create an empty memory model (no frames, empty heap)
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            heap: BTreeMap::new(),
            next_frame_id: 1,
            next_address: HEAP_BASE,
        }
    }

    // ========================================================================
    // Stack
    // ========================================================================

    /// Push a new top frame
    pub fn push_frame(&mut self) -> FrameId {
        let id = FrameId(self.next_frame_id);
        self.next_frame_id += 1;
        self.frames.push(Frame::new(id));
        id
    }

    /// Remove the top frame.
    ///
    /// Dropping the frame's bindings is the caller's job (see
    /// `ownership::pop_frame`); this only unlinks the frame.
    pub fn pop_frame(&mut self) -> Result<Frame, MemoryError> {
        self.frames.pop().ok_or(MemoryError::FrameUnderflow)
    }

    /// Innermost live frame
    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Look up a live frame by ID
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }

    /// Look up a live frame by ID (mutable)
    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.iter_mut().find(|f| f.id == id)
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // Heap
    // ========================================================================

    /// Allocate a zero-filled region. Capacity is raised to `size` if smaller.
    pub fn allocate(&mut self, size: usize, capacity: usize) -> Result<Address, MemoryError> {
        let capacity = capacity.max(size);
        if capacity > MAX_ALLOCATION {
            return Err(MemoryError::CapacityOverflow {
                requested: capacity,
            });
        }
        let span = (capacity.max(1) as u64).div_ceil(HEAP_ALIGN) * HEAP_ALIGN;
        let next = self
            .next_address
            .checked_add(span)
            .ok_or(MemoryError::CapacityOverflow {
                requested: capacity,
            })?;
        let address = Address(self.next_address);
        self.next_address = next;

        self.heap.insert(
            address,
            Allocation {
                address,
                size,
                capacity,
                contents: vec![0u8; size],
                freed: false,
            },
        );
        Ok(address)
    }

    /// Reallocate into a bigger region, copying the contents and freeing
    /// the old region immediately.
    pub fn grow(&mut self, address: Address, new_capacity: usize) -> Result<Address, MemoryError> {
        let (size, contents) = {
            let old = self.live(address)?;
            (old.size, old.contents.clone())
        };

        let new_address = self.allocate(size, new_capacity)?;
        if let Some(new) = self.heap.get_mut(&new_address) {
            new.contents = contents;
        }
        if let Some(old) = self.heap.get_mut(&address) {
            old.freed = true;
        }
        Ok(new_address)
    }

    /// Release an allocation. Releasing twice is a double free.
    pub fn free(&mut self, address: Address) -> Result<(), MemoryError> {
        let alloc = self
            .heap
            .get_mut(&address)
            .ok_or(MemoryError::UnknownAllocation(address))?;
        if alloc.freed {
            return Err(MemoryError::AlreadyFreed(address));
        }
        alloc.freed = true;
        Ok(())
    }

    /// Read the bytes of a live allocation
    pub fn read(&self, address: Address) -> Result<&[u8], MemoryError> {
        self.live(address).map(|a| a.contents.as_slice())
    }

    /// Write bytes into a live allocation
    pub fn write(&mut self, address: Address, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        let alloc = self
            .heap
            .get_mut(&address)
            .ok_or(MemoryError::UnknownAllocation(address))?;
        if alloc.freed {
            return Err(MemoryError::AlreadyFreed(address));
        }
        let end = offset.checked_add(bytes.len()).unwrap_or(usize::MAX);
        if end > alloc.size {
            return Err(MemoryError::OutOfBounds {
                address,
                offset,
                len: alloc.size,
            });
        }
        alloc.contents[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Get an allocation (freed or not)
    pub fn get(&self, address: Address) -> Option<&Allocation> {
        self.heap.get(&address)
    }

    /// Whether an address refers to a live allocation
    pub fn is_live(&self, address: Address) -> bool {
        self.heap.get(&address).map(|a| !a.freed).unwrap_or(false)
    }

    /// All allocations not yet freed
    pub fn live_allocations(&self) -> Vec<&Allocation> {
        self.heap.values().filter(|a| !a.freed).collect()
    }

    fn live(&self, address: Address) -> Result<&Allocation, MemoryError> {
        let alloc = self
            .heap
            .get(&address)
            .ok_or(MemoryError::UnknownAllocation(address))?;
        if alloc.freed {
            return Err(MemoryError::AlreadyFreed(address));
        }
        Ok(alloc)
    }
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_frames_lifo() {
        let mut mem = MemoryModel::new();
        let f1 = mem.push_frame();
        let f2 = mem.push_frame();

        assert_eq!(mem.depth(), 2);
        assert_eq!(mem.top_frame().unwrap().id, f2);

        assert_eq!(mem.pop_frame().unwrap().id, f2);
        assert_eq!(mem.pop_frame().unwrap().id, f1);
        assert_eq!(mem.pop_frame().unwrap_err(), MemoryError::FrameUnderflow);
    }

    #[test]
    fn test_frame_ids_are_never_reused() {
        let mut mem = MemoryModel::new();
        let f1 = mem.push_frame();
        mem.pop_frame().unwrap();
        let f2 = mem.push_frame();
        assert_ne!(f1, f2);
    }

    #[test]
    fn test_allocate_unique_addresses() {
        let mut mem = MemoryModel::new();
        let a = mem.allocate(3, 3).unwrap();
        let b = mem.allocate(100, 128).unwrap();
        let c = mem.allocate(0, 0).unwrap();
        let d = mem.allocate(1, 1).unwrap();

        assert_eq!(a, Address(HEAP_BASE));
        assert!(a != b && b != c && c != d && a != d);
        assert_eq!(mem.live_allocations().len(), 4);
    }

    #[test]
    fn test_allocate_capacity_at_least_size() {
        let mut mem = MemoryModel::new();
        let a = mem.allocate(10, 4).unwrap();
        let alloc = mem.get(a).unwrap();
        assert_eq!(alloc.size, 10);
        assert_eq!(alloc.capacity, 10);
        assert_eq!(alloc.contents.len(), 10);
    }

    #[test]
    fn test_grow_copies_contents_and_frees_old() {
        let mut mem = MemoryModel::new();
        let old = mem.allocate(3, 3).unwrap();
        mem.write(old, 0, &[1, 2, 3]).unwrap();

        let new = mem.grow(old, 8).unwrap();

        assert_ne!(old, new);
        assert!(mem.get(old).unwrap().freed);
        let grown = mem.get(new).unwrap();
        assert!(!grown.freed);
        assert_eq!(grown.capacity, 8);
        assert_eq!(grown.size, 3);
        assert_eq!(mem.read(new).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_allocate_oversized_capacity_is_rejected() {
        let mut mem = MemoryModel::new();
        assert_eq!(
            mem.allocate(0, usize::MAX),
            Err(MemoryError::CapacityOverflow {
                requested: usize::MAX
            })
        );
        assert_eq!(
            mem.allocate(MAX_ALLOCATION + 1, 0),
            Err(MemoryError::CapacityOverflow {
                requested: MAX_ALLOCATION + 1
            })
        );
        assert!(mem.live_allocations().is_empty());
        assert_eq!(mem.next_address, HEAP_BASE);
    }

    #[test]
    fn test_allocate_exhausted_address_space() {
        let mut mem = MemoryModel::new();
        mem.next_address = u64::MAX - 8;
        assert!(matches!(
            mem.allocate(4, 4),
            Err(MemoryError::CapacityOverflow { requested: 4 })
        ));
        assert_eq!(mem.next_address, u64::MAX - 8);
    }

    #[test]
    fn test_grow_oversized_keeps_old_allocation() {
        let mut mem = MemoryModel::new();
        let old = mem.allocate(3, 3).unwrap();
        assert!(matches!(
            mem.grow(old, usize::MAX - 8),
            Err(MemoryError::CapacityOverflow { .. })
        ));
        assert!(!mem.get(old).unwrap().freed);
    }

    #[test]
    fn test_grow_freed_allocation_fails() {
        let mut mem = MemoryModel::new();
        let old = mem.allocate(3, 3).unwrap();
        mem.free(old).unwrap();
        assert_eq!(mem.grow(old, 8), Err(MemoryError::AlreadyFreed(old)));
    }

    #[test]
    fn test_double_free_detected() {
        let mut mem = MemoryModel::new();
        let a = mem.allocate(4, 4).unwrap();
        assert!(mem.free(a).is_ok());
        assert_eq!(mem.free(a), Err(MemoryError::AlreadyFreed(a)));
    }

    #[test]
    fn test_free_unknown_address() {
        let mut mem = MemoryModel::new();
        assert_eq!(
            mem.free(Address(0xdead)),
            Err(MemoryError::UnknownAllocation(Address(0xdead)))
        );
    }

    #[test]
    fn test_read_write_after_free() {
        let mut mem = MemoryModel::new();
        let a = mem.allocate(2, 2).unwrap();
        mem.free(a).unwrap();
        assert_eq!(mem.read(a), Err(MemoryError::AlreadyFreed(a)));
        assert_eq!(mem.write(a, 0, &[9]), Err(MemoryError::AlreadyFreed(a)));
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut mem = MemoryModel::new();
        let a = mem.allocate(2, 8).unwrap();
        assert!(matches!(
            mem.write(a, 1, &[1, 2]),
            Err(MemoryError::OutOfBounds { len: 2, .. })
        ));
    }
}
