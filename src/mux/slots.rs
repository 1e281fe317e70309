//! Bounded per-worker request slot table.
//!
//! # Responsibilities
//! - Track every in-flight request on one worker, O(1) allocate/release
//! - Derive globally unique request ids with no cross-worker coordination
//!
//! # Design Decisions
//! - Fixed arena of `capacity` slots, free list as an index stack
//! - Capacity is a power of two so id → index is a mask, not a divide
//! - Single-writer: one worker owns the table, so no internal locking
//!
//! Worker `w` with capacity `C` owns ids `[1 + C*w, 1 + C*(w+1))`; ranges of
//! distinct workers never overlap, so an id identifies a request fleet-wide.

use std::fmt;

use crate::error::{GatewayError, GatewayResult};
use crate::mux::chunk::Chunk;
use crate::mux::matrix::LocationId;

/// Globally unique request id. FastCGI request ids are 16-bit on the wire,
/// so the whole fleet's id space must fit in `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u16);

impl SlotId {
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Lifecycle state of a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// In the free set.
    #[default]
    Free,
    /// Allocated to a request, bound to a location.
    Assigned,
    /// Body bytes are flowing through borrowed chunks.
    Streaming,
    /// Response complete; awaiting release.
    Ended,
}

/// One in-flight request record.
#[derive(Debug, Default)]
pub struct RequestSlot {
    state: SlotState,
    location: Option<LocationId>,
    chunks: Vec<Chunk>,
}

impl RequestSlot {
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    /// The location whose connection this request borrows.
    pub fn location(&self) -> Option<LocationId> {
        self.location
    }

    pub fn bind_location(&mut self, location: LocationId) {
        self.location = Some(location);
    }

    /// Move a borrowed chunk into the slot, returning a handle to it.
    pub fn push_chunk(&mut self, chunk: Chunk) -> &mut Chunk {
        let idx = self.chunks.len();
        self.chunks.push(chunk);
        &mut self.chunks[idx]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Bounded table of request slots for a single worker.
#[derive(Debug)]
pub struct RequestSlotTable {
    /// First id of this worker's range.
    offset: u16,
    /// `capacity - 1`; valid because capacity is a power of two.
    mask: u16,
    slots: Vec<RequestSlot>,
    /// Stack of free local indexes; top is the next id handed out.
    free: Vec<u16>,
}

impl RequestSlotTable {
    /// Build a table covering ids `[offset, offset + capacity)`.
    ///
    /// `capacity` must be a power of two below 65536; the registry
    /// guarantees this before construction.
    pub fn new(offset: u16, capacity: u16) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, RequestSlot::default);
        Self {
            offset,
            mask: capacity - 1,
            slots,
            // Reversed so the lowest id is allocated first.
            free: (0..capacity).rev().collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// First id of this worker's range.
    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Take a free slot, O(1). Fails when all `capacity` slots are in use;
    /// the caller must reject or defer the request, not block.
    pub fn allocate(&mut self) -> GatewayResult<SlotId> {
        let index = self.free.pop().ok_or(GatewayError::Exhausted {
            resource: "request slots",
        })?;
        self.slots[index as usize].state = SlotState::Assigned;
        Ok(SlotId(self.offset + index))
    }

    /// Return a slot to the free set, O(1), handing back any chunks it
    /// borrowed so the caller can return them to the pool.
    ///
    /// Releasing an already-free slot is a caller precondition violation:
    /// checked in debug builds, undefined behavior of the id space in
    /// release builds.
    pub fn release(&mut self, id: SlotId) -> Vec<Chunk> {
        let index = self.index_of(id);
        let slot = &mut self.slots[index];
        debug_assert!(
            slot.state != SlotState::Free,
            "released an already-free slot {}",
            id
        );
        slot.state = SlotState::Free;
        slot.location = None;
        self.free.push(index as u16);
        std::mem::take(&mut slot.chunks)
    }

    /// The in-flight slot for `id`. `Missing` when the slot is free, which
    /// indicates a stale or foreign id.
    pub fn get_mut(&mut self, id: SlotId) -> GatewayResult<&mut RequestSlot> {
        let index = self.index_of(id);
        let slot = &mut self.slots[index];
        if slot.state == SlotState::Free {
            return Err(GatewayError::Missing {
                what: "request slot",
                index: id.as_u16() as usize,
            });
        }
        Ok(slot)
    }

    fn index_of(&self, id: SlotId) -> usize {
        debug_assert!(
            id.0 >= self.offset && id.0 - self.offset <= self.mask,
            "slot {} is outside this worker's range",
            id
        );
        (id.0.wrapping_sub(self.offset) & self.mask) as usize
    }
}
