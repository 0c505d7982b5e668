//! Per-shard entry allocator.
//!
//! Grounded on `kvs::MemoryPool`: an append-only vector addressed by
//! compact integer handles, index `0` reserved as the null sentinel so a
//! bucket slot can use `0` to mean "empty" without an extra flag bit.
//! Deallocation clears the cell in place; the pool does not reclaim the
//! slot for reuse (the original's `defragment()` compaction pass exists but
//! is disabled by default, so freed slots simply sit empty until the next
//! resize rehashes everything into a fresh pool).

use crate::entry::Entry;

const GROWTH_FACTOR: f64 = 1.5;

pub struct EntryPool {
    slots: Vec<Option<Entry>>,
    next_free: u32,
    deallocations: u64,
}

impl EntryPool {
    pub fn new(initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.push(None); // index 0: null sentinel
        EntryPool {
            slots,
            next_free: 1,
            deallocations: 0,
        }
    }

    /// Allocates a new cell, growing the backing vector if needed, and
    /// returns its handle.
    pub fn allocate(&mut self, entry: Entry) -> u32 {
        if self.next_free as usize >= self.slots.len() {
            self.grow();
        }
        let idx = self.next_free;
        self.slots[idx as usize] = Some(entry);
        self.next_free += 1;
        idx
    }

    pub fn deallocate(&mut self, idx: u32) {
        if idx == 0 {
            return;
        }
        if let Some(slot) = self.slots.get_mut(idx as usize) {
            if slot.take().is_some() {
                self.deallocations += 1;
            }
        }
    }

    pub fn get(&self, idx: u32) -> Option<&Entry> {
        if idx == 0 {
            return None;
        }
        self.slots.get(idx as usize).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, idx: u32) -> Option<&mut Entry> {
        if idx == 0 {
            return None;
        }
        self.slots.get_mut(idx as usize).and_then(|slot| slot.as_mut())
    }

    pub fn deallocation_count(&self) -> u64 {
        self.deallocations
    }

    fn grow(&mut self) {
        let new_len = ((self.slots.len() as f64 * GROWTH_FACTOR) as usize).max(self.slots.len() + 1);
        self.slots.resize_with(new_len, || None);
    }
}
