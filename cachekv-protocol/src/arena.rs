//! Thread-local inline response arena.
//!
//! Grounded on `src/server/protocol.cpp`'s `RespInlineArena`: a per-thread
//! pool of fixed-width buffers lets small responses skip the general
//! allocator. The original expresses this as a freelist over a raw byte
//! array with a runtime-reconfigurable capacity; per the resolved Design
//! Note (§9 "Global mutable state"), the capacity knob here is a
//! compile-time constant rather than an atomic, and reuse is realized as an
//! object pool of `Vec<u8>` buffers (the same RAII-return-on-drop pattern
//! `cachekv-client::pool` uses for TCP connections) rather than a single
//! monolithic array — this sidesteps sharing one arena's storage across
//! multiple simultaneously-live response packets, which a vectored write
//! needs to do.

use std::cell::RefCell;

/// Number of buffers kept warm per thread.
pub const INLINE_ARENA_SLOTS: usize = 256;
/// Default width of one slot; responses at or under this length are
/// eligible to skip the general allocator once the pool has warmed up.
pub const INLINE_SLOT_WIDTH: usize = 255;

thread_local! {
    static POOL: RefCell<Vec<Vec<u8>>> = RefCell::new(Vec::new());
}

/// An owned buffer checked out of the inline pool. Returned to the pool on
/// drop so the next small response reuses its heap allocation.
pub struct InlineBuf {
    bytes: Vec<u8>,
}

impl std::ops::Deref for InlineBuf {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.bytes
    }
}

impl std::ops::DerefMut for InlineBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }
}

impl Drop for InlineBuf {
    fn drop(&mut self) {
        let bytes = std::mem::take(&mut self.bytes);
        release(bytes);
    }
}

fn acquire(min_capacity: usize) -> Option<InlineBuf> {
    if min_capacity > INLINE_SLOT_WIDTH {
        return None;
    }
    POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        let mut bytes = pool.pop().unwrap_or_else(|| Vec::with_capacity(INLINE_SLOT_WIDTH));
        bytes.clear();
        Some(InlineBuf { bytes })
    })
}

fn release(bytes: Vec<u8>) {
    POOL.with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < INLINE_ARENA_SLOTS {
            pool.push(bytes);
        }
    });
}

/// A write-side accumulator that prefers the inline pool and falls back to
/// an owned heap buffer for payloads that don't fit a slot.
pub enum Accumulator {
    Inline(InlineBuf),
    Owned(Vec<u8>),
}

impl Accumulator {
    pub fn with_capacity(min_capacity: usize) -> Self {
        match acquire(min_capacity) {
            Some(buf) => Accumulator::Inline(buf),
            None => Accumulator::Owned(Vec::with_capacity(min_capacity)),
        }
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        match self {
            Accumulator::Inline(buf) => buf.extend_from_slice(data),
            Accumulator::Owned(buf) => buf.extend_from_slice(data),
        }
    }

    pub fn push(&mut self, byte: u8) {
        match self {
            Accumulator::Inline(buf) => buf.push(byte),
            Accumulator::Owned(buf) => buf.push(byte),
        }
    }

    pub fn into_payload(self) -> crate::Payload {
        match self {
            Accumulator::Inline(buf) => crate::Payload::Inline(buf),
            Accumulator::Owned(buf) => crate::Payload::Owned(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        {
            let buf = acquire(16).unwrap();
            drop(buf);
        }
        let buf = acquire(16).unwrap();
        assert!(buf.capacity() >= INLINE_SLOT_WIDTH);
    }

    #[test]
    fn refuses_oversize_requests() {
        assert!(acquire(INLINE_SLOT_WIDTH + 1).is_none());
    }

    #[test]
    fn pool_is_capped() {
        let mut held = Vec::new();
        for _ in 0..(INLINE_ARENA_SLOTS + 10) {
            held.push(acquire(4).unwrap());
        }
        drop(held);
        let count = POOL.with(|p| p.borrow().len());
        assert!(count <= INLINE_ARENA_SLOTS);
    }
}
