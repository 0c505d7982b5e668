//! The open-addressed, bucketed hash table that backs one shard.
//!
//! Grounded on `src/kvs/kvs.cpp`. Each shard is single-writer: the reactor
//! thread is the only caller of `set`/`get`/`del`, so no internal locking is
//! needed (see spec.md §5).

use cachekv_common::error::{CacheError, CacheResult};
use cachekv_common::wire::{
    BUCKET_SIZE, DEFAULT_INITIAL_TABLE_SIZE, MAX_READ_WRITE_ATTEMPTS, MIN_SIZE_TO_COMPRESS,
    RESIZE_THRESHOLD_PERCENTAGE,
};

use crate::compression;
use crate::entry::Entry;
use crate::hash::hash_key;
use crate::pool::EntryPool;
use crate::primegen::Primegen;

#[derive(Debug, Clone, Default)]
struct Bucket {
    slots: [u32; BUCKET_SIZE],
}

/// Construction-time behavior knobs, mirroring `KeyValueStoreSettings`.
#[derive(Debug, Clone)]
pub struct ShardSettings {
    pub initial_size: u64,
    pub compression_enabled: bool,
    pub use_prime_numbers: bool,
}

impl Default for ShardSettings {
    fn default() -> Self {
        ShardSettings {
            initial_size: DEFAULT_INITIAL_TABLE_SIZE,
            compression_enabled: true,
            use_prime_numbers: true,
        }
    }
}

pub struct Shard {
    table: Vec<Bucket>,
    table_size: u64,
    pool: EntryPool,
    num_entries: u64,
    num_resizes: u32,
    resizing: bool,
    settings: ShardSettings,
    primegen: Primegen,
}

impl Shard {
    pub fn new(settings: ShardSettings) -> Self {
        let table_size = settings.initial_size.max(1);
        Shard {
            table: vec![Bucket::default(); table_size as usize],
            table_size,
            pool: EntryPool::new(table_size as usize),
            num_entries: 0,
            num_resizes: 0,
            resizing: false,
            settings,
            primegen: Primegen::new(),
        }
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn num_resizes(&self) -> u32 {
        self.num_resizes
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    fn calc_index(hash: u64, attempt: u32, table_size: u64) -> u64 {
        let i = attempt as u64;
        hash.wrapping_add(i.wrapping_mul(i)) % table_size
    }

    /// Inserts or replaces `key`. `hash` is the precomputed `hash_key(key)`
    /// so callers (the dispatcher) never re-hash at the insert site.
    pub fn set(&mut self, key: &[u8], value: &[u8], hash: u64) -> CacheResult<()> {
        self.maybe_resize();
        match self.try_insert(key, value, hash) {
            Err(CacheError::StorageFull) => {
                // Resolved open question (§9 MAX_READ_WRITE_ATTEMPTS): resize
                // inline once and retry the probe a single time rather than
                // surfacing the error and deferring the resize to the next
                // writer.
                self.resize();
                self.try_insert(key, value, hash)
            }
            other => other,
        }
    }

    pub fn get(&self, key: &[u8], hash: u64) -> Option<Vec<u8>> {
        for attempt in 0..MAX_READ_WRITE_ATTEMPTS {
            let bucket_idx = Self::calc_index(hash, attempt, self.table_size) as usize;
            for &pool_idx in &self.table[bucket_idx].slots {
                if pool_idx == 0 {
                    continue;
                }
                if let Some(entry) = self.pool.get(pool_idx) {
                    if entry.key_matches(key) {
                        return Some(if entry.compressed {
                            compression::decompress(&entry.value).unwrap_or_default()
                        } else {
                            entry.value.to_vec()
                        });
                    }
                }
            }
        }
        None
    }

    pub fn del(&mut self, key: &[u8], hash: u64) -> CacheResult<()> {
        for attempt in 0..MAX_READ_WRITE_ATTEMPTS {
            let bucket_idx = Self::calc_index(hash, attempt, self.table_size) as usize;
            for slot in 0..BUCKET_SIZE {
                let pool_idx = self.table[bucket_idx].slots[slot];
                if pool_idx == 0 {
                    continue;
                }
                if self.pool.get(pool_idx).map(|e| e.key_matches(key)).unwrap_or(false) {
                    self.pool.deallocate(pool_idx);
                    self.table[bucket_idx].slots[slot] = 0;
                    self.num_entries -= 1;
                    return Ok(());
                }
            }
        }
        Err(CacheError::KeyNotFound)
    }

    fn maybe_resize(&mut self) {
        if self.resizing {
            return;
        }
        if self.num_entries * 100 >= self.table_size * RESIZE_THRESHOLD_PERCENTAGE {
            self.resize();
        }
    }

    fn try_insert(&mut self, key: &[u8], value: &[u8], hash: u64) -> CacheResult<()> {
        for attempt in 0..MAX_READ_WRITE_ATTEMPTS {
            let bucket_idx = Self::calc_index(hash, attempt, self.table_size) as usize;
            for slot in 0..BUCKET_SIZE {
                let pool_idx = self.table[bucket_idx].slots[slot];
                if pool_idx == 0 {
                    let entry = self.build_entry(key, value);
                    let new_idx = self.pool.allocate(entry);
                    self.table[bucket_idx].slots[slot] = new_idx;
                    self.num_entries += 1;
                    return Ok(());
                }
                if self.pool.get(pool_idx).map(|e| e.key_matches(key)).unwrap_or(false) {
                    self.pool.deallocate(pool_idx);
                    let entry = self.build_entry(key, value);
                    let new_idx = self.pool.allocate(entry);
                    self.table[bucket_idx].slots[slot] = new_idx;
                    return Ok(());
                }
            }
        }
        Err(CacheError::StorageFull)
    }

    fn build_entry(&self, key: &[u8], value: &[u8]) -> Entry {
        if self.settings.compression_enabled && value.len() >= MIN_SIZE_TO_COMPRESS {
            if let Some(compressed) = compression::compress(value) {
                return Entry::new(key, compressed.into_boxed_slice(), true);
            }
        }
        Entry::new(key, value.to_vec().into_boxed_slice(), false)
    }

    fn resize(&mut self) {
        self.resizing = true;
        let new_size = if self.settings.use_prime_numbers {
            self.primegen
                .pop_next()
                .unwrap_or_else(|| self.table_size.saturating_mul(2))
        } else {
            self.table_size.saturating_mul(2)
        };

        let mut new_table = vec![Bucket::default(); new_size as usize];
        for bucket in &self.table {
            for &pool_idx in &bucket.slots {
                if pool_idx == 0 {
                    continue;
                }
                let key_hash = match self.pool.get(pool_idx) {
                    Some(entry) => hash_key(&entry.key),
                    None => continue,
                };
                if !Self::place_in_table(&mut new_table, pool_idx, key_hash, new_size) {
                    tracing::warn!(pool_idx, "entry lost during resize migration");
                }
            }
        }

        self.table = new_table;
        self.table_size = new_size;
        self.num_resizes += 1;
        self.resizing = false;
        tracing::debug!(new_size, resizes = self.num_resizes, "shard resized");
    }

    fn place_in_table(table: &mut [Bucket], pool_idx: u32, hash: u64, table_size: u64) -> bool {
        for attempt in 0..MAX_READ_WRITE_ATTEMPTS {
            let idx = Self::calc_index(hash, attempt, table_size) as usize;
            for slot in 0..BUCKET_SIZE {
                if table[idx].slots[slot] == 0 {
                    table[idx].slots[slot] = pool_idx;
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard() -> Shard {
        Shard::new(ShardSettings {
            initial_size: 127,
            compression_enabled: true,
            use_prime_numbers: true,
        })
    }

    #[test]
    fn set_then_get_returns_the_written_value() {
        let mut s = shard();
        s.set(b"foo", b"bar", hash_key(b"foo")).unwrap();
        assert_eq!(s.get(b"foo", hash_key(b"foo")), Some(b"bar".to_vec()));
    }

    #[test]
    fn get_of_absent_key_is_none() {
        let s = shard();
        assert_eq!(s.get(b"missing", hash_key(b"missing")), None);
    }

    #[test]
    fn delete_then_get_is_absent() {
        let mut s = shard();
        let h = hash_key(b"foo");
        s.set(b"foo", b"bar", h).unwrap();
        s.del(b"foo", h).unwrap();
        assert_eq!(s.get(b"foo", h), None);
    }

    #[test]
    fn delete_of_absent_key_is_not_found() {
        let mut s = shard();
        assert!(matches!(s.del(b"nope", hash_key(b"nope")), Err(CacheError::KeyNotFound)));
    }

    #[test]
    fn double_set_overwrites_without_growing_entry_count() {
        let mut s = shard();
        let h = hash_key(b"foo");
        s.set(b"foo", b"bar", h).unwrap();
        s.set(b"foo", b"bar", h).unwrap();
        assert_eq!(s.num_entries(), 1);
        assert_eq!(s.get(b"foo", h), Some(b"bar".to_vec()));
    }

    #[test]
    fn probing_sequence_matches_the_quadratic_formula() {
        let table_size = 101u64;
        for attempt in 0..MAX_READ_WRITE_ATTEMPTS {
            let expected = (7u64 + (attempt as u64) * (attempt as u64)) % table_size;
            assert_eq!(Shard::calc_index(7, attempt, table_size), expected);
        }
    }

    #[test]
    fn stays_under_resize_threshold_without_triggering_resize() {
        let mut s = shard();
        let budget = (s.table_size() * RESIZE_THRESHOLD_PERCENTAGE / 100 * BUCKET_SIZE as u64) / BUCKET_SIZE as u64;
        let cap = budget.min(60);
        for i in 0..cap {
            let key = i.to_le_bytes();
            s.set(&key, b"v", hash_key(&key)).unwrap();
        }
        assert_eq!(s.num_resizes(), 0);
    }

    #[test]
    fn resize_preserves_every_live_key() {
        let mut s = Shard::new(ShardSettings {
            initial_size: 11,
            compression_enabled: false,
            use_prime_numbers: true,
        });
        let mut keys = Vec::new();
        for i in 0..500u32 {
            let key = i.to_le_bytes().to_vec();
            s.set(&key, b"value", hash_key(&key)).unwrap();
            keys.push(key);
        }
        assert!(s.num_resizes() > 0);
        for key in &keys {
            assert_eq!(s.get(key, hash_key(key)), Some(b"value".to_vec()));
        }
    }

    #[test]
    fn compression_boundary_round_trips_on_both_sides() {
        let mut s = shard();
        let below = vec![b'x'; MIN_SIZE_TO_COMPRESS - 1];
        let at = vec![b'x'; MIN_SIZE_TO_COMPRESS];
        s.set(b"below", &below, hash_key(b"below")).unwrap();
        s.set(b"at", &at, hash_key(b"at")).unwrap();
        assert_eq!(s.get(b"below", hash_key(b"below")), Some(below));
        assert_eq!(s.get(b"at", hash_key(b"at")), Some(at));
    }
}
