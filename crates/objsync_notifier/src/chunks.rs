//! In-flight chunk transfer state.
//!
//! For every active chunked transfer the core keeps one [`ChunkInfo`]: a
//! bitmap of received chunks, the per-offset resend deadlines, and the
//! high-water offsets used to detect gaps without scanning the deadline map
//! on every tick. Entries live only in memory; a restart drops them and the
//! resend planner rebuilds the state from the store.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// In-memory state of one active chunked transfer.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkInfo {
    /// Largest offset ever requested.
    pub max_requested_offset: i64,
    /// Largest offset ever received.
    pub max_received_offset: i64,
    /// Total bytes of distinct chunks received so far.
    pub received_data_size: i64,
    /// Earliest re-request time per in-flight offset, unix seconds.
    pub chunk_resend_times: HashMap<i64, i64>,
    /// One bit per chunk; bit `i` marks the chunk at offset
    /// `i * chunk_size` as delivered. Empty when `chunk_size` is zero.
    pub chunks_received: Vec<u8>,
    /// Chunk size snapshot taken when the transfer started.
    pub chunk_size: i64,
    /// Overall next-retry deadline, a cheap gate for the resend planner.
    pub resend_time: i64,
}

impl ChunkInfo {
    /// Creates transfer state for an object, sizing the bitmap from the
    /// object and chunk sizes.
    pub fn new(chunk_size: i64, object_size: i64) -> Self {
        let chunks_received = if chunk_size > 0 {
            let bytes = ((object_size / chunk_size + 1) / 8 + 1) as usize;
            vec![0u8; bytes]
        } else {
            Vec::new()
        };
        Self {
            chunk_size,
            chunks_received,
            ..Default::default()
        }
    }

    /// Marks the chunk at `offset` as received, adding `size` to the
    /// received total if its bit was not already set.
    ///
    /// Returns `false` for a duplicate delivery, which leaves the total
    /// unchanged. Requires `chunk_size > 0`.
    pub fn mark_received(&mut self, offset: i64, size: i64) -> bool {
        debug_assert!(self.chunk_size > 0 && !self.chunks_received.is_empty());

        let chunk_index = (offset / self.chunk_size) as usize;
        let byte_index = chunk_index >> 3;
        let bit_mask = 1u8 << (chunk_index & 7);

        if self.chunks_received[byte_index] & bit_mask != 0 {
            return false;
        }
        self.chunks_received[byte_index] |= bit_mask;
        self.received_data_size += size;
        true
    }
}

/// Process-wide table of active chunked transfers, keyed by composite
/// notification id.
///
/// The lock guards only the map structure. Entries are cloned out, mutated
/// by value, and re-inserted; that is sound because all mutation for a
/// given key is serialized by the per-object lock, and it keeps store and
/// transport calls out of the table's critical sections.
#[derive(Debug, Default)]
pub(crate) struct ChunkTable {
    entries: RwLock<HashMap<String, ChunkInfo>>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out the entry for `id`, if present.
    pub fn get(&self, id: &str) -> Option<ChunkInfo> {
        self.entries.read().get(id).cloned()
    }

    /// Inserts or replaces the entry for `id`.
    pub fn insert(&self, id: String, info: ChunkInfo) {
        self.entries.write().insert(id, info);
    }

    /// Drops the entry for `id`.
    pub fn remove(&self, id: &str) {
        self.entries.write().remove(id);
    }

    /// Whether a transfer is active for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_sized_from_object_and_chunk_size() {
        // 10 bytes in chunks of 4: three chunks, one bitmap byte.
        let info = ChunkInfo::new(4, 10);
        assert_eq!(info.chunks_received.len(), 1);

        // 100 chunks of 8 bytes: (100 + 1) / 8 + 1 = 13 bytes.
        let info = ChunkInfo::new(8, 800);
        assert_eq!(info.chunks_received.len(), 13);
    }

    #[test]
    fn zero_chunk_size_has_empty_bitmap() {
        let info = ChunkInfo::new(0, 100);
        assert!(info.chunks_received.is_empty());
    }

    #[test]
    fn mark_received_is_idempotent() {
        let mut info = ChunkInfo::new(4, 12);

        assert!(info.mark_received(4, 4));
        assert_eq!(info.received_data_size, 4);

        // Duplicate delivery does not double-count.
        assert!(!info.mark_received(4, 4));
        assert_eq!(info.received_data_size, 4);

        assert!(info.mark_received(0, 4));
        assert!(info.mark_received(8, 4));
        assert_eq!(info.received_data_size, 12);
    }

    #[test]
    fn mark_received_spans_bitmap_bytes() {
        // 80 bytes in chunks of 8: ten chunks across two bitmap bytes.
        let mut info = ChunkInfo::new(8, 80);
        for chunk in 0..10 {
            assert!(info.mark_received(chunk * 8, 8));
        }
        assert_eq!(info.received_data_size, 80);
        for chunk in 0..10 {
            assert!(!info.mark_received(chunk * 8, 8));
        }
    }

    #[test]
    fn table_copy_out_mutate_reinsert() {
        let table = ChunkTable::new();
        table.insert("a".into(), ChunkInfo::new(4, 12));

        let mut info = table.get("a").unwrap();
        info.chunk_resend_times.insert(0, 100);
        table.insert("a".into(), info);

        assert_eq!(table.get("a").unwrap().chunk_resend_times.len(), 1);
        assert!(table.contains("a"));

        table.remove("a");
        assert!(table.get("a").is_none());
        assert!(!table.contains("a"));
    }
}
