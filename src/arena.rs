//! Append-only byte arenas backing chunk content.
//!
//! Bytes handed to a chunk are never mutated or moved; an arena only ever
//! grows by appending at its tail. This gives chunk byte ranges `'static`-like
//! stability for the lifetime of the document: a `ChunkRef` into an arena
//! stays valid across every later insertion into *other* arenas or later
//! positions of this one.

use crate::chunk::ChunkId;
use slotmap::new_key_type;

new_key_type! {
    /// Identifies one arena within a [`crate::document::Document`].
    pub struct ArenaId;
}

/// A single append-only byte pool.
///
/// Starts at `initial_size` and doubles on each reallocation that would
/// overflow its current capacity, up to `max_size`. A single insertion
/// larger than `max_size` gets its own one-off arena sized exactly to fit,
/// so a whole-file load doesn't force a cascade of doubling reallocations.
#[derive(Debug)]
pub struct Arena {
    bytes: Vec<u8>,
    max_size: usize,
    /// The chunk currently entitled to grow this arena's tail in place, i.e.
    /// whose `end` equals `self.len()`. `None` once that chunk
    /// is split, trimmed, or unlinked, or once something else has been
    /// appended on its behalf.
    tail_owner: Option<ChunkId>,
}

impl Arena {
    /// Creates an arena pre-allocated to `initial_size`, growing by doubling
    /// up to `max_size`.
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Arena {
            bytes: Vec::with_capacity(initial_size.min(max_size.max(1))),
            max_size,
            tail_owner: None,
        }
    }

    /// Creates an arena sized exactly for one large, one-off payload (e.g. a
    /// whole-file load that exceeds the normal growth cap).
    pub fn sized_for(len: usize) -> Self {
        Arena {
            bytes: Vec::with_capacity(len),
            max_size: len,
            tail_owner: None,
        }
    }

    pub fn tail_owner(&self) -> Option<ChunkId> {
        self.tail_owner
    }

    pub fn set_tail_owner(&mut self, owner: Option<ChunkId>) {
        self.tail_owner = owner;
    }

    /// Number of bytes currently stored.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Remaining capacity before this arena must grow beyond `max_size`,
    /// i.e. before a fresh arena is needed for further appends.
    pub fn headroom(&self) -> usize {
        self.max_size.saturating_sub(self.bytes.len())
    }

    /// Appends `data` and returns the byte range it now occupies.
    ///
    /// Callers are expected to have checked [`Arena::headroom`] first when
    /// growth-capping matters; `append` itself never refuses a write; the
    /// arena's `Vec` will simply reallocate past `max_size` if forced to,
    /// which only happens for the `sized_for` single-shot case.
    pub fn append(&mut self, data: &[u8]) -> std::ops::Range<usize> {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(data);
        start..self.bytes.len()
    }

    /// Borrows the byte range `range` out of this arena's storage.
    ///
    /// Panics if `range` is out of bounds, which would indicate a corrupt
    /// `Chunk` rather than a recoverable condition.
    pub fn slice(&self, range: std::ops::Range<usize>) -> &[u8] {
        &self.bytes[range]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_contiguous_ranges() {
        let mut arena = Arena::new(4096, 1024 * 1024);
        let r1 = arena.append(b"hello");
        let r2 = arena.append(b" world");
        assert_eq!(r1, 0..5);
        assert_eq!(r2, 5..11);
        assert_eq!(arena.slice(r1), b"hello");
        assert_eq!(arena.slice(r2), b" world");
    }

    #[test]
    fn headroom_shrinks_as_arena_fills() {
        let mut arena = Arena::new(16, 16);
        assert_eq!(arena.headroom(), 16);
        arena.append(b"0123456789");
        assert_eq!(arena.headroom(), 6);
    }

    #[test]
    fn sized_for_fits_exactly() {
        let data = vec![7u8; 5_000_000];
        let mut arena = Arena::sized_for(data.len());
        let r = arena.append(&data);
        assert_eq!(r.len(), data.len());
        assert_eq!(arena.headroom(), 0);
    }
}
