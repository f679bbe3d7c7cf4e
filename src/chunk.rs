//! Chunks: contiguous arena slices threaded into the document's chunk list.

use crate::arena::ArenaId;
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a chunk, whether or not it is currently linked into the
    /// document's chunk list. Undo records keep referencing a `ChunkId`
    /// after it is unlinked, so chunks are never removed from the slotmap
    /// while any edit record still names them (see DESIGN.md).
    pub struct ChunkId;
}

/// One `(byte_offset_in_chunk, key, value)` attribute tag.
///
/// Kept sorted by `(offset, key)` so `trim`/`copy_tail` are simple slice
/// operations rather than a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrTag {
    pub offset: usize,
    pub key: String,
    pub value: String,
}

/// Sorted set of attribute tags for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrSet(Vec<AttrTag>);

impl AttrSet {
    pub fn new() -> Self {
        AttrSet(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AttrTag> {
        self.0.iter()
    }

    fn insertion_point(&self, offset: usize, key: &str) -> usize {
        self.0
            .partition_point(|t| (t.offset, t.key.as_str()) < (offset, key))
    }

    /// Sets `key` = `value` at `offset`, replacing any existing tag for the
    /// same `(offset, key)`.
    pub fn set(&mut self, offset: usize, key: &str, value: &str) {
        let i = self.insertion_point(offset, key);
        if let Some(existing) = self.0.get_mut(i) {
            if existing.offset == offset && existing.key == key {
                existing.value = value.to_string();
                return;
            }
        }
        self.0.insert(
            i,
            AttrTag {
                offset,
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    /// Returns the value of `key` whose tag offset is the greatest one
    /// `<= offset` (tags apply from their offset forward until overridden).
    pub fn get(&self, offset: usize, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|t| t.key == key && t.offset <= offset)
            .map(|t| t.value.as_str())
    }

    /// Clears `key` over `[from, to)` by removing tags in range and, if a
    /// tag for `key` was active at `from`, nothing further is needed since
    /// absence of a tag in range means "inherits from before `from`" is no
    /// longer true once the range is spliced out by the caller's chunk
    /// split; this method only drops in-range tags.
    pub fn clear_range(&mut self, key: &str, from: usize, to: usize) {
        self.0
            .retain(|t| !(t.key == key && t.offset >= from && t.offset < to));
    }

    /// Drops all tags at or past `max_offset` (used when a chunk's `end` is
    /// retracted by deletion).
    pub fn trim(&mut self, max_offset: usize) {
        self.0.retain(|t| t.offset < max_offset);
    }

    /// Produces the tag set for a tail chunk split off at `from_offset`,
    /// rebasing offsets relative to the new chunk's start. The originating
    /// set is left untouched; callers normally follow with `trim`.
    pub fn copy_tail(&self, from_offset: usize) -> AttrSet {
        AttrSet(
            self.0
                .iter()
                .filter(|t| t.offset >= from_offset)
                .map(|t| AttrTag {
                    offset: t.offset - from_offset,
                    key: t.key.clone(),
                    value: t.value.clone(),
                })
                .collect(),
        )
    }
}

/// A contiguous slice `[start, end)` of one arena, threaded into the
/// document's doubly-linked chunk list.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub arena: ArenaId,
    pub start: usize,
    pub end: usize,
    pub attrs: AttrSet,
    pub prev: Option<ChunkId>,
    pub next: Option<ChunkId>,
    /// False once the chunk is spliced out of the chunk list by a deletion.
    /// The slotmap entry survives regardless, kept alive by undo records
    /// that still reference it.
    pub linked: bool,
    /// Gap-based ordering key used for O(1) position comparisons between
    /// marks without walking the chunk list (§9 "Weak back-references",
    /// simplified per DESIGN.md: a true intrusive order-statistic structure
    /// is not implemented). Reassigned wholesale on overflow by the
    /// document's renumbering pass.
    pub order: u64,
}

impl Chunk {
    pub fn new(arena: ArenaId, start: usize, end: usize, order: u64) -> Self {
        assert!(start < end, "chunk must be non-empty at creation");
        Chunk {
            arena,
            start,
            end,
            attrs: AttrSet::new(),
            prev: None,
            next: None,
            linked: true,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn attr_set_get_inherits_from_last_tag_at_or_before_offset() {
        let mut attrs = AttrSet::new();
        attrs.set(0, "face", "bold");
        attrs.set(5, "face", "italic");
        assert_eq!(attrs.get(0, "face"), Some("bold"));
        assert_eq!(attrs.get(4, "face"), Some("bold"));
        assert_eq!(attrs.get(5, "face"), Some("italic"));
        assert_eq!(attrs.get(100, "face"), Some("italic"));
        assert_eq!(attrs.get(100, "missing"), None);
    }

    #[test]
    fn trim_drops_tags_past_new_end() {
        let mut attrs = AttrSet::new();
        attrs.set(0, "face", "bold");
        attrs.set(10, "face", "italic");
        attrs.trim(5);
        assert_eq!(attrs.get(10, "face"), Some("bold"));
    }

    #[test]
    fn copy_tail_rebases_offsets() {
        let mut attrs = AttrSet::new();
        attrs.set(0, "face", "bold");
        attrs.set(10, "face", "italic");
        let tail = attrs.copy_tail(10);
        assert_eq!(tail.get(0, "face"), Some("italic"));
    }

    #[test]
    fn clear_range_removes_only_in_range_tags() {
        let mut attrs = AttrSet::new();
        attrs.set(0, "face", "bold");
        attrs.set(5, "face", "italic");
        attrs.set(20, "face", "underline");
        attrs.clear_range("face", 5, 20);
        assert_eq!(attrs.get(5, "face"), Some("bold"));
        assert_eq!(attrs.get(20, "face"), Some("underline"));
    }

    #[test]
    fn chunk_slotmap_keeps_entries_after_unlink() {
        let mut arenas: SlotMap<ArenaId, ()> = SlotMap::with_key();
        let arena = arenas.insert(());
        let mut chunks: SlotMap<ChunkId, Chunk> = SlotMap::with_key();
        let id = chunks.insert(Chunk::new(arena, 0, 10, 1));
        chunks[id].linked = false;
        assert!(chunks.get(id).is_some());
    }
}
