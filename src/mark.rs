//! Marks and views: persistent, ordered positions in a document.

use crate::chunk::{Chunk, ChunkId};
use slotmap::{new_key_type, SlotMap};
use std::cmp::Ordering;
use std::collections::HashMap;

new_key_type! {
    /// Identifies a mark within a document's mark store.
    pub struct MarkId;
}

/// A normalized `(chunk, offset)` reference, or the EOF sentinel
/// (`chunk: None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    pub chunk: Option<ChunkId>,
    pub offset: usize,
}

impl ChunkRef {
    pub const EOF: ChunkRef = ChunkRef {
        chunk: None,
        offset: 0,
    };

    pub fn at(chunk: ChunkId, offset: usize) -> Self {
        ChunkRef {
            chunk: Some(chunk),
            offset,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.chunk.is_none()
    }
}

/// A document-local index naming a view slot.
pub type ViewId = usize;

/// Which grouping a mark belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkGroup {
    /// A user-visible cursor (view number −1).
    Point,
    /// Not attached to any view (view number −2).
    Ungrouped,
    /// Member of view `ViewId`.
    View(ViewId),
}

/// A persistent position.
#[derive(Debug, Clone)]
pub struct Mark {
    pub reference: ChunkRef,
    /// Total-order tiebreaker among marks sharing a position.
    pub seq: u64,
    pub group: MarkGroup,
    /// Per-mark annotation bag.
    pub attrs: HashMap<String, String>,
}

/// State for one live view slot.
#[derive(Debug, Default)]
struct ViewState {
    /// Opaque token identifying the observer that owns this slot, checked
    /// by `del_view` so the engine can verify deletion is requested by the
    /// rightful owner.
    owner: Option<u64>,
    /// Marks belonging to this view, kept in the same relative order as
    /// `MarkStore::order`.
    members: Vec<MarkId>,
}

/// The full ordered collection of marks for one document.
///
/// Position ordering is *not* stored densely here: callers supply the chunk
/// table so `MarkStore` can compare two references by `(chunk.order,
/// offset)` without the store itself owning chunk data — marks only ever
/// hold `ChunkId`s, never arena bytes directly.
///
/// `order` is kept as a flat, comparator-sorted `Vec<MarkId>` rather than
/// an intrusive skip-list/order-statistic tree; lookups are `O(log n)`
/// binary search and insertion is `O(n)` shift, a deliberate simplification
/// documented in DESIGN.md.
#[derive(Debug, Default)]
pub struct MarkStore {
    marks: SlotMap<MarkId, Mark>,
    order: Vec<MarkId>,
    views: Vec<Option<ViewState>>,
    next_seq: u64,
}

impl MarkStore {
    pub fn new() -> Self {
        MarkStore {
            marks: SlotMap::with_key(),
            order: Vec::new(),
            views: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn get(&self, id: MarkId) -> Option<&Mark> {
        self.marks.get(id)
    }

    fn alloc_seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    /// Compares two references by document position, then by the supplied
    /// tiebreak sequence numbers. EOF sorts after every other reference.
    pub fn compare_refs(
        &self,
        chunks: &SlotMap<ChunkId, Chunk>,
        a: ChunkRef,
        b: ChunkRef,
        seq_a: u64,
        seq_b: u64,
    ) -> Ordering {
        let key = |r: ChunkRef| -> (u64, usize) {
            match r.chunk {
                None => (u64::MAX, 0),
                Some(c) => (chunks[c].order, r.offset),
            }
        };
        key(a).cmp(&key(b)).then(seq_a.cmp(&seq_b))
    }

    fn position_of(&self, chunks: &SlotMap<ChunkId, Chunk>, id: MarkId) -> (u64, usize, u64) {
        let m = &self.marks[id];
        let key = match m.reference.chunk {
            None => (u64::MAX, 0),
            Some(c) => (chunks[c].order, m.reference.offset),
        };
        (key.0, key.1, m.seq)
    }

    fn insertion_point(
        &self,
        chunks: &SlotMap<ChunkId, Chunk>,
        pos: (u64, usize, u64),
    ) -> usize {
        self.order
            .partition_point(|&id| self.position_of(chunks, id) < pos)
    }

    /// Allocates a new mark at `reference`, in group `group`, and inserts it
    /// into the global order and (if applicable) its view's member list.
    pub fn mark_new(
        &mut self,
        chunks: &SlotMap<ChunkId, Chunk>,
        reference: ChunkRef,
        group: MarkGroup,
    ) -> MarkId {
        let seq = self.alloc_seq();
        let id = self.marks.insert(Mark {
            reference,
            seq,
            group,
            attrs: HashMap::new(),
        });
        let pos = self.position_of(chunks, id);
        let at = self.insertion_point(chunks, pos);
        self.order.insert(at, id);
        if let MarkGroup::View(v) = group {
            if let Some(Some(state)) = self.views.get_mut(v) {
                let vat = state
                    .members
                    .partition_point(|&m| self.order.iter().position(|&o| o == m) < Some(at));
                state.members.insert(vat, id);
            }
        }
        id
    }

    /// Moves `dst` to sit at exactly `src`'s position, with `dst`'s sequence
    /// number placed immediately adjacent to `src`'s. Chooses `src.seq + 1`
    /// as the resolved scheme for "immediately adjacent" (DESIGN.md).
    pub fn mark_to_mark(&mut self, chunks: &SlotMap<ChunkId, Chunk>, dst: MarkId, src: MarkId) {
        let (src_ref, src_seq) = {
            let s = &self.marks[src];
            (s.reference, s.seq)
        };
        self.remove_from_order(dst);
        {
            let d = &mut self.marks[dst];
            d.reference = src_ref;
            d.seq = src_seq + 1;
        }
        let pos = self.position_of(chunks, dst);
        let at = self.insertion_point(chunks, pos);
        self.order.insert(at, dst);
        self.reinsert_into_view(dst);
    }

    /// Moves `m` to the first sequence slot among marks sharing its
    /// position.
    pub fn make_first(&mut self, chunks: &SlotMap<ChunkId, Chunk>, m: MarkId) {
        self.restack(chunks, m, true);
    }

    /// Moves `m` to the last sequence slot among marks sharing its position.
    pub fn make_last(&mut self, chunks: &SlotMap<ChunkId, Chunk>, m: MarkId) {
        self.restack(chunks, m, false);
    }

    fn restack(&mut self, chunks: &SlotMap<ChunkId, Chunk>, m: MarkId, first: bool) {
        let ref_pos = self.marks[m].reference;
        let pos_key = |chunks: &SlotMap<ChunkId, Chunk>, r: ChunkRef| -> (u64, usize) {
            match r.chunk {
                None => (u64::MAX, 0),
                Some(c) => (chunks[c].order, r.offset),
            }
        };
        let want = pos_key(chunks, ref_pos);
        let new_seq = if first {
            self.marks
                .values()
                .filter(|o| pos_key(chunks, o.reference) == want)
                .map(|o| o.seq)
                .min()
                .map(|min| min.saturating_sub(1))
                .unwrap_or_else(|| self.alloc_seq())
        } else {
            self.alloc_seq()
        };
        self.remove_from_order(m);
        self.marks[m].seq = new_seq;
        let pos = self.position_of(chunks, m);
        let at = self.insertion_point(chunks, pos);
        self.order.insert(at, m);
        self.reinsert_into_view(m);
    }

    fn remove_from_order(&mut self, id: MarkId) {
        if let Some(i) = self.order.iter().position(|&o| o == id) {
            self.order.remove(i);
        }
        if let MarkGroup::View(v) = self.marks[id].group {
            if let Some(Some(state)) = self.views.get_mut(v) {
                state.members.retain(|&o| o != id);
            }
        }
    }

    fn reinsert_into_view(&mut self, id: MarkId) {
        let group = self.marks[id].group;
        if let MarkGroup::View(v) = group {
            if let Some(Some(state)) = self.views.get_mut(v) {
                if !state.members.contains(&id) {
                    let global_pos = self.order.iter().position(|&o| o == id);
                    let at = state.members.partition_point(|&m| {
                        self.order.iter().position(|&o| o == m) < global_pos
                    });
                    state.members.insert(at, id);
                }
            }
        }
    }

    /// Removes a mark entirely (used by clip / view teardown / chunk
    /// collapse fix-up).
    pub fn remove(&mut self, id: MarkId) -> Option<Mark> {
        self.remove_from_order(id);
        self.marks.remove(id)
    }

    /// Reference-assigns a mark in place without moving it in the order
    /// (used by the fix-up walk, which must reorder afterward via
    /// `resort_one`).
    pub fn set_reference(&mut self, id: MarkId, reference: ChunkRef) {
        if let Some(m) = self.marks.get_mut(id) {
            m.reference = reference;
        }
    }

    /// Re-splices a single mark into its correct sorted slot after its
    /// reference was changed directly with `set_reference`. Used by the
    /// post-edit fix-up passes, which mutate many references in a single
    /// backward/forward walk before the list needs to be fully consistent
    /// again.
    pub fn resort_one(&mut self, chunks: &SlotMap<ChunkId, Chunk>, id: MarkId) {
        self.remove_from_order(id);
        let pos = self.position_of(chunks, id);
        let at = self.insertion_point(chunks, pos);
        self.order.insert(at, id);
        self.reinsert_into_view(id);
    }

    /// Returns mark ids in document order.
    pub fn ordered_ids(&self) -> &[MarkId] {
        &self.order
    }

    /// Allocates a new view slot, growing the table 4 at a time. Returns
    /// the slot index and records `owner` for later ownership checks.
    pub fn add_view(&mut self, owner: u64) -> ViewId {
        if let Some(i) = self.views.iter().position(|v| v.is_none()) {
            self.views[i] = Some(ViewState {
                owner: Some(owner),
                members: Vec::new(),
            });
            return i;
        }
        let base = self.views.len();
        self.views
            .extend((0..4).map(|_| None::<ViewState>));
        self.views[base] = Some(ViewState {
            owner: Some(owner),
            members: Vec::new(),
        });
        base
    }

    /// Frees every mark in view `i` and clears its slot. Returns `false` if
    /// `owner` does not match the slot's recorded owner.
    pub fn del_view(&mut self, i: ViewId, owner: u64) -> bool {
        let Some(Some(state)) = self.views.get(i) else {
            return false;
        };
        if state.owner != Some(owner) {
            return false;
        }
        let members = self.views[i].take().unwrap().members;
        for m in members {
            self.remove_from_order(m);
            self.marks.remove(m);
        }
        true
    }

    pub fn view_owner(&self, i: ViewId) -> Option<u64> {
        self.views.get(i).and_then(|v| v.as_ref()).and_then(|s| s.owner)
    }

    pub fn view_members(&self, i: ViewId) -> &[MarkId] {
        self.views
            .get(i)
            .and_then(|v| v.as_ref())
            .map(|s| s.members.as_slice())
            .unwrap_or(&[])
    }

    pub fn view_is_live(&self, i: ViewId) -> bool {
        matches!(self.views.get(i), Some(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaId;

    fn chunk_table(orders: &[u64]) -> (SlotMap<ArenaId, ()>, SlotMap<ChunkId, Chunk>, Vec<ChunkId>) {
        let mut arenas: SlotMap<ArenaId, ()> = SlotMap::with_key();
        let arena = arenas.insert(());
        let mut chunks: SlotMap<ChunkId, Chunk> = SlotMap::with_key();
        let ids = orders
            .iter()
            .map(|&o| chunks.insert(Chunk::new(arena, 0, 10, o)))
            .collect();
        (arenas, chunks, ids)
    }

    #[test]
    fn marks_stay_sorted_by_position_then_seq() {
        let (_arenas, chunks, ids) = chunk_table(&[10, 20]);
        let mut store = MarkStore::new();
        let m_late = store.mark_new(&chunks, ChunkRef::at(ids[1], 0), MarkGroup::Point);
        let m_early = store.mark_new(&chunks, ChunkRef::at(ids[0], 0), MarkGroup::Point);
        let order = store.ordered_ids();
        assert_eq!(order, &[m_early, m_late]);
    }

    #[test]
    fn make_first_wins_tie_among_same_position_marks() {
        let (_arenas, chunks, ids) = chunk_table(&[10]);
        let mut store = MarkStore::new();
        let m1 = store.mark_new(&chunks, ChunkRef::at(ids[0], 1), MarkGroup::Point);
        let m2 = store.mark_new(&chunks, ChunkRef::at(ids[0], 1), MarkGroup::Point);
        store.make_first(&chunks, m1);
        assert_eq!(store.ordered_ids(), &[m1, m2]);
    }

    #[test]
    fn view_table_grows_by_four() {
        let (_arenas, _chunks, _ids) = chunk_table(&[10]);
        let mut store = MarkStore::new();
        let v = store.add_view(1);
        assert_eq!(v, 0);
        assert!(store.view_is_live(0));
    }

    #[test]
    fn del_view_rejects_wrong_owner() {
        let mut store = MarkStore::new();
        let v = store.add_view(1);
        assert!(!store.del_view(v, 2));
        assert!(store.del_view(v, 1));
        assert!(!store.view_is_live(v));
    }

    #[test]
    fn del_view_frees_all_its_marks() {
        let (_arenas, chunks, ids) = chunk_table(&[10]);
        let mut store = MarkStore::new();
        let v = store.add_view(1);
        for i in 0..10 {
            store.mark_new(&chunks, ChunkRef::at(ids[0], i), MarkGroup::View(v));
        }
        let before = store.len();
        store.del_view(v, 1);
        assert_eq!(before - store.len(), 10);
    }
}
