//! The document handle: the root entity tying arenas, chunks, marks, undo,
//! and notifications together.
//!
//! Concerns are split one `impl Document` block per file:
//!
//! - [`edit`] — insertion, deletion, `replace`.
//! - [`fixup`] — post-edit mark repair.
//! - [`nav`] — char/byte/EOL movement and content streaming.
//! - [`attrs_api`] — `doc:set-attr` / `doc:get-attr`, including built-ins.
//! - [`io`] — load/save/autosave/file-change detection.
//! - [`views_api`] — view lifecycle, `vmark-get`, recent-points stack.
//! - [`undo_api`] — `doc:reundo`, `doc:modified`, edit replay.

mod attrs_api;
mod edit;
mod fixup;
mod io;
mod nav;
mod undo_api;
mod views_api;

pub use edit::ReplaceOutcome;
pub use io::LoadOutcome;
pub use nav::ContentUnit;
pub use undo_api::{ModifiedMode, ReundoOutcome};
pub use views_api::VMarkQuery;

use crate::arena::{Arena, ArenaId};
use crate::chunk::{Chunk, ChunkId};
use crate::config::DocConfig;
use crate::error::{DocError, DocResult, InvalidArgument};
use crate::mark::{ChunkRef, MarkGroup, MarkId, MarkStore};
use crate::notify::{Callback, Event, Handled, NotifyBus, SubscriptionId};
use crate::undo::UndoGraph;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

/// Order keys are spaced this far apart at creation so many insertions can
/// land between two chunks before a renumbering pass is needed.
const ORDER_GAP: u64 = 1 << 16;

/// Opaque identity an observer (a view owner, e.g. a highlighter) supplies
/// to [`Document::add_view`] / [`Document::del_view`] so the store can
/// reject a `del_view` from the wrong caller.
pub type ObserverId = u64;

/// A remembered cursor position, pushed on close and popped on open.
#[derive(Debug, Clone, Copy)]
pub struct RecentPoint {
    pub reference: ChunkRef,
}

/// Snapshot of a `stat(2)` call used for file-change detection:
/// `(dev, ino, mtime)`.
pub type StatSnapshot = (u64, u64, i64);

#[derive(Debug, Default)]
pub(crate) struct AutosaveState {
    /// Edits observed since the last autosave flush.
    pub edits_since_flush: u32,
    /// Wall-clock time of the last edit (for the idle trigger).
    pub last_edit_at: Option<Instant>,
    /// Small integer slot assigned to this document's autosave index
    /// symlink at first flush, reused on subsequent flushes.
    pub index_slot: Option<u32>,
    /// Path of the `#basename#` companion file once it exists.
    pub shadow_path: Option<PathBuf>,
}

/// The document: arenas, chunks, marks, undo graph, and the notification
/// bus for one editable text buffer.
pub struct Document {
    pub(crate) config: DocConfig,

    pub(crate) arenas: SlotMap<ArenaId, Arena>,
    /// The arena new chunk growth currently lands in, i.e. the arena a
    /// `sized_for` one-off load does *not* touch.
    pub(crate) current_arena: Option<ArenaId>,

    pub(crate) chunks: SlotMap<ChunkId, Chunk>,
    pub(crate) head: Option<ChunkId>,
    pub(crate) tail: Option<ChunkId>,

    pub(crate) marks: MarkStore,
    pub(crate) undo: UndoGraph,
    pub(crate) notify: NotifyBus,

    pub(crate) attrs: HashMap<String, String>,
    pub(crate) readonly: bool,
    pub(crate) autoclose: bool,
    pub(crate) file_changed: bool,

    pub(crate) file_path: Option<PathBuf>,
    pub(crate) last_stat: Option<StatSnapshot>,
    pub(crate) autosave: AutosaveState,

    pub(crate) recent_points: Vec<RecentPoint>,

    /// Next owner token minted by `new_observer_id` for callers that don't
    /// already have one of their own (most tests).
    pub(crate) next_observer_id: ObserverId,

    /// `doc:modified(mode)` override. `None` means "derive from the undo
    /// graph's save point", the default; `Some` pins the flag until the
    /// next edit or `reundo` step clears it.
    pub(crate) modified_override: Option<bool>,
}

impl Document {
    /// Creates an empty document using `config`.
    pub fn new(config: &DocConfig) -> Self {
        Document {
            config: config.clone(),
            arenas: SlotMap::with_key(),
            current_arena: None,
            chunks: SlotMap::with_key(),
            head: None,
            tail: None,
            marks: MarkStore::new(),
            undo: UndoGraph::new(),
            notify: NotifyBus::new(),
            attrs: HashMap::new(),
            readonly: false,
            autoclose: false,
            file_changed: false,
            file_path: None,
            last_stat: None,
            autosave: AutosaveState::default(),
            recent_points: Vec::new(),
            next_observer_id: 1,
            modified_override: None,
        }
    }

    /// Creates an empty document with [`DocConfig::default`].
    pub fn with_default_config() -> Self {
        Document::new(&DocConfig::default())
    }

    /// Mints a fresh [`ObserverId`] for a caller that doesn't maintain its
    /// own stable identity (e.g. ad hoc test code).
    pub fn new_observer_id(&mut self) -> ObserverId {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        id
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Total number of live marks in the document (points, view members, and
    /// ungrouped marks alike).
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    pub fn config(&self) -> &DocConfig {
        &self.config
    }

    /// Mutable access to this document's tunables, e.g. to shrink
    /// `autosave_idle` in a test so the idle trigger fires without a real
    /// sleep.
    pub fn config_mut(&mut self) -> &mut DocConfig {
        &mut self.config
    }

    pub fn file_path(&self) -> Option<&std::path::Path> {
        self.file_path.as_deref()
    }

    pub fn is_file_changed(&self) -> bool {
        self.file_changed
    }

    pub(crate) fn check_readonly(&self) -> DocResult<()> {
        if self.readonly {
            Err(DocError::ReadOnly)
        } else {
            Ok(())
        }
    }

    // ---- chunk list primitives -------------------------------------------------

    /// Allocates a fresh order key strictly between `before` and `after`
    /// (exclusive), renumbering the whole chunk list first if there's no
    /// room left.
    pub(crate) fn alloc_order_between(&mut self, before: Option<ChunkId>, after: Option<ChunkId>) -> u64 {
        let before_key = before.map(|c| self.chunks[c].order);
        let after_key = after.map(|c| self.chunks[c].order);
        let candidate = match (before_key, after_key) {
            (Some(b), Some(a)) if a > b + 1 => Some(b + (a - b) / 2),
            (Some(b), Some(a)) if a > b => None, // no room, a == b+1
            (Some(b), None) => Some(b.saturating_add(ORDER_GAP)),
            (None, Some(a)) if a > 0 => Some(a / 2),
            (None, Some(_)) => None,
            (None, None) => Some(ORDER_GAP),
            _ => None,
        };
        match candidate {
            Some(key) => key,
            None => {
                self.renumber_chunk_order();
                self.alloc_order_between(before, after)
            }
        }
    }

    /// Reassigns every linked chunk's `order` to evenly spaced values,
    /// walking the chunk list head-to-tail.
    fn renumber_chunk_order(&mut self) {
        let mut key = ORDER_GAP;
        let mut cur = self.head;
        while let Some(id) = cur {
            self.chunks[id].order = key;
            key = key.saturating_add(ORDER_GAP);
            cur = self.chunks[id].next;
        }
    }

    /// Creates and links a brand-new chunk holding `[start, end)` of
    /// `arena`, immediately after `after` (`None` = at the head of the
    /// list). Does not touch marks; callers re-point marks themselves when
    /// the new chunk takes over part of an existing one (split).
    pub(crate) fn create_chunk(
        &mut self,
        arena: ArenaId,
        start: usize,
        end: usize,
        after: Option<ChunkId>,
    ) -> ChunkId {
        let before_neighbor = after;
        let after_neighbor = match after {
            Some(id) => self.chunks[id].next,
            None => self.head,
        };
        let order = self.alloc_order_between(before_neighbor, after_neighbor);
        let id = self.chunks.insert(Chunk::new(arena, start, end, order));
        self.splice_link(id, before_neighbor, after_neighbor);
        id
    }

    /// Links `id` into the chunk list between `before` and `after`,
    /// updating their pointers and `id`'s own `prev`/`next`. Used both for
    /// brand-new chunks and for relinking a chunk that a prior delete
    /// unlinked (redo, or undo of an insert-created chunk) — in the relink
    /// case `id`'s own `prev`/`next` are left exactly as `unlink` found
    /// them, so the caller passes those same neighbors back in — undo keeps
    /// referencing a chunk regardless of its current list membership.
    pub(crate) fn splice_link(&mut self, id: ChunkId, before: Option<ChunkId>, after: Option<ChunkId>) {
        self.chunks[id].prev = before;
        self.chunks[id].next = after;
        self.chunks[id].linked = true;
        match before {
            Some(b) => self.chunks[b].next = Some(id),
            None => self.head = Some(id),
        }
        match after {
            Some(a) => self.chunks[a].prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    /// Splices `id` out of the chunk list. `id`'s own `prev`/`next` fields
    /// are left untouched (stale, pointing at its former neighbors) so a
    /// later `splice_link(id, stale_prev, stale_next)` relinks it exactly
    /// where it was, which is how undo relinks a chunk it brings back.
    pub(crate) fn unlink_chunk(&mut self, id: ChunkId) {
        let (prev, next) = (self.chunks[id].prev, self.chunks[id].next);
        match prev {
            Some(p) => self.chunks[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.chunks[n].prev = prev,
            None => self.tail = prev,
        }
        self.chunks[id].linked = false;
        for arena in self.arenas.values_mut() {
            if arena.tail_owner() == Some(id) {
                arena.set_tail_owner(None);
            }
        }
    }

    /// Normalizes a reference so `offset` never equals a linked chunk's
    /// `end` (it rolls forward to the next chunk's `start`, or to
    /// [`ChunkRef::EOF`] if there is none).
    pub(crate) fn normalize(&self, r: ChunkRef) -> ChunkRef {
        match r.chunk {
            None => ChunkRef::EOF,
            Some(c) => {
                let chunk = &self.chunks[c];
                if !chunk.linked {
                    // A reference into an unlinked chunk is stale; this
                    // should only transiently occur inside a single edit
                    // before fix-up runs.
                    return r;
                }
                if r.offset < chunk.end {
                    r
                } else {
                    match chunk.next {
                        Some(n) => ChunkRef::at(n, self.chunks[n].start),
                        None => ChunkRef::EOF,
                    }
                }
            }
        }
    }

    /// The position right after the document's last linked chunk, or EOF if
    /// the document is empty.
    pub fn eof_ref(&self) -> ChunkRef {
        match self.tail {
            Some(t) => self.normalize(ChunkRef::at(t, self.chunks[t].end)),
            None => ChunkRef::EOF,
        }
    }

    pub(crate) fn compare_refs(&self, a: ChunkRef, b: ChunkRef) -> std::cmp::Ordering {
        self.marks.compare_refs(&self.chunks, a, b, 0, 0)
    }

    // ---- marks convenience -------------------------------------------------

    pub fn mark_new(&mut self, reference: MarkRefArg, group: MarkGroup) -> DocResult<MarkId> {
        let reference = self.resolve_ref_arg(reference)?;
        Ok(self.marks.mark_new(&self.chunks, reference, group))
    }

    pub fn mark_to_mark(&mut self, dst: MarkId, src: MarkId) -> DocResult<()> {
        self.require_mark(dst)?;
        self.require_mark(src)?;
        self.marks.mark_to_mark(&self.chunks, dst, src);
        Ok(())
    }

    pub fn make_first(&mut self, m: MarkId) -> DocResult<()> {
        self.require_mark(m)?;
        self.marks.make_first(&self.chunks, m);
        Ok(())
    }

    pub fn make_last(&mut self, m: MarkId) -> DocResult<()> {
        self.require_mark(m)?;
        self.marks.make_last(&self.chunks, m);
        Ok(())
    }

    pub fn mark_reference(&self, m: MarkId) -> DocResult<ChunkRef> {
        self.require_mark(m).map(|mark| mark.reference)
    }

    pub(crate) fn require_mark(&self, m: MarkId) -> DocResult<&crate::mark::Mark> {
        self.marks
            .get(m)
            .ok_or(DocError::InvalidArgument(InvalidArgument::MarkWrongDocument))
    }

    /// Resolves a caller-supplied reference argument, which may name an
    /// existing mark's position or be given directly as a `ChunkRef`.
    pub(crate) fn resolve_ref_arg(&self, arg: MarkRefArg) -> DocResult<ChunkRef> {
        match arg {
            MarkRefArg::At(r) => Ok(r),
            MarkRefArg::Mark(m) => self.mark_reference(m),
            MarkRefArg::Eof => Ok(self.eof_ref()),
            MarkRefArg::Bof => Ok(match self.head {
                Some(h) => ChunkRef::at(h, self.chunks[h].start),
                None => ChunkRef::EOF,
            }),
        }
    }

    // ---- flags ---------------------------------------------------------------

    /// Uniform flag setter for `doc:set:<name>`.
    pub fn set_flag(&mut self, name: &str, value: bool) -> DocResult<()> {
        match name {
            "readonly" => self.readonly = value,
            "autoclose" => self.autoclose = value,
            _ => {
                return Err(DocError::InvalidArgument(InvalidArgument::UnknownFlag(
                    name.to_string(),
                )))
            }
        }
        self.publish(Event::StatusChanged);
        Ok(())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn doc_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    // ---- notifications ---------------------------------------------------------

    pub fn subscribe(&mut self, callback: Callback) -> SubscriptionId {
        self.notify.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, sub: SubscriptionId) {
        self.notify.unsubscribe(sub);
    }

    pub(crate) fn publish(&mut self, event: Event) -> Handled {
        self.notify.dispatch(&event)
    }

    /// Runs the `doc:notify-viewers` query, then publishes `Notify:Close`
    /// and drops every mark and view — the teardown lifecycle the event
    /// table implies but never names as its own operation.
    pub fn close(&mut self) {
        self.publish(Event::NotifyViewers);
        self.publish(Event::Close);
        self.marks = MarkStore::new();
    }

    // ---- consistency checks -----------------------------------------------

    /// Checks the universally-quantified invariants of spec.md §8 (1-4):
    /// every linked chunk is non-empty and arena-bounded, linked chunks
    /// within one arena don't overlap, marks are strictly ordered by
    /// `(position, seq)`, and every view's sublist visits marks in the same
    /// order as the global mark list. Intended for tests and debug
    /// assertions, not the hot edit path — it walks every chunk and mark.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut by_arena: HashMap<ArenaId, Vec<(usize, usize)>> = HashMap::new();
        let mut cur = self.head;
        while let Some(id) = cur {
            let c = &self.chunks[id];
            if c.start >= c.end {
                return Err(format!("chunk {id:?} is empty or inverted: [{}, {})", c.start, c.end));
            }
            if c.end > self.arenas[c.arena].len() {
                return Err(format!(
                    "chunk {id:?} end {} exceeds arena {:?} length {}",
                    c.end,
                    c.arena,
                    self.arenas[c.arena].len()
                ));
            }
            by_arena.entry(c.arena).or_default().push((c.start, c.end));
            cur = c.next;
        }
        for (arena, mut ranges) in by_arena {
            ranges.sort();
            for w in ranges.windows(2) {
                if w[1].0 < w[0].1 {
                    return Err(format!("chunks in arena {arena:?} overlap: {:?} vs {:?}", w[0], w[1]));
                }
            }
        }

        let ordered = self.marks.ordered_ids();
        for w in ordered.windows(2) {
            let a = self.marks.get(w[0]).unwrap();
            let b = self.marks.get(w[1]).unwrap();
            let cmp = self.compare_refs(a.reference, b.reference);
            if cmp == std::cmp::Ordering::Greater {
                return Err(format!("marks {:?}, {:?} out of position order", w[0], w[1]));
            }
            if cmp == std::cmp::Ordering::Equal && a.seq >= b.seq {
                return Err(format!("marks {:?}, {:?} tied in position but not strictly ordered by seq", w[0], w[1]));
            }
        }

        for (i, &id) in ordered.iter().enumerate() {
            if let MarkGroup::View(v) = self.marks.get(id).unwrap().group {
                let members = self.marks.view_members(v);
                let pos = members.iter().position(|&m| m == id).ok_or_else(|| {
                    format!("mark {id:?} claims membership in view {v} but isn't in its member list")
                })?;
                if pos > 0 {
                    let prev_member = members[pos - 1];
                    let prev_global = ordered.iter().position(|&m| m == prev_member).unwrap();
                    if prev_global >= i {
                        return Err(format!("view {v}'s member order disagrees with the global mark order"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// How a caller names a position when they don't already hold a `MarkId`
/// (e.g. "insert at EOF", "insert at BOF", or a raw `ChunkRef` computed by
/// another part of this crate).
#[derive(Debug, Clone, Copy)]
pub enum MarkRefArg {
    At(ChunkRef),
    Mark(MarkId),
    Eof,
    Bof,
}

impl From<MarkId> for MarkRefArg {
    fn from(m: MarkId) -> Self {
        MarkRefArg::Mark(m)
    }
}

impl From<ChunkRef> for MarkRefArg {
    fn from(r: ChunkRef) -> Self {
        MarkRefArg::At(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocConfig;

    #[test]
    fn new_document_is_empty() {
        let doc = Document::new(&DocConfig::default());
        assert!(doc.is_empty());
        assert!(!doc.is_readonly());
        assert_eq!(doc.file_path(), None);
    }

    #[test]
    fn set_flag_rejects_unknown_name() {
        let mut doc = Document::with_default_config();
        let err = doc.set_flag("bogus", true).unwrap_err();
        assert!(matches!(
            err,
            DocError::InvalidArgument(InvalidArgument::UnknownFlag(_))
        ));
    }

    #[test]
    fn set_flag_readonly_blocks_mutation_elsewhere() {
        let mut doc = Document::with_default_config();
        doc.set_flag("readonly", true).unwrap();
        assert!(doc.is_readonly());
        assert!(doc.check_readonly().is_err());
    }

    #[test]
    fn check_invariants_passes_after_edits_and_undo() {
        let mut doc = Document::with_default_config();
        doc.insert_at(MarkRefArg::Eof, b"hello world", true).unwrap();
        let m = doc
            .mark_new(doc.ref_at_byte(5).into(), MarkGroup::Ungrouped)
            .unwrap();
        doc.make_first(m).unwrap();
        doc.delete_range(doc.ref_at_byte(5), doc.ref_at_byte(6), true)
            .unwrap();
        doc.check_invariants().unwrap();
        doc.reundo(false);
        doc.check_invariants().unwrap();
    }
}
