//! Branching undo graph.
//!
//! Modeled as an explicit graph: `{ edits: SlotMap<EditId, Edit>, head,
//! direction }`, where each edit links `next`/`altnext`/`prev`. `reundo`
//! walks deterministic edges through it.

use crate::chunk::ChunkId;
use slotmap::new_key_type;
use slotmap::SlotMap;

new_key_type! {
    /// Identifies one edit record in the undo graph.
    pub struct EditId;
}

/// Which edge a `reundo` step last traversed to reach the current head,
/// determining which edge a subsequent opposite-direction step must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrevEdit {
    Redo,
    Undo,
    AltUndo,
}

/// What a single edit record did to `target_chunk`.
///
/// A bare `{ signed_length, at_start }` pair (positive for growth, negative
/// for shrinkage) can't tell "this chunk just came into existence" apart
/// from "this chunk just grew", which undo/redo replay needs to know. This
/// splits that ambiguity into an explicit `EditKind` instead — see
/// DESIGN.md's resolution of open question 1. `Grow`/`Shrink` change
/// `target_chunk`'s `start`/`end` in place; `Link`/
/// `Unlink` only splice it into or out of the chunk list, never touching
/// its byte range (a chunk's range is fixed at construction and only ever
/// changed by `Grow`/`Shrink` on an already-linked chunk).
#[derive(Debug, Clone, Copy)]
pub enum EditKind {
    /// `target_chunk` grew by `len` bytes at the edge named by `at_start`.
    Grow { at_start: bool, len: usize },
    /// `target_chunk` shrank by `len` bytes at the edge named by `at_start`.
    Shrink { at_start: bool, len: usize },
    /// `target_chunk` was spliced into the chunk list (newly created, or
    /// relinked after a prior unlink).
    Link,
    /// `target_chunk` was spliced out of the chunk list.
    Unlink,
    /// Zero-length no-op placeholder used only to hang a branch point.
    Placeholder,
}

/// One record in the undo graph.
#[derive(Debug, Clone)]
pub struct Edit {
    pub target_chunk: ChunkId,
    pub kind: EditKind,
    /// Marks the first record of a user-visible edit group.
    pub first: bool,
    /// Linear continuation: what a plain `redo` moves to.
    pub next: Option<EditId>,
    /// A previously-forked future, grafted here when a new edit follows an
    /// undo/redo run.
    pub altnext: Option<EditId>,
    /// What this record's predecessor in the history is (its `next`'s
    /// source, used to walk backward for undo).
    pub prev: Option<EditId>,
}

impl Edit {
    fn placeholder(prev: Option<EditId>) -> Self {
        Edit {
            target_chunk: ChunkId::default(),
            kind: EditKind::Placeholder,
            first: false,
            next: None,
            altnext: None,
            prev,
        }
    }
}

/// The undo/redo history for one document.
#[derive(Debug)]
pub struct UndoGraph {
    edits: SlotMap<EditId, Edit>,
    /// The very first edit ever pushed into this graph, so `redo_step` has
    /// somewhere to resume from once `head` has been undone all the way
    /// back to `None`.
    root: Option<EditId>,
    /// Current position in the graph; `None` means "before the first edit".
    head: Option<EditId>,
    /// Which edge the most recent `reundo` step traversed, used to decide
    /// where a brand-new edit must graft the preempted redo chain.
    direction: PrevEdit,
    /// The undo node representing the last `save-file`. `None` means never
    /// saved.
    save_point: Option<EditId>,
}

impl Default for UndoGraph {
    fn default() -> Self {
        UndoGraph::new()
    }
}

impl UndoGraph {
    pub fn new() -> Self {
        UndoGraph {
            edits: SlotMap::with_key(),
            root: None,
            head: None,
            direction: PrevEdit::Redo,
            save_point: None,
        }
    }

    pub fn head(&self) -> Option<EditId> {
        self.head
    }

    pub fn save_point(&self) -> Option<EditId> {
        self.save_point
    }

    /// Marks the current head as the save point: on a successful save,
    /// `save_point := current undo head`.
    pub fn mark_saved(&mut self) {
        self.save_point = self.head;
    }

    /// The document is unmodified iff the head sits at the save point.
    pub fn is_modified(&self) -> bool {
        self.head != self.save_point
    }

    /// Records a new edit following the current head.
    ///
    /// If the head currently sits mid-history (the last step was an
    /// `undo`/`redo`/`alt-redo`, not a fresh edit), the chain that a plain
    /// `redo` would have followed is preserved by grafting it onto the
    /// outgoing record's `altnext` — inserting a zero-length placeholder
    /// first if `altnext` is already occupied, so no branch is ever
    /// silently dropped.
    pub fn push_edit(&mut self, target_chunk: ChunkId, kind: EditKind, first: bool) -> EditId {
        let prev = self.head;
        let preempted_redo = prev.and_then(|p| self.edits[p].next);

        let new_id = self.edits.insert(Edit {
            target_chunk,
            kind,
            first,
            next: None,
            altnext: None,
            prev,
        });

        if let Some(p) = prev {
            if let Some(redo_chain) = preempted_redo {
                self.graft_alt(p, redo_chain);
            }
            self.edits[p].next = Some(new_id);
        } else if self.root.is_none() {
            self.root = Some(new_id);
        }
        self.head = Some(new_id);
        self.direction = PrevEdit::Redo;
        new_id
    }

    fn graft_alt(&mut self, at: EditId, chain: EditId) {
        if self.edits[at].altnext.is_none() {
            self.edits[at].altnext = Some(chain);
        } else {
            let placeholder = self.edits.insert(Edit::placeholder(Some(at)));
            self.edits[placeholder].altnext = self.edits[at].altnext;
            self.edits[placeholder].next = Some(chain);
            self.edits[at].altnext = Some(placeholder);
        }
    }

    /// Steps one record backward, returning the record to invert, or `None`
    /// at the start of history.
    pub fn undo_step(&mut self) -> Option<EditId> {
        let current = self.head?;
        self.head = self.edits[current].prev;
        self.direction = PrevEdit::Undo;
        Some(current)
    }

    /// Steps one record forward along `next` (redo) or, if the last step
    /// was an undo/redo and an alternate branch is hanging off the current
    /// head, along `altnext` instead when `use_alt` is set. Returns the
    /// record to (re)apply. Once everything has been undone (`head ==
    /// None`), steps to `root` regardless of `use_alt` — there's no branch
    /// point before the first edit.
    pub fn redo_step(&mut self, use_alt: bool) -> Option<EditId> {
        let current = self.head;
        let next = match current {
            // Before the first edit, there's no branch point to hang an
            // alternate history off of: the only way forward is `root`.
            None => self.root,
            Some(c) => {
                if use_alt {
                    self.edits[c].altnext
                } else {
                    self.edits[c].next
                }
            }
        };
        let next = next?;
        self.head = Some(next);
        self.direction = if use_alt {
            PrevEdit::AltUndo
        } else {
            PrevEdit::Redo
        };
        Some(next)
    }

    pub fn direction(&self) -> PrevEdit {
        self.direction
    }

    pub fn get(&self, id: EditId) -> &Edit {
        &self.edits[id]
    }

    /// Whether `id` opens an edit group (the unit `undo`/`redo` advances
    /// by).
    pub fn starts_group(&self, id: EditId) -> bool {
        self.edits[id].first
    }
}
