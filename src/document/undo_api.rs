//! `doc:reundo`, `doc:modified`, and edit replay.
//!
//! Replay works directly off each [`crate::undo::Edit`]'s `target_chunk`
//! and `kind`: growing/shrinking a chunk just adjusts its `start`/`end`,
//! and linking/unlinking replays through the chunk's own (possibly stale)
//! `prev`/`next` fields, which `unlink_chunk` never touches — undo keeps
//! referencing a chunk regardless of its current list membership.

use super::Document;
use crate::error::DocResult;
use crate::mark::ChunkRef;
use crate::notify::Event;
use crate::undo::{Edit, EditKind};

/// Outcome of [`Document::reundo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReundoOutcome {
    Undone,
    Redone,
    /// There was nothing to undo/redo in the requested direction.
    AtBoundary,
}

/// `doc:modified(mode)` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiedMode {
    Query,
    Set,
    Clear,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyDirection {
    Forward,
    Inverse,
}

impl Document {
    /// `doc:reundo(redo_flag)`: steps one edit group backward (`false`) or
    /// forward along the plain redo chain (`true`).
    pub fn reundo(&mut self, redo_flag: bool) -> ReundoOutcome {
        if redo_flag {
            self.redo_group(false)
        } else {
            self.undo_group()
        }
    }

    /// Steps one edit group forward along the alternate branch hanging off
    /// the current head, if any.
    pub fn alt_redo(&mut self) -> ReundoOutcome {
        self.redo_group(true)
    }

    fn undo_group(&mut self) -> ReundoOutcome {
        let mut applied_any = false;
        loop {
            if self.undo.head().is_none() {
                break;
            }
            let Some(id) = self.undo.undo_step() else { break };
            let edit = self.undo.get(id).clone();
            self.apply_edit(&edit, ApplyDirection::Inverse);
            applied_any = true;
            if edit.first {
                break;
            }
        }
        if applied_any {
            self.after_reundo_fixup();
            self.publish(Event::StatusChanged);
            ReundoOutcome::Undone
        } else {
            ReundoOutcome::AtBoundary
        }
    }

    fn redo_group(&mut self, use_alt: bool) -> ReundoOutcome {
        let Some(first_id) = self.undo.redo_step(use_alt) else {
            return ReundoOutcome::AtBoundary;
        };
        let first_edit = self.undo.get(first_id).clone();
        self.apply_edit(&first_edit, ApplyDirection::Forward);
        loop {
            let Some(head) = self.undo.head() else { break };
            let Some(next_id) = self.undo.get(head).next else { break };
            if self.undo.starts_group(next_id) {
                break;
            }
            self.undo.redo_step(false);
            let edit = self.undo.get(next_id).clone();
            self.apply_edit(&edit, ApplyDirection::Forward);
        }
        self.after_reundo_fixup();
        self.publish(Event::StatusChanged);
        ReundoOutcome::Redone
    }

    fn apply_edit(&mut self, edit: &Edit, direction: ApplyDirection) {
        let target = edit.target_chunk;
        match (edit.kind, direction) {
            (EditKind::Grow { at_start, len }, ApplyDirection::Forward) => {
                self.grow_chunk_by(target, at_start, len)
            }
            (EditKind::Grow { at_start, len }, ApplyDirection::Inverse) => {
                self.shrink_chunk_by(target, at_start, len)
            }
            (EditKind::Shrink { at_start, len }, ApplyDirection::Forward) => {
                self.shrink_chunk_by(target, at_start, len)
            }
            (EditKind::Shrink { at_start, len }, ApplyDirection::Inverse) => {
                self.grow_chunk_by(target, at_start, len)
            }
            (EditKind::Link, ApplyDirection::Forward) => self.relink_chunk(target),
            (EditKind::Link, ApplyDirection::Inverse) => {
                self.relocate_marks_off_chunk(target);
                self.unlink_chunk(target);
            }
            (EditKind::Unlink, ApplyDirection::Forward) => {
                self.relocate_marks_off_chunk(target);
                self.unlink_chunk(target);
            }
            (EditKind::Unlink, ApplyDirection::Inverse) => self.relink_chunk(target),
            (EditKind::Placeholder, _) => {}
        }
    }

    fn grow_chunk_by(&mut self, target: crate::chunk::ChunkId, at_start: bool, len: usize) {
        if at_start {
            self.chunks[target].start -= len;
        } else {
            self.chunks[target].end += len;
        }
    }

    fn shrink_chunk_by(&mut self, target: crate::chunk::ChunkId, at_start: bool, len: usize) {
        if at_start {
            self.chunks[target].start += len;
        } else {
            self.chunks[target].end -= len;
            let new_len = self.chunks[target].end - self.chunks[target].start;
            self.chunks[target].attrs.trim(new_len);
        }
    }

    fn relink_chunk(&mut self, target: crate::chunk::ChunkId) {
        let (prev, next) = (self.chunks[target].prev, self.chunks[target].next);
        self.splice_link(target, prev, next);
    }

    /// Walks every mark's reference through the fully general repair used
    /// after replay, since an undo/redo group mutates chunk boundaries and
    /// linkage directly rather than through `insert_at`/`delete_range`'s
    /// incremental fix-up passes.
    fn after_reundo_fixup(&mut self) {
        let ids = self.marks.ordered_ids().to_vec();
        for m in ids {
            let r = self.marks.get(m).unwrap().reference;
            let fixed = self.repair_reference(r);
            self.marks.set_reference(m, fixed);
            self.marks.resort_one(&self.chunks, m);
        }
        self.modified_override = None;
    }

    /// Clamps `r`'s offset into its chunk's current bounds, or — if the
    /// chunk is no longer linked — walks its stale `next` chain to the
    /// nearest linked chunk (or EOF).
    fn repair_reference(&self, r: ChunkRef) -> ChunkRef {
        let Some(mut c) = r.chunk else { return ChunkRef::EOF };
        let mut offset = r.offset;
        loop {
            if self.chunks[c].linked {
                let clamped = offset.clamp(self.chunks[c].start, self.chunks[c].end);
                return self.normalize(ChunkRef::at(c, clamped));
            }
            match self.chunks[c].next {
                Some(n) => {
                    c = n;
                    offset = self.chunks[c].start;
                }
                None => return self.eof_ref(),
            }
        }
    }

    /// `doc:modified(mode)`: query, force-set, force-clear, or toggle the
    /// document's modified flag. An explicit `Set`/`Clear`/`Toggle`
    /// overrides the flag derived from the undo graph's save point until
    /// the next edit or `reundo` step, which recomputes it from scratch.
    pub fn modified(&mut self, mode: ModifiedMode) -> bool {
        match mode {
            ModifiedMode::Query => {}
            ModifiedMode::Set => self.modified_override = Some(true),
            ModifiedMode::Clear => {
                self.undo.mark_saved();
                self.modified_override = None;
            }
            ModifiedMode::Toggle => {
                let cur = self.is_modified();
                self.modified_override = Some(!cur);
            }
        }
        if mode != ModifiedMode::Query {
            self.publish(Event::StatusChanged);
        }
        self.is_modified()
    }

    pub fn is_modified(&self) -> bool {
        self.modified_override.unwrap_or_else(|| self.undo.is_modified())
    }

    pub(crate) fn clear_modified_override(&mut self) {
        self.modified_override = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocConfig;
    use crate::document::{Document, MarkRefArg};
    use crate::mark::MarkGroup;

    fn doc() -> Document {
        Document::new(&DocConfig::default())
    }

    fn content(doc: &Document) -> String {
        doc.content(doc.bof_ref(), None)
    }

    #[test]
    fn undo_then_redo_restores_exact_state() -> DocResult<()> {
        let mut d = doc();
        d.insert_at(MarkRefArg::Eof, b"hello world\n", true)?;
        let before = content(&d);
        let sp = d.ref_at_byte(5);
        let ep = d.ref_at_byte(6);
        d.delete_range(sp, ep, true)?;
        assert_eq!(content(&d), "helloworld\n");
        d.reundo(false);
        assert_eq!(content(&d), before);
        d.reundo(true);
        assert_eq!(content(&d), "helloworld\n");
        Ok(())
    }

    #[test]
    fn delete_then_undo_restores_mark_to_pre_delete_position() -> DocResult<()> {
        let mut d = doc();
        d.insert_at(MarkRefArg::Eof, b"hello world\n", true)?;
        let m = d.mark_new(d.ref_at_byte(5).into(), MarkGroup::Point)?;
        let from = d.ref_at_byte(5);
        let to = d.ref_at_byte(6);
        d.delete_range(from, to, true)?;
        assert_eq!(d.mark_reference(m)?, d.ref_at_byte(5));
        d.reundo(false);
        assert_eq!(content(&d), "hello world\n");
        assert_eq!(d.mark_reference(m)?, d.ref_at_byte(5));
        Ok(())
    }

    #[test]
    fn undo_then_rewrite_then_alt_redo_reaches_preempted_branch() -> DocResult<()> {
        let mut d = doc();
        d.insert_at(MarkRefArg::Eof, b"A", true)?;
        d.insert_at(MarkRefArg::Eof, b"B", false)?;
        assert_eq!(content(&d), "AB");
        d.reundo(false);
        assert_eq!(content(&d), "A");
        d.insert_at(MarkRefArg::Eof, b"C", true)?;
        assert_eq!(content(&d), "AC");
        d.reundo(false);
        d.reundo(false);
        assert_eq!(content(&d), "");
        d.reundo(true);
        assert_eq!(content(&d), "A");
        d.alt_redo();
        assert_eq!(content(&d), "AB");
        Ok(())
    }

    #[test]
    fn save_then_modified_query_flips_on_edit() -> DocResult<()> {
        let mut d = doc();
        d.insert_at(MarkRefArg::Eof, b"x", true)?;
        d.modified(ModifiedMode::Clear);
        assert!(!d.is_modified());
        d.insert_at(MarkRefArg::Eof, b"y", true)?;
        assert!(d.is_modified());
        Ok(())
    }
}
