//! Post-edit mark repair.
//!
//! A single backward/forward fix-up walk is folded here into three narrower
//! passes, each run exactly where the invariant it protects could otherwise
//! break: marks inside a collapsing range move to the collapse point before
//! the chunk list changes under them (so a later `normalize` re-derives
//! their position correctly rather than needing a second pass to repair
//! staleness), ties at an insertion point are split by sequence order, and a
//! chunk about to be unlinked (live delete, or an undo/redo step that walks
//! a Link/Unlink edit) hands its marks to a neighbor first.

use super::Document;
use crate::chunk::ChunkId;
use crate::mark::ChunkRef;
use std::cmp::Ordering;

impl Document {
    /// Moves every mark whose position falls within `[from, to)` to the
    /// collapse point `from`, before the chunk-list mutation that deletes
    /// or shrinks that range runs. Once the mutation lands, `normalize`
    /// alone re-derives the right position for these marks.
    pub(crate) fn collapse_marks_before_delete(&mut self, from: ChunkRef, to: ChunkRef) {
        let ids = self.marks.ordered_ids().to_vec();
        for m in ids {
            let r = self.marks.get(m).unwrap().reference;
            if self.compare_refs(r, from) != Ordering::Less && self.compare_refs(r, to) == Ordering::Less {
                self.marks.set_reference(m, from);
                self.marks.resort_one(&self.chunks, m);
            }
        }
    }

    /// Splits ties at the insertion point by sequence order: the
    /// lowest-`seq` mark originally at `start` stays there (ends up before
    /// the inserted text); every other mark that was tied with it moves to
    /// `end`.
    pub(crate) fn fixup_tie_break(&mut self, start: ChunkRef, end: ChunkRef) {
        if start == end {
            return;
        }
        let mut tied: Vec<_> = self
            .marks
            .ordered_ids()
            .iter()
            .copied()
            .filter(|&m| self.marks.get(m).unwrap().reference == start)
            .collect();
        tied.sort_by_key(|&m| self.marks.get(m).unwrap().seq);
        for &m in tied.iter().skip(1) {
            self.marks.set_reference(m, end);
            self.marks.resort_one(&self.chunks, m);
        }
    }

    /// Hands every mark currently referencing `chunk` to a live neighbor,
    /// called immediately before `chunk` is spliced out of the list (live
    /// delete, or an undo/redo step replaying a `Link`/`Unlink` edit).
    /// Prefers `chunk`'s successor (so a mark lands just past the removed
    /// span, matching the forward-pass convention); falls back to the
    /// predecessor's end, which resolves to EOF once `chunk` is actually
    /// unlinked and the predecessor becomes the new tail.
    pub(crate) fn relocate_marks_off_chunk(&mut self, chunk: ChunkId) {
        let (prev, next) = (self.chunks[chunk].prev, self.chunks[chunk].next);
        let target = match next {
            Some(n) => ChunkRef::at(n, self.chunks[n].start),
            None => match prev {
                Some(p) => ChunkRef::at(p, self.chunks[p].end),
                None => ChunkRef::EOF,
            },
        };
        let ids = self.marks.ordered_ids().to_vec();
        for m in ids {
            if self.marks.get(m).unwrap().reference.chunk == Some(chunk) {
                self.marks.set_reference(m, target);
                self.marks.resort_one(&self.chunks, m);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocConfig;
    use crate::document::MarkRefArg;
    use crate::mark::MarkGroup;

    #[test]
    fn tie_break_keeps_first_ranked_mark_before_insertion() {
        let mut doc = Document::new(&DocConfig::default());
        doc.insert_at(MarkRefArg::Eof, b"ab", true).unwrap();
        let at = doc.ref_at_byte(1);
        let m1 = doc.mark_new(at.into(), MarkGroup::Ungrouped).unwrap();
        let m2 = doc.mark_new(at.into(), MarkGroup::Ungrouped).unwrap();
        doc.make_first(m1).unwrap();

        doc.insert_at(at.into(), b"X", false).unwrap();

        assert_eq!(doc.mark_reference(m1).unwrap(), doc.ref_at_byte(1));
        assert_eq!(doc.mark_reference(m2).unwrap(), doc.ref_at_byte(2));
    }
}
