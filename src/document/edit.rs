//! Insertion, deletion, and `replace`.

use super::{Document, MarkRefArg};
use crate::arena::Arena;
use crate::chunk::ChunkId;
use crate::error::{DocError, DocResult, InvalidArgument};
use crate::mark::ChunkRef;
use crate::notify::Event;
use crate::undo::EditKind;

/// Outcome of [`Document::replace`]: whether it started a new edit group
/// or coalesced into the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Started,
    Coalesced,
}

/// Largest prefix of `bytes` no longer than `max_len` that ends on a UTF-8
/// character boundary.
pub(crate) fn utf8_round_len(bytes: &[u8], max_len: usize) -> usize {
    if max_len >= bytes.len() {
        return bytes.len();
    }
    let mut n = max_len;
    while n > 0 && (bytes[n] & 0b1100_0000) == 0b1000_0000 {
        n -= 1;
    }
    n
}

impl Document {
    /// Inserts `bytes` at `at`, returning `(start, end)`: the normalized
    /// reference to the first inserted byte and to the position right after
    /// the last one; publishes `doc:replaced(start, end)`.
    pub fn insert_at(&mut self, at: MarkRefArg, bytes: &[u8], first: bool) -> DocResult<(ChunkRef, ChunkRef)> {
        self.check_readonly()?;
        let at = self.normalize(self.resolve_ref_arg(at)?);
        if bytes.is_empty() {
            return Ok((at, at));
        }

        let start = at;
        let mut cursor = at;
        // The chunk a freshly created chunk must link after. Tracked
        // alongside `cursor` rather than re-derived from it each time,
        // since `cursor.chunk == None` means either "document is empty"
        // or "sitting at EOF of a non-empty document" and only `tail`
        // tells those apart.
        let mut after = match cursor.chunk {
            Some(c) => self.chunks[c].prev,
            None => self.tail,
        };
        let mut remaining = bytes;
        let mut group_first = first;

        while !remaining.is_empty() {
            if let Some((new_cursor, consumed)) = self.try_grow_in_place(cursor, remaining, group_first) {
                cursor = new_cursor;
                after = cursor.chunk;
                remaining = &remaining[consumed..];
                group_first = false;
                continue;
            }

            // Landing mid-chunk: split first so insertion lands on a clean
            // chunk boundary.
            if let Some(c) = cursor.chunk {
                let (chunk_start, chunk_end) = (self.chunks[c].start, self.chunks[c].end);
                if cursor.offset > chunk_start && cursor.offset < chunk_end {
                    self.split_chunk(c, cursor.offset, group_first);
                    group_first = false;
                    cursor = self.normalize(cursor);
                    after = cursor.chunk.and_then(|c| self.chunks[c].prev);
                }
            }

            let take = self.next_insert_take_len(remaining);
            let chunk_id = self.create_new_chunk_for_bytes(after, &remaining[..take], group_first);
            cursor = ChunkRef::at(chunk_id, self.chunks[chunk_id].end);
            after = Some(chunk_id);
            remaining = &remaining[take..];
            group_first = false;
        }

        let end = self.normalize(cursor);
        self.fixup_tie_break(start, end);
        self.clear_modified_override();
        self.note_edit_for_autosave();
        self.publish(Event::Replaced { start, end });
        Ok((start, end))
    }

    /// How many bytes of `remaining` the next freshly created chunk should
    /// take: the whole thing if it fits the current arena's headroom (or a
    /// fresh arena up to the configured cap), capped to a UTF-8 boundary.
    fn next_insert_take_len(&self, remaining: &[u8]) -> usize {
        let cap = match self.current_arena {
            Some(a) => {
                let headroom = self.arenas[a].headroom();
                if headroom > 0 {
                    headroom
                } else {
                    self.config.arena_max_size.max(1)
                }
            }
            None => self.config.arena_max_size.max(1),
        };
        utf8_round_len(remaining, remaining.len().min(cap))
    }

    /// Attempts to append the start of `bytes` onto the chunk at `cursor` in
    /// place, when this chunk still owns its arena's tail. Returns the new
    /// cursor position and how many bytes were consumed, or `None` if
    /// in-place growth doesn't apply here.
    fn try_grow_in_place(&mut self, cursor: ChunkRef, bytes: &[u8], first: bool) -> Option<(ChunkRef, usize)> {
        let chunk_id = match cursor.chunk {
            Some(c) => {
                if cursor.offset != self.chunks[c].end {
                    return None;
                }
                c
            }
            // EOF sentinel: the tail chunk, if any, is the only candidate
            // for in-place growth here.
            None => self.tail?,
        };
        let arena_id = self.chunks[chunk_id].arena;
        if self.arenas[arena_id].tail_owner() != Some(chunk_id) {
            return None;
        }
        let headroom = self.arenas[arena_id].headroom();
        if headroom == 0 {
            return None;
        }
        let take = utf8_round_len(bytes, headroom.min(bytes.len()));
        if take == 0 {
            return None;
        }
        self.arenas[arena_id].append(&bytes[..take]);
        self.chunks[chunk_id].end += take;
        self.undo.push_edit(
            chunk_id,
            EditKind::Grow {
                at_start: false,
                len: take,
            },
            first,
        );
        Some((ChunkRef::at(chunk_id, self.chunks[chunk_id].end), take))
    }

    /// Creates a brand-new chunk holding `bytes` (already sized to fit one
    /// arena), linked right after `after`. Reuses the
    /// current arena if there's room, else allocates a fresh one (doubling
    /// up to the configured cap, or sized exactly for `bytes` if it alone
    /// exceeds the cap).
    fn create_new_chunk_for_bytes(&mut self, after: Option<ChunkId>, bytes: &[u8], first: bool) -> ChunkId {
        let arena_id = match self.current_arena {
            Some(a) if self.arenas[a].headroom() >= bytes.len() => a,
            _ => {
                let new_arena = if bytes.len() > self.config.arena_max_size {
                    Arena::sized_for(bytes.len())
                } else {
                    Arena::new(self.config.arena_initial_size, self.config.arena_max_size)
                };
                let id = self.arenas.insert(new_arena);
                self.current_arena = Some(id);
                id
            }
        };

        let range = self.arenas[arena_id].append(bytes);
        let chunk_id = self.create_chunk(arena_id, range.start, range.end, after);
        self.arenas[arena_id].set_tail_owner(Some(chunk_id));
        self.undo.push_edit(chunk_id, EditKind::Link, first);
        chunk_id
    }

    /// Splits `chunk` at absolute arena offset `at`, handing the tail
    /// `[at, old_end)` to a freshly linked chunk sharing the same arena
    /// Re-points every mark that referenced `chunk` at
    /// `offset >= at` to the new tail chunk (same absolute offset — no
    /// rebasing needed, since `ChunkRef::offset` is arena-absolute while
    /// only `AttrSet` offsets are chunk-relative).
    pub(crate) fn split_chunk(&mut self, chunk: ChunkId, at: usize, first: bool) -> ChunkId {
        let (arena, old_end, chunk_start) = {
            let c = &self.chunks[chunk];
            (c.arena, c.end, c.start)
        };
        debug_assert!(at > chunk_start && at < old_end);

        let tail_attrs = self.chunks[chunk].attrs.copy_tail(at - chunk_start);
        self.chunks[chunk].attrs.trim(at - chunk_start);
        self.chunks[chunk].end = at;
        self.undo.push_edit(
            chunk,
            EditKind::Shrink {
                at_start: false,
                len: old_end - at,
            },
            first,
        );

        let tail_id = self.create_chunk(arena, at, old_end, Some(chunk));
        self.chunks[tail_id].attrs = tail_attrs;
        self.undo.push_edit(tail_id, EditKind::Link, false);

        if self.arenas[arena].tail_owner() == Some(chunk) {
            self.arenas[arena].set_tail_owner(Some(tail_id));
        }

        let ids = self.marks.ordered_ids().to_vec();
        for m in ids {
            let r = self.marks.get(m).unwrap().reference;
            if r.chunk == Some(chunk) && r.offset >= at {
                self.marks.set_reference(m, ChunkRef::at(tail_id, r.offset));
                self.marks.resort_one(&self.chunks, m);
            }
        }
        tail_id
    }

    /// Deletes `[from, to)`. Errors if the range is reversed rather than
    /// auto-swapping the endpoints.
    pub fn delete_range(&mut self, from: ChunkRef, to: ChunkRef, first: bool) -> DocResult<()> {
        self.check_readonly()?;
        let from = self.normalize(from);
        let to = self.normalize(to);
        if self.compare_refs(from, to) == std::cmp::Ordering::Greater {
            return Err(DocError::InvalidArgument(InvalidArgument::RangeReversed));
        }
        if from == to {
            return Ok(());
        }

        self.publish(Event::Clip { low: from, high: to });
        self.collapse_marks_before_delete(from, to);

        match (from.chunk, to.chunk) {
            (Some(c), Some(t)) if c == t => {
                self.delete_within_one_chunk(c, from.offset, to.offset, first);
            }
            _ => self.delete_across_chunks(from, to, first),
        }

        self.clear_modified_override();
        self.note_edit_for_autosave();
        self.publish(Event::Replaced { start: from, end: from });
        Ok(())
    }

    fn delete_within_one_chunk(&mut self, chunk: ChunkId, from_off: usize, to_off: usize, first: bool) {
        let chunk_start = self.chunks[chunk].start;
        if from_off == chunk_start {
            self.shrink_start(chunk, to_off, first);
        } else {
            self.split_chunk(chunk, to_off, first);
            self.shrink_end(chunk, from_off, false);
        }
    }

    fn delete_across_chunks(&mut self, from: ChunkRef, to: ChunkRef, first: bool) {
        let mut group_first = first;

        let walk_start = if let Some(c1) = from.chunk {
            let c1_start = self.chunks[c1].start;
            if from.offset == c1_start {
                let next = self.chunks[c1].next;
                self.unlink_whole(c1, group_first);
                group_first = false;
                next
            } else {
                self.shrink_end(c1, from.offset, group_first);
                group_first = false;
                self.chunks[c1].next
            }
        } else {
            None
        };

        let mut cur = walk_start;
        while cur.is_some() && cur != to.chunk {
            let id = cur.unwrap();
            let next = self.chunks[id].next;
            self.unlink_whole(id, group_first);
            group_first = false;
            cur = next;
        }

        if let Some(c2) = to.chunk {
            let c2_start = self.chunks[c2].start;
            if to.offset > c2_start {
                self.shrink_start(c2, to.offset, group_first);
            }
        }
    }

    fn shrink_start(&mut self, chunk: ChunkId, new_start: usize, first: bool) {
        let old_start = self.chunks[chunk].start;
        let len = new_start - old_start;
        self.chunks[chunk].start = new_start;
        self.undo.push_edit(
            chunk,
            EditKind::Shrink {
                at_start: true,
                len,
            },
            first,
        );
    }

    fn shrink_end(&mut self, chunk: ChunkId, new_end: usize, first: bool) {
        let old_end = self.chunks[chunk].end;
        let len = old_end - new_end;
        self.chunks[chunk].end = new_end;
        self.chunks[chunk]
            .attrs
            .trim(new_end - self.chunks[chunk].start);
        let arena = self.chunks[chunk].arena;
        if self.arenas[arena].tail_owner() == Some(chunk) {
            self.arenas[arena].set_tail_owner(None);
        }
        self.undo.push_edit(
            chunk,
            EditKind::Shrink {
                at_start: false,
                len,
            },
            first,
        );
    }

    pub(crate) fn unlink_whole(&mut self, chunk: ChunkId, first: bool) {
        self.relocate_marks_off_chunk(chunk);
        self.unlink_chunk(chunk);
        self.undo.push_edit(chunk, EditKind::Unlink, first);
    }

    /// Atomic delete-then-insert. `mark_from`/
    /// `mark_to` bound the replaced range; `is_continuation` requests
    /// coalescing with the prior edit group when the engine's discretion
    /// allows it.
    pub fn replace(
        &mut self,
        mark_from: crate::mark::MarkId,
        mark_to: crate::mark::MarkId,
        text: &[u8],
        is_continuation: bool,
    ) -> DocResult<ReplaceOutcome> {
        self.check_readonly()?;
        let from = self.mark_reference(mark_from)?;
        let to = self.mark_reference(mark_to)?;
        if self.compare_refs(from, to) == std::cmp::Ordering::Greater {
            return Err(DocError::InvalidArgument(InvalidArgument::RangeReversed));
        }

        let at_save_point = self.undo.head() == self.undo.save_point();
        let coalesce = is_continuation && !at_save_point;
        let first = !coalesce;

        if from != to {
            self.delete_range(from, to, first)?;
        }
        if !text.is_empty() {
            let insert_first = first && from == to;
            self.insert_at(from.into(), text, insert_first)?;
        }
        self.publish(Event::StatusChanged);

        Ok(if coalesce {
            ReplaceOutcome::Coalesced
        } else {
            ReplaceOutcome::Started
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocConfig;
    use crate::document::Document;

    fn doc_with(text: &str) -> Document {
        let mut doc = Document::new(&DocConfig::default());
        doc.insert_at(MarkRefArg::Eof, text.as_bytes(), true).unwrap();
        doc
    }

    fn content(doc: &Document) -> String {
        let bytes = doc.content_bytes(doc.bof_ref(), doc.eof_ref());
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn utf8_round_len_backs_up_over_continuation_bytes() {
        let s = "a\u{00e9}b"; // 'a', 'é' (2 bytes), 'b'
        let bytes = s.as_bytes();
        assert_eq!(utf8_round_len(bytes, bytes.len()), bytes.len());
        assert_eq!(utf8_round_len(bytes, 2), 1);
    }

    #[test]
    fn insert_into_empty_document_creates_single_chunk() {
        let doc = doc_with("hello");
        assert_eq!(content(&doc), "hello");
    }

    #[test]
    fn insert_in_place_grows_tail_owned_chunk() {
        let mut doc = doc_with("hello");
        doc.insert_at(MarkRefArg::Eof, b" world", false).unwrap();
        assert_eq!(content(&doc), "hello world");
        assert_eq!(doc.chunks.len(), 1);
    }

    #[test]
    fn delete_within_single_chunk_removes_interior_bytes() {
        let mut doc = doc_with("hello world");
        let from = doc.ref_at_byte(5);
        let to = doc.ref_at_byte(6);
        doc.delete_range(from, to, true).unwrap();
        assert_eq!(content(&doc), "helloworld");
    }

    #[test]
    fn delete_spanning_whole_chunk_in_middle() {
        let mut doc = doc_with("one");
        if let Some(a) = doc.current_arena {
            doc.arenas[a].set_tail_owner(None);
        }
        doc.insert_at(MarkRefArg::Eof, b"two", false).unwrap();
        if let Some(a) = doc.current_arena {
            doc.arenas[a].set_tail_owner(None);
        }
        doc.insert_at(MarkRefArg::Eof, b"three", false).unwrap();
        assert_eq!(doc.chunks.len(), 3);

        let from = doc.ref_at_byte(3);
        let to = doc.ref_at_byte(6);
        doc.delete_range(from, to, true).unwrap();
        assert_eq!(content(&doc), "onethree");
    }

    #[test]
    fn delete_range_rejects_reversed_bounds() {
        let mut doc = doc_with("hello");
        let a = doc.ref_at_byte(1);
        let b = doc.ref_at_byte(3);
        let err = doc.delete_range(b, a, true).unwrap_err();
        assert!(matches!(
            err,
            DocError::InvalidArgument(InvalidArgument::RangeReversed)
        ));
    }

    #[test]
    fn replace_substitutes_range_with_new_text() {
        let mut doc = doc_with("hello world");
        let m1 = doc
            .mark_new(doc.ref_at_byte(6).into(), crate::mark::MarkGroup::Ungrouped)
            .unwrap();
        let m2 = doc
            .mark_new(doc.ref_at_byte(11).into(), crate::mark::MarkGroup::Ungrouped)
            .unwrap();
        doc.replace(m1, m2, b"rust", false).unwrap();
        assert_eq!(content(&doc), "hello rust");
    }

    #[test]
    fn delete_publishes_clip_before_marks_collapse() {
        use crate::notify::{Event, Handled};
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut doc = doc_with("hello world");
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        doc.subscribe(Box::new(move |event| {
            if let Event::Clip { low, high } = event {
                *seen2.borrow_mut() = Some((*low, *high));
            }
            Handled::FallThrough
        }));

        let from = doc.ref_at_byte(0);
        let to = doc.ref_at_byte(5);
        doc.delete_range(from, to, true).unwrap();

        assert_eq!(*seen.borrow(), Some((from, to)));
    }
}
