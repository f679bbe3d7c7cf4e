//! Char/byte/EOL movement and content streaming: `doc:char`, `doc:byte`,
//! `doc:EOL`, `doc:set-ref`, `doc:content`, `doc:content-bytes`.

use super::Document;
use crate::mark::{ChunkRef, MarkId};
use std::cmp::Ordering;

/// One unit of document content at a position: a decoded code point, or a
/// raw byte that did not decode as UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentUnit {
    Char(char),
    InvalidByte(u8),
}

impl ContentUnit {
    /// Byte width of this unit, i.e. how far a reference must advance past
    /// it.
    pub fn byte_len(&self) -> usize {
        match self {
            ContentUnit::Char(c) => c.len_utf8(),
            ContentUnit::InvalidByte(_) => 1,
        }
    }
}

impl Document {
    /// The position of the first byte of the document, or EOF if empty.
    pub fn bof_ref(&self) -> ChunkRef {
        match self.head {
            Some(h) => ChunkRef::at(h, self.chunks[h].start),
            None => ChunkRef::EOF,
        }
    }

    /// The reference `n` bytes after BOF; used by tests and by callers that
    /// think in absolute byte offsets.
    pub fn ref_at_byte(&self, n: usize) -> ChunkRef {
        self.advance_ref(self.bof_ref(), n)
    }

    pub(crate) fn byte_at(&self, r: ChunkRef) -> Option<u8> {
        let c = r.chunk?;
        let chunk = &self.chunks[c];
        if r.offset >= chunk.end {
            return None;
        }
        Some(self.arenas[chunk.arena].slice(r.offset..r.offset + 1)[0])
    }

    /// Advances `r` forward by `n` bytes, crossing chunk boundaries as
    /// needed, stopping at EOF if the document runs out.
    pub(crate) fn advance_ref(&self, r: ChunkRef, mut n: usize) -> ChunkRef {
        let mut cur = self.normalize(r);
        while n > 0 {
            let Some(c) = cur.chunk else { break };
            let chunk = &self.chunks[c];
            let avail = chunk.end - cur.offset;
            if n < avail {
                cur = ChunkRef::at(c, cur.offset + n);
                n = 0;
            } else {
                n -= avail;
                cur = self.normalize(ChunkRef::at(c, chunk.end));
            }
        }
        cur
    }

    /// Retreats `r` backward by `n` bytes. Stops at BOF if the document
    /// runs out.
    pub(crate) fn retreat_ref(&self, r: ChunkRef, mut n: usize) -> ChunkRef {
        let mut cur = match r.chunk {
            Some(_) => r,
            None => match self.tail {
                Some(t) => ChunkRef::at(t, self.chunks[t].end),
                None => return ChunkRef::EOF,
            },
        };
        while n > 0 {
            let c = cur.chunk.expect("non-EOF cursor during retreat");
            let chunk_start = self.chunks[c].start;
            let avail = cur.offset - chunk_start;
            if n <= avail {
                cur = ChunkRef::at(c, cur.offset - n);
                n = 0;
            } else {
                n -= avail;
                match self.chunks[c].prev {
                    Some(p) => cur = ChunkRef::at(p, self.chunks[p].end),
                    None => return ChunkRef::at(c, chunk_start),
                }
            }
        }
        cur
    }

    /// Collects up to `max` bytes starting at `r`, stopping early at EOF.
    fn peek_forward(&self, r: ChunkRef, max: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max);
        let mut cur = self.normalize(r);
        while out.len() < max {
            let Some(c) = cur.chunk else { break };
            let chunk = &self.chunks[c];
            let take = (chunk.end - cur.offset).min(max - out.len());
            out.extend_from_slice(self.arenas[chunk.arena].slice(cur.offset..cur.offset + take));
            cur = self.normalize(ChunkRef::at(c, cur.offset + take));
        }
        out
    }

    /// Collects up to `max` bytes immediately before `r`, in document
    /// order, stopping early at BOF.
    fn peek_backward(&self, r: ChunkRef, max: usize) -> Vec<u8> {
        let mut collected: Vec<u8> = Vec::new();
        let mut cur = r;
        while collected.len() < max {
            let c = match cur.chunk {
                Some(c) => c,
                None => match self.tail {
                    Some(t) => t,
                    None => break,
                },
            };
            let chunk_start = self.chunks[c].start;
            let pos = if cur.chunk.is_some() {
                cur.offset
            } else {
                self.chunks[c].end
            };
            if pos == chunk_start {
                match self.chunks[c].prev {
                    Some(p) => {
                        cur = ChunkRef::at(p, self.chunks[p].end);
                        continue;
                    }
                    None => break,
                }
            }
            let need = (pos - chunk_start).min(max - collected.len());
            let slice = self.arenas[self.chunks[c].arena].slice(pos - need..pos);
            let mut tmp = slice.to_vec();
            tmp.extend(collected);
            collected = tmp;
            cur = ChunkRef::at(c, pos - need);
        }
        collected
    }

    /// Decodes the unit starting at `r`, or `None` at EOF.
    pub(crate) fn next_unit(&self, r: ChunkRef) -> Option<ContentUnit> {
        let window = self.peek_forward(r, 4);
        if window.is_empty() {
            return None;
        }
        match std::str::from_utf8(&window) {
            Ok(s) => Some(ContentUnit::Char(s.chars().next().unwrap())),
            Err(e) if e.valid_up_to() > 0 => {
                let s = std::str::from_utf8(&window[..e.valid_up_to()]).unwrap();
                Some(ContentUnit::Char(s.chars().next().unwrap()))
            }
            Err(_) => Some(ContentUnit::InvalidByte(window[0])),
        }
    }

    /// Decodes the unit immediately preceding `r`, or `None` at BOF.
    pub(crate) fn prev_unit(&self, r: ChunkRef) -> Option<ContentUnit> {
        let window = self.peek_backward(r, 4);
        if window.is_empty() {
            return None;
        }
        for start in 0..window.len() {
            let candidate = &window[start..];
            if let Ok(s) = std::str::from_utf8(candidate) {
                if let Some(c) = s.chars().next() {
                    if c.len_utf8() == candidate.len() {
                        return Some(ContentUnit::Char(c));
                    }
                }
            }
        }
        Some(ContentUnit::InvalidByte(*window.last().unwrap()))
    }

    /// `doc:char(n, mark, end?)`: advances/retreats `mark` by `n` code
    /// points (bounded by `end` if given), then returns the unit now at
    /// `mark` (or `None` at EOF/BOF). `n == 0` is a pure char-at query.
    pub fn char_move(
        &mut self,
        mark: MarkId,
        n: i64,
        end: Option<MarkId>,
    ) -> crate::error::DocResult<Option<ContentUnit>> {
        self.require_mark(mark)?;
        let bound = match end {
            Some(e) => Some(self.mark_reference(e)?),
            None => None,
        };
        let mut r = self.mark_reference(mark)?;
        if n > 0 {
            for _ in 0..n {
                if let Some(b) = bound {
                    if self.compare_refs(r, b) != Ordering::Less {
                        break;
                    }
                }
                match self.next_unit(r) {
                    Some(u) => r = self.advance_ref(r, u.byte_len()),
                    None => break,
                }
            }
        } else if n < 0 {
            for _ in 0..(-n) {
                if let Some(b) = bound {
                    if self.compare_refs(r, b) != Ordering::Greater {
                        break;
                    }
                }
                match self.prev_unit(r) {
                    Some(u) => r = self.retreat_ref(r, u.byte_len()),
                    None => break,
                }
            }
        }
        self.marks.set_reference(mark, r);
        self.marks.resort_one(&self.chunks, mark);
        Ok(self.next_unit(r))
    }

    /// `doc:byte(n, mark, end?)`: the byte-oriented counterpart of
    /// [`Document::char_move`].
    pub fn byte_move(
        &mut self,
        mark: MarkId,
        n: i64,
        end: Option<MarkId>,
    ) -> crate::error::DocResult<Option<u8>> {
        self.require_mark(mark)?;
        let bound = match end {
            Some(e) => Some(self.mark_reference(e)?),
            None => None,
        };
        let mut r = self.mark_reference(mark)?;
        if n > 0 {
            for _ in 0..n {
                if let Some(b) = bound {
                    if self.compare_refs(r, b) != Ordering::Less {
                        break;
                    }
                }
                if self.byte_at(r).is_none() {
                    break;
                }
                r = self.advance_ref(r, 1);
            }
        } else if n < 0 {
            for _ in 0..(-n) {
                if let Some(b) = bound {
                    if self.compare_refs(r, b) != Ordering::Greater {
                        break;
                    }
                }
                let stepped = self.retreat_ref(r, 1);
                if stepped == r {
                    break;
                }
                r = stepped;
            }
        }
        self.marks.set_reference(mark, r);
        self.marks.resort_one(&self.chunks, mark);
        Ok(self.byte_at(r))
    }

    /// `doc:EOL(n, mark, one_more?)`: moves `mark` across `n` line endings.
    /// Positive `n` walks forward to the `n`th `'\n'`, landing just past it
    /// (the start of the following line); negative `n` walks backward to
    /// the start of the current/previous lines. Returns the number of line
    /// endings actually crossed (fewer than requested at BOF/EOF).
    pub fn eol_move(&mut self, mark: MarkId, n: i64, one_more: bool) -> crate::error::DocResult<i64> {
        self.require_mark(mark)?;
        let mut r = self.mark_reference(mark)?;
        let mut moved = 0i64;
        if n > 0 {
            for _ in 0..n {
                let mut found = false;
                loop {
                    match self.next_unit(r) {
                        None => break,
                        Some(u) => {
                            let len = u.byte_len();
                            r = self.advance_ref(r, len);
                            if u == ContentUnit::Char('\n') {
                                found = true;
                                break;
                            }
                        }
                    }
                }
                if !found {
                    break;
                }
                moved += 1;
            }
            if one_more {
                if let Some(u) = self.next_unit(r) {
                    r = self.advance_ref(r, u.byte_len());
                }
            }
        } else if n < 0 {
            for _ in 0..(-n) {
                let mut found = false;
                loop {
                    match self.prev_unit(r) {
                        None => break,
                        Some(u) => {
                            let len = u.byte_len();
                            let is_nl = u == ContentUnit::Char('\n');
                            r = self.retreat_ref(r, len);
                            if is_nl {
                                found = true;
                                break;
                            }
                        }
                    }
                }
                if !found {
                    break;
                }
                moved -= 1;
            }
        }
        self.marks.set_reference(mark, r);
        self.marks.resort_one(&self.chunks, mark);
        Ok(moved)
    }

    /// `doc:set-ref(mark, to_start)`: anchors `mark` at BOF or EOF.
    pub fn set_ref(&mut self, mark: MarkId, to_start: bool) -> crate::error::DocResult<()> {
        self.require_mark(mark)?;
        let r = if to_start { self.bof_ref() } else { self.eof_ref() };
        self.marks.set_reference(mark, r);
        self.marks.resort_one(&self.chunks, mark);
        Ok(())
    }

    /// Eagerly collects the raw bytes of `[start, end)`.
    pub fn content_bytes(&self, start: ChunkRef, end: ChunkRef) -> Vec<u8> {
        let mut out = Vec::new();
        self.content_bytes_stream(start, Some(end), |b| {
            out.push(b);
            1
        });
        out
    }

    /// Eagerly collects `[start, end)` (or to EOF) as a `String`, using the
    /// same decode-with-fallback rule as [`Document::next_unit`] (invalid
    /// bytes become `U+FFFD`).
    pub fn content(&self, start: ChunkRef, end: Option<ChunkRef>) -> String {
        let mut out = String::new();
        self.content_stream(start, end, |c| {
            out.push(c);
            1
        });
        out
    }

    /// `doc:content-bytes(mark, end?, callback)`: streams raw bytes into
    /// `consumer`, which returns a per-byte continuation hint; a value
    /// `<= 0` truncates the stream early.
    pub fn content_bytes_stream<F: FnMut(u8) -> i32>(
        &self,
        start: ChunkRef,
        end: Option<ChunkRef>,
        mut consumer: F,
    ) {
        let mut r = self.normalize(start);
        loop {
            if let Some(e) = end {
                if self.compare_refs(r, e) != Ordering::Less {
                    break;
                }
            }
            let Some(b) = self.byte_at(r) else { break };
            if consumer(b) <= 0 {
                break;
            }
            r = self.advance_ref(r, 1);
        }
    }

    /// `doc:content`: streams decoded characters into `consumer`, same
    /// truncation contract as [`Document::content_bytes_stream`]. An
    /// [`ContentUnit::InvalidByte`] is surfaced to the consumer as
    /// `U+FFFD`.
    pub fn content_stream<F: FnMut(char) -> i32>(
        &self,
        start: ChunkRef,
        end: Option<ChunkRef>,
        mut consumer: F,
    ) {
        let mut r = self.normalize(start);
        loop {
            if let Some(e) = end {
                if self.compare_refs(r, e) != Ordering::Less {
                    break;
                }
            }
            let Some(unit) = self.next_unit(r) else { break };
            let c = match unit {
                ContentUnit::Char(c) => c,
                ContentUnit::InvalidByte(_) => '\u{FFFD}',
            };
            if consumer(c) <= 0 {
                break;
            }
            r = self.advance_ref(r, unit.byte_len());
        }
    }
}
