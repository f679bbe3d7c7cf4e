//! View lifecycle, `vmark-get`, and the recent-points stack: `doc:add-view`,
//! `doc:del-view`, `doc:vmark-get`, `doc:push-point`, `doc:pop-point`.

use super::{Document, MarkRefArg, ObserverId, RecentPoint};
use crate::error::{DocError, DocResult, InvalidArgument};
use crate::mark::{ChunkRef, MarkGroup, MarkId, ViewId};
use std::cmp::Ordering;

/// Which member of a view `doc:vmark-get` should return, or a request to
/// create a new one.
#[derive(Debug, Clone, Copy)]
pub enum VMarkQuery {
    First,
    Last,
    /// The last member at or before the given position.
    AtOrBefore(ChunkRef),
    /// Allocate a brand-new mark in the view at the given position.
    New(ChunkRef),
}

impl Document {
    /// `doc:add-view()`: allocates a view slot owned by `owner`.
    pub fn add_view(&mut self, owner: ObserverId) -> ViewId {
        self.marks.add_view(owner)
    }

    /// `doc:del-view(i)`: frees every mark in view `i` and the slot itself.
    /// Errors if `i` does not name a live view, or if `owner` is not the
    /// view's creator.
    pub fn del_view(&mut self, i: ViewId, owner: ObserverId) -> DocResult<()> {
        if !self.marks.view_is_live(i) {
            return Err(DocError::InvalidArgument(InvalidArgument::ViewIndexOutOfRange(i)));
        }
        if self.marks.view_owner(i) != Some(owner) {
            return Err(DocError::InvalidArgument(InvalidArgument::NotViewOwner));
        }
        self.marks.del_view(i, owner);
        Ok(())
    }

    /// `doc:vmark-get(view, mark?, mode)`.
    pub fn vmark_get(&mut self, view: ViewId, query: VMarkQuery) -> DocResult<Option<MarkId>> {
        if !self.marks.view_is_live(view) {
            return Err(DocError::InvalidArgument(InvalidArgument::ViewIndexOutOfRange(view)));
        }
        Ok(match query {
            VMarkQuery::First => self.marks.view_members(view).first().copied(),
            VMarkQuery::Last => self.marks.view_members(view).last().copied(),
            VMarkQuery::AtOrBefore(r) => {
                let members = self.marks.view_members(view).to_vec();
                members.into_iter().rev().find(|&m| {
                    let mr = self.marks.get(m).unwrap().reference;
                    self.compare_refs(mr, r) != Ordering::Greater
                })
            }
            VMarkQuery::New(r) => {
                let normalized = self.normalize(r);
                Some(self.marks.mark_new(&self.chunks, normalized, MarkGroup::View(view)))
            }
        })
    }

    /// `doc:push-point(mark)`: records `mark`'s current position on the
    /// recent-points stack, evicting the oldest entry past
    /// [`crate::config::DocConfig::recent_points_depth`].
    pub fn push_point(&mut self, mark: MarkId) -> DocResult<()> {
        let reference = self.mark_reference(mark)?;
        self.recent_points.push(RecentPoint { reference });
        if self.recent_points.len() > self.config.recent_points_depth {
            self.recent_points.remove(0);
        }
        Ok(())
    }

    /// `doc:pop-point(mark)`: moves `mark` to the most recently pushed
    /// position and removes it from the stack. Returns `false` if the
    /// stack was empty.
    pub fn pop_point(&mut self, mark: MarkId) -> DocResult<bool> {
        self.require_mark(mark)?;
        match self.recent_points.pop() {
            Some(p) => {
                self.marks.set_reference(mark, p.reference);
                self.marks.resort_one(&self.chunks, mark);
                Ok(true)
            }
            None => Ok(false),
        }
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

    #[test]
    fn del_view_rejects_wrong_owner() {
        let mut doc = doc_with("hello");
        let v = doc.add_view(1);
        assert!(doc.del_view(v, 2).is_err());
        assert!(doc.del_view(v, 1).is_ok());
    }

    #[test]
    fn vmark_get_first_and_last() {
        let mut doc = doc_with("abcdef");
        let v = doc.add_view(1);
        let r0 = doc.ref_at_byte(0);
        let r3 = doc.ref_at_byte(3);
        let first = doc.vmark_get(v, VMarkQuery::New(r0)).unwrap().unwrap();
        let last = doc.vmark_get(v, VMarkQuery::New(r3)).unwrap().unwrap();
        assert_eq!(doc.vmark_get(v, VMarkQuery::First).unwrap(), Some(first));
        assert_eq!(doc.vmark_get(v, VMarkQuery::Last).unwrap(), Some(last));
    }

    #[test]
    fn push_pop_point_round_trips() {
        let mut doc = doc_with("hello world");
        let m = doc.mark_new(doc.ref_at_byte(3).into(), MarkGroup::Ungrouped).unwrap();
        doc.push_point(m).unwrap();
        doc.set_ref(m, false).unwrap();
        assert!(doc.pop_point(m).unwrap());
        assert_eq!(doc.mark_reference(m).unwrap(), doc.ref_at_byte(3));
    }

    #[test]
    fn recent_points_stack_evicts_oldest_past_depth() {
        let mut doc = doc_with("0123456789");
        let m = doc.mark_new(doc.bof_ref().into(), MarkGroup::Ungrouped).unwrap();
        let depth = doc.config.recent_points_depth;
        for i in 0..depth + 3 {
            doc.marks.set_reference(m, doc.ref_at_byte(i % 10));
            doc.push_point(m).unwrap();
        }
        assert_eq!(doc.recent_points.len(), depth);
    }
}
