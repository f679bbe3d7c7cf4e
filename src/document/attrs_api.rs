//! `doc:set-attr` / `doc:get-attr`, including the built-in read-only keys.

use super::Document;
use crate::error::{DocError, DocResult, InvalidArgument};
use crate::mark::{ChunkRef, MarkId};
use std::cmp::Ordering;

impl Document {
    /// `doc:set-attr(mark, key, val, mark2?)`: without `mark2`, sets `key`
    /// on the chunk at the byte immediately following `mark`. With `mark2`,
    /// clears `key` over `[mark, mark2)` instead.
    pub fn set_attr(
        &mut self,
        mark: MarkId,
        key: &str,
        value: &str,
        mark2: Option<MarkId>,
    ) -> DocResult<()> {
        self.check_readonly()?;
        let r1 = self.mark_reference(mark)?;
        match mark2 {
            Some(m2) => {
                let r2 = self.mark_reference(m2)?;
                if self.compare_refs(r1, r2) == Ordering::Greater {
                    return Err(DocError::InvalidArgument(InvalidArgument::RangeReversed));
                }
                self.clear_attr_range(key, r1, r2);
            }
            None => {
                if let Some(c) = r1.chunk {
                    let chunk_start = self.chunks[c].start;
                    let off = r1.offset + 1 - chunk_start;
                    self.chunks[c].attrs.set(off, key, value);
                }
            }
        }
        self.publish(crate::notify::Event::ReplacedAttr {
            mark1: mark,
            mark2: mark2.unwrap_or(mark),
        });
        Ok(())
    }

    fn clear_attr_range(&mut self, key: &str, from: ChunkRef, to: ChunkRef) {
        let mut cur = from.chunk;
        while let Some(c) = cur {
            if self.compare_refs(ChunkRef::at(c, self.chunks[c].start), to) != Ordering::Less {
                break;
            }
            let chunk_start = self.chunks[c].start;
            let lo = if Some(c) == from.chunk {
                from.offset - chunk_start
            } else {
                0
            };
            let hi = if Some(c) == to.chunk {
                to.offset.saturating_sub(chunk_start)
            } else {
                self.chunks[c].len()
            };
            self.chunks[c].attrs.clear_range(key, lo, hi);
            if Some(c) == to.chunk {
                break;
            }
            cur = self.chunks[c].next;
        }
    }

    /// `doc:get-attr(mark, key, include_prefix_all?)`: reads a built-in
    /// document attribute if `key` names one, else the chunk attribute
    /// active at `mark`'s position. With `include_prefix_all`, also matches
    /// a chunk attribute whose key starts with `key` when no exact key is
    /// set (used by callers probing a namespaced family of attributes).
    pub fn get_attr(&self, mark: MarkId, key: &str, include_prefix_all: bool) -> DocResult<Option<String>> {
        if let Some(v) = self.builtin_attr(key) {
            return Ok(Some(v));
        }
        let r = self.mark_reference(mark)?;
        let Some(c) = r.chunk else {
            return Ok(self.attrs.get(key).cloned());
        };
        let off = r.offset - self.chunks[c].start;
        if let Some(v) = self.chunks[c].attrs.get(off, key) {
            return Ok(Some(v.to_string()));
        }
        if include_prefix_all {
            if let Some(v) = self.chunks[c]
                .attrs
                .iter()
                .rev()
                .find(|t| t.offset <= off && t.key.starts_with(key))
            {
                return Ok(Some(v.value.clone()));
            }
        }
        Ok(None)
    }

    fn builtin_attr(&self, key: &str) -> Option<String> {
        match key {
            "doc-name" => Some(
                self.doc_attr("doc-name")
                    .map(str::to_string)
                    .or_else(|| self.file_path.as_ref().map(|p| p.display().to_string()))
                    .unwrap_or_else(|| "*scratch*".to_string()),
            ),
            "doc-modified" => Some(self.is_modified().to_string()),
            "doc-readonly" => Some(self.readonly.to_string()),
            "doc-file-changed" => Some(self.file_changed.to_string()),
            "filename" => self.file_path.as_ref().map(|p| p.display().to_string()),
            "dirname" => self
                .file_path
                .as_ref()
                .and_then(|p| p.parent())
                .map(|p| p.display().to_string()),
            "is_backup" => Some(false.to_string()),
            "base-name" => self
                .file_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            "autosave-exists" => Some(self.autosave.shadow_path.is_some().to_string()),
            "autosave-name" => self
                .autosave
                .shadow_path
                .as_ref()
                .map(|p| p.display().to_string()),
            "doc:charset" => Some(self.doc_attr("doc:charset").unwrap_or("utf-8").to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocConfig;
    use crate::document::{Document, MarkRefArg};
    use crate::mark::MarkGroup;

    fn doc_with(text: &str) -> Document {
        let mut doc = Document::new(&DocConfig::default());
        doc.insert_at(MarkRefArg::Eof, text.as_bytes(), true).unwrap();
        doc
    }

    #[test]
    fn set_attr_applies_after_the_mark() {
        let mut doc = doc_with("hello");
        let m = doc.mark_new(doc.ref_at_byte(1).into(), MarkGroup::Ungrouped).unwrap();
        doc.set_attr(m, "face", "bold", None).unwrap();
        let at_mark = doc.mark_new(doc.ref_at_byte(1).into(), MarkGroup::Ungrouped).unwrap();
        assert_eq!(doc.get_attr(at_mark, "face", false).unwrap(), None);
        let past = doc.mark_new(doc.ref_at_byte(2).into(), MarkGroup::Ungrouped).unwrap();
        assert_eq!(doc.get_attr(past, "face", false).unwrap(), Some("bold".to_string()));
    }

    #[test]
    fn set_attr_with_range_clears_key() {
        let mut doc = doc_with("hello world");
        let m0 = doc.mark_new(doc.bof_ref().into(), MarkGroup::Ungrouped).unwrap();
        doc.set_attr(m0, "face", "bold", None).unwrap();
        let from = doc.mark_new(doc.bof_ref().into(), MarkGroup::Ungrouped).unwrap();
        let to = doc.mark_new(doc.ref_at_byte(5).into(), MarkGroup::Ungrouped).unwrap();
        doc.set_attr(from, "face", "", Some(to)).unwrap();
        assert_eq!(doc.get_attr(m0, "face", false).unwrap(), None);
    }

    #[test]
    fn builtin_attrs_report_document_status() {
        let mut doc = doc_with("x");
        let m = doc.mark_new(doc.bof_ref().into(), MarkGroup::Ungrouped).unwrap();
        assert_eq!(doc.get_attr(m, "doc-modified", false).unwrap(), Some("true".to_string()));
        assert_eq!(doc.get_attr(m, "doc-readonly", false).unwrap(), Some("false".to_string()));
        assert_eq!(doc.get_attr(m, "doc:charset", false).unwrap(), Some("utf-8".to_string()));
    }
}
