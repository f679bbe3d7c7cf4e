//! Load/save, autosave, and file-change detection.

use super::{Document, MarkRefArg, StatSnapshot};
use crate::error::DocResult;
use crate::mark::ChunkRef;
use crate::notify::Event;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of [`Document::load_file`] / [`Document::revisit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Unchanged,
}

fn stat_snapshot(meta: &std::fs::Metadata) -> StatSnapshot {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino(), meta.mtime())
}

fn shadow_path_for(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("doc");
    path.with_file_name(format!("#{name}#"))
}

impl Document {
    /// `doc:load-file(fd, path, flags)`. `keep_if_unchanged` skips the
    /// reload (returning [`LoadOutcome::Unchanged`]) when the file's stat
    /// still matches the last-known snapshot and the buffer hasn't been
    /// flagged changed out from under it. `reload_from_autosave` reads the
    /// `#basename#` shadow instead of `path` if one is recorded.
    /// `open_new` skips capturing a fresh stat snapshot (used when the
    /// document is being associated with a path that doesn't exist yet).
    pub fn load_file(
        &mut self,
        path: &Path,
        keep_if_unchanged: bool,
        reload_from_autosave: bool,
        open_new: bool,
    ) -> DocResult<LoadOutcome> {
        self.check_readonly()?;
        if keep_if_unchanged {
            if let Ok(meta) = std::fs::metadata(path) {
                let found = stat_snapshot(&meta);
                if Some(found) == self.last_stat && !self.file_changed {
                    return Ok(LoadOutcome::Unchanged);
                }
            }
        }

        let read_path = if reload_from_autosave {
            self.autosave.shadow_path.clone().unwrap_or_else(|| path.to_path_buf())
        } else {
            path.to_path_buf()
        };
        let bytes = std::fs::read(&read_path)?;

        tracing::debug!(path = %path.display(), len = bytes.len(), "loading file into document");

        if !self.is_empty() {
            let bof = self.bof_ref();
            let eof = self.eof_ref();
            self.delete_range(bof, eof, true)?;
        }
        self.insert_at(MarkRefArg::Eof, &bytes, true)?;

        if !open_new {
            let meta = std::fs::metadata(path)?;
            self.last_stat = Some(stat_snapshot(&meta));
        }
        self.file_path = Some(path.to_path_buf());
        self.file_changed = false;
        self.undo.mark_saved();
        self.clear_modified_override();
        self.publish(Event::StatusChanged);
        Ok(LoadOutcome::Loaded)
    }

    /// `doc:insert-file(fd, mark)`.
    pub fn insert_file(&mut self, path: &Path, at: MarkRefArg) -> DocResult<()> {
        let bytes = std::fs::read(path)?;
        self.insert_at(at, &bytes, true)?;
        Ok(())
    }

    /// `doc:save-file`: persists the whole document to its associated file
    /// path.
    pub fn save_file(&mut self) -> DocResult<()> {
        let path = self
            .file_path
            .clone()
            .ok_or(crate::error::DocError::MissingArgument("file path"))?;
        let bof = self.bof_ref();
        let eof = self.eof_ref();
        self.write_to_path(&path, bof, eof)
    }

    /// `doc:write-file(str or fd, mark1?, mark2?)`: persists `[from, to)`
    /// (or the whole document) to `path`, regardless of the document's own
    /// associated file.
    pub fn write_file(&mut self, path: &Path, from: Option<ChunkRef>, to: Option<ChunkRef>) -> DocResult<()> {
        let from = from.unwrap_or_else(|| self.bof_ref());
        let to = to.unwrap_or_else(|| self.eof_ref());
        self.write_to_path(path, from, to)
    }

    fn write_to_path(&mut self, path: &Path, from: ChunkRef, to: ChunkRef) -> DocResult<()> {
        if let Some(expected) = self.last_stat {
            if let Ok(meta) = std::fs::metadata(path) {
                let found = stat_snapshot(&meta);
                if found != expected {
                    tracing::warn!(path = %path.display(), "file changed on disk since last read; backing up before overwrite");
                    self.backup_existing_file(path)?;
                }
            }
        }

        let bytes = self.content_bytes(from, to);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let tmp_name = format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("doc")
        );
        let tmp_path = dir.join(tmp_name);
        {
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved document");

        let meta = std::fs::metadata(path)?;
        self.last_stat = Some(stat_snapshot(&meta));
        self.file_path = Some(path.to_path_buf());
        self.undo.mark_saved();
        self.clear_modified_override();
        self.file_changed = false;
        self.clear_autosave_shadow();
        self.publish(Event::StatusChanged);
        Ok(())
    }

    /// Copies `path` to the next free `name~N~` backup slot, starting at
    /// `N = 1` and never overwriting an existing backup (a resolved Open
    /// Question per DESIGN.md).
    fn backup_existing_file(&self, path: &Path) -> DocResult<()> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("doc");
        let mut n = 1u32;
        loop {
            let candidate = path.with_file_name(format!("{name}~{n}~"));
            if !candidate.exists() {
                std::fs::copy(path, &candidate)?;
                return Ok(());
            }
            n += 1;
        }
    }

    /// Re-stats the document's associated file. If it has changed and the
    /// document is unmodified, reloads automatically.
    pub fn revisit(&mut self) -> DocResult<LoadOutcome> {
        let Some(path) = self.file_path.clone() else {
            return Ok(LoadOutcome::Unchanged);
        };
        let meta = std::fs::metadata(&path)?;
        let found = stat_snapshot(&meta);
        if Some(found) == self.last_stat {
            return Ok(LoadOutcome::Unchanged);
        }
        self.file_changed = true;
        self.publish(Event::StatusChanged);
        if !self.is_modified() {
            return self.load_file(&path, false, false, false);
        }
        Ok(LoadOutcome::Unchanged)
    }

    /// Marks that an edit happened, for the autosave idle/count triggers.
    pub(crate) fn note_edit_for_autosave(&mut self) {
        self.autosave.edits_since_flush += 1;
        self.autosave.last_edit_at = Some(Instant::now());
    }

    /// `event:timer` hook: flushes the autosave shadow if the edit-count or
    /// idle-time threshold has been crossed since the last flush. Returns
    /// whether a flush happened.
    pub fn autosave_tick(&mut self) -> DocResult<bool> {
        let due_by_count = self.autosave.edits_since_flush >= self.config.autosave_edit_threshold;
        let due_by_idle = self
            .autosave
            .last_edit_at
            .map(|t| t.elapsed() >= self.config.autosave_idle)
            .unwrap_or(false);
        if !self.is_modified() || !(due_by_count || due_by_idle) {
            return Ok(false);
        }
        self.flush_autosave()?;
        Ok(true)
    }

    fn flush_autosave(&mut self) -> DocResult<()> {
        let Some(path) = self.file_path.clone() else {
            return Ok(());
        };
        let shadow = shadow_path_for(&path);
        let bytes = self.content_bytes(self.bof_ref(), self.eof_ref());
        std::fs::write(&shadow, &bytes)?;
        tracing::debug!(shadow = %shadow.display(), "autosave flush");
        self.autosave.shadow_path = Some(shadow.clone());
        self.register_autosave_index(&path)?;
        self.autosave.edits_since_flush = 0;
        self.autosave.last_edit_at = None;
        Ok(())
    }

    /// Records this document's autosave coverage under
    /// [`crate::config::DocConfig::autosave_index_dir`] as a small
    /// integer-named symlink pointing at `target_path`, reusing the same
    /// slot across flushes.
    fn register_autosave_index(&mut self, target_path: &Path) -> DocResult<()> {
        let Some(dir) = self.config.autosave_index_dir.clone() else {
            return Ok(());
        };
        std::fs::create_dir_all(&dir)?;
        let slot = match self.autosave.index_slot {
            Some(s) => s,
            None => {
                let s = next_free_slot(&dir)?;
                self.autosave.index_slot = Some(s);
                s
            }
        };
        let link_path = dir.join(slot.to_string());
        if link_path.symlink_metadata().is_ok() {
            std::fs::remove_file(&link_path)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(target_path, &link_path)?;
        Ok(())
    }

    /// Removes the `#basename#` shadow and its autosave index entry after
    /// a successful save.
    fn clear_autosave_shadow(&mut self) {
        if let Some(shadow) = self.autosave.shadow_path.take() {
            let _ = std::fs::remove_file(&shadow);
        }
        if let (Some(dir), Some(slot)) = (
            self.config.autosave_index_dir.clone(),
            self.autosave.index_slot.take(),
        ) {
            let _ = std::fs::remove_file(dir.join(slot.to_string()));
        }
    }
}

fn next_free_slot(dir: &Path) -> DocResult<u32> {
    let mut n = 0u32;
    loop {
        if !dir.join(n.to_string()).exists() {
            return Ok(n);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocConfig;
    use crate::document::Document;

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn save_then_load_round_trips_content() {
        let dir = tempdir();
        let path = dir.path().join("foo.txt");
        let mut doc = Document::with_default_config();
        doc.insert_at(MarkRefArg::Eof, b"hello\n", true).unwrap();
        doc.file_path = Some(path.clone());
        doc.save_file().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello\n");
        assert!(!doc.is_modified());

        let mut doc2 = Document::with_default_config();
        doc2.load_file(&path, false, false, false).unwrap();
        assert_eq!(doc2.content(doc2.bof_ref(), None), "hello\n");
        assert!(!doc2.is_modified());
    }

    #[test]
    fn save_backs_up_file_that_changed_on_disk_since_last_read() {
        let dir = tempdir();
        let path = dir.path().join("bar.txt");
        std::fs::write(&path, b"old content").unwrap();

        let mut doc = Document::with_default_config();
        doc.load_file(&path, false, false, false).unwrap();
        doc.delete_range(doc.bof_ref(), doc.eof_ref(), true).unwrap();
        doc.insert_at(MarkRefArg::Eof, b"new content", true).unwrap();

        // Simulate an external modification changing mtime/inode without
        // going through this handle.
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"externally changed").unwrap();

        doc.save_file().unwrap();

        let backup = dir.path().join("bar.txt~1~");
        assert_eq!(std::fs::read(&backup).unwrap(), b"externally changed");
        assert_eq!(std::fs::read(&path).unwrap(), b"new content");
    }

    #[test]
    fn autosave_flush_writes_shadow_file() {
        let dir = tempdir();
        let path = dir.path().join("foo.txt");
        std::fs::write(&path, b"initial").unwrap();

        let mut doc = Document::with_default_config();
        doc.config.autosave_index_dir = Some(dir.path().join(".autosave_index"));
        doc.load_file(&path, false, false, false).unwrap();
        doc.insert_at(MarkRefArg::Eof, b" more", true).unwrap();
        doc.note_edit_for_autosave();
        doc.autosave.last_edit_at = Some(Instant::now() - doc.config.autosave_idle);

        assert!(doc.autosave_tick().unwrap());
        let shadow = dir.path().join("#foo.txt#");
        assert_eq!(std::fs::read(&shadow).unwrap(), b"initial more");

        doc.save_file().unwrap();
        assert!(!shadow.exists());
    }
}
