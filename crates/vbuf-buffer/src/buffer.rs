use crate::error::BufferError;
use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use vbuf_index::{LazyLineIndexer, LineIndexer};

/// One logical line inside a [`VirtualBuffer`].
///
/// A line starts out as a `Lazy` reference into the backing file's line
/// table and is swapped for `Loaded` text the first time it is read or
/// edited. The transition is one-way: a line never reverts to lazy while
/// the document is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRef {
    /// Index into the backing file's line table; content not yet read.
    Lazy(usize),
    /// Owned line content, read on demand or produced by an edit.
    Loaded(String),
}

/// Editable text buffer backed by a memory-mapped file.
///
/// Lines are kept as [`LineRef`] entries so only touched lines occupy
/// memory. File-backed buffers start in an identity mapping (`lines` is
/// `None`, logical line i is file line i) which defers even the line-ref
/// vector until the first edit. Columns in the edit API are character
/// offsets; byte offsets appear only in the offset-index plumbing.
#[derive(Debug, Default)]
pub struct VirtualBuffer {
    path: Option<PathBuf>,
    /// Lazy offset index over the backing file. Present only for
    /// file-backed buffers.
    indexer: Option<LazyLineIndexer>,
    /// Eager offset index over in-memory text, patched incrementally as
    /// edits land. Present only for text-backed buffers.
    text_index: Option<LineIndexer>,
    /// `None` means the identity map: line i is file line i, nothing
    /// materialized yet.
    lines: Option<Vec<LineRef>>,
    modified: bool,
}

impl VirtualBuffer {
    /// New empty buffer with a single empty line.
    pub fn new() -> Self {
        Self {
            path: None,
            indexer: None,
            text_index: None,
            lines: Some(vec![LineRef::Loaded(String::new())]),
            modified: false,
        }
    }

    /// Load a file. O(1) for any file size: the offset index is lazy and
    /// the line map stays an identity mapping until the first edit.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), BufferError> {
        let path = path.as_ref().to_path_buf();
        self.close();

        let indexer = LazyLineIndexer::open(&path).map_err(|source| BufferError::File {
            path: path.clone(),
            source,
        })?;

        self.lines = if indexer.file_size() == 0 {
            Some(vec![LineRef::Loaded(String::new())])
        } else {
            None
        };
        self.indexer = Some(indexer);
        self.text_index = None;
        self.path = Some(path);
        self.modified = false;
        Ok(())
    }

    /// Load text directly. All lines are materialized and the buffer is
    /// marked modified since it has no backing file.
    pub fn load_text(&mut self, text: &str) {
        self.close();
        self.indexer = None;
        self.path = None;

        let mut index = LineIndexer::new();
        index.build_from_text(text);
        self.text_index = Some(index);

        self.lines = Some(
            text.split('\n')
                .map(|line| LineRef::Loaded(line.to_string()))
                .collect(),
        );
        self.modified = true;
    }

    /// Release the memory map and file handle.
    ///
    /// Materialized line content survives; lazy references become
    /// unresolvable (read as empty). Normally called right before loading
    /// another file into the same instance.
    pub fn close(&mut self) {
        if let Some(indexer) = self.indexer.as_mut() {
            indexer.close();
        }
        self.indexer = None;
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Exact line count. In identity mode this forces the lazy index to
    /// completion; use [`estimated_total_lines`](Self::estimated_total_lines)
    /// where an approximation is acceptable.
    pub fn total_lines(&mut self) -> usize {
        match self.lines.as_ref() {
            Some(lines) => lines.len(),
            None => match self.indexer.as_mut() {
                Some(indexer) => {
                    indexer.ensure_fully_indexed();
                    indexer.actual_line_count()
                }
                None => 0,
            },
        }
    }

    /// O(1) line count, approximate until the backing file is fully
    /// indexed. Suitable for scrollbar sizing right after open.
    pub fn estimated_total_lines(&self) -> usize {
        match self.lines.as_ref() {
            Some(lines) => lines.len(),
            None => match self.indexer.as_ref() {
                Some(indexer) => indexer.estimated_line_count(),
                None => 0,
            },
        }
    }

    /// Get a line's content. Out of range reads return an empty string.
    ///
    /// Reading a lazy line materializes it in place, so repeated reads of
    /// the same line decode at most once.
    pub fn get_line(&mut self, line: usize) -> String {
        let file_line = match self.lines.as_ref() {
            None => {
                return match self.indexer.as_mut() {
                    Some(indexer) => indexer.get_line(line),
                    None => String::new(),
                };
            }
            Some(lines) => match lines.get(line) {
                Some(LineRef::Loaded(text)) => return text.clone(),
                Some(LineRef::Lazy(index)) => *index,
                None => return String::new(),
            },
        };

        let text = self.read_backing_line(file_line);
        if let Some(lines) = self.lines.as_mut() {
            lines[line] = LineRef::Loaded(text.clone());
        }
        text
    }

    /// Get `count` lines starting at `start`, clamped to the buffer.
    ///
    /// In identity mode this indexes only the requested range, so viewport
    /// reads on a freshly opened large file stay bounded.
    pub fn get_lines(&mut self, start: usize, count: usize) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        if self.lines.is_none() {
            if let Some(indexer) = self.indexer.as_mut() {
                return indexer.get_lines(start, start + count - 1);
            }
            return Vec::new();
        }
        let end = (start + count).min(self.total_lines());
        (start..end).map(|line| self.get_line(line)).collect()
    }

    /// Line length in characters.
    pub fn get_line_length(&mut self, line: usize) -> usize {
        self.get_line(line).chars().count()
    }

    /// Full document content, newline-joined. Forces all lines resident.
    pub fn get_text(&mut self) -> String {
        let total = self.total_lines();
        let mut parts = Vec::with_capacity(total);
        for line in 0..total {
            parts.push(self.get_line(line));
        }
        parts.join("\n")
    }

    /// Text between two (line, char-column) positions, newline-joined.
    /// An inverted range reads as empty, like the rest of the read API.
    pub fn get_text_range(
        &mut self,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> String {
        if end_line < start_line {
            return String::new();
        }
        if start_line == end_line {
            let line = self.get_line(start_line);
            let start = byte_pos(&line, start_col);
            let end = byte_pos(&line, end_col.max(start_col));
            return line[start..end].to_string();
        }

        let mut parts = Vec::with_capacity(end_line - start_line + 1);
        let first = self.get_line(start_line);
        parts.push(first[byte_pos(&first, start_col)..].to_string());
        for line in start_line + 1..end_line {
            parts.push(self.get_line(line));
        }
        let last = self.get_line(end_line);
        parts.push(last[..byte_pos(&last, end_col)].to_string());
        parts.join("\n")
    }

    /// Insert text at a (line, char-column) position.
    ///
    /// Pads the buffer with empty lines if `line` is beyond the end; clamps
    /// `col` to the target line's length. Multi-line text splits the target
    /// line around the insertion point. Returns the cursor position just
    /// after the inserted text.
    pub fn insert(&mut self, line: usize, col: usize, text: &str) -> (usize, usize) {
        self.materialize_line_map();

        let old_len = self.lines.as_ref().map(Vec::len).unwrap_or(0);
        let padded = line >= old_len;
        if padded {
            if let Some(lines) = self.lines.as_mut() {
                lines.resize(line + 1, LineRef::Loaded(String::new()));
            }
        }

        let current = self.get_line(line);
        let col = col.min(current.chars().count());
        let split = byte_pos(&current, col);
        let (before, after) = current.split_at(split);

        let segments: Vec<&str> = text.split('\n').collect();
        let (end_line, end_col);
        if segments.len() == 1 {
            let merged = format!("{before}{text}{after}");
            if let Some(lines) = self.lines.as_mut() {
                lines[line] = LineRef::Loaded(merged);
            }
            end_line = line;
            end_col = col + text.chars().count();
        } else {
            let last = segments[segments.len() - 1];
            let mut new_refs = Vec::with_capacity(segments.len());
            new_refs.push(LineRef::Loaded(format!("{}{}", before, segments[0])));
            for segment in &segments[1..segments.len() - 1] {
                new_refs.push(LineRef::Loaded((*segment).to_string()));
            }
            new_refs.push(LineRef::Loaded(format!("{last}{after}")));

            end_line = line + segments.len() - 1;
            end_col = last.chars().count();
            if let Some(lines) = self.lines.as_mut() {
                lines.splice(line..=line, new_refs);
            }
        }

        if let Some(index) = self.text_index.as_mut() {
            if padded {
                // Padding appended `line - old_len + 1` empty lines, so the
                // index extends exactly before the normal patch applies
                index.append_empty_lines(line - old_len + 1);
            }
            index.update_after_insert(line, split, text);
        }

        self.modified = true;
        (end_line, end_col)
    }

    /// Delete a (line, char-column) range, clamping out-of-range bounds.
    /// Returns the deleted text, as needed by undo.
    pub fn delete(
        &mut self,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> String {
        self.materialize_line_map();
        let total = self.lines.as_ref().map(Vec::len).unwrap_or(0);
        if total == 0 {
            return String::new();
        }

        let start_line = start_line.min(total - 1);
        let end_line = end_line.min(total - 1);
        let start_text = self.get_line(start_line);
        let end_text = self.get_line(end_line);
        let start_col = start_col.min(start_text.chars().count());
        let end_col = end_col.min(end_text.chars().count());

        if start_line > end_line || (start_line == end_line && start_col >= end_col) {
            return String::new();
        }

        let deleted = self.get_text_range(start_line, start_col, end_line, end_col);
        let start_byte = byte_pos(&start_text, start_col);
        let end_byte = byte_pos(&end_text, end_col);

        let merged = if start_line == end_line {
            format!("{}{}", &start_text[..start_byte], &start_text[end_byte..])
        } else {
            format!("{}{}", &start_text[..start_byte], &end_text[end_byte..])
        };
        if let Some(lines) = self.lines.as_mut() {
            lines[start_line] = LineRef::Loaded(merged);
            if end_line > start_line {
                lines.drain(start_line + 1..=end_line);
            }
        }

        if let Some(index) = self.text_index.as_mut() {
            index.update_after_delete(start_line, start_byte, end_line, end_byte);
        }

        self.modified = true;
        deleted
    }

    /// Strict variant of [`delete`](Self::delete): rejects ranges outside
    /// the document instead of silently clamping them.
    pub fn try_delete(
        &mut self,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Result<String, BufferError> {
        let total = self.total_lines();
        if start_line >= total || end_line >= total {
            return Err(BufferError::LineOutOfRange {
                line: start_line.max(end_line),
                len: total,
            });
        }
        let range_err = BufferError::InvalidRange {
            start_line,
            start_col,
            end_line,
            end_col,
        };
        if start_line > end_line || (start_line == end_line && start_col > end_col) {
            return Err(range_err);
        }
        if start_col > self.get_line_length(start_line) || end_col > self.get_line_length(end_line)
        {
            return Err(range_err);
        }
        Ok(self.delete(start_line, start_col, end_line, end_col))
    }

    /// Delete a range, then insert `text` at its start. Returns the
    /// deleted text and the cursor position after the inserted text.
    pub fn replace(
        &mut self,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
        text: &str,
    ) -> (String, usize, usize) {
        let deleted = self.delete(start_line, start_col, end_line, end_col);
        let (new_end_line, new_end_col) = self.insert(start_line, start_col, text);
        (deleted, new_end_line, new_end_col)
    }

    /// Save to `path`, or to the buffer's own path when `None`.
    ///
    /// Streams line by line into a sibling temp file and renames it over
    /// the target, so a partially written file never replaces the original
    /// and the still-mapped backing file is never truncated mid-read. On
    /// success the just-saved file is reloaded, re-lazifying every line and
    /// releasing the materialized copies.
    pub fn save_to_file(&mut self, path: Option<&Path>) -> Result<(), BufferError> {
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.path.clone().ok_or(BufferError::NoPath)?,
        };
        let total = self.total_lines();

        let mut tmp_name = OsString::from(target.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        if let Err(err) = self.stream_lines_to(&tmp_path, total) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        if let Err(source) = fs::rename(&tmp_path, &target) {
            let _ = fs::remove_file(&tmp_path);
            return Err(BufferError::File {
                path: target,
                source,
            });
        }
        tracing::debug!(path = %target.display(), lines = total, "saved buffer");

        self.load_file(&target)
    }

    fn stream_lines_to(&mut self, path: &Path, total: usize) -> Result<(), BufferError> {
        let file = fs::File::create(path).map_err(|source| BufferError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        for line in 0..total {
            if line > 0 {
                writer.write_all(b"\n")?;
            }
            let text = self.resolve_for_save(line);
            writer.write_all(text.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Map a byte offset in the backing content to (line, byte offset
    /// within that line).
    ///
    /// Text-backed buffers keep their index patched through edits, so the
    /// answer tracks the current content. For file-backed buffers the
    /// offsets describe the on-disk file and go stale once edits land;
    /// they refresh when the buffer is saved and reloaded.
    pub fn line_at_offset(&mut self, byte_offset: usize) -> (usize, usize) {
        if let Some(index) = self.text_index.as_ref() {
            return index.line_at_offset(byte_offset);
        }
        if let Some(indexer) = self.indexer.as_mut() {
            let line = indexer.line_for_byte_offset(byte_offset);
            let start = indexer.byte_offset_for_line(line);
            return (line, byte_offset.saturating_sub(start));
        }
        (0, 0)
    }

    /// Byte offset where a line starts in the backing content. Same
    /// staleness rule as [`line_at_offset`](Self::line_at_offset): stale
    /// for file-backed buffers after edits, current for text-backed ones.
    pub fn byte_offset_for_line(&mut self, line: usize) -> usize {
        if let Some(index) = self.text_index.as_ref() {
            return index
                .get_line_info(line)
                .map(|info| info.offset)
                .unwrap_or_else(|| index.total_size());
        }
        match self.indexer.as_mut() {
            Some(indexer) => indexer.byte_offset_for_line(line),
            None => 0,
        }
    }

    /// Begin cooperative background indexing of the backing file. No-op
    /// for text-backed buffers.
    pub fn start_background_indexing(&mut self, progress: impl FnMut(f64) + 'static) {
        if let Some(indexer) = self.indexer.as_mut() {
            indexer.start_background_indexing(progress);
        }
    }

    /// Run one bounded indexing step; returns true while work remains.
    pub fn background_step(&mut self) -> bool {
        match self.indexer.as_mut() {
            Some(indexer) => indexer.background_step(),
            None => false,
        }
    }

    pub fn stop_background_indexing(&mut self) {
        if let Some(indexer) = self.indexer.as_mut() {
            indexer.stop_background_indexing();
        }
    }

    /// Callback fired once when background indexing completes.
    pub fn set_on_index_complete(&mut self, callback: impl FnMut() + 'static) {
        if let Some(indexer) = self.indexer.as_mut() {
            indexer.set_on_index_complete(callback);
        }
    }

    /// Replace the identity map with an explicit line-ref vector. Needed
    /// before any edit; requires the exact line count, so the lazy index
    /// is driven to completion first.
    fn materialize_line_map(&mut self) {
        if self.lines.is_some() {
            return;
        }
        let count = match self.indexer.as_mut() {
            Some(indexer) => {
                indexer.ensure_fully_indexed();
                indexer.actual_line_count()
            }
            None => 1,
        };
        self.lines = Some((0..count).map(LineRef::Lazy).collect());
    }

    /// Resolve a file line through the lazy index. Only valid while the
    /// map is open; after `close` this reads as empty.
    fn read_backing_line(&mut self, file_line: usize) -> String {
        match self.indexer.as_mut() {
            Some(indexer) => indexer.get_line(file_line),
            None => String::new(),
        }
    }

    /// Line content for streaming writes: reads lazy lines without
    /// memoizing them, so saving a huge mostly-unedited file does not
    /// materialize every line.
    fn resolve_for_save(&mut self, line: usize) -> String {
        let file_line = match self.lines.as_ref() {
            None => line,
            Some(lines) => match lines.get(line) {
                Some(LineRef::Loaded(text)) => return text.clone(),
                Some(LineRef::Lazy(index)) => *index,
                None => return String::new(),
            },
        };
        self.read_backing_line(file_line)
    }
}

/// Byte index of character column `col` in `s`; clamps past-the-end
/// columns to the string's byte length.
fn byte_pos(s: &str, col: usize) -> usize {
    s.char_indices().nth(col).map(|(i, _)| i).unwrap_or(s.len())
}
