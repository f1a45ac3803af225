use memchr::memchr_iter;
use memmap2::MmapOptions;
use std::fs;
use std::io;
use std::path::Path;

/// Byte location of a single line within indexed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    /// Byte offset from the start of the content.
    pub offset: usize,
    /// Length in bytes, excluding the trailing newline.
    pub length: usize,
}

/// Eagerly built index mapping line numbers to byte offsets.
///
/// For files the scan runs over a read-only memory map; for in-memory text
/// it runs over the UTF-8 bytes directly. The index can be patched
/// incrementally after edits instead of rescanning the whole content.
#[derive(Debug, Clone)]
pub struct LineIndexer {
    /// Byte offset where each line starts. Always contains at least `[0]`.
    offsets: Vec<usize>,
    /// Byte length of each line, newline excluded.
    lengths: Vec<usize>,
    total_size: usize,
}

impl Default for LineIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineIndexer {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            lengths: Vec::new(),
            total_size: 0,
        }
    }

    /// Build the index from a file using a read-only memory map.
    ///
    /// An empty file indexes as a single zero-length line. A file ending in a
    /// newline gets one final zero-length line. Open or map failures
    /// propagate and leave the previous index untouched.
    pub fn build_from_file(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = fs::File::open(path.as_ref())?;
        let file_size = file.metadata()?.len() as usize;

        if file_size == 0 {
            self.reset(0);
            self.lengths.push(0);
            return Ok(());
        }

        let mmap = unsafe { MmapOptions::new().map(&file)? };
        self.reset(file_size);
        self.scan(&mmap);
        tracing::debug!(
            path = %path.as_ref().display(),
            lines = self.lengths.len(),
            "built eager line index"
        );
        Ok(())
    }

    /// Build the index from in-memory text.
    pub fn build_from_text(&mut self, text: &str) {
        let bytes = text.as_bytes();
        self.reset(bytes.len());
        if bytes.is_empty() {
            self.lengths.push(0);
            return;
        }
        self.scan(bytes);
    }

    fn reset(&mut self, total_size: usize) {
        self.offsets = vec![0];
        self.lengths = Vec::new();
        self.total_size = total_size;
    }

    fn scan(&mut self, bytes: &[u8]) {
        let size = bytes.len();
        let mut pos = 0;
        for newline_pos in memchr_iter(b'\n', bytes) {
            self.lengths.push(newline_pos - pos);
            pos = newline_pos + 1;
            if pos < size {
                self.offsets.push(pos);
            }
        }
        if pos < size {
            // Last line without a trailing newline
            self.lengths.push(size - pos);
        } else {
            // Content ends with a newline: one final empty line
            self.offsets.push(size);
            self.lengths.push(0);
        }
    }

    /// Total number of indexed lines.
    pub fn line_count(&self) -> usize {
        self.lengths.len()
    }

    /// Total indexed size in bytes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Get offset and length for a line (0-indexed). O(1).
    pub fn get_line_info(&self, line: usize) -> Option<LineInfo> {
        let offset = *self.offsets.get(line)?;
        let length = self.lengths.get(line).copied().unwrap_or(0);
        Some(LineInfo { offset, length })
    }

    /// Map a global byte offset to `(line, byte_offset_within_line)`.
    pub fn line_at_offset(&self, byte_offset: usize) -> (usize, usize) {
        let idx = self
            .offsets
            .partition_point(|&offset| offset <= byte_offset)
            .saturating_sub(1);
        (idx, byte_offset - self.offsets[idx])
    }

    /// Drop all index entries from `line` onward.
    ///
    /// Keeps the start offset of `line` itself so indexing can resume
    /// forward from there.
    pub fn invalidate_from(&mut self, line: usize) {
        if line < self.offsets.len() {
            self.offsets.truncate(line + 1);
            self.lengths.truncate(line);
        }
    }

    /// Extend the index with `count` empty lines appended after the last
    /// line, each preceded by a newline separator.
    pub fn append_empty_lines(&mut self, count: usize) {
        for _ in 0..count {
            self.total_size += 1;
            self.offsets.push(self.total_size);
            self.lengths.push(0);
        }
    }

    /// Patch the index after text was inserted at `(line, col)`.
    ///
    /// `col` is a byte offset within the line. Offsets past the edit shift by
    /// the inserted byte count; a multi-line insert splices new offset and
    /// length entries instead of rebuilding. Out-of-range lines are a no-op.
    pub fn update_after_insert(&mut self, line: usize, col: usize, text: &str) {
        if line >= self.lengths.len() {
            return;
        }

        let byte_delta = text.len();
        for offset in &mut self.offsets[line + 1..] {
            *offset += byte_delta;
        }

        if !text.contains('\n') {
            self.lengths[line] += byte_delta;
        } else {
            let segments: Vec<&str> = text.split('\n').collect();
            let line_start = self.offsets[line];
            let old_length = self.lengths[line];
            let remaining = old_length.saturating_sub(col);

            // New line starts created by the inserted newlines
            let mut new_offsets = Vec::with_capacity(segments.len() - 1);
            let mut cursor = line_start + col;
            for segment in &segments[..segments.len() - 1] {
                cursor += segment.len() + 1;
                new_offsets.push(cursor);
            }

            let mut new_lengths: Vec<usize> = segments[1..segments.len() - 1]
                .iter()
                .map(|segment| segment.len())
                .collect();
            new_lengths.push(segments[segments.len() - 1].len() + remaining);

            self.lengths[line] = col + segments[0].len();
            self.offsets.splice(line + 1..line + 1, new_offsets);
            self.lengths.splice(line + 1..line + 1, new_lengths);
        }

        self.total_size += byte_delta;
    }

    /// Patch the index after a deletion spanning `(start_line, start_col)` to
    /// `(end_line, end_col)`, columns in bytes.
    ///
    /// Deleted whole lines are spliced out and trailing offsets shift back by
    /// the removed byte count. Ranges outside the index are clamped.
    pub fn update_after_delete(
        &mut self,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) {
        if start_line >= self.lengths.len() {
            return;
        }
        let end_line = end_line.min(self.lengths.len() - 1);
        let end_col = end_col.min(self.lengths[end_line]);

        let removed = if start_line == end_line {
            let start_col = start_col.min(end_col);
            self.lengths[start_line] -= end_col - start_col;
            end_col - start_col
        } else {
            let start_col = start_col.min(self.lengths[start_line]);
            let removed =
                (self.offsets[end_line] + end_col) - (self.offsets[start_line] + start_col);
            self.lengths[start_line] = start_col + (self.lengths[end_line] - end_col);
            self.offsets.drain(start_line + 1..=end_line);
            self.lengths.drain(start_line + 1..=end_line);
            removed
        };

        for offset in &mut self.offsets[start_line + 1..] {
            *offset -= removed;
        }
        self.total_size -= removed;
    }
}
