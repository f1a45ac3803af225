use memchr::{memchr, memchr_iter};
use memmap2::{Mmap, MmapOptions};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Average bytes per line, used to estimate the line count before any
/// scanning has happened.
const AVG_LINE_LENGTH: usize = 45;

/// Byte budget per foreground indexing chunk.
const FOREGROUND_CHUNK: usize = 1024 * 1024;

/// Byte budget per background indexing step.
const BACKGROUND_CHUNK: usize = 512 * 1024;

/// Extra lines indexed beyond a requested range, to amortize repeated calls
/// while scrolling.
const OVERSCAN_LINES: usize = 100;

type ProgressCallback = Box<dyn FnMut(f64)>;
type CompletionCallback = Box<dyn FnMut()>;

/// Memory-mapped file with lazy line indexing.
///
/// Opening is O(1): the file is mapped and the line count estimated from the
/// file size. Line offsets are discovered on demand as callers request
/// ranges, or progressively via cooperative background steps driven by the
/// caller's event loop. `fully_indexed` transitions false to true exactly
/// once; partial indexes are always valid for the prefix they cover.
pub struct LazyLineIndexer {
    path: PathBuf,
    file_size: usize,
    mmap: Option<Mmap>,
    /// Byte offset where each discovered line starts. Starts as `[0]`.
    indexed_offsets: Vec<usize>,
    /// Byte offset up to which scanning has progressed.
    scan_pos: usize,
    fully_indexed: bool,
    estimated_lines: usize,
    background_active: bool,
    progress_callback: Option<ProgressCallback>,
    on_index_complete: Option<CompletionCallback>,
}

impl fmt::Debug for LazyLineIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLineIndexer")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("indexed_lines", &self.indexed_offsets.len())
            .field("scan_pos", &self.scan_pos)
            .field("fully_indexed", &self.fully_indexed)
            .finish()
    }
}

impl LazyLineIndexer {
    /// Open a file for lazy indexing. O(1): maps the file, scans nothing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        let file_size = file.metadata()?.len() as usize;
        let mmap = if file_size > 0 {
            Some(unsafe { MmapOptions::new().map(&file)? })
        } else {
            None
        };
        tracing::debug!(path = %path.display(), size = file_size, "opened lazy index");

        Ok(Self {
            path,
            file_size,
            mmap,
            indexed_offsets: vec![0],
            scan_pos: 0,
            fully_indexed: file_size == 0,
            estimated_lines: (file_size / AVG_LINE_LENGTH).max(1),
            background_active: false,
            progress_callback: None,
            on_index_complete: None,
        })
    }

    /// Stop background work and release the memory map.
    ///
    /// The partial index stays valid for lookups that do not need the map.
    pub fn close(&mut self) {
        self.stop_background_indexing();
        self.mmap = None;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes, fixed at open time.
    pub fn file_size(&self) -> usize {
        self.file_size
    }

    pub fn is_fully_indexed(&self) -> bool {
        self.fully_indexed
    }

    /// Estimated total line count. O(1); exact once fully indexed and
    /// never below the number of lines already discovered.
    pub fn estimated_line_count(&self) -> usize {
        if self.fully_indexed {
            self.indexed_offsets.len()
        } else {
            self.estimated_lines.max(self.indexed_offsets.len())
        }
    }

    /// Number of lines discovered so far. Grows toward the true total as
    /// indexing proceeds; exact only once fully indexed.
    pub fn actual_line_count(&self) -> usize {
        self.indexed_offsets.len()
    }

    /// Make sure lines `start..=end` are indexed, plus a small overscan.
    ///
    /// Scans forward from the current cursor in bounded chunks; stops as soon
    /// as the range is covered or the end of file is reached.
    pub fn ensure_lines_indexed(&mut self, _start: usize, end: usize) {
        if self.fully_indexed {
            return;
        }
        let needed = end + 1 + OVERSCAN_LINES;
        while !self.fully_indexed && self.indexed_offsets.len() < needed {
            self.index_chunk(FOREGROUND_CHUNK, Some(needed));
        }
    }

    /// Scan the whole remaining file. Bounded by one full pass; used when an
    /// exact total is required.
    pub fn ensure_fully_indexed(&mut self) {
        while !self.fully_indexed {
            self.index_chunk(FOREGROUND_CHUNK, None);
        }
    }

    /// Scan at most `max_bytes` forward from the cursor, recording line
    /// starts. Stops early once `target_lines` offsets are known.
    fn index_chunk(&mut self, max_bytes: usize, target_lines: Option<usize>) {
        let Some(mmap) = self.mmap.as_ref() else {
            self.finish_indexing();
            return;
        };
        if self.scan_pos >= self.file_size {
            self.finish_indexing();
            return;
        }

        let chunk_end = (self.scan_pos + max_bytes).min(self.file_size);
        let chunk = &mmap[self.scan_pos..chunk_end];
        let mut next_scan_pos = chunk_end;

        for newline_pos in memchr_iter(b'\n', chunk) {
            let line_start = self.scan_pos + newline_pos + 1;
            // A trailing newline yields a final empty line at EOF
            self.indexed_offsets.push(line_start);
            if let Some(target) = target_lines {
                if self.indexed_offsets.len() >= target {
                    next_scan_pos = line_start;
                    break;
                }
            }
        }

        self.scan_pos = next_scan_pos;
        if self.scan_pos >= self.file_size {
            self.finish_indexing();
        }
    }

    fn finish_indexing(&mut self) {
        if !self.fully_indexed {
            self.fully_indexed = true;
            self.estimated_lines = self.indexed_offsets.len();
            tracing::debug!(
                path = %self.path.display(),
                lines = self.indexed_offsets.len(),
                "lazy index complete"
            );
        }
    }

    /// Get a line's content, indexing up to it first if needed.
    ///
    /// Invalid UTF-8 decodes lossily; out-of-range lines return an empty
    /// string.
    pub fn get_line(&mut self, line: usize) -> String {
        self.ensure_lines_indexed(line, line);

        let Some(mmap) = self.mmap.as_ref() else {
            return String::new();
        };
        if line >= self.indexed_offsets.len() {
            return String::new();
        }

        let start = self.indexed_offsets[line];
        let end = if line + 1 < self.indexed_offsets.len() {
            self.indexed_offsets[line + 1] - 1
        } else {
            // Last known line: its end has not been discovered yet
            memchr(b'\n', &mmap[start..])
                .map(|pos| start + pos)
                .unwrap_or(self.file_size)
        };

        String::from_utf8_lossy(&mmap[start..end]).into_owned()
    }

    /// Get lines `start..=end` (inclusive), clamped to the file.
    pub fn get_lines(&mut self, start: usize, end: usize) -> Vec<String> {
        self.ensure_lines_indexed(start, end);
        let end = end.min(self.indexed_offsets.len().saturating_sub(1));
        if start > end || self.mmap.is_none() {
            return Vec::new();
        }
        (start..=end).map(|line| self.get_line(line)).collect()
    }

    /// Byte offset where a line starts, indexing up to it first.
    pub fn byte_offset_for_line(&mut self, line: usize) -> usize {
        self.ensure_lines_indexed(line, line);
        self.indexed_offsets
            .get(line)
            .copied()
            .unwrap_or(self.file_size)
    }

    /// Line number containing a byte offset.
    ///
    /// Indexes forward until the offset is covered, then binary searches the
    /// monotonic offset table.
    pub fn line_for_byte_offset(&mut self, byte_offset: usize) -> usize {
        if byte_offset == 0 {
            return 0;
        }
        if byte_offset >= self.file_size {
            return self.estimated_line_count().saturating_sub(1);
        }

        while !self.fully_indexed && self.scan_pos <= byte_offset {
            self.index_chunk(FOREGROUND_CHUNK, None);
        }

        self.indexed_offsets
            .partition_point(|&offset| offset <= byte_offset)
            .saturating_sub(1)
    }

    /// Arm progressive background indexing.
    ///
    /// The caller's event loop drives the work by invoking
    /// [`background_step`](Self::background_step) until it returns false.
    /// `progress` receives `indexed_bytes / file_size` after each step.
    pub fn start_background_indexing(&mut self, progress: impl FnMut(f64) + 'static) {
        if self.fully_indexed || self.background_active {
            return;
        }
        self.progress_callback = Some(Box::new(progress));
        self.background_active = true;
    }

    /// Callback invoked once when background indexing reaches end of file.
    pub fn set_on_index_complete(&mut self, callback: impl FnMut() + 'static) {
        self.on_index_complete = Some(Box::new(callback));
    }

    /// Perform one bounded background indexing step.
    ///
    /// Returns true while more work remains. Fires the completion callback
    /// the first time the file becomes fully indexed.
    pub fn background_step(&mut self) -> bool {
        if !self.background_active {
            return false;
        }
        if self.fully_indexed {
            self.background_active = false;
            self.fire_complete();
            return false;
        }

        self.index_chunk(BACKGROUND_CHUNK, None);

        if let Some(callback) = self.progress_callback.as_mut() {
            if self.file_size > 0 {
                let fraction = (self.scan_pos as f64 / self.file_size as f64).min(1.0);
                callback(fraction);
            }
        }

        if self.fully_indexed {
            self.background_active = false;
            self.fire_complete();
            return false;
        }
        true
    }

    /// Halt background indexing. Partial progress remains valid.
    pub fn stop_background_indexing(&mut self) {
        self.background_active = false;
        self.progress_callback = None;
    }

    fn fire_complete(&mut self) {
        if let Some(callback) = self.on_index_complete.as_mut() {
            callback();
        }
    }
}
