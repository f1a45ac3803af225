use lru::LruCache;
use std::num::NonZeroUsize;
use vbuf_buffer::VirtualBuffer;

/// Wrap layouts cached per logical line, evicted least-recently-used.
const WRAP_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(capacity) => capacity,
    None => panic!("cache capacity must be non-zero"),
};

/// How far to look back from a wrap target for a whitespace break.
const BREAK_LOOKBACK: usize = 15;

/// An edit invalidates at most this many cached lines, keeping
/// invalidation cost bounded for huge multi-line edits.
const INVALIDATE_WINDOW: usize = 50;

/// Lines below this count get an exact total visual line count; larger
/// documents are sampled.
const EXACT_COUNT_THRESHOLD: usize = 1000;

/// Number of evenly spaced lines sampled when estimating the total.
const SAMPLE_COUNT: usize = 100;

/// Safety margin applied to visual line totals so the scrollbar never
/// comes up short.
const COUNT_MARGIN: f64 = 1.05;

/// How one logical line wraps into visual lines at the current width.
///
/// `break_points` are strictly increasing character columns, each less
/// than the line length; a line that fits in the viewport has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapInfo {
    pub line_num: usize,
    pub break_points: Vec<usize>,
    pub visual_line_count: usize,
}

impl WrapInfo {
    fn unwrapped(line_num: usize) -> Self {
        Self {
            line_num,
            break_points: Vec::new(),
            visual_line_count: 1,
        }
    }

    pub fn is_wrapped(&self) -> bool {
        self.visual_line_count > 1
    }
}

/// Maps logical lines to visual lines for a viewport of fixed character
/// width.
///
/// Holds no reference to the buffer; callers pass it into each query, so
/// the mapper can sit next to the buffer in the same owner without
/// borrow gymnastics. All columns are character offsets.
#[derive(Debug)]
pub struct VisualLineMapper {
    enabled: bool,
    viewport_width_px: f64,
    char_width_px: f64,
    viewport_width_chars: usize,
    cache: LruCache<usize, WrapInfo>,
    cached_total: Option<usize>,
}

impl Default for VisualLineMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualLineMapper {
    pub fn new() -> Self {
        Self {
            enabled: false,
            viewport_width_px: 800.0,
            char_width_px: 10.0,
            viewport_width_chars: 80,
            cache: LruCache::new(WRAP_CACHE_CAPACITY),
            cached_total: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle wrapping. Any change drops the whole cache, since cached
    /// layouts are only meaningful under the active mode.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.invalidate_all();
        }
    }

    pub fn viewport_width_chars(&self) -> usize {
        self.viewport_width_chars
    }

    /// Update the wrap width from a pixel measurement.
    ///
    /// Sub-pixel changes are ignored to avoid cache thrashing during
    /// layout jitter; the derived character width is floored at 20.
    pub fn set_viewport_width(&mut self, width_pixels: f64, char_width: f64) {
        if (width_pixels - self.viewport_width_px).abs() <= 1.0
            && (char_width - self.char_width_px).abs() <= 0.001
        {
            return;
        }
        self.viewport_width_px = width_pixels.max(100.0);
        self.char_width_px = char_width;
        self.viewport_width_chars = ((width_pixels / char_width) as usize).max(20);
        self.invalidate_all();
    }

    /// Set the wrap width directly in characters.
    pub fn set_char_width(&mut self, chars: usize) {
        let chars = chars.max(1);
        if chars != self.viewport_width_chars {
            self.viewport_width_chars = chars;
            self.invalidate_all();
        }
    }

    /// Drop every cached layout and the cached total.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
        self.cached_total = None;
    }

    /// Drop cached layouts for an edited line range.
    ///
    /// The range is capped at a fixed window; beyond it, stale entries
    /// age out of the LRU naturally.
    pub fn invalidate(&mut self, start_line: usize, end_line: usize) {
        self.cached_total = None;
        let end_line = end_line.max(start_line);
        let capped = end_line.min(start_line + INVALIDATE_WINDOW - 1);
        for line in start_line..=capped {
            self.cache.pop(&line);
        }
    }

    /// Wrap layout for one line, computed on first access and cached.
    pub fn get_wrap_info(&mut self, buffer: &mut VirtualBuffer, line_num: usize) -> WrapInfo {
        if !self.enabled {
            return WrapInfo::unwrapped(line_num);
        }
        if let Some(info) = self.cache.get(&line_num) {
            return info.clone();
        }
        let text = buffer.get_line(line_num);
        let info = self.compute_wrap_info(line_num, &text);
        self.cache.put(line_num, info.clone());
        info
    }

    /// Greedy character wrap with a bounded look-back for whitespace.
    ///
    /// Walks the line in viewport-width chunks; at each chunk boundary it
    /// scans back up to `BREAK_LOOKBACK` characters for a space or tab to
    /// break after, falling back to a hard cut mid-word.
    fn compute_wrap_info(&self, line_num: usize, text: &str) -> WrapInfo {
        let chars: Vec<char> = text.chars().collect();
        let line_len = chars.len();
        let width = self.viewport_width_chars;
        if line_len <= width {
            return WrapInfo::unwrapped(line_num);
        }

        let mut break_points = Vec::new();
        let mut pos = 0;
        while pos < line_len {
            if line_len - pos <= width {
                break;
            }
            let target = pos + width;
            let mut break_pos = target;

            let floor = target.saturating_sub(BREAK_LOOKBACK).max(pos);
            let mut i = target.min(line_len - 1);
            while i > floor {
                // A break after the last character would be at the line
                // end, which is not a wrap point
                if (chars[i] == ' ' || chars[i] == '\t') && i + 1 < line_len {
                    break_pos = i + 1;
                    break;
                }
                i -= 1;
            }

            break_points.push(break_pos);
            pos = break_pos;
        }

        WrapInfo {
            line_num,
            visual_line_count: break_points.len() + 1,
            break_points,
        }
    }

    /// Number of visual lines for one logical line. Always 1 when
    /// wrapping is disabled.
    pub fn get_visual_line_count(&mut self, buffer: &mut VirtualBuffer, line_num: usize) -> usize {
        if !self.enabled {
            return 1;
        }
        self.get_wrap_info(buffer, line_num).visual_line_count
    }

    /// Total visual lines in the document, for scrollbar sizing.
    ///
    /// Exact (with a safety margin) for small documents; statistically
    /// estimated from evenly spaced samples for large ones, so the cost
    /// never scales with document size. The result is cached until the
    /// next invalidation.
    pub fn get_total_visual_lines(&mut self, buffer: &mut VirtualBuffer) -> usize {
        if !self.enabled {
            return buffer.total_lines();
        }
        if let Some(total) = self.cached_total {
            return total;
        }

        let total_logical = buffer.total_lines();
        if total_logical == 0 {
            self.cached_total = Some(1);
            return 1;
        }

        let result = if total_logical < EXACT_COUNT_THRESHOLD {
            let mut count = 0;
            for line in 0..total_logical {
                count += self.get_visual_line_count(buffer, line);
            }
            (count as f64 * COUNT_MARGIN) as usize
        } else {
            let step = (total_logical / SAMPLE_COUNT).max(1);
            let mut sampled_visual = 0usize;
            let mut sampled_lines = 0usize;
            let mut line = 0;
            while line < total_logical {
                sampled_visual += self.get_visual_line_count(buffer, line);
                sampled_lines += 1;
                line += step;
            }
            let average = sampled_visual as f64 / sampled_lines as f64;
            (total_logical as f64 * average * COUNT_MARGIN) as usize
        };

        tracing::debug!(
            logical = total_logical,
            visual = result,
            "recomputed total visual lines"
        );
        self.cached_total = Some(result);
        result
    }

    /// Character ranges `(start_col, end_col)` of each visual row of a
    /// line; contiguous and covering the whole line.
    pub fn get_line_segments(
        &mut self,
        buffer: &mut VirtualBuffer,
        line_num: usize,
    ) -> Vec<(usize, usize)> {
        let info = self.get_wrap_info(buffer, line_num);
        let line_len = buffer.get_line_length(line_num);

        if info.break_points.is_empty() {
            return vec![(0, line_len)];
        }

        let mut segments = Vec::with_capacity(info.break_points.len() + 1);
        let mut prev = 0;
        for &break_point in &info.break_points {
            segments.push((prev, break_point));
            prev = break_point;
        }
        segments.push((prev, line_len));
        segments
    }

    /// Locate a column within a line's visual rows: returns the visual
    /// row index and the column within that row.
    pub fn column_to_visual_offset(
        &mut self,
        buffer: &mut VirtualBuffer,
        line_num: usize,
        col: usize,
    ) -> (usize, usize) {
        if !self.enabled {
            return (0, col);
        }
        let info = self.get_wrap_info(buffer, line_num);
        if info.break_points.is_empty() {
            return (0, col);
        }

        for (row, &break_point) in info.break_points.iter().enumerate() {
            if col < break_point {
                let start = if row > 0 { info.break_points[row - 1] } else { 0 };
                return (row, col - start);
            }
        }

        let last = info.break_points[info.break_points.len() - 1];
        (info.break_points.len(), col - last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(text: &str) -> VirtualBuffer {
        let mut buffer = VirtualBuffer::new();
        buffer.load_text(text);
        buffer
    }

    fn mapper(width: usize) -> VisualLineMapper {
        let mut mapper = VisualLineMapper::new();
        mapper.set_enabled(true);
        mapper.set_char_width(width);
        mapper
    }

    #[test]
    fn test_short_line_does_not_wrap() {
        let mut buffer = buffer_with("hello");
        let mut mapper = mapper(10);
        let info = mapper.get_wrap_info(&mut buffer, 0);
        assert!(!info.is_wrapped());
        assert!(info.break_points.is_empty());
    }

    #[test]
    fn test_wrap_prefers_word_boundaries() {
        let mut buffer = buffer_with("the quick brown fox jumps");
        let mut mapper = mapper(10);

        let info = mapper.get_wrap_info(&mut buffer, 0);
        assert_eq!(info.visual_line_count, 3);
        assert_eq!(info.break_points, vec![10, 20]);

        let segments = mapper.get_line_segments(&mut buffer, 0);
        assert_eq!(segments, vec![(0, 10), (10, 20), (20, 25)]);
    }

    #[test]
    fn test_wrap_hard_cuts_unbroken_text() {
        let mut buffer = buffer_with("aaaaaaaaaaaaaaaaaaaaaaaaa");
        let mut mapper = mapper(10);

        let info = mapper.get_wrap_info(&mut buffer, 0);
        assert_eq!(info.break_points, vec![10, 20]);
        assert_eq!(info.visual_line_count, 3);
    }

    #[test]
    fn test_break_points_strictly_increasing_below_length() {
        let mut buffer = buffer_with("lorem ipsum dolor sit amet consectetur adipiscing elit");
        let mut mapper = mapper(12);

        let info = mapper.get_wrap_info(&mut buffer, 0);
        let len = buffer.get_line_length(0);
        for pair in info.break_points.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for &bp in &info.break_points {
            assert!(bp < len);
        }
    }

    #[test]
    fn test_whitespace_at_line_end_is_not_a_break() {
        // 10 chars then a trailing space: the space sits exactly at the
        // wrap target but a break there would equal the line length
        let mut buffer = buffer_with("aaaaaaaaaa ");
        let mut mapper = mapper(10);

        let info = mapper.get_wrap_info(&mut buffer, 0);
        let len = buffer.get_line_length(0);
        for &bp in &info.break_points {
            assert!(bp < len);
        }
        assert_eq!(info.break_points, vec![10]);

        let segments = mapper.get_line_segments(&mut buffer, 0);
        assert_eq!(segments, vec![(0, 10), (10, 11)]);
        assert!(segments.iter().all(|&(start, end)| start < end));
    }

    #[test]
    fn test_wrap_is_deterministic_across_cache_eviction() {
        let mut buffer = buffer_with("the quick brown fox jumps over the lazy dog again");
        let mut mapper = mapper(10);

        let first = mapper.get_wrap_info(&mut buffer, 0);
        mapper.invalidate_all();
        let second = mapper.get_wrap_info(&mut buffer, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_disabled_mapper_is_identity() {
        let mut buffer = buffer_with("word ".repeat(50).trim_end());
        let mut mapper = VisualLineMapper::new();
        mapper.set_char_width(10);

        assert_eq!(mapper.get_visual_line_count(&mut buffer, 0), 1);
        assert_eq!(
            mapper.get_total_visual_lines(&mut buffer),
            buffer.total_lines()
        );
        assert_eq!(mapper.column_to_visual_offset(&mut buffer, 0, 37), (0, 37));
    }

    #[test]
    fn test_width_change_invalidates() {
        let mut buffer = buffer_with("the quick brown fox jumps");
        let mut mapper = mapper(10);
        assert_eq!(mapper.get_visual_line_count(&mut buffer, 0), 3);

        mapper.set_char_width(25);
        assert_eq!(mapper.get_visual_line_count(&mut buffer, 0), 1);
    }

    #[test]
    fn test_pixel_width_floors_at_twenty_chars() {
        let mut mapper = VisualLineMapper::new();
        mapper.set_viewport_width(50.0, 10.0);
        assert_eq!(mapper.viewport_width_chars(), 20);
    }

    #[test]
    fn test_invalidate_recomputes_edited_line() {
        let mut buffer = buffer_with("short line");
        let mut mapper = mapper(10);
        assert_eq!(mapper.get_visual_line_count(&mut buffer, 0), 1);

        buffer.insert(0, 10, " grows well past the viewport width now");
        mapper.invalidate(0, 0);
        assert!(mapper.get_visual_line_count(&mut buffer, 0) > 1);
    }

    #[test]
    fn test_total_visual_lines_exact_for_small_documents() {
        let text = vec!["the quick brown fox jumps"; 10].join("\n");
        let mut buffer = buffer_with(&text);
        let mut mapper = mapper(10);

        // 10 lines x 3 visual lines, times the safety margin
        let total = mapper.get_total_visual_lines(&mut buffer);
        assert_eq!(total, (30.0 * 1.05) as usize);
        assert!(total >= buffer.total_lines());
    }

    #[test]
    fn test_total_visual_lines_sampled_for_large_documents() {
        let text = vec!["the quick brown fox jumps"; 2000].join("\n");
        let mut buffer = buffer_with(&text);
        let mut mapper = mapper(10);

        // Uniform lines: sampling lands on the same per-line count
        let total = mapper.get_total_visual_lines(&mut buffer);
        assert_eq!(total, (2000.0 * 3.0 * 1.05) as usize);
        assert!(total >= buffer.total_lines());
    }

    #[test]
    fn test_total_visual_lines_cached_until_invalidated() {
        let mut buffer = buffer_with("the quick brown fox jumps\nshort");
        let mut mapper = mapper(10);

        let before = mapper.get_total_visual_lines(&mut buffer);
        buffer.insert(1, 5, " now much longer than the viewport width");
        // Stale until invalidated
        assert_eq!(mapper.get_total_visual_lines(&mut buffer), before);
        mapper.invalidate(1, 1);
        assert!(mapper.get_total_visual_lines(&mut buffer) > before);
    }

    #[test]
    fn test_column_to_visual_offset() {
        let mut buffer = buffer_with("the quick brown fox jumps");
        let mut mapper = mapper(10);

        assert_eq!(mapper.column_to_visual_offset(&mut buffer, 0, 3), (0, 3));
        assert_eq!(mapper.column_to_visual_offset(&mut buffer, 0, 10), (1, 0));
        assert_eq!(mapper.column_to_visual_offset(&mut buffer, 0, 24), (2, 4));
    }

    #[test]
    fn test_segments_cover_line_without_gaps() {
        let mut buffer = buffer_with("lorem ipsum dolor sit amet consectetur");
        let mut mapper = mapper(11);

        let segments = mapper.get_line_segments(&mut buffer, 0);
        let len = buffer.get_line_length(0);
        assert_eq!(segments.first().map(|s| s.0), Some(0));
        assert_eq!(segments.last().map(|s| s.1), Some(len));
        for pair in segments.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_multibyte_wrap_counts_chars() {
        // 30 two-byte chars; width 10 must break by chars, not bytes
        let text: String = std::iter::repeat('é').take(30).collect();
        let mut buffer = buffer_with(&text);
        let mut mapper = mapper(10);

        let info = mapper.get_wrap_info(&mut buffer, 0);
        assert_eq!(info.break_points, vec![10, 20]);
    }
}
