//! Large-file virtual text buffer.
//!
//! Opens multi-gigabyte text files in O(1) via memory mapping and lazy
//! line indexing, edits them through a hybrid lazy/materialized line
//! buffer, and wraps viewport lines with a bounded per-frame cost.
//!
//! - [`LineIndexer`]: eager offset index with incremental edit patching
//! - [`LazyLineIndexer`]: O(1) open, on-demand and background indexing
//! - [`VirtualBuffer`]: the editable document model
//! - [`VisualLineMapper`]: LRU-cached viewport word wrap

pub use vbuf_buffer::{BufferError, LineRef, VirtualBuffer};
pub use vbuf_index::{LazyLineIndexer, LineIndexer, LineInfo};
pub use vbuf_wrap::{VisualLineMapper, WrapInfo};
