//! Viewport-driven word wrap for [`vbuf_buffer::VirtualBuffer`].
//!
//! Wrap layout is computed lazily per logical line and held in an LRU
//! cache, so word-wrap mode costs O(viewport) per frame instead of
//! O(document). The total visual line count needed for scrollbar sizing
//! is exact for small documents and statistically sampled for large ones.

pub mod wrap;

pub use wrap::{VisualLineMapper, WrapInfo};
