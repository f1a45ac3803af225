//! Line offset indexing for large text files
//!
//! This crate provides the two indexing strategies used by the virtual
//! buffer:
//! - Eager indexing: a full scan producing an exact offset/length table
//! - Lazy indexing: O(1) open via memory mapping, with line offsets
//!   discovered on demand or progressively in the background

pub mod lazy;
pub mod line_index;

// Re-export main types for convenience
pub use lazy::LazyLineIndexer;
pub use line_index::{LineIndexer, LineInfo};
