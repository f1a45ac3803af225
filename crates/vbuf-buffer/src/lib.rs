//! Virtual text buffer over memory-mapped files.
//!
//! [`VirtualBuffer`] presents a file as an editable sequence of lines while
//! keeping unmodified lines in the memory map. Only edited lines are held in
//! memory, so multi-gigabyte files open instantly and edits stay cheap.

pub mod buffer;
pub mod error;

pub use buffer::{LineRef, VirtualBuffer};
pub use error::BufferError;
