use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by [`VirtualBuffer`](crate::VirtualBuffer) operations.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer has no backing path; call save_as with an explicit path")]
    NoPath,

    #[error("line {line} is out of range (buffer has {len} lines)")]
    LineOutOfRange { line: usize, len: usize },

    #[error("invalid edit range: ({start_line}, {start_col}) to ({end_line}, {end_col})")]
    InvalidRange {
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    },

    #[error("failed to access {path}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
