//! Error taxonomy for opening, resolving and writing archives.
//!
//! Every variant is terminal for the call that produced it.  A checksum
//! failure means the byte source cannot be trusted any further, so nothing
//! here is retried internally.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::codec::CodecError;

/// Which checksum gate rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumField {
    /// The 20-byte locator record inside the signature header.
    Locator,
    /// The raw metadata blob.
    Blob,
    /// The unpacked bytes of a single entry.
    Entry,
}

impl fmt::Display for ChecksumField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChecksumField::Locator => "locator",
            ChecksumField::Blob    => "header blob",
            ChecksumField::Entry   => "entry",
        })
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Format error: {0}")]
    Format(String),
    #[error("Integrity error: {field} checksum mismatch (stored {expected:08x}, computed {actual:08x})")]
    Integrity {
        field:    ChecksumField,
        expected: u32,
        actual:   u32,
    },
    #[error("Truncated: expected {expected} bytes, read {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Archive is {0}")]
    Mode(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ArchiveError::Format(msg.into())
    }

    /// `true` for a checksum failure on the given gate.
    pub fn is_integrity(&self, which: ChecksumField) -> bool {
        matches!(self, ArchiveError::Integrity { field, .. } if *field == which)
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
