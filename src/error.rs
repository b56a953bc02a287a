//! Error taxonomy for decoding a base image and replaying an op log.
//!
//! Follows this codebase's existing convention (see the array/bitmap store
//! modules) of a small hand-written error type with a `Display` impl, rather
//! than pulling in an error-derive crate: the variant set is fixed and the
//! messages are simple.

use core::fmt;

/// Why decoding a base image, or replaying an op-log record, failed.
///
/// Every variant that can reasonably be attributed to a position in the
/// input buffer carries a byte `offset`, so a caller can truncate or repair
/// the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The input buffer was empty.
    EmptyInput,
    /// The cookie, version, or container count in the base-image header is
    /// invalid or the buffer is too short to contain one.
    BadHeader { offset: usize },
    /// A container descriptor names an unknown type tag, an out-of-range
    /// cardinality, or a payload length inconsistent with its declared
    /// cardinality.
    BadDescriptor { offset: usize },
    /// A payload could not be borrowed zero-copy and could also not be
    /// copied (the buffer ends before the declared payload length).
    Misaligned { offset: usize },
    /// An op-log record failed its checksum or could not be decoded. The
    /// file should be truncated at `offset`, which is the byte at which the
    /// failing record began.
    OpLogCorrupt { offset: usize },
    /// An internal invariant was violated while applying an op. Indicates a
    /// bug in this crate rather than a malformed file.
    Internal(&'static str),
}

impl DecodeError {
    /// The byte offset this error is anchored to, if any.
    pub fn offset(&self) -> Option<usize> {
        match *self {
            DecodeError::EmptyInput | DecodeError::Internal(_) => None,
            DecodeError::BadHeader { offset }
            | DecodeError::BadDescriptor { offset }
            | DecodeError::Misaligned { offset }
            | DecodeError::OpLogCorrupt { offset } => Some(offset),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DecodeError::EmptyInput => write!(f, "empty input buffer"),
            DecodeError::BadHeader { offset } => {
                write!(f, "invalid base image header at offset {offset}")
            }
            DecodeError::BadDescriptor { offset } => {
                write!(f, "invalid container descriptor at offset {offset}")
            }
            DecodeError::Misaligned { offset } => {
                write!(f, "payload at offset {offset} could not be borrowed or copied")
            }
            DecodeError::OpLogCorrupt { offset } => {
                write!(f, "op log corrupt, file should be truncated at offset {offset}")
            }
            DecodeError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}
