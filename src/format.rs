//! On-disk constants for the base image and the op log.
//!
//! Every magic number and byte-layout constant used by [`crate::reader`] and
//! [`crate::oplog`] is defined here, once, rather than scattered across the
//! decoder. This is this crate's own wire format; it is not wire-compatible
//! with any other Roaring implementation.

/// Base-image cookie: the offset table following the descriptor table is
/// omitted, and the payload offset of each container is inferred by summing
/// payload lengths in descriptor order.
pub const COOKIE_SEQUENTIAL: u32 = 0x5242_4D31;

/// Base-image cookie: an explicit `u32` offset table follows the descriptor
/// table, one entry per container.
pub const COOKIE_EXPLICIT: u32 = 0x5242_4D32;

/// Size in bytes of the fixed `cookie` + `container count` header prefix.
pub const HEADER_PREFIX_BYTES: usize = 8;

/// Size in bytes of one descriptor: `key: u48, type: u8, n-1: u16`.
pub const DESCRIPTOR_BYTES: usize = 9;

/// Size in bytes of one offset-table entry.
pub const OFFSET_BYTES: usize = 4;

/// Container type tag: ascending array of 16-bit values.
pub const TAG_ARRAY: u8 = 1;
/// Container type tag: 1024-word (8 KiB) fixed bitmap.
pub const TAG_BITMAP: u8 = 2;
/// Container type tag: ascending sequence of `(start, last)` interval pairs.
pub const TAG_RUN: u8 = 3;

/// Cardinality threshold above which a container is stored as a bitmap
/// rather than an array (absent run-length compressibility).
pub const ARRAY_LIMIT: u64 = 4096;

/// Number of 64-bit words in a bitmap container payload.
pub const BITMAP_WORDS: usize = 1024;

/// Size in bytes of a bitmap container payload (`BITMAP_WORDS * 8`).
pub const BITMAP_BYTES: usize = BITMAP_WORDS * 8;

/// Size in bytes of one op-log record header.
pub const OP_HEADER_BYTES: usize = 16;

/// Op type: set individual bits, one 64-bit value per bit.
pub const OP_ADD: u8 = 1;
/// Op type: clear individual bits, one 64-bit value per bit.
pub const OP_REMOVE: u8 = 2;
/// Op type: set a sorted run of bits, applied container-at-a-time.
pub const OP_ADD_BATCH: u8 = 3;
/// Op type: clear a sorted run of bits, applied container-at-a-time.
pub const OP_REMOVE_BATCH: u8 = 4;
/// Op type: replace the container at a given key with a full container body.
pub const OP_OVERWRITE: u8 = 5;
