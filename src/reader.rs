//! Parses a base image: cookie, descriptor table, optional offset table,
//! and the payload region, handing back one container at a time and
//! exposing whatever bytes are left over as the op-log region.

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::Bytes;
use crate::container::{run_cardinality, Container, Interval16, Payload};
use crate::error::DecodeError;
use crate::format::{
    BITMAP_BYTES, BITMAP_WORDS, COOKIE_EXPLICIT, COOKIE_SEQUENTIAL, DESCRIPTOR_BYTES,
    HEADER_PREFIX_BYTES, OFFSET_BYTES, TAG_ARRAY, TAG_BITMAP, TAG_RUN,
};
use crate::util::Key;

/// One parsed container descriptor, before its payload is materialized.
#[derive(Debug, Clone, Copy)]
struct Descriptor {
    key: Key,
    tag: u8,
    cardinality: u32,
}

pub struct BaseReader<'a> {
    buf: &'a [u8],
    count: u32,
    next_index: u32,
    explicit_offsets: bool,
    descriptors_offset: usize,
    offsets_offset: usize,
    payload_cursor: usize,
    prefer_mapping: bool,
}

impl<'a> BaseReader<'a> {
    /// Parses the fixed header (cookie + container count) and positions the
    /// reader at the first container. Does not read any payload bytes.
    pub fn new(buf: &'a [u8], prefer_mapping: bool) -> Result<Self, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        if buf.len() < HEADER_PREFIX_BYTES {
            return Err(DecodeError::BadHeader { offset: 0 });
        }
        let cookie = LittleEndian::read_u32(&buf[0..4]);
        let explicit_offsets = match cookie {
            COOKIE_SEQUENTIAL => false,
            COOKIE_EXPLICIT => true,
            _ => return Err(DecodeError::BadHeader { offset: 0 }),
        };
        let count = LittleEndian::read_u32(&buf[4..8]);

        let descriptors_offset = HEADER_PREFIX_BYTES;
        let descriptor_table_len = count as usize * DESCRIPTOR_BYTES;
        let offsets_offset = descriptors_offset + descriptor_table_len;
        let offset_table_len = if explicit_offsets { count as usize * OFFSET_BYTES } else { 0 };
        let payload_region_start = offsets_offset + offset_table_len;

        if buf.len() < payload_region_start {
            return Err(DecodeError::BadHeader { offset: descriptors_offset });
        }

        Ok(BaseReader {
            buf,
            count,
            next_index: 0,
            explicit_offsets,
            descriptors_offset,
            offsets_offset,
            payload_cursor: payload_region_start,
            prefer_mapping,
        })
    }

    fn read_descriptor(&self, index: u32) -> Result<Descriptor, DecodeError> {
        let offset = self.descriptors_offset + index as usize * DESCRIPTOR_BYTES;
        let field = self.buf.get(offset..offset + DESCRIPTOR_BYTES).ok_or(
            DecodeError::BadDescriptor { offset },
        )?;
        let key = LittleEndian::read_uint(&field[0..6], 6);
        let tag = field[6];
        let cardinality = u32::from(LittleEndian::read_u16(&field[7..9])) + 1;
        Ok(Descriptor { key, tag, cardinality })
    }

    fn payload_start(&self, index: u32, offset: usize) -> Result<usize, DecodeError> {
        if self.explicit_offsets {
            let table_offset = self.offsets_offset + index as usize * OFFSET_BYTES;
            let field = self
                .buf
                .get(table_offset..table_offset + OFFSET_BYTES)
                .ok_or(DecodeError::BadDescriptor { offset })?;
            Ok(LittleEndian::read_u32(field) as usize)
        } else {
            Ok(self.payload_cursor)
        }
    }

    /// Returns the next `(key, Container)` pair, or `None` once every
    /// descriptor has been consumed.
    pub fn next(&mut self) -> Option<Result<Container<'a>, DecodeError>> {
        if self.next_index >= self.count {
            return None;
        }
        let index = self.next_index;
        let descriptor = match self.read_descriptor(index) {
            Ok(d) => d,
            Err(e) => return Some(Err(e)),
        };
        let offset = self.descriptors_offset + index as usize * DESCRIPTOR_BYTES;
        let start = match self.payload_start(index, offset) {
            Ok(s) => s,
            Err(e) => return Some(Err(e)),
        };
        let region = match self.buf.get(start..) {
            Some(r) => r,
            None => return Some(Err(DecodeError::BadDescriptor { offset: start })),
        };

        let (payload, consumed) =
            match decode_payload(descriptor.tag, region, descriptor.cardinality, self.prefer_mapping, start)
            {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };

        self.payload_cursor = start + consumed;
        self.next_index += 1;

        let container = match payload {
            Payload::Array(b) => Container::new_array(descriptor.key, b, descriptor.cardinality),
            Payload::Bitmap(b) => Container::new_bitmap(descriptor.key, b, descriptor.cardinality),
            Payload::Run(b) => Container::new_run(descriptor.key, b, descriptor.cardinality),
        };
        Some(Ok(container))
    }

    /// Bytes left unconsumed after the last container, and the absolute
    /// offset at which they begin. Only meaningful once `next()` has
    /// returned `None`.
    pub fn remaining(&self) -> (&'a [u8], usize) {
        (&self.buf[self.payload_cursor..], self.payload_cursor)
    }
}

/// Decodes one container payload from `region` (which may extend well past
/// the end of this container's own bytes). Returns the typed payload and
/// the number of bytes it consumed.
pub(crate) fn decode_payload<'a>(
    tag: u8,
    region: &'a [u8],
    cardinality: u32,
    prefer_mapping: bool,
    offset: usize,
) -> Result<(Payload<'a>, usize), DecodeError> {
    match tag {
        TAG_ARRAY => {
            let len = cardinality as usize * 2;
            let slice = region.get(..len).ok_or(DecodeError::BadDescriptor { offset })?;
            Ok((Payload::Array(borrow_or_copy_u16(slice, prefer_mapping)), len))
        }
        TAG_BITMAP => {
            let slice = region.get(..BITMAP_BYTES).ok_or(DecodeError::BadDescriptor { offset })?;
            Ok((Payload::Bitmap(borrow_or_copy_u64(slice, prefer_mapping)), BITMAP_BYTES))
        }
        TAG_RUN => {
            let head = region.get(..2).ok_or(DecodeError::BadDescriptor { offset })?;
            let interval_count = LittleEndian::read_u16(head) as usize;
            let body_len = interval_count * 4;
            let total = 2 + body_len;
            let body =
                region.get(2..total).ok_or(DecodeError::BadDescriptor { offset })?;
            let intervals = borrow_or_copy_intervals(body, interval_count, prefer_mapping);
            if run_cardinality(intervals.as_slice()) != u64::from(cardinality) {
                return Err(DecodeError::BadDescriptor { offset });
            }
            Ok((Payload::Run(intervals), total))
        }
        _ => Err(DecodeError::BadDescriptor { offset }),
    }
}

fn borrow_or_copy_u16(slice: &[u8], prefer_mapping: bool) -> Bytes<'_, u16> {
    if prefer_mapping {
        #[cfg(target_endian = "little")]
        if let Ok(view) = bytemuck::try_cast_slice::<u8, u16>(slice) {
            return Bytes::Borrowed(view);
        }
        log_fallback("array");
    }
    let mut values = Vec::with_capacity(slice.len() / 2);
    for chunk in slice.chunks_exact(2) {
        values.push(LittleEndian::read_u16(chunk));
    }
    Bytes::owned(values)
}

fn borrow_or_copy_u64(slice: &[u8], prefer_mapping: bool) -> Bytes<'_, u64> {
    if prefer_mapping {
        #[cfg(target_endian = "little")]
        if let Ok(view) = bytemuck::try_cast_slice::<u8, u64>(slice) {
            return Bytes::Borrowed(view);
        }
        log_fallback("bitmap");
    }
    let mut values = Vec::with_capacity(BITMAP_WORDS);
    for chunk in slice.chunks_exact(8) {
        values.push(LittleEndian::read_u64(chunk));
    }
    Bytes::owned(values)
}

fn borrow_or_copy_intervals(
    slice: &[u8],
    interval_count: usize,
    prefer_mapping: bool,
) -> Bytes<'_, Interval16> {
    if prefer_mapping {
        #[cfg(target_endian = "little")]
        if let Ok(view) = bytemuck::try_cast_slice::<u8, Interval16>(slice) {
            return Bytes::Borrowed(view);
        }
        log_fallback("run");
    }
    let mut values = Vec::with_capacity(interval_count);
    for chunk in slice.chunks_exact(4) {
        values.push([LittleEndian::read_u16(&chunk[0..2]), LittleEndian::read_u16(&chunk[2..4])]);
    }
    Bytes::owned(values)
}

#[cfg(feature = "std")]
fn log_fallback(kind: &str) {
    log::debug!("{kind} container payload not aligned for zero-copy, falling back to owned copy");
}

#[cfg(not(feature = "std"))]
fn log_fallback(_kind: &str) {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::{COOKIE_SEQUENTIAL as SEQ, TAG_ARRAY};

    fn push_descriptor(buf: &mut Vec<u8>, key: u64, tag: u8, cardinality_minus_one: u16) {
        let key_bytes = key.to_le_bytes();
        buf.extend_from_slice(&key_bytes[0..6]);
        buf.push(tag);
        buf.extend_from_slice(&cardinality_minus_one.to_le_bytes());
    }

    #[test]
    fn single_array_container_sequential() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SEQ.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        push_descriptor(&mut buf, 0, TAG_ARRAY, 2); // cardinality 3
        for v in [1u16, 2, 3] {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        let mut reader = BaseReader::new(&buf, true).unwrap();
        let container = reader.next().unwrap().unwrap();
        assert!(reader.next().is_none());
        assert_eq!(container.key(), 0);
        assert_eq!(container.cardinality(), 3);
        assert!(container.contains(1));
        assert!(container.contains(3));
        assert!(!container.contains(4));

        let (tail, tail_offset) = reader.remaining();
        assert!(tail.is_empty());
        assert_eq!(tail_offset, buf.len());
    }

    #[test]
    fn unknown_cookie_is_bad_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        let err = BaseReader::new(&buf, true).unwrap_err();
        assert_eq!(err, DecodeError::BadHeader { offset: 0 });
    }

    #[test]
    fn empty_buffer_is_empty_input() {
        let err = BaseReader::new(&[], true).unwrap_err();
        assert_eq!(err, DecodeError::EmptyInput);
    }
}
