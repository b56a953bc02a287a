//! Parses and applies the append-only mutation log that follows a base
//! image: fixed 16-byte record headers, one of five op types, and a rolling
//! checksum carried across the whole stream (base image, then every record's
//! payload in turn) for truncation detection.

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::Bytes;
use crate::checksum::Rolling;
use crate::container::Container;
use crate::error::DecodeError;
use crate::format::{
    OP_ADD, OP_ADD_BATCH, OP_HEADER_BYTES, OP_OVERWRITE, OP_REMOVE, OP_REMOVE_BATCH,
};
use crate::reader::decode_payload;
use crate::store::ContainerStore;
use crate::util::{self, Key};

/// One decoded mutation, not yet applied to a [`ContainerStore`].
pub(crate) enum Op<'a> {
    Add(Vec<u64>),
    Remove(Vec<u64>),
    AddBatch(Vec<(Key, Vec<u16>)>),
    RemoveBatch(Vec<(Key, Vec<u16>)>),
    Overwrite { key: Key, container: Container<'a> },
}

impl<'a> Op<'a> {
    /// The on-disk op type tag, without consuming the op.
    pub(crate) fn type_tag(&self) -> u8 {
        match self {
            Op::Add(_) => OP_ADD,
            Op::Remove(_) => OP_REMOVE,
            Op::AddBatch(_) => OP_ADD_BATCH,
            Op::RemoveBatch(_) => OP_REMOVE_BATCH,
            Op::Overwrite { .. } => OP_OVERWRITE,
        }
    }

    pub(crate) fn apply(self, store: &mut ContainerStore<'a>) {
        match self {
            Op::Add(values) => {
                for v in values {
                    let (key, low) = util::split(v);
                    get_or_create(store, key).insert(low);
                }
            }
            Op::Remove(values) => {
                for v in values {
                    let (key, low) = util::split(v);
                    if let Some(container) = store.get_mut(key) {
                        container.remove(low);
                    }
                }
            }
            Op::AddBatch(groups) => {
                for (key, lows) in groups {
                    let container = get_or_create(store, key);
                    for low in lows {
                        container.insert(low);
                    }
                }
            }
            Op::RemoveBatch(groups) => {
                for (key, lows) in groups {
                    if let Some(container) = store.get_mut(key) {
                        for low in lows {
                            container.remove(low);
                        }
                    }
                }
            }
            Op::Overwrite { key: _, mut container } => {
                container.mark_modified();
                store.put(container);
            }
        }
    }
}

fn get_or_create<'a, 'b>(store: &'b mut ContainerStore<'a>, key: Key) -> &'b mut Container<'a> {
    if store.get(key).is_none() {
        store.put(Container::new_array(key, Bytes::owned(Vec::new()), 0));
    }
    store.get_mut(key).expect("just inserted")
}

/// One parsed op-log record: the op itself plus the bit count carried in its
/// header, which callers accumulate into a running `op_bits` total.
pub(crate) struct OpRecord<'a> {
    pub(crate) op: Op<'a>,
    pub(crate) count_of_bits: u32,
    pub(crate) offset: usize,
}

pub(crate) struct OpLogReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base_offset: usize,
    prefer_mapping: bool,
    checksum: Rolling,
}

impl<'a> OpLogReader<'a> {
    /// `base_offset` is the absolute file offset of `buf[0]`, used so errors
    /// report a position in the original file rather than in this slice.
    /// `seed` is the rolling checksum after hashing every byte consumed
    /// before the op log starts (the whole base image), so each record's
    /// checksum covers the file from its very first byte, not just its own
    /// payload.
    pub(crate) fn new(buf: &'a [u8], base_offset: usize, prefer_mapping: bool, seed: Rolling) -> Self {
        OpLogReader { buf, pos: 0, base_offset, prefer_mapping, checksum: seed }
    }

    pub(crate) fn next(&mut self) -> Option<Result<OpRecord<'a>, DecodeError>> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let record_start = self.pos;
        let corrupt = || DecodeError::OpLogCorrupt { offset: self.base_offset + record_start };

        let header = match self.buf.get(self.pos..self.pos + OP_HEADER_BYTES) {
            Some(h) => h,
            None => return Some(Err(corrupt())),
        };
        let op_type = header[0];
        let count_of_bits = LittleEndian::read_u32(&header[4..8]);
        let checksum = LittleEndian::read_u32(&header[8..12]);
        let payload_len = LittleEndian::read_u32(&header[12..16]) as usize;

        let payload_start = self.pos + OP_HEADER_BYTES;
        let payload = match self.buf.get(payload_start..payload_start + payload_len) {
            Some(p) => p,
            None => return Some(Err(corrupt())),
        };

        self.checksum.write(payload);
        if self.checksum.finish() != checksum {
            return Some(Err(corrupt()));
        }

        let op = match decode_op(op_type, payload, count_of_bits, self.prefer_mapping) {
            Some(op) => op,
            None => return Some(Err(corrupt())),
        };

        self.pos = payload_start + payload_len;
        Some(Ok(OpRecord { op, count_of_bits, offset: self.base_offset + record_start }))
    }
}

fn decode_op(op_type: u8, payload: &[u8], count_of_bits: u32, prefer_mapping: bool) -> Option<Op<'_>> {
    match op_type {
        OP_ADD | OP_REMOVE => {
            let expected_len = count_of_bits as usize * 8;
            if payload.len() != expected_len {
                return None;
            }
            let values: Vec<u64> =
                payload.chunks_exact(8).map(LittleEndian::read_u64).collect();
            Some(if op_type == OP_ADD { Op::Add(values) } else { Op::Remove(values) })
        }
        OP_ADD_BATCH | OP_REMOVE_BATCH => {
            let groups = decode_batch_groups(payload, count_of_bits)?;
            Some(if op_type == OP_ADD_BATCH { Op::AddBatch(groups) } else { Op::RemoveBatch(groups) })
        }
        OP_OVERWRITE => decode_overwrite(payload, count_of_bits, prefer_mapping),
        _ => None,
    }
}

fn decode_batch_groups(payload: &[u8], count_of_bits: u32) -> Option<Vec<(Key, Vec<u16>)>> {
    let mut groups = Vec::new();
    let mut total = 0u64;
    let mut cursor = 0usize;
    while cursor < payload.len() {
        let head = payload.get(cursor..cursor + 10)?;
        let key = LittleEndian::read_uint(&head[0..6], 6);
        let n = LittleEndian::read_u32(&head[6..10]) as usize;
        cursor += 10;
        let body = payload.get(cursor..cursor + n * 2)?;
        let values: Vec<u16> = body.chunks_exact(2).map(LittleEndian::read_u16).collect();
        cursor += n * 2;
        total += n as u64;
        groups.push((key, values));
    }
    if total != u64::from(count_of_bits) {
        return None;
    }
    Some(groups)
}

fn decode_overwrite(payload: &[u8], count_of_bits: u32, prefer_mapping: bool) -> Option<Op<'_>> {
    let head = payload.get(0..12)?;
    let key = LittleEndian::read_uint(&head[0..6], 6);
    let tag = head[6];
    let cardinality = LittleEndian::read_u32(&head[8..12]);
    if cardinality != count_of_bits {
        return None;
    }
    let body = payload.get(12..)?;
    let (typed, consumed) = decode_payload(tag, body, cardinality, prefer_mapping, 12).ok()?;
    if consumed != body.len() {
        return None;
    }
    let container = match typed {
        crate::container::Payload::Array(b) => Container::new_array(key, b, cardinality),
        crate::container::Payload::Bitmap(b) => Container::new_bitmap(key, b, cardinality),
        crate::container::Payload::Run(b) => Container::new_run(key, b, cardinality),
    };
    Some(Op::Overwrite { key, container })
}
