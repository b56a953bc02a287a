//! The top-level handle: a base image's containers plus whatever op-log
//! records have been replayed on top of them.

use crate::checksum::Rolling;
use crate::container::Container;
use crate::error::DecodeError;
use crate::oplog::OpLogReader;
use crate::reader::BaseReader;
use crate::store::ContainerStore;
use crate::util::Key;

/// A decoded base image with its op log replayed on top.
pub struct Bitmap<'a> {
    store: ContainerStore<'a>,
    ops: u64,
    op_bits: u64,
    prefer_mapping: bool,
}

/// The result of [`Bitmap::decode`]: op-log corruption is recoverable, so
/// the caller gets back everything that replayed cleanly before it, rather
/// than losing the whole decode to one bad trailing record.
pub struct DecodeOutcome<'a> {
    pub bitmap: Bitmap<'a>,
    /// Set if the op log stopped early. The offset inside points at the
    /// first byte of the record that failed to decode; the file is sound up
    /// to that point and should be truncated there to repair it.
    pub truncated_at: Option<DecodeError>,
}

impl<'a> Bitmap<'a> {
    pub(crate) fn from_parts(
        store: ContainerStore<'a>,
        ops: u64,
        op_bits: u64,
        prefer_mapping: bool,
    ) -> Self {
        Bitmap { store, ops, op_bits, prefer_mapping }
    }

    /// Decodes a base image and replays its op log.
    ///
    /// A malformed base image is fatal and returned as `Err`. A malformed or
    /// truncated op-log record is recoverable: replay stops at that record
    /// and `DecodeOutcome::truncated_at` reports where, but every container
    /// and op that decoded before it is kept.
    ///
    /// `prefer_mapping` controls whether container payloads are borrowed
    /// directly from `buf` when alignment allows it, or eagerly copied.
    pub fn decode(buf: &'a [u8], prefer_mapping: bool) -> Result<DecodeOutcome<'a>, DecodeError> {
        let mut reader = BaseReader::new(buf, prefer_mapping)?;
        let mut store = ContainerStore::new();
        while let Some(result) = reader.next() {
            store.put(result?);
        }
        let (tail, tail_offset) = reader.remaining();

        let mut seed = Rolling::new();
        seed.write(&buf[..tail_offset]);

        let mut oplog = OpLogReader::new(tail, tail_offset, prefer_mapping, seed);
        let mut ops = 0u64;
        let mut op_bits = 0u64;
        let mut truncated_at = None;
        loop {
            match oplog.next() {
                Some(Ok(record)) => {
                    ops += 1;
                    op_bits += u64::from(record.count_of_bits);
                    record.op.apply(&mut store);
                }
                Some(Err(err)) => {
                    log_truncation(&err);
                    truncated_at = Some(err);
                    break;
                }
                None => break,
            }
        }

        Ok(DecodeOutcome { bitmap: Bitmap { store, ops, op_bits, prefer_mapping }, truncated_at })
    }

    /// Toggles whether mapped container payloads are retained. Disabling it
    /// (`false`) eagerly detaches every container from `buf` right now;
    /// re-enabling it (`true`) is a no-op, since a container that has
    /// already copied its payload has nothing left to remap.
    pub fn prefer_mapping(&mut self, mapped: bool) {
        self.prefer_mapping = mapped;
        if !mapped {
            for container in self.store.iter_mut() {
                container.unmap_or_clone();
            }
        }
    }

    pub fn prefers_mapping(&self) -> bool {
        self.prefer_mapping
    }

    /// Whether any container currently borrows from the source buffer.
    pub fn mapped_any(&self) -> bool {
        self.store.mapped_any()
    }

    /// Number of op-log records successfully replayed.
    pub fn ops(&self) -> u64 {
        self.ops
    }

    /// Sum of `count_of_bits` across every replayed op-log record.
    pub fn op_bits(&self) -> u64 {
        self.op_bits
    }

    pub fn container_count(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Looks up the container at exactly `key`, if present.
    pub fn get(&self, key: Key) -> Option<&Container<'a>> {
        self.store.get(key)
    }

    /// Iterates `(key, &Container)` in ascending key order starting at the
    /// first key `>= from_key`.
    pub fn iter(&self, from_key: Key) -> impl Iterator<Item = (Key, &Container<'a>)> {
        self.store.iter(from_key)
    }
}

#[cfg(feature = "std")]
pub(crate) fn log_truncation(err: &DecodeError) {
    log::warn!("op log stopped early at offset {:?}: {err}", err.offset());
}

#[cfg(not(feature = "std"))]
pub(crate) fn log_truncation(_err: &DecodeError) {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::{COOKIE_SEQUENTIAL, OP_ADD, TAG_ARRAY};

    fn base_image_one_array(key: u64, values: &[u16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&COOKIE_SEQUENTIAL.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        let key_bytes = key.to_le_bytes();
        buf.extend_from_slice(&key_bytes[0..6]);
        buf.push(TAG_ARRAY);
        buf.extend_from_slice(&((values.len() as u16) - 1).to_le_bytes());
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    fn append_add_record(buf: &mut Vec<u8>, base_prefix: &[u8], values: &[u64]) {
        let mut payload = Vec::new();
        for v in values {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let mut seed = Rolling::new();
        seed.write(base_prefix);
        seed.write(&payload);
        buf.push(OP_ADD);
        buf.push(0);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
        buf.extend_from_slice(&seed.finish().to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
    }

    #[test]
    fn decodes_base_image_with_no_op_log() {
        let buf = base_image_one_array(0, &[1, 2, 3]);
        let outcome = Bitmap::decode(&buf, true).unwrap();
        assert!(outcome.truncated_at.is_none());
        let bitmap = outcome.bitmap;
        assert_eq!(bitmap.container_count(), 1);
        assert_eq!(bitmap.ops(), 0);
        assert!(bitmap.get(0).unwrap().contains(2));
        assert!(bitmap.mapped_any());
    }

    #[test]
    fn replays_one_add_record() {
        let base = base_image_one_array(0, &[1, 2, 3]);
        let mut buf = base.clone();
        append_add_record(&mut buf, &base, &[4]);

        let outcome = Bitmap::decode(&buf, true).unwrap();
        assert!(outcome.truncated_at.is_none());
        let bitmap = outcome.bitmap;
        assert_eq!(bitmap.ops(), 1);
        assert_eq!(bitmap.op_bits(), 1);
        assert!(bitmap.get(0).unwrap().contains(4));
    }

    #[test]
    fn truncated_op_log_is_recoverable() {
        let base = base_image_one_array(0, &[1, 2, 3]);
        let mut buf = base.clone();
        append_add_record(&mut buf, &base, &[4]);
        buf.truncate(buf.len() - 2); // chop the tail of the last record's payload

        let outcome = Bitmap::decode(&buf, true).unwrap();
        assert!(outcome.truncated_at.is_some());
        // base image is untouched regardless of op-log corruption
        assert_eq!(outcome.bitmap.container_count(), 1);
        assert_eq!(outcome.bitmap.ops(), 0);
    }

    #[test]
    fn prefer_mapping_false_detaches_everything() {
        let buf = base_image_one_array(0, &[1, 2, 3]);
        let mut bitmap = Bitmap::decode(&buf, true).unwrap().bitmap;
        assert!(bitmap.mapped_any());
        bitmap.prefer_mapping(false);
        assert!(!bitmap.mapped_any());
    }
}
