//! A non-destructive decode variant that reports on structure instead of
//! just handing back a [`Bitmap`]: per-container and per-op facts, useful
//! for a diagnostic tool that needs to explain a file rather than just use
//! it.

use crate::bitmap::{log_truncation, Bitmap};
use crate::checksum::Rolling;
use crate::container::ContainerInfo;
use crate::error::DecodeError;
use crate::oplog::OpLogReader;
use crate::reader::BaseReader;
use crate::store::ContainerStore;

/// One applied (or attempted) op-log record, as seen by [`inspect`].
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub op_type: u8,
    pub count_of_bits: u32,
    pub offset: usize,
}

/// A structural report produced alongside the decoded [`Bitmap`].
pub struct Report {
    pub container_count: usize,
    pub bit_count: u64,
    /// Number of containers whose payload was touched by at least one op.
    pub op_containers: usize,
    pub mapped_any: bool,
    pub containers: Vec<ContainerInfo>,
    pub ops: Vec<OpInfo>,
    /// Set if op-log replay stopped early; see [`crate::bitmap::DecodeOutcome`].
    pub truncated_at: Option<DecodeError>,
    /// The byte range of `buf` this report was built from, `[from, to)`.
    pub source_range: (usize, usize),
}

/// Decodes `buf` like [`Bitmap::decode`], but also walks the result to build
/// a [`Report`]. A base-image error is still fatal; op-log corruption is
/// still recorded rather than propagated, exactly as in `decode`.
pub fn inspect(buf: &[u8], prefer_mapping: bool) -> Result<(Bitmap<'_>, Report), DecodeError> {
    let mut reader = BaseReader::new(buf, prefer_mapping)?;
    let mut store = ContainerStore::new();
    while let Some(result) = reader.next() {
        store.put(result?);
    }
    let (tail, tail_offset) = reader.remaining();

    let mut seed = Rolling::new();
    seed.write(&buf[..tail_offset]);

    let mut oplog = OpLogReader::new(tail, tail_offset, prefer_mapping, seed);
    let mut ops_seen = Vec::new();
    let mut truncated_at = None;
    loop {
        match oplog.next() {
            Some(Ok(record)) => {
                ops_seen.push(OpInfo {
                    op_type: record.op.type_tag(),
                    count_of_bits: record.count_of_bits,
                    offset: record.offset,
                });
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

    let containers: Vec<ContainerInfo> = store.iter(0).map(|(_, c)| c.info()).collect();
    let container_count = containers.len();
    let bit_count = containers.iter().map(|info| u64::from(info.cardinality)).sum();
    let op_containers = containers.iter().filter(|info| !info.pristine).count();
    let mapped_any = containers.iter().any(|info| info.mapped);

    let report = Report {
        container_count,
        bit_count,
        op_containers,
        mapped_any,
        containers,
        ops: ops_seen,
        truncated_at,
        source_range: (0, buf.len()),
    };

    let ops = report.ops.len() as u64;
    let op_bits = report.ops.iter().map(|o| u64::from(o.count_of_bits)).sum();
    let bitmap = Bitmap::from_parts(store, ops, op_bits, prefer_mapping);

    Ok((bitmap, report))
}
