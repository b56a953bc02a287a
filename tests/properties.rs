//! Property-based checks for the invariants and boundary behaviors this
//! format is expected to hold, built on hand-assembled base images the same
//! way `scenarios.rs` does.

use proptest::prelude::*;
use roaring_image::Bitmap;

const COOKIE_SEQUENTIAL: u32 = 0x5242_4D31;
const TAG_ARRAY: u8 = 1;

fn array_base_image(keys_and_values: &[(u64, Vec<u16>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&COOKIE_SEQUENTIAL.to_le_bytes());
    buf.extend_from_slice(&(keys_and_values.len() as u32).to_le_bytes());
    for (key, values) in keys_and_values {
        buf.extend_from_slice(&key.to_le_bytes()[0..6]);
        buf.push(TAG_ARRAY);
        buf.extend_from_slice(&((values.len() as u16) - 1).to_le_bytes());
    }
    for (_, values) in keys_and_values {
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
    buf
}

fn sorted_dedup(mut values: Vec<u16>) -> Vec<u16> {
    values.sort_unstable();
    values.dedup();
    values
}

proptest! {
    /// Invariant 1: declared cardinality equals the number of values
    /// actually present in the container.
    #[test]
    fn cardinality_matches_membership(mut raw in prop::collection::vec(0u16..4096, 1..200)) {
        raw = sorted_dedup(raw);
        prop_assume!(!raw.is_empty());
        let buf = array_base_image(&[(3, raw.clone())]);
        let outcome = Bitmap::decode(&buf, true).unwrap();
        let container = outcome.bitmap.get(3).unwrap();
        prop_assert_eq!(container.cardinality() as usize, raw.len());
        prop_assert_eq!(container.iter().count(), raw.len());
    }

    /// Invariant 2: container iteration yields strictly ascending keys,
    /// regardless of the order containers were declared in the header.
    #[test]
    fn container_iteration_is_ascending(mut keys in prop::collection::vec(0u64..1000, 1..20)) {
        keys.sort_unstable();
        keys.dedup();
        let groups: Vec<(u64, Vec<u16>)> = keys.iter().map(|&k| (k, vec![0u16])).collect();
        let buf = array_base_image(&groups);
        let outcome = Bitmap::decode(&buf, true).unwrap();
        let seen: Vec<u64> = outcome.bitmap.iter(0).map(|(k, _)| k).collect();
        let mut sorted_seen = seen.clone();
        sorted_seen.sort_unstable();
        prop_assert_eq!(seen, sorted_seen);
    }
}

/// Boundary: an empty base image (K=0, no ops) decodes with no containers.
#[test]
fn empty_bitmap_has_no_containers() {
    let buf = array_base_image(&[]);
    let outcome = Bitmap::decode(&buf, true).unwrap();
    assert!(outcome.truncated_at.is_none());
    assert!(outcome.bitmap.is_empty());
    assert_eq!(outcome.bitmap.iter(0).count(), 0);
}

/// `unmap_or_clone` (via `prefer_mapping(false)`) is idempotent, and
/// subsequent mutation through the op log no longer touches the source
/// buffer at all.
#[test]
fn detaching_is_idempotent_and_severs_the_source_buffer() {
    let buf = array_base_image(&[(0, vec![1, 2, 3])]);
    let mut bitmap = Bitmap::decode(&buf, true).unwrap().bitmap;
    assert!(bitmap.mapped_any());

    bitmap.prefer_mapping(false);
    assert!(!bitmap.mapped_any());
    bitmap.prefer_mapping(false);
    assert!(!bitmap.mapped_any());

    // the original buffer is untouched no matter what happens to `bitmap`
    // from here; decoding it again gives the same membership.
    let again = Bitmap::decode(&buf, true).unwrap().bitmap;
    assert_eq!(
        again.get(0).unwrap().iter().collect::<Vec<_>>(),
        bitmap.get(0).unwrap().iter().collect::<Vec<_>>(),
    );
}

/// Decoding the same buffer twice produces equivalent bitmaps.
#[test]
fn decode_is_repeatable() {
    let buf = array_base_image(&[(1, vec![10, 20, 30]), (2, vec![5])]);
    let first = Bitmap::decode(&buf, true).unwrap().bitmap;
    let second = Bitmap::decode(&buf, true).unwrap().bitmap;
    assert_eq!(first.container_count(), second.container_count());
    for ((k1, c1), (k2, c2)) in first.iter(0).zip(second.iter(0)) {
        assert_eq!(k1, k2);
        assert_eq!(c1.iter().collect::<Vec<_>>(), c2.iter().collect::<Vec<_>>());
    }
}
