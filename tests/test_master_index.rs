/// Master index placement properties
use proptest::prelude::*;
use std::path::PathBuf;

use hic_compact::master_index::MasterIndex;
use hic_compact::shard_writer::WrittenPair;

fn written(pair_id: u32, region_size: u64) -> WrittenPair {
    WrittenPair {
        pair_id,
        key: format!("pair{pair_id}"),
        files: vec![PathBuf::from(format!("pair_{pair_id}.shard"))],
        header_len: 12,
        region_size,
        block_slots: Vec::new(),
    }
}

/// Property: offsets are the running sum of region sizes in pair id order,
/// and the master index follows the last region
#[test]
fn prop_offsets_are_prefix_sums() {
    proptest!(|(
        header_len in 16u64..4096,
        sizes in prop::collection::vec(12u64..100_000, 0..40),
        rotate in 0usize..40
    )| {
        let mut pairs: Vec<WrittenPair> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| written(i as u32 * 2, s))
            .collect();
        // Completion order is arbitrary
        if !pairs.is_empty() {
            let k = rotate % pairs.len();
            pairs.rotate_left(k);
        }

        let index = MasterIndex::build(header_len, &pairs).unwrap();
        let mut cursor = header_len;
        for (i, placement) in index.placements().iter().enumerate() {
            prop_assert_eq!(placement.pair_id, i as u32 * 2);
            prop_assert_eq!(placement.offset, cursor);
            cursor += sizes[i];
        }
        prop_assert_eq!(index.position(), header_len + sizes.iter().sum::<u64>());
        prop_assert_eq!(index.entries().len(), sizes.len());
    });
}

#[test]
fn test_empty_master_index_sits_after_header() {
    let index = MasterIndex::build(128, &[]).unwrap();
    assert_eq!(index.position(), 128);
    assert!(index.entries().is_empty());
    // Entry count only
    assert_eq!(index.encode().unwrap(), vec![0, 0, 0, 0]);
}
