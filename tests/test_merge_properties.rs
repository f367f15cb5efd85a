/// Property-based tests for pair accumulator merging
///
/// However the contacts of a pair are split between workers, merging the
/// partial accumulators must give the same cells as accumulating everything
/// in one place.
mod test_utils;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use hic_compact::config::Resolution;
use hic_compact::expected::ExpectedValues;
use hic_compact::genome::GenomeCatalog;
use hic_compact::matrix::{MatrixSettings, PairAccumulator};
use test_utils::catalog;

fn settings() -> MatrixSettings {
    MatrixSettings {
        resolutions: vec![Resolution::bp(100), Resolution::bp(7)],
        min_count: 0.0,
        depth_base: 2,
        block_capacity: 64,
    }
}

fn genome() -> GenomeCatalog {
    catalog(&[("1", 1000), ("2", 2000)])
}

fn cells(m: &PairAccumulator) -> Vec<BTreeMap<(u32, u32), f64>> {
    m.zooms().iter().map(|z| z.cells().collect()).collect()
}

/// Property: merging random partitions preserves every cell and the total
#[test]
fn prop_merge_preserves_sums() {
    proptest!(|(
        contacts in prop::collection::vec((0u32..1000, 0u32..2000, 1u32..4), 0..200),
        workers in 1usize..=8,
        seed in any::<u64>(),
        intra in any::<bool>()
    )| {
        let cat = genome();
        let chr2 = if intra { 1 } else { 2 };
        let mut rng = StdRng::seed_from_u64(seed);

        let mut whole = PairAccumulator::new(1, chr2, &cat, &settings());
        let mut partials: Vec<PairAccumulator> =
            (0..workers).map(|_| PairAccumulator::new(1, chr2, &cat, &settings())).collect();
        for &(pos1, pos2, score) in &contacts {
            let pos2 = if intra { pos2 % 1000 } else { pos2 };
            whole.increment_count(pos1, pos2, 0, 0, score as f32, None);
            partials[rng.gen_range(0..workers)].increment_count(pos1, pos2, 0, 0, score as f32, None);
        }

        let mut merged = PairAccumulator::new(1, chr2, &cat, &settings());
        for p in &partials {
            merged.merge_matrices(p).unwrap();
        }

        prop_assert_eq!(cells(&merged), cells(&whole));
        prop_assert_eq!(merged.contacts(), contacts.len() as u64);
        let expected_total: f64 = contacts.iter().map(|c| c.2 as f64).sum();
        for zoom in merged.zooms() {
            prop_assert_eq!(zoom.running_total(), expected_total);
        }
    });
}

/// Property: merging an empty accumulator changes nothing, in either direction
#[test]
fn prop_merge_identity() {
    proptest!(|(
        contacts in prop::collection::vec((0u32..1000, 0u32..2000), 1..100)
    )| {
        let cat = genome();
        let mut m = PairAccumulator::new(1, 2, &cat, &settings());
        for &(pos1, pos2) in &contacts {
            m.increment_count(pos1, pos2, 0, 0, 1.0, None);
        }
        let before = cells(&m);

        m.merge_matrices(&PairAccumulator::new(1, 2, &cat, &settings())).unwrap();
        prop_assert_eq!(cells(&m), before.clone());

        let mut empty = PairAccumulator::new(1, 2, &cat, &settings());
        empty.merge_matrices(&m).unwrap();
        prop_assert_eq!(cells(&empty), before);
    });
}

/// Property: finalization keeps exactly the cells at or above the threshold
#[test]
fn prop_threshold_after_merge() {
    proptest!(|(
        contacts in prop::collection::vec((0u32..1000, 0u32..1000), 1..150),
        min_count in 1u32..4
    )| {
        let cat = genome();
        let mut a = PairAccumulator::new(1, 1, &cat, &settings());
        let mut b = PairAccumulator::new(1, 1, &cat, &settings());
        for (i, &(pos1, pos2)) in contacts.iter().enumerate() {
            let target = if i % 2 == 0 { &mut a } else { &mut b };
            target.increment_count(pos1, pos2, 0, 0, 1.0, None);
        }
        a.merge_matrices(&b).unwrap();
        let raw = cells(&a);
        a.parsing_complete(min_count as f64).unwrap();

        for (zoom, raw_cells) in a.zooms().iter().zip(&raw) {
            let kept: BTreeMap<(u32, u32), f64> = zoom
                .blocks()
                .values()
                .flatten()
                .map(|c| ((c.row, c.col), c.count as f64))
                .collect();
            let want: BTreeMap<(u32, u32), f64> = raw_cells
                .iter()
                .filter(|(_, v)| **v >= min_count as f64)
                .map(|(&k, &v)| (k, v))
                .collect();
            prop_assert_eq!(kept, want);
        }
    });
}

/// Worker-local expected values summed afterwards equal one global pass
#[test]
fn test_expected_values_merge_across_workers() {
    let cat = genome();
    let resolutions = settings().resolutions;
    let mut rng = StdRng::seed_from_u64(5);

    let mut global = ExpectedValues::new(&resolutions, &cat);
    let mut workers: Vec<ExpectedValues> = (0..4).map(|_| ExpectedValues::new(&resolutions, &cat)).collect();
    let mut sink = PairAccumulator::new(2, 2, &cat, &settings());
    let mut local = PairAccumulator::new(2, 2, &cat, &settings());
    for _ in 0..500 {
        let pos1 = rng.gen_range(0..2000);
        let pos2 = rng.gen_range(0..2000);
        sink.increment_count(pos1, pos2, 0, 0, 1.0, Some(&mut global));
        let w = rng.gen_range(0..workers.len());
        local.increment_count(pos1, pos2, 0, 0, 1.0, Some(&mut workers[w]));
    }

    let mut merged = ExpectedValues::default();
    for w in &workers {
        merged.merge(w).unwrap();
    }
    for (key, calc) in global.iter() {
        assert_eq!(merged.get(key).unwrap().actual(), calc.actual());
    }
    assert_eq!(merged.vectors(), global.vectors());
}
