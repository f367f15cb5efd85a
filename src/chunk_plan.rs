/// Chunk plan: global chunk id -> (pair id, byte range)
///
/// Chunks of one pair occupy one contiguous id range, pairs appear in
/// increasing pair id order. Stored as parallel arrays indexed by chunk id.
use log::{debug, warn};

use crate::chrom_pairs::ChromosomePairIndex;
use crate::positional_index::{ByteRange, PositionalIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: u32,
    pub pair_id: u32,
    pub range: ByteRange,
}

/// Chunks planned for one pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairChunks {
    pub pair_id: u32,
    pub first_chunk: u32,
    pub num_chunks: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkPlan {
    /// Per-chunk data (parallel arrays)
    pair_ids: Vec<u32>,
    ranges: Vec<ByteRange>,
    /// One entry per pair with at least one chunk, in pair id order
    pairs: Vec<PairChunks>,
}

impl ChunkPlan {
    /// Build from the positional index; pairs absent from it get no chunks
    pub fn build(pair_index: &ChromosomePairIndex, positional: &PositionalIndex) -> Self {
        let mut by_pair: Vec<Option<&[ByteRange]>> = vec![None; pair_index.len()];
        for (name, ranges) in positional.iter() {
            match pair_index.id_of_either(name) {
                Some(id) if id != 0 => {
                    if by_pair[id as usize].is_some() {
                        warn!("positional index lists pair {name} under both orientations; using the first");
                        continue;
                    }
                    by_pair[id as usize] = Some(ranges);
                }
                _ => debug!("positional index entry '{name}' matches no chromosome pair; skipped"),
            }
        }

        let mut plan = ChunkPlan::default();
        for (pair_id, ranges) in by_pair.into_iter().enumerate() {
            let Some(ranges) = ranges else { continue };
            if ranges.is_empty() {
                continue;
            }
            plan.pairs.push(PairChunks {
                pair_id: pair_id as u32,
                first_chunk: plan.pair_ids.len() as u32,
                num_chunks: ranges.len() as u32,
            });
            for &range in ranges {
                plan.pair_ids.push(pair_id as u32);
                plan.ranges.push(range);
            }
        }
        plan
    }

    pub fn total_chunks(&self) -> u32 {
        self.pair_ids.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.pair_ids.is_empty()
    }

    pub fn pair_of(&self, chunk_id: u32) -> Option<u32> {
        self.pair_ids.get(chunk_id as usize).copied()
    }

    pub fn range_of(&self, chunk_id: u32) -> Option<ByteRange> {
        self.ranges.get(chunk_id as usize).copied()
    }

    pub fn get(&self, chunk_id: u32) -> Option<Chunk> {
        Some(Chunk {
            chunk_id,
            pair_id: self.pair_of(chunk_id)?,
            range: self.range_of(chunk_id)?,
        })
    }

    /// Pairs that take part in compaction, in pair id order
    pub fn pairs(&self) -> &[PairChunks] {
        &self.pairs
    }

    pub fn chunks_of(&self, pair_id: u32) -> u32 {
        self.pairs
            .binary_search_by_key(&pair_id, |p| p.pair_id)
            .map_or(0, |i| self.pairs[i].num_chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GenomeCatalog;

    fn pair_index() -> ChromosomePairIndex {
        ChromosomePairIndex::new(&GenomeCatalog::new(vec![
            ("1".to_string(), 100),
            ("2".to_string(), 200),
        ]))
    }

    #[test]
    fn test_contiguous_ids() {
        let mut positional = PositionalIndex::new();
        positional.push("2-2", ByteRange::new(300, 10));
        positional.push("1-1", ByteRange::new(0, 10));
        positional.push("2-1", ByteRange::new(100, 10));
        positional.push("1-1", ByteRange::new(10, 10));

        let plan = ChunkPlan::build(&pair_index(), &positional);
        assert_eq!(plan.total_chunks(), 4);

        // Pairs in id order: 1-1 (id 1), 1-2 (id 2), 2-2 (id 3)
        let ids: Vec<u32> = (0..4).map(|c| plan.pair_of(c).unwrap()).collect();
        assert_eq!(ids, vec![1, 1, 2, 3]);
        assert_eq!(plan.range_of(1), Some(ByteRange::new(10, 10)));
        assert_eq!(plan.chunks_of(1), 2);
        assert_eq!(plan.chunks_of(0), 0);
        assert_eq!(plan.pairs().len(), 3);
    }

    #[test]
    fn test_empty_index() {
        let plan = ChunkPlan::build(&pair_index(), &PositionalIndex::new());
        assert!(plan.is_empty());
        assert_eq!(plan.pair_of(0), None);
        assert!(plan.pairs().is_empty());
    }

    #[test]
    fn test_unknown_pairs_skipped() {
        let mut positional = PositionalIndex::new();
        positional.push("1-X", ByteRange::new(0, 5));
        positional.push("All-All", ByteRange::new(5, 5));
        let plan = ChunkPlan::build(&pair_index(), &positional);
        assert!(plan.is_empty());
    }
}
