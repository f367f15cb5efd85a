/// Genome-wide overview matrix (pair 0)
///
/// Every contact of an included pair is projected onto one concatenated genome coordinate,
/// scaled down by `GENOME_WIDE_SCALE`, and counted in a single low-resolution
/// accumulator. Workers keep private partials that are merged at the end.
use crate::config::{CompactionConfig, Resolution};
use crate::error::Result;
use crate::genome::{GenomeCatalog, GENOME_WIDE_SCALE};
use crate::matrix::{MatrixSettings, PairAccumulator};
use crate::pair_source::ContactRecord;

/// Number of bins along one side of the whole-genome matrix
pub const WHOLE_GENOME_BINS: u64 = 1000;

/// Project a chromosome position onto the genome-wide axis
pub fn genomic_position(catalog: &GenomeCatalog, chr: u32, pos: u32) -> u32 {
    ((catalog.cumulative_length_before(chr) + pos as u64) / GENOME_WIDE_SCALE) as u32
}

/// Bin size of the single whole-genome resolution
pub fn whole_genome_bin_size(catalog: &GenomeCatalog) -> u32 {
    (catalog.length(0) / WHOLE_GENOME_BINS).max(1) as u32
}

pub fn whole_genome_settings(catalog: &GenomeCatalog, config: &CompactionConfig) -> MatrixSettings {
    MatrixSettings {
        resolutions: vec![Resolution::bp(whole_genome_bin_size(catalog))],
        min_count: 0.0,
        depth_base: config.depth_base,
        block_capacity: config.block_capacity,
    }
}

/// Empty accumulator for the `All-All` pair
pub fn new_accumulator(catalog: &GenomeCatalog, settings: &MatrixSettings) -> PairAccumulator {
    PairAccumulator::new(0, 0, catalog, settings)
}

/// Count one contact in a whole-genome accumulator
pub fn add_contact(matrix: &mut PairAccumulator, catalog: &GenomeCatalog, record: &ContactRecord) {
    let pos1 = genomic_position(catalog, record.chr1, record.pos1);
    let pos2 = genomic_position(catalog, record.chr2, record.pos2);
    matrix.increment_count(pos1, pos2, pos1, pos2, record.score, None);
}

/// Merge per-worker partials into one accumulator
pub fn merge_partials<I>(catalog: &GenomeCatalog, settings: &MatrixSettings, partials: I) -> Result<PairAccumulator>
where
    I: IntoIterator<Item = PairAccumulator>,
{
    let mut merged = new_accumulator(catalog, settings);
    for partial in partials {
        merged.merge_matrices(&partial)?;
    }
    Ok(merged)
}
