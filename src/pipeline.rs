//! Orchestration of one compaction run
use log::info;
use std::path::Path;
use std::time::Instant;

use crate::chrom_pairs::{ChromosomePairIndex, WHOLE_GENOME_PAIR};
use crate::chunk_plan::ChunkPlan;
use crate::codec::BlockCodec;
use crate::composite;
use crate::config::CompactionConfig;
use crate::disk_usage::DiskUsage;
use crate::error::{CompactError, Result};
use crate::expected::ExpectedValues;
use crate::genome::GenomeCatalog;
use crate::master_index::MasterIndex;
use crate::pair_source::PairSource;
use crate::positional_index::PositionalIndex;
use crate::scheduler::CompactionScheduler;
use crate::shard_writer::ShardWriter;
use crate::whole_genome;

/// Summary of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Pair regions in the output, whole genome included
    pub pairs_written: usize,
    pub chunks: u32,
    pub contacts: u64,
    /// Size of the composite file
    pub bytes: u64,
}

/// Compact every chunk the positional index names into `output`
///
/// Shard files are created in `work_dir` and removed once concatenated.
pub fn run(
    config: &CompactionConfig,
    catalog: &GenomeCatalog,
    positional: &PositionalIndex,
    source: &dyn PairSource,
    codec: &dyn BlockCodec,
    output: &Path,
    work_dir: &Path,
) -> Result<CompactionReport> {
    config.validate(catalog.has_fragment_sites())?;
    let start = Instant::now();

    let pairs = ChromosomePairIndex::new(catalog);
    let plan = ChunkPlan::build(&pairs, positional);
    info!(
        "{} chromosomes, {} pairs, {} chunks planned",
        catalog.len().saturating_sub(1),
        pairs.len(),
        plan.total_chunks()
    );

    let usage = DiskUsage::new();
    let writer = ShardWriter::new(work_dir, codec, &usage);
    let out = CompactionScheduler::new(config, catalog, &pairs, &plan, source, &writer).run()?;
    let contacts = out.contacts();
    let chunks = out.chunks();

    let mut expected = ExpectedValues::default();
    let mut partials = Vec::with_capacity(out.workers.len());
    for worker in out.workers {
        expected.merge(&worker.expected)?;
        partials.push(worker.whole_genome);
    }

    let settings = whole_genome::whole_genome_settings(catalog, config);
    let mut whole = whole_genome::merge_partials(catalog, &settings, partials)?;
    whole.parsing_complete(0.0)?;
    let whole_pair = pairs
        .get(WHOLE_GENOME_PAIR)
        .ok_or_else(|| CompactError::consistency("pair index has no whole-genome pair"))?;
    let mut written = out.written;
    written.push(writer.write_pair(whole_pair, &whole, 1)?);

    let header_len = composite::file_header(catalog, config, 0).encoded_len();
    let master = MasterIndex::build(header_len, &written)?;
    master.relocate_all(&written)?;
    let header = composite::file_header(catalog, config, master.position());
    let bytes = composite::assemble(output, &header, &written, &master, &expected.vectors(), &usage)?;

    usage.log_summary();
    info!(
        "Compacted {} contacts from {} chunks into {} pairs in {:.2}s",
        contacts,
        chunks,
        written.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(CompactionReport {
        pairs_written: written.len(),
        chunks,
        contacts,
        bytes,
    })
}
