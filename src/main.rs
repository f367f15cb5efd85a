use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;

use hic_compact::codec::{BlockCodec, DeflateCodec, IdentityCodec};
use hic_compact::config::{parse_metric_number, CompactionConfig, DEFAULT_BLOCK_CAPACITY};
use hic_compact::genome::GenomeCatalog;
use hic_compact::pair_source::MergedNoDupsSource;
use hic_compact::pipeline;
use hic_compact::positional_index::PositionalIndex;

/// hic-compact - compact Hi-C contact pairs into a block-indexed matrix file
///
/// Chunks listed in the positional index are accumulated per chromosome pair
/// by a pool of workers, written as compressed shards and concatenated into
/// one file with a master index.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Sorted merged-nodups pair file
    #[clap(value_name = "PAIRS")]
    pairs: PathBuf,

    /// Output matrix file
    #[clap(value_name = "OUTPUT")]
    output: PathBuf,

    /// Chromosome sizes (name and length per line)
    #[clap(short = 'g', long = "genome")]
    genome: PathBuf,

    /// Positional index of the pair file (pair,chunk,offset,length per line)
    #[clap(short = 'i', long = "index")]
    index: PathBuf,

    /// Number of worker threads
    #[clap(short = 't', long = "threads", default_value = "1")]
    threads: usize,

    /// Base-pair resolutions, comma separated (e.g. 2.5m,1m,25k)
    #[clap(short = 'r', long = "resolutions", value_delimiter = ',', value_parser = parse_metric_number)]
    resolutions: Vec<u32>,

    /// Fragment resolutions, comma separated (requires --sites)
    #[clap(short = 'f', long = "frag-resolutions", value_delimiter = ',', value_parser = parse_metric_number)]
    frag_resolutions: Vec<u32>,

    /// Restriction site file (chromosome followed by site positions per line)
    #[clap(short = 's', long = "sites")]
    sites: Option<PathBuf>,

    /// Drop cells whose summed count is below this value
    #[clap(short = 'm', long = "min-count", default_value = "0")]
    min_count: f64,

    /// Nominal number of cells per block
    #[clap(long = "block-capacity", default_value_t = DEFAULT_BLOCK_CAPACITY, value_parser = parse_metric_number)]
    block_capacity: u32,

    /// Base of the diagonal depth bands; 1 disables diagonal blocks
    #[clap(long = "depth-base", default_value = "2")]
    depth_base: u32,

    /// Only write pairs touching these chromosomes (comma separated)
    #[clap(short = 'c', long = "include", value_delimiter = ',')]
    include: Vec<String>,

    /// Skip records whose mapping quality is below this value
    #[clap(short = 'q', long = "min-mapq", default_value = "0")]
    min_mapq: u32,

    /// Skip intra-chromosomal records whose ends fall in the same fragment
    #[clap(long = "skip-intra-fragment")]
    skip_intra_fragment: bool,

    /// Genome identifier recorded in the header
    #[clap(long = "genome-id", default_value = "unknown")]
    genome_id: String,

    /// Store blocks uncompressed
    #[clap(long = "no-compression")]
    no_compression: bool,

    /// Directory for shard files (system temp dir if not specified)
    #[clap(long = "tmp-dir")]
    tmp_dir: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[clap(long = "quiet", conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn config(&self) -> CompactionConfig {
        let defaults = CompactionConfig::default();
        CompactionConfig {
            threads: self.threads,
            bp_resolutions: if self.resolutions.is_empty() {
                defaults.bp_resolutions
            } else {
                self.resolutions.clone()
            },
            frag_resolutions: self.frag_resolutions.clone(),
            min_count: self.min_count,
            block_capacity: self.block_capacity,
            depth_base: self.depth_base,
            included_chromosomes: (!self.include.is_empty())
                .then(|| self.include.iter().cloned().collect::<HashSet<String>>()),
            min_mapq: self.min_mapq,
            skip_intra_fragment: self.skip_intra_fragment,
            genome_id: self.genome_id.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else if args.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        })
        .init();

    let config = args.config();

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build_global()
        .context("Failed to configure thread pool")?;

    let mut catalog = GenomeCatalog::from_chrom_sizes(&args.genome)
        .with_context(|| format!("Failed to read chromosome sizes from {}", args.genome.display()))?;
    if let Some(sites) = &args.sites {
        let counts = GenomeCatalog::read_fragment_sites(sites)
            .with_context(|| format!("Failed to read restriction sites from {}", sites.display()))?;
        catalog = catalog.with_fragment_sites(&counts);
    }

    let positional = PositionalIndex::open(&args.index)
        .with_context(|| format!("Failed to read positional index {}", args.index.display()))?;

    let source = MergedNoDupsSource::new(&args.pairs, &catalog)
        .with_min_mapq(config.min_mapq)
        .with_skip_intra_fragment(config.skip_intra_fragment);

    let codec: Box<dyn BlockCodec> = if args.no_compression {
        Box::new(IdentityCodec)
    } else {
        Box::new(DeflateCodec::default())
    };

    let work_dir = match &args.tmp_dir {
        Some(dir) => tempfile::Builder::new()
            .prefix("hic-compact-")
            .tempdir_in(dir)
            .with_context(|| format!("Failed to create work directory in {}", dir.display()))?,
        None => tempfile::Builder::new()
            .prefix("hic-compact-")
            .tempdir()
            .context("Failed to create work directory")?,
    };

    let report = pipeline::run(
        &config,
        &catalog,
        &positional,
        &source,
        codec.as_ref(),
        &args.output,
        work_dir.path(),
    )
    .with_context(|| format!("Failed to compact {}", args.pairs.display()))?;

    if source.skipped_records() > 0 {
        log::info!("Skipped {} filtered or unplaced records", source.skipped_records());
    }
    log::info!(
        "Done: {} pairs, {} chunks, {} contacts, {} bytes written to {}",
        report.pairs_written,
        report.chunks,
        report.contacts,
        report.bytes,
        args.output.display()
    );
    Ok(())
}
