// Library exports for hic-compact
pub mod chrom_pairs;
pub mod chunk_plan;
pub mod codec;
pub mod composite;
pub mod config;
pub mod disk_usage;
pub mod error;
pub mod expected;
pub mod format;
pub mod genome;
pub mod master_index;
pub mod matrix;
pub mod pair_source;
pub mod pipeline;
pub mod positional_index;
pub mod scheduler;
pub mod shard_writer;
pub mod whole_genome;

pub use error::{CompactError, Result};
