//! Per chromosome-pair sparse count matrices at every configured resolution
//!
//! A `PairAccumulator` is filled by one worker, merged with the partial
//! accumulators other workers built for the same pair, and finally frozen by
//! `parsing_complete`, which applies the count threshold and buckets the
//! surviving cells into serialization blocks.
//!
//! Block bucketing for intra-chromosomal pairs follows the diagonal: cells are
//! grouped by their position along the diagonal and by a logarithmic distance
//! band away from it, so near-diagonal density ends up in few blocks.

use std::collections::{BTreeMap, HashMap};

use crate::config::{CompactionConfig, Resolution, Unit};
use crate::error::{CompactError, Result};
use crate::expected::ExpectedValues;
use crate::genome::GenomeCatalog;

/// Settings shared by every accumulator of one run
#[derive(Debug, Clone)]
pub struct MatrixSettings {
    pub resolutions: Vec<Resolution>,
    pub min_count: f64,
    pub depth_base: u32,
    pub block_capacity: u32,
}

impl MatrixSettings {
    pub fn from_config(config: &CompactionConfig) -> Self {
        MatrixSettings {
            resolutions: config.resolutions(),
            min_count: config.min_count,
            depth_base: config.depth_base,
            block_capacity: config.block_capacity,
        }
    }

    /// Same settings with a different per-block capacity
    pub fn with_block_capacity(&self, block_capacity: u32) -> Self {
        MatrixSettings {
            block_capacity: block_capacity.max(1),
            ..self.clone()
        }
    }
}

/// One populated cell; `row` is the bin on `chr1`, `col` the bin on `chr2`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactCell {
    pub row: u32,
    pub col: u32,
    pub count: f32,
}

/// Sparse matrix of one pair at one resolution
#[derive(Debug, Clone)]
pub struct ZoomMatrix {
    resolution: Resolution,
    intra: bool,
    block_bin_count: u32,
    block_column_count: u32,
    depth_base: u32,
    cells: HashMap<(u32, u32), f64>,
    sum: f64,
    blocks: BTreeMap<u32, Vec<ContactCell>>,
}

impl ZoomMatrix {
    fn new(resolution: Resolution, intra: bool, n_bins_col: u32, settings: &MatrixSettings) -> Self {
        let block_bin_count = ((settings.block_capacity as f64).sqrt().floor() as u32).max(1);
        ZoomMatrix {
            resolution,
            intra,
            block_bin_count,
            block_column_count: n_bins_col / block_bin_count + 1,
            depth_base: settings.depth_base,
            cells: HashMap::new(),
            sum: 0.0,
            blocks: BTreeMap::new(),
        }
    }

    fn add(&mut self, row: u32, col: u32, score: f64) {
        *self.cells.entry((row, col)).or_insert(0.0) += score;
    }

    /// Block number of a cell
    ///
    /// Fails when the block grid of this resolution does not fit in `u32`.
    pub fn block_number(&self, row: u32, col: u32) -> Result<u32> {
        let bin_count = self.block_bin_count as u64;
        let columns = self.block_column_count as u64;
        let block = if self.intra && self.depth_base > 1 {
            let position_along_diagonal = (row as u64 + col as u64) / 2 / bin_count;
            let distance = col.abs_diff(row) as f64;
            let depth = ((1.0 + distance / std::f64::consts::SQRT_2 / bin_count as f64).ln()
                / (self.depth_base as f64).ln())
            .floor() as u64;
            depth * columns + position_along_diagonal
        } else {
            (row as u64 / bin_count) * columns + col as u64 / bin_count
        };
        u32::try_from(block).map_err(|_| {
            CompactError::consistency(format!(
                "block number {block} of cell ({row}, {col}) at {} exceeds the block index range; raise the block capacity",
                self.resolution
            ))
        })
    }

    fn finalize(&mut self, min_count: f64) -> Result<()> {
        let mut blocks: BTreeMap<u32, Vec<ContactCell>> = BTreeMap::new();
        let mut sum = 0.0;
        for ((row, col), count) in std::mem::take(&mut self.cells) {
            if count < min_count {
                continue;
            }
            sum += count;
            let cell = ContactCell {
                row,
                col,
                count: count as f32,
            };
            let block = self.block_number(row, col)?;
            blocks.entry(block).or_default().push(cell);
        }
        for cells in blocks.values_mut() {
            cells.sort_unstable_by_key(|c| (c.row, c.col));
        }
        self.blocks = blocks;
        self.sum = sum;
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn block_bin_count(&self) -> u32 {
        self.block_bin_count
    }

    pub fn block_column_count(&self) -> u32 {
        self.block_column_count
    }

    /// Sum of retained counts (valid after finalization)
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Finalized blocks in increasing block number
    pub fn blocks(&self) -> &BTreeMap<u32, Vec<ContactCell>> {
        &self.blocks
    }

    pub fn occupied_cells(&self) -> u64 {
        if self.blocks.is_empty() {
            self.cells.len() as u64
        } else {
            self.blocks.values().map(|b| b.len() as u64).sum()
        }
    }

    /// Current value of a cell before finalization
    pub fn count(&self, row: u32, col: u32) -> f64 {
        self.cells.get(&(row, col)).copied().unwrap_or(0.0)
    }

    /// Sum over all cells before finalization
    pub fn running_total(&self) -> f64 {
        self.cells.values().sum()
    }

    pub fn cells(&self) -> impl Iterator<Item = ((u32, u32), f64)> + '_ {
        self.cells.iter().map(|(&k, &v)| (k, v))
    }
}

/// Accumulator for one chromosome pair (MatrixPP)
#[derive(Debug, Clone)]
pub struct PairAccumulator {
    chr1: u32,
    chr2: u32,
    zooms: Vec<ZoomMatrix>,
    contacts: u64,
    finalized: bool,
}

impl PairAccumulator {
    pub fn new(chr1: u32, chr2: u32, catalog: &GenomeCatalog, settings: &MatrixSettings) -> Self {
        let zooms = settings
            .resolutions
            .iter()
            .map(|&resolution| {
                let extent = match resolution.unit {
                    Unit::Bp => catalog.length(chr2),
                    Unit::Frag => catalog.fragment_count(chr2) as u64,
                };
                let n_bins = (extent / resolution.bin_size as u64 + 1).min(u32::MAX as u64) as u32;
                ZoomMatrix::new(resolution, chr1 == chr2, n_bins, settings)
            })
            .collect();

        PairAccumulator {
            chr1,
            chr2,
            zooms,
            contacts: 0,
            finalized: false,
        }
    }

    pub fn chr1(&self) -> u32 {
        self.chr1
    }

    pub fn chr2(&self) -> u32 {
        self.chr2
    }

    pub fn zooms(&self) -> &[ZoomMatrix] {
        &self.zooms
    }

    pub fn contacts(&self) -> u64 {
        self.contacts
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_empty(&self) -> bool {
        self.zooms.iter().all(|z| z.cells.is_empty() && z.blocks.is_empty())
    }

    /// Route one contact into every resolution
    ///
    /// Intra-chromosomal contacts are also fed into `expected`, whose entries
    /// are in the same order as the resolutions.
    pub fn increment_count(
        &mut self,
        pos1: u32,
        pos2: u32,
        frag1: u32,
        frag2: u32,
        score: f32,
        mut expected: Option<&mut ExpectedValues>,
    ) {
        debug_assert!(!self.finalized, "increment after parsing_complete");
        let intra = self.chr1 == self.chr2;
        let score = score as f64;

        for (i, zoom) in self.zooms.iter_mut().enumerate() {
            let (c1, c2) = match zoom.resolution.unit {
                Unit::Bp => (pos1, pos2),
                Unit::Frag => (frag1, frag2),
            };
            let mut row = c1 / zoom.resolution.bin_size;
            let mut col = c2 / zoom.resolution.bin_size;
            if intra && row > col {
                std::mem::swap(&mut row, &mut col);
            }
            zoom.add(row, col, score);

            if intra {
                if let Some(ev) = expected.as_deref_mut() {
                    ev.add_distance(i, self.chr1, row, col, score);
                }
            }
        }
        self.contacts += 1;
    }

    /// Add `other`'s counts cell-wise; `other` must describe the same pair
    pub fn merge_matrices(&mut self, other: &PairAccumulator) -> Result<()> {
        if (self.chr1, self.chr2) != (other.chr1, other.chr2) {
            return Err(CompactError::consistency(format!(
                "cannot merge matrix {}_{} into {}_{}",
                other.chr1, other.chr2, self.chr1, self.chr2
            )));
        }
        if self.finalized || other.finalized {
            return Err(CompactError::consistency(format!(
                "cannot merge finalized matrix {}_{}",
                self.chr1, self.chr2
            )));
        }
        if self.zooms.len() != other.zooms.len() {
            return Err(CompactError::consistency(format!(
                "resolution mismatch while merging matrix {}_{}",
                self.chr1, self.chr2
            )));
        }

        for (mine, theirs) in self.zooms.iter_mut().zip(&other.zooms) {
            if mine.resolution != theirs.resolution {
                return Err(CompactError::consistency(format!(
                    "resolution {} merged into {}",
                    theirs.resolution, mine.resolution
                )));
            }
            mine.cells.reserve(theirs.cells.len());
            for (&(row, col), &count) in &theirs.cells {
                mine.add(row, col, count);
            }
        }
        self.contacts += other.contacts;
        Ok(())
    }

    /// Freeze: drop cells below `min_count` and bucket the rest into blocks
    pub fn parsing_complete(&mut self, min_count: f64) -> Result<()> {
        if self.finalized {
            return Err(CompactError::consistency(format!(
                "matrix {}_{} finalized twice",
                self.chr1, self.chr2
            )));
        }
        for zoom in &mut self.zooms {
            zoom.finalize(min_count)?;
        }
        self.finalized = true;
        Ok(())
    }
}
