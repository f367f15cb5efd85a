//! Serialize finalized pair accumulators into shard files
//!
//! A pair's region is its matrix header followed by the compressed blocks of
//! every resolution. When several workers contributed to a pair, the blocks
//! are spread over `contributors × resolutions` lane files that are compressed
//! in parallel; the main file then holds only the header. Concatenating the
//! main file and the lanes in order yields the region.

use log::debug;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::chrom_pairs::ChromosomePair;
use crate::codec::BlockCodec;
use crate::disk_usage::DiskUsage;
use crate::error::{CompactError, Result};
use crate::format::{encode_block, BlockIndexRecord, IndexEntry, MatrixHeader, ZoomHeader};
use crate::matrix::{ContactCell, PairAccumulator};

/// Block-index position field inside a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSlot {
    /// Byte offset of the `position` field from the region start
    pub offset: u64,
    /// Region-relative position of the block
    pub position: u64,
}

/// Everything needed to place one pair's region in the composite file
#[derive(Debug, Clone)]
pub struct WrittenPair {
    pub pair_id: u32,
    pub key: String,
    /// Main file first, then lane files in order
    pub files: Vec<PathBuf>,
    pub header_len: u32,
    pub region_size: u64,
    pub block_slots: Vec<BlockSlot>,
}

/// Blocks of one resolution assigned to one lane
struct Lane<'m> {
    zoom: usize,
    blocks: Vec<(u32, &'m [ContactCell])>,
}

pub struct ShardWriter<'a> {
    dir: PathBuf,
    codec: &'a dyn BlockCodec,
    usage: &'a DiskUsage,
    written: Mutex<HashSet<(u32, u32)>>,
}

impl<'a> ShardWriter<'a> {
    pub fn new<P: AsRef<Path>>(dir: P, codec: &'a dyn BlockCodec, usage: &'a DiskUsage) -> Self {
        ShardWriter {
            dir: dir.as_ref().to_path_buf(),
            codec,
            usage,
            written: Mutex::new(HashSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn shard_path(&self, pair_id: u32, lane: Option<usize>) -> PathBuf {
        match lane {
            None => self.dir.join(format!("pair_{pair_id}.shard")),
            Some(k) => self.dir.join(format!("pair_{pair_id}_{k}.shard")),
        }
    }

    /// Write one finalized pair; a second write of the same chromosomes fails
    pub fn write_pair(
        &self,
        pair: &ChromosomePair,
        matrix: &PairAccumulator,
        contributors: u32,
    ) -> Result<WrittenPair> {
        if !matrix.is_finalized() {
            return Err(CompactError::consistency(format!(
                "pair {} written before finalization",
                pair.name
            )));
        }
        if (matrix.chr1(), matrix.chr2()) != (pair.chr1, pair.chr2) {
            return Err(CompactError::consistency(format!(
                "matrix {}_{} written as pair {}",
                matrix.chr1(),
                matrix.chr2(),
                pair.name
            )));
        }
        {
            let mut written = self
                .written
                .lock()
                .map_err(|_| CompactError::consistency("shard registry lock poisoned"))?;
            if !written.insert((pair.chr1, pair.chr2)) {
                return Err(CompactError::consistency(format!(
                    "pair {} serialized twice",
                    pair.name
                )));
            }
        }

        let lanes_per_zoom = contributors.max(1) as usize;
        let lanes = split_lanes(matrix, lanes_per_zoom);

        let payloads: Vec<Vec<Vec<u8>>> = lanes
            .par_iter()
            .map(|lane| {
                lane.blocks
                    .iter()
                    .map(|(_, cells)| self.codec.compress(&encode_block(cells)?))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let header_len = MatrixHeader::encoded_len_for(matrix.zooms().iter().map(|z| z.blocks().len()));
        let mut cursor = header_len;
        let mut zooms: Vec<ZoomHeader> = matrix
            .zooms()
            .iter()
            .map(|z| ZoomHeader {
                resolution: z.resolution(),
                sum: z.sum(),
                occupied_cells: z.occupied_cells(),
                block_bin_count: z.block_bin_count(),
                block_column_count: z.block_column_count(),
                blocks: Vec::with_capacity(z.blocks().len()),
            })
            .collect();
        for (lane, blobs) in lanes.iter().zip(&payloads) {
            for ((block_number, _), blob) in lane.blocks.iter().zip(blobs) {
                let size = u32::try_from(blob.len())
                    .map_err(|_| CompactError::consistency(format!("block of pair {} too large", pair.name)))?;
                zooms[lane.zoom].blocks.push(BlockIndexRecord {
                    block_number: *block_number,
                    entry: IndexEntry::new(cursor, size),
                });
                cursor += size as u64;
            }
        }

        let header = MatrixHeader {
            chr1: pair.chr1,
            chr2: pair.chr2,
            zooms,
        };
        let (header_bytes, slot_offsets) = header.encode()?;
        let block_slots = slot_offsets
            .into_iter()
            .zip(header.zooms.iter().flat_map(|z| &z.blocks))
            .map(|(offset, block)| BlockSlot {
                offset,
                position: block.entry.position,
            })
            .collect();

        let main = self.shard_path(pair.pair_id, None);
        let mut files = vec![main.clone()];
        if lanes_per_zoom == 1 {
            let mut parts: Vec<&[u8]> = vec![&header_bytes];
            parts.extend(payloads.iter().flatten().map(|b| b.as_slice()));
            self.write_file(&main, &parts)?;
        } else {
            self.write_file(&main, &[&header_bytes])?;
            for (k, blobs) in payloads.iter().enumerate() {
                let path = self.shard_path(pair.pair_id, Some(k + 1));
                let parts: Vec<&[u8]> = blobs.iter().map(|b| b.as_slice()).collect();
                self.write_file(&path, &parts)?;
                files.push(path);
            }
        }

        debug!(
            "Pair {} ({}): {} blocks, {} bytes in {} file(s)",
            pair.key(),
            pair.name,
            header.zooms.iter().map(|z| z.blocks.len()).sum::<usize>(),
            cursor,
            files.len()
        );

        Ok(WrittenPair {
            pair_id: pair.pair_id,
            key: pair.key(),
            files,
            header_len: u32::try_from(header_len)
                .map_err(|_| CompactError::consistency(format!("matrix header of pair {} too large", pair.name)))?,
            region_size: cursor,
            block_slots,
        })
    }

    fn write_file(&self, path: &Path, parts: &[&[u8]]) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for part in parts {
            out.write_all(part)?;
        }
        out.flush()?;
        self.usage.track_file_created(path);
        Ok(())
    }
}

/// Split each resolution's blocks into `per_zoom` contiguous runs
fn split_lanes(matrix: &PairAccumulator, per_zoom: usize) -> Vec<Lane<'_>> {
    let mut lanes = Vec::with_capacity(matrix.zooms().len() * per_zoom);
    for (zoom, z) in matrix.zooms().iter().enumerate() {
        let blocks: Vec<(u32, &[ContactCell])> = z.blocks().iter().map(|(&n, cells)| (n, cells.as_slice())).collect();
        let run = blocks.len().div_ceil(per_zoom).max(1);
        let mut runs = blocks.chunks(run);
        for _ in 0..per_zoom {
            lanes.push(Lane {
                zoom,
                blocks: runs.next().map(|r| r.to_vec()).unwrap_or_default(),
            });
        }
    }
    lanes
}
