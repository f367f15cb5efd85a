/// Master index: absolute placement of every written pair region
///
/// Regions follow the header in pair id order. Walking them with a running
/// cursor gives each pair its absolute offset; the final cursor is where the
/// master index itself goes.
use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};

use crate::error::{CompactError, Result};
use crate::format::{encode_master_index, IndexEntry};
use crate::shard_writer::WrittenPair;

/// Absolute location of one pair region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub pair_id: u32,
    pub key: String,
    pub offset: u64,
    pub header_len: u32,
    pub region_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MasterIndex {
    placements: Vec<Placement>,
    position: u64,
}

impl MasterIndex {
    /// Place `pairs` after a header of `header_len` bytes
    ///
    /// `pairs` may be in any order; they are laid out by pair id.
    pub fn build(header_len: u64, pairs: &[WrittenPair]) -> Result<Self> {
        let mut order: Vec<&WrittenPair> = pairs.iter().collect();
        order.sort_by_key(|p| p.pair_id);
        if let Some(w) = order.windows(2).find(|w| w[0].pair_id == w[1].pair_id) {
            return Err(CompactError::consistency(format!(
                "pair {} appears twice in the master index",
                w[0].key
            )));
        }

        let mut cursor = header_len;
        let placements = order
            .into_iter()
            .map(|p| {
                let placement = Placement {
                    pair_id: p.pair_id,
                    key: p.key.clone(),
                    offset: cursor,
                    header_len: p.header_len,
                    region_size: p.region_size,
                };
                cursor += p.region_size;
                placement
            })
            .collect();

        Ok(MasterIndex {
            placements,
            position: cursor,
        })
    }

    /// Absolute offset of the master index
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn offset_of(&self, pair_id: u32) -> Option<u64> {
        self.placements
            .binary_search_by_key(&pair_id, |p| p.pair_id)
            .ok()
            .map(|i| self.placements[i].offset)
    }

    /// `(key, (matrix header offset, matrix header length))` in pair id order
    pub fn entries(&self) -> Vec<(String, IndexEntry)> {
        self.placements
            .iter()
            .map(|p| (p.key.clone(), IndexEntry::new(p.offset, p.header_len)))
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_master_index(&self.entries())
    }

    /// Rewrite every block-index position of every pair to absolute offsets
    pub fn relocate_all(&self, pairs: &[WrittenPair]) -> Result<()> {
        for pair in pairs {
            let offset = self.offset_of(pair.pair_id).ok_or_else(|| {
                CompactError::consistency(format!("pair {} was never placed", pair.key))
            })?;
            relocate_block_index(pair, offset)?;
        }
        Ok(())
    }
}

/// Patch the block index in a pair's main shard file in place
///
/// The whole matrix header lives in the main file, so every slot offset is
/// an offset into that file.
pub fn relocate_block_index(pair: &WrittenPair, region_offset: u64) -> Result<()> {
    if pair.block_slots.is_empty() {
        return Ok(());
    }
    let main = pair
        .files
        .first()
        .ok_or_else(|| CompactError::consistency(format!("pair {} has no shard file", pair.key)))?;
    let mut file = OpenOptions::new().write(true).open(main)?;
    for slot in &pair.block_slots {
        if slot.offset + 8 > pair.header_len as u64 {
            return Err(CompactError::consistency(format!(
                "block slot at {} lies outside the matrix header of pair {}",
                slot.offset, pair.key
            )));
        }
        file.seek(SeekFrom::Start(slot.offset))?;
        file.write_u64::<LittleEndian>(region_offset + slot.position)?;
    }
    file.sync_data()?;
    debug!(
        "Relocated {} blocks of pair {} to offset {}",
        pair.block_slots.len(),
        pair.key,
        region_offset
    );
    Ok(())
}
