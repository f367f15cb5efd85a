//! Final concatenation into one composite file, plus read-back helpers
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::codec::BlockCodec;
use crate::config::CompactionConfig;
use crate::disk_usage::{format_bytes, DiskUsage};
use crate::error::{CompactError, Result};
use crate::expected::ExpectedVector;
use crate::format::{
    decode_block, encode_expected, read_expected, read_master_index, FileHeader, IndexEntry, MatrixHeader,
    VERSION,
};
use crate::genome::GenomeCatalog;
use crate::master_index::MasterIndex;
use crate::matrix::ContactCell;
use crate::shard_writer::WrittenPair;

/// Header for a run; its length does not depend on `master_index_position`
pub fn file_header(catalog: &GenomeCatalog, config: &CompactionConfig, master_index_position: u64) -> FileHeader {
    FileHeader {
        version: VERSION,
        master_index_position,
        genome_id: config.genome_id.clone(),
        chromosomes: catalog
            .chromosomes()
            .iter()
            .map(|c| (c.name.clone(), c.length))
            .collect(),
        bp_resolutions: config.bp_resolutions.clone(),
        frag_resolutions: config.frag_resolutions.clone(),
    }
}

/// Write header, every pair region, master index and expected vectors
///
/// Block indexes must already be relocated. Shard files are removed once the
/// output is complete. Returns the size of the output.
pub fn assemble(
    output: &Path,
    header: &FileHeader,
    pairs: &[WrittenPair],
    master: &MasterIndex,
    expected: &[ExpectedVector],
    usage: &DiskUsage,
) -> Result<u64> {
    let mut order: Vec<&WrittenPair> = pairs.iter().collect();
    order.sort_by_key(|p| p.pair_id);

    let total = match write_composite(output, header, &order, master, expected) {
        Ok(total) => total,
        Err(e) => {
            // A truncated file must not pass for a finished one
            let _ = std::fs::remove_file(output);
            return Err(e);
        }
    };

    for pair in &order {
        for file in &pair.files {
            std::fs::remove_file(file)?;
            usage.track_file_deleted(file);
        }
    }
    debug!("Removed shard files of {} pairs", order.len());
    info!(
        "Wrote {} ({}, {} pairs, master index at {})",
        output.display(),
        format_bytes(total),
        order.len(),
        master.position()
    );
    Ok(total)
}

fn write_composite(
    output: &Path,
    header: &FileHeader,
    order: &[&WrittenPair],
    master: &MasterIndex,
    expected: &[ExpectedVector],
) -> Result<u64> {
    let mut out = BufWriter::new(File::create(output)?);
    let header_bytes = header.encode()?;
    out.write_all(&header_bytes)?;
    let mut cursor = header_bytes.len() as u64;

    for pair in order {
        if master.offset_of(pair.pair_id) != Some(cursor) {
            return Err(CompactError::consistency(format!(
                "pair {} lands at {} but was placed at {:?}",
                pair.key,
                cursor,
                master.offset_of(pair.pair_id)
            )));
        }
        let mut copied = 0u64;
        for file in &pair.files {
            copied += io::copy(&mut File::open(file)?, &mut out)?;
        }
        if copied != pair.region_size {
            return Err(CompactError::consistency(format!(
                "pair {} region is {} bytes on disk, {} expected",
                pair.key, copied, pair.region_size
            )));
        }
        cursor += copied;
    }

    if cursor != master.position() || header.master_index_position != cursor {
        return Err(CompactError::consistency(format!(
            "master index at {} but header records {}",
            cursor, header.master_index_position
        )));
    }
    let index_bytes = master.encode()?;
    out.write_all(&index_bytes)?;
    let expected_bytes = encode_expected(expected)?;
    out.write_all(&expected_bytes)?;
    out.flush()?;
    Ok(cursor + index_bytes.len() as u64 + expected_bytes.len() as u64)
}

/// Random-access reader over a composite file
pub struct CompositeReader {
    file: BufReader<File>,
    header: FileHeader,
}

impl CompositeReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let header = FileHeader::read(&mut file)?;
        Ok(CompositeReader { file, header })
    }

    pub fn read_header(&self) -> &FileHeader {
        &self.header
    }

    pub fn read_master_index(&mut self) -> Result<Vec<(String, IndexEntry)>> {
        self.file.seek(SeekFrom::Start(self.header.master_index_position))?;
        read_master_index(&mut self.file)
    }

    /// Expected vectors that follow the master index
    pub fn read_expected(&mut self) -> Result<Vec<ExpectedVector>> {
        self.read_master_index()?;
        read_expected(&mut self.file)
    }

    pub fn read_matrix_header(&mut self, entry: IndexEntry) -> Result<MatrixHeader> {
        self.file.seek(SeekFrom::Start(entry.position))?;
        MatrixHeader::read(&mut (&mut self.file).take(entry.size as u64))
    }

    pub fn read_block(&mut self, entry: IndexEntry, codec: &dyn BlockCodec) -> Result<Vec<ContactCell>> {
        self.file.seek(SeekFrom::Start(entry.position))?;
        let mut data = vec![0u8; entry.size as usize];
        self.file.read_exact(&mut data)?;
        decode_block(&codec.decompress(&data)?)
    }

    /// Every cell of one resolution of the pair with master key `key`
    pub fn read_cells(&mut self, key: &str, zoom: usize, codec: &dyn BlockCodec) -> Result<Vec<ContactCell>> {
        let entry = self
            .read_master_index()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, e)| e)
            .ok_or_else(|| CompactError::NotFound(format!("pair {key} not in master index")))?;
        let header = self.read_matrix_header(entry)?;
        let blocks = header
            .zooms
            .get(zoom)
            .ok_or_else(|| CompactError::NotFound(format!("pair {key} has no resolution {zoom}")))?
            .blocks
            .clone();
        let mut cells = Vec::new();
        for block in blocks {
            cells.extend(self.read_block(block.entry, codec)?);
        }
        Ok(cells)
    }
}
