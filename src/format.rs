//! Fixed-width little-endian encoding of every on-disk structure
//!
//! Strings are NUL-terminated UTF-8. Layout of the composite file:
//! header, pair regions in pair id order (pair 0 first), master index,
//! expected-value vectors.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufRead, Read, Write};

use crate::config::{Resolution, Unit};
use crate::error::{CompactError, Result};
use crate::expected::ExpectedVector;
use crate::matrix::ContactCell;

pub const MAGIC: &[u8; 4] = b"HIC\0";
pub const VERSION: u32 = 9;

/// Location of one serialized structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexEntry {
    pub position: u64,
    pub size: u32,
}

impl IndexEntry {
    pub fn new(position: u64, size: u32) -> Self {
        IndexEntry { position, size }
    }
}

pub fn write_cstr<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_u8(0)?;
    Ok(())
}

pub fn read_cstr<R: BufRead>(r: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    r.read_until(0, &mut buf)?;
    if buf.pop() != Some(0) {
        return Err(CompactError::format("unterminated string"));
    }
    String::from_utf8(buf).map_err(|_| CompactError::format("string is not valid UTF-8"))
}

fn cstr_len(s: &str) -> u64 {
    s.len() as u64 + 1
}

/// Header region at the start of the composite file
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub version: u32,
    pub master_index_position: u64,
    pub genome_id: String,
    pub chromosomes: Vec<(String, u64)>,
    pub bp_resolutions: Vec<u32>,
    pub frag_resolutions: Vec<u32>,
}

impl FileHeader {
    /// Encoded size; independent of `master_index_position`
    pub fn encoded_len(&self) -> u64 {
        4 + 4
            + 8
            + cstr_len(&self.genome_id)
            + 4
            + self.chromosomes.iter().map(|(n, _)| cstr_len(n) + 8).sum::<u64>()
            + 4
            + 4 * self.bp_resolutions.len() as u64
            + 4
            + 4 * self.frag_resolutions.len() as u64
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        buf.write_all(MAGIC)?;
        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_u64::<LittleEndian>(self.master_index_position)?;
        write_cstr(&mut buf, &self.genome_id)?;
        buf.write_u32::<LittleEndian>(self.chromosomes.len() as u32)?;
        for (name, length) in &self.chromosomes {
            write_cstr(&mut buf, name)?;
            buf.write_u64::<LittleEndian>(*length)?;
        }
        buf.write_u32::<LittleEndian>(self.bp_resolutions.len() as u32)?;
        for &b in &self.bp_resolutions {
            buf.write_u32::<LittleEndian>(b)?;
        }
        buf.write_u32::<LittleEndian>(self.frag_resolutions.len() as u32)?;
        for &f in &self.frag_resolutions {
            buf.write_u32::<LittleEndian>(f)?;
        }
        Ok(buf)
    }

    pub fn read<R: BufRead>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CompactError::format("bad magic, not a composite matrix file"));
        }
        let version = r.read_u32::<LittleEndian>()?;
        let master_index_position = r.read_u64::<LittleEndian>()?;
        let genome_id = read_cstr(r)?;
        let n = r.read_u32::<LittleEndian>()?;
        let mut chromosomes = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let name = read_cstr(r)?;
            chromosomes.push((name, r.read_u64::<LittleEndian>()?));
        }
        let bp_resolutions = read_u32_list(r)?;
        let frag_resolutions = read_u32_list(r)?;
        Ok(FileHeader {
            version,
            master_index_position,
            genome_id,
            chromosomes,
            bp_resolutions,
            frag_resolutions,
        })
    }
}

fn read_u32_list<R: Read>(r: &mut R) -> Result<Vec<u32>> {
    let n = r.read_u32::<LittleEndian>()?;
    (0..n).map(|_| Ok(r.read_u32::<LittleEndian>()?)).collect()
}

/// One block index record inside a matrix header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndexRecord {
    pub block_number: u32,
    pub entry: IndexEntry,
}

const BLOCK_RECORD_LEN: u64 = 4 + 8 + 4;
const ZOOM_FIXED_LEN: u64 = 1 + 4 + 8 + 8 + 4 + 4 + 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ZoomHeader {
    pub resolution: Resolution,
    pub sum: f64,
    pub occupied_cells: u64,
    pub block_bin_count: u32,
    pub block_column_count: u32,
    pub blocks: Vec<BlockIndexRecord>,
}

/// Matrix header opening every pair region
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixHeader {
    pub chr1: u32,
    pub chr2: u32,
    pub zooms: Vec<ZoomHeader>,
}

impl MatrixHeader {
    /// Size of the encoded header given block counts per resolution
    pub fn encoded_len_for(block_counts: impl IntoIterator<Item = usize>) -> u64 {
        12 + block_counts
            .into_iter()
            .map(|n| ZOOM_FIXED_LEN + BLOCK_RECORD_LEN * n as u64)
            .sum::<u64>()
    }

    pub fn encoded_len(&self) -> u64 {
        Self::encoded_len_for(self.zooms.iter().map(|z| z.blocks.len()))
    }

    /// Encode; also returns the byte offset of every block position field
    pub fn encode(&self) -> Result<(Vec<u8>, Vec<u64>)> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        let mut slots = Vec::new();
        buf.write_u32::<LittleEndian>(self.chr1)?;
        buf.write_u32::<LittleEndian>(self.chr2)?;
        buf.write_u32::<LittleEndian>(self.zooms.len() as u32)?;
        for zoom in &self.zooms {
            buf.write_u8(zoom.resolution.unit.code())?;
            buf.write_u32::<LittleEndian>(zoom.resolution.bin_size)?;
            buf.write_f64::<LittleEndian>(zoom.sum)?;
            buf.write_u64::<LittleEndian>(zoom.occupied_cells)?;
            buf.write_u32::<LittleEndian>(zoom.block_bin_count)?;
            buf.write_u32::<LittleEndian>(zoom.block_column_count)?;
            buf.write_u32::<LittleEndian>(zoom.blocks.len() as u32)?;
            for block in &zoom.blocks {
                buf.write_u32::<LittleEndian>(block.block_number)?;
                slots.push(buf.len() as u64);
                buf.write_u64::<LittleEndian>(block.entry.position)?;
                buf.write_u32::<LittleEndian>(block.entry.size)?;
            }
        }
        Ok((buf, slots))
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let chr1 = r.read_u32::<LittleEndian>()?;
        let chr2 = r.read_u32::<LittleEndian>()?;
        let n = r.read_u32::<LittleEndian>()?;
        let mut zooms = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let code = r.read_u8()?;
            let unit = Unit::from_code(code)
                .ok_or_else(|| CompactError::format(format!("unknown unit code {code}")))?;
            let bin_size = r.read_u32::<LittleEndian>()?;
            let sum = r.read_f64::<LittleEndian>()?;
            let occupied_cells = r.read_u64::<LittleEndian>()?;
            let block_bin_count = r.read_u32::<LittleEndian>()?;
            let block_column_count = r.read_u32::<LittleEndian>()?;
            let n_blocks = r.read_u32::<LittleEndian>()?;
            let mut blocks = Vec::with_capacity(n_blocks as usize);
            for _ in 0..n_blocks {
                let block_number = r.read_u32::<LittleEndian>()?;
                let position = r.read_u64::<LittleEndian>()?;
                let size = r.read_u32::<LittleEndian>()?;
                blocks.push(BlockIndexRecord {
                    block_number,
                    entry: IndexEntry::new(position, size),
                });
            }
            zooms.push(ZoomHeader {
                resolution: Resolution { unit, bin_size },
                sum,
                occupied_cells,
                block_bin_count,
                block_column_count,
                blocks,
            });
        }
        Ok(MatrixHeader { chr1, chr2, zooms })
    }
}

/// Encode the cells of one block, grouped by row
///
/// `cells` must be sorted by (row, col).
pub fn encode_block(cells: &[ContactCell]) -> Result<Vec<u8>> {
    let row_offset = cells.first().map_or(0, |c| c.row);
    let col_offset = cells.iter().map(|c| c.col).min().unwrap_or(0);

    let mut rows: Vec<(u32, &[ContactCell])> = Vec::new();
    let mut start = 0;
    for i in 1..=cells.len() {
        if i == cells.len() || cells[i].row != cells[start].row {
            rows.push((cells[start].row, &cells[start..i]));
            start = i;
        }
    }

    let mut buf = Vec::with_capacity(16 + rows.len() * 8 + cells.len() * 8);
    buf.write_u32::<LittleEndian>(cells.len() as u32)?;
    buf.write_u32::<LittleEndian>(row_offset)?;
    buf.write_u32::<LittleEndian>(col_offset)?;
    buf.write_u32::<LittleEndian>(rows.len() as u32)?;
    for (row, row_cells) in rows {
        buf.write_u32::<LittleEndian>(row - row_offset)?;
        buf.write_u32::<LittleEndian>(row_cells.len() as u32)?;
        for cell in row_cells {
            buf.write_u32::<LittleEndian>(cell.col - col_offset)?;
            buf.write_f32::<LittleEndian>(cell.count)?;
        }
    }
    Ok(buf)
}

pub fn decode_block(mut bytes: &[u8]) -> Result<Vec<ContactCell>> {
    let r = &mut bytes;
    let n_records = r.read_u32::<LittleEndian>()?;
    let row_offset = r.read_u32::<LittleEndian>()?;
    let col_offset = r.read_u32::<LittleEndian>()?;
    let n_rows = r.read_u32::<LittleEndian>()?;

    let mut cells = Vec::with_capacity(n_records as usize);
    for _ in 0..n_rows {
        let row = r.read_u32::<LittleEndian>()? + row_offset;
        let n_cells = r.read_u32::<LittleEndian>()?;
        for _ in 0..n_cells {
            let col = r.read_u32::<LittleEndian>()? + col_offset;
            let count = r.read_f32::<LittleEndian>()?;
            cells.push(ContactCell { row, col, count });
        }
    }
    if cells.len() != n_records as usize {
        return Err(CompactError::format(format!(
            "block declares {} records but holds {}",
            n_records,
            cells.len()
        )));
    }
    Ok(cells)
}

pub fn encode_master_index(entries: &[(String, IndexEntry)]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(entries.len() as u32)?;
    for (key, entry) in entries {
        write_cstr(&mut buf, key)?;
        buf.write_u64::<LittleEndian>(entry.position)?;
        buf.write_u32::<LittleEndian>(entry.size)?;
    }
    Ok(buf)
}

pub fn read_master_index<R: BufRead>(r: &mut R) -> Result<Vec<(String, IndexEntry)>> {
    let n = r.read_u32::<LittleEndian>()?;
    let mut entries = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let key = read_cstr(r)?;
        let position = r.read_u64::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        entries.push((key, IndexEntry::new(position, size)));
    }
    Ok(entries)
}

pub fn encode_expected(vectors: &[ExpectedVector]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(vectors.len() as u32)?;
    for v in vectors {
        write_cstr(&mut buf, &v.key)?;
        buf.write_u8(v.resolution.unit.code())?;
        buf.write_u32::<LittleEndian>(v.resolution.bin_size)?;
        buf.write_u32::<LittleEndian>(v.values.len() as u32)?;
        for &value in &v.values {
            buf.write_f64::<LittleEndian>(value)?;
        }
        buf.write_u32::<LittleEndian>(v.chromosome_factors.len() as u32)?;
        for &(chr, factor) in &v.chromosome_factors {
            buf.write_u32::<LittleEndian>(chr)?;
            buf.write_f64::<LittleEndian>(factor)?;
        }
    }
    Ok(buf)
}

pub fn read_expected<R: BufRead>(r: &mut R) -> Result<Vec<ExpectedVector>> {
    let n = r.read_u32::<LittleEndian>()?;
    let mut vectors = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let key = read_cstr(r)?;
        let code = r.read_u8()?;
        let unit = Unit::from_code(code)
            .ok_or_else(|| CompactError::format(format!("unknown unit code {code}")))?;
        let bin_size = r.read_u32::<LittleEndian>()?;
        let n_values = r.read_u32::<LittleEndian>()?;
        let values = (0..n_values)
            .map(|_| Ok(r.read_f64::<LittleEndian>()?))
            .collect::<Result<Vec<f64>>>()?;
        let n_factors = r.read_u32::<LittleEndian>()?;
        let mut chromosome_factors = Vec::with_capacity(n_factors as usize);
        for _ in 0..n_factors {
            let chr = r.read_u32::<LittleEndian>()?;
            chromosome_factors.push((chr, r.read_f64::<LittleEndian>()?));
        }
        vectors.push(ExpectedVector {
            key,
            resolution: Resolution { unit, bin_size },
            values,
            chromosome_factors,
        });
    }
    Ok(vectors)
}
