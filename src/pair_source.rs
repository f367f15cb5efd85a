use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read, Seek, SeekFrom, Take};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CompactError, Result};
use crate::genome::GenomeCatalog;
use crate::positional_index::ByteRange;

/// One normalized contact: `chr1 <= chr2`, and `pos1 <= pos2` when intra
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRecord {
    pub chr1: u32,
    pub pos1: u32,
    pub frag1: u32,
    pub chr2: u32,
    pub pos2: u32,
    pub frag2: u32,
    pub score: f32,
}

impl ContactRecord {
    /// Build a record, swapping the ends into canonical order
    pub fn new(chr1: u32, pos1: u32, frag1: u32, chr2: u32, pos2: u32, frag2: u32, score: f32) -> Self {
        let swap = chr1 > chr2 || (chr1 == chr2 && pos1 > pos2);
        if swap {
            ContactRecord {
                chr1: chr2,
                pos1: pos2,
                frag1: frag2,
                chr2: chr1,
                pos2: pos1,
                frag2: frag1,
                score,
            }
        } else {
            ContactRecord {
                chr1,
                pos1,
                frag1,
                chr2,
                pos2,
                frag2,
                score,
            }
        }
    }

    /// Unit-score record without fragment information
    pub fn simple(chr1: u32, pos1: u32, chr2: u32, pos2: u32) -> Self {
        Self::new(chr1, pos1, 0, chr2, pos2, 0, 1.0)
    }

    pub fn is_intra(&self) -> bool {
        self.chr1 == self.chr2
    }
}

/// Clamp a raw position into `[0, length]`
fn clamp_position(pos: i64, length: u64) -> u32 {
    pos.clamp(0, length.min(u32::MAX as u64) as i64) as u32
}

/// Source of normalized contact records for one byte range of the input
pub trait PairSource: Sync {
    fn records(
        &self,
        range: ByteRange,
    ) -> Result<Box<dyn Iterator<Item = Result<ContactRecord>> + '_>>;
}

/// Reader for merged-nodups style text pair files
///
/// Accepted line layouts (whitespace separated):
/// - short: `str1 chr1 pos1 frag1 str2 chr2 pos2 frag2`
/// - short with score: the above plus a trailing score
/// - long: at least 16 fields, MAPQs in fields 9 and 12
pub struct MergedNoDupsSource<'a> {
    path: PathBuf,
    catalog: &'a GenomeCatalog,
    min_mapq: u32,
    skip_intra_fragment: bool,
    skipped: AtomicU64,
}

impl<'a> MergedNoDupsSource<'a> {
    pub fn new<P: AsRef<Path>>(path: P, catalog: &'a GenomeCatalog) -> Self {
        MergedNoDupsSource {
            path: path.as_ref().to_path_buf(),
            catalog,
            min_mapq: 0,
            skip_intra_fragment: false,
            skipped: AtomicU64::new(0),
        }
    }

    pub fn with_min_mapq(mut self, min_mapq: u32) -> Self {
        self.min_mapq = min_mapq;
        self
    }

    pub fn with_skip_intra_fragment(mut self, skip: bool) -> Self {
        self.skip_intra_fragment = skip;
        self
    }

    /// Records dropped so far (unknown chromosomes, MAPQ, intra-fragment)
    pub fn skipped_records(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Parse one line; `Ok(None)` means the record is filtered out
    fn parse_line(&self, line: &str, line_no: usize, range: ByteRange) -> Result<Option<ContactRecord>> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let bad = |what: &str| {
            CompactError::format(format!(
                "pair file line {} of chunk at byte {}: {}",
                line_no + 1,
                range.offset,
                what
            ))
        };

        let (score, mapqs) = match fields.len() {
            8 => (1.0f32, None),
            9 => (
                fields[8]
                    .parse::<f32>()
                    .map_err(|_| bad("invalid score"))?,
                None,
            ),
            n if n >= 16 => {
                let m1: u32 = fields[8].parse().map_err(|_| bad("invalid mapq1"))?;
                let m2: u32 = fields[11].parse().map_err(|_| bad("invalid mapq2"))?;
                (1.0, Some((m1, m2)))
            }
            n => return Err(bad(&format!("unexpected field count {n}"))),
        };

        let pos1: i64 = fields[2].parse().map_err(|_| bad("invalid pos1"))?;
        let frag1: u32 = fields[3].parse().map_err(|_| bad("invalid frag1"))?;
        let pos2: i64 = fields[6].parse().map_err(|_| bad("invalid pos2"))?;
        let frag2: u32 = fields[7].parse().map_err(|_| bad("invalid frag2"))?;

        let (Some(chr1), Some(chr2)) = (self.catalog.lookup(fields[1]), self.catalog.lookup(fields[5])) else {
            return Ok(None);
        };
        if chr1 == 0 || chr2 == 0 {
            return Ok(None);
        }

        if let Some((m1, m2)) = mapqs {
            if m1 < self.min_mapq || m2 < self.min_mapq {
                return Ok(None);
            }
        }
        if self.skip_intra_fragment && chr1 == chr2 && frag1 == frag2 {
            return Ok(None);
        }

        let pos1 = clamp_position(pos1, self.catalog.length(chr1));
        let pos2 = clamp_position(pos2, self.catalog.length(chr2));
        Ok(Some(ContactRecord::new(chr1, pos1, frag1, chr2, pos2, frag2, score)))
    }
}

impl PairSource for MergedNoDupsSource<'_> {
    fn records(
        &self,
        range: ByteRange,
    ) -> Result<Box<dyn Iterator<Item = Result<ContactRecord>> + '_>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.offset))?;
        let lines = BufReader::new(file.take(range.length as u64)).lines();
        Ok(Box::new(ChunkRecords {
            source: self,
            lines,
            line_no: 0,
            range,
        }))
    }
}

struct ChunkRecords<'s, 'a> {
    source: &'s MergedNoDupsSource<'a>,
    lines: Lines<BufReader<Take<File>>>,
    line_no: usize,
    range: ByteRange,
}

impl Iterator for ChunkRecords<'_, '_> {
    type Item = Result<ContactRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            let line_no = self.line_no;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match self.source.parse_line(&line, line_no, self.range) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.source.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// In-memory source keyed by byte range
#[derive(Debug, Clone, Default)]
pub struct MemoryPairSource {
    chunks: HashMap<ByteRange, Vec<ContactRecord>>,
}

impl MemoryPairSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, range: ByteRange, records: Vec<ContactRecord>) {
        self.chunks.insert(range, records);
    }
}

impl PairSource for MemoryPairSource {
    fn records(
        &self,
        range: ByteRange,
    ) -> Result<Box<dyn Iterator<Item = Result<ContactRecord>> + '_>> {
        let records = self.chunks.get(&range).ok_or_else(|| {
            CompactError::NotFound(format!(
                "no records for byte range {}..{}",
                range.offset,
                range.end()
            ))
        })?;
        Ok(Box::new(records.iter().map(|&r| Ok(r))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn catalog() -> GenomeCatalog {
        GenomeCatalog::new(vec![("1".to_string(), 100), ("2".to_string(), 200)])
    }

    #[test]
    fn test_canonical_order() {
        let r = ContactRecord::new(2, 5, 7, 1, 50, 3, 2.0);
        assert_eq!((r.chr1, r.pos1, r.frag1, r.chr2, r.pos2, r.frag2), (1, 50, 3, 2, 5, 7));

        let r = ContactRecord::simple(1, 90, 1, 10);
        assert_eq!((r.pos1, r.pos2), (10, 90));
    }

    #[test]
    fn test_read_range() {
        let cat = catalog();
        let mut file = NamedTempFile::new().unwrap();
        let first = "0 1 10 0 0 1 20 1\n";
        let second = "16 2 5 0 0 1 500 0 3.5\n0 chrUn 1 0 0 1 1 0\n";
        write!(file, "{first}{second}").unwrap();
        file.flush().unwrap();

        let source = MergedNoDupsSource::new(file.path(), &cat);

        let records: Vec<ContactRecord> = source
            .records(ByteRange::new(0, first.len() as u32))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![ContactRecord::new(1, 10, 0, 1, 20, 1, 1.0)]);

        let records: Vec<ContactRecord> = source
            .records(ByteRange::new(first.len() as u64, second.len() as u32))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        // Flipped so chr1 <= chr2, pos clamped to chromosome length
        assert_eq!(records, vec![ContactRecord::new(1, 100, 0, 2, 5, 0, 3.5)]);
        assert_eq!(source.skipped_records(), 1);
    }

    #[test]
    fn test_mapq_filter() {
        let cat = catalog();
        let mut file = NamedTempFile::new().unwrap();
        let text = "0 1 10 0 0 2 20 1 5 c s 60 c s r1 r2\n0 1 10 0 0 2 20 1 60 c s 60 c s r1 r2\n";
        write!(file, "{text}").unwrap();
        file.flush().unwrap();

        let source = MergedNoDupsSource::new(file.path(), &cat).with_min_mapq(30);
        let count = source
            .records(ByteRange::new(0, text.len() as u32))
            .unwrap()
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_malformed_line() {
        let cat = catalog();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "0 1 10 0\n").unwrap();
        file.flush().unwrap();

        let source = MergedNoDupsSource::new(file.path(), &cat);
        let first = source.records(ByteRange::new(0, 9)).unwrap().next().unwrap();
        assert!(matches!(first, Err(CompactError::Format(_))));
    }
}
