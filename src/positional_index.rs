/// Reader for the external positional index of the pair file
///
/// Each line is `pairName,ignored,byteOffset,byteLength`. The ranges of one
/// pair are kept in file order.
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{CompactError, Result};

/// A contiguous byte range of the pair file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u32,
}

impl ByteRange {
    pub fn new(offset: u64, length: u32) -> Self {
        ByteRange { offset, length }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionalIndex {
    ranges: IndexMap<String, Vec<ByteRange>>,
}

impl PositionalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path.as_ref())?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut index = PositionalIndex::new();

        for (line_no, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 4 {
                return Err(CompactError::format(format!(
                    "Improperly formatted positional index at line {}: expected 4 fields, got {}",
                    line_no + 1,
                    fields.len()
                )));
            }

            let offset: u64 = fields[2].trim().parse().map_err(|_| {
                CompactError::format(format!(
                    "positional index line {}: invalid byte offset '{}'",
                    line_no + 1,
                    fields[2]
                ))
            })?;
            let length: u32 = fields[3].trim().parse().map_err(|_| {
                CompactError::format(format!(
                    "positional index line {}: invalid byte length '{}'",
                    line_no + 1,
                    fields[3]
                ))
            })?;

            index.push(fields[0], ByteRange::new(offset, length));
        }

        Ok(index)
    }

    pub fn push(&mut self, pair_name: &str, range: ByteRange) {
        self.ranges
            .entry(pair_name.to_string())
            .or_default()
            .push(range);
    }

    pub fn get(&self, pair_name: &str) -> Option<&[ByteRange]> {
        self.ranges.get(pair_name).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ByteRange])> {
        self.ranges.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct pair names
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
