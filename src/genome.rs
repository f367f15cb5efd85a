//! Genome catalog: ordered chromosomes with names, lengths and ordinals
//!
//! Ordinal 0 is the genome-wide pseudo-chromosome `All`, whose length is the
//! total genome length in kilobases. Real chromosomes are numbered 1..=N in
//! the order they were supplied.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{CompactError, Result};

/// Name of the genome-wide pseudo-chromosome
pub const GENOME_WIDE_NAME: &str = "All";

/// Scale factor between base pairs and genome-wide coordinates
pub const GENOME_WIDE_SCALE: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chromosome {
    pub index: u32,
    pub name: String,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct GenomeCatalog {
    chromosomes: Vec<Chromosome>,
    name_to_index: HashMap<String, u32>,
    /// Number of restriction fragments per ordinal (sites + 1), when known
    fragment_counts: Option<Vec<u32>>,
}

impl GenomeCatalog {
    /// Build a catalog from `(name, length)` pairs, prepending `All`
    pub fn new(chromosomes: Vec<(String, u64)>) -> Self {
        let total: u64 = chromosomes.iter().map(|(_, len)| len).sum();
        let mut list = Vec::with_capacity(chromosomes.len() + 1);
        list.push(Chromosome {
            index: 0,
            name: GENOME_WIDE_NAME.to_string(),
            length: total / GENOME_WIDE_SCALE,
        });
        for (i, (name, length)) in chromosomes.into_iter().enumerate() {
            list.push(Chromosome {
                index: i as u32 + 1,
                name,
                length,
            });
        }

        let name_to_index = list.iter().map(|c| (c.name.clone(), c.index)).collect();

        GenomeCatalog {
            chromosomes: list,
            name_to_index,
            fragment_counts: None,
        }
    }

    /// Read a chrom.sizes file (`name length` per line)
    pub fn from_chrom_sizes<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut chromosomes = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() < 2 {
                return Err(CompactError::format(format!(
                    "chrom sizes line {}: expected 'name length', got '{}'",
                    line_no + 1,
                    trimmed
                )));
            }
            let length: u64 = fields[1].parse().map_err(|_| {
                CompactError::format(format!(
                    "chrom sizes line {}: invalid length '{}'",
                    line_no + 1,
                    fields[1]
                ))
            })?;
            chromosomes.push((fields[0].to_string(), length));
        }

        Ok(Self::new(chromosomes))
    }

    /// Attach restriction fragment counts from `name -> number of sites`
    pub fn with_fragment_sites(mut self, sites: &HashMap<String, u32>) -> Self {
        let counts = self
            .chromosomes
            .iter()
            .map(|c| sites.get(&c.name).map_or(1, |&n| n + 1))
            .collect();
        self.fragment_counts = Some(counts);
        self
    }

    /// Read a restriction site file: `name site1 site2 ...` per line
    pub fn read_fragment_sites<P: AsRef<Path>>(path: P) -> Result<HashMap<String, u32>> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut sites = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split_whitespace();
            if let Some(name) = fields.next() {
                sites.insert(name.to_string(), fields.count() as u32);
            }
        }
        Ok(sites)
    }

    pub fn has_fragment_sites(&self) -> bool {
        self.fragment_counts.is_some()
    }

    /// Number of entries including `All`
    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.len() <= 1
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn get(&self, index: u32) -> Option<&Chromosome> {
        self.chromosomes.get(index as usize)
    }

    pub fn index_of(&self, name: &str) -> Result<u32> {
        self.name_to_index
            .get(name)
            .copied()
            .ok_or_else(|| CompactError::NotFound(format!("chromosome '{name}'")))
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.name_to_index.get(name).copied()
    }

    pub fn length(&self, index: u32) -> u64 {
        self.get(index).map_or(0, |c| c.length)
    }

    pub fn name(&self, index: u32) -> &str {
        self.get(index).map_or("", |c| c.name.as_str())
    }

    pub fn fragment_count(&self, index: u32) -> u32 {
        self.fragment_counts
            .as_ref()
            .and_then(|counts| counts.get(index as usize).copied())
            .unwrap_or(1)
    }

    /// Sum of lengths of chromosomes 1..chr (exclusive)
    pub fn cumulative_length_before(&self, chr: u32) -> u64 {
        self.chromosomes
            .iter()
            .skip(1)
            .take((chr as usize).saturating_sub(1))
            .map(|c| c.length)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GenomeCatalog {
        GenomeCatalog::new(vec![
            ("chr1".to_string(), 1000),
            ("chr2".to_string(), 2000),
            ("chr3".to_string(), 5000),
        ])
    }

    #[test]
    fn test_ordinals() {
        let cat = catalog();
        assert_eq!(cat.len(), 4);
        assert_eq!(cat.name(0), GENOME_WIDE_NAME);
        assert_eq!(cat.length(0), 8);
        assert_eq!(cat.index_of("chr2").unwrap(), 2);
        assert!(matches!(cat.index_of("chrX"), Err(CompactError::NotFound(_))));
    }

    #[test]
    fn test_cumulative_length() {
        let cat = catalog();
        assert_eq!(cat.cumulative_length_before(1), 0);
        assert_eq!(cat.cumulative_length_before(3), 3000);
    }

    #[test]
    fn test_fragment_counts() {
        let mut sites = HashMap::new();
        sites.insert("chr1".to_string(), 9);
        let cat = catalog().with_fragment_sites(&sites);
        assert!(cat.has_fragment_sites());
        assert_eq!(cat.fragment_count(1), 10);
        assert_eq!(cat.fragment_count(2), 1);
    }
}
