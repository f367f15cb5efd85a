/// Running expected-value statistics per resolution
///
/// Every worker owns one `ExpectedValues` while it accumulates; the partial
/// statistics are summed once after the pool has exited.
use indexmap::IndexMap;

use crate::config::{Resolution, Unit};
use crate::error::{CompactError, Result};
use crate::genome::GenomeCatalog;

/// Counts by genomic separation for one resolution
#[derive(Debug, Clone)]
pub struct ExpectedValueCalculation {
    resolution: Resolution,
    /// Bins per chromosome ordinal
    chromosome_bins: Vec<u32>,
    /// Summed counts indexed by bin distance
    actual: Vec<f64>,
    /// Summed intra-chromosomal counts per ordinal
    chromosome_sums: Vec<f64>,
}

/// Normalized expected vector as written to the footer
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedVector {
    pub key: String,
    pub resolution: Resolution,
    pub values: Vec<f64>,
    pub chromosome_factors: Vec<(u32, f64)>,
}

impl ExpectedValueCalculation {
    pub fn new(resolution: Resolution, catalog: &GenomeCatalog) -> Self {
        let chromosome_bins = catalog
            .chromosomes()
            .iter()
            .map(|c| {
                let extent = match resolution.unit {
                    Unit::Bp => c.length,
                    Unit::Frag => catalog.fragment_count(c.index) as u64,
                };
                (extent / resolution.bin_size as u64 + 1).min(u32::MAX as u64) as u32
            })
            .collect();

        ExpectedValueCalculation {
            resolution,
            chromosome_bins,
            actual: Vec::new(),
            chromosome_sums: vec![0.0; catalog.len()],
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn add_distance(&mut self, chr: u32, bin1: u32, bin2: u32, score: f64) {
        let distance = bin1.abs_diff(bin2) as usize;
        if self.actual.len() <= distance {
            self.actual.resize(distance + 1, 0.0);
        }
        self.actual[distance] += score;
        if let Some(sum) = self.chromosome_sums.get_mut(chr as usize) {
            *sum += score;
        }
    }

    pub fn merge(&mut self, other: &ExpectedValueCalculation) -> Result<()> {
        if self.resolution != other.resolution {
            return Err(CompactError::consistency(format!(
                "cannot merge expected values {} into {}",
                other.resolution, self.resolution
            )));
        }
        if self.actual.len() < other.actual.len() {
            self.actual.resize(other.actual.len(), 0.0);
        }
        for (mine, theirs) in self.actual.iter_mut().zip(&other.actual) {
            *mine += theirs;
        }
        for (mine, theirs) in self.chromosome_sums.iter_mut().zip(&other.chromosome_sums) {
            *mine += theirs;
        }
        Ok(())
    }

    pub fn actual(&self) -> &[f64] {
        &self.actual
    }

    pub fn total(&self) -> f64 {
        self.actual.iter().sum()
    }

    /// Counts per distance divided by the number of bin pairs at that distance
    pub fn density(&self) -> ExpectedVector {
        let values: Vec<f64> = self
            .actual
            .iter()
            .enumerate()
            .map(|(d, &count)| {
                let possible: u64 = self
                    .chromosome_bins
                    .iter()
                    .skip(1)
                    .map(|&n| (n as u64).saturating_sub(d as u64))
                    .sum();
                if possible == 0 {
                    0.0
                } else {
                    count / possible as f64
                }
            })
            .collect();

        let chromosome_factors = self
            .chromosome_sums
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, sum)| **sum > 0.0)
            .filter_map(|(chr, &sum)| {
                let n = self.chromosome_bins[chr] as usize;
                let expected: f64 = values
                    .iter()
                    .take(n)
                    .enumerate()
                    .map(|(d, v)| v * (n - d) as f64)
                    .sum();
                (expected > 0.0).then(|| (chr as u32, sum / expected))
            })
            .collect();

        ExpectedVector {
            key: self.resolution.key(),
            resolution: self.resolution,
            values,
            chromosome_factors,
        }
    }
}

/// Expected-value calculations keyed by `BP_<size>` / `FRAG_<size>`
#[derive(Debug, Clone, Default)]
pub struct ExpectedValues {
    calculations: IndexMap<String, ExpectedValueCalculation>,
}

impl ExpectedValues {
    pub fn new(resolutions: &[Resolution], catalog: &GenomeCatalog) -> Self {
        let calculations = resolutions
            .iter()
            .map(|&r| (r.key(), ExpectedValueCalculation::new(r, catalog)))
            .collect();
        ExpectedValues { calculations }
    }

    /// Add one intra-chromosomal contact to the calculation at `index`
    pub fn add_distance(&mut self, index: usize, chr: u32, bin1: u32, bin2: u32, score: f64) {
        if let Some((_, calc)) = self.calculations.get_index_mut(index) {
            calc.add_distance(chr, bin1, bin2, score);
        }
    }

    /// Sum `other` into this set, adopting keys this set does not have yet
    pub fn merge(&mut self, other: &ExpectedValues) -> Result<()> {
        for (key, calc) in &other.calculations {
            match self.calculations.get_mut(key) {
                Some(mine) => mine.merge(calc)?,
                None => {
                    self.calculations.insert(key.clone(), calc.clone());
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ExpectedValueCalculation> {
        self.calculations.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExpectedValueCalculation)> {
        self.calculations.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.calculations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculations.is_empty()
    }

    pub fn vectors(&self) -> Vec<ExpectedVector> {
        self.calculations.values().map(|c| c.density()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GenomeCatalog {
        GenomeCatalog::new(vec![("1".to_string(), 100), ("2".to_string(), 200)])
    }

    #[test]
    fn test_keys_keep_order() {
        let mut sites = std::collections::HashMap::new();
        sites.insert("1".to_string(), 10);
        let cat = catalog().with_fragment_sites(&sites);
        let ev = ExpectedValues::new(&[Resolution::bp(10), Resolution::frag(2)], &cat);
        let keys: Vec<&str> = ev.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["BP_10", "FRAG_2"]);
    }

    #[test]
    fn test_merge_sums() {
        let cat = catalog();
        let mut a = ExpectedValues::new(&[Resolution::bp(10)], &cat);
        let mut b = ExpectedValues::new(&[Resolution::bp(10)], &cat);
        a.add_distance(0, 1, 1, 2, 1.0);
        b.add_distance(0, 2, 5, 5, 2.0);
        b.add_distance(0, 2, 0, 15, 1.0);

        a.merge(&b).unwrap();
        let calc = a.get("BP_10").unwrap();
        assert_eq!(calc.actual()[0], 2.0);
        assert_eq!(calc.actual()[1], 1.0);
        assert_eq!(calc.actual()[15], 1.0);
        assert_eq!(calc.total(), 4.0);
    }

    #[test]
    fn test_merge_into_empty_adopts_keys() {
        let cat = catalog();
        let mut empty = ExpectedValues::default();
        let mut other = ExpectedValues::new(&[Resolution::bp(10)], &cat);
        other.add_distance(0, 1, 0, 0, 3.0);
        empty.merge(&other).unwrap();
        assert_eq!(empty.get("BP_10").unwrap().total(), 3.0);
    }

    #[test]
    fn test_density() {
        let cat = catalog();
        let mut calc = ExpectedValueCalculation::new(Resolution::bp(10), &cat);
        // chr1: 11 bins, chr2: 21 bins
        calc.add_distance(1, 0, 0, 32.0);
        let vector = calc.density();
        assert_eq!(vector.key, "BP_10");
        assert_eq!(vector.values, vec![1.0]);
        // chr1 expected total at distance 0: 1.0 * 11
        assert_eq!(vector.chromosome_factors, vec![(1, 32.0 / 11.0)]);
    }
}
