/// Configuration surface consumed by the compaction core
///
/// Everything the scheduler needs is carried explicitly in `CompactionConfig`;
/// there is no process-wide state.
use std::collections::HashSet;
use std::fmt;

use crate::error::{CompactError, Result};

/// Default base-pair resolutions, coarsest first
pub const DEFAULT_BP_RESOLUTIONS: [u32; 9] = [
    2_500_000, 1_000_000, 500_000, 250_000, 100_000, 50_000, 25_000, 10_000, 5_000,
];

/// Nominal number of cells per serialization block
pub const DEFAULT_BLOCK_CAPACITY: u32 = 1000;

/// Unit of a resolution's bin coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Bp,
    Frag,
}

impl Unit {
    pub fn code(self) -> u8 {
        match self {
            Unit::Bp => 0,
            Unit::Frag => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Unit> {
        match code {
            0 => Some(Unit::Bp),
            1 => Some(Unit::Frag),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Unit::Bp => "BP",
            Unit::Frag => "FRAG",
        }
    }
}

/// One zoom level: a unit and a bin size in that unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub unit: Unit,
    pub bin_size: u32,
}

impl Resolution {
    pub fn bp(bin_size: u32) -> Self {
        Resolution {
            unit: Unit::Bp,
            bin_size,
        }
    }

    pub fn frag(bin_size: u32) -> Self {
        Resolution {
            unit: Unit::Frag,
            bin_size,
        }
    }

    /// Expected-value key, e.g. `BP_5000` or `FRAG_200`
    pub fn key(&self) -> String {
        format!("{}_{}", self.unit.label(), self.bin_size)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Compaction configuration
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    pub threads: usize,
    pub bp_resolutions: Vec<u32>,
    pub frag_resolutions: Vec<u32>,
    pub min_count: f64,
    pub block_capacity: u32,
    pub depth_base: u32,
    pub included_chromosomes: Option<HashSet<String>>,
    pub min_mapq: u32,
    pub skip_intra_fragment: bool,
    pub genome_id: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            threads: 1,
            bp_resolutions: DEFAULT_BP_RESOLUTIONS.to_vec(),
            frag_resolutions: Vec::new(),
            min_count: 0.0,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            depth_base: 2,
            included_chromosomes: None,
            min_mapq: 0,
            skip_intra_fragment: false,
            genome_id: "unknown".to_string(),
        }
    }
}

impl CompactionConfig {
    /// All resolutions in serialization order: base-pair first, then fragment
    pub fn resolutions(&self) -> Vec<Resolution> {
        self.bp_resolutions
            .iter()
            .map(|&b| Resolution::bp(b))
            .chain(self.frag_resolutions.iter().map(|&f| Resolution::frag(f)))
            .collect()
    }

    pub fn num_resolutions(&self) -> usize {
        self.bp_resolutions.len() + self.frag_resolutions.len()
    }

    /// True when a pair touching these chromosomes should be serialized
    pub fn includes_pair(&self, name1: &str, name2: &str) -> bool {
        match &self.included_chromosomes {
            Some(set) => set.contains(name1) || set.contains(name2),
            None => true,
        }
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self, has_fragment_sites: bool) -> Result<()> {
        if self.threads == 0 {
            return Err(CompactError::Config("thread count must be at least 1".into()));
        }
        if self.num_resolutions() == 0 {
            return Err(CompactError::Config("no resolutions configured".into()));
        }
        if self.bp_resolutions.iter().chain(&self.frag_resolutions).any(|&b| b == 0) {
            return Err(CompactError::Config("bin sizes must be positive".into()));
        }
        if self.block_capacity == 0 {
            return Err(CompactError::Config("block capacity must be positive".into()));
        }
        if !self.frag_resolutions.is_empty() && !has_fragment_sites {
            return Err(CompactError::Config(
                "fragment resolutions require a restriction site file".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a number that may have metric suffix (k/K=1000, m/M=1e6, g/G=1e9)
pub fn parse_metric_number(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty string".to_string());
    }

    let (num_part, suffix) = match s.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&s[..s.len() - c.len_utf8()], Some(c)),
        _ => (s, None),
    };

    let base: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid number: {e}"))?;

    let multiplier = match suffix {
        Some('k') | Some('K') => 1000.0,
        Some('m') | Some('M') => 1_000_000.0,
        Some('g') | Some('G') => 1_000_000_000.0,
        Some(c) => {
            return Err(format!(
                "Unknown suffix '{c}'. Use k/K (1000), m/M (1e6), or g/G (1e9)"
            ))
        }
        None => 1.0,
    };

    let result = base * multiplier;
    if result < 0.0 {
        return Err(format!("Value {result} is negative"));
    }
    if result > u32::MAX as f64 {
        return Err(format!("Value {result} too large for u32"));
    }

    Ok(result.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_numbers() {
        assert_eq!(parse_metric_number("5000"), Ok(5000));
        assert_eq!(parse_metric_number("25k"), Ok(25_000));
        assert_eq!(parse_metric_number("2.5m"), Ok(2_500_000));
        assert!(parse_metric_number("").is_err());
        assert!(parse_metric_number("10x").is_err());
        assert!(parse_metric_number("5g").is_err());
    }

    #[test]
    fn test_resolution_keys() {
        let config = CompactionConfig {
            bp_resolutions: vec![10_000],
            frag_resolutions: vec![200],
            ..Default::default()
        };
        let keys: Vec<String> = config.resolutions().iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["BP_10000", "FRAG_200"]);
    }

    #[test]
    fn test_validate() {
        let mut config = CompactionConfig::default();
        assert!(config.validate(false).is_ok());

        config.frag_resolutions = vec![500];
        assert!(matches!(config.validate(false), Err(CompactError::Config(_))));
        assert!(config.validate(true).is_ok());

        config.threads = 0;
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_included_chromosomes() {
        let config = CompactionConfig {
            included_chromosomes: Some(["chr2".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert!(config.includes_pair("chr1", "chr2"));
        assert!(!config.includes_pair("chr1", "chr1"));
    }
}
