//! Utility functions for testing
#![allow(dead_code)]
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hic_compact::codec::BlockCodec;
use hic_compact::composite::CompositeReader;
use hic_compact::genome::GenomeCatalog;
use hic_compact::positional_index::{ByteRange, PositionalIndex};

/// One contact by chromosome name
#[derive(Debug, Clone)]
pub struct Contact {
    pub chr1: String,
    pub pos1: u32,
    pub chr2: String,
    pub pos2: u32,
}

impl Contact {
    pub fn new(chr1: &str, pos1: u32, chr2: &str, pos2: u32) -> Self {
        Contact {
            chr1: chr1.to_string(),
            pos1,
            chr2: chr2.to_string(),
            pos2,
        }
    }
}

/// Genome with the given `(name, length)` chromosomes
pub fn catalog(chromosomes: &[(&str, u64)]) -> GenomeCatalog {
    GenomeCatalog::new(
        chromosomes
            .iter()
            .map(|(n, l)| (n.to_string(), *l))
            .collect(),
    )
}

/// Generate random contacts over every chromosome pair of `catalog`
pub fn random_contacts(catalog: &GenomeCatalog, n: usize, seed: u64) -> Vec<Contact> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    let chromosomes = &catalog.chromosomes()[1..];

    (0..n)
        .map(|_| {
            let a = &chromosomes[rng.gen_range(0..chromosomes.len())];
            let b = &chromosomes[rng.gen_range(0..chromosomes.len())];
            Contact {
                chr1: a.name.clone(),
                pos1: rng.gen_range(0..a.length as u32),
                chr2: b.name.clone(),
                pos2: rng.gen_range(0..b.length as u32),
            }
        })
        .collect()
}

/// Write a short-format pair file sorted by pair plus its positional index
///
/// Every pair's lines are cut into chunks of at most `chunk_lines` lines.
/// Returns the pair file path, the index file path and the parsed index.
pub fn write_pair_file(
    dir: &Path,
    catalog: &GenomeCatalog,
    contacts: &[Contact],
    chunk_lines: usize,
) -> (PathBuf, PathBuf, PositionalIndex) {
    let mut by_pair: BTreeMap<(u32, u32), Vec<String>> = BTreeMap::new();
    for (i, c) in contacts.iter().enumerate() {
        let a = catalog.lookup(&c.chr1).expect("unknown chromosome");
        let b = catalog.lookup(&c.chr2).expect("unknown chromosome");
        let key = (a.min(b), a.max(b));
        by_pair
            .entry(key)
            .or_default()
            .push(format!("0 {} {} {} 16 {} {} {}\n", c.chr1, c.pos1, i, c.chr2, c.pos2, i + 1));
    }

    let mut content = String::new();
    let mut index_text = String::new();
    let mut index = PositionalIndex::new();
    for ((a, b), lines) in &by_pair {
        let name = format!("{}-{}", catalog.name(*a), catalog.name(*b));
        for (chunk_no, chunk) in lines.chunks(chunk_lines.max(1)).enumerate() {
            let offset = content.len() as u64;
            for line in chunk {
                content.push_str(line);
            }
            let length = (content.len() as u64 - offset) as u32;
            index_text.push_str(&format!("{name},{chunk_no},{offset},{length}\n"));
            index.push(&name, ByteRange::new(offset, length));
        }
    }

    let pairs_path = dir.join("merged_nodups.txt");
    let index_path = dir.join("merged_nodups.index");
    fs::write(&pairs_path, content).expect("Failed to write pair file");
    fs::write(&index_path, index_text).expect("Failed to write positional index");
    (pairs_path, index_path, index)
}

/// All cells of every pair at one resolution, keyed by master index key
pub fn read_all_cells(
    output: &Path,
    zoom: usize,
    codec: &dyn BlockCodec,
) -> BTreeMap<String, BTreeMap<(u32, u32), f32>> {
    let mut reader = CompositeReader::open(output).expect("Failed to open output");
    let keys: Vec<String> = reader
        .read_master_index()
        .expect("Failed to read master index")
        .into_iter()
        .map(|(k, _)| k)
        // The whole-genome pair has a single resolution
        .filter(|k| zoom == 0 || k != "0_0")
        .collect();
    keys.into_iter()
        .map(|key| {
            let cells = reader
                .read_cells(&key, zoom, codec)
                .expect("Failed to read cells")
                .into_iter()
                .map(|c| ((c.row, c.col), c.count))
                .collect();
            (key, cells)
        })
        .collect()
}
