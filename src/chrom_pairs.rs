/// Deterministic enumeration of chromosome pairs
///
/// Pair 0 is reserved for the whole-genome aggregate (`All-All`). All other
/// ids enumerate unordered pairs `i <= j` over chromosomes 1..N.
use std::collections::HashMap;

use crate::error::{CompactError, Result};
use crate::genome::GenomeCatalog;

/// Reserved pair id for the whole-genome matrix
pub const WHOLE_GENOME_PAIR: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomePair {
    pub pair_id: u32,
    pub chr1: u32,
    pub chr2: u32,
    /// `name1-name2`
    pub name: String,
}

impl ChromosomePair {
    /// Master index key, `chr1_chr2` over ordinals
    pub fn key(&self) -> String {
        format!("{}_{}", self.chr1, self.chr2)
    }
}

/// Bidirectional pair name <-> id lookup
#[derive(Debug, Clone, Default)]
pub struct ChromosomePairIndex {
    /// All pairs (id is the index in this vec)
    pairs: Vec<ChromosomePair>,
    /// Map from `name1-name2` to id
    name_to_id: HashMap<String, u32>,
    /// Map from ordinals to id
    ordinals_to_id: HashMap<(u32, u32), u32>,
}

impl ChromosomePairIndex {
    pub fn new(catalog: &GenomeCatalog) -> Self {
        let mut index = ChromosomePairIndex::default();
        let n = catalog.len() as u32;
        if n == 0 {
            return index;
        }

        index.push(0, 0, catalog);
        for i in 1..n {
            for j in i..n {
                index.push(i, j, catalog);
            }
        }
        index
    }

    fn push(&mut self, chr1: u32, chr2: u32, catalog: &GenomeCatalog) {
        let pair_id = self.pairs.len() as u32;
        let name = format!("{}-{}", catalog.name(chr1), catalog.name(chr2));
        self.name_to_id.insert(name.clone(), pair_id);
        self.ordinals_to_id.insert((chr1, chr2), pair_id);
        self.pairs.push(ChromosomePair {
            pair_id,
            chr1,
            chr2,
            name,
        });
    }

    pub fn id_of(&self, name: &str) -> Result<u32> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| CompactError::NotFound(format!("chromosome pair '{name}'")))
    }

    /// Id of `name` or of its reverse `b-a`
    ///
    /// Chromosome names may themselves contain '-', so every split point is
    /// tried.
    pub fn id_of_either(&self, name: &str) -> Option<u32> {
        if let Some(&id) = self.name_to_id.get(name) {
            return Some(id);
        }
        name.match_indices('-').find_map(|(at, _)| {
            let reversed = format!("{}-{}", &name[at + 1..], &name[..at]);
            self.name_to_id.get(&reversed).copied()
        })
    }

    pub fn id_of_ordinals(&self, chr1: u32, chr2: u32) -> Option<u32> {
        let key = if chr1 <= chr2 { (chr1, chr2) } else { (chr2, chr1) };
        self.ordinals_to_id.get(&key).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.pairs.get(id as usize).map(|p| p.name.as_str())
    }

    pub fn chromosomes_of(&self, id: u32) -> Option<(u32, u32)> {
        self.pairs.get(id as usize).map(|p| (p.chr1, p.chr2))
    }

    pub fn get(&self, id: u32) -> Option<&ChromosomePair> {
        self.pairs.get(id as usize)
    }

    pub fn pairs(&self) -> &[ChromosomePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
