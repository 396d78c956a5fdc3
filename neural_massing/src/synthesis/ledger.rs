//! Registry of latent codes and how each one was made.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MassingError, Result};
use crate::latent::{LatentCode, LatentTable};

/// How a ledger entry came to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// A trained shape's latent code.
    Initial {
        /// Shape index in the training set.
        shape: usize,
    },
    /// Chained interpolation of earlier entries.
    Interpolation {
        /// Ledger entries, in chain order.
        sources: Vec<usize>,
        /// One factor per link of the chain.
        factors: Vec<f32>,
    },
    /// `base + Σ add - Σ subtract` over earlier entries.
    Arithmetic {
        /// Starting entry.
        base: usize,
        /// Entries added.
        add: Vec<usize>,
        /// Entries subtracted.
        subtract: Vec<usize>,
    },
    /// Fitted to samples of an unseen shape.
    Recovered {
        /// Residual loss of the fit.
        loss: f32,
    },
}

impl Provenance {
    /// Ledger entries this one was derived from.
    pub fn parents(&self) -> Vec<usize> {
        match self {
            Provenance::Initial { .. } | Provenance::Recovered { .. } => Vec::new(),
            Provenance::Interpolation { sources, .. } => sources.clone(),
            Provenance::Arithmetic { base, add, subtract } => std::iter::once(*base)
                .chain(add.iter().copied())
                .chain(subtract.iter().copied())
                .collect(),
        }
    }
}

/// One latent code in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The code.
    pub latent: LatentCode,
    /// Where it came from.
    pub provenance: Provenance,
}

/// Append-only list of latent codes with provenance, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisLedger {
    dim: usize,
    entries: Vec<LedgerEntry>,
}

impl SynthesisLedger {
    /// Empty ledger for codes of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
        }
    }

    /// Ledger seeded with every trained shape, entry `i` being shape `i`.
    pub fn from_table(table: &LatentTable) -> Self {
        Self {
            dim: table.dim(),
            entries: table
                .iter()
                .enumerate()
                .map(|(shape, latent)| LedgerEntry {
                    latent: latent.clone(),
                    provenance: Provenance::Initial { shape },
                })
                .collect(),
        }
    }

    /// Latent dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by index.
    pub fn entry(&self, index: usize) -> Result<&LedgerEntry> {
        self.entries.get(index).ok_or_else(|| {
            MassingError::data(format!("unknown ledger entry {index} (ledger has {})", self.len()))
        })
    }

    /// All entries.
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    /// Append an entry. Parents must already be in the ledger.
    pub fn record(&mut self, latent: LatentCode, provenance: Provenance) -> Result<usize> {
        if latent.dim() != self.dim {
            return Err(MassingError::data(format!(
                "latent has dimension {}, ledger holds dimension {}",
                latent.dim(),
                self.dim
            )));
        }
        if let Some(&p) = provenance.parents().iter().find(|&&p| p >= self.len()) {
            return Err(MassingError::data(format!(
                "provenance references entry {p}, but the ledger has {} entries",
                self.len()
            )));
        }
        self.entries.push(LedgerEntry { latent, provenance });
        Ok(self.entries.len() - 1)
    }

    /// Initial entries that `index` ultimately derives from, sorted.
    ///
    /// Recovered entries have no origin and give an empty list.
    pub fn trace_to_origin(&self, index: usize) -> Result<Vec<usize>> {
        self.entry(index)?;
        let mut origins = BTreeSet::new();
        let mut seen = BTreeSet::from([index]);
        let mut queue = VecDeque::from([index]);
        while let Some(i) = queue.pop_front() {
            let entry = self.entry(i)?;
            if matches!(entry.provenance, Provenance::Initial { .. }) {
                origins.insert(i);
                continue;
            }
            for parent in entry.provenance.parents() {
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(origins.into_iter().collect())
    }

    /// Write as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let ledger: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        if let Some(i) = ledger.entries.iter().position(|e| e.latent.dim() != ledger.dim) {
            return Err(MassingError::data(format!("ledger entry {i} has the wrong latent dimension")));
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SynthesisLedger {
        let table = LatentTable::from_rows(2, vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        SynthesisLedger::from_table(&table)
    }

    #[test]
    fn test_trace_through_generations() {
        let mut ledger = seeded();
        let mid = ledger
            .record(
                LatentCode::new(vec![0.5, 0.0]),
                Provenance::Interpolation {
                    sources: vec![0, 1],
                    factors: vec![0.5],
                },
            )
            .unwrap();
        let recovered = ledger
            .record(LatentCode::new(vec![0.3, 0.3]), Provenance::Recovered { loss: 0.01 })
            .unwrap();
        let child = ledger
            .record(
                LatentCode::new(vec![0.8, 0.3]),
                Provenance::Arithmetic {
                    base: mid,
                    add: vec![recovered],
                    subtract: vec![mid],
                },
            )
            .unwrap();

        assert_eq!(ledger.trace_to_origin(2).unwrap(), vec![2]);
        assert_eq!(ledger.trace_to_origin(mid).unwrap(), vec![0, 1]);
        assert_eq!(ledger.trace_to_origin(recovered).unwrap(), Vec::<usize>::new());
        assert_eq!(ledger.trace_to_origin(child).unwrap(), vec![0, 1]);
        assert!(ledger.trace_to_origin(99).is_err());
    }

    #[test]
    fn test_record_validates_parents_and_dimension() {
        let mut ledger = seeded();
        assert!(ledger
            .record(LatentCode::new(vec![0.0, 0.0]), Provenance::Arithmetic {
                base: 7,
                add: vec![],
                subtract: vec![],
            })
            .is_err());
        assert!(ledger
            .record(LatentCode::zeros(3), Provenance::Recovered { loss: 0.0 })
            .is_err());
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = seeded();
        ledger
            .record(
                LatentCode::new(vec![0.25, 0.75]),
                Provenance::Interpolation {
                    sources: vec![1, 2],
                    factors: vec![0.75],
                },
            )
            .unwrap();
        ledger.save(&path).unwrap();
        assert_eq!(SynthesisLedger::load(&path).unwrap(), ledger);
    }
}
