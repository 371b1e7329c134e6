//! Term lexicon
//!
//! Maps term byte strings to dense ids assigned in insertion order. The
//! live lexicon is an ordered map so prefix enumeration is a range scan;
//! persistence freezes it into an FST (term -> id) and open rebuilds the
//! map by streaming the FST back.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use fst::{Map, MapBuilder, Streamer};

use crate::checksum::Crc32;
use crate::error::{MinnowError, Result};
use crate::fs::Filesystem;
use crate::vector;

use super::types::TermId;

/// Magic bytes identifying a lexicon file
const FILE_MAGIC: u32 = u32::from_le_bytes(*b"mnlx");
/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;
/// Header: magic, version, term count, FST checksum (u32 LE each).
const HEADER_SIZE: usize = 16;

/// Fixed byte cost charged per entry on top of the term bytes.
const ENTRY_OVERHEAD: u64 = 8;

/// Hard cap on stored terms. The posting head table holds one slot per term
/// id, so the cap follows the head table's element limit (which is itself
/// below the 22-bit term-id field of a packed hit).
pub const MAX_TERMS: u32 = vector::MAX_ELEMENTS;

/// Dictionary of indexed terms with dense insertion-order ids.
#[derive(Debug)]
pub struct TermLexicon {
    terms: BTreeMap<Vec<u8>, TermId>,
    next_id: u32,
    budget_bytes: u64,
    used_bytes: u64,
    cached_crc: Option<Crc32>,
}

impl TermLexicon {
    /// Open the lexicon file at `path`, or start empty if it is absent.
    ///
    /// `budget_bytes` bounds the cumulative cost of stored terms; inserts
    /// beyond it are resource-exhausted.
    pub fn open(fs: &dyn Filesystem, path: &Path, budget_bytes: u64) -> Result<Self> {
        if !fs.file_exists(path) {
            return Ok(Self {
                terms: BTreeMap::new(),
                next_id: 0,
                budget_bytes,
                used_bytes: 0,
                cached_crc: None,
            });
        }

        let bytes = fs.read_file(path)?;
        if bytes.len() < HEADER_SIZE {
            return Err(MinnowError::Internal(format!(
                "lexicon file {} smaller than its header",
                path.display()
            )));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let num_terms = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let stored_crc = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        if magic != FILE_MAGIC {
            return Err(MinnowError::Internal(format!(
                "bad magic in lexicon file {}",
                path.display()
            )));
        }
        if version != FORMAT_VERSION {
            return Err(MinnowError::Internal(format!(
                "unsupported lexicon file version {} in {}",
                version,
                path.display()
            )));
        }

        let fst_bytes = &bytes[HEADER_SIZE..];
        let crc = Crc32::of(fst_bytes);
        if crc.get() != stored_crc {
            return Err(MinnowError::DataLoss(format!(
                "checksum mismatch in {}: computed {}, header has {}",
                path.display(),
                crc.get(),
                stored_crc
            )));
        }

        let map = Map::new(fst_bytes.to_vec())
            .map_err(|e| MinnowError::Internal(format!("lexicon fst unreadable: {}", e)))?;

        let mut terms = BTreeMap::new();
        let mut used_bytes = 0u64;
        let mut stream = map.stream();
        while let Some((term, id)) = stream.next() {
            used_bytes += term.len() as u64 + ENTRY_OVERHEAD;
            terms.insert(term.to_vec(), TermId::new(id as u32));
        }
        if terms.len() as u32 != num_terms {
            return Err(MinnowError::Internal(format!(
                "lexicon file {} records {} terms but holds {}",
                path.display(),
                num_terms,
                terms.len()
            )));
        }

        tracing::debug!(path = %path.display(), terms = num_terms, "reopened lexicon");
        Ok(Self {
            terms,
            next_id: num_terms,
            budget_bytes,
            used_bytes,
            cached_crc: None,
        })
    }

    /// Insert a term, returning its id (the existing id if already present).
    pub fn insert(&mut self, term: &[u8]) -> Result<TermId> {
        if term.is_empty() {
            return Err(MinnowError::InvalidArgument(
                "terms must be non-empty".to_string(),
            ));
        }
        if let Some(id) = self.terms.get(term) {
            return Ok(*id);
        }
        let cost = term.len() as u64 + ENTRY_OVERHEAD;
        if self.next_id >= MAX_TERMS || self.used_bytes + cost > self.budget_bytes {
            return Err(MinnowError::ResourceExhausted(
                "lexicon is full".to_string(),
            ));
        }
        let id = TermId::new(self.next_id);
        self.next_id += 1;
        self.used_bytes += cost;
        self.terms.insert(term.to_vec(), id);
        self.cached_crc = None;
        Ok(id)
    }

    pub fn lookup(&self, term: &[u8]) -> Option<TermId> {
        self.terms.get(term).copied()
    }

    /// All stored terms starting with `prefix`, lexicographically ordered.
    pub fn prefix_scan<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], TermId)> + 'a {
        self.terms
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, id)| (term.as_slice(), *id))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// CRC over the canonical `(length, term, id)` serialization, stable
    /// across persist/reopen cycles.
    pub fn compute_checksum(&mut self) -> Crc32 {
        if let Some(crc) = self.cached_crc {
            return crc;
        }
        let mut crc = Crc32::new();
        for (term, id) in &self.terms {
            crc.append(&(term.len() as u32).to_le_bytes());
            crc.append(term);
            crc.append(&id.as_u32().to_le_bytes());
        }
        self.cached_crc = Some(crc);
        crc
    }

    /// Freeze the lexicon into its FST file.
    pub fn persist(&self, fs: &dyn Filesystem, path: &Path) -> Result<()> {
        let mut builder = MapBuilder::memory();
        for (term, id) in &self.terms {
            builder
                .insert(term, u64::from(id.as_u32()))
                .map_err(|e| MinnowError::Internal(format!("lexicon fst build: {}", e)))?;
        }
        let fst_bytes = builder
            .into_inner()
            .map_err(|e| MinnowError::Internal(format!("lexicon fst build: {}", e)))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + fst_bytes.len());
        out.extend_from_slice(&FILE_MAGIC.to_le_bytes());
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.terms.len() as u32).to_le_bytes());
        out.extend_from_slice(&Crc32::of(&fst_bytes).get().to_le_bytes());
        out.extend_from_slice(&fst_bytes);
        fs.write_file(path, &out)
    }
}
