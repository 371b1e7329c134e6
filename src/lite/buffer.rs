//! Hit buffer and posting head table
//!
//! The hit buffer is a file-backed vector of packed hit records. Hits for
//! one term form a backward chain: each record stores the distance to the
//! previous hit of the same term, and the posting head table holds the
//! offset of the most recent hit per term id. When a link distance would
//! not fit the record's field, the chain fragments and the superseded head
//! is parked in the overflow map (persisted with the index header).

use std::collections::HashMap;
use std::path::Path;

use crate::checksum::Crc32;
use crate::error::{MinnowError, Result};
use crate::fs::Filesystem;
use crate::vector::{FileBackedVector, SyncStrategy};

use super::hit::{Hit, MAX_PREV_OFFSET};
use super::types::{DocumentId, SectionId, TermId};

/// Size in bytes of one packed hit record.
pub const HIT_RECORD_SIZE: u32 = std::mem::size_of::<Hit>() as u32;

/// Append-only store of packed hits plus the per-term chain heads.
pub struct HitBuffer {
    hits: FileBackedVector<Hit>,
    /// One slot per term id holding `head_offset + 1`; zero means the term
    /// has no hits. Growth zero-fills, so fresh term ids start empty.
    heads: FileBackedVector<u32>,
    /// Older chain-segment heads per term id, most recent first.
    overflow: HashMap<u32, Vec<u32>>,
    max_hits: u32,
}

impl HitBuffer {
    pub fn open(
        fs: &dyn Filesystem,
        hits_path: &Path,
        heads_path: &Path,
        max_hits: u32,
        overflow: HashMap<u32, Vec<u32>>,
    ) -> Result<Self> {
        let hits = FileBackedVector::create(fs, hits_path, SyncStrategy::ReadWriteAutoSync)?;
        let heads = FileBackedVector::create(fs, heads_path, SyncStrategy::ReadWriteAutoSync)?;
        Ok(Self {
            hits,
            heads,
            overflow,
            max_hits,
        })
    }

    pub fn num_hits(&self) -> u32 {
        self.hits.num_elements()
    }

    /// Append one hit and link it into its term's chain.
    pub fn append(
        &mut self,
        term_id: TermId,
        document_id: DocumentId,
        section_id: SectionId,
        is_prefix: bool,
    ) -> Result<()> {
        let current = self.hits.num_elements();
        if current >= self.max_hits {
            return Err(MinnowError::ResourceExhausted(
                "hit buffer is full".to_string(),
            ));
        }

        let prev_offset = match self.head_of(term_id)? {
            None => 0,
            Some(prev) => {
                let delta = current - prev;
                if delta > MAX_PREV_OFFSET {
                    // Chain fragments: park the superseded head and start a
                    // fresh segment.
                    self.overflow
                        .entry(term_id.as_u32())
                        .or_default()
                        .insert(0, prev);
                    0
                } else {
                    delta
                }
            }
        };

        self.hits.set(
            current,
            Hit::new(term_id, document_id, section_id, is_prefix, prev_offset),
        )?;
        self.heads.set(term_id.as_u32(), current + 1)?;
        Ok(())
    }

    /// Walk the chain for `term_id`, bounded by `snapshot_len` records.
    pub(crate) fn walker(&self, term_id: TermId, snapshot_len: u32) -> Result<ChainWalker<'_>> {
        let head = self.head_of(term_id)?;
        Ok(ChainWalker {
            buffer: self,
            term_id,
            next: head,
            overflow_pos: 0,
            snapshot_len,
        })
    }

    /// Overflow lists in deterministic order for header persistence.
    pub fn overflow_entries(&self) -> Vec<(u32, Vec<u32>)> {
        let mut entries: Vec<_> = self
            .overflow
            .iter()
            .map(|(term, heads)| (*term, heads.clone()))
            .collect();
        entries.sort_by_key(|(term, _)| *term);
        entries
    }

    pub fn hits_checksum(&mut self) -> Crc32 {
        self.hits.compute_checksum()
    }

    pub fn heads_checksum(&mut self) -> Crc32 {
        self.heads.compute_checksum()
    }

    pub fn persist_to_disk(&mut self) -> Result<()> {
        self.hits.persist_to_disk()?;
        self.heads.persist_to_disk()?;
        Ok(())
    }

    fn head_of(&self, term_id: TermId) -> Result<Option<u32>> {
        if term_id.as_u32() >= self.heads.num_elements() {
            return Ok(None);
        }
        match *self.heads.get(term_id.as_u32())? {
            0 => Ok(None),
            stored => Ok(Some(stored - 1)),
        }
    }
}

/// Streams one term's hits in strictly descending insertion order.
pub(crate) struct ChainWalker<'a> {
    buffer: &'a HitBuffer,
    term_id: TermId,
    next: Option<u32>,
    /// Index of the next overflow segment to resume from.
    overflow_pos: usize,
    /// Hits at or past this offset did not exist when the walker's iterator
    /// was created and are never yielded.
    snapshot_len: u32,
}

impl ChainWalker<'_> {
    /// The next hit in the chain, or `None` when every segment is drained.
    ///
    /// A link that escapes the buffer, crosses terms or fails to advance is
    /// chain corruption and surfaces as an internal error.
    pub(crate) fn next_hit(&mut self) -> Result<Option<Hit>> {
        let offset = match self.next {
            Some(offset) => offset,
            None => {
                let segment = self
                    .buffer
                    .overflow
                    .get(&self.term_id.as_u32())
                    .and_then(|heads| heads.get(self.overflow_pos));
                match segment {
                    Some(&head) => {
                        self.overflow_pos += 1;
                        head
                    }
                    None => return Ok(None),
                }
            }
        };

        if offset >= self.snapshot_len {
            return Err(MinnowError::Internal(format!(
                "hit chain for {} points at record {} past the buffer end {}",
                self.term_id, offset, self.snapshot_len
            )));
        }
        let hit = *self.buffer.hits.get(offset)?;
        if hit.term_id() != self.term_id {
            return Err(MinnowError::Internal(format!(
                "hit chain for {} crossed into {}",
                self.term_id,
                hit.term_id()
            )));
        }

        self.next = match hit.prev_offset() {
            0 => None,
            delta => Some(offset.checked_sub(delta).ok_or_else(|| {
                MinnowError::Internal(format!(
                    "hit chain for {} underflows at record {}",
                    self.term_id, offset
                ))
            })?),
        };
        Ok(Some(hit))
    }
}
