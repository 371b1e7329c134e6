//! Lite index facade
//!
//! Ties the lexicon, hit buffer and posting head table together behind the
//! edit and query contracts, and owns the on-disk header that carries the
//! last added document id, the chain overflow map and the combined content
//! checksum.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checksum::Crc32;
use crate::config::IndexOptions;
use crate::error::{MinnowError, Result};
use crate::fs::Filesystem;
use crate::vector;

use super::buffer::{HitBuffer, HIT_RECORD_SIZE};
use super::hit::MAX_DOCUMENT_ID;
use super::iterator::HitIterator;
use super::lexicon::TermLexicon;
use super::types::{
    DocumentId, SectionId, SectionIdMask, TermMatchType, INVALID_DOCUMENT_ID, NUM_SECTIONS,
};

/// Subdirectory of the root that holds all index files.
pub const INDEX_DIR: &str = "idx";

const HIT_BUFFER_FILE: &str = "lite.hb";
const HEADS_FILE: &str = "lite.heads";
const LEXICON_FILE: &str = "lite.lexicon";
const HEADER_FILE: &str = "lite.hdr";

const HEADER_MAGIC: u32 = u32::from_le_bytes(*b"mnix");
const HEADER_VERSION: u32 = 1;
/// Magic and version sit at fixed offsets in front of the encoded header
/// so a wrong or incompatible file is recognized before decoding.
const HEADER_PREFIX_SIZE: usize = 8;

/// On-disk index header, encoded after the raw magic/version prefix.
#[derive(Serialize, Deserialize)]
struct IndexHeader {
    last_added_document_id: DocumentId,
    combined_checksum: u32,
    /// Chain overflow lists, sorted by term id.
    overflow: Vec<(u32, Vec<u32>)>,
}

/// The single-segment inverted index.
///
/// All mutation goes through a scoped [`Editor`] obtained from [`edit`];
/// queries produce a [`HitIterator`] that borrows the index immutably, so
/// the borrow checker enforces the one-writer/many-readers discipline the
/// on-disk structures rely on.
///
/// [`edit`]: LiteIndex::edit
pub struct LiteIndex {
    fs: Arc<dyn Filesystem>,
    index_dir: PathBuf,
    lexicon: TermLexicon,
    buffer: HitBuffer,
    last_added_document_id: DocumentId,
}

impl std::fmt::Debug for LiteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteIndex")
            .field("index_dir", &self.index_dir)
            .field("last_added_document_id", &self.last_added_document_id)
            .finish_non_exhaustive()
    }
}

impl LiteIndex {
    /// Open or create the index under `options.root_dir`.
    ///
    /// Missing files initialize fresh. A checksum mismatch in any file is
    /// data loss; magic or version disagreements and I/O faults are
    /// internal errors.
    pub fn create(options: IndexOptions, fs: Arc<dyn Filesystem>) -> Result<Self> {
        if !options.merge_size_in_range() {
            return Err(MinnowError::InvalidArgument(format!(
                "index_merge_size {} outside the accepted range",
                options.index_merge_size
            )));
        }

        let index_dir = options.root_dir.join(INDEX_DIR);
        fs.create_dir_all(&index_dir)?;

        let header_path = index_dir.join(HEADER_FILE);
        let (last_added, overflow, stored_checksum) = if fs.file_exists(&header_path) {
            let bytes = fs.read_file(&header_path)?;
            if bytes.len() < HEADER_PREFIX_SIZE {
                return Err(MinnowError::Internal(
                    "index header smaller than its magic prefix".to_string(),
                ));
            }
            let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
            if magic != HEADER_MAGIC {
                return Err(MinnowError::Internal("bad magic in index header".to_string()));
            }
            if version != HEADER_VERSION {
                return Err(MinnowError::Internal(format!(
                    "unsupported index header version {}",
                    version
                )));
            }
            let header: IndexHeader = bincode::deserialize(&bytes[HEADER_PREFIX_SIZE..])
                .map_err(|e| {
                    MinnowError::Internal(format!("index header undecodable: {}", e))
                })?;
            let overflow: HashMap<u32, Vec<u32>> = header.overflow.into_iter().collect();
            (
                header.last_added_document_id,
                overflow,
                Some(header.combined_checksum),
            )
        } else {
            (INVALID_DOCUMENT_ID, HashMap::new(), None)
        };

        let max_hits = (options.index_merge_size / HIT_RECORD_SIZE).min(vector::MAX_ELEMENTS);
        let mut lexicon = TermLexicon::open(
            fs.as_ref(),
            &index_dir.join(LEXICON_FILE),
            u64::from(options.index_merge_size),
        )?;
        let mut buffer = HitBuffer::open(
            fs.as_ref(),
            &index_dir.join(HIT_BUFFER_FILE),
            &index_dir.join(HEADS_FILE),
            max_hits,
            overflow,
        )?;

        // Verify before constructing the index so the failure path cannot
        // rewrite the header on drop.
        if let Some(stored) = stored_checksum {
            let computed = combined_checksum(last_added, &mut lexicon, &mut buffer);
            if computed.get() != stored {
                return Err(MinnowError::DataLoss(format!(
                    "combined checksum mismatch: computed {}, header has {}",
                    computed.get(),
                    stored
                )));
            }
        }

        let index = Self {
            fs,
            index_dir,
            lexicon,
            buffer,
            last_added_document_id: last_added,
        };

        tracing::debug!(
            dir = %index.index_dir.display(),
            terms = index.lexicon.len(),
            hits = index.buffer.num_hits(),
            "opened lite index"
        );
        Ok(index)
    }

    /// Remove every index file under `root_dir`.
    pub fn delete(fs: &dyn Filesystem, root_dir: &Path) -> Result<()> {
        fs.delete_directory_recursively(&root_dir.join(INDEX_DIR))
    }

    /// Begin recording hits for one `(document, section, match type)`.
    ///
    /// Precondition violations surface at the editor's first `add_hit`.
    pub fn edit(
        &mut self,
        document_id: DocumentId,
        section_id: SectionId,
        match_type: TermMatchType,
    ) -> Editor<'_> {
        Editor {
            index: self,
            document_id,
            section_id,
            match_type,
            seen_terms: HashSet::new(),
        }
    }

    /// Build an iterator over the documents matching `term`.
    ///
    /// An unindexed term is not an error here: the iterator reports
    /// not-found on its first advance.
    pub fn get_iterator(
        &self,
        term: &str,
        section_mask: SectionIdMask,
        match_type: TermMatchType,
    ) -> Result<HitIterator<'_>> {
        HitIterator::new(self, term, section_mask, match_type)
    }

    /// The highest document id any hit was recorded for, or
    /// [`INVALID_DOCUMENT_ID`] when the index is empty.
    pub fn last_added_document_id(&self) -> DocumentId {
        self.last_added_document_id
    }

    /// Deterministic checksum of the index's logical content: header
    /// fields, lexicon, posting heads and hit buffer.
    pub fn compute_checksum(&mut self) -> Crc32 {
        combined_checksum(
            self.last_added_document_id,
            &mut self.lexicon,
            &mut self.buffer,
        )
    }

    /// Flush every subfile and rewrite the header.
    pub fn persist_to_disk(&mut self) -> Result<()> {
        self.buffer.persist_to_disk()?;
        self.lexicon
            .persist(self.fs.as_ref(), &self.index_dir.join(LEXICON_FILE))?;

        let header = IndexHeader {
            last_added_document_id: self.last_added_document_id,
            combined_checksum: self.compute_checksum().get(),
            overflow: self.buffer.overflow_entries(),
        };
        let payload = bincode::serialize(&header)
            .map_err(|e| MinnowError::Internal(format!("index header serialize: {}", e)))?;
        let mut bytes = Vec::with_capacity(HEADER_PREFIX_SIZE + payload.len());
        bytes.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&HEADER_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        self.fs.write_file(&self.index_dir.join(HEADER_FILE), &bytes)
    }

    pub(crate) fn lexicon(&self) -> &TermLexicon {
        &self.lexicon
    }

    pub(crate) fn hit_buffer(&self) -> &HitBuffer {
        &self.buffer
    }
}

fn combined_checksum(
    last_added_document_id: DocumentId,
    lexicon: &mut TermLexicon,
    buffer: &mut HitBuffer,
) -> Crc32 {
    let mut crc = Crc32::new();
    crc.append(&last_added_document_id.to_le_bytes());
    for (term, heads) in buffer.overflow_entries() {
        crc.append(&term.to_le_bytes());
        crc.append(&(heads.len() as u32).to_le_bytes());
        for head in heads {
            crc.append(&head.to_le_bytes());
        }
    }
    crc.append(&lexicon.compute_checksum().get().to_le_bytes());
    crc.append(&buffer.heads_checksum().get().to_le_bytes());
    crc.append(&buffer.hits_checksum().get().to_le_bytes());
    crc
}

impl Drop for LiteIndex {
    fn drop(&mut self) {
        if let Err(e) = self.persist_to_disk() {
            tracing::warn!(
                dir = %self.index_dir.display(),
                error = %e,
                "failed to persist lite index on drop"
            );
        }
    }
}

/// Scoped accumulator for one document section.
///
/// Holds the index's mutable borrow for its lifetime, so hits become
/// visible to iterators as soon as the editor is dropped (and no iterator
/// can observe a half-written chain).
pub struct Editor<'a> {
    index: &'a mut LiteIndex,
    document_id: DocumentId,
    section_id: SectionId,
    match_type: TermMatchType,
    /// Terms already recorded by this editor; repeats are no-ops.
    seen_terms: HashSet<Vec<u8>>,
}

impl Editor<'_> {
    /// Record one occurrence of `term`.
    ///
    /// Repeated calls with the same term are de-duplicated for the
    /// editor's lifetime. A full lexicon or hit buffer is resource
    /// exhaustion and leaves `last_added_document_id` untouched.
    pub fn add_hit(&mut self, term: &str) -> Result<()> {
        if self.match_type == TermMatchType::Unknown {
            return Err(MinnowError::InvalidArgument(
                "cannot index with an unknown match type".to_string(),
            ));
        }
        if self.section_id >= NUM_SECTIONS {
            return Err(MinnowError::InvalidArgument(format!(
                "section id {} out of range",
                self.section_id
            )));
        }
        if self.document_id < 0 || self.document_id > MAX_DOCUMENT_ID {
            return Err(MinnowError::InvalidArgument(format!(
                "document id {} not indexable",
                self.document_id
            )));
        }
        if self.document_id < self.index.last_added_document_id {
            return Err(MinnowError::InvalidArgument(format!(
                "document id {} precedes last added document id {}",
                self.document_id, self.index.last_added_document_id
            )));
        }

        if self.seen_terms.contains(term.as_bytes()) {
            return Ok(());
        }

        let term_id = self.index.lexicon.insert(term.as_bytes())?;
        self.index.buffer.append(
            term_id,
            self.document_id,
            self.section_id,
            self.match_type == TermMatchType::Prefix,
        )?;
        self.index.last_added_document_id = self.document_id;
        self.seen_terms.insert(term.as_bytes().to_vec());
        Ok(())
    }
}
