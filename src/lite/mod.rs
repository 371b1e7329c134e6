//! Single-segment inverted index ("lite" index)
//!
//! The lite index records term occurrences as packed hits in an
//! append-only, mmap-backed buffer. Hits for a term are linked backward
//! into a chain whose head lives in the posting head table, so iteration
//! naturally runs in descending document order. The lexicon assigns dense
//! term ids and answers prefix enumeration for prefix queries.
//!
//! # Architecture
//!
//! - `TermLexicon`: term string -> dense term id, with prefix scans
//! - `HitBuffer`: packed hit records + per-term chain heads
//! - `LiteIndex`: ties the files together behind edit/query contracts
//! - `HitIterator`: merges per-term chains into per-document hit groups

mod buffer;
mod hit;
mod index;
mod iterator;
mod lexicon;
mod types;

pub use buffer::{HitBuffer, HIT_RECORD_SIZE};
pub use hit::{Hit, MAX_DOCUMENT_ID, MAX_PREV_OFFSET};
pub use index::{Editor, LiteIndex, INDEX_DIR};
pub use iterator::HitIterator;
pub use lexicon::{TermLexicon, MAX_TERMS};
pub use types::{
    DocHitInfo, DocumentId, SectionId, SectionIdMask, TermId, TermMatchType,
    INVALID_DOCUMENT_ID, NUM_SECTIONS, SECTION_MASK_ALL, SECTION_MASK_NONE,
};
