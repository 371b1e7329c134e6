//! minnow — an on-device inverted index core for full-text search
//!
//! The crate implements the storage heart of a device-local search engine:
//! a single-segment inverted index persisted through memory-mapped,
//! checksummed files. Hosts feed it normalized terms per document section
//! through a scoped editor and read back per-document hit groups through a
//! merging iterator, in descending document order.
//!
//! Tokenization, normalization, schema management and scoring live in the
//! surrounding engine; this crate only consumes a [`Filesystem`] contract
//! and exposes the edit/query surface of [`LiteIndex`].

pub mod checksum;
pub mod config;
pub mod error;
pub mod fs;
pub mod lite;
pub mod vector;

pub use checksum::Crc32;
pub use config::{IndexOptions, MAX_INDEX_MERGE_SIZE, MIN_INDEX_MERGE_SIZE};
pub use error::{MinnowError, Result};
pub use fs::{Filesystem, StdFilesystem};
pub use lite::{
    DocHitInfo, DocumentId, Editor, HitIterator, LiteIndex, SectionId, SectionIdMask,
    TermMatchType, INVALID_DOCUMENT_ID, SECTION_MASK_ALL, SECTION_MASK_NONE,
};
pub use vector::{FileBackedVector, SyncStrategy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
