//! Core types for the lite index

use serde::{Deserialize, Serialize};
use std::fmt;

/// Document identifier assigned by the host's document store.
///
/// Valid ids are non-negative; [`INVALID_DOCUMENT_ID`] is the sentinel.
pub type DocumentId = i32;

/// Sentinel for "no document".
pub const INVALID_DOCUMENT_ID: DocumentId = -1;

/// Identifier of a section within a document's schema, in `[0, 16)`.
pub type SectionId = u8;

/// Exclusive upper bound on section ids.
pub const NUM_SECTIONS: u8 = 16;

/// Bitset over section ids.
pub type SectionIdMask = u16;

pub const SECTION_MASK_ALL: SectionIdMask = 0xFFFF;
pub const SECTION_MASK_NONE: SectionIdMask = 0;

/// How a stored hit (or a query) participates in prefix expansion.
///
/// A hit stored as `Prefix` is visible to both exact and prefix queries; a
/// hit stored as `ExactOnly` is visible to prefix queries only when the
/// stored term equals the query term. `Unknown` marks unindexed content and
/// is rejected on both paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermMatchType {
    Unknown,
    ExactOnly,
    Prefix,
}

/// Dense term identifier assigned by the lexicon in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TermId(pub u32);

impl TermId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term_{}", self.0)
    }
}

/// Per-document merge of all matching hits: the document id and the OR of
/// the section bits its qualifying hits carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocHitInfo {
    document_id: DocumentId,
    hit_section_ids_mask: SectionIdMask,
}

impl DocHitInfo {
    pub fn new(document_id: DocumentId, hit_section_ids_mask: SectionIdMask) -> Self {
        Self {
            document_id,
            hit_section_ids_mask,
        }
    }

    /// The "no hit" value reported after a failed iterator advance.
    pub fn invalid() -> Self {
        Self::new(INVALID_DOCUMENT_ID, SECTION_MASK_NONE)
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn hit_section_ids_mask(&self) -> SectionIdMask {
        self.hit_section_ids_mask
    }

    /// OR the bit for `section_id` into the mask.
    pub fn update_section(&mut self, section_id: SectionId) {
        self.hit_section_ids_mask |= 1 << section_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_id() {
        let id = TermId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert_eq!(format!("{}", id), "term_42");
    }

    #[test]
    fn test_doc_hit_info_sections() {
        let mut info = DocHitInfo::new(7, SECTION_MASK_NONE);
        info.update_section(2);
        info.update_section(3);
        assert_eq!(info.hit_section_ids_mask(), (1 << 2) | (1 << 3));
        assert_eq!(info.document_id(), 7);
    }

    #[test]
    fn test_invalid_doc_hit_info() {
        let info = DocHitInfo::invalid();
        assert_eq!(info.document_id(), INVALID_DOCUMENT_ID);
        assert_eq!(info.hit_section_ids_mask(), SECTION_MASK_NONE);
    }
}
