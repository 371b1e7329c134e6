//! Packed hit records
//!
//! One hit is one occurrence of one term in one section of one document,
//! packed into a single little-endian `u64` so the hit buffer stays a flat
//! array of fixed-size records. Field widths are a file-format contract;
//! changing any of them requires a format version bump.
//!
//! Bit layout, LSB first:
//!
//! | field           | bits  |
//! |-----------------|-------|
//! | prev_offset     | 0..13 |
//! | match_type_flag | 13    |
//! | section_id      | 14..18|
//! | document_id     | 18..42|
//! | term_id         | 42..64|
//!
//! `prev_offset` is the distance in records back to the previous hit for
//! the same term; zero means the chain segment ends here.

use bytemuck::{Pod, Zeroable};

use super::types::{DocumentId, SectionId, TermId};

/// Widest term id a hit can carry.
pub const TERM_ID_BITS: u32 = 22;
/// Widest document id a hit can carry.
pub const DOCUMENT_ID_BITS: u32 = 24;
/// Exclusive upper bound on document ids representable in a hit.
pub const MAX_DOCUMENT_ID: DocumentId = (1 << DOCUMENT_ID_BITS) - 1;

const PREV_OFFSET_BITS: u32 = 13;
/// Largest chain-link distance a hit can encode; longer gaps fragment the
/// chain through the overflow map.
pub const MAX_PREV_OFFSET: u32 = (1 << PREV_OFFSET_BITS) - 1;

const PREV_OFFSET_SHIFT: u32 = 0;
const MATCH_FLAG_SHIFT: u32 = 13;
const SECTION_ID_SHIFT: u32 = 14;
const DOCUMENT_ID_SHIFT: u32 = 18;
const TERM_ID_SHIFT: u32 = 42;

const PREV_OFFSET_MASK: u64 = (1 << PREV_OFFSET_BITS) - 1;
const SECTION_ID_MASK: u64 = 0xF;
const DOCUMENT_ID_MASK: u64 = (1 << DOCUMENT_ID_BITS) - 1;
const TERM_ID_MASK: u64 = (1 << TERM_ID_BITS) - 1;

/// A single packed hit record as stored in the hit buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct Hit(u64);

impl Hit {
    /// Pack a hit. Callers guarantee the fields are in range; the packing
    /// masks defensively so a bug cannot corrupt neighboring fields.
    pub fn new(
        term_id: TermId,
        document_id: DocumentId,
        section_id: SectionId,
        is_prefix: bool,
        prev_offset: u32,
    ) -> Self {
        debug_assert!(u64::from(term_id.as_u32()) <= TERM_ID_MASK);
        debug_assert!((0..=MAX_DOCUMENT_ID).contains(&document_id));
        debug_assert!(u64::from(section_id) <= SECTION_ID_MASK);
        debug_assert!(prev_offset <= MAX_PREV_OFFSET);

        let mut raw = 0u64;
        raw |= (u64::from(prev_offset) & PREV_OFFSET_MASK) << PREV_OFFSET_SHIFT;
        raw |= u64::from(is_prefix) << MATCH_FLAG_SHIFT;
        raw |= (u64::from(section_id) & SECTION_ID_MASK) << SECTION_ID_SHIFT;
        raw |= (document_id as u64 & DOCUMENT_ID_MASK) << DOCUMENT_ID_SHIFT;
        raw |= (u64::from(term_id.as_u32()) & TERM_ID_MASK) << TERM_ID_SHIFT;
        Self(raw)
    }

    pub fn term_id(&self) -> TermId {
        TermId::new(((self.0 >> TERM_ID_SHIFT) & TERM_ID_MASK) as u32)
    }

    pub fn document_id(&self) -> DocumentId {
        ((self.0 >> DOCUMENT_ID_SHIFT) & DOCUMENT_ID_MASK) as DocumentId
    }

    pub fn section_id(&self) -> SectionId {
        ((self.0 >> SECTION_ID_SHIFT) & SECTION_ID_MASK) as SectionId
    }

    /// Whether the hit was stored under prefix-eligible matching.
    pub fn is_prefix(&self) -> bool {
        (self.0 >> MATCH_FLAG_SHIFT) & 1 == 1
    }

    /// Distance in records back to the previous hit of the same term;
    /// zero ends the chain segment.
    pub fn prev_offset(&self) -> u32 {
        ((self.0 >> PREV_OFFSET_SHIFT) & PREV_OFFSET_MASK) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let hit = Hit::new(TermId::new(91), 1203, 7, true, 45);
        assert_eq!(hit.term_id(), TermId::new(91));
        assert_eq!(hit.document_id(), 1203);
        assert_eq!(hit.section_id(), 7);
        assert!(hit.is_prefix());
        assert_eq!(hit.prev_offset(), 45);
    }

    #[test]
    fn test_field_extremes() {
        let hit = Hit::new(
            TermId::new((1 << TERM_ID_BITS) - 1),
            MAX_DOCUMENT_ID,
            15,
            false,
            MAX_PREV_OFFSET,
        );
        assert_eq!(hit.term_id().as_u32(), (1 << TERM_ID_BITS) - 1);
        assert_eq!(hit.document_id(), MAX_DOCUMENT_ID);
        assert_eq!(hit.section_id(), 15);
        assert!(!hit.is_prefix());
        assert_eq!(hit.prev_offset(), MAX_PREV_OFFSET);
    }

    #[test]
    fn test_fields_do_not_bleed() {
        let hit = Hit::new(TermId::new(0), 0, 15, false, 0);
        assert_eq!(hit.document_id(), 0);
        assert_eq!(hit.term_id().as_u32(), 0);
        assert_eq!(hit.prev_offset(), 0);
        assert!(!hit.is_prefix());

        let hit = Hit::new(TermId::new(0), MAX_DOCUMENT_ID, 0, false, 0);
        assert_eq!(hit.section_id(), 0);
        assert_eq!(hit.term_id().as_u32(), 0);
    }

    #[test]
    fn test_zeroed_is_empty_chain() {
        let hit: Hit = bytemuck::Zeroable::zeroed();
        assert_eq!(hit.prev_offset(), 0);
        assert_eq!(hit.document_id(), 0);
    }
}
