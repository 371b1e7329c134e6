//! Hit iterator
//!
//! One iterator per query. The query term resolves to one chain walker for
//! an exact lookup, or one walker per prefix-expanded candidate term; the
//! walkers are merged by always emitting the largest pending document id,
//! OR-ing the qualifying section bits of every hit at that document into a
//! single `DocHitInfo`.

use std::fmt;

use crate::error::{MinnowError, Result};

use super::buffer::ChainWalker;
use super::hit::Hit;
use super::index::LiteIndex;
use super::types::{DocHitInfo, DocumentId, SectionIdMask, TermId, TermMatchType};

/// Streams per-document hit groups for one query, in strictly descending
/// document order.
///
/// Not restartable: call [`advance`] until it fails. The first failure of a
/// never-matching query is not-found; a previously matching iterator fails
/// with resource-exhausted once it runs past its end.
///
/// [`advance`]: HitIterator::advance
pub struct HitIterator<'a> {
    walkers: Vec<TermWalker<'a>>,
    query_term: String,
    section_mask: SectionIdMask,
    is_prefix_query: bool,
    current: DocHitInfo,
    yielded_any: bool,
    done: bool,
}

/// One candidate term's chain, filtered to the hits the query may see.
struct TermWalker<'a> {
    walker: ChainWalker<'a>,
    /// The candidate term is byte-equal to the query term. Prefix-expanded
    /// candidates only surface prefix-tagged hits; the exact term
    /// surfaces every hit regardless of its stored match type.
    is_exact_term: bool,
    pending: Option<Hit>,
    primed: bool,
}

impl<'a> TermWalker<'a> {
    fn peek(&mut self) -> Result<Option<Hit>> {
        if !self.primed {
            self.pending = self.pull()?;
            self.primed = true;
        }
        Ok(self.pending)
    }

    fn advance(&mut self) -> Result<()> {
        self.pending = self.pull()?;
        self.primed = true;
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Hit>> {
        while let Some(hit) = self.walker.next_hit()? {
            if self.is_exact_term || hit.is_prefix() {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

impl<'a> HitIterator<'a> {
    pub(crate) fn new(
        index: &'a LiteIndex,
        term: &str,
        section_mask: SectionIdMask,
        match_type: TermMatchType,
    ) -> Result<Self> {
        let is_prefix_query = match match_type {
            TermMatchType::ExactOnly => false,
            TermMatchType::Prefix => true,
            TermMatchType::Unknown => {
                return Err(MinnowError::InvalidArgument(
                    "cannot query with an unknown match type".to_string(),
                ))
            }
        };

        let candidates: Vec<(bool, TermId)> = if is_prefix_query {
            index
                .lexicon()
                .prefix_scan(term.as_bytes())
                .map(|(candidate, id)| (candidate == term.as_bytes(), id))
                .collect()
        } else {
            index
                .lexicon()
                .lookup(term.as_bytes())
                .map(|id| (true, id))
                .into_iter()
                .collect()
        };

        let snapshot_len = index.hit_buffer().num_hits();
        let mut walkers = Vec::with_capacity(candidates.len());
        for (is_exact_term, term_id) in candidates {
            walkers.push(TermWalker {
                walker: index.hit_buffer().walker(term_id, snapshot_len)?,
                is_exact_term,
                pending: None,
                primed: false,
            });
        }

        Ok(Self {
            walkers,
            query_term: term.to_string(),
            section_mask,
            is_prefix_query,
            current: DocHitInfo::invalid(),
            yielded_any: false,
            done: false,
        })
    }

    /// Move to the next matching document group.
    ///
    /// After any failure the current info reads as invalid. A corrupt hit
    /// chain fails the query with an internal error; the index itself
    /// remains usable.
    pub fn advance(&mut self) -> Result<()> {
        match self.advance_inner() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.current = DocHitInfo::invalid();
                Err(e)
            }
        }
    }

    /// The group the last successful advance landed on.
    pub fn doc_hit_info(&self) -> DocHitInfo {
        self.current
    }

    fn advance_inner(&mut self) -> Result<()> {
        if self.done {
            return Err(MinnowError::ResourceExhausted(
                "iterator advanced past its end".to_string(),
            ));
        }

        loop {
            let mut group_doc: Option<DocumentId> = None;
            for walker in &mut self.walkers {
                if let Some(hit) = walker.peek()? {
                    let doc = hit.document_id();
                    group_doc = Some(group_doc.map_or(doc, |current| current.max(doc)));
                }
            }

            let Some(doc) = group_doc else {
                self.done = true;
                return Err(if self.yielded_any {
                    MinnowError::ResourceExhausted(
                        "iterator advanced past its end".to_string(),
                    )
                } else {
                    MinnowError::NotFound(format!("no hits for \"{}\"", self.query_term))
                });
            };

            let mut info = DocHitInfo::new(doc, 0);
            for walker in &mut self.walkers {
                while let Some(hit) = walker.peek()? {
                    if hit.document_id() != doc {
                        break;
                    }
                    info.update_section(hit.section_id());
                    walker.advance()?;
                }
            }

            let masked = info.hit_section_ids_mask() & self.section_mask;
            if masked != 0 {
                self.current = DocHitInfo::new(doc, masked);
                self.yielded_any = true;
                return Ok(());
            }
            // Every section of this document is masked out; try the next
            // document group.
        }
    }
}

impl fmt::Display for HitIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016b}:{}{}",
            self.section_mask,
            self.query_term,
            if self.is_prefix_query { "*" } else { "" }
        )
    }
}
