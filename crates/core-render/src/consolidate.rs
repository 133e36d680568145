//! Candidate spans → non-overlapping, gap-free paint spans for one segment.
//!
//! Painter's algorithm: candidates are applied in list order onto a sorted,
//! disjoint fragment list, so a later candidate replaces whatever earlier
//! fragments it overlaps. A partially covered earlier fragment is split and
//! its uncovered remainders stay in place for later candidates to paint over.
//!
//! Invariants of the output for a window `[start, end)`:
//! * Spans are contiguous, non-overlapping and cover the window exactly.
//! * Offsets no candidate covers carry `fallback_context()`.
//! * Adjacent spans never share an identical context (they are coalesced).
//! * An empty window yields no spans.

use std::ops::Range;

use crate::projector::CandidateSpan;
use crate::style::{StyleColor, StyleContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedSpan {
    pub start: usize,
    pub end: usize,
    pub context: StyleContext,
}

impl ConsolidatedSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Style for offsets no candidate covers; makes gaps visible.
pub fn fallback_context() -> StyleContext {
    StyleContext::new().with_color(StyleColor::Error)
}

/// Index into the candidate list, or the fallback style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Candidate(usize),
    Fallback,
}

pub fn consolidate(candidates: &[CandidateSpan], start: usize, end: usize) -> Vec<ConsolidatedSpan> {
    if end <= start {
        return Vec::new();
    }

    let mut fragments: Vec<(Range<usize>, Source)> = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        let s = c.start.max(start);
        let e = c.end.min(end);
        if s >= e {
            continue;
        }
        let lo = fragments.partition_point(|(r, _)| r.end <= s);
        let hi = fragments.partition_point(|(r, _)| r.start < e);
        let mut replacement: Vec<(Range<usize>, Source)> = Vec::with_capacity(3);
        if lo < hi {
            let (head, src) = &fragments[lo];
            if head.start < s {
                replacement.push((head.start..s, *src));
            }
        }
        replacement.push((s..e, Source::Candidate(i)));
        if lo < hi {
            let (tail, src) = &fragments[hi - 1];
            if tail.end > e {
                replacement.push((e..tail.end, *src));
            }
        }
        fragments.splice(lo..hi, replacement);
    }

    let fallback = fallback_context();

    let mut filled: Vec<(Range<usize>, Source)> = Vec::with_capacity(fragments.len() * 2 + 1);
    let mut cursor = start;
    for (range, src) in fragments {
        if range.start > cursor {
            filled.push((cursor..range.start, Source::Fallback));
        }
        cursor = range.end;
        filled.push((range, src));
    }
    if cursor < end {
        filled.push((cursor..end, Source::Fallback));
    }

    let mut out: Vec<ConsolidatedSpan> = Vec::with_capacity(filled.len());
    for (range, src) in filled {
        let context = match src {
            Source::Candidate(i) => &candidates[i].context,
            Source::Fallback => &fallback,
        };
        match out.last_mut() {
            Some(prev) if prev.end == range.start && &prev.context == context => {
                prev.end = range.end;
            }
            _ => out.push(ConsolidatedSpan {
                start: range.start,
                end: range.end,
                context: context.clone(),
            }),
        }
    }
    out
}
