//! Interval merging over integer ranges.
//!
//! Invariants of every result:
//! * No two output ranges overlap or touch (`a.end == b.start` merges).
//! * The union of covered points equals the union of the input.
//! * Output order is the order in which each merged group was first touched,
//!   not sorted order. Callers that need sorted output sort themselves.
//!
//! Each insertion scans the accumulator, so merging `n` ranges is O(n²). Inputs
//! are viewport-sized line sets; large inputs should sort and sweep instead.

use std::ops::Range;

/// Line span using an inclusive length convention: `length_in_lines == 0`
/// covers the single line `start_line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start_line: usize,
    pub length_in_lines: usize,
}

impl LineRange {
    pub fn single(line: usize) -> Self {
        Self {
            start_line: line,
            length_in_lines: 0,
        }
    }

    /// Last covered line (inclusive).
    pub fn end_line(&self) -> usize {
        self.start_line + self.length_in_lines
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line()
    }

    /// Half-open line range `[start_line, end_line + 1)`.
    pub fn as_range(&self) -> Range<usize> {
        self.start_line..self.end_line() + 1
    }

    /// `None` for an empty range.
    pub fn from_range(range: Range<usize>) -> Option<Self> {
        (range.end > range.start).then(|| Self {
            start_line: range.start,
            length_in_lines: range.end - range.start - 1,
        })
    }
}

fn touches(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start <= b.end && b.start <= a.end
}

fn union(a: &Range<usize>, b: &Range<usize>) -> Range<usize> {
    a.start.min(b.start)..a.end.max(b.end)
}

/// Fold `range` into `acc`, returning the index of the entry that absorbed it.
/// Every entry the grown range touches is absorbed into the first one.
fn fold_into<T>(acc: &mut Vec<(Range<usize>, T)>, range: Range<usize>, payload: T) -> usize
where
    T: Extend<T::Item> + IntoIterator,
{
    let Some(first) = acc.iter().position(|(r, _)| touches(r, &range)) else {
        acc.push((range, payload));
        return acc.len() - 1;
    };
    acc[first].0 = union(&acc[first].0, &range);
    acc[first].1.extend(payload);
    loop {
        let grown = acc[first].0.clone();
        let next = acc
            .iter()
            .enumerate()
            .skip(first + 1)
            .find(|(_, (r, _))| touches(r, &grown))
            .map(|(i, _)| i);
        let Some(i) = next else { break };
        let (r, p) = acc.remove(i);
        acc[first].0 = union(&grown, &r);
        acc[first].1.extend(p);
    }
    first
}

/// Merge half-open ranges into a minimal disjoint, non-adjacent cover.
/// Empty ranges cover no points and are dropped.
pub fn merge_ranges<I>(ranges: I) -> Vec<Range<usize>>
where
    I: IntoIterator<Item = Range<usize>>,
{
    let mut acc: Vec<(Range<usize>, Vec<()>)> = Vec::new();
    for range in ranges {
        if range.end > range.start {
            fold_into(&mut acc, range, Vec::new());
        }
    }
    acc.into_iter().map(|(r, _)| r).collect()
}

/// Merge individual line numbers into line ranges.
pub fn merge_points<I>(lines: I) -> Vec<LineRange>
where
    I: IntoIterator<Item = usize>,
{
    merge_ranges(lines.into_iter().map(|l| l..l + 1))
        .into_iter()
        .filter_map(LineRange::from_range)
        .collect()
}

/// Merge line ranges (inclusive convention) into a minimal cover.
pub fn merge_line_ranges<I>(ranges: I) -> Vec<LineRange>
where
    I: IntoIterator<Item = LineRange>,
{
    merge_ranges(ranges.into_iter().map(|r| r.as_range()))
        .into_iter()
        .filter_map(LineRange::from_range)
        .collect()
}

/// Merge ranges while keeping every payload that contributed to each merged
/// range. An absorbed entry's payloads follow those of the entry absorbing it.
/// Empty ranges still carry their payload and merge with anything they touch.
pub fn merge_keyed<T, I>(items: I) -> Vec<(Range<usize>, Vec<T>)>
where
    I: IntoIterator<Item = (Range<usize>, T)>,
{
    let mut acc: Vec<(Range<usize>, Vec<T>)> = Vec::new();
    for (range, payload) in items {
        let start = range.start;
        let range = start..range.end.max(start);
        fold_into(&mut acc, range, vec![payload]);
    }
    acc
}
