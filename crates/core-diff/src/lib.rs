//! Line-range algebra and change tracking.
//!
//! `intervals` merges integer ranges into a canonical minimal cover;
//! `changes` turns line diffs of the current text against the saved and the
//! original text into two mutually exclusive decoration sets.

pub mod changes;
pub mod intervals;

pub use changes::{
    ChangeBlock, ChangeDecorations, ChangeKind, ChangeTracker, DiffError, LineDiff,
    SimilarLineDiff, compute,
};
pub use intervals::{LineRange, merge_keyed, merge_line_ranges, merge_points, merge_ranges};
