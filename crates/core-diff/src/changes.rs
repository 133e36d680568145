//! Change decorations: lines edited since the last save and since open.
//!
//! Invariants:
//! * `since_save` and `since_original` never share a line.
//! * Both sets are merged through `merge_points`, so entries are disjoint and
//!   non-adjacent.
//! * A diff failure yields empty decorations; nothing is propagated.

use std::collections::BTreeSet;

use similar::{DiffOp, TextDiff};
use thiserror::Error;
use tracing::{debug, warn};

use crate::intervals::{LineRange, merge_points};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("diff input too large: {lines} lines (limit {limit})")]
    InputTooLarge { lines: usize, limit: usize },
}

/// Destination-side extent of one change block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeBlock {
    pub insert_start: usize,
    pub insert_count: usize,
}

/// Line diff collaborator: change blocks of `new` relative to `old`.
pub trait LineDiff {
    fn diff(&self, old: &str, new: &str) -> Result<Vec<ChangeBlock>, DiffError>;
}

/// `similar` line diff with an input size guard.
#[derive(Debug, Clone, Copy)]
pub struct SimilarLineDiff {
    pub max_lines: usize,
}

impl Default for SimilarLineDiff {
    fn default() -> Self {
        Self { max_lines: 200_000 }
    }
}

impl LineDiff for SimilarLineDiff {
    fn diff(&self, old: &str, new: &str) -> Result<Vec<ChangeBlock>, DiffError> {
        let lines = old.lines().count().max(new.lines().count());
        if lines > self.max_lines {
            return Err(DiffError::InputTooLarge {
                lines,
                limit: self.max_lines,
            });
        }
        let diff = TextDiff::from_lines(old, new);
        let blocks = diff
            .ops()
            .iter()
            .filter_map(|op| match *op {
                DiffOp::Equal { .. } => None,
                DiffOp::Delete { new_index, .. } => Some(ChangeBlock {
                    insert_start: new_index,
                    insert_count: 0,
                }),
                DiffOp::Insert {
                    new_index, new_len, ..
                }
                | DiffOp::Replace {
                    new_index, new_len, ..
                } => Some(ChangeBlock {
                    insert_start: new_index,
                    insert_count: new_len,
                }),
            })
            .collect();
        Ok(blocks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    SinceSave,
    SinceOriginal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDecorations {
    pub since_save: Vec<LineRange>,
    /// Changed relative to the opened text but not since the last save.
    pub since_original: Vec<LineRange>,
}

impl ChangeDecorations {
    pub fn is_empty(&self) -> bool {
        self.since_save.is_empty() && self.since_original.is_empty()
    }

    pub fn kind_of(&self, line: usize) -> Option<ChangeKind> {
        if self.since_save.iter().any(|r| r.contains(line)) {
            Some(ChangeKind::SinceSave)
        } else if self.since_original.iter().any(|r| r.contains(line)) {
            Some(ChangeKind::SinceOriginal)
        } else {
            None
        }
    }
}

/// Lines of `new` touched by the diff from `old`. A pure deletion still marks
/// the line it collapsed onto; lines past the end clamp to the last line.
fn changed_lines(differ: &dyn LineDiff, old: &str, new: &str) -> Result<BTreeSet<usize>, DiffError> {
    let last_line = line_count(new).saturating_sub(1);
    let mut lines = BTreeSet::new();
    for block in differ.diff(old, new)? {
        let count = block.insert_count.max(1);
        for line in block.insert_start..block.insert_start + count {
            lines.insert(line.min(last_line));
        }
    }
    Ok(lines)
}

fn line_count(text: &str) -> usize {
    text.lines().count().max(1)
}

/// Decorations for `current` against the saved and original texts.
pub fn compute(
    differ: &dyn LineDiff,
    current: &str,
    saved: &str,
    original: &str,
) -> ChangeDecorations {
    let since_save = changed_lines(differ, saved, current);
    let since_original = changed_lines(differ, original, current);
    match (since_save, since_original) {
        (Ok(save), Ok(orig)) => ChangeDecorations {
            since_original: merge_points(orig.difference(&save).copied()),
            since_save: merge_points(save),
        },
        (Err(err), _) | (_, Err(err)) => {
            warn!(target: "diff.changes", error = %err, "line_diff_failed");
            ChangeDecorations::default()
        }
    }
}

/// Tracks the original and last-saved texts of one document and keeps the
/// decorations for the current text up to date.
pub struct ChangeTracker {
    differ: Box<dyn LineDiff + Send + Sync>,
    original: String,
    saved: String,
    enabled: bool,
    decorations: ChangeDecorations,
}

impl ChangeTracker {
    pub fn new(original: impl Into<String>) -> Self {
        Self::with_differ(Box::new(SimilarLineDiff::default()), original)
    }

    pub fn with_differ(differ: Box<dyn LineDiff + Send + Sync>, original: impl Into<String>) -> Self {
        let original = original.into();
        Self {
            differ,
            saved: original.clone(),
            original,
            enabled: true,
            decorations: ChangeDecorations::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling drops current decorations; updates become no-ops until
    /// re-enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.decorations = ChangeDecorations::default();
        }
    }

    pub fn update(&mut self, current: &str) {
        if !self.enabled {
            return;
        }
        self.decorations = compute(self.differ.as_ref(), current, &self.saved, &self.original);
        debug!(
            target: "diff.changes",
            since_save = self.decorations.since_save.len(),
            since_original = self.decorations.since_original.len(),
            "decorations_updated"
        );
    }

    /// `current` becomes the saved text; every remaining change is relative
    /// to the original only.
    pub fn mark_saved(&mut self, current: &str) {
        self.saved = current.to_string();
        if !self.enabled {
            return;
        }
        self.decorations = match changed_lines(self.differ.as_ref(), &self.original, current) {
            Ok(lines) => ChangeDecorations {
                since_save: Vec::new(),
                since_original: merge_points(lines),
            },
            Err(err) => {
                warn!(target: "diff.changes", error = %err, "line_diff_failed");
                ChangeDecorations::default()
            }
        };
    }

    pub fn decorations(&self) -> &ChangeDecorations {
        &self.decorations
    }
}
