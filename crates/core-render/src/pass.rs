//! Per-viewport highlight pass.
//!
//! One projection covers the whole viewport window; each visible line
//! segment is then consolidated on its own. Lines shorter than the first
//! visible column produce a segment with no spans.

use std::ops::Range;

use core_syntax::Document;
use core_text::Buffer;
use tracing::debug;

use crate::consolidate::{ConsolidatedSpan, consolidate};
use crate::projector::StyleProjector;
use crate::style::{Brush, Palette, StyleContext};

/// Visible lines and columns (counts, not inclusive ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub first_line: usize,
    pub line_count: usize,
    pub first_column: usize,
    pub column_count: usize,
}

impl Viewport {
    fn last_line(&self) -> usize {
        self.first_line + self.line_count.saturating_sub(1)
    }

    fn last_column(&self) -> usize {
        self.first_column + self.column_count.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSegment {
    pub line: usize,
    /// Visible characters of the line; empty when nothing is visible.
    pub chars: Range<usize>,
    pub spans: Vec<ConsolidatedSpan>,
}

/// A resolved run ready for a surface to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintRun {
    pub text: String,
    pub brush: Brush,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub script: i8,
}

impl LineSegment {
    pub fn paint_runs(&self, buffer: &Buffer, palette: &Palette) -> Vec<PaintRun> {
        self.spans
            .iter()
            .map(|span| PaintRun {
                text: buffer.slice(span.start..span.end),
                brush: span.context.brush(palette),
                bold: span.context.is_bold(),
                italic: span.context.is_italic(),
                underline: span.context.is_underline(),
                script: span.context.script(),
            })
            .collect()
    }
}

pub fn highlight_viewport(
    buffer: &Buffer,
    doc: &Document,
    projector: &StyleProjector<'_>,
    viewport: &Viewport,
    enabled: bool,
) -> Vec<LineSegment> {
    if viewport.line_count == 0 || viewport.column_count == 0 {
        return Vec::new();
    }
    let Some(window) = buffer.char_window(
        viewport.first_line,
        viewport.last_line(),
        viewport.first_column,
        viewport.last_column(),
    ) else {
        return Vec::new();
    };

    let candidates = if enabled {
        projector.project(doc, window.first, window.last)
    } else {
        Vec::new()
    };

    let last_line = viewport.last_line().min(buffer.line_count().saturating_sub(1));
    let mut segments = Vec::with_capacity(last_line + 1 - viewport.first_line);
    for line in viewport.first_line..=last_line {
        let chars = buffer
            .visible_segment(line, viewport.first_column, viewport.last_column())
            .unwrap_or(0..0);
        let spans = if chars.is_empty() {
            Vec::new()
        } else if candidates.is_empty() {
            vec![ConsolidatedSpan {
                start: chars.start,
                end: chars.end,
                context: StyleContext::new(),
            }]
        } else {
            consolidate(&candidates, chars.start, chars.end)
        };
        segments.push(LineSegment { line, chars, spans });
    }
    debug!(
        target: "render.pass",
        first_line = viewport.first_line,
        lines = segments.len(),
        candidates = candidates.len(),
        enabled,
        "viewport_highlighted"
    );
    segments
}
