//! Rope-based text buffer abstraction.
//!
//! The highlighting pipeline addresses text by *character* offsets (not bytes):
//! parsed node spans, candidate style spans and consolidated paint spans all
//! share this coordinate space. `Buffer` owns the conversions between lines,
//! visible columns and absolute character offsets.
//!
//! Invariants:
//! - Line ranges returned by `line_char_range` never include the line ending
//!   (`\n` or `\r\n`).
//! - Columns are character columns; no grapheme or display-width folding is
//!   applied at this layer.

use std::ops::Range;

use ropey::Rope;

/// A text buffer backed by a `ropey::Rope`.
#[derive(Clone)]
pub struct Buffer {
    rope: Rope,
    pub name: String,
}

/// Inclusive character window covered by a viewport: `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharWindow {
    pub first: usize,
    pub last: usize,
}

impl Buffer {
    /// Construct a buffer from an in-memory string slice.
    pub fn new(name: impl Into<String>, content: &str) -> Self {
        Self {
            rope: Rope::from_str(content),
            name: name.into(),
        }
    }

    /// Total number of lines in the buffer (a trailing newline opens an empty last line).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Total number of characters.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Return the requested line as an owned `String` (including trailing newline if present).
    pub fn line(&self, idx: usize) -> Option<String> {
        if idx < self.rope.len_lines() {
            Some(self.rope.line(idx).to_string())
        } else {
            None
        }
    }

    /// Absolute character range of a line's content, excluding its line ending.
    pub fn line_char_range(&self, idx: usize) -> Option<Range<usize>> {
        if idx >= self.rope.len_lines() {
            return None;
        }
        let start = self.rope.line_to_char(idx);
        let line = self.rope.line(idx);
        let mut len = line.len_chars();
        if len > 0 && line.char(len - 1) == '\n' {
            len -= 1;
            if len > 0 && line.char(len - 1) == '\r' {
                len -= 1;
            }
        }
        Some(start..start + len)
    }

    /// Line index containing the character offset (clamped to the last line).
    pub fn char_to_line(&self, char_idx: usize) -> usize {
        self.rope.char_to_line(char_idx.min(self.rope.len_chars()))
    }

    /// Character offset of a line start (clamped to the end of the buffer).
    pub fn line_to_char(&self, line: usize) -> usize {
        self.rope.line_to_char(line.min(self.rope.len_lines()))
    }

    /// Character offset of `(line, column)`, clamping the column to the line content.
    pub fn position(&self, line: usize, column: usize) -> usize {
        match self.line_char_range(line) {
            Some(r) => r.start + column.min(r.end - r.start),
            None => self.rope.len_chars(),
        }
    }

    /// Inclusive character window spanned by the visible lines/columns, or `None`
    /// when the buffer has no line at `first_line`.
    pub fn char_window(
        &self,
        first_line: usize,
        last_line: usize,
        first_column: usize,
        last_column: usize,
    ) -> Option<CharWindow> {
        if first_line >= self.line_count() {
            return None;
        }
        let last_line = last_line.min(self.line_count() - 1).max(first_line);
        Some(CharWindow {
            first: self.position(first_line, first_column),
            last: self.position(last_line, last_column),
        })
    }

    /// Visible part of a line for the column window `[first_column, last_column]`
    /// as a half-open character range. `None` when the line is shorter than
    /// `first_column` (nothing to paint) or does not exist.
    pub fn visible_segment(
        &self,
        line: usize,
        first_column: usize,
        last_column: usize,
    ) -> Option<Range<usize>> {
        let r = self.line_char_range(line)?;
        let len = r.end - r.start;
        if len < first_column {
            return None;
        }
        let start = r.start + first_column;
        let end = r.end.min(r.start + last_column.saturating_add(1));
        Some(start..end.max(start))
    }

    /// Text in the half-open character range (clamped).
    pub fn slice(&self, range: Range<usize>) -> String {
        let total = self.rope.len_chars();
        let s = range.start.min(total);
        let e = range.end.min(total);
        if s >= e {
            return String::new();
        }
        self.rope.slice(s..e).to_string()
    }

    /// Whole buffer contents.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }
}
