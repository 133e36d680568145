//! Parsed markdown document model consumed by the highlighting pipeline.
//!
//! The tree is a closed set of tagged variants (`Block`, `Inline`) so the style
//! projector can match exhaustively; adding a node kind is a compile error at
//! every consumer until it is handled.
//!
//! Coordinates: every span is a half-open `[start, end)` range of *character*
//! offsets into the source text. `parse` converts the byte offsets reported by
//! the markdown parser.

pub mod parse;
pub mod tree;

pub use parse::parse;
pub use tree::{
    Block, CodeLine, Document, Inline, LinkKind, LinkReferenceDefinition, Span, TableCell,
    TableRow,
};
