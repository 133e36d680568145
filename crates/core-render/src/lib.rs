//! Syntax-highlighting overlay: document tree + viewport → painted runs.
//!
//! Pipeline per repaint:
//! 1. `StyleProjector::project` walks the document and emits candidate spans
//!    for nodes intersecting the viewport's character window, each carrying an
//!    inherited `StyleContext`.
//! 2. `consolidate` resolves the candidates for one visible line segment into
//!    a gap-free, non-overlapping partition (later candidates win).
//! 3. `PaintRun`s resolve each span's context against a `Palette` into a
//!    brush plus attributes; `writer::Writer` turns them into terminal output.
//!
//! Invariants:
//! - All offsets are character offsets into the buffer text the document was
//!   parsed from.
//! - Projection and consolidation are pure functions of their inputs and
//!   never fail; uncovered text is painted with the fallback style.

pub mod consolidate;
pub mod pass;
pub mod projector;
pub mod style;
pub mod tokenize;
pub mod writer;

pub use consolidate::{ConsolidatedSpan, consolidate, fallback_context};
pub use pass::{LineSegment, PaintRun, Viewport, highlight_viewport};
pub use projector::{CandidateSpan, StyleProjector, emphasis_style};
pub use style::{Brush, GradientStop, Palette, Rgb, StyleColor, StyleContext, StyleFlags};
pub use tokenize::{CodeToken, CodeTokenizer, PlainTokenizer, SyntectTokenizer};
