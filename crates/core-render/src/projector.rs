//! Document tree → candidate style spans.
//!
//! The walk visits every node whose span intersects the inclusive character
//! window `[first, last]` (link reference groups are always visited) and
//! appends candidates to one accumulator in visit order: a parent's span is
//! pushed before its children's, and earlier siblings before later ones. That
//! order is the override order `consolidate` relies on.
//!
//! Invariants:
//! * Every candidate has `start < end`. Zero-length and backwards spans, and
//!   blank-line blocks, contribute nothing.
//! * Candidates may extend past the window; clipping happens in `consolidate`.
//! * Style changes never leak upward: each node derives a child context from
//!   the inherited one.

use std::ops::Range;

use core_syntax::{Block, CodeLine, Document, Inline, LinkKind, LinkReferenceDefinition};
use tracing::trace;

use crate::style::{StyleColor, StyleContext, StyleFlags};
use crate::tokenize::CodeTokenizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSpan {
    pub start: usize,
    pub end: usize,
    pub context: StyleContext,
}

/// Context for emphasis content, keyed by delimiter character and run length.
/// Unknown delimiters inherit unchanged.
pub fn emphasis_style(ctx: &StyleContext, delimiter: char, count: usize) -> StyleContext {
    match (delimiter, count) {
        ('*' | '_', 2) => ctx
            .with_flags(StyleFlags::BOLD)
            .with_color(StyleColor::Emphasis),
        ('*' | '_', 3) => ctx
            .with_flags(StyleFlags::BOLD | StyleFlags::ITALIC)
            .with_color(StyleColor::Emphasis),
        ('*' | '_', _) => ctx
            .with_flags(StyleFlags::ITALIC)
            .with_color(StyleColor::Emphasis),
        ('"', 2) => ctx
            .with_flags(StyleFlags::ITALIC)
            .with_color(StyleColor::Emphasis),
        ('~', 1) => ctx.with_color(StyleColor::Emphasis).with_script(-1),
        ('~', _) => ctx
            .with_flags(StyleFlags::UNDERLINE)
            .with_color(StyleColor::Emphasis),
        ('^', 1) => ctx.with_color(StyleColor::Emphasis).with_script(1),
        ('+', _) => ctx.with_color(StyleColor::Inserted),
        ('=', _) => ctx.with_color(StyleColor::Removed),
        _ => ctx.clone(),
    }
}

pub struct StyleProjector<'t> {
    tokenizer: &'t dyn CodeTokenizer,
}

impl<'t> StyleProjector<'t> {
    pub fn new(tokenizer: &'t dyn CodeTokenizer) -> Self {
        Self { tokenizer }
    }

    /// Candidate spans for nodes intersecting `[first, last]` (inclusive).
    pub fn project(&self, doc: &Document, first: usize, last: usize) -> Vec<CandidateSpan> {
        let mut walk = Walk {
            first,
            last,
            tokenizer: self.tokenizer,
            out: Vec::new(),
        };
        let root = StyleContext::new();
        for block in &doc.blocks {
            walk.visit_block(block, &root);
        }
        trace!(
            target: "render.projector",
            first,
            last,
            candidates = walk.out.len(),
            "projected"
        );
        walk.out
    }
}

struct Walk<'a> {
    first: usize,
    last: usize,
    tokenizer: &'a dyn CodeTokenizer,
    out: Vec<CandidateSpan>,
}

impl Walk<'_> {
    fn intersects(&self, span: &Range<usize>) -> bool {
        span.start < span.end && span.start <= self.last && self.first < span.end
    }

    fn emit(&mut self, start: usize, end: usize, context: &StyleContext) {
        if start < end {
            self.out.push(CandidateSpan {
                start,
                end,
                context: context.clone(),
            });
        }
    }

    fn emit_span(&mut self, span: &Range<usize>, context: &StyleContext) {
        self.emit(span.start, span.end, context);
    }

    fn visit_block(&mut self, block: &Block, ctx: &StyleContext) {
        match block.span() {
            Some(span) if !self.intersects(span) => return,
            _ => {}
        }
        match block {
            Block::Heading { span, inlines, .. } => {
                let ctx = ctx
                    .with_color(StyleColor::Heading)
                    .with_flags(StyleFlags::BOLD);
                self.emit_span(span, &ctx);
                self.visit_inlines(inlines, &ctx);
            }
            Block::Paragraph { span, inlines } => {
                self.emit_span(span, ctx);
                self.visit_inlines(inlines, ctx);
            }
            Block::IndentedCode { span } => {
                self.emit_span(span, &ctx.with_color(StyleColor::Code));
            }
            Block::FencedCode { span, info, lines } => {
                self.fenced_code(span, info.as_deref(), lines, ctx);
            }
            Block::Math { span } => {
                self.emit_span(span, &ctx.with_color(StyleColor::Math));
            }
            Block::Html { span } => {
                self.emit_span(span, &ctx.with_color(StyleColor::Html));
            }
            Block::ThematicBreak { span } => {
                self.emit_span(span, &ctx.with_color(StyleColor::ThematicBreak));
            }
            Block::List { items, .. } => {
                for item in items {
                    self.visit_block(item, ctx);
                }
            }
            Block::ListItem {
                span,
                marker_width,
                children,
            } => {
                let marker = ctx
                    .with_color(StyleColor::Bullet)
                    .with_flags(StyleFlags::BOLD);
                self.emit(span.start, (span.start + marker_width).min(span.end), &marker);
                for child in children {
                    self.visit_block(child, ctx);
                }
            }
            Block::Quote { span, children } => {
                let ctx = ctx.with_color(StyleColor::Quote);
                self.emit_span(span, &ctx);
                for child in children {
                    self.visit_block(child, &ctx);
                }
            }
            Block::Table { rows, .. } => {
                for cell in rows.iter().flat_map(|r| r.cells.iter()) {
                    for child in &cell.blocks {
                        self.visit_block(child, ctx);
                    }
                }
            }
            Block::LinkReferenceGroup { definitions } => {
                for def in definitions {
                    self.definition(def, ctx);
                }
            }
            Block::Plain { span } => self.emit_span(span, ctx),
        }
    }

    fn definition(&mut self, def: &LinkReferenceDefinition, ctx: &StyleContext) {
        if !self.intersects(&def.span) {
            return;
        }
        self.emit_span(&def.span, ctx);
        let link = ctx.with_color(StyleColor::Link);
        if let Some(label) = &def.label {
            self.emit_span(label, &link);
        }
        if let Some(title) = &def.title {
            self.emit_span(title, &link.with_flags(StyleFlags::BOLD));
        }
        if let Some(dest) = &def.destination {
            self.emit_span(dest, &link.with_flags(StyleFlags::UNDERLINE));
        }
    }

    /// Fence lines in the code color, each tokenized run in its own color.
    /// Without an info string or tokens the whole block is plain code.
    fn fenced_code(
        &mut self,
        span: &Range<usize>,
        info: Option<&str>,
        lines: &[CodeLine],
        ctx: &StyleContext,
    ) {
        let code_ctx = ctx.with_color(StyleColor::Code);
        let language = info.map(str::trim).filter(|i| !i.is_empty());
        let (Some(language), Some(first_line), Some(last_line)) =
            (language, lines.first(), lines.last())
        else {
            self.emit_span(span, &code_ctx);
            return;
        };
        let code = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let tokens = match self.tokenizer.tokenize(&code, language) {
            Some(tokens) if !tokens.is_empty() && !code.is_empty() => tokens,
            _ => {
                self.emit_span(span, &code_ctx);
                return;
            }
        };

        let code_end = last_line.start + last_line.text.chars().count();
        self.emit(span.start, first_line.start, &code_ctx);
        self.emit(code_end, span.end, &code_ctx);

        for (line, runs) in lines.iter().zip(tokens) {
            let line_span = line.start..line.start + line.text.chars().count();
            if !self.intersects(&line_span) {
                continue;
            }
            let mut pos = line.start;
            for run in runs {
                let mut flags = StyleFlags::empty();
                flags.set(StyleFlags::BOLD, run.bold);
                flags.set(StyleFlags::ITALIC, run.italic);
                let run_ctx = ctx
                    .with_color(StyleColor::Custom(run.color))
                    .with_flags(flags);
                self.emit(pos, pos + run.len, &run_ctx);
                pos += run.len;
            }
        }
    }

    fn visit_inlines(&mut self, inlines: &[Inline], ctx: &StyleContext) {
        for inline in inlines {
            if self.intersects(inline.span()) || matches!(inline, Inline::Math { .. }) {
                self.visit_inline(inline, ctx);
            }
        }
    }

    fn visit_inline(&mut self, inline: &Inline, ctx: &StyleContext) {
        match inline {
            Inline::Autolink { span } => self.emit_span(
                span,
                &ctx.with_color(StyleColor::Link)
                    .with_flags(StyleFlags::UNDERLINE),
            ),
            Inline::Code { span } => self.emit_span(span, &ctx.with_color(StyleColor::Code)),
            Inline::HtmlEntity { span } => {
                self.emit_span(span, &ctx.with_color(StyleColor::HtmlEntity))
            }
            Inline::Html { span } => self.emit_span(span, &ctx.with_color(StyleColor::Html)),
            Inline::LineBreak { span } => self.emit_span(
                span,
                &ctx.with_color(StyleColor::LineBreak)
                    .with_flags(StyleFlags::BOLD),
            ),
            Inline::Text { span } | Inline::Plain { span } => self.emit_span(span, ctx),
            Inline::Math {
                span,
                content_len,
                delimiter_count,
            } => {
                let end = span.start + content_len + delimiter_count * 2;
                if self.intersects(&(span.start..end)) {
                    let math = ctx
                        .with_color(StyleColor::Math)
                        .with_flags(StyleFlags::ITALIC);
                    self.emit(span.start, end, &math);
                }
            }
            Inline::Smart { span } => self.emit_span(
                span,
                &ctx.with_color(StyleColor::Quote)
                    .with_flags(StyleFlags::ITALIC),
            ),
            Inline::TaskMarker { span, checked } => {
                let color = if *checked {
                    StyleColor::TaskCompleted
                } else {
                    StyleColor::TaskIncomplete
                };
                self.emit_span(span, &ctx.with_color(color).with_flags(StyleFlags::BOLD));
            }
            Inline::Emphasis {
                span,
                delimiter,
                count,
                children,
            } => {
                let ctx = emphasis_style(ctx, *delimiter, *count);
                self.emit_span(span, &ctx);
                self.visit_inlines(children, &ctx);
            }
            Inline::Link {
                span,
                kind,
                label,
                destination,
            } => {
                self.emit_span(span, ctx);
                let color = match kind {
                    LinkKind::Link => StyleColor::Link,
                    LinkKind::Image => StyleColor::Image,
                };
                let colored = ctx.with_color(color);
                if let Some(label) = label {
                    self.emit_span(label, &colored);
                }
                if let Some(dest) = destination {
                    self.emit_span(dest, &colored.with_flags(StyleFlags::UNDERLINE));
                }
            }
        }
    }
}
