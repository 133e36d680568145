//! Document tree node kinds.
//!
//! Nodes record only what highlighting needs: their own span, sub-spans that
//! receive distinct styling (link labels, destinations, list markers) and the
//! handful of attributes that select a style rule (heading level, emphasis
//! delimiter, task state, fenced code info string).

use std::ops::Range;

/// Half-open character range `[start, end)`.
pub type Span = Range<usize>;

/// Blank lines have no node of their own; they are the gaps between block spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

/// One source line of a fenced code block: its absolute start offset and text
/// (without line ending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub start: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCell {
    pub span: Span,
    pub blocks: Vec<Block>,
}

/// `[label]: destination "title"`; sub-spans are `None` when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReferenceDefinition {
    pub span: Span,
    pub label: Option<Span>,
    pub title: Option<Span>,
    pub destination: Option<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Link,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        span: Span,
        level: u8,
        inlines: Vec<Inline>,
    },
    Paragraph {
        span: Span,
        inlines: Vec<Inline>,
    },
    IndentedCode {
        span: Span,
    },
    FencedCode {
        span: Span,
        /// Info string (language tag); `None` when the fence carries none.
        info: Option<String>,
        lines: Vec<CodeLine>,
    },
    Math {
        span: Span,
    },
    Html {
        span: Span,
    },
    ThematicBreak {
        span: Span,
    },
    List {
        span: Span,
        items: Vec<Block>,
    },
    ListItem {
        span: Span,
        /// Characters from the item start through the end of its marker (`-`, `10.`).
        marker_width: usize,
        children: Vec<Block>,
    },
    Quote {
        span: Span,
        children: Vec<Block>,
    },
    Table {
        span: Span,
        rows: Vec<TableRow>,
    },
    /// Link reference definitions affect spans elsewhere in the document, so
    /// the group carries no span of its own and is always visited.
    LinkReferenceGroup {
        definitions: Vec<LinkReferenceDefinition>,
    },
    /// Block kinds without a dedicated style rule.
    Plain {
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text {
        span: Span,
    },
    Code {
        span: Span,
    },
    HtmlEntity {
        span: Span,
    },
    Html {
        span: Span,
    },
    LineBreak {
        span: Span,
    },
    Autolink {
        span: Span,
    },
    /// `$x$` / `$$x$$`. The rendered extent is `content_len + 2 * delimiter_count`
    /// characters from `span.start`, which may exceed the parsed span.
    Math {
        span: Span,
        content_len: usize,
        delimiter_count: usize,
    },
    /// Typographic substitution (curly quotes, dashes, ellipsis).
    Smart {
        span: Span,
    },
    TaskMarker {
        span: Span,
        checked: bool,
    },
    Emphasis {
        span: Span,
        delimiter: char,
        count: usize,
        children: Vec<Inline>,
    },
    Link {
        span: Span,
        kind: LinkKind,
        label: Option<Span>,
        destination: Option<Span>,
    },
    /// Inline kinds without a dedicated style rule.
    Plain {
        span: Span,
    },
}

impl Block {
    /// Node span; `None` for the position-independent reference group.
    pub fn span(&self) -> Option<&Span> {
        match self {
            Block::Heading { span, .. }
            | Block::Paragraph { span, .. }
            | Block::IndentedCode { span }
            | Block::FencedCode { span, .. }
            | Block::Math { span }
            | Block::Html { span }
            | Block::ThematicBreak { span }
            | Block::List { span, .. }
            | Block::ListItem { span, .. }
            | Block::Quote { span, .. }
            | Block::Table { span, .. }
            | Block::Plain { span } => Some(span),
            Block::LinkReferenceGroup { .. } => None,
        }
    }
}

impl Inline {
    pub fn span(&self) -> &Span {
        match self {
            Inline::Text { span }
            | Inline::Code { span }
            | Inline::HtmlEntity { span }
            | Inline::Html { span }
            | Inline::LineBreak { span }
            | Inline::Autolink { span }
            | Inline::Math { span, .. }
            | Inline::Smart { span }
            | Inline::TaskMarker { span, .. }
            | Inline::Emphasis { span, .. }
            | Inline::Link { span, .. }
            | Inline::Plain { span } => span,
        }
    }
}

impl Document {
    /// Destinations of every image in the document, in source order, sliced
    /// from `text` (the source the document was parsed from).
    pub fn image_destinations(&self, text: &str) -> Vec<String> {
        let mut spans = Vec::new();
        for block in &self.blocks {
            collect_block_images(block, &mut spans);
        }
        spans
            .into_iter()
            .map(|s| text.chars().skip(s.start).take(s.end - s.start).collect())
            .collect()
    }
}

fn collect_block_images(block: &Block, out: &mut Vec<Span>) {
    match block {
        Block::Heading { inlines, .. } | Block::Paragraph { inlines, .. } => {
            for inline in inlines {
                collect_inline_images(inline, out);
            }
        }
        Block::List { items: children, .. }
        | Block::ListItem { children, .. }
        | Block::Quote { children, .. } => {
            for child in children {
                collect_block_images(child, out);
            }
        }
        Block::Table { rows, .. } => {
            for cell in rows.iter().flat_map(|r| r.cells.iter()) {
                for child in &cell.blocks {
                    collect_block_images(child, out);
                }
            }
        }
        _ => {}
    }
}

fn collect_inline_images(inline: &Inline, out: &mut Vec<Span>) {
    match inline {
        Inline::Link {
            kind: LinkKind::Image,
            destination: Some(dest),
            ..
        } if dest.end > dest.start => out.push(dest.clone()),
        Inline::Emphasis { children, .. } => {
            for child in children {
                collect_inline_images(child, out);
            }
        }
        _ => {}
    }
}
