//! Markdown → `Document` adapter over `pulldown-cmark`.
//!
//! The parser reports byte ranges; the tree stores character offsets, so every
//! range passes through `OffsetMap`. Block spans are trimmed of trailing line
//! endings so a heading on `"# Hi\n"` spans exactly `[0, 4)`.
//!
//! Conversion rules that are not one-to-one with parser events:
//! * tight list items (inline content directly under the item) and table cells
//!   get a synthetic paragraph around their inlines;
//! * emphasis delimiter characters are read back from the source: `Emphasis`
//!   has count 1, `Strong` count 2, strikethrough the length of its `~` run,
//!   superscript `^` and subscript `~` count 1;
//! * `++inserted++` and `==marked==` runs inside literal text become emphasis
//!   with delimiter `+` / `=` (the parser has no syntax for them);
//! * a paragraph holding nothing but `$$ display $$` math is a `Block::Math`;
//! * text whose source differs from its rendered form is reclassified as an
//!   entity (`&amp;`) or a typographic substitution (curly quotes, dashes);
//! * link label / destination sub-spans are recovered by scanning the source;
//! * reference definitions are gathered into one trailing
//!   `Block::LinkReferenceGroup`.
//!
//! Parsing never fails: tags without a dedicated node kind become
//! `Block::Plain` / `Inline::Plain`.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, LinkType, Options, Parser, Tag};
use tracing::trace;

use crate::tree::{
    Block, CodeLine, Document, Inline, LinkKind, LinkReferenceDefinition, Span, TableCell,
    TableRow,
};

/// Parse markdown source into a document tree.
pub fn parse(text: &str) -> Document {
    let map = OffsetMap::new(text);
    let mut events = Parser::new_ext(text, options()).into_offset_iter();
    let definitions: Vec<LinkReferenceDefinition> = events
        .reference_definitions()
        .iter()
        .map(|(_, def)| definition(text, &map, def.span.clone()))
        .collect();

    let mut builder = TreeBuilder::new(text, &map);
    for (event, range) in &mut events {
        builder.event(event, range);
    }
    let mut document = builder.finish();
    if !definitions.is_empty() {
        document
            .blocks
            .push(Block::LinkReferenceGroup { definitions });
    }
    trace!(
        target: "syntax.parse",
        blocks = document.blocks.len(),
        chars = map.len_chars(),
        "document_parsed"
    );
    document
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_MATH
        | Options::ENABLE_SUPERSCRIPT
        | Options::ENABLE_SUBSCRIPT
}

/// Byte offset → character offset lookup for one source text.
struct OffsetMap {
    /// `None` for pure ASCII sources (identity mapping).
    chars: Option<Vec<usize>>,
    len_bytes: usize,
}

impl OffsetMap {
    fn new(text: &str) -> Self {
        if text.is_ascii() {
            return Self {
                chars: None,
                len_bytes: text.len(),
            };
        }
        let mut chars = vec![0; text.len() + 1];
        let mut count = 0;
        for (byte, ch) in text.char_indices() {
            for slot in &mut chars[byte..byte + ch.len_utf8()] {
                *slot = count;
            }
            count += 1;
        }
        chars[text.len()] = count;
        Self {
            chars: Some(chars),
            len_bytes: text.len(),
        }
    }

    fn to_char(&self, byte: usize) -> usize {
        let byte = byte.min(self.len_bytes);
        match &self.chars {
            None => byte,
            Some(chars) => chars[byte],
        }
    }

    fn span(&self, range: Range<usize>) -> Span {
        self.to_char(range.start)..self.to_char(range.end)
    }

    fn len_chars(&self) -> usize {
        self.to_char(self.len_bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FrameKind {
    Document,
    Paragraph,
    Heading(u8),
    Quote,
    List,
    Item,
    CodeBlock { info: Option<String>, fenced: bool },
    HtmlBlock,
    Table,
    TableRow,
    TableCell,
    Emphasis { delimiter: char, count: usize },
    Link { kind: LinkKind, autolink: bool },
    Other { inline: bool },
}

impl FrameKind {
    fn holds_inlines(&self) -> bool {
        matches!(
            self,
            FrameKind::Paragraph
                | FrameKind::Heading(_)
                | FrameKind::Emphasis { .. }
                | FrameKind::Link { .. }
                | FrameKind::TableCell
                | FrameKind::Other { inline: true }
        )
    }
}

struct Frame {
    kind: FrameKind,
    range: Range<usize>,
    blocks: Vec<Block>,
    inlines: Vec<Inline>,
    rows: Vec<TableRow>,
    cells: Vec<TableCell>,
    code: Vec<CodeLine>,
    /// Last code line has not seen its line ending yet.
    code_open: bool,
}

impl Frame {
    fn new(kind: FrameKind, range: Range<usize>) -> Self {
        Self {
            kind,
            range,
            blocks: Vec::new(),
            inlines: Vec::new(),
            rows: Vec::new(),
            cells: Vec::new(),
            code: Vec::new(),
            code_open: false,
        }
    }

    /// Wrap loose inline content (tight list items) into a paragraph block.
    fn flush_inlines(&mut self) {
        if self.inlines.is_empty() {
            return;
        }
        let inlines = std::mem::take(&mut self.inlines);
        let start = inlines.iter().map(|i| i.span().start).min().unwrap_or(0);
        let end = inlines.iter().map(|i| i.span().end).max().unwrap_or(start);
        self.blocks.push(Block::Paragraph {
            span: start..end,
            inlines,
        });
    }
}

struct TreeBuilder<'a> {
    text: &'a str,
    map: &'a OffsetMap,
    stack: Vec<Frame>,
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str, map: &'a OffsetMap) -> Self {
        Self {
            text,
            map,
            stack: vec![Frame::new(FrameKind::Document, 0..text.len())],
        }
    }

    fn top(&mut self) -> &mut Frame {
        // The document frame is never popped before `finish`.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text, range),
            Event::Code(_) => self.push_inline(Inline::Code {
                span: self.map.span(range),
            }),
            Event::InlineMath(content) => self.push_math(&content, 1, range),
            Event::DisplayMath(content) => self.push_math(&content, 2, range),
            Event::Html(_) | Event::InlineHtml(_) => {
                if self.top().kind != FrameKind::HtmlBlock {
                    self.push_inline(Inline::Html {
                        span: self.map.span(range),
                    });
                }
            }
            Event::FootnoteReference(_) => self.push_inline(Inline::Plain {
                span: self.map.span(range),
            }),
            Event::SoftBreak | Event::HardBreak => self.push_inline(Inline::LineBreak {
                span: self.map.span(range),
            }),
            Event::Rule => {
                let span = self.block_span(range);
                self.push_block(Block::ThematicBreak { span });
            }
            Event::TaskListMarker(checked) => self.push_inline(Inline::TaskMarker {
                span: self.map.span(range),
                checked,
            }),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        let kind = match tag {
            Tag::Paragraph => FrameKind::Paragraph,
            Tag::Heading { level, .. } => FrameKind::Heading(level as u8),
            Tag::BlockQuote(_) => FrameKind::Quote,
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                let info = info.trim();
                FrameKind::CodeBlock {
                    info: (!info.is_empty()).then(|| info.to_string()),
                    fenced: true,
                }
            }
            Tag::CodeBlock(CodeBlockKind::Indented) => FrameKind::CodeBlock {
                info: None,
                fenced: false,
            },
            Tag::HtmlBlock => FrameKind::HtmlBlock,
            Tag::List(_) => FrameKind::List,
            Tag::Item => FrameKind::Item,
            Tag::Table(_) => FrameKind::Table,
            Tag::TableHead | Tag::TableRow => FrameKind::TableRow,
            Tag::TableCell => FrameKind::TableCell,
            Tag::Emphasis => FrameKind::Emphasis {
                delimiter: self.delimiter_at(range.start, '*'),
                count: 1,
            },
            Tag::Strong => FrameKind::Emphasis {
                delimiter: self.delimiter_at(range.start, '*'),
                count: 2,
            },
            Tag::Strikethrough => FrameKind::Emphasis {
                delimiter: '~',
                count: self.text[range.start..]
                    .chars()
                    .take_while(|c| *c == '~')
                    .count()
                    .max(1),
            },
            Tag::Superscript => FrameKind::Emphasis {
                delimiter: '^',
                count: 1,
            },
            Tag::Subscript => FrameKind::Emphasis {
                delimiter: '~',
                count: 1,
            },
            Tag::Link { link_type, .. } => FrameKind::Link {
                kind: LinkKind::Link,
                autolink: matches!(link_type, LinkType::Autolink | LinkType::Email),
            },
            Tag::Image { .. } => FrameKind::Link {
                kind: LinkKind::Image,
                autolink: false,
            },
            _ => FrameKind::Other {
                inline: self.top().kind.holds_inlines(),
            },
        };
        self.stack.push(Frame::new(kind, range));
    }

    fn end(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(mut frame) = self.stack.pop() else {
            return;
        };
        let range = frame.range.clone();
        match frame.kind.clone() {
            FrameKind::Document => {}
            FrameKind::Paragraph => {
                let span = self.block_span(range);
                let block = if is_display_math(&frame.inlines) {
                    Block::Math { span }
                } else {
                    Block::Paragraph {
                        span,
                        inlines: frame.inlines,
                    }
                };
                self.push_block(block);
            }
            FrameKind::Heading(level) => {
                let span = self.block_span(range);
                self.push_block(Block::Heading {
                    span,
                    level,
                    inlines: frame.inlines,
                });
            }
            FrameKind::Quote => {
                frame.flush_inlines();
                let span = self.block_span(range);
                self.push_block(Block::Quote {
                    span,
                    children: frame.blocks,
                });
            }
            FrameKind::List => {
                let span = self.block_span(range);
                self.push_block(Block::List {
                    span,
                    items: frame.blocks,
                });
            }
            FrameKind::Item => {
                frame.flush_inlines();
                let marker_width = self.marker_width(range.start);
                let span = self.block_span(range);
                self.push_block(Block::ListItem {
                    span,
                    marker_width,
                    children: frame.blocks,
                });
            }
            FrameKind::CodeBlock { info, fenced } => {
                let span = self.block_span(range);
                let block = if fenced {
                    Block::FencedCode {
                        span,
                        info,
                        lines: frame.code,
                    }
                } else {
                    Block::IndentedCode { span }
                };
                self.push_block(block);
            }
            FrameKind::HtmlBlock => {
                let span = self.block_span(range);
                self.push_block(Block::Html { span });
            }
            FrameKind::Table => {
                let span = self.block_span(range);
                self.push_block(Block::Table {
                    span,
                    rows: frame.rows,
                });
            }
            FrameKind::TableRow => {
                let row = TableRow { cells: frame.cells };
                self.top().rows.push(row);
            }
            FrameKind::TableCell => {
                let span = self.map.span(range);
                let mut blocks = Vec::new();
                if !frame.inlines.is_empty() {
                    blocks.push(Block::Paragraph {
                        span: span.clone(),
                        inlines: frame.inlines,
                    });
                }
                self.top().cells.push(TableCell { span, blocks });
            }
            FrameKind::Emphasis { delimiter, count } => {
                self.push_inline(Inline::Emphasis {
                    span: self.map.span(range),
                    delimiter,
                    count,
                    children: frame.inlines,
                });
            }
            FrameKind::Link { kind, autolink } => {
                let span = self.map.span(range.clone());
                if autolink {
                    self.push_inline(Inline::Autolink { span });
                } else {
                    let (label, destination) = self.link_parts(range, kind);
                    self.push_inline(Inline::Link {
                        span,
                        kind,
                        label,
                        destination,
                    });
                }
            }
            FrameKind::Other { inline: true } => {
                self.push_inline(Inline::Plain {
                    span: self.map.span(range),
                });
                self.top().inlines.extend(frame.inlines);
            }
            FrameKind::Other { inline: false } => {
                let span = self.block_span(range);
                self.push_block(Block::Plain { span });
            }
        }
    }

    fn text(&mut self, content: &str, range: Range<usize>) {
        let start = self.map.to_char(range.start);
        let kind = self.top().kind.clone();
        match kind {
            FrameKind::CodeBlock { .. } => self.push_code(content, start),
            FrameKind::HtmlBlock => {}
            _ => {
                if self.text[range.clone()] == *content {
                    self.push_marked_text(range);
                    return;
                }
                let span = self.map.span(range.clone());
                let source = &self.text[range];
                let inline = if source.starts_with('&') && source.ends_with(';') {
                    Inline::HtmlEntity { span }
                } else if !content.is_empty() && content.chars().all(is_typographic) {
                    Inline::Smart { span }
                } else {
                    Inline::Text { span }
                };
                self.push_inline(inline);
            }
        }
    }

    /// Literal text, split around `++inserted++` / `==marked==` runs.
    fn push_marked_text(&mut self, range: Range<usize>) {
        let runs = marked_runs(&self.text[range.clone()]);
        if runs.is_empty() {
            self.push_inline(Inline::Text {
                span: self.map.span(range),
            });
            return;
        }
        let mut start = range.start;
        for (run, delimiter) in runs {
            let run = range.start + run.start..range.start + run.end;
            if start < run.start {
                self.push_inline(Inline::Text {
                    span: self.map.span(start..run.start),
                });
            }
            self.push_inline(Inline::Emphasis {
                span: self.map.span(run.clone()),
                delimiter,
                count: 2,
                children: vec![Inline::Text {
                    span: self.map.span(run.start + 2..run.end - 2),
                }],
            });
            start = run.end;
        }
        if start < range.end {
            self.push_inline(Inline::Text {
                span: self.map.span(start..range.end),
            });
        }
    }

    fn push_code(&mut self, content: &str, mut start: usize) {
        let frame = self.top();
        for piece in content.split_inclusive('\n') {
            let line = piece.trim_end_matches(['\n', '\r']);
            let continues = frame.code_open && !frame.code.is_empty();
            if continues {
                if let Some(last) = frame.code.last_mut() {
                    last.text.push_str(line);
                }
            } else {
                frame.code.push(CodeLine {
                    start,
                    text: line.to_string(),
                });
            }
            frame.code_open = !piece.ends_with('\n');
            start += piece.chars().count();
        }
    }

    fn push_math(&mut self, content: &str, delimiter_count: usize, range: Range<usize>) {
        self.push_inline(Inline::Math {
            span: self.map.span(range),
            content_len: content.chars().count(),
            delimiter_count,
        });
    }

    fn push_inline(&mut self, inline: Inline) {
        self.top().inlines.push(inline);
    }

    fn push_block(&mut self, block: Block) {
        let top = self.top();
        top.flush_inlines();
        top.blocks.push(block);
    }

    fn finish(mut self) -> Document {
        while self.stack.len() > 1 {
            self.end();
        }
        let mut root = self
            .stack
            .pop()
            .unwrap_or_else(|| Frame::new(FrameKind::Document, 0..0));
        root.flush_inlines();
        Document {
            blocks: root.blocks,
        }
    }

    /// Character span of a block with trailing line endings removed.
    fn block_span(&self, range: Range<usize>) -> Span {
        let bytes = self.text.as_bytes();
        let mut end = range.end.min(bytes.len());
        while end > range.start && matches!(bytes[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        self.map.span(range.start..end)
    }

    fn delimiter_at(&self, byte: usize, fallback: char) -> char {
        self.text[byte..].chars().next().unwrap_or(fallback)
    }

    /// Width from the item start through the end of its bullet / ordinal marker.
    fn marker_width(&self, byte: usize) -> usize {
        let rest = &self.text[byte..];
        let indent = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let marker = &rest[indent..];
        let digits = marker.chars().take_while(|c| c.is_ascii_digit()).count();
        let width = if digits > 0 && marker[digits..].starts_with(['.', ')']) {
            digits + 1
        } else if marker.starts_with(['-', '+', '*']) {
            1
        } else {
            0
        };
        indent + width
    }

    /// `(label, destination)` sub-spans of `[label](dest)` / `![label](dest)`.
    fn link_parts(&self, range: Range<usize>, kind: LinkKind) -> (Option<Span>, Option<Span>) {
        let source = &self.text[range.clone()];
        let open = match kind {
            LinkKind::Image if source.starts_with("![") => 2,
            LinkKind::Link if source.starts_with('[') => 1,
            _ => return (None, None),
        };
        let Some(close) = matching_bracket(source, open) else {
            return (None, None);
        };
        let label = self.map.span(range.start + open..range.start + close);
        let after = close + 1;
        let destination = source[after..]
            .strip_prefix('(')
            .and_then(|inner| destination_in(inner, range.start + after + 1))
            .map(|r| self.map.span(r));
        (Some(label), destination)
    }
}

fn is_display_math(inlines: &[Inline]) -> bool {
    matches!(
        inlines,
        [Inline::Math {
            delimiter_count: 2,
            ..
        }]
    )
}

/// Byte ranges (delimiters included) of `++x++` / `==x==` runs in `text`.
/// Content must be non-empty and must not start or end with whitespace.
fn marked_runs(text: &str) -> Vec<(Range<usize>, char)> {
    let mut runs = Vec::new();
    let mut from = 0;
    while let Some(open) = text[from..].find(['+', '=']).map(|i| from + i) {
        let delimiter = if text[open..].starts_with("++") {
            '+'
        } else if text[open..].starts_with("==") {
            '='
        } else {
            from = open + 1;
            continue;
        };
        let fence = if delimiter == '+' { "++" } else { "==" };
        let body_start = open + 2;
        let close = text[body_start..].find(fence).map(|i| body_start + i);
        match close {
            Some(close)
                if close > body_start
                    && !text[body_start..close].starts_with(char::is_whitespace)
                    && !text[body_start..close].ends_with(char::is_whitespace) =>
            {
                runs.push((open..close + 2, delimiter));
                from = close + 2;
            }
            _ => from = body_start,
        }
    }
    runs
}

/// Byte index of the `]` closing the bracket opened just before `from`.
fn matching_bracket(source: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in source[from..].char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' if depth == 0 => return Some(from + i),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Destination byte range inside `(...)` / after `]:`; `base` is the absolute
/// byte offset of `inner`.
fn destination_in(inner: &str, base: usize) -> Option<Range<usize>> {
    let lead = inner.len() - inner.trim_start().len();
    let rest = &inner[lead..];
    if let Some(angled) = rest.strip_prefix('<') {
        let end = angled.find('>')?;
        let start = base + lead + 1;
        return Some(start..start + end);
    }
    let mut depth = 0usize;
    let mut end = rest.len();
    for (i, c) in rest.char_indices() {
        match c {
            c if c.is_whitespace() => {
                end = i;
                break;
            }
            '(' => depth += 1,
            ')' if depth == 0 => {
                end = i;
                break;
            }
            ')' => depth -= 1,
            _ => {}
        }
    }
    (end > 0).then(|| base + lead..base + lead + end)
}

fn definition(text: &str, map: &OffsetMap, range: Range<usize>) -> LinkReferenceDefinition {
    let bytes = text.as_bytes();
    let mut end = range.end.min(bytes.len());
    while end > range.start && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let source = &text[range.start..end];
    let mut label = None;
    let mut title = None;
    let mut destination = None;

    if let Some(open) = source.find('[') {
        if let Some(close) = matching_bracket(source, open + 1) {
            label = Some(map.span(range.start + open + 1..range.start + close));
            let after = close + 1;
            if let Some(rest) = source[after..].strip_prefix(':') {
                let rest_base = range.start + after + 1;
                if let Some(dest) = destination_in(rest, rest_base) {
                    let dest_end = dest.end - range.start;
                    let tail_start = if source[dest_end..].starts_with('>') {
                        dest_end + 1
                    } else {
                        dest_end
                    };
                    destination = Some(map.span(dest));
                    title = title_in(&source[tail_start..], range.start + tail_start)
                        .map(|r| map.span(r));
                }
            }
        }
    }

    LinkReferenceDefinition {
        span: map.span(range.start..end),
        label,
        title,
        destination,
    }
}

/// Quoted title (delimiters included) following a definition destination.
fn title_in(tail: &str, base: usize) -> Option<Range<usize>> {
    let lead = tail.len() - tail.trim_start().len();
    let rest = &tail[lead..];
    let close = match rest.chars().next()? {
        '"' => '"',
        '\'' => '\'',
        '(' => ')',
        _ => return None,
    };
    let end = rest[1..].find(close)? + 2;
    Some(base + lead..base + lead + end)
}

fn is_typographic(c: char) -> bool {
    matches!(
        c,
        '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '\u{2013}' | '\u{2014}' | '\u{2026}'
    )
}
