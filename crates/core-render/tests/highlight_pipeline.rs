//! Parse → project → consolidate scenarios over real markdown.

use core_render::{
    Brush, Palette, PlainTokenizer, StyleColor, StyleProjector, Viewport, consolidate,
    highlight_viewport,
};
use core_text::Buffer;
use pretty_assertions::assert_eq;

#[test]
fn heading_and_emphasis_end_to_end() {
    let text = "# Hi\n\n*ok*";
    let doc = core_syntax::parse(text);
    let projector = StyleProjector::new(&PlainTokenizer);
    let cands = projector.project(&doc, 0, text.chars().count());

    let heading = cands
        .iter()
        .find(|c| (c.start, c.end) == (0, 4))
        .expect("heading candidate");
    assert!(heading.context.is_bold());
    assert_eq!(heading.context.top_color(), Some(StyleColor::Heading));

    let para = cands
        .iter()
        .position(|c| (c.start, c.end) == (6, 10) && c.context.colors().is_empty())
        .expect("paragraph candidate");
    let emph = cands
        .iter()
        .position(|c| (c.start, c.end) == (6, 10) && c.context.is_italic())
        .expect("emphasis candidate");
    assert!(para < emph);
    assert_eq!(cands[emph].context.top_color(), Some(StyleColor::Emphasis));

    let out = consolidate(&cands, 6, 10);
    assert_eq!(out.len(), 1);
    assert_eq!((out[0].start, out[0].end), (6, 10));
    assert!(out[0].context.is_italic());
    assert_eq!(out[0].context.top_color(), Some(StyleColor::Emphasis));
}

#[test]
fn sub_and_strikethrough_script_and_underline() {
    let text = "~sub~ and ~~strike~~";
    let doc = core_syntax::parse(text);
    let cands = StyleProjector::new(&PlainTokenizer).project(&doc, 0, text.len());

    let sub = cands
        .iter()
        .find(|c| (c.start, c.end) == (0, 5) && c.context.script() < 0)
        .expect("subscript candidate");
    assert_eq!(sub.context.top_color(), Some(StyleColor::Emphasis));
    assert!(!sub.context.is_underline());

    let strike = cands
        .iter()
        .find(|c| (c.start, c.end) == (10, 20) && c.context.is_underline())
        .expect("strikethrough candidate");
    assert_eq!(strike.context.script(), 0);
    assert_eq!(strike.context.top_color(), Some(StyleColor::Emphasis));
}

#[test]
fn superscript_raises_script_position() {
    let text = "x^2^ y";
    let doc = core_syntax::parse(text);
    let cands = StyleProjector::new(&PlainTokenizer).project(&doc, 0, text.len());
    let sup = cands
        .iter()
        .find(|c| (c.start, c.end) == (1, 4))
        .expect("superscript candidate");
    assert!(sup.context.script() > 0);
    assert_eq!(sup.context.top_color(), Some(StyleColor::Emphasis));
    assert!(cands.iter().all(|c| c.context.script() >= 0));
}

#[test]
fn inserted_and_marked_runs_take_their_colors() {
    let text = "++new++ ==old==";
    let doc = core_syntax::parse(text);
    let cands = StyleProjector::new(&PlainTokenizer).project(&doc, 0, text.len());
    let out = consolidate(&cands, 0, 15);
    let colors: Vec<_> = out
        .iter()
        .map(|s| (s.start, s.end, s.context.top_color()))
        .collect();
    assert_eq!(
        colors,
        vec![
            (0, 7, Some(StyleColor::Inserted)),
            (7, 8, None),
            (8, 15, Some(StyleColor::Removed)),
        ]
    );
}

#[test]
fn display_math_block_is_math_colored_without_italic() {
    let text = "$$\nx+y\n$$\n";
    let doc = core_syntax::parse(text);
    let cands = StyleProjector::new(&PlainTokenizer).project(&doc, 0, text.len());
    assert!(!cands.is_empty());
    assert!(cands.iter().all(|c| !c.context.is_italic()));
    let math = cands
        .iter()
        .find(|c| (c.start, c.end) == (0, 9))
        .expect("math block candidate");
    assert_eq!(math.context.top_color(), Some(StyleColor::Math));
}

#[test]
fn viewport_pass_yields_one_segment_per_visible_line() {
    let text = "# Title\n\nplain text\n";
    let buffer = Buffer::new("doc.md", text);
    let doc = core_syntax::parse(&buffer.text());
    let projector = StyleProjector::new(&PlainTokenizer);
    let viewport = Viewport {
        first_line: 0,
        line_count: 3,
        first_column: 0,
        column_count: 80,
    };
    let segments = highlight_viewport(&buffer, &doc, &projector, &viewport, true);
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].chars, 0..7);
    assert!(segments[1].spans.is_empty());
    assert_eq!(segments[2].chars, 9..19);

    let palette = Palette::default();
    let runs = segments[0].paint_runs(&buffer, &palette);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].text, "# Title");
    assert!(runs[0].bold);
    assert_eq!(
        runs[0].brush,
        Brush::Solid(StyleColor::Heading.default_rgb())
    );
}

#[test]
fn disabled_highlighting_paints_plain_lines() {
    let text = "# Title\n*x*";
    let buffer = Buffer::new("doc.md", text);
    let doc = core_syntax::parse(text);
    let projector = StyleProjector::new(&PlainTokenizer);
    let viewport = Viewport {
        first_line: 0,
        line_count: 10,
        first_column: 0,
        column_count: 80,
    };
    let segments = highlight_viewport(&buffer, &doc, &projector, &viewport, false);
    assert_eq!(segments.len(), 2);
    for seg in &segments {
        assert_eq!(seg.spans.len(), 1);
        assert!(seg.spans[0].context.colors().is_empty());
    }
}

#[test]
fn horizontal_scroll_clips_segments() {
    let text = "# Heading\n";
    let buffer = Buffer::new("doc.md", text);
    let doc = core_syntax::parse(text);
    let projector = StyleProjector::new(&PlainTokenizer);
    let viewport = Viewport {
        first_line: 0,
        line_count: 1,
        first_column: 2,
        column_count: 3,
    };
    let segments = highlight_viewport(&buffer, &doc, &projector, &viewport, true);
    assert_eq!(segments[0].chars, 2..5);
    assert_eq!(segments[0].spans.len(), 1);
    assert_eq!(
        (segments[0].spans[0].start, segments[0].spans[0].end),
        (2, 5)
    );
}
