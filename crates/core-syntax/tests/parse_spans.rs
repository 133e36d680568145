//! Span and node-kind checks for the markdown adapter.

use core_syntax::{Block, Inline, LinkKind, parse};
use pretty_assertions::assert_eq;

fn only_paragraph_inlines(text: &str) -> Vec<Inline> {
    let doc = parse(text);
    match doc.blocks.as_slice() {
        [Block::Paragraph { inlines, .. }] => inlines.clone(),
        other => panic!("expected one paragraph, got {other:?}"),
    }
}

#[test]
fn heading_then_emphasis_paragraph() {
    let doc = parse("# Hi\n\n*ok*");
    assert_eq!(doc.blocks.len(), 2);
    match &doc.blocks[0] {
        Block::Heading { span, level, .. } => {
            assert_eq!(span, &(0..4));
            assert_eq!(*level, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    match &doc.blocks[1] {
        Block::Paragraph { span, inlines } => {
            assert_eq!(span, &(6..10));
            assert_eq!(
                inlines,
                &vec![Inline::Emphasis {
                    span: 6..10,
                    delimiter: '*',
                    count: 1,
                    children: vec![Inline::Text { span: 7..9 }],
                }]
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn strong_and_underscore_delimiters() {
    let inlines = only_paragraph_inlines("__b__ _i_");
    match &inlines[0] {
        Inline::Emphasis {
            delimiter, count, ..
        } => assert_eq!((*delimiter, *count), ('_', 2)),
        other => panic!("unexpected {other:?}"),
    }
    match inlines.last() {
        Some(Inline::Emphasis {
            delimiter, count, ..
        }) => assert_eq!((*delimiter, *count), ('_', 1)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn strikethrough_counts_tildes() {
    let inlines = only_paragraph_inlines("~~gone~~");
    match &inlines[0] {
        Inline::Emphasis {
            delimiter, count, ..
        } => assert_eq!((*delimiter, *count), ('~', 2)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn link_label_and_destination_spans() {
    let text = "[label](http://x.y)";
    let inlines = only_paragraph_inlines(text);
    match &inlines[0] {
        Inline::Link {
            span,
            kind,
            label,
            destination,
        } => {
            assert_eq!(span, &(0..19));
            assert_eq!(*kind, LinkKind::Link);
            assert_eq!(label, &Some(1..6));
            assert_eq!(destination, &Some(8..18));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn image_destinations_are_collected() {
    let text = "![a](one.png) and ![b](<two words.png>)";
    let doc = parse(text);
    assert_eq!(
        doc.image_destinations(text),
        vec!["one.png".to_string(), "two words.png".to_string()]
    );
}

#[test]
fn offsets_are_characters_for_multibyte_text() {
    let text = "é *x*";
    let inlines = only_paragraph_inlines(text);
    match inlines.last() {
        Some(Inline::Emphasis { span, .. }) => assert_eq!(span, &(2..5)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn tight_list_items_wrap_inlines_in_paragraph() {
    let doc = parse("- a\n- b\n");
    let Block::List { items, .. } = &doc.blocks[0] else {
        panic!("expected list");
    };
    assert_eq!(items.len(), 2);
    match &items[1] {
        Block::ListItem {
            span,
            marker_width,
            children,
        } => {
            assert_eq!(span, &(4..7));
            assert_eq!(*marker_width, 1);
            assert!(matches!(children.as_slice(), [Block::Paragraph { .. }]));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn task_markers_report_state() {
    let doc = parse("- [x] done\n- [ ] todo\n");
    let mut states = Vec::new();
    let Block::List { items, .. } = &doc.blocks[0] else {
        panic!("expected list");
    };
    for item in items {
        let Block::ListItem { children, .. } = item else {
            continue;
        };
        for child in children {
            if let Block::Paragraph { inlines, .. } = child {
                for inline in inlines {
                    if let Inline::TaskMarker { checked, .. } = inline {
                        states.push(*checked);
                    }
                }
            }
        }
    }
    assert_eq!(states, vec![true, false]);
}

#[test]
fn fenced_code_keeps_lines_and_info() {
    let text = "```rust\nfn a() {}\nlet x = 1;\n```\n";
    let doc = parse(text);
    match &doc.blocks[0] {
        Block::FencedCode { span, info, lines } => {
            assert_eq!(span, &(0..32));
            assert_eq!(info.as_deref(), Some("rust"));
            assert_eq!(lines.len(), 2);
            assert_eq!(lines[0].start, 8);
            assert_eq!(lines[0].text, "fn a() {}");
            assert_eq!(lines[1].start, 18);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn reference_definitions_form_trailing_group() {
    let text = "see [x]\n\n[x]: http://a.b \"T\"\n";
    let doc = parse(text);
    match doc.blocks.last() {
        Some(Block::LinkReferenceGroup { definitions }) => {
            assert_eq!(definitions.len(), 1);
            let def = &definitions[0];
            assert_eq!(def.span.start, 9);
            assert_eq!(def.label, Some(10..11));
            assert_eq!(def.destination, Some(14..24));
            assert_eq!(def.title, Some(25..28));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn inline_math_reports_content_and_delimiters() {
    let inlines = only_paragraph_inlines("$a+b$");
    match &inlines[0] {
        Inline::Math {
            span,
            content_len,
            delimiter_count,
        } => {
            assert_eq!(span.start, 0);
            assert_eq!((*content_len, *delimiter_count), (3, 1));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn empty_source_yields_empty_document() {
    assert!(parse("").blocks.is_empty());
}

#[test]
fn superscript_and_subscript_are_single_delimiter_emphasis() {
    let sup = only_paragraph_inlines("x^2^ y");
    assert_eq!(
        sup[1],
        Inline::Emphasis {
            span: 1..4,
            delimiter: '^',
            count: 1,
            children: vec![Inline::Text { span: 2..3 }],
        }
    );

    let sub = only_paragraph_inlines("H~2~O");
    assert_eq!(
        sub[1],
        Inline::Emphasis {
            span: 1..4,
            delimiter: '~',
            count: 1,
            children: vec![Inline::Text { span: 2..3 }],
        }
    );
}

#[test]
fn inserted_and_marked_runs_split_literal_text() {
    let inlines = only_paragraph_inlines("a ++new++ b ==hot==");
    assert_eq!(
        inlines,
        vec![
            Inline::Text { span: 0..2 },
            Inline::Emphasis {
                span: 2..9,
                delimiter: '+',
                count: 2,
                children: vec![Inline::Text { span: 4..7 }],
            },
            Inline::Text { span: 9..12 },
            Inline::Emphasis {
                span: 12..19,
                delimiter: '=',
                count: 2,
                children: vec![Inline::Text { span: 14..17 }],
            },
        ]
    );
}

#[test]
fn doubled_plus_around_spaces_stays_text() {
    let inlines = only_paragraph_inlines("C++ and C++");
    assert_eq!(inlines, vec![Inline::Text { span: 0..11 }]);
}

#[test]
fn display_math_paragraph_becomes_math_block() {
    let doc = parse("$$\nx+y\n$$\n");
    assert_eq!(doc.blocks, vec![Block::Math { span: 0..9 }]);

    let mixed = only_paragraph_inlines("see $$x$$ here");
    assert!(
        mixed
            .iter()
            .any(|i| matches!(i, Inline::Math { delimiter_count: 2, .. }))
    );
}

#[test]
fn blank_lines_leave_gaps_between_blocks() {
    let doc = parse("a\n\n\nb\n");
    let spans: Vec<_> = doc.blocks.iter().filter_map(|b| b.span().cloned()).collect();
    assert_eq!(spans, vec![0..1, 4..5]);
}
