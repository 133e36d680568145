//! One frame of highlighted output: change gutter plus painted line segments.

use core_diff::{ChangeDecorations, ChangeKind};
use core_render::writer::Writer;
use core_render::{CodeTokenizer, Palette, StyleProjector, Viewport, highlight_viewport};
use core_syntax::Document;
use core_text::Buffer;

pub const GUTTER_WIDTH: usize = 1;

pub struct FrameInput<'a> {
    pub buffer: &'a Buffer,
    pub document: &'a Document,
    pub tokenizer: &'a dyn CodeTokenizer,
    pub palette: &'a Palette,
    pub decorations: &'a ChangeDecorations,
    pub viewport: Viewport,
    pub highlight: bool,
}

fn gutter_mark(palette: &Palette, kind: ChangeKind) -> core_render::Rgb {
    match kind {
        ChangeKind::SinceSave => palette.changed_since_save,
        ChangeKind::SinceOriginal => palette.changed_since_original,
    }
}

pub fn render_frame(input: &FrameInput<'_>) -> Writer {
    let projector = StyleProjector::new(input.tokenizer);
    let segments = highlight_viewport(
        input.buffer,
        input.document,
        &projector,
        &input.viewport,
        input.highlight,
    );
    let mut writer = Writer::new();
    for segment in &segments {
        let mark = input
            .decorations
            .kind_of(segment.line)
            .map(|kind| gutter_mark(input.palette, kind));
        writer.gutter(mark, GUTTER_WIDTH);
        let mut column = input.viewport.first_column;
        for run in segment.paint_runs(input.buffer, input.palette) {
            writer.paint(&run, column);
            column += run.text.chars().count();
        }
        writer.new_line();
    }
    writer
}
