//! Terminal writer for highlighted line segments.
//!
//! Commands are queued per frame and emitted in order on `flush_to`; nothing
//! reaches the output before that. Gradient brushes cannot be drawn in a
//! terminal cell, so each character takes the band its column falls in.
//! Cells cannot be raised or lowered either: a non-zero script position is
//! drawn dim.
//!
//! Design invariants:
//! * Every styled run is followed by a reset, so styles never bleed into the
//!   next run or line.
//! * The writer owns no global state; it is a short-lived object per frame.

use std::io::Write;

use anyhow::Result;
use crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
};

use crate::pass::PaintRun;
use crate::style::{Brush, Rgb};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Foreground(Rgb),
    Background(Rgb),
    Attribute(Attribute),
    Print(String),
    Reset,
    NewLine,
}

#[derive(Default)]
pub struct Writer {
    cmds: Vec<Command>,
}

impl Writer {
    pub fn new() -> Self {
        Self { cmds: Vec::new() }
    }

    pub fn commands(&self) -> &[Command] {
        &self.cmds
    }

    pub fn print<S: Into<String>>(&mut self, s: S) {
        let s: String = s.into();
        if !s.is_empty() {
            self.cmds.push(Command::Print(s));
        }
    }

    pub fn new_line(&mut self) {
        self.cmds.push(Command::NewLine);
    }

    /// A gutter cell with a solid background (change decorations).
    pub fn gutter(&mut self, mark: Option<Rgb>, width: usize) {
        match mark {
            Some(rgb) => {
                self.cmds.push(Command::Background(rgb));
                self.print(" ".repeat(width));
                self.cmds.push(Command::Reset);
            }
            None => self.print(" ".repeat(width)),
        }
        self.print(" ");
    }

    /// Queue one run. `column` is the run's visible column, used to phase
    /// gradient bands.
    pub fn paint(&mut self, run: &PaintRun, column: usize) {
        let attrs: Vec<Attribute> = [
            (run.bold, Attribute::Bold),
            (run.italic, Attribute::Italic),
            (run.underline, Attribute::Underlined),
            (run.script != 0, Attribute::Dim),
        ]
        .into_iter()
        .filter_map(|(on, attr)| on.then_some(attr))
        .collect();
        let styled = !attrs.is_empty() || run.brush != Brush::Default;
        self.cmds.extend(attrs.into_iter().map(Command::Attribute));
        match &run.brush {
            Brush::Default => self.print(run.text.as_str()),
            Brush::Solid(rgb) => {
                self.cmds.push(Command::Foreground(*rgb));
                self.print(run.text.as_str());
            }
            Brush::Gradient { .. } => {
                for (i, ch) in run.text.chars().enumerate() {
                    if let Some(rgb) = run.brush.sample(column + i) {
                        self.cmds.push(Command::Foreground(rgb));
                    }
                    self.print(ch.to_string());
                }
            }
        }
        if styled {
            self.cmds.push(Command::Reset);
        }
    }

    pub fn flush_to<W: Write>(self, out: &mut W) -> Result<()> {
        for c in self.cmds {
            match c {
                Command::Foreground(rgb) => {
                    queue!(out, SetForegroundColor(to_color(rgb)))?;
                }
                Command::Background(rgb) => {
                    queue!(out, SetBackgroundColor(to_color(rgb)))?;
                }
                Command::Attribute(attr) => {
                    queue!(out, SetAttribute(attr))?;
                }
                Command::Print(s) => {
                    queue!(out, Print(s))?;
                }
                Command::Reset => {
                    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
                }
                Command::NewLine => {
                    queue!(out, Print("\r\n"))?;
                }
            }
        }
        out.flush()?;
        Ok(())
    }
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb {
        r: rgb.r,
        g: rgb.g,
        b: rgb.b,
    }
}
