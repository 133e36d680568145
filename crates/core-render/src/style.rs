//! Style layer: inherited style contexts, color roles and brushes.
//!
//! Design invariants:
//! * A `StyleContext` is immutable once built. Child contexts are derived with
//!   `with_*` methods which copy the parent and append / OR onto the copy.
//! * Colors are kept in outer-to-inner order and may repeat; brush selection
//!   looks at the distinct set (first occurrence order) while the gradient
//!   period counts every listed color.
//! * Color roles are resolved to RGB only at paint time through a `Palette`,
//!   so the projector and consolidator never depend on user configuration.

use std::fmt;

use ahash::AHashMap;
use bitflags::bitflags;
use smallvec::SmallVec;

/// Gradient period contributed by each listed color, in pixels.
pub const GRADIENT_PX_PER_COLOR: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (leading `#` optional).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Named color role, or a literal color supplied by a code tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleColor {
    Heading,
    HtmlEntity,
    Html,
    LineBreak,
    Link,
    Image,
    Code,
    Math,
    Quote,
    Inserted,
    Removed,
    Emphasis,
    ThematicBreak,
    /// Fallback for text no candidate covers.
    Error,
    Bullet,
    TaskCompleted,
    TaskIncomplete,
    Custom(Rgb),
}

impl StyleColor {
    pub const ROLES: [StyleColor; 17] = [
        StyleColor::Heading,
        StyleColor::HtmlEntity,
        StyleColor::Html,
        StyleColor::LineBreak,
        StyleColor::Link,
        StyleColor::Image,
        StyleColor::Code,
        StyleColor::Math,
        StyleColor::Quote,
        StyleColor::Inserted,
        StyleColor::Removed,
        StyleColor::Emphasis,
        StyleColor::ThematicBreak,
        StyleColor::Error,
        StyleColor::Bullet,
        StyleColor::TaskCompleted,
        StyleColor::TaskIncomplete,
    ];

    /// Configuration name of a role; `None` for `Custom`.
    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            StyleColor::Heading => "heading",
            StyleColor::HtmlEntity => "html-entity",
            StyleColor::Html => "html",
            StyleColor::LineBreak => "line-break",
            StyleColor::Link => "link",
            StyleColor::Image => "image",
            StyleColor::Code => "code",
            StyleColor::Math => "math",
            StyleColor::Quote => "quote",
            StyleColor::Inserted => "inserted",
            StyleColor::Removed => "removed",
            StyleColor::Emphasis => "emphasis",
            StyleColor::ThematicBreak => "thematic-break",
            StyleColor::Error => "error",
            StyleColor::Bullet => "bullet",
            StyleColor::TaskCompleted => "task-completed",
            StyleColor::TaskIncomplete => "task-incomplete",
            StyleColor::Custom(_) => return None,
        })
    }

    /// Inverse of `name`; underscores are accepted in place of dashes.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ROLES
            .iter()
            .copied()
            .find(|role| role.name() == Some(wanted.as_str()))
    }

    pub fn default_rgb(&self) -> Rgb {
        match self {
            StyleColor::Heading => Rgb::new(166, 55, 0),
            StyleColor::HtmlEntity => Rgb::new(75, 152, 220),
            StyleColor::Html => Rgb::new(0, 158, 115),
            StyleColor::LineBreak => Rgb::new(230, 159, 0),
            StyleColor::Link => Rgb::new(0, 114, 178),
            StyleColor::Image => Rgb::new(0, 78, 138),
            StyleColor::Code | StyleColor::Math => Rgb::new(213, 94, 0),
            StyleColor::Quote => Rgb::new(120, 120, 120),
            StyleColor::Inserted => Rgb::new(0, 158, 115),
            StyleColor::Removed => Rgb::new(213, 94, 0),
            StyleColor::Emphasis => Rgb::new(0, 78, 138),
            StyleColor::ThematicBreak => Rgb::new(180, 180, 180),
            StyleColor::Error => Rgb::new(0, 0, 0),
            StyleColor::Bullet => Rgb::new(0, 114, 178),
            StyleColor::TaskCompleted => Rgb::new(0, 158, 115),
            StyleColor::TaskIncomplete => Rgb::new(213, 94, 0),
            StyleColor::Custom(rgb) => *rgb,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StyleFlags: u8 {
        const BOLD      = 0b0000_0001;
        const ITALIC    = 0b0000_0010;
        const UNDERLINE = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StyleContext {
    colors: SmallVec<[StyleColor; 4]>,
    flags: StyleFlags,
    /// 0 baseline, > 0 superscript, < 0 subscript.
    script: i8,
}

impl StyleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn colors(&self) -> &[StyleColor] {
        &self.colors
    }

    pub fn flags(&self) -> StyleFlags {
        self.flags
    }

    pub fn script(&self) -> i8 {
        self.script
    }

    pub fn is_bold(&self) -> bool {
        self.flags.contains(StyleFlags::BOLD)
    }

    pub fn is_italic(&self) -> bool {
        self.flags.contains(StyleFlags::ITALIC)
    }

    pub fn is_underline(&self) -> bool {
        self.flags.contains(StyleFlags::UNDERLINE)
    }

    /// Innermost color, if any.
    pub fn top_color(&self) -> Option<StyleColor> {
        self.colors.last().copied()
    }

    pub fn with_color(&self, color: StyleColor) -> Self {
        let mut child = self.clone();
        child.colors.push(color);
        child
    }

    pub fn with_flags(&self, flags: StyleFlags) -> Self {
        let mut child = self.clone();
        child.flags |= flags;
        child
    }

    /// Child placed at script position `script` (replaces the parent's).
    pub fn with_script(&self, script: i8) -> Self {
        let mut child = self.clone();
        child.script = script;
        child
    }

    /// Distinct colors in first-occurrence order.
    pub fn distinct_colors(&self) -> SmallVec<[StyleColor; 4]> {
        let mut out: SmallVec<[StyleColor; 4]> = SmallVec::new();
        for c in &self.colors {
            if !out.contains(c) {
                out.push(*c);
            }
        }
        out
    }

    pub fn brush(&self, palette: &Palette) -> Brush {
        let distinct = self.distinct_colors();
        match distinct.as_slice() {
            [] => Brush::Default,
            [only] => Brush::Solid(palette.rgb(*only)),
            many => {
                let n = many.len() as f32;
                let stops = many
                    .iter()
                    .enumerate()
                    .flat_map(|(i, c)| {
                        let rgb = palette.rgb(*c);
                        [
                            GradientStop {
                                offset: i as f32 / n,
                                color: rgb,
                            },
                            GradientStop {
                                offset: (i + 1) as f32 / n,
                                color: rgb,
                            },
                        ]
                    })
                    .collect();
                Brush::Gradient {
                    period_px: self.colors.len() as u32 * GRADIENT_PX_PER_COLOR,
                    stops,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Position within one period, `0.0..=1.0`.
    pub offset: f32,
    pub color: Rgb,
}

/// Paint for one run of text.
#[derive(Debug, Clone, PartialEq)]
pub enum Brush {
    /// No color in context: the surface's default foreground.
    Default,
    Solid(Rgb),
    /// Repeating diagonal gradient with hard stops, one band per color.
    Gradient {
        period_px: u32,
        stops: Vec<GradientStop>,
    },
}

impl Brush {
    /// Color to use where only one color can be shown (terminal cells): the
    /// band that covers `phase` (cell index) when bands are one cell wide.
    pub fn sample(&self, phase: usize) -> Option<Rgb> {
        match self {
            Brush::Default => None,
            Brush::Solid(rgb) => Some(*rgb),
            Brush::Gradient { stops, .. } => {
                let bands = stops.len() / 2;
                stops.get((phase % bands.max(1)) * 2).map(|s| s.color)
            }
        }
    }
}

/// Role → RGB mapping plus the change-decoration colors.
#[derive(Debug, Clone)]
pub struct Palette {
    overrides: AHashMap<StyleColor, Rgb>,
    pub changed_since_save: Rgb,
    pub changed_since_original: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            overrides: AHashMap::new(),
            changed_since_save: Rgb::new(255, 238, 98),
            changed_since_original: Rgb::new(108, 226, 108),
        }
    }
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, role: StyleColor, rgb: Rgb) {
        self.overrides.insert(role, rgb);
    }

    pub fn rgb(&self, color: StyleColor) -> Rgb {
        self.overrides
            .get(&color)
            .copied()
            .unwrap_or_else(|| color.default_rgb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_context_leaves_parent_untouched() {
        let parent = StyleContext::new().with_color(StyleColor::Quote);
        let child = parent
            .with_color(StyleColor::Emphasis)
            .with_flags(StyleFlags::BOLD);
        assert_eq!(parent.colors(), &[StyleColor::Quote]);
        assert!(!parent.is_bold());
        assert_eq!(child.colors(), &[StyleColor::Quote, StyleColor::Emphasis]);
        assert!(child.is_bold());
    }

    #[test]
    fn brush_by_distinct_color_count() {
        let p = Palette::default();
        assert_eq!(StyleContext::new().brush(&p), Brush::Default);
        let one = StyleContext::new()
            .with_color(StyleColor::Link)
            .with_color(StyleColor::Link);
        assert_eq!(one.brush(&p), Brush::Solid(Rgb::new(0, 114, 178)));
    }

    #[test]
    fn gradient_has_hard_stops_and_period_per_listed_color() {
        let p = Palette::default();
        let ctx = StyleContext::new()
            .with_color(StyleColor::Quote)
            .with_color(StyleColor::Emphasis)
            .with_color(StyleColor::Quote);
        let Brush::Gradient { period_px, stops } = ctx.brush(&p) else {
            panic!("expected gradient");
        };
        assert_eq!(period_px, 18);
        let offsets: Vec<f32> = stops.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0.0, 0.5, 0.5, 1.0]);
        assert_eq!(stops[0].color, stops[1].color);
        assert_ne!(stops[1].color, stops[2].color);
    }

    #[test]
    fn gradient_sampling_cycles_bands() {
        let p = Palette::default();
        let brush = StyleContext::new()
            .with_color(StyleColor::Heading)
            .with_color(StyleColor::Link)
            .brush(&p);
        assert_eq!(brush.sample(0), Some(StyleColor::Heading.default_rgb()));
        assert_eq!(brush.sample(1), Some(StyleColor::Link.default_rgb()));
        assert_eq!(brush.sample(2), Some(StyleColor::Heading.default_rgb()));
    }

    #[test]
    fn role_names_round_trip_and_accept_underscores() {
        for role in StyleColor::ROLES {
            let name = role.name().unwrap();
            assert_eq!(StyleColor::from_name(name), Some(role));
        }
        assert_eq!(StyleColor::from_name("Task_Completed"), Some(StyleColor::TaskCompleted));
        assert_eq!(StyleColor::from_name("nope"), None);
    }

    #[test]
    fn palette_overrides_and_hex_parsing() {
        let mut p = Palette::default();
        p.set(StyleColor::Link, Rgb::parse_hex("#102030").unwrap());
        assert_eq!(p.rgb(StyleColor::Link), Rgb::new(16, 32, 48));
        assert_eq!(p.rgb(StyleColor::Code), Rgb::new(213, 94, 0));
        assert_eq!(Rgb::parse_hex("zzzzzz"), None);
        assert_eq!(Rgb::new(255, 0, 16).to_string(), "#ff0010");
    }
}
