//! Code tokenizer collaborators for fenced code blocks.

use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::debug;

use crate::style::Rgb;

/// One colored run within a code line. `len` counts characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeToken {
    pub len: usize,
    pub color: Rgb,
    pub bold: bool,
    pub italic: bool,
}

pub trait CodeTokenizer {
    /// Tokens per line of `code` (lines split on `\n`), or `None` when the
    /// language is unknown or tokenizing fails.
    fn tokenize(&self, code: &str, language: &str) -> Option<Vec<Vec<CodeToken>>>;
}

/// Never tokenizes; fenced code renders in the plain code color.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTokenizer;

impl CodeTokenizer for PlainTokenizer {
    fn tokenize(&self, _code: &str, _language: &str) -> Option<Vec<Vec<CodeToken>>> {
        None
    }
}

pub const DEFAULT_THEME: &str = "InspiredGitHub";

pub struct SyntectTokenizer {
    syntaxes: SyntaxSet,
    theme: Theme,
}

impl Default for SyntectTokenizer {
    fn default() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }
}

impl SyntectTokenizer {
    /// Load the bundled syntaxes and the named bundled theme (falls back to
    /// any bundled theme when the name is unknown).
    pub fn with_theme(name: &str) -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = match themes.remove(name) {
            Some(theme) => theme,
            None => {
                debug!(target: "render.tokenize", theme = name, "unknown_theme_fallback");
                themes.into_values().next().unwrap_or_default()
            }
        };
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme,
        }
    }
}

impl CodeTokenizer for SyntectTokenizer {
    fn tokenize(&self, code: &str, language: &str) -> Option<Vec<Vec<CodeToken>>> {
        let token = language.split_whitespace().next()?;
        let syntax = self
            .syntaxes
            .find_syntax_by_token(token)
            .or_else(|| self.syntaxes.find_syntax_by_extension(token))?;
        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        let mut lines = Vec::new();
        for line in LinesWithEndings::from(code) {
            let ranges = match highlighter.highlight_line(line, &self.syntaxes) {
                Ok(ranges) => ranges,
                Err(err) => {
                    debug!(target: "render.tokenize", error = %err, language = token, "tokenize_failed");
                    return None;
                }
            };
            let tokens = ranges
                .into_iter()
                .filter_map(|(style, text)| {
                    let len = text.trim_end_matches(['\n', '\r']).chars().count();
                    (len > 0).then(|| CodeToken {
                        len,
                        color: Rgb::new(style.foreground.r, style.foreground.g, style.foreground.b),
                        bold: style.font_style.contains(FontStyle::BOLD),
                        italic: style.font_style.contains(FontStyle::ITALIC),
                    })
                })
                .collect();
            lines.push(tokens);
        }
        Some(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tokenizer_declines() {
        assert_eq!(PlainTokenizer.tokenize("x", "rust"), None);
    }

    #[test]
    fn syntect_tokens_cover_each_line() {
        let t = SyntectTokenizer::default();
        let code = "fn main() {}\nlet x = 1;";
        let lines = t.tokenize(code, "rust").expect("rust is bundled");
        assert_eq!(lines.len(), 2);
        let widths: Vec<usize> = lines
            .iter()
            .map(|l| l.iter().map(|tok| tok.len).sum())
            .collect();
        assert_eq!(widths, vec![12, 10]);
    }

    #[test]
    fn unknown_language_declines() {
        let t = SyntectTokenizer::default();
        assert_eq!(t.tokenize("x", "no-such-language-here"), None);
    }
}
