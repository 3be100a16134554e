//! Code block highlighting with syntect

use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme as SyntectTheme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::core::config::Theme;

const DARK_THEME: &str = "base16-ocean.dark";
const LIGHT_THEME: &str = "InspiredGitHub";

/// A run of text sharing one style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub color: [u8; 3],
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// One highlighted line, without its trailing newline
pub type HighlightedLine = Vec<StyledRun>;

/// Highlighted code block plus the syntax that was used
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedCode {
    /// Name of the syntax used, e.g. "Rust" or "Plain Text"
    pub syntax: String,
    pub lines: Vec<HighlightedLine>,
    /// Background color of the theme
    pub background: Option<[u8; 3]>,
}

pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    dark: SyntectTheme,
    light: SyntectTheme,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxHighlighter {
    pub fn new() -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();

        let pick = |name: &str| {
            theme_set.themes.get(name).cloned().unwrap_or_else(|| {
                tracing::warn!("Syntax theme {} missing, using default", name);
                SyntectTheme::default()
            })
        };

        Self {
            dark: pick(DARK_THEME),
            light: pick(LIGHT_THEME),
            syntax_set,
        }
    }

    fn theme(&self, theme: Theme) -> &SyntectTheme {
        match theme {
            Theme::Dark => &self.dark,
            Theme::Light => &self.light,
        }
    }

    fn by_tag(&self, language: &str) -> Option<&SyntaxReference> {
        let tag = language.trim();
        if tag.is_empty() {
            return None;
        }
        self.syntax_set
            .find_syntax_by_token(tag)
            .or_else(|| self.syntax_set.find_syntax_by_extension(&tag.to_lowercase()))
    }

    /// Pick a syntax for code without a usable tag
    fn detect(&self, code: &str) -> Option<&SyntaxReference> {
        if let Some(syntax) = self.syntax_set.find_syntax_by_first_line(code) {
            return Some(syntax);
        }

        let extension = if code.contains("fn ") && (code.contains("let ") || code.contains("->")) {
            "rs"
        } else if code.contains("#include") || code.contains("int main") {
            "c"
        } else if code.contains("def ") || (code.contains("import ") && code.contains(':')) {
            "py"
        } else if code.contains("function ") || code.contains("const ") || code.contains("=>") {
            "js"
        } else if code.trim_start().starts_with('<') && code.contains("</") {
            "html"
        } else if code.trim_start().starts_with('{') && code.contains("\":") {
            "json"
        } else if code.contains("echo ") || code.contains("$ ") {
            "sh"
        } else {
            return None;
        };

        self.syntax_set.find_syntax_by_extension(extension)
    }

    /// Resolve by declared tag first, then by detection, then plain text
    pub fn resolve(&self, language: Option<&str>, code: &str) -> &SyntaxReference {
        language
            .and_then(|lang| self.by_tag(lang))
            .or_else(|| self.detect(code))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
    }

    /// Highlight a block into styled runs
    pub fn highlight(
        &self,
        code: &str,
        language: Option<&str>,
        theme: Theme,
    ) -> Result<HighlightedCode, syntect::Error> {
        let syntax = self.resolve(language, code);
        let theme = self.theme(theme);
        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut lines = Vec::new();

        for line in LinesWithEndings::from(code) {
            let ranges = highlighter.highlight_line(line, &self.syntax_set)?;
            let runs = ranges
                .into_iter()
                .filter_map(|(style, text)| {
                    let text = text.trim_end_matches(['\n', '\r']);
                    if text.is_empty() {
                        return None;
                    }
                    Some(StyledRun {
                        text: text.to_string(),
                        color: [style.foreground.r, style.foreground.g, style.foreground.b],
                        bold: style.font_style.contains(FontStyle::BOLD),
                        italic: style.font_style.contains(FontStyle::ITALIC),
                        underline: style.font_style.contains(FontStyle::UNDERLINE),
                    })
                })
                .collect();
            lines.push(runs);
        }

        Ok(HighlightedCode {
            syntax: syntax.name.clone(),
            lines,
            background: theme.settings.background.map(|c| [c.r, c.g, c.b]),
        })
    }

    /// Highlight a block into an inline-styled `<pre>` element
    pub fn highlight_html(
        &self,
        code: &str,
        language: Option<&str>,
        theme: Theme,
    ) -> Result<String, syntect::Error> {
        let syntax = self.resolve(language, code);
        highlighted_html_for_string(code, &self.syntax_set, syntax, self.theme(theme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_language() {
        let highlighter = SyntaxHighlighter::new();
        let code = highlighter
            .highlight("fn main() {}\n", Some("rust"), Theme::Dark)
            .unwrap();
        assert_eq!(code.syntax, "Rust");
        assert_eq!(code.lines.len(), 1);

        let text: String = code.lines[0].iter().map(|r| r.text.as_str()).collect();
        assert_eq!(text, "fn main() {}");
    }

    #[test]
    fn test_unknown_tag_falls_back_to_detection() {
        let highlighter = SyntaxHighlighter::new();
        assert!(highlighter.by_tag("no-such-language").is_none());

        let syntax = highlighter.resolve(Some("no-such-language"), "#!/bin/bash\necho hi\n");
        assert!(syntax.name.to_lowercase().contains("bash"));
    }

    #[test]
    fn test_plain_text_fallback() {
        let highlighter = SyntaxHighlighter::new();
        let syntax = highlighter.resolve(None, "just some words");
        assert_eq!(syntax.name, "Plain Text");
    }

    #[test]
    fn test_themes_differ() {
        let highlighter = SyntaxHighlighter::new();
        let dark = highlighter.highlight("let x = 1;", Some("js"), Theme::Dark).unwrap();
        let light = highlighter.highlight("let x = 1;", Some("js"), Theme::Light).unwrap();
        assert_ne!(dark.background, light.background);
    }

    #[test]
    fn test_html_output() {
        let highlighter = SyntaxHighlighter::new();
        let html = highlighter
            .highlight_html("<b>x</b>", Some("html"), Theme::Light)
            .unwrap();
        assert!(html.starts_with("<pre"));
        assert!(!html.contains("<b>x</b>"));
    }
}
