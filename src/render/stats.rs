//! Word count and reading time

/// Reading speed used for the time estimate
pub const WORDS_PER_MINUTE: usize = 200;

/// Simple statistics about a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStats {
    /// Whitespace-delimited, non-empty tokens
    pub words: usize,
    /// Estimated reading time, never below one minute
    pub minutes: usize,
}

impl TextStats {
    pub fn from_text(text: &str) -> Self {
        let words = text.split_whitespace().count();
        let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
        Self { words, minutes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text() {
        let stats = TextStats::from_text("one two three");
        assert_eq!(stats, TextStats { words: 3, minutes: 1 });
    }

    #[test]
    fn test_long_text_rounds_up() {
        let text = vec!["word"; 450].join(" ");
        let stats = TextStats::from_text(&text);
        assert_eq!(stats, TextStats { words: 450, minutes: 3 });
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(TextStats::from_text(""), TextStats { words: 0, minutes: 1 });
        assert_eq!(
            TextStats::from_text("  \n\t a \n\n b  "),
            TextStats { words: 2, minutes: 1 }
        );
    }

    #[test]
    fn test_exact_multiple() {
        let text = vec!["w"; 400].join("\n");
        assert_eq!(TextStats::from_text(&text).minutes, 2);
    }
}
