pub mod blocks;
pub mod diagram;
pub mod highlight;
pub mod html;
pub mod stats;

use thiserror::Error;
use url::Url;

pub use blocks::{Block, DiagramBlock};
pub use highlight::SyntaxHighlighter;
pub use html::ExportAssets;
pub use stats::TextStats;

use crate::core::config::Theme;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("File is not valid UTF-8 text")]
    Decode(#[from] std::str::Utf8Error),
    #[error("Highlighting failed: {0}")]
    Highlight(#[from] syntect::Error),
    #[error("Could not encode diagram: {0}")]
    Encode(#[from] std::io::Error),
}

/// Output of one render pass
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub blocks: Vec<Block>,
    pub stats: TextStats,
}

impl RenderedDocument {
    /// Diagram blocks in document order, including nested ones
    pub fn diagrams(&self) -> Vec<&DiagramBlock> {
        fn walk<'a>(blocks: &'a [Block], out: &mut Vec<&'a DiagramBlock>) {
            for block in blocks {
                match block {
                    Block::Diagram(diagram) => out.push(diagram),
                    Block::Quote { blocks } => walk(blocks, out),
                    Block::List { items, .. } => {
                        for item in items {
                            walk(&item.blocks, out);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.blocks, &mut out);
        out
    }
}

/// Turns document text into display blocks and export markup
pub struct Renderer {
    highlighter: SyntaxHighlighter,
    diagram_server: Url,
}

impl Renderer {
    pub fn new(diagram_server: Url) -> Self {
        Self {
            highlighter: SyntaxHighlighter::new(),
            diagram_server,
        }
    }

    pub fn render(&self, text: &str, theme: Theme) -> Result<RenderedDocument, RenderError> {
        let blocks = blocks::parse_blocks(text, &self.highlighter, theme, &self.diagram_server)?;
        let stats = TextStats::from_text(text);
        tracing::debug!(
            "Rendered {} blocks, {} words",
            blocks.len(),
            stats.words
        );
        Ok(RenderedDocument { blocks, stats })
    }

    pub fn export_html(
        &self,
        text: &str,
        title: &str,
        theme: Theme,
        assets: &ExportAssets,
    ) -> Result<String, RenderError> {
        html::export_html(
            text,
            title,
            theme,
            &self.highlighter,
            &self.diagram_server,
            assets,
        )
    }
}

/// Decode file bytes as UTF-8, dropping a leading byte order mark
pub fn decode(bytes: &[u8]) -> Result<&str, RenderError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(std::str::from_utf8(bytes)?)
}
