//! Markdown block model
//!
//! Parses markdown into a tree of display blocks. Code blocks are highlighted
//! while parsing; diagram blocks are left as source plus the engine URL so the
//! shell can fetch them.

use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use url::Url;

use super::diagram::{diagram_url, DiagramKind};
use super::highlight::{HighlightedCode, SyntaxHighlighter};
use super::RenderError;
use crate::core::config::Theme;

/// Inline style flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub strong: bool,
    pub emphasis: bool,
    pub strikethrough: bool,
    pub code: bool,
}

/// A piece of inline content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text {
        text: String,
        style: SpanStyle,
        link: Option<String>,
    },
    Image {
        alt: String,
        url: String,
        title: Option<String>,
    },
    LineBreak,
}

/// A list item with potential checkbox state
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    /// Some(true) = checked, Some(false) = unchecked, None = no checkbox
    pub checkbox: Option<bool>,
    pub blocks: Vec<Block>,
}

/// Table column alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl From<Alignment> for TableAlignment {
    fn from(alignment: Alignment) -> Self {
        match alignment {
            Alignment::Center => Self::Center,
            Alignment::Right => Self::Right,
            Alignment::Left | Alignment::None => Self::Left,
        }
    }
}

/// A diagram awaiting rendering by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// Position among the document's diagrams
    pub index: usize,
    pub kind: DiagramKind,
    pub source: String,
    pub url: Url,
}

/// A rendered markdown block
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    Paragraph {
        content: Vec<Inline>,
    },
    Code {
        language: Option<String>,
        code: HighlightedCode,
    },
    Diagram(DiagramBlock),
    List {
        ordered: bool,
        start: Option<u64>,
        items: Vec<ListItem>,
    },
    Quote {
        blocks: Vec<Block>,
    },
    Table {
        alignments: Vec<TableAlignment>,
        headers: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
}

/// Open container while walking the event stream
enum Frame {
    Quote(Vec<Block>),
    List {
        ordered: bool,
        start: Option<u64>,
        items: Vec<ListItem>,
    },
    Item {
        checkbox: Option<bool>,
        blocks: Vec<Block>,
    },
    Table {
        alignments: Vec<TableAlignment>,
        headers: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
        row: Vec<Vec<Inline>>,
        in_head: bool,
    },
}

/// Inline text being accumulated for the current leaf block
#[derive(Default)]
struct InlineBuffer {
    content: Vec<Inline>,
    style: SpanStyle,
    strong: usize,
    emphasis: usize,
    strikethrough: usize,
    link: Option<String>,
    image: Option<(String, Option<String>, String)>,
}

impl InlineBuffer {
    fn refresh_style(&mut self) {
        self.style = SpanStyle {
            strong: self.strong > 0,
            emphasis: self.emphasis > 0,
            strikethrough: self.strikethrough > 0,
            code: false,
        };
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if let Some((_, _, alt)) = self.image.as_mut() {
            alt.push_str(text);
            return;
        }

        let mut style = self.style;
        style.code = code;

        // Merge with the previous run when nothing changed
        if let Some(Inline::Text {
            text: prev,
            style: prev_style,
            link: prev_link,
        }) = self.content.last_mut()
        {
            if *prev_style == style && *prev_link == self.link && !code {
                prev.push_str(text);
                return;
            }
        }

        self.content.push(Inline::Text {
            text: text.to_string(),
            style,
            link: self.link.clone(),
        });
    }

    fn take(&mut self) -> Vec<Inline> {
        std::mem::take(&mut self.content)
    }
}

struct BlockBuilder<'a> {
    highlighter: &'a SyntaxHighlighter,
    theme: Theme,
    diagram_server: &'a Url,
    root: Vec<Block>,
    stack: Vec<Frame>,
    inline: InlineBuffer,
    code: Option<(Option<String>, String)>,
    diagrams: usize,
}

impl<'a> BlockBuilder<'a> {
    fn push_block(&mut self, block: Block) {
        match self.stack.last_mut() {
            Some(Frame::Quote(blocks)) | Some(Frame::Item { blocks, .. }) => blocks.push(block),
            // Lists and tables only hold their own children
            Some(Frame::List { .. }) | Some(Frame::Table { .. }) | None => self.root.push(block),
        }
    }

    /// Tight list items carry text without a paragraph around it
    fn flush_loose_text(&mut self) {
        if self.inline.content.is_empty() {
            return;
        }
        let content = self.inline.take();
        self.push_block(Block::Paragraph { content });
    }

    fn finish_code(&mut self, language: Option<String>, text: String) -> Result<(), RenderError> {
        let diagram = language.as_deref().and_then(DiagramKind::from_tag);

        let block = match diagram {
            Some(kind) => {
                let url = diagram_url(self.diagram_server, kind, &text, self.theme)?;
                let index = self.diagrams;
                self.diagrams += 1;
                Block::Diagram(DiagramBlock {
                    index,
                    kind,
                    source: text,
                    url,
                })
            }
            None => {
                let code = self
                    .highlighter
                    .highlight(&text, language.as_deref(), self.theme)?;
                Block::Code { language, code }
            }
        };

        self.push_block(block);
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::Heading { .. } => self.flush_loose_text(),
            Tag::CodeBlock(kind) => {
                self.flush_loose_text();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((language, String::new()));
            }
            Tag::BlockQuote(_) => {
                self.flush_loose_text();
                self.stack.push(Frame::Quote(Vec::new()));
            }
            Tag::List(start) => {
                self.flush_loose_text();
                self.stack.push(Frame::List {
                    ordered: start.is_some(),
                    start,
                    items: Vec::new(),
                });
            }
            Tag::Item => self.stack.push(Frame::Item {
                checkbox: None,
                blocks: Vec::new(),
            }),
            Tag::Table(alignments) => {
                self.flush_loose_text();
                self.stack.push(Frame::Table {
                    alignments: alignments.into_iter().map(TableAlignment::from).collect(),
                    headers: Vec::new(),
                    rows: Vec::new(),
                    row: Vec::new(),
                    in_head: false,
                });
            }
            Tag::TableHead => {
                if let Some(Frame::Table { in_head, row, .. }) = self.stack.last_mut() {
                    *in_head = true;
                    row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(Frame::Table { row, .. }) = self.stack.last_mut() {
                    row.clear();
                }
            }
            Tag::TableCell => {
                self.inline.take();
            }
            Tag::Emphasis => {
                self.inline.emphasis += 1;
                self.inline.refresh_style();
            }
            Tag::Strong => {
                self.inline.strong += 1;
                self.inline.refresh_style();
            }
            Tag::Strikethrough => {
                self.inline.strikethrough += 1;
                self.inline.refresh_style();
            }
            Tag::Link { dest_url, .. } => self.inline.link = Some(dest_url.to_string()),
            Tag::Image {
                dest_url, title, ..
            } => {
                let title = (!title.is_empty()).then(|| title.to_string());
                self.inline.image = Some((dest_url.to_string(), title, String::new()));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) -> Result<(), RenderError> {
        match tag {
            TagEnd::Heading(level) => {
                let content = self.inline.take();
                self.push_block(Block::Heading {
                    level: level as u8,
                    content,
                });
            }
            TagEnd::Paragraph => {
                let content = self.inline.take();
                if !content.is_empty() {
                    self.push_block(Block::Paragraph { content });
                }
            }
            TagEnd::CodeBlock => {
                if let Some((language, text)) = self.code.take() {
                    self.finish_code(language, text)?;
                }
            }
            TagEnd::BlockQuote(_) => {
                self.flush_loose_text();
                if let Some(Frame::Quote(blocks)) = self.stack.pop() {
                    self.push_block(Block::Quote { blocks });
                }
            }
            TagEnd::Item => {
                self.flush_loose_text();
                if let Some(Frame::Item { checkbox, blocks }) = self.stack.pop() {
                    if let Some(Frame::List { items, .. }) = self.stack.last_mut() {
                        items.push(ListItem { checkbox, blocks });
                    }
                }
            }
            TagEnd::List(_) => {
                if let Some(Frame::List {
                    ordered,
                    start,
                    items,
                }) = self.stack.pop()
                {
                    self.push_block(Block::List {
                        ordered,
                        start,
                        items,
                    });
                }
            }
            TagEnd::TableCell => {
                let cell = self.inline.take();
                if let Some(Frame::Table { row, .. }) = self.stack.last_mut() {
                    row.push(cell);
                }
            }
            TagEnd::TableHead => {
                if let Some(Frame::Table {
                    headers,
                    row,
                    in_head,
                    ..
                }) = self.stack.last_mut()
                {
                    *headers = std::mem::take(row);
                    *in_head = false;
                }
            }
            TagEnd::TableRow => {
                if let Some(Frame::Table {
                    rows, row, in_head, ..
                }) = self.stack.last_mut()
                {
                    if !*in_head {
                        rows.push(std::mem::take(row));
                    }
                }
            }
            TagEnd::Table => {
                if let Some(Frame::Table {
                    alignments,
                    headers,
                    rows,
                    ..
                }) = self.stack.pop()
                {
                    self.push_block(Block::Table {
                        alignments,
                        headers,
                        rows,
                    });
                }
            }
            TagEnd::Emphasis => {
                self.inline.emphasis = self.inline.emphasis.saturating_sub(1);
                self.inline.refresh_style();
            }
            TagEnd::Strong => {
                self.inline.strong = self.inline.strong.saturating_sub(1);
                self.inline.refresh_style();
            }
            TagEnd::Strikethrough => {
                self.inline.strikethrough = self.inline.strikethrough.saturating_sub(1);
                self.inline.refresh_style();
            }
            TagEnd::HtmlBlock => self.flush_loose_text(),
            TagEnd::Link => self.inline.link = None,
            TagEnd::Image => {
                if let Some((url, title, alt)) = self.inline.image.take() {
                    self.inline.content.push(Inline::Image { alt, url, title });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), RenderError> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag)?,
            Event::Text(text) => match self.code.as_mut() {
                Some((_, code)) => code.push_str(&text),
                None => self.inline.push_text(&text, false),
            },
            Event::Code(code) => self.inline.push_text(&code, true),
            Event::Html(html) | Event::InlineHtml(html) => self.inline.push_text(&html, false),
            Event::SoftBreak | Event::HardBreak => {
                if self.inline.image.is_none() {
                    self.inline.content.push(Inline::LineBreak);
                }
            }
            Event::Rule => {
                self.flush_loose_text();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                if let Some(Frame::Item { checkbox, .. }) = self.stack.last_mut() {
                    *checkbox = Some(checked);
                }
            }
            Event::FootnoteReference(name) => {
                self.inline.push_text(&format!("[{name}]"), false);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Markdown extensions enabled for rendering and export
pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

/// Parse markdown into display blocks
pub fn parse_blocks(
    content: &str,
    highlighter: &SyntaxHighlighter,
    theme: Theme,
    diagram_server: &Url,
) -> Result<Vec<Block>, RenderError> {
    let mut builder = BlockBuilder {
        highlighter,
        theme,
        diagram_server,
        root: Vec::new(),
        stack: Vec::new(),
        inline: InlineBuffer::default(),
        code: None,
        diagrams: 0,
    };

    for event in Parser::new_ext(content, parser_options()) {
        builder.event(event)?;
    }
    builder.flush_loose_text();

    Ok(builder.root)
}

/// Plain text of inline content, used for headings and accessibility text
pub fn plain_text(content: &[Inline]) -> String {
    let mut out = String::new();
    for inline in content {
        match inline {
            Inline::Text { text, .. } => out.push_str(text),
            Inline::Image { alt, .. } => out.push_str(alt),
            Inline::LineBreak => out.push(' '),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<Block> {
        let highlighter = SyntaxHighlighter::new();
        let server = Url::parse("https://kroki.io/").unwrap();
        parse_blocks(content, &highlighter, Theme::Dark, &server).unwrap()
    }

    #[test]
    fn test_heading_and_paragraph() {
        let blocks = parse("# Title\n\nSome *soft* text\nnext line");
        assert_eq!(blocks.len(), 2);

        match &blocks[0] {
            Block::Heading { level, content } => {
                assert_eq!(*level, 1);
                assert_eq!(plain_text(content), "Title");
            }
            other => panic!("expected heading, got {:?}", other),
        }

        match &blocks[1] {
            Block::Paragraph { content } => {
                assert!(content.contains(&Inline::LineBreak));
                assert!(content.iter().any(|i| matches!(
                    i,
                    Inline::Text { text, style, .. } if text == "soft" && style.emphasis
                )));
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_code_and_diagram_blocks() {
        let blocks = parse("```rust\nfn main() {}\n```\n\n```mermaid\ngraph TD; A-->B\n```\n\n```dot\ndigraph {}\n```");
        assert_eq!(blocks.len(), 3);

        assert!(matches!(
            &blocks[0],
            Block::Code { language: Some(lang), code } if lang == "rust" && code.syntax == "Rust"
        ));

        match (&blocks[1], &blocks[2]) {
            (Block::Diagram(first), Block::Diagram(second)) => {
                assert_eq!(first.index, 0);
                assert_eq!(first.kind, DiagramKind::Mermaid);
                assert_eq!(first.source, "graph TD; A-->B\n");
                assert_eq!(second.index, 1);
                assert_eq!(second.kind, DiagramKind::Graphviz);
            }
            other => panic!("expected diagrams, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_lists_and_tasks() {
        let blocks = parse("- [x] done\n- [ ] todo\n  - child\n");
        let Block::List { ordered, items, .. } = &blocks[0] else {
            panic!("expected list, got {:?}", blocks[0]);
        };
        assert!(!ordered);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].checkbox, Some(true));
        assert_eq!(items[1].checkbox, Some(false));
        assert!(items[1]
            .blocks
            .iter()
            .any(|b| matches!(b, Block::List { items, .. } if items.len() == 1)));
    }

    #[test]
    fn test_quote_and_table() {
        let blocks = parse("> quoted\n\n| a | b |\n|:-:|--:|\n| 1 | 2 |\n");
        assert!(matches!(&blocks[0], Block::Quote { blocks } if blocks.len() == 1));

        let Block::Table {
            alignments,
            headers,
            rows,
        } = &blocks[1]
        else {
            panic!("expected table, got {:?}", blocks[1]);
        };
        assert_eq!(alignments, &[TableAlignment::Center, TableAlignment::Right]);
        assert_eq!(plain_text(&headers[0]), "a");
        assert_eq!(rows.len(), 1);
        assert_eq!(plain_text(&rows[0][1]), "2");
    }

    #[test]
    fn test_links_and_images() {
        let blocks = parse("See [docs](https://example.com) and ![logo](logo.png \"Logo\")");
        let Block::Paragraph { content } = &blocks[0] else {
            panic!("expected paragraph");
        };

        assert!(content.iter().any(|i| matches!(
            i,
            Inline::Text { text, link: Some(url), .. } if text == "docs" && url == "https://example.com"
        )));
        assert!(content.contains(&Inline::Image {
            alt: "logo".to_string(),
            url: "logo.png".to_string(),
            title: Some("Logo".to_string()),
        }));
    }
}
