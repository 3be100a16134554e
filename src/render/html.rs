//! Standalone HTML export

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Parser, Tag, TagEnd};
use url::Url;

use super::blocks::parser_options;
use super::diagram::{diagram_url, escape_markup, DiagramKind};
use super::highlight::SyntaxHighlighter;
use super::RenderError;
use crate::cache::manifest::{
    EXPORT_DIAGRAM_SCRIPT, EXPORT_STYLESHEET_DARK, EXPORT_STYLESHEET_LIGHT,
};
use crate::core::config::Theme;

/// Assets inlined into the exported page when the cache could supply them
#[derive(Debug, Clone, Default)]
pub struct ExportAssets {
    pub stylesheet: Option<String>,
    pub diagram_script: Option<String>,
}

/// Stylesheet URL for a theme
pub fn stylesheet_url(theme: Theme) -> &'static str {
    match theme {
        Theme::Dark => EXPORT_STYLESHEET_DARK,
        Theme::Light => EXPORT_STYLESHEET_LIGHT,
    }
}

/// Page body: markdown converted with highlighted code and diagram placeholders.
///
/// Returns the markup and whether any mermaid diagram needs the script.
pub fn body_markup(
    source: &str,
    theme: Theme,
    highlighter: &SyntaxHighlighter,
    diagram_server: &Url,
) -> Result<(String, bool), RenderError> {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut code: Option<(Option<String>, String)> = None;
    let mut needs_script = false;

    for event in Parser::new_ext(source, parser_options()) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().map(str::to_string)
                    }
                    CodeBlockKind::Indented => None,
                };
                code = Some((language, String::new()));
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, buffer)) = code.as_mut() {
                    buffer.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                let Some((language, text)) = code.take() else {
                    continue;
                };
                let markup = match language.as_deref().and_then(DiagramKind::from_tag) {
                    Some(DiagramKind::Mermaid) => {
                        needs_script = true;
                        format!("<pre class=\"mermaid\">{}</pre>\n", escape_markup(&text))
                    }
                    Some(kind) => {
                        let url = diagram_url(diagram_server, kind, &text, theme)?;
                        format!(
                            "<figure class=\"diagram\"><img src=\"{}\" alt=\"{} diagram\"></figure>\n",
                            escape_markup(url.as_str()),
                            kind.engine_name()
                        )
                    }
                    None => highlighter.highlight_html(&text, language.as_deref(), theme)?,
                };
                events.push(Event::Html(CowStr::from(markup)));
            }
            // Line breaks inside paragraphs are kept, as in the viewer
            Event::SoftBreak => events.push(Event::HardBreak),
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(source.len() * 2);
    html::push_html(&mut out, events.into_iter());
    Ok((out, needs_script))
}

fn inline_script(script: &str) -> String {
    script.replace("</script", "<\\/script")
}

/// Complete HTML document for a markdown source
pub fn export_html(
    source: &str,
    title: &str,
    theme: Theme,
    highlighter: &SyntaxHighlighter,
    diagram_server: &Url,
    assets: &ExportAssets,
) -> Result<String, RenderError> {
    let (body, needs_script) = body_markup(source, theme, highlighter, diagram_server)?;

    let stylesheet = match &assets.stylesheet {
        Some(css) => format!("<style>\n{css}\n</style>"),
        None => format!("<link rel=\"stylesheet\" href=\"{}\">", stylesheet_url(theme)),
    };

    let script = if needs_script {
        let loader = match &assets.diagram_script {
            Some(js) => format!("<script>\n{}\n</script>", inline_script(js)),
            None => format!("<script src=\"{EXPORT_DIAGRAM_SCRIPT}\"></script>"),
        };
        let mermaid_theme = match theme {
            Theme::Dark => "dark",
            Theme::Light => "default",
        };
        format!(
            "{loader}\n<script>mermaid.initialize({{ startOnLoad: true, theme: '{mermaid_theme}' }});</script>\n"
        )
    } else {
        String::new()
    };

    Ok(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title}</title>\n{stylesheet}\n\
<style>.markdown-body {{ box-sizing: border-box; max-width: 980px; margin: 0 auto; padding: 45px; }}</style>\n\
</head>\n<body class=\"markdown-body\">\n{body}{script}</body>\n</html>\n",
        title = escape_markup(title),
    ))
}
