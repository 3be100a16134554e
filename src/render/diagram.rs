//! Diagram blocks and the request URLs for the external diagram engine
//!
//! The engine speaks the Kroki GET protocol:
//! `{server}/{kind}/svg/{base64url(zlib(source))}`.

use std::io::Write;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use url::Url;

use crate::core::config::Theme;

/// Diagram languages routed to the diagram engine instead of the highlighter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramKind {
    Mermaid,
    PlantUml,
    Graphviz,
}

impl DiagramKind {
    /// Match a fenced block's language tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "mermaid" => Some(Self::Mermaid),
            "plantuml" | "puml" => Some(Self::PlantUml),
            "graphviz" | "dot" => Some(Self::Graphviz),
            _ => None,
        }
    }

    /// Path segment used by the engine
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Mermaid => "mermaid",
            Self::PlantUml => "plantuml",
            Self::Graphviz => "graphviz",
        }
    }
}

/// Escape text so it can be embedded literally in HTML
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Source as sent to the engine: mermaid gets a theme directive unless it
/// already declares one
pub fn themed_source(kind: DiagramKind, source: &str, theme: Theme) -> String {
    if kind != DiagramKind::Mermaid || source.trim_start().starts_with("%%{init") {
        return source.to_string();
    }
    let name = match theme {
        Theme::Dark => "dark",
        Theme::Light => "default",
    };
    format!("%%{{init: {{'theme': '{name}'}}}}%%\n{source}")
}

/// Compress and encode a diagram source for a GET request
pub fn encode_payload(source: &str) -> std::io::Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(URL_SAFE.encode(compressed))
}

/// GET URL that renders `source` as SVG
pub fn diagram_url(
    server: &Url,
    kind: DiagramKind,
    source: &str,
    theme: Theme,
) -> std::io::Result<Url> {
    let payload = encode_payload(&themed_source(kind, source, theme))?;
    let mut url = server.clone();
    url.path_segments_mut()
        .map_err(|_| std::io::Error::other(format!("{server} cannot be a base URL")))?
        .pop_if_empty()
        .extend([kind.engine_name(), "svg", payload.as_str()]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    #[test]
    fn test_tags() {
        assert_eq!(DiagramKind::from_tag("mermaid"), Some(DiagramKind::Mermaid));
        assert_eq!(DiagramKind::from_tag(" Dot "), Some(DiagramKind::Graphviz));
        assert_eq!(DiagramKind::from_tag("puml"), Some(DiagramKind::PlantUml));
        assert_eq!(DiagramKind::from_tag("rust"), None);
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(
            escape_markup(r#"A-->B & <script>"x"</script>"#),
            "A--&gt;B &amp; &lt;script&gt;&quot;x&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_theme_directive() {
        let dark = themed_source(DiagramKind::Mermaid, "graph TD; A-->B", Theme::Dark);
        assert!(dark.starts_with("%%{init: {'theme': 'dark'}}%%\n"));

        let declared = "%%{init: {'theme': 'forest'}}%%\ngraph TD; A-->B";
        assert_eq!(themed_source(DiagramKind::Mermaid, declared, Theme::Dark), declared);

        assert_eq!(
            themed_source(DiagramKind::Graphviz, "digraph { a -> b }", Theme::Dark),
            "digraph { a -> b }"
        );
    }

    #[test]
    fn test_payload_decodes() {
        let payload = encode_payload("digraph { a -> b }").unwrap();
        let compressed = URL_SAFE.decode(payload).unwrap();
        let mut decoded = String::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "digraph { a -> b }");
    }

    #[test]
    fn test_url_shape() {
        let server = Url::parse("https://kroki.io/").unwrap();
        let url = diagram_url(&server, DiagramKind::Graphviz, "digraph {}", Theme::Light).unwrap();
        let segments: Vec<_> = url.path_segments().unwrap().collect();
        assert_eq!(segments[0], "graphviz");
        assert_eq!(segments[1], "svg");
        assert_eq!(segments.len(), 3);

        let dark = diagram_url(&server, DiagramKind::Mermaid, "graph TD", Theme::Dark).unwrap();
        let light = diagram_url(&server, DiagramKind::Mermaid, "graph TD", Theme::Light).unwrap();
        assert_ne!(dark, light);
    }
}
