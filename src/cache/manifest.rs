//! The offline manifest baked into the binary
//!
//! Bump [`GENERATION`] whenever [`MANIFEST`] changes: the generation name is
//! the only thing that invalidates records stored by an older build.

use url::Url;

/// Name of the current cache generation
pub const GENERATION: &str = "markview-v1";

/// Stylesheet inlined into HTML exports with the dark theme
pub const EXPORT_STYLESHEET_DARK: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/github-markdown-css/5.5.1/github-markdown-dark.min.css";

/// Stylesheet inlined into HTML exports with the light theme
pub const EXPORT_STYLESHEET_LIGHT: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/github-markdown-css/5.5.1/github-markdown-light.min.css";

/// Client-side diagram script embedded in HTML exports
pub const EXPORT_DIAGRAM_SCRIPT: &str =
    "https://cdn.jsdelivr.net/npm/mermaid@10.9.1/dist/mermaid.min.js";

/// Pre-populated resources, in install order
pub const MANIFEST: &[&str] = &[
    EXPORT_STYLESHEET_DARK,
    EXPORT_STYLESHEET_LIGHT,
    EXPORT_DIAGRAM_SCRIPT,
];

/// Parse the static manifest
pub fn manifest_urls() -> Vec<Url> {
    MANIFEST
        .iter()
        .filter_map(|entry| match Url::parse(entry) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::error!("Invalid manifest entry {}: {}", entry, e);
                None
            }
        })
        .collect()
}
