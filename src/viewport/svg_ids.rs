//! Element id rewriting for duplicated SVG documents
//!
//! Two copies of one SVG shown at once would share ids, so `url(#...)` and
//! `href="#..."` references in either copy could resolve into the other.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

static ID_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\sid\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap());

static ID_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z_][\w\-]*)").unwrap());

fn captured_id<'h>(caps: &Captures<'h>) -> &'h str {
    caps.get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// All element ids declared in an SVG document, in order of appearance
pub fn element_ids(svg: &str) -> Vec<String> {
    ID_ATTRIBUTE
        .captures_iter(svg)
        .map(|caps| captured_id(&caps).to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Copy of `svg` with every declared id, and every `#id` reference to one,
/// suffixed with `suffix`
pub fn clone_with_suffix(svg: &str, suffix: &str) -> String {
    let known: HashSet<String> = element_ids(svg).into_iter().collect();
    if known.is_empty() {
        return svg.to_string();
    }

    let renamed = ID_ATTRIBUTE.replace_all(svg, |caps: &Captures<'_>| {
        let id = captured_id(caps);
        if id.is_empty() {
            caps[0].to_string()
        } else {
            format!("{}\"{}{}\"", &caps[1], id, suffix)
        }
    });

    ID_REFERENCE
        .replace_all(&renamed, |caps: &Captures<'_>| {
            if known.contains(&caps[1]) {
                format!("#{}{}", &caps[1], suffix)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r##"<svg id="graph-1" xmlns="http://www.w3.org/2000/svg">
<style>#graph-1 .node { fill: #fff; }</style>
<defs><marker id='arrow'><path d="M0,0"/></marker></defs>
<g data-id="ignored"><path marker-end="url(#arrow)"/><use href="#node-a"/></g>
<rect id="node-a" fill="#abcdef"/>
</svg>"##;

    #[test]
    fn test_element_ids() {
        assert_eq!(element_ids(SVG), vec!["graph-1", "arrow", "node-a"]);
    }

    #[test]
    fn test_clone_ids_are_disjoint() {
        let clone = clone_with_suffix(SVG, "-fs");

        let original: HashSet<_> = element_ids(SVG).into_iter().collect();
        let cloned: HashSet<_> = element_ids(&clone).into_iter().collect();
        assert_eq!(cloned.len(), original.len());
        assert!(original.is_disjoint(&cloned));
        assert!(cloned.contains("arrow-fs"));
    }

    #[test]
    fn test_references_follow_ids() {
        let clone = clone_with_suffix(SVG, "-fs");
        assert!(clone.contains("url(#arrow-fs)"));
        assert!(clone.contains(r##"href="#node-a-fs""##));
        assert!(clone.contains("#graph-1-fs .node"));
        // Colors and unrelated attributes stay as they were
        assert!(clone.contains("fill: #fff"));
        assert!(clone.contains(r##"fill="#abcdef""##));
        assert!(clone.contains(r#"data-id="ignored""#));
    }

    #[test]
    fn test_original_untouched() {
        let before = SVG.to_string();
        let _clone = clone_with_suffix(SVG, "-fs");
        assert_eq!(SVG, before);
        assert_eq!(clone_with_suffix("<svg/>", "-x"), "<svg/>");
    }
}
