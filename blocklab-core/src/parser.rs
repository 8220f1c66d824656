//! Parser contract
//!
//! Markup grammars live outside the engine. Anything that can turn raw
//! input into a [`ParsedContent`] graph implements [`ContentParser`];
//! [`JsonContentParser`] accepts graphs that were already parsed and
//! serialized.

use crate::error::BlockError;
use blocklab_types::{ContentNode, IdMap, ParsedContent, Provenance};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves references written relative to the document being parsed
pub trait RelativeRefs {
    fn resolve(&self, reference: &str) -> String;
}

/// Leaves every reference untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelativeRefs;

impl RelativeRefs for NoRelativeRefs {
    fn resolve(&self, reference: &str) -> String {
        reference.to_string()
    }
}

/// Resolves against the directory of a base file
#[derive(Debug, Clone)]
pub struct PathRelativeRefs {
    base_dir: PathBuf,
}

impl PathRelativeRefs {
    pub fn new(base_file: impl AsRef<Path>) -> Self {
        let base_dir = base_file
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { base_dir }
    }
}

impl RelativeRefs for PathRelativeRefs {
    fn resolve(&self, reference: &str) -> String {
        if reference.contains("://") || reference.starts_with('/') || reference.starts_with('#') {
            return reference.to_string();
        }
        let reference = reference.strip_prefix("./").unwrap_or(reference);
        self.base_dir.join(reference).to_string_lossy().into_owned()
    }
}

pub trait ContentParser {
    fn parse(&self, raw: &str, provenance: &Provenance, refs: &dyn RelativeRefs) -> Result<ParsedContent, BlockError>;
}

/// Attributes holding references to other files
const REF_ATTRIBUTES: &[&str] = &["src", "href"];

/// Parser for graphs serialized as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContentParser;

impl JsonContentParser {
    pub fn new() -> Self {
        Self
    }
}

impl ContentParser for JsonContentParser {
    fn parse(&self, raw: &str, provenance: &Provenance, refs: &dyn RelativeRefs) -> Result<ParsedContent, BlockError> {
        let failure = |message: String| BlockError::ParseFailure {
            provenance: provenance.to_string(),
            message,
        };

        let mut parsed: ParsedContent = serde_json::from_str(raw).map_err(|e| failure(e.to_string()))?;

        let mut id_map = IdMap::new();
        for (id, mut variants) in std::mem::take(&mut parsed.id_map) {
            for (locale, node) in variants.variants.iter_mut() {
                if node.id != id {
                    return Err(failure(format!(
                        "node '{}' is filed under id '{id}' ({locale})",
                        node.id
                    )));
                }
                finish_node(Arc::make_mut(node), provenance, refs);
            }
            id_map.insert_variants(id, variants);
        }

        if !id_map.contains(&parsed.root) {
            return Err(failure(format!("root '{}' is not in the id map", parsed.root)));
        }

        tracing::debug!(%provenance, nodes = id_map.len(), root = %parsed.root, "parsed content");
        Ok(ParsedContent {
            root: parsed.root,
            id_map,
        })
    }
}

fn finish_node(node: &mut ContentNode, provenance: &Provenance, refs: &dyn RelativeRefs) {
    if node.provenance.is_empty() {
        node.provenance.push(provenance.clone());
    }
    for name in REF_ATTRIBUTES {
        if let Some(Value::String(reference)) = node.attributes.get_mut(*name) {
            *reference = refs.resolve(reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocklab_types::LocaleCode;
    use serde_json::json;

    fn raw() -> String {
        json!({
            "root": "page",
            "id_map": {
                "page": { "variants": { "en": {
                    "id": "page",
                    "tag": "Vertical",
                    "kids": [{ "type": "ref", "id": "fig" }]
                }}},
                "fig": { "variants": { "en": {
                    "id": "fig",
                    "tag": "Image",
                    "attributes": { "src": "img/cell.png" },
                    "provenance": [{ "path": "shared/figures.json", "line": 3 }]
                }}}
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_stamps_provenance_and_resolves_refs() {
        let provenance = Provenance::new("course/unit1/page.json");
        let refs = PathRelativeRefs::new("course/unit1/page.json");
        let parsed = JsonContentParser::new().parse(&raw(), &provenance, &refs).unwrap();

        assert_eq!(parsed.root.as_str(), "page");
        let en = LocaleCode::new("en");
        let page = parsed.id_map.get(&"page".into()).unwrap().get(&en).unwrap();
        assert_eq!(page.provenance, vec![provenance.clone()]);

        let fig = parsed.id_map.get(&"fig".into()).unwrap().get(&en).unwrap();
        assert_eq!(fig.provenance[0].path, "shared/figures.json");
        assert_eq!(fig.attributes["src"], json!("course/unit1/img/cell.png"));
    }

    #[test]
    fn test_absolute_refs_untouched() {
        let refs = PathRelativeRefs::new("course/page.json");
        assert_eq!(refs.resolve("https://example.com/a.png"), "https://example.com/a.png");
        assert_eq!(refs.resolve("/static/a.png"), "/static/a.png");
        assert_eq!(refs.resolve("./a.png"), "course/a.png");
        assert_eq!(NoRelativeRefs.resolve("a.png"), "a.png");
    }

    #[test]
    fn test_malformed_input_is_parse_failure() {
        let err = JsonContentParser::new()
            .parse("{ not json", &Provenance::new("bad.json").at_line(1), &NoRelativeRefs)
            .unwrap_err();
        assert_eq!(err.name(), "ParseFailure");
        assert!(err.to_string().starts_with("failed to parse bad.json:1"));
    }

    #[test]
    fn test_missing_root_and_mismatched_ids() {
        let missing_root = json!({ "root": "nowhere", "id_map": {} }).to_string();
        assert!(JsonContentParser::new()
            .parse(&missing_root, &Provenance::new("a.json"), &NoRelativeRefs)
            .is_err());

        let mismatched = json!({
            "root": "a",
            "id_map": { "a": { "variants": { "en": { "id": "b", "tag": "Markdown" } } } }
        })
        .to_string();
        let err = JsonContentParser::new()
            .parse(&mismatched, &Provenance::new("a.json"), &NoRelativeRefs)
            .unwrap_err();
        assert!(matches!(err, BlockError::ParseFailure { .. }));
    }
}
