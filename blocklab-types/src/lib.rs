//! Shared types for blocklab
//!
//! This crate provides the content model used across the blocklab
//! ecosystem: content identities, parsed content nodes, locale variants
//! and the per-source id maps produced by the parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Content identity: names a node within a source's id map
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        ContentId(id.to_string())
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        ContentId(id)
    }
}

/// Name of a content layer ("content", "inline", "studio", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(pub String);

impl SourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Content loaded from the course files
    pub fn content() -> Self {
        Self::new("content")
    }

    /// Content embedded directly in a page
    pub fn inline() -> Self {
        Self::new("inline")
    }

    /// Content being edited in the authoring studio
    pub fn studio() -> Self {
        Self::new("studio")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceName {
    fn from(name: &str) -> Self {
        SourceName(name.to_string())
    }
}

/// A BCP-47 style language tag, normalized to lowercase with `-` separators
///
/// `en_US`, `EN-us` and `en-US` all normalize to `en-us`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LocaleCode(String);

impl LocaleCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().replace('_', "-").to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag (`pt` for `pt-br`)
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// True when both codes share a primary language subtag
    pub fn same_language(&self, other: &LocaleCode) -> bool {
        self.language() == other.language()
    }

    /// True for a bare language tag without region or script
    pub fn is_bare(&self) -> bool {
        !self.0.contains('-')
    }
}

impl fmt::Display for LocaleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LocaleCode {
    fn from(code: String) -> Self {
        LocaleCode::new(code)
    }
}

impl From<&str> for LocaleCode {
    fn from(code: &str) -> Self {
        LocaleCode::new(code)
    }
}

impl From<LocaleCode> for String {
    fn from(code: LocaleCode) -> Self {
        code.0
    }
}

/// Where a node came from (file path plus optional line)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Provenance {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path, line),
            None => f.write_str(&self.path),
        }
    }
}

/// Block attributes as parsed from markup
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// One entry in a node's ordered children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kid {
    /// Literal text
    Text { text: String },

    /// Reference to another node by content identity
    Ref { id: ContentId },

    /// Structural markup (paragraphs, emphasis, ...) that is not itself a block
    Markup {
        tag: String,
        #[serde(default)]
        attributes: Attributes,
        #[serde(default)]
        kids: Vec<Kid>,
    },
}

impl Kid {
    pub fn text(text: impl Into<String>) -> Self {
        Kid::Text { text: text.into() }
    }

    pub fn reference(id: impl Into<ContentId>) -> Self {
        Kid::Ref { id: id.into() }
    }

    pub fn markup(tag: impl Into<String>, kids: Vec<Kid>) -> Self {
        Kid::Markup {
            tag: tag.into(),
            attributes: Attributes::new(),
            kids,
        }
    }
}

/// A parsed block of content. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: ContentId,
    pub tag: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub kids: Vec<Kid>,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    /// Machine-authored (e.g. translated) rather than human-authored
    #[serde(default)]
    pub generated: bool,
}

impl ContentNode {
    pub fn new(id: impl Into<ContentId>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            attributes: Attributes::new(),
            kids: Vec::new(),
            provenance: Vec::new(),
            generated: false,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_kid(mut self, kid: Kid) -> Self {
        self.kids.push(kid);
        self
    }

    pub fn with_kids(mut self, kids: impl IntoIterator<Item = Kid>) -> Self {
        self.kids.extend(kids);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance.push(provenance);
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// All content identities referenced from this node's kids, in document order
    pub fn child_refs(&self) -> Vec<ContentId> {
        let mut refs = Vec::new();
        collect_refs(&self.kids, &mut refs);
        refs
    }
}

fn collect_refs(kids: &[Kid], out: &mut Vec<ContentId>) {
    for kid in kids {
        match kid {
            Kid::Ref { id } => out.push(id.clone()),
            Kid::Markup { kids, .. } => collect_refs(kids, out),
            Kid::Text { .. } => {}
        }
    }
}

/// Language renditions of one logical node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantMap {
    pub variants: BTreeMap<LocaleCode, Arc<ContentNode>>,
    /// The locale the content declares as its original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_locale: Option<LocaleCode>,
}

impl VariantMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding one variant, which is also the declared default
    pub fn single(locale: LocaleCode, node: ContentNode) -> Self {
        let mut map = Self::new();
        map.default_locale = Some(locale.clone());
        map.insert(locale, node);
        map
    }

    pub fn insert(&mut self, locale: LocaleCode, node: ContentNode) {
        self.variants.insert(locale, Arc::new(node));
    }

    pub fn with_default(mut self, locale: LocaleCode) -> Self {
        self.default_locale = Some(locale);
        self
    }

    pub fn get(&self, locale: &LocaleCode) -> Option<&Arc<ContentNode>> {
        self.variants.get(locale)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocaleCode, &Arc<ContentNode>)> {
        self.variants.iter()
    }

    pub fn locales(&self) -> impl Iterator<Item = &LocaleCode> {
        self.variants.keys()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Merge another map in; the other map's variants win on collision
    pub fn merge(&mut self, other: VariantMap) {
        self.variants.extend(other.variants);
        if other.default_locale.is_some() {
            self.default_locale = other.default_locale;
        }
    }
}

/// Content identity to locale variants, unique keys within one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMap {
    entries: BTreeMap<ContentId, VariantMap>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node as the `locale` variant of its id
    pub fn insert_node(&mut self, locale: LocaleCode, node: ContentNode) {
        let entry = self.entries.entry(node.id.clone()).or_default();
        if entry.default_locale.is_none() {
            entry.default_locale = Some(locale.clone());
        }
        entry.insert(locale, node);
    }

    pub fn insert_variants(&mut self, id: ContentId, variants: VariantMap) {
        self.entries.insert(id, variants);
    }

    pub fn with_node(mut self, locale: LocaleCode, node: ContentNode) -> Self {
        self.insert_node(locale, node);
        self
    }

    pub fn get(&self, id: &ContentId) -> Option<&VariantMap> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ContentId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContentId, &VariantMap)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for IdMap {
    type Item = (ContentId, VariantMap);
    type IntoIter = std::collections::btree_map::IntoIter<ContentId, VariantMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Output of the external parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedContent {
    pub root: ContentId,
    pub id_map: IdMap,
}
