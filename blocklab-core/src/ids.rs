//! State keys and structural prefixes
//!
//! Content identity names *what* to render; the state key names *where*
//! an instance keeps its state. Repeated structures (list iterations,
//! attempts) nest prefix segments so the same content id rendered twice
//! gets two independent state slots.

use blocklab_types::ContentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Joins prefix segments and the base id
pub const SEPARATOR: char = '.';

/// Leading marker of an absolute id, which ignores the enclosing prefix
pub const ABSOLUTE_MARKER: char = '/';

/// True for ids written in the absolute form (`/glossary`)
pub fn is_absolute(id: &str) -> bool {
    id.starts_with(ABSOLUTE_MARKER)
}

/// The content identity an id refers to, with any absolute marker removed
pub fn content_id(id: &ContentId) -> ContentId {
    match id.as_str().strip_prefix(ABSOLUTE_MARKER) {
        Some(bare) => ContentId::new(bare),
        None => id.clone(),
    }
}

/// Accumulated structural context of an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePrefix(String);

impl StatePrefix {
    /// The empty prefix of top-level content
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Descend into a repeated context
    pub fn nest(&self, segment: impl fmt::Display) -> Self {
        Self(join(&self.0, &segment.to_string()))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// State key of `id` in this context
    ///
    /// ```
    /// use blocklab_core::ids::StatePrefix;
    ///
    /// assert_eq!(StatePrefix::root().key(&"item".into()).as_str(), "item");
    /// assert_eq!(StatePrefix::new("1").key(&"item".into()).as_str(), "1.item");
    /// assert_eq!(StatePrefix::new("1").key(&"/menu".into()).as_str(), "menu");
    /// ```
    pub fn key(&self, id: &ContentId) -> StateKey {
        match id.as_str().strip_prefix(ABSOLUTE_MARKER) {
            Some(bare) => StateKey(bare.to_string()),
            None => StateKey(join(&self.0, id.as_str())),
        }
    }
}

impl fmt::Display for StatePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn join(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{rest}")
    }
}

/// Composite key addressing one instance's state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix this instance's children are keyed under
    pub fn as_prefix(&self) -> StatePrefix {
        StatePrefix(self.0.clone())
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        StateKey(key.to_string())
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        StateKey(key)
    }
}
