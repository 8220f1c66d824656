//! Field/scope registry
//!
//! Every piece of block state is a declared field bound to one of four
//! scopes. Field names and event names are unique across all block
//! types; a declaration that would give either a second meaning fails.

use crate::error::BlockError;
use heck::ToShoutySnakeCase;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// State partition a field lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    /// One slot per content instance, keyed by state key
    Component,
    /// One slot per block type, keyed by tag
    ComponentSetting,
    /// A single global slot
    System,
    /// One slot per arbitrary key
    Storage,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Component => "component",
            Scope::ComponentSetting => "componentSetting",
            Scope::System => "system",
            Scope::Storage => "storage",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field as written in a block definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub scope: Scope,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            event_name: None,
            scope,
        }
    }

    pub fn with_event(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }

    fn info(&self) -> FieldInfo {
        FieldInfo {
            name: self.name.clone(),
            event_name: self
                .event_name
                .clone()
                .unwrap_or_else(|| default_event_name(&self.name)),
            scope: self.scope,
        }
    }
}

/// A registered field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub event_name: String,
    pub scope: Scope,
}

impl fmt::Display for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.event_name, self.scope)
    }
}

/// Event name used when a field does not declare one
///
/// ```
/// use blocklab_core::fields::default_event_name;
///
/// assert_eq!(default_event_name("value"), "UPDATE_VALUE");
/// assert_eq!(default_event_name("attemptCount"), "UPDATE_ATTEMPT_COUNT");
/// ```
pub fn default_event_name(name: &str) -> String {
    format!("UPDATE_{}", name.to_shouty_snake_case())
}

/// A declaration that collides with an existing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub existing: FieldInfo,
    pub requested: FieldInfo,
}

impl fmt::Display for FieldConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field {} conflicts with already declared {}",
            self.requested, self.existing
        )
    }
}

/// Fields returned by one declaration, by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(BTreeMap<String, FieldInfo>);

impl FieldSet {
    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.0.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Default)]
struct Table {
    by_name: HashMap<String, FieldInfo>,
    by_event: HashMap<String, FieldInfo>,
}

impl Table {
    fn conflict(&self, info: &FieldInfo) -> Option<FieldConflict> {
        let clash = |existing: Option<&FieldInfo>| {
            existing.filter(|e| *e != info).map(|e| FieldConflict {
                existing: e.clone(),
                requested: info.clone(),
            })
        };
        clash(self.by_name.get(&info.name)).or_else(|| clash(self.by_event.get(&info.event_name)))
    }

    fn insert(&mut self, info: FieldInfo) {
        self.by_event.insert(info.event_name.clone(), info.clone());
        self.by_name.insert(info.name.clone(), info);
    }
}

/// Global declaration table for state fields
#[derive(Debug, Default)]
pub struct FieldRegistry {
    table: RwLock<Table>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `specs`, all or nothing
    ///
    /// Redeclaring a field with the same event name and scope is a no-op.
    pub fn declare<'a>(&self, specs: impl IntoIterator<Item = &'a FieldSpec>) -> Result<FieldSet, BlockError> {
        let mut table = self.table.write();
        let mut batch = Table::default();
        let mut set = BTreeMap::new();

        for spec in specs {
            let info = spec.info();
            if let Some(conflict) = table.conflict(&info).or_else(|| batch.conflict(&info)) {
                tracing::warn!(%conflict, "field registration conflict");
                return Err(BlockError::FieldRegistrationConflict(conflict));
            }
            batch.insert(info.clone());
            set.insert(info.name.clone(), info);
        }

        for info in set.values() {
            table.insert(info.clone());
        }
        tracing::debug!(fields = set.len(), "declared fields");
        Ok(FieldSet(set))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<FieldInfo> {
        self.table.read().by_name.get(name).cloned()
    }

    pub fn lookup_by_event(&self, event_name: &str) -> Option<FieldInfo> {
        self.table.read().by_event.get(event_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every declaration
    pub fn reset(&self) {
        *self.table.write() = Table::default();
    }
}

static GLOBAL: Lazy<Arc<FieldRegistry>> = Lazy::new(|| Arc::new(FieldRegistry::new()));

/// Process-wide registry
pub fn global() -> Arc<FieldRegistry> {
    GLOBAL.clone()
}
