//! Event-sourced block state
//!
//! State is only ever changed by applying a [`StateEvent`]. Writes go
//! through [`StateLayer::write`], which logs the event before applying it
//! with the same reducer [`StateStore::replay`] uses, so any state can be
//! rebuilt from its log.

use crate::fields::{FieldInfo, FieldRegistry, Scope};
use crate::ids::{StateKey, StatePrefix};
use blocklab_types::ContentId;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("field '{field}' is {scope}-scoped and needs {needs} to address its state")]
    MissingTarget {
        field: String,
        scope: Scope,
        needs: &'static str,
    },

    #[error("no field named '{0}' is declared")]
    UnknownField(String),

    #[error("no declared field emits event '{0}'")]
    UnknownEvent(String),

    #[error("invalid field reference '{0}', expected 'component.field'")]
    BadFieldRef(String),
}

/// Who a read or write is about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// State key of the instance (component and storage scopes)
    pub id: Option<StateKey>,
    /// Block type tag (component-setting scope)
    pub tag: Option<String>,
}

impl Target {
    /// No target; enough for system-scoped fields
    pub fn none() -> Self {
        Self::default()
    }

    pub fn id(key: impl Into<StateKey>) -> Self {
        Self {
            id: Some(key.into()),
            tag: None,
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            id: None,
            tag: Some(tag.into()),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Slot key inside the field's scope partition
    fn slot(&self, info: &FieldInfo) -> Result<Option<String>, StateError> {
        let missing = |needs| StateError::MissingTarget {
            field: info.name.clone(),
            scope: info.scope,
            needs,
        };
        match info.scope {
            Scope::Component | Scope::Storage => self
                .id
                .as_ref()
                .map(|key| Some(key.as_str().to_string()))
                .ok_or_else(|| missing("an id")),
            Scope::ComponentSetting => self.tag.clone().map(Some).ok_or_else(|| missing("a tag")),
            Scope::System => Ok(None),
        }
    }
}

/// One logged state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub event: String,
    pub field: String,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of state events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<StateEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StateEvent) {
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[StateEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

type Slots = BTreeMap<String, BTreeMap<String, Value>>;

/// Materialized state, one partition per scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateStore {
    component: Slots,
    component_setting: Slots,
    system: BTreeMap<String, Value>,
    storage: Slots,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, scope: Scope, slot: Option<&str>, field: &str) -> Option<&Value> {
        let keyed = match scope {
            Scope::System => return self.system.get(field),
            Scope::Component => &self.component,
            Scope::ComponentSetting => &self.component_setting,
            Scope::Storage => &self.storage,
        };
        keyed.get(slot.unwrap_or_default())?.get(field)
    }

    pub fn read(&self, info: &FieldInfo, target: &Target) -> Result<Option<Value>, StateError> {
        let slot = target.slot(info)?;
        Ok(self.get(info.scope, slot.as_deref(), &info.name).cloned())
    }

    /// Read with a fallback for state never written
    pub fn read_or(&self, info: &FieldInfo, target: &Target, fallback: Value) -> Result<Value, StateError> {
        Ok(self.read(info, target)?.unwrap_or(fallback))
    }

    /// The reducer
    pub fn apply(&mut self, event: &StateEvent) {
        let keyed = match event.scope {
            Scope::System => {
                self.system.insert(event.field.clone(), event.value.clone());
                return;
            }
            Scope::Component => &mut self.component,
            Scope::ComponentSetting => &mut self.component_setting,
            Scope::Storage => &mut self.storage,
        };
        keyed
            .entry(event.key.clone().unwrap_or_default())
            .or_default()
            .insert(event.field.clone(), event.value.clone());
    }

    /// Rebuild state from a log, checking every event against `registry`
    pub fn replay<'a>(
        registry: &FieldRegistry,
        events: impl IntoIterator<Item = &'a StateEvent>,
    ) -> Result<Self, StateError> {
        let mut store = Self::new();
        for event in events {
            let info = registry
                .lookup_by_event(&event.event)
                .ok_or_else(|| StateError::UnknownEvent(event.event.clone()))?;
            if info.scope != Scope::System && event.key.is_none() {
                return Err(StateError::MissingTarget {
                    field: info.name,
                    scope: info.scope,
                    needs: "a key",
                });
            }
            store.apply(&StateEvent {
                field: info.name,
                scope: info.scope,
                ..event.clone()
            });
        }
        Ok(store)
    }
}

/// A `component.field` reference found in content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub component: ContentId,
    pub field: String,
}

impl FieldRef {
    /// Split at the last separator, so prefixed component keys survive
    pub fn parse(raw: &str) -> Result<Self, StateError> {
        match raw.rsplit_once('.') {
            Some((component, field)) if !component.is_empty() && !field.is_empty() => Ok(Self {
                component: ContentId::new(component),
                field: field.to_string(),
            }),
            _ => Err(StateError::BadFieldRef(raw.to_string())),
        }
    }
}

/// Session state: the materialized store plus its event log
#[derive(Debug)]
pub struct StateLayer {
    fields: Arc<FieldRegistry>,
    store: RwLock<StateStore>,
    log: Mutex<EventLog>,
}

impl StateLayer {
    pub fn new(fields: Arc<FieldRegistry>) -> Self {
        Self {
            fields,
            store: RwLock::new(StateStore::new()),
            log: Mutex::new(EventLog::new()),
        }
    }

    pub fn field(&self, name: &str) -> Result<FieldInfo, StateError> {
        self.fields
            .lookup_by_name(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))
    }

    pub fn read(&self, info: &FieldInfo, target: &Target) -> Result<Option<Value>, StateError> {
        self.store.read().read(info, target)
    }

    pub fn read_or(&self, info: &FieldInfo, target: &Target, fallback: Value) -> Result<Value, StateError> {
        self.store.read().read_or(info, target, fallback)
    }

    /// Record and apply a change
    pub fn write(&self, info: &FieldInfo, value: Value, target: &Target) -> Result<StateEvent, StateError> {
        let event = StateEvent {
            event: info.event_name.clone(),
            field: info.name.clone(),
            scope: info.scope,
            key: target.slot(info)?,
            value,
            timestamp: Utc::now(),
        };
        tracing::debug!(event = %event.event, key = ?event.key, "state write");

        let mut log = self.log.lock();
        self.store.write().apply(&event);
        log.push(event.clone());
        Ok(event)
    }

    /// Resolve a cross-component reference relative to `prefix`
    pub fn resolve_ref(&self, reference: &FieldRef, prefix: &StatePrefix) -> Result<(FieldInfo, Target), StateError> {
        let info = self.field(&reference.field)?;
        Ok((info, Target::id(prefix.key(&reference.component))))
    }

    pub fn read_ref(&self, raw: &str, prefix: &StatePrefix) -> Result<Option<Value>, StateError> {
        let (info, target) = self.resolve_ref(&FieldRef::parse(raw)?, prefix)?;
        self.read(&info, &target)
    }

    pub fn log(&self) -> EventLog {
        self.log.lock().clone()
    }

    pub fn snapshot(&self) -> StateStore {
        self.store.read().clone()
    }

    /// Replace all state with the replay of `log`
    pub fn restore(&self, log: EventLog) -> Result<(), StateError> {
        let store = StateStore::replay(&self.fields, log.iter())?;
        let mut current = self.log.lock();
        *self.store.write() = store;
        *current = log;
        tracing::info!(events = current.len(), "restored state from log");
        Ok(())
    }
}
