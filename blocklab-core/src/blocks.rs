//! Block type capability registry
//!
//! A block type is looked up once per tag and carries everything the
//! engine needs to know about it: its fields, attribute schema, whether
//! it grades or takes input, and whether it repeats its children.

use crate::error::BlockError;
use crate::fields::{FieldRegistry, FieldSet, FieldSpec, Scope};
use blocklab_types::{Attributes, ContentNode};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// JSON type an attribute must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKind {
    String,
    Number,
    Integer,
    Boolean,
    Any,
}

impl AttrKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            AttrKind::String => value.is_string(),
            AttrKind::Number => value.is_number(),
            AttrKind::Integer => value.is_i64() || value.is_u64(),
            AttrKind::Boolean => value.is_boolean(),
            AttrKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrSpec {
    pub kind: AttrKind,
    #[serde(default)]
    pub required: bool,
    /// Allowed values; empty means unrestricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Value>,
}

impl AttrSpec {
    pub fn new(kind: AttrKind) -> Self {
        Self {
            kind,
            required: false,
            one_of: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.one_of = values.into_iter().collect();
        self
    }
}

/// Attributes a block accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub attributes: BTreeMap<String, AttrSpec>,
    /// Accept attributes the schema does not name
    #[serde(default)]
    pub open: bool,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, spec: AttrSpec) -> Self {
        self.attributes.insert(name.into(), spec);
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    /// Check `attributes`, returning the offending attribute and reason
    pub fn check(&self, attributes: &Attributes) -> Result<(), (String, String)> {
        for (name, spec) in &self.attributes {
            match attributes.get(name) {
                None if spec.required => return Err((name.clone(), "required attribute is missing".into())),
                None => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err((name.clone(), format!("expected {:?}, found {value}", spec.kind)))
                }
                Some(value) if !spec.one_of.is_empty() && !spec.one_of.contains(value) => {
                    return Err((name.clone(), format!("{value} is not an allowed value")))
                }
                Some(_) => {}
            }
        }
        if !self.open {
            if let Some(unknown) = attributes.keys().find(|k| !self.attributes.contains_key(*k)) {
                return Err((unknown.clone(), "unknown attribute".into()));
            }
        }
        Ok(())
    }

    /// Validate a node's attributes
    pub fn validate(&self, node: &ContentNode) -> Result<(), BlockError> {
        self.check(&node.attributes)
            .map_err(|(attribute, reason)| BlockError::AttributeValidation {
                id: node.id.clone(),
                tag: node.tag.clone(),
                attribute,
                reason,
            })
    }
}

/// How a block instantiates its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Repeat {
    /// Children instantiated `attributes[attribute]` times, one prefix segment per iteration
    Count { attribute: String },
    /// Children re-scoped per attempt, the attempt number read from `field`
    Attempts { field: String },
}

/// Capability record of one block type
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDescriptor {
    pub tag: String,
    pub fields: Vec<FieldSpec>,
    pub attribute_schema: Option<AttributeSchema>,
    pub is_grader: bool,
    pub is_input: bool,
    pub repeat: Option<Repeat>,
    field_set: FieldSet,
}

impl BlockDescriptor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Vec::new(),
            attribute_schema: None,
            is_grader: false,
            is_input: false,
            repeat: None,
            field_set: FieldSet::default(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn schema(mut self, schema: AttributeSchema) -> Self {
        self.attribute_schema = Some(schema);
        self
    }

    pub fn grader(mut self) -> Self {
        self.is_grader = true;
        self
    }

    pub fn input(mut self) -> Self {
        self.is_input = true;
        self
    }

    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = Some(repeat);
        self
    }

    /// Registered fields; empty until the descriptor is registered
    pub fn field_set(&self) -> &FieldSet {
        &self.field_set
    }

    pub fn validate(&self, node: &ContentNode) -> Result<(), BlockError> {
        match &self.attribute_schema {
            Some(schema) => schema.validate(node),
            None => Ok(()),
        }
    }

    fn same_definition(&self, other: &BlockDescriptor) -> bool {
        self.tag == other.tag
            && self.fields == other.fields
            && self.attribute_schema == other.attribute_schema
            && self.is_grader == other.is_grader
            && self.is_input == other.is_input
            && self.repeat == other.repeat
    }

    fn check(&self) -> Result<(), BlockError> {
        let invalid = |reason: String| BlockError::InvalidDescriptor {
            tag: self.tag.clone(),
            reason,
        };
        if self.tag.is_empty() {
            return Err(invalid("tag is empty".into()));
        }
        if let Some(Repeat::Attempts { field }) = &self.repeat {
            match self.fields.iter().find(|f| &f.name == field) {
                Some(spec) if spec.scope == Scope::Component => {}
                Some(_) => return Err(invalid(format!("attempt field '{field}' must be component-scoped"))),
                None => return Err(invalid(format!("attempt field '{field}' is not declared"))),
            }
        }
        Ok(())
    }
}

/// Tag to capability table
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: DashMap<String, Arc<BlockDescriptor>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block type and declare its fields
    ///
    /// Registering an identical definition again returns the existing
    /// record; a different definition under the same tag is rejected.
    pub fn register(&self, descriptor: BlockDescriptor, fields: &FieldRegistry) -> Result<Arc<BlockDescriptor>, BlockError> {
        descriptor.check()?;

        match self.blocks.entry(descriptor.tag.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().same_definition(&descriptor) {
                    Ok(existing.get().clone())
                } else {
                    tracing::warn!(tag = %descriptor.tag, "conflicting block registration");
                    Err(BlockError::BlockRegistrationConflict { tag: descriptor.tag })
                }
            }
            Entry::Vacant(slot) => {
                let field_set = fields.declare(&descriptor.fields)?;
                let descriptor = Arc::new(BlockDescriptor { field_set, ..descriptor });
                tracing::debug!(tag = %descriptor.tag, fields = descriptor.field_set.len(), "registered block type");
                slot.insert(descriptor.clone());
                Ok(descriptor)
            }
        }
    }

    pub fn get(&self, tag: &str) -> Option<Arc<BlockDescriptor>> {
        self.blocks.get(tag).map(|entry| entry.value().clone())
    }

    /// Capability record for `node`'s tag
    pub fn lookup(&self, node: &ContentNode) -> Result<Arc<BlockDescriptor>, BlockError> {
        self.get(&node.tag).ok_or_else(|| BlockError::UnknownBlockType {
            id: node.id.clone(),
            tag: node.tag.clone(),
        })
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.blocks.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn reset(&self) {
        self.blocks.clear();
    }
}

static GLOBAL: Lazy<Arc<BlockRegistry>> = Lazy::new(|| Arc::new(BlockRegistry::new()));

/// Process-wide registry
pub fn global() -> Arc<BlockRegistry> {
    GLOBAL.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocklab_types::ContentId;
    use serde_json::json;

    fn text_input() -> BlockDescriptor {
        BlockDescriptor::new("TextInput")
            .field(FieldSpec::new("value", Scope::Component))
            .schema(
                AttributeSchema::new()
                    .attribute("size", AttrSpec::new(AttrKind::Integer))
                    .attribute("mode", AttrSpec::new(AttrKind::String).one_of([json!("short"), json!("long")])),
            )
            .input()
    }

    #[test]
    fn test_register_declares_fields() {
        let fields = FieldRegistry::new();
        let blocks = BlockRegistry::new();

        let desc = blocks.register(text_input(), &fields).unwrap();
        assert!(desc.is_input);
        assert_eq!(desc.field_set().get("value").unwrap().event_name, "UPDATE_VALUE");
        assert!(fields.lookup_by_name("value").is_some());
        assert_eq!(blocks.tags(), vec!["TextInput".to_string()]);
    }

    #[test]
    fn test_duplicate_registration() {
        let fields = FieldRegistry::new();
        let blocks = BlockRegistry::new();

        let first = blocks.register(text_input(), &fields).unwrap();
        let again = blocks.register(text_input(), &fields).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let err = blocks.register(text_input().grader(), &fields).unwrap_err();
        assert_eq!(err, BlockError::BlockRegistrationConflict { tag: "TextInput".into() });
    }

    #[test]
    fn test_field_conflict_blocks_registration() {
        let fields = FieldRegistry::new();
        let blocks = BlockRegistry::new();
        blocks.register(text_input(), &fields).unwrap();

        let other = BlockDescriptor::new("Slider").field(FieldSpec::new("value", Scope::Storage));
        assert!(matches!(
            blocks.register(other, &fields),
            Err(BlockError::FieldRegistrationConflict(_))
        ));
        assert!(blocks.get("Slider").is_none());
    }

    #[test]
    fn test_attempt_field_must_be_declared() {
        let fields = FieldRegistry::new();
        let blocks = BlockRegistry::new();

        let practice = BlockDescriptor::new("Practice").repeat(Repeat::Attempts { field: "attempt".into() });
        assert!(matches!(
            blocks.register(practice, &fields),
            Err(BlockError::InvalidDescriptor { .. })
        ));

        let practice = BlockDescriptor::new("Practice")
            .field(FieldSpec::new("attempt", Scope::Component))
            .repeat(Repeat::Attempts { field: "attempt".into() });
        assert!(blocks.register(practice, &fields).is_ok());
    }

    #[test]
    fn test_attribute_validation() {
        let desc = text_input();
        let ok = ContentNode::new("q1", "TextInput").with_attribute("size", json!(3));
        assert!(desc.validate(&ok).is_ok());

        let wrong_type = ContentNode::new("q1", "TextInput").with_attribute("size", json!("big"));
        let err = desc.validate(&wrong_type).unwrap_err();
        assert_eq!(err.name(), "AttributeValidationError");
        assert_eq!(err.content_id(), Some(&ContentId::from("q1")));

        let unknown = ContentNode::new("q1", "TextInput").with_attribute("color", json!("red"));
        assert!(desc.validate(&unknown).is_err());

        let not_allowed = ContentNode::new("q1", "TextInput").with_attribute("mode", json!("huge"));
        assert!(desc.validate(&not_allowed).is_err());
    }

    #[test]
    fn test_lookup_unknown_tag() {
        let blocks = BlockRegistry::new();
        let err = blocks.lookup(&ContentNode::new("x", "Mystery")).unwrap_err();
        assert_eq!(
            err,
            BlockError::UnknownBlockType {
                id: "x".into(),
                tag: "Mystery".into()
            }
        );
    }
}
