//! Error taxonomy for content resolution and block definitions.

use crate::fields::FieldConflict;
use blocklab_types::{ContentId, SourceName};
use thiserror::Error;

/// Errors raised while resolving content or defining blocks
///
/// Cloneable: a rejected render future hands the same error to every
/// reader.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("no content found for id '{id}'")]
    MissingContentId { id: ContentId },

    #[error("'{id}' uses unknown block type '{tag}'")]
    UnknownBlockType { id: ContentId, tag: String },

    #[error("invalid attribute '{attribute}' on '{id}' ({tag}): {reason}")]
    AttributeValidation {
        id: ContentId,
        tag: String,
        attribute: String,
        reason: String,
    },

    #[error("{0}")]
    FieldRegistrationConflict(FieldConflict),

    #[error("failed to parse {provenance}: {message}")]
    ParseFailure { provenance: String, message: String },

    #[error("no language variant of '{id}' is available")]
    LocaleUnavailable { id: ContentId },

    #[error("loading '{id}' from source '{source_name}' failed: {message}")]
    LoadFailed {
        id: ContentId,
        source_name: SourceName,
        message: String,
    },

    #[error("'{id}' contains itself")]
    CyclicReference { id: ContentId },

    #[error("block type '{tag}' is already registered with a different definition")]
    BlockRegistrationConflict { tag: String },

    #[error("invalid block definition '{tag}': {reason}")]
    InvalidDescriptor { tag: String, reason: String },
}

impl BlockError {
    /// Stable variant name, used as the `name` of inline error displays
    pub fn name(&self) -> &'static str {
        match self {
            BlockError::MissingContentId { .. } => "MissingContentId",
            BlockError::UnknownBlockType { .. } => "UnknownBlockType",
            BlockError::AttributeValidation { .. } => "AttributeValidationError",
            BlockError::FieldRegistrationConflict(_) => "FieldRegistrationConflict",
            BlockError::ParseFailure { .. } => "ParseFailure",
            BlockError::LocaleUnavailable { .. } => "LocaleUnavailable",
            BlockError::LoadFailed { .. } => "LoadFailed",
            BlockError::CyclicReference { .. } => "CyclicReference",
            BlockError::BlockRegistrationConflict { .. } => "BlockRegistrationConflict",
            BlockError::InvalidDescriptor { .. } => "InvalidDescriptor",
        }
    }

    /// The content node the error is about, when there is one
    pub fn content_id(&self) -> Option<&ContentId> {
        match self {
            BlockError::MissingContentId { id }
            | BlockError::UnknownBlockType { id, .. }
            | BlockError::AttributeValidation { id, .. }
            | BlockError::LocaleUnavailable { id }
            | BlockError::LoadFailed { id, .. }
            | BlockError::CyclicReference { id } => Some(id),
            _ => None,
        }
    }

    /// Errors that are confined to one node and displayed inline
    pub fn is_contained(&self) -> bool {
        !matches!(
            self,
            BlockError::FieldRegistrationConflict(_)
                | BlockError::BlockRegistrationConflict { .. }
                | BlockError::InvalidDescriptor { .. }
        )
    }
}
