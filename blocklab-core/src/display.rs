//! Structured error objects for inline failure display
//!
//! A node that fails to resolve or mount is replaced by an
//! [`ErrorDisplay`] placeholder; unrelated siblings keep rendering.

use crate::error::BlockError;
use blocklab_types::ContentId;
use serde::{Deserialize, Serialize};

/// An inline error placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDisplay {
    /// Node the placeholder stands in for
    pub id: ContentId,
    /// Error kind, e.g. `MissingContentId`
    pub name: String,
    /// Sentence shown to learners and authors
    pub message: String,
    /// Details for authors and logs
    pub technical: String,
}

impl ErrorDisplay {
    pub fn new(
        id: ContentId,
        name: impl Into<String>,
        message: impl Into<String>,
        technical: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            message: message.into(),
            technical: technical.into(),
        }
    }

    /// Build a display for `error`, standing in for `at` when the error
    /// does not name a node itself
    pub fn from_error(error: &BlockError, at: &ContentId) -> Self {
        let id = error.content_id().unwrap_or(at).clone();
        Self {
            id,
            name: error.name().to_string(),
            message: error.to_string(),
            technical: format!("{error:?}"),
        }
    }

    /// Replace the learner-facing message, e.g. with a translated one
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_uses_error_id() {
        let err = BlockError::MissingContentId { id: "gone".into() };
        let display = ErrorDisplay::from_error(&err, &"parent".into());

        assert_eq!(display.id, ContentId::from("gone"));
        assert_eq!(display.name, "MissingContentId");
        assert_eq!(display.message, "no content found for id 'gone'");
        assert!(display.technical.contains("MissingContentId"));
    }

    #[test]
    fn test_from_error_falls_back_to_location() {
        let err = BlockError::ParseFailure {
            provenance: "unit1.xml".into(),
            message: "unexpected end of input".into(),
        };
        let display = ErrorDisplay::from_error(&err, &"unit1".into()).with_message("Oops");

        assert_eq!(display.id, ContentId::from("unit1"));
        assert_eq!(display.message, "Oops");
    }
}
