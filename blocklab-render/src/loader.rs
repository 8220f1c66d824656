//! Fetch-if-missing
//!
//! When no source knows an id, the engine asks its [`ContentLoader`]
//! once. The id is marked loading in the loader source while the fetch
//! runs; the result is dispatched into that source, or recorded as the
//! entry's error.

use async_trait::async_trait;
use blocklab_core::BlockError;
use blocklab_types::{ContentId, ParsedContent};
use std::collections::HashMap;

#[async_trait(?Send)]
pub trait ContentLoader {
    /// Fetch and parse the content containing `id`
    async fn load(&self, id: &ContentId) -> Result<ParsedContent, BlockError>;
}

/// Serves pre-parsed documents from memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<ContentId, ParsedContent>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` for every id it contains
    pub fn with_document(mut self, document: ParsedContent) -> Self {
        for id in document.id_map.ids() {
            self.documents.insert(id.clone(), document.clone());
        }
        self
    }
}

#[async_trait(?Send)]
impl ContentLoader for MemoryLoader {
    async fn load(&self, id: &ContentId) -> Result<ParsedContent, BlockError> {
        self.documents
            .get(id)
            .cloned()
            .ok_or_else(|| BlockError::MissingContentId { id: id.clone() })
    }
}
