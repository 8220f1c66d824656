//! Source stack resolution
//!
//! Sources are consulted in priority order and the first one holding a
//! ready entry with at least one variant wins outright. There is no
//! field-level merging, and source priority always beats locale quality:
//! a higher-priority source with only a fallback variant shadows a
//! lower-priority source with an exact match.

use crate::error::BlockError;
use crate::locale::{select_variant, LanguageTiers, LocaleMatch};
use crate::store::{LoadingState, StoreSnapshot};
use blocklab_types::{ContentId, ContentNode, LocaleCode, SourceName, VariantMap};
use std::sync::Arc;

/// A node resolved from the stack
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub node: Arc<ContentNode>,
    pub source: SourceName,
    pub locale: LocaleCode,
    pub matched: LocaleMatch,
}

/// Why an id did not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// Some source is still loading the id
    Loading { source: SourceName },
    /// A source recorded a load failure for the id
    Failed { source: SourceName, error: String },
    /// A source has the id ready but without any variant
    NoVariants { source: SourceName },
    /// No source knows the id
    Missing,
}

impl Unresolved {
    /// Convert a terminal status into the error a resolution rejects with.
    /// `Loading` is not terminal and yields `None`.
    pub fn into_error(self, id: &ContentId) -> Option<BlockError> {
        match self {
            Unresolved::Loading { .. } => None,
            Unresolved::Failed { source, error } => Some(BlockError::LoadFailed {
                id: id.clone(),
                source_name: source,
                message: error,
            }),
            Unresolved::NoVariants { .. } => Some(BlockError::LocaleUnavailable { id: id.clone() }),
            Unresolved::Missing => Some(BlockError::MissingContentId { id: id.clone() }),
        }
    }
}

/// Priority-ordered view over the store's sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStack {
    sources: Vec<SourceName>,
}

impl SourceStack {
    pub fn new(sources: impl IntoIterator<Item = SourceName>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }

    pub fn sources(&self) -> &[SourceName] {
        &self.sources
    }

    /// First ready, locale-resolvable entry for `id`, in priority order
    pub fn resolve(&self, snapshot: &StoreSnapshot, id: &ContentId, locale: &LocaleCode) -> Option<Resolved> {
        self.sources.iter().find_map(|source| {
            let entry = snapshot.entry(source, id)?;
            if entry.state != LoadingState::Ready {
                return None;
            }
            let selection = select_variant(&entry.variants, locale)?;
            Some(Resolved {
                node: selection.node,
                source: source.clone(),
                locale: selection.locale,
                matched: selection.matched,
            })
        })
    }

    /// Secondary query explaining why `resolve` came up empty.
    ///
    /// Loading anywhere wins over a failure, so content that may still
    /// arrive keeps the caller waiting; otherwise the highest-priority
    /// failure is reported.
    pub fn status(&self, snapshot: &StoreSnapshot, id: &ContentId) -> Unresolved {
        let mut first_problem = None;
        for source in &self.sources {
            let Some(entry) = snapshot.entry(source, id) else {
                continue;
            };
            match entry.state {
                LoadingState::Loading => {
                    return Unresolved::Loading {
                        source: source.clone(),
                    }
                }
                LoadingState::Error => {
                    first_problem.get_or_insert_with(|| Unresolved::Failed {
                        source: source.clone(),
                        error: entry.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                LoadingState::Ready if entry.variants.is_empty() => {
                    first_problem.get_or_insert_with(|| Unresolved::NoVariants {
                        source: source.clone(),
                    });
                }
                LoadingState::Ready => {}
            }
        }
        first_problem.unwrap_or(Unresolved::Missing)
    }

    /// Variant maps of every id visible through the stack, each taken from
    /// the source that wins for it
    pub fn visible_variants<'a>(&self, snapshot: &'a StoreSnapshot) -> Vec<(&'a ContentId, &'a VariantMap)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for source in &self.sources {
            let Some(map) = snapshot.source(source) else {
                continue;
            };
            for (id, entry) in map.iter() {
                if entry.is_ready() && !entry.variants.is_empty() && seen.insert(id) {
                    out.push((id, &entry.variants));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    /// Curation tiers of the languages available through the stack
    pub fn language_tiers(&self, snapshot: &StoreSnapshot) -> LanguageTiers {
        crate::locale::language_tiers(self.visible_variants(snapshot).into_iter().map(|(_, v)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentStore;
    use blocklab_types::IdMap;

    fn node(id: &str, text: &str) -> ContentNode {
        ContentNode::new(id, "Markdown").with_kid(blocklab_types::Kid::text(text))
    }

    fn stack() -> SourceStack {
        SourceStack::new([SourceName::inline(), SourceName::content()])
    }

    #[test]
    fn test_lower_source_used_when_higher_lacks_id() {
        let store = ContentStore::new();
        store.dispatch(
            &SourceName::content(),
            IdMap::new().with_node("en".into(), node("greeting", "Hello")),
        );

        let resolved = stack()
            .resolve(&store.snapshot(), &"greeting".into(), &"en".into())
            .unwrap();
        assert_eq!(resolved.source, SourceName::content());
        assert_eq!(resolved.node.kids, vec![blocklab_types::Kid::text("Hello")]);
    }

    #[test]
    fn test_higher_priority_source_shadows() {
        let store = ContentStore::new();
        store.dispatch(
            &SourceName::content(),
            IdMap::new().with_node("en".into(), node("a", "from content")),
        );
        store.dispatch(
            &SourceName::inline(),
            IdMap::new().with_node("en".into(), node("a", "from inline")),
        );

        let resolved = stack().resolve(&store.snapshot(), &"a".into(), &"en".into()).unwrap();
        assert_eq!(resolved.source, SourceName::inline());
    }

    #[test]
    fn test_source_priority_beats_locale_match() {
        let store = ContentStore::new();
        store.dispatch(
            &SourceName::content(),
            IdMap::new().with_node("es".into(), node("a", "hola")),
        );
        store.dispatch(
            &SourceName::inline(),
            IdMap::new().with_node("en".into(), node("a", "hello")),
        );

        let resolved = stack().resolve(&store.snapshot(), &"a".into(), &"es".into()).unwrap();
        assert_eq!(resolved.source, SourceName::inline());
        assert!(resolved.matched.is_fallback());
    }

    #[test]
    fn test_loading_entry_is_skipped() {
        let store = ContentStore::new();
        store.dispatch(
            &SourceName::content(),
            IdMap::new().with_node("en".into(), node("a", "ready")),
        );
        store.mark_loading(&SourceName::inline(), &"a".into());

        let snapshot = store.snapshot();
        let resolved = stack().resolve(&snapshot, &"a".into(), &"en".into()).unwrap();
        assert_eq!(resolved.source, SourceName::content());
    }

    #[test]
    fn test_status_precedence() {
        let store = ContentStore::new();
        let id: ContentId = "x".into();

        assert_eq!(stack().status(&store.snapshot(), &id), Unresolved::Missing);

        store.mark_error(&SourceName::inline(), &id, "bad gateway");
        assert!(matches!(
            stack().status(&store.snapshot(), &id),
            Unresolved::Failed { .. }
        ));

        store.mark_loading(&SourceName::content(), &id);
        assert_eq!(
            stack().status(&store.snapshot(), &id),
            Unresolved::Loading {
                source: SourceName::content()
            }
        );
    }

    #[test]
    fn test_unresolved_errors() {
        let id: ContentId = "x".into();
        assert!(Unresolved::Loading { source: SourceName::content() }
            .into_error(&id)
            .is_none());
        assert_eq!(
            Unresolved::Missing.into_error(&id),
            Some(BlockError::MissingContentId { id: id.clone() })
        );
        assert_eq!(
            Unresolved::NoVariants { source: SourceName::content() }.into_error(&id),
            Some(BlockError::LocaleUnavailable { id })
        );
    }

    #[test]
    fn test_language_tiers_use_winning_source() {
        let store = ContentStore::new();
        store.dispatch(
            &SourceName::content(),
            IdMap::new()
                .with_node("en".into(), node("a", "a"))
                .with_node("fr".into(), node("a", "a").generated()),
        );
        store.dispatch(
            &SourceName::inline(),
            IdMap::new().with_node("en".into(), node("b", "b")),
        );

        let tiers = stack().language_tiers(&store.snapshot());
        assert_eq!(tiers.curated, vec![LocaleCode::new("en")]);
        assert_eq!(tiers.best_effort, vec![LocaleCode::new("fr")]);
    }
}
