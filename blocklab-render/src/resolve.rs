//! Render cache: single-flight resolution of renderables into futures
//!
//! Every request for the same structural identity, prefix and locale in
//! one store generation gets the same [`RenderHandle`]. A handle is
//! created pending, its resolution starts immediately on the scheduler,
//! and children of non-repeating blocks are resolved eagerly so a consumer
//! reading the tree finds most of it settled.

use crate::loader::ContentLoader;
use blocklab_core::ids::{self, StateKey, StatePrefix};
use blocklab_core::{BlockDescriptor, BlockError, BlockRegistry, ContentStore, LocaleMatch, Repeat, SourceStack, Unresolved};
use blocklab_incremental::{spawn_on, Entry, FutureTable, RenderFuture};
use blocklab_types::{Attributes, ContentId, ContentNode, Kid, LocaleCode, SourceName};
use futures::executor::LocalSpawner;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Handle to a pending or settled resolution
pub type RenderHandle = RenderFuture<Rendered, BlockError>;

/// Something that can be rendered
#[derive(Debug, Clone)]
pub enum Renderable {
    /// Nothing at all; resolves to the shared empty sentinel
    Nothing,
    /// A reference to content in the store
    Ref(ContentId),
    /// A content record carried inline rather than looked up
    Block(Arc<ContentNode>),
    /// The children of a resolved node
    Kids { owner: Arc<ContentNode>, embedded: bool },
}

impl Renderable {
    pub fn from_option(id: Option<ContentId>) -> Self {
        id.map(Renderable::Ref).unwrap_or(Renderable::Nothing)
    }

    /// Children of an already resolved node
    pub fn kids_of(resolved: &ResolvedNode) -> Self {
        Renderable::Kids {
            owner: resolved.node.clone(),
            embedded: matches!(resolved.origin, Origin::Embedded),
        }
    }

    fn identity(&self) -> Option<StructuralIdentity> {
        match self {
            Renderable::Nothing => None,
            Renderable::Ref(id) => Some(StructuralIdentity::Ref(id.clone())),
            Renderable::Block(node) => Some(StructuralIdentity::Block(node.id.clone())),
            Renderable::Kids { owner, embedded } => Some(StructuralIdentity::Kids {
                owner: owner.id.clone(),
                embedded: *embedded,
            }),
        }
    }
}

/// What a cache key names, kept apart by kind so a reference and a record
/// carrying the same id never share an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructuralIdentity {
    Ref(ContentId),
    Block(ContentId),
    Kids { owner: ContentId, embedded: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: StructuralIdentity,
    pub prefix: StatePrefix,
    pub locale: LocaleCode,
}

/// Where a resolved node came from
#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Store {
        source: SourceName,
        locale: LocaleCode,
        matched: LocaleMatch,
    },
    Embedded,
}

/// A node whose content, block type and attributes all checked out
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    /// Content identity, without any absolute marker
    pub id: ContentId,
    /// State key of this instance
    pub key: StateKey,
    /// Prefix the node was resolved under
    pub prefix: StatePrefix,
    pub node: Arc<ContentNode>,
    pub block: Arc<BlockDescriptor>,
    pub origin: Origin,
    repeat_count: Option<u64>,
}

impl ResolvedNode {
    /// Prefixes the children are instantiated under, when they do not
    /// depend on state. Attempt-scoped blocks return `None`.
    pub fn static_instances(&self) -> Option<Vec<StatePrefix>> {
        match (&self.block.repeat, self.repeat_count) {
            (None, _) => Some(vec![self.prefix.clone()]),
            (Some(Repeat::Count { .. }), Some(count)) => Some((0..count).map(|i| self.prefix.nest(i)).collect()),
            (Some(Repeat::Count { .. }), None) => Some(Vec::new()),
            (Some(Repeat::Attempts { .. }), _) => None,
        }
    }

    /// Prefix for the children of attempt `attempt`
    pub fn attempt_prefix(&self, attempt: u64) -> StatePrefix {
        self.prefix.nest(format!("attempt-{attempt}"))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(&self.origin, Origin::Store { matched, .. } if matched.is_fallback())
    }
}

/// A resolved entry of a node's children
#[derive(Debug, Clone)]
pub enum RenderedKid {
    Text(String),
    Block { id: ContentId, future: RenderHandle },
    Markup {
        tag: String,
        attributes: Attributes,
        kids: Vec<RenderedKid>,
    },
}

/// Settled value of a render future
#[derive(Debug, Clone)]
pub enum Rendered {
    Empty,
    Node(Arc<ResolvedNode>),
    Kids(Arc<[RenderedKid]>),
}

impl Rendered {
    pub fn as_node(&self) -> Option<&Arc<ResolvedNode>> {
        match self {
            Rendered::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Rendered::Empty)
    }
}

pub(crate) struct Resolver {
    pub(crate) store: Arc<ContentStore>,
    pub(crate) stack: SourceStack,
    pub(crate) blocks: Arc<BlockRegistry>,
    pub(crate) table: FutureTable<CacheKey, Rendered, BlockError>,
    spawner: LocalSpawner,
    loader: Option<Rc<dyn ContentLoader>>,
    loader_source: SourceName,
    max_repeat: u64,
}

impl Resolver {
    pub(crate) fn new(
        store: Arc<ContentStore>,
        stack: SourceStack,
        blocks: Arc<BlockRegistry>,
        spawner: LocalSpawner,
        loader: Option<Rc<dyn ContentLoader>>,
        loader_source: SourceName,
        max_repeat: u64,
    ) -> Self {
        Self {
            store,
            stack,
            blocks,
            table: FutureTable::new(Rendered::Empty),
            spawner,
            loader,
            loader_source,
            max_repeat,
        }
    }

    /// The cache entry point
    pub(crate) fn resolve(self: &Rc<Self>, renderable: &Renderable, prefix: &StatePrefix, locale: &LocaleCode) -> RenderHandle {
        let Some(identity) = renderable.identity() else {
            return self.table.empty();
        };
        let key = CacheKey {
            identity,
            prefix: prefix.clone(),
            locale: locale.clone(),
        };
        let future = match self.table.entry(self.store.generation(), key) {
            Entry::Existing(future) => return future,
            Entry::Created(future) => future,
        };

        match renderable {
            Renderable::Nothing => {
                future.resolve(Rendered::Empty);
            }
            Renderable::Ref(id) => self.spawn_fetch(&future, id, prefix, locale),
            Renderable::Block(node) => {
                let result = self.shallow(&node.id, node.clone(), Origin::Embedded, prefix, locale);
                self.settle(&future, result);
            }
            Renderable::Kids { owner, .. } => {
                let kids = self.kids(&owner.kids, prefix, locale);
                self.settle(&future, Ok(Rendered::Kids(kids.into())));
            }
        }
        future
    }

    fn settle(&self, future: &RenderHandle, result: Result<Rendered, BlockError>) {
        match &result {
            Ok(_) => self.table.metrics().record_resolved(),
            Err(error) => {
                self.table.metrics().record_rejected();
                tracing::warn!(%error, "resolution rejected");
            }
        }
        future.settle(result);
    }

    fn spawn_fetch(self: &Rc<Self>, future: &RenderHandle, id: &ContentId, prefix: &StatePrefix, locale: &LocaleCode) {
        let this = self.clone();
        let future = future.clone();
        let (id, prefix, locale) = (id.clone(), prefix.clone(), locale.clone());
        spawn_on(&self.spawner, async move {
            let result = this.fetch(&id, &prefix, &locale).await;
            this.settle(&future, result);
        });
    }

    /// Look `id` up through the source stack, waiting out loading entries
    /// and asking the loader once for ids no source knows
    async fn fetch(self: &Rc<Self>, id: &ContentId, prefix: &StatePrefix, locale: &LocaleCode) -> Result<Rendered, BlockError> {
        let bare = ids::content_id(id);
        let mut asked_loader = false;
        loop {
            let snapshot = self.store.snapshot();
            if let Some(found) = self.stack.resolve(&snapshot, &bare, locale) {
                if found.matched.is_fallback() {
                    tracing::debug!(id = %bare, requested = %locale, used = %found.locale, "locale fallback");
                }
                let origin = Origin::Store {
                    source: found.source,
                    locale: found.locale,
                    matched: found.matched,
                };
                return self.shallow(id, found.node, origin, prefix, locale);
            }

            match self.stack.status(&snapshot, &bare) {
                Unresolved::Loading { source } => {
                    tracing::debug!(id = %bare, %source, "waiting for content");
                    self.store.changed_since(snapshot.revision).await;
                }
                Unresolved::Missing if !asked_loader && self.loader.is_some() => {
                    asked_loader = true;
                    self.start_load(&bare);
                }
                other => {
                    return Err(other
                        .into_error(&bare)
                        .unwrap_or(BlockError::MissingContentId { id: bare }))
                }
            }
        }
    }

    fn start_load(&self, id: &ContentId) {
        let Some(loader) = self.loader.clone() else {
            return;
        };
        let store = self.store.clone();
        let source = self.loader_source.clone();
        let id = id.clone();

        store.mark_loading(&source, &id);
        spawn_on(&self.spawner, async move {
            match loader.load(&id).await {
                Ok(parsed) => {
                    let found = parsed.id_map.contains(&id);
                    store.dispatch(&source, parsed.id_map);
                    if !found {
                        store.mark_error(&source, &id, "loader returned content without this id");
                    }
                }
                Err(error) => store.mark_error(&source, &id, error.to_string()),
            }
        });
    }

    /// Check a found node against its block type and start on its children
    fn shallow(
        self: &Rc<Self>,
        id: &ContentId,
        node: Arc<ContentNode>,
        origin: Origin,
        prefix: &StatePrefix,
        locale: &LocaleCode,
    ) -> Result<Rendered, BlockError> {
        let block = self.blocks.lookup(&node)?;
        block.validate(&node)?;
        let repeat_count = match &block.repeat {
            Some(Repeat::Count { attribute }) => Some(repeat_count(&node, attribute, self.max_repeat)?),
            _ => None,
        };

        let resolved = Arc::new(ResolvedNode {
            id: ids::content_id(id),
            key: prefix.key(id),
            prefix: prefix.clone(),
            node,
            block,
            origin,
            repeat_count,
        });

        // Repeated children nest under fresh prefixes; warming them here
        // would chase a self-containing list forever. Mounting resolves them.
        if resolved.block.repeat.is_none() {
            self.resolve(&Renderable::kids_of(&resolved), prefix, locale);
        }
        Ok(Rendered::Node(resolved))
    }

    fn kids(self: &Rc<Self>, kids: &[Kid], prefix: &StatePrefix, locale: &LocaleCode) -> Vec<RenderedKid> {
        kids.iter()
            .map(|kid| match kid {
                Kid::Text { text } => RenderedKid::Text(text.clone()),
                Kid::Ref { id } => RenderedKid::Block {
                    id: id.clone(),
                    future: self.resolve(&Renderable::Ref(id.clone()), prefix, locale),
                },
                Kid::Markup { tag, attributes, kids } => RenderedKid::Markup {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                    kids: self.kids(kids, prefix, locale),
                },
            })
            .collect()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("stack", &self.stack)
            .field("table", &self.table)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

fn repeat_count(node: &ContentNode, attribute: &str, max: u64) -> Result<u64, BlockError> {
    let invalid = |reason: String| BlockError::AttributeValidation {
        id: node.id.clone(),
        tag: node.tag.clone(),
        attribute: attribute.to_string(),
        reason,
    };
    let count = node
        .attributes
        .get(attribute)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| invalid("repeat count must be a non-negative integer".to_string()))?;
    if count > max {
        return Err(invalid(format!("repeat count {count} exceeds the limit of {max}")));
    }
    Ok(count)
}
