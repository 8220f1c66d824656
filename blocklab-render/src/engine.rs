//! The engine session object

use crate::error::Result;
use crate::loader::ContentLoader;
use crate::resolve::{RenderHandle, Renderable, Resolver};
use crate::shadow::ShadowTree;
use blocklab_core::ids::{self, StatePrefix};
use blocklab_core::state::{StateEvent, Target};
use blocklab_core::{
    blocks, fields, BlockDescriptor, BlockRegistry, Config, ContentParser, ContentStore, FieldRegistry,
    LanguageTiers, RelativeRefs, Resolved, SourceStack, StateLayer,
};
use blocklab_incremental::{Generation, MetricsSnapshot, Scheduler, Suspend};
use blocklab_types::{ContentId, IdMap, LocaleCode, Provenance, SourceName};
use serde_json::Value;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::task::Poll;

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: Config,
    store: Option<Arc<ContentStore>>,
    blocks: Option<Arc<BlockRegistry>>,
    fields: Option<Arc<FieldRegistry>>,
    loader: Option<Rc<dyn ContentLoader>>,
}

impl EngineBuilder {
    /// Share an existing store instead of starting empty
    pub fn store(mut self, store: Arc<ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn blocks(mut self, blocks: Arc<BlockRegistry>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn fields(mut self, fields: Arc<FieldRegistry>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Use the process-wide block and field registries
    pub fn global_registries(self) -> Self {
        self.blocks(blocks::global()).fields(fields::global())
    }

    pub fn loader(mut self, loader: impl ContentLoader + 'static) -> Self {
        self.loader = Some(Rc::new(loader));
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let scheduler = Scheduler::with_max_redrives(self.config.max_redrives);
        let fields = self.fields.unwrap_or_default();
        let resolver = Resolver::new(
            self.store.unwrap_or_default(),
            SourceStack::new(self.config.sources.iter().cloned()),
            self.blocks.unwrap_or_default(),
            scheduler.spawner(),
            self.loader,
            self.config.loader_source.clone(),
            self.config.max_repeat,
        );
        tracing::info!(sources = ?self.config.sources, locale = %self.config.default_locale, "engine ready");

        Ok(Engine {
            locale: RefCell::new(self.config.default_locale.clone()),
            config: self.config,
            resolver: Rc::new(resolver),
            scheduler,
            state: StateLayer::new(fields.clone()),
            fields,
            shadow: RefCell::new(ShadowTree::new()),
        })
    }
}

/// One rendering session: content, registries, render cache, state and
/// the shadow tree of what is mounted
///
/// Single-threaded: resolution runs on the engine's own cooperative
/// scheduler and only makes progress while the engine drives it.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    pub(crate) resolver: Rc<Resolver>,
    pub(crate) scheduler: Scheduler,
    fields: Arc<FieldRegistry>,
    pub(crate) state: StateLayer,
    pub(crate) shadow: RefCell<ShadowTree>,
    locale: RefCell<LocaleCode>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            store: None,
            blocks: None,
            fields: None,
            loader: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.resolver.store
    }

    pub fn blocks(&self) -> &Arc<BlockRegistry> {
        &self.resolver.blocks
    }

    pub fn fields(&self) -> &Arc<FieldRegistry> {
        &self.fields
    }

    pub fn state(&self) -> &StateLayer {
        &self.state
    }

    /// Register a block type against this engine's registries
    pub fn register(&self, descriptor: BlockDescriptor) -> Result<Arc<BlockDescriptor>> {
        Ok(self.resolver.blocks.register(descriptor, &self.fields)?)
    }

    pub fn dispatch(&self, source: &SourceName, id_map: IdMap) -> Generation {
        self.resolver.store.dispatch(source, id_map)
    }

    /// Parse a document and dispatch it into `source`, returning its root
    pub fn load_document(
        &self,
        parser: &dyn ContentParser,
        raw: &str,
        provenance: &Provenance,
        refs: &dyn RelativeRefs,
        source: &SourceName,
    ) -> Result<ContentId> {
        let parsed = parser.parse(raw, provenance, refs)?;
        self.dispatch(source, parsed.id_map);
        Ok(parsed.root)
    }

    pub fn locale(&self) -> LocaleCode {
        self.locale.borrow().clone()
    }

    /// Switch the requested locale; cached resolutions for other locales stay valid
    pub fn set_locale(&self, locale: LocaleCode) {
        tracing::info!(%locale, "locale changed");
        *self.locale.borrow_mut() = locale;
    }

    /// Direct lookup through the source stack, without block checks
    pub fn lookup(&self, id: &ContentId) -> Option<Resolved> {
        let snapshot = self.resolver.store.snapshot();
        self.resolver
            .stack
            .resolve(&snapshot, &ids::content_id(id), &self.locale.borrow())
    }

    /// The render cache entry point
    pub fn resolve(&self, renderable: &Renderable, prefix: &StatePrefix) -> RenderHandle {
        self.resolver.resolve(renderable, prefix, &self.locale.borrow())
    }

    pub fn resolve_id(&self, id: &ContentId, prefix: &StatePrefix) -> RenderHandle {
        self.resolve(&Renderable::Ref(id.clone()), prefix)
    }

    /// Run `consumer`, re-driving it each time a future it suspended on settles
    pub fn drive<T>(&self, consumer: impl FnMut() -> std::result::Result<T, Suspend>) -> Result<Poll<T>> {
        Ok(self.scheduler.drive(consumer)?)
    }

    /// Let pending resolutions make progress
    pub fn run_until_stalled(&self) {
        self.scheduler.run_until_stalled();
    }

    pub fn generation(&self) -> Generation {
        self.resolver.store.generation()
    }

    /// Languages available through the source stack, curated first
    pub fn language_tiers(&self) -> LanguageTiers {
        self.resolver.stack.language_tiers(&self.resolver.store.snapshot())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.resolver.table.metrics().snapshot()
    }

    pub fn shadow(&self) -> Ref<'_, ShadowTree> {
        self.shadow.borrow()
    }

    /// Tear down the mounted tree
    pub fn unmount(&self) {
        self.shadow.borrow_mut().clear();
    }

    pub fn read(&self, field: &str, target: &Target) -> Result<Option<Value>> {
        let info = self.state.field(field)?;
        Ok(self.state.read(&info, target)?)
    }

    pub fn write(&self, field: &str, value: Value, target: &Target) -> Result<StateEvent> {
        let info = self.state.field(field)?;
        Ok(self.state.write(&info, value, target)?)
    }
}
