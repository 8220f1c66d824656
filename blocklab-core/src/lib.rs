//! # blocklab-core
//!
//! Core library for the blocklab content engine.
//!
//! This crate holds the content store and its source stack, locale
//! selection, state keys, the field and block-type registries, the
//! event-sourced state layer and the parser contract.

pub mod blocks;
pub mod config;
pub mod display;
pub mod error;
pub mod fields;
pub mod ids;
pub mod locale;
pub mod overlay;
pub mod parser;
pub mod state;
pub mod store;

pub use blocks::{AttrKind, AttrSpec, AttributeSchema, BlockDescriptor, BlockRegistry, Repeat};
pub use config::{Config, ConfigError};
pub use display::ErrorDisplay;
pub use error::BlockError;
pub use fields::{FieldConflict, FieldInfo, FieldRegistry, FieldSet, FieldSpec, Scope};
pub use ids::{StateKey, StatePrefix};
pub use locale::{select_variant, Curation, LanguageTiers, LocaleMatch, Selection};
pub use overlay::{Resolved, SourceStack, Unresolved};
pub use parser::{ContentParser, JsonContentParser, NoRelativeRefs, PathRelativeRefs, RelativeRefs};
pub use state::{EventLog, FieldRef, StateError, StateEvent, StateLayer, StateStore, Target};
pub use store::{BlockEntry, ContentStore, LoadingState, SourceMap, StoreChanged, StoreSnapshot};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber; `RUST_LOG` overrides the default level
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
