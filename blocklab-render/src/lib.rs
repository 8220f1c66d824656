//! # blocklab-render
//!
//! Rendering engine for blocklab content.
//!
//! This crate turns dispatched content into a mounted tree: the render
//! cache resolves content through the source stack into identity-stable
//! futures, mounting instantiates those futures under cooperative
//! suspension, and the shadow tree records what was instantiated for
//! relationship queries.
//!
//! ```
//! use blocklab_core::{BlockDescriptor, Config};
//! use blocklab_render::Engine;
//! use blocklab_types::{ContentNode, IdMap, Kid, SourceName};
//!
//! let engine = Engine::new(Config::default()).unwrap();
//! engine.register(BlockDescriptor::new("Markdown")).unwrap();
//! engine.dispatch(
//!     &SourceName::content(),
//!     IdMap::new().with_node("en".into(), ContentNode::new("hello", "Markdown").with_kid(Kid::text("Hi"))),
//! );
//!
//! let mounted = engine.mount(&"hello".into()).unwrap();
//! assert!(mounted.is_ready());
//! ```

pub mod engine;
pub mod error;
pub mod loader;
pub mod mount;
pub mod resolve;
pub mod shadow;

pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use loader::{ContentLoader, MemoryLoader};
pub use mount::{Mounted, MountedBlock, MountedInstance};
pub use resolve::{CacheKey, Origin, RenderHandle, Renderable, Rendered, RenderedKid, ResolvedNode, StructuralIdentity};
pub use shadow::{Direction, NodeInfo, NodeInfoId, ShadowTree};
