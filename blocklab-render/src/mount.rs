//! Mounting: instantiate resolved content into a live tree
//!
//! Mounting walks render futures from the root down, attaching every
//! node it reaches to the shadow tree. A pending future suspends the walk
//! and the scheduler re-runs it once that future settles; because the
//! same keys yield the same futures and `attach` is idempotent, a re-run
//! picks up exactly where the last one stopped. A node that fails is
//! replaced by an inline error and its siblings still mount; so is a node
//! that turns up among its own ancestors.

use crate::engine::Engine;
use crate::error::Result;
use crate::resolve::{RenderHandle, Renderable, Rendered, RenderedKid, ResolvedNode};
use crate::shadow::NodeInfoId;
use blocklab_core::ids::{StateKey, StatePrefix};
use blocklab_core::state::Target;
use blocklab_core::{BlockError, ErrorDisplay, Repeat};
use blocklab_incremental::Suspend;
use blocklab_types::{Attributes, ContentId};
use serde_json::Value;
use std::task::Poll;

type Step<T> = std::result::Result<T, Suspend>;

/// A mounted tree
#[derive(Debug, Clone, PartialEq)]
pub enum Mounted {
    Empty,
    Text(String),
    Markup {
        tag: String,
        attributes: Attributes,
        kids: Vec<Mounted>,
    },
    Block(MountedBlock),
    Error(ErrorDisplay),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountedBlock {
    pub info: NodeInfoId,
    pub id: ContentId,
    pub key: StateKey,
    pub tag: String,
    /// One entry per instantiation of the children: a single one for
    /// plain blocks, one per iteration or the current attempt otherwise
    pub instances: Vec<MountedInstance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountedInstance {
    pub prefix: StatePrefix,
    pub kids: Vec<Mounted>,
}

impl Mounted {
    /// This node and everything below it, depth first
    pub fn descendants(&self) -> Vec<&Mounted> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            let kids: Vec<&Mounted> = match node {
                Mounted::Markup { kids, .. } => kids.iter().collect(),
                Mounted::Block(block) => block.instances.iter().flat_map(|i| &i.kids).collect(),
                _ => Vec::new(),
            };
            stack.extend(kids.into_iter().rev());
        }
        out
    }

    /// First block mounted with state key `key`
    pub fn find_block(&self, key: &str) -> Option<&MountedBlock> {
        self.descendants().into_iter().find_map(|m| match m {
            Mounted::Block(block) if block.key.as_str() == key => Some(block),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<&ErrorDisplay> {
        self.descendants()
            .into_iter()
            .filter_map(|m| match m {
                Mounted::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        self.descendants()
            .into_iter()
            .filter_map(|m| match m {
                Mounted::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Engine {
    /// Mount the tree rooted at `root`
    ///
    /// Returns `Poll::Pending` when content is still loading; call again
    /// once the store has changed. Fails only if the walk keeps
    /// suspending without converging.
    pub fn mount(&self, root: &ContentId) -> Result<Poll<Mounted>> {
        self.drive(|| {
            self.shadow.borrow_mut().begin(self.generation());
            let handle = self.resolve_id(root, &StatePrefix::root());
            self.instantiate(&handle, root, None)
        })
    }

    fn instantiate(&self, handle: &RenderHandle, at: &ContentId, parent: Option<NodeInfoId>) -> Step<Mounted> {
        match handle.read()? {
            Ok(Rendered::Empty) => Ok(Mounted::Empty),
            Ok(Rendered::Node(resolved)) if self.closes_cycle(&resolved, parent) => Ok(contain(
                &BlockError::CyclicReference {
                    id: resolved.id.clone(),
                },
                at,
            )),
            Ok(Rendered::Node(resolved)) => self.instantiate_node(&resolved, parent),
            Ok(Rendered::Kids(kids)) => Ok(Mounted::Markup {
                tag: String::new(),
                attributes: Attributes::new(),
                kids: self.instantiate_kids(&kids, parent)?,
            }),
            Err(error) => Ok(contain(&error, at)),
        }
    }

    fn instantiate_node(&self, resolved: &ResolvedNode, parent: Option<NodeInfoId>) -> Step<Mounted> {
        let info = self.shadow.borrow_mut().attach(
            parent,
            resolved.key.clone(),
            resolved.node.clone(),
            resolved.block.clone(),
        );

        let prefixes = match resolved.static_instances() {
            Some(prefixes) => prefixes,
            None => vec![resolved.attempt_prefix(self.current_attempt(resolved))],
        };

        let children = Renderable::kids_of(resolved);
        let mut instances = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let handle = self.resolve(&children, &prefix);
            let kids = match handle.read()? {
                Ok(Rendered::Kids(kids)) => self.instantiate_kids(&kids, Some(info))?,
                Ok(_) => Vec::new(),
                Err(error) => vec![contain(&error, &resolved.id)],
            };
            instances.push(MountedInstance { prefix, kids });
        }

        Ok(Mounted::Block(MountedBlock {
            info,
            id: resolved.id.clone(),
            key: resolved.key.clone(),
            tag: resolved.block.tag.clone(),
            instances,
        }))
    }

    fn instantiate_kids(&self, kids: &[RenderedKid], parent: Option<NodeInfoId>) -> Step<Vec<Mounted>> {
        kids.iter()
            .map(|kid| match kid {
                RenderedKid::Text(text) => Ok(Mounted::Text(text.clone())),
                RenderedKid::Block { id, future } => self.instantiate(future, id, parent),
                RenderedKid::Markup { tag, attributes, kids } => Ok(Mounted::Markup {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                    kids: self.instantiate_kids(kids, parent)?,
                }),
            })
            .collect()
    }

    /// A node already on its own ancestor path would mount forever
    fn closes_cycle(&self, resolved: &ResolvedNode, parent: Option<NodeInfoId>) -> bool {
        parent.is_some_and(|p| self.shadow.borrow().on_path(p, &resolved.id))
    }

    /// Attempt number of an attempt-scoped block, starting at 1
    fn current_attempt(&self, resolved: &ResolvedNode) -> u64 {
        let Some(Repeat::Attempts { field }) = &resolved.block.repeat else {
            return 1;
        };
        let Some(info) = resolved.block.field_set().get(field) else {
            return 1;
        };
        match self.state.read_or(info, &Target::id(resolved.key.clone()), Value::from(1)) {
            Ok(value) => value.as_u64().filter(|n| *n > 0).unwrap_or(1),
            Err(error) => {
                tracing::warn!(%error, key = %resolved.key, "unreadable attempt counter");
                1
            }
        }
    }
}

fn contain(error: &BlockError, at: &ContentId) -> Mounted {
    tracing::warn!(%error, id = %at, "node failed to render");
    Mounted::Error(ErrorDisplay::from_error(error, at))
}
