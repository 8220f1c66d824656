//! Shadow tree of instantiated nodes
//!
//! Nodes are added as they are mounted, not when they are merely
//! referenced. The tree lives in an arena scoped to one store generation:
//! parents are plain back-pointers and the whole arena is dropped at the
//! next generation instead of being freed node by node.

use blocklab_core::ids::StateKey;
use blocklab_core::BlockDescriptor;
use blocklab_incremental::Generation;
use blocklab_types::{ContentId, ContentNode};
use indexmap::IndexMap;
use std::sync::Arc;

/// Handle to a node in one generation's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeInfoId {
    index: usize,
    generation: Generation,
    epoch: u64,
}

/// One instantiated node
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeInfoId,
    pub content_id: ContentId,
    pub key: StateKey,
    pub node: Arc<ContentNode>,
    pub block: Arc<BlockDescriptor>,
    pub parent: Option<NodeInfoId>,
    children: IndexMap<StateKey, NodeInfoId>,
}

impl NodeInfo {
    /// Children in the order they were first instantiated
    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeInfoId> + '_ {
        self.children.values().copied()
    }

    pub fn tag(&self) -> &str {
        &self.block.tag
    }
}

/// Which way [`ShadowTree::find_related`] walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Parent first, up to the root
    Ancestors,
    /// Depth-first, children in instantiation order
    Descendants,
}

#[derive(Debug, Default)]
pub struct ShadowTree {
    generation: Generation,
    /// Bumped on every teardown; handles from an earlier arena never match
    epoch: u64,
    nodes: Vec<NodeInfo>,
    roots: IndexMap<StateKey, NodeInfoId>,
}

impl ShadowTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Start `generation`, dropping the arena if it belongs to another one
    pub fn begin(&mut self, generation: Generation) {
        if generation != self.generation {
            if !self.nodes.is_empty() {
                tracing::debug!(old = %self.generation, new = %generation, nodes = self.nodes.len(), "shadow tree torn down");
            }
            self.clear();
            self.generation = generation;
        }
    }

    /// Drop every node; handles issued so far stop resolving
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.epoch += 1;
    }

    /// Record `node` as instantiated under `parent`
    ///
    /// Attaching the same key under the same parent again returns the
    /// node created the first time.
    pub fn attach(
        &mut self,
        parent: Option<NodeInfoId>,
        key: StateKey,
        node: Arc<ContentNode>,
        block: Arc<BlockDescriptor>,
    ) -> NodeInfoId {
        let parent = parent.filter(|p| self.contains(*p));
        let existing = match parent {
            Some(p) => self.nodes[p.index].children.get(&key),
            None => self.roots.get(&key),
        };
        if let Some(existing) = existing {
            return *existing;
        }

        let id = NodeInfoId {
            index: self.nodes.len(),
            generation: self.generation,
            epoch: self.epoch,
        };
        tracing::trace!(%key, ?parent, "attach");
        match parent {
            Some(p) => self.nodes[p.index].children.insert(key.clone(), id),
            None => self.roots.insert(key.clone(), id),
        };
        self.nodes.push(NodeInfo {
            id,
            content_id: node.id.clone(),
            key,
            node,
            block,
            parent,
            children: IndexMap::new(),
        });
        id
    }

    pub fn contains(&self, id: NodeInfoId) -> bool {
        id.generation == self.generation && id.epoch == self.epoch && id.index < self.nodes.len()
    }

    pub fn get(&self, id: NodeInfoId) -> Option<&NodeInfo> {
        if self.contains(id) {
            self.nodes.get(id.index)
        } else {
            None
        }
    }

    pub fn parent(&self, id: NodeInfoId) -> Option<&NodeInfo> {
        self.get(id)?.parent.and_then(|p| self.get(p))
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeInfoId> + '_ {
        self.roots.values().copied()
    }

    /// First node instantiated with state key `key`
    pub fn find(&self, key: &StateKey) -> Option<NodeInfoId> {
        self.nodes.iter().find(|n| &n.key == key).map(|n| n.id)
    }

    /// Nodes related to `start` that satisfy `predicate`, nearest first;
    /// `start` itself is never included
    pub fn find_related(
        &self,
        start: NodeInfoId,
        predicate: impl Fn(&NodeInfo) -> bool,
        direction: Direction,
    ) -> Vec<NodeInfoId> {
        let Some(start) = self.get(start) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        match direction {
            Direction::Ancestors => {
                let mut current = start.parent.and_then(|p| self.get(p));
                while let Some(node) = current {
                    if predicate(node) {
                        found.push(node.id);
                    }
                    current = node.parent.and_then(|p| self.get(p));
                }
            }
            Direction::Descendants => {
                let mut stack: Vec<NodeInfoId> = start.children().rev().collect();
                while let Some(id) = stack.pop() {
                    let Some(node) = self.get(id) else { continue };
                    if predicate(node) {
                        found.push(id);
                    }
                    stack.extend(node.children().rev());
                }
            }
        }
        found
    }

    /// Whether `content_id` is `start` or one of its ancestors
    pub fn on_path(&self, start: NodeInfoId, content_id: &ContentId) -> bool {
        let mut current = self.get(start);
        while let Some(node) = current {
            if &node.content_id == content_id {
                return true;
            }
            current = node.parent.and_then(|p| self.get(p));
        }
        false
    }

    /// The grader an input reports to
    pub fn nearest_grader(&self, start: NodeInfoId) -> Option<NodeInfoId> {
        self.find_related(start, |n| n.block.is_grader, Direction::Ancestors)
            .first()
            .copied()
    }

    /// Inputs a grader collects from
    pub fn inputs_of(&self, grader: NodeInfoId) -> Vec<NodeInfoId> {
        self.find_related(grader, |n| n.block.is_input, Direction::Descendants)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
