use super::node::{NodeId, VersionNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Arena holding every prompt version.
///
/// Nodes are stored by id; structure lives in `roots` and each node's
/// `children` list. A node is referenced from exactly one place: the root
/// list or a single parent's children. `parents` mirrors the children lists
/// so parent lookup does not need a search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ForestRepr", into = "ForestRepr")]
pub struct Forest {
    roots: Vec<NodeId>,
    nodes: HashMap<NodeId, VersionNode>,
    parents: HashMap<NodeId, NodeId>,
    next_id: u64,
}

/// Serialized form: roots plus all nodes in pre-order.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForestRepr {
    roots: Vec<NodeId>,
    nodes: Vec<VersionNode>,
    /// Last id handed out, so ids of discarded versions stay retired.
    #[serde(default)]
    last_id: u64,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&VersionNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut VersionNode> {
        self.nodes.get_mut(&id)
    }

    /// Structural parent; `None` for roots and unknown ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Reserve a fresh id.
    pub(crate) fn allocate_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    pub(crate) fn push_root(&mut self, node: VersionNode) {
        self.roots.push(node.id);
        self.nodes.insert(node.id, node);
    }

    /// Attach `node` under `parent`. Hands the node back if `parent` is unknown.
    pub(crate) fn push_child(
        &mut self,
        parent: NodeId,
        node: VersionNode,
    ) -> Result<(), VersionNode> {
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return Err(node);
        };
        parent_node.children.push(node.id);
        self.parents.insert(node.id, parent);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Depth-first pre-order walk over every root and its descendants.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            forest: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    /// Flagged nodes in pre-order.
    pub fn flagged(&self) -> Vec<NodeId> {
        self.iter().filter(|node| node.flagged).map(|node| node.id).collect()
    }

    /// Replace the structure with one root per flagged node, in pre-order.
    ///
    /// Survivors lose their children, `previous_version_id`, `is_head` and
    /// `flagged`; history and ids are kept. Everything else is dropped.
    pub(crate) fn extract_flagged(&mut self) {
        let flagged = self.flagged();
        let mut nodes = std::mem::take(&mut self.nodes);

        self.roots.clear();
        self.parents.clear();
        for id in flagged {
            if let Some(mut node) = nodes.remove(&id) {
                node.children.clear();
                node.previous_version_id = None;
                node.is_head = false;
                node.flagged = false;
                self.push_root(node);
            }
        }
    }
}

pub struct PreOrder<'a> {
    forest: &'a Forest,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a VersionNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(node) = self.forest.nodes.get(&id) {
                self.stack.extend(node.children.iter().rev().copied());
                return Some(node);
            }
        }
        None
    }
}

impl From<Forest> for ForestRepr {
    fn from(forest: Forest) -> Self {
        let order: Vec<NodeId> = forest.iter().map(|node| node.id).collect();
        let mut nodes = forest.nodes;
        ForestRepr {
            roots: forest.roots,
            nodes: order.into_iter().filter_map(|id| nodes.remove(&id)).collect(),
            last_id: forest.next_id,
        }
    }
}

impl TryFrom<ForestRepr> for Forest {
    type Error = String;

    fn try_from(repr: ForestRepr) -> Result<Self, Self::Error> {
        let mut nodes = HashMap::with_capacity(repr.nodes.len());
        for node in repr.nodes {
            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(format!("duplicate version id {id}"));
            }
        }

        let mut parents = HashMap::new();
        let mut referenced: HashSet<NodeId> = HashSet::new();
        for &root in &repr.roots {
            if !nodes.contains_key(&root) {
                return Err(format!("root {root} is not a known version"));
            }
            if !referenced.insert(root) {
                return Err(format!("version {root} appears more than once"));
            }
        }
        for node in nodes.values() {
            for &child in &node.children {
                if !nodes.contains_key(&child) {
                    return Err(format!("version {} lists unknown child {child}", node.id));
                }
                if !referenced.insert(child) {
                    return Err(format!("version {child} appears more than once"));
                }
                parents.insert(child, node.id);
            }
        }

        let forest = Forest {
            next_id: nodes.keys().map(|id| id.0).max().unwrap_or(0).max(repr.last_id),
            roots: repr.roots,
            nodes,
            parents,
        };
        // Every node is referenced once; a detached cycle still escapes the roots.
        if forest.iter().count() != forest.len() {
            return Err("forest contains unreachable versions".to_string());
        }
        Ok(forest)
    }
}
