//! Host node arena.
//!
//! Nodes live in a [`SlotMap`] and link to each other through stable
//! [`NodeId`] handles: `parent` is a back-reference, the parent owns the
//! `first_child → next_sibling` chain. `prev_sibling` and `last_child` make
//! insertion before an anchor, appends and unlinking O(1).
//!
//! A stale handle (node already discarded) simply fails to resolve; a
//! discarded slot is never confused with a newer node.

use std::collections::HashMap;

use slotmap::SlotMap;

use crate::props::PropValue;
use crate::protocol::WidgetKind;
use crate::router::Handler;

slotmap::new_key_type! {
    /// Stable handle of a host node.
    pub struct NodeId;
}

/// Element payload.
#[derive(Debug, Clone)]
pub struct ElementData {
    /// UI tag as written by the framework (`"column"`, `"button"`).
    pub tag: String,
    /// Widget kind the tag resolves to.
    pub kind: WidgetKind,
    /// Current attribute values, last write wins.
    pub props: HashMap<String, PropValue>,
    /// Action name → handlers in registration order. Never holds an empty list.
    pub handlers: HashMap<String, Vec<Handler>>,
}

/// Variant-specific node data.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Attachment point of a rendered subtree.
    Root {
        /// Remote container the subtree attaches under; the host root when `None`.
        parent_widget_id: Option<String>,
    },
    /// Widget-backed element.
    Element(ElementData),
    /// Literal text, materialized remotely as a label.
    Text {
        /// Current text.
        text: String,
    },
}

/// One node of the virtual tree.
#[derive(Debug, Clone)]
pub struct HostNode {
    /// Identity shared with the remote widget.
    pub widget_id: String,
    /// Parent back-reference.
    pub parent: Option<NodeId>,
    /// Head of the child chain.
    pub first_child: Option<NodeId>,
    /// Tail of the child chain.
    pub last_child: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Whether the remote counterpart currently exists.
    pub mounted: bool,
    /// Variant data.
    pub kind: NodeKind,
}

impl HostNode {
    /// A detached, unmounted node.
    pub fn new(widget_id: String, kind: NodeKind) -> Self {
        Self {
            widget_id,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            mounted: false,
            kind,
        }
    }

    /// Element payload, if this is an element.
    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Mutable element payload, if this is an element.
    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Whether this is a root.
    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root { .. })
    }

    /// Whether the node sits in no chain and owns none.
    pub fn is_detached(&self) -> bool {
        self.parent.is_none()
            && self.first_child.is_none()
            && self.prev_sibling.is_none()
            && self.next_sibling.is_none()
    }
}

/// Arena of host nodes.
#[derive(Debug, Default)]
pub struct HostTree {
    nodes: SlotMap<NodeId, HostNode>,
}

impl HostTree {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node.
    pub fn insert(&mut self, node: HostNode) -> NodeId {
        self.nodes.insert(node)
    }

    /// Drop a node from the arena. Links pointing at it are not touched.
    pub fn remove(&mut self, id: NodeId) -> Option<HostNode> {
        self.nodes.remove(id)
    }

    /// Look up a node.
    pub fn get(&self, id: NodeId) -> Option<&HostNode> {
        self.nodes.get(id)
    }

    /// Look up a node mutably.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut HostNode> {
        self.nodes.get_mut(id)
    }

    /// Whether the handle still resolves.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Link a detached `child` into `parent`'s chain before `anchor`, or at
    /// the end when there is no anchor or the anchor is not `parent`'s child.
    ///
    /// Returns `false` if either handle is stale.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, anchor: Option<NodeId>) -> bool {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return false;
        }
        let anchor = anchor.filter(|a| self.get(*a).and_then(|n| n.parent) == Some(parent));

        match anchor {
            Some(anchor) => {
                let prev = self.nodes[anchor].prev_sibling;
                {
                    let node = &mut self.nodes[child];
                    node.parent = Some(parent);
                    node.prev_sibling = prev;
                    node.next_sibling = Some(anchor);
                }
                self.nodes[anchor].prev_sibling = Some(child);
                match prev {
                    Some(prev) => self.nodes[prev].next_sibling = Some(child),
                    None => self.nodes[parent].first_child = Some(child),
                }
            }
            None => {
                let last = self.nodes[parent].last_child;
                {
                    let node = &mut self.nodes[child];
                    node.parent = Some(parent);
                    node.prev_sibling = last;
                    node.next_sibling = None;
                }
                match last {
                    Some(last) => self.nodes[last].next_sibling = Some(child),
                    None => self.nodes[parent].first_child = Some(child),
                }
                self.nodes[parent].last_child = Some(child);
            }
        }
        true
    }

    /// Take `child` out of its parent's chain, keeping its own children.
    pub fn unlink(&mut self, child: NodeId) {
        let Some(node) = self.nodes.get(child) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);

        if let Some(prev) = prev.filter(|p| self.contains(*p)) {
            self.nodes[prev].next_sibling = next;
        } else if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.first_child = next;
        }
        if let Some(next) = next.filter(|n| self.contains(*n)) {
            self.nodes[next].prev_sibling = prev;
        } else if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.last_child = prev;
        }

        let node = &mut self.nodes[child];
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Clear every link of `id`, including its child chain head.
    pub fn sever(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
            node.first_child = None;
            node.last_child = None;
            node.prev_sibling = None;
            node.next_sibling = None;
        }
    }

    /// Snapshot of `parent`'s children in chain order.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.get(parent).and_then(|n| n.first_child);
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.get(id).and_then(|n| n.next_sibling);
        }
        out
    }

    /// All descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }
}
