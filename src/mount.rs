//! Mounting and unmounting subtrees against the host.
//!
//! Mounting walks pre-order so a parent widget always exists before its
//! children are created under it. Unmounting walks post-order with children
//! in reverse, so the host always destroys leaves before their parents.
//!
//! Invariant: an element is in the [`IdentityTable`] exactly while it is
//! mounted.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::host::{HostRuntime, WidgetSpec};
use crate::props::{apply_mounted, collect_initial};
use crate::protocol::WidgetKind;
use crate::tree::{HostTree, NodeId, NodeKind};

/// Widget identity → mounted element.
///
/// A lookup index only; the arena owns the nodes.
#[derive(Debug, Default)]
pub struct IdentityTable {
    entries: HashMap<String, NodeId>,
}

impl IdentityTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `node` under `widget_id`.
    pub fn register(&mut self, widget_id: &str, node: NodeId) {
        self.entries.insert(widget_id.to_string(), node);
    }

    /// Forget `widget_id`.
    pub fn unregister(&mut self, widget_id: &str) -> Option<NodeId> {
        self.entries.remove(widget_id)
    }

    /// The element mounted under `widget_id`.
    pub fn lookup(&self, widget_id: &str) -> Option<NodeId> {
        self.entries.get(widget_id).copied()
    }

    /// Whether `widget_id` is registered.
    pub fn contains(&self, widget_id: &str) -> bool {
        self.entries.contains_key(widget_id)
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Widget identity children of `node` are created under.
///
/// For a root that is its attachment container; `None` means the host root.
pub fn child_parent_id(tree: &HostTree, node: NodeId) -> Option<String> {
    match &tree.get(node)?.kind {
        NodeKind::Root { parent_widget_id } => parent_widget_id.clone(),
        NodeKind::Element(_) | NodeKind::Text { .. } => tree.get(node).map(|n| n.widget_id.clone()),
    }
}

/// Create the host counterpart of `node` and everything under it.
///
/// A node that is already mounted is left alone, together with its subtree.
pub fn mount_subtree(
    tree: &mut HostTree,
    identity: &mut IdentityTable,
    host: &dyn HostRuntime,
    node: NodeId,
    parent_widget_id: Option<&str>,
) -> Result<()> {
    let Some(current) = tree.get(node) else {
        return Err(Error::StaleNode(format!("{node:?}")));
    };
    if current.mounted {
        return Ok(());
    }
    let widget_id = current.widget_id.clone();

    match &current.kind {
        NodeKind::Root { .. } => {}
        NodeKind::Text { text } => {
            host.create_widget(WidgetSpec {
                id: widget_id.clone(),
                kind: WidgetKind::Label,
                parent_id: parent_widget_id.map(str::to_string),
                text: Some(text.clone()),
                style: None,
                params: None,
                data: None,
            });
        }
        NodeKind::Element(element) => {
            let initial = collect_initial(&element.tag, &element.kind, &element.props)?;
            let kind = element.kind.clone();
            let deferred: Vec<_> = initial
                .deferred
                .iter()
                .filter_map(|name| element.props.get(name).map(|v| (name.clone(), v.clone())))
                .collect();

            log::debug!("[Mount] Creating {} ({}) under {:?}", widget_id, kind, parent_widget_id);
            host.create_widget(initial.into_spec(
                widget_id.clone(),
                kind.clone(),
                parent_widget_id.map(str::to_string),
            ));
            identity.register(&widget_id, node);
            if let Some(n) = tree.get_mut(node) {
                n.mounted = true;
            }
            for (name, value) in &deferred {
                apply_mounted(host, &widget_id, &kind, name, value)?;
            }
        }
    }
    if let Some(n) = tree.get_mut(node) {
        n.mounted = true;
    }

    let children_parent = child_parent_id(tree, node);
    for child in tree.children(node) {
        mount_subtree(tree, identity, host, child, children_parent.as_deref())?;
    }
    Ok(())
}

/// Remove the host counterpart of `node` and everything under it, then sever
/// every link of the subtree.
///
/// Roots never own a host widget, so no remove is issued for them.
pub fn unmount_subtree(
    tree: &mut HostTree,
    identity: &mut IdentityTable,
    host: &dyn HostRuntime,
    node: NodeId,
) {
    for child in tree.children(node).into_iter().rev() {
        unmount_subtree(tree, identity, host, child);
    }

    let Some(current) = tree.get_mut(node) else {
        return;
    };
    let is_root = current.is_root();
    if let Some(element) = current.element_mut() {
        element.handlers.clear();
    }
    if current.element().is_some() && identity.lookup(&current.widget_id) == Some(node) {
        identity.unregister(&current.widget_id);
    }
    if current.mounted {
        current.mounted = false;
        if !is_root {
            log::debug!("[Mount] Removing {}", current.widget_id);
            host.remove_widget(&current.widget_id);
        }
    }
    tree.sever(node);
}

/// Unmount every child of `element` and empty its child chain.
pub fn clear_element_children(
    tree: &mut HostTree,
    identity: &mut IdentityTable,
    host: &dyn HostRuntime,
    element: NodeId,
) {
    for child in tree.children(element).into_iter().rev() {
        unmount_subtree(tree, identity, host, child);
    }
    if let Some(node) = tree.get_mut(element) {
        node.first_child = None;
        node.last_child = None;
    }
}
