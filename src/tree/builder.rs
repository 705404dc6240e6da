//! Fresh, detached host nodes with never-reused identities.

use std::cell::Cell;
use std::collections::HashMap;

use super::node::{ElementData, HostNode, NodeKind};
use crate::host::HostRuntime;
use crate::protocol::WidgetKind;

/// Issues host nodes and their widget identities.
///
/// Identities come from the host's generator when it has one; otherwise from
/// a local counter shared by every node kind, prefixed `el_`, `text_` or
/// `root_`. The counter only grows.
#[derive(Debug, Default)]
pub struct NodeBuilder {
    counter: Cell<u64>,
}

impl NodeBuilder {
    /// Builder starting at identity 1.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, host: &dyn HostRuntime, prefix: &str) -> String {
        if let Some(id) = host.next_id() {
            return id;
        }
        let n = self.counter.get() + 1;
        self.counter.set(n);
        format!("{prefix}_{n}")
    }

    /// Unmounted element for `tag`.
    pub fn build_element(&self, host: &dyn HostRuntime, tag: &str) -> HostNode {
        HostNode::new(
            self.next_id(host, "el"),
            NodeKind::Element(ElementData {
                tag: tag.to_string(),
                kind: WidgetKind::from_tag(tag),
                props: HashMap::new(),
                handlers: HashMap::new(),
            }),
        )
    }

    /// Unmounted text node.
    pub fn build_text(&self, host: &dyn HostRuntime, text: &str) -> HostNode {
        HostNode::new(
            self.next_id(host, "text"),
            NodeKind::Text {
                text: text.to_string(),
            },
        )
    }

    /// Root attaching under `parent_widget_id`. Roots never reach the host,
    /// so their identity is always local.
    pub fn build_root(&self, parent_widget_id: Option<String>) -> HostNode {
        let n = self.counter.get() + 1;
        self.counter.set(n);
        HostNode::new(format!("root_{n}"), NodeKind::Root { parent_widget_id })
    }
}
