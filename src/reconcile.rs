//! Reconciliation engine.
//!
//! [`Reconciler`] is the renderer contract the reactive framework drives:
//! node creation, attribute writes, insertion and removal, text replacement
//! and tree navigation. It owns the host tree, the identity table and the
//! event router, and keeps every remote effect of those operations in step
//! with the local tree through [`crate::mount`] and [`crate::props`].
//!
//! # Reactivity
//!
//! Reactive attributes ([`Prop::Reactive`]) and dynamic child lists
//! ([`View::Dynamic`]) each get an effect from the injected [`Reactive`]
//! scheduler. Attribute effects re-apply only on change. Child-list effects
//! rebuild coarsely: all children of the element are unmounted, then the new
//! list is materialized and mounted. Elements are memoized by `Rc<ElementView>`
//! identity, so a view that survives a re-render keeps its widget identity.
//!
//! # Borrowing
//!
//! Engine state sits behind one `RefCell`. No borrow is held while an effect
//! is opened, a cleanup runs, a handler is invoked or the host is called, since
//! each of those can call back into the engine. Widget calls made while walking
//! the tree go through a [`DeferredHost`] and reach the host after the borrow
//! ends.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::SecondaryMap;

use crate::error::{Error, Result};
use crate::host::{Capability, DeferredHost, EventCallback, HostRuntime, WILDCARD};
use crate::mount::{self, IdentityTable};
use crate::props::{self, PropValue};
use crate::protocol::UiEvent;
use crate::reactive::{Cleanup, Reactive};
use crate::router::{self, action_for_prop, EventRouter};
use crate::tree::{HostNode, HostTree, NodeBuilder, NodeId, NodeKind};
use crate::view::{ElementView, Flat, Prop, View};

/// Where and how [`Reconciler::render`] attaches a UI.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Existing root to render into; a new one is created when `None`.
    pub root: Option<NodeId>,
    /// Remote container for a new root; the host root when `None`.
    pub parent: Option<String>,
    /// Window title, applied when the host supports window control.
    pub title: Option<String>,
    /// Window size, applied when the host supports window control.
    pub size: Option<(u32, u32)>,
}

impl RenderOptions {
    /// Defaults: new root under the host root, window untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render into `root`.
    pub fn root(mut self, root: NodeId) -> Self {
        self.root = Some(root);
        self
    }

    /// Attach a new root under remote container `parent`.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the window title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Resize the window.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }
}

#[derive(Default)]
struct NodeEffects {
    props: HashMap<String, Cleanup>,
    children: Option<Cleanup>,
}

impl NodeEffects {
    fn into_cleanups(self) -> Vec<Cleanup> {
        self.props.into_values().chain(self.children).collect()
    }
}

enum EffectSlot {
    Prop(String),
    Children,
}

#[derive(Default)]
struct State {
    tree: HostTree,
    identity: IdentityTable,
    router: EventRouter,
    effects: SecondaryMap<NodeId, NodeEffects>,
    memo: HashMap<usize, (Weak<ElementView>, NodeId)>,
    memo_keys: SecondaryMap<NodeId, usize>,
}

impl State {
    fn node(&self, id: NodeId) -> Result<&HostNode> {
        self.tree.get(id).ok_or_else(|| stale(id))
    }

    /// Detached memoized node for `view`, if there is one to revive.
    fn revivable(&mut self, key: usize, view: &Rc<ElementView>) -> Option<NodeId> {
        let (weak, node) = self.memo.get(&key)?;
        if !weak.upgrade().is_some_and(|live| Rc::ptr_eq(&live, view)) {
            self.memo.remove(&key);
            return None;
        }
        let node = *node;
        self.tree
            .get(node)
            .filter(|n| n.is_detached() && !n.mounted)
            .map(|_| node)
    }

    fn remember(&mut self, key: usize, view: &Rc<ElementView>, node: NodeId) {
        let current = self
            .memo
            .get(&key)
            .is_some_and(|(weak, existing)| weak.upgrade().is_some() && self.tree.contains(*existing));
        if !current {
            self.memo.insert(key, (Rc::downgrade(view), node));
            self.memo_keys.insert(node, key);
        }
    }

    /// Drop `id` from every table. Returns the effect cleanups to run.
    fn discard(&mut self, id: NodeId) -> Vec<Cleanup> {
        let cleanups = self
            .effects
            .remove(id)
            .map(NodeEffects::into_cleanups)
            .unwrap_or_default();
        if let Some(key) = self.memo_keys.remove(id) {
            if self.memo.get(&key).is_some_and(|(_, n)| *n == id) {
                self.memo.remove(&key);
            }
        }
        if let Some(node) = self.tree.remove(id) {
            if self.identity.lookup(&node.widget_id) == Some(id) {
                self.identity.unregister(&node.widget_id);
            }
        }
        cleanups
    }
}

struct Inner {
    host: Rc<dyn HostRuntime>,
    reactive: Rc<dyn Reactive>,
    builder: NodeBuilder,
    state: RefCell<State>,
}

fn stale(id: NodeId) -> Error {
    Error::StaleNode(format!("{id:?}"))
}

fn run_all(cleanups: Vec<Cleanup>) {
    for cleanup in cleanups {
        cleanup();
    }
}

/// Renderer contract over a remote widget host.
///
/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct Reconciler {
    inner: Rc<Inner>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Reconciler")
            .field("nodes", &state.tree.len())
            .field("mounted_elements", &state.identity.len())
            .field("subscribed", &state.router.is_subscribed())
            .finish()
    }
}

impl Reconciler {
    /// Engine driving `host`, with effects from `reactive`.
    pub fn new(host: Rc<dyn HostRuntime>, reactive: Rc<dyn Reactive>) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                reactive,
                builder: NodeBuilder::new(),
                state: RefCell::new(State::default()),
            }),
        }
    }

    /// The host this engine drives.
    pub fn host(&self) -> &Rc<dyn HostRuntime> {
        &self.inner.host
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.inner.state.borrow_mut())
    }

    fn downgrade(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    /// New root attaching under remote container `parent_widget_id`.
    ///
    /// Roots count as mounted from the start: children inserted into them
    /// are created on the host right away.
    pub fn create_root(&self, parent_widget_id: Option<&str>) -> NodeId {
        let mut node = self.inner.builder.build_root(parent_widget_id.map(str::to_string));
        node.mounted = true;
        self.with_state(|s| s.tree.insert(node))
    }

    /// New detached, unmounted element.
    pub fn create_host_element(&self, tag: &str) -> NodeId {
        let node = self.inner.builder.build_element(self.inner.host.as_ref(), tag);
        self.with_state(|s| s.tree.insert(node))
    }

    /// New detached, unmounted text node.
    pub fn create_host_text(&self, text: &str) -> NodeId {
        let node = self.inner.builder.build_text(self.inner.host.as_ref(), text);
        self.with_state(|s| s.tree.insert(node))
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Write attribute `name` on element `node`.
    ///
    /// A static value is stored and, when the element is mounted, applied on
    /// the host. `prev` names the value being replaced for handler swaps; the
    /// stored value is used when it is `None`. A reactive value opens an
    /// effect that re-applies on change. Either way any effect previously
    /// bound to the same attribute is stopped.
    pub fn set_host_property(
        &self,
        node: NodeId,
        name: &str,
        value: impl Into<Prop>,
        prev: Option<&PropValue>,
    ) -> Result<()> {
        self.stop_effect(node, &EffectSlot::Prop(name.to_string()));
        match value.into() {
            Prop::Static(value) => self.apply_property(node, name, value, prev),
            Prop::Reactive(accessor) => self.bind_reactive_property(node, name, accessor),
        }
    }

    fn apply_property(&self, node: NodeId, name: &str, value: PropValue, prev: Option<&PropValue>) -> Result<()> {
        let action = action_for_prop(name);
        let (widget_id, kind, mounted, added_handler) = {
            let mut state = self.inner.state.borrow_mut();
            let n = state.tree.get_mut(node).ok_or_else(|| stale(node))?;
            let widget_id = n.widget_id.clone();
            let mounted = n.mounted;
            let element = n
                .element_mut()
                .ok_or_else(|| Error::NotAnElement(widget_id.clone()))?;
            props::check_usage(&element.kind, name, &value)?;

            let mut added_handler = false;
            if let Some(action) = &action {
                let stored = element.props.get(name).cloned();
                let prev = prev.cloned().or(stored);
                added_handler = router::set_handler(
                    &mut element.handlers,
                    action,
                    value.as_handler(),
                    prev.as_ref().and_then(PropValue::as_handler),
                );
            }
            if value.is_null() {
                element.props.remove(name);
            } else {
                element.props.insert(name.to_string(), value.clone());
            }
            (widget_id, element.kind.clone(), mounted, added_handler)
        };

        if added_handler {
            self.ensure_subscribed();
        }
        if mounted && action.is_none() {
            props::apply_mounted(self.inner.host.as_ref(), &widget_id, &kind, name, &value)?;
        }
        Ok(())
    }

    fn bind_reactive_property(
        &self,
        node: NodeId,
        name: &str,
        accessor: Rc<dyn Fn() -> PropValue>,
    ) -> Result<()> {
        self.with_state(|s| {
            let n = s.node(node)?;
            n.element()
                .map(|_| ())
                .ok_or_else(|| Error::NotAnElement(n.widget_id.clone()))
        })?;

        let weak = self.downgrade();
        let attr = name.to_string();
        let first_error: Rc<RefCell<Option<Error>>> = Rc::new(RefCell::new(None));
        let error_slot = Rc::clone(&first_error);
        let mut prev: Option<PropValue> = None;
        let mut first_run = true;

        let cleanup = self.inner.reactive.effect(Box::new(move || {
            let value = accessor();
            let is_first = std::mem::replace(&mut first_run, false);
            if prev.as_ref() == Some(&value) {
                return;
            }
            let Some(engine) = Self::upgrade(&weak) else {
                return;
            };
            match engine.apply_property(node, &attr, value.clone(), prev.as_ref()) {
                Ok(()) => prev = Some(value),
                Err(e) if is_first => *error_slot.borrow_mut() = Some(e),
                Err(e) => log::error!("[Reconciler] Updating '{}' failed: {}", attr, e),
            }
        }));

        let error = first_error.borrow_mut().take();
        if let Some(e) = error {
            cleanup();
            return Err(e);
        }
        self.store_effect(node, EffectSlot::Prop(name.to_string()), cleanup);
        Ok(())
    }

    fn store_effect(&self, node: NodeId, slot: EffectSlot, cleanup: Cleanup) {
        let displaced = self.with_state(|s| {
            if !s.tree.contains(node) {
                return Some(cleanup);
            }
            let Some(entry) = s.effects.entry(node) else {
                return Some(cleanup);
            };
            let effects = entry.or_default();
            match slot {
                EffectSlot::Prop(name) => effects.props.insert(name, cleanup),
                EffectSlot::Children => effects.children.replace(cleanup),
            }
        });
        if let Some(cleanup) = displaced {
            cleanup();
        }
    }

    fn stop_effect(&self, node: NodeId, slot: &EffectSlot) {
        let cleanup = self.with_state(|s| {
            let effects = s.effects.get_mut(node)?;
            match slot {
                EffectSlot::Prop(name) => effects.props.remove(name),
                EffectSlot::Children => effects.children.take(),
            }
        });
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    fn stop_all_effects(&self, node: NodeId) {
        let cleanups = self.with_state(|s| {
            s.effects
                .remove(node)
                .map(NodeEffects::into_cleanups)
                .unwrap_or_default()
        });
        run_all(cleanups);
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn ensure_subscribed(&self) {
        if self.is_subscribed() {
            return;
        }
        let weak = self.downgrade();
        let callback: EventCallback = Rc::new(move |event: &UiEvent| {
            if let Some(engine) = Self::upgrade(&weak) {
                engine.dispatch(event);
            }
        });
        let subscription = self.inner.host.on(WILDCARD, callback);
        if let Some(extra) = self.with_state(|s| s.router.attach(subscription)) {
            extra.cancel();
        }
    }

    /// Route a host event to the handlers of the element it names.
    ///
    /// Events for unknown or unmounted widgets are dropped. Returns how many
    /// handlers completed without error.
    pub fn dispatch(&self, event: &UiEvent) -> usize {
        let Some(widget_id) = event.widget_id.as_deref() else {
            return 0;
        };
        let action = router::resolve_action(event);
        let handlers = self.with_state(|s| {
            s.identity
                .lookup(widget_id)
                .and_then(|node| s.tree.get(node))
                .and_then(HostNode::element)
                .map(|element| router::collect_handlers(&element.handlers, action))
                .unwrap_or_default()
        });
        if handlers.is_empty() {
            log::trace!("[Router] No handler for '{}' on {}", action, widget_id);
            return 0;
        }
        router::invoke(&handlers, event)
    }

    /// Whether the wildcard event listener is registered.
    pub fn is_subscribed(&self) -> bool {
        self.with_state(|s| s.router.is_subscribed())
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Append `node` to `parent`'s children.
    pub fn append_host_node(&self, parent: NodeId, node: NodeId) -> Result<()> {
        self.insert_node(parent, node, None)
    }

    /// Link detached `node` into `parent` before `anchor` (at the end when
    /// `anchor` is `None` or not a child of `parent`), creating it on the host
    /// when `parent` is mounted.
    ///
    /// The host has no positional insert, so a mounted node inserted before
    /// an anchor lands last among its remote siblings.
    pub fn insert_node(&self, parent: NodeId, node: NodeId, anchor: Option<NodeId>) -> Result<()> {
        let host = Rc::clone(&self.inner.host);
        let calls = DeferredHost::new(host.as_ref());
        let result = self.link(parent, node, anchor, &calls);
        calls.replay();
        result
    }

    fn link(&self, parent: NodeId, node: NodeId, anchor: Option<NodeId>, host: &dyn HostRuntime) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();
        let State { tree, identity, .. } = &mut *state;

        let p = tree.get(parent).ok_or_else(|| stale(parent))?;
        if matches!(p.kind, NodeKind::Text { .. }) {
            return Err(Error::NotAnElement(p.widget_id.clone()));
        }
        let parent_mounted = p.mounted;

        let n = tree.get(node).ok_or_else(|| stale(node))?;
        if n.is_root() || n.parent.is_some() {
            return Err(Error::Usage(format!(
                "{} is already attached; remove it before inserting it again",
                n.widget_id
            )));
        }
        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == node {
                return Err(Error::Usage(format!("{} cannot be inserted into its own subtree", n.widget_id)));
            }
            cursor = tree.get(ancestor).and_then(|a| a.parent);
        }

        tree.insert_before(parent, node, anchor);
        if parent_mounted {
            let parent_id = mount::child_parent_id(tree, parent);
            mount::mount_subtree(tree, identity, host, node, parent_id.as_deref())?;
        }
        Ok(())
    }

    /// Unlink `node` from `parent`, remove its subtree from the host, and
    /// discard it. The handle and every handle below it go stale.
    pub fn remove_node(&self, parent: NodeId, node: NodeId) -> Result<()> {
        let host = Rc::clone(&self.inner.host);
        let calls = DeferredHost::new(host.as_ref());
        let cleanups = {
            let mut state = self.inner.state.borrow_mut();
            let n = state.node(node)?;
            if n.parent != Some(parent) {
                return Err(Error::Usage(format!("{} is not a child of the given parent", n.widget_id)));
            }
            let mut subtree = vec![node];
            subtree.extend(state.tree.descendants(node));

            state.tree.unlink(node);
            let State { tree, identity, .. } = &mut *state;
            mount::unmount_subtree(tree, identity, &calls, node);

            subtree
                .into_iter()
                .flat_map(|id| state.discard(id))
                .collect::<Vec<_>>()
        };
        calls.replay();
        run_all(cleanups);
        Ok(())
    }

    /// Replace the text of text node `node`.
    pub fn replace_text(&self, node: NodeId, text: &str) -> Result<()> {
        let (widget_id, mounted) = self.with_state(|s| {
            let n = s.tree.get_mut(node).ok_or_else(|| stale(node))?;
            match &mut n.kind {
                NodeKind::Text { text: current } => {
                    text.clone_into(current);
                    Ok((n.widget_id.clone(), n.mounted))
                }
                _ => Err(Error::NotAText(n.widget_id.clone())),
            }
        })?;
        if mounted {
            self.inner.host.set_text(&widget_id, text);
        }
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    fn bind_children(&self, node: NodeId, children: Vec<View>) -> Result<()> {
        self.stop_effect(node, &EffectSlot::Children);
        let view = View::List(children);

        if !view.is_dynamic() {
            let mut flat = Vec::new();
            view.flatten_into(&mut flat);
            for item in flat {
                let child = self.materialize(item)?;
                self.insert_node(node, child, None)?;
            }
            return Ok(());
        }

        let weak = self.downgrade();
        let first_error: Rc<RefCell<Option<Error>>> = Rc::new(RefCell::new(None));
        let error_slot = Rc::clone(&first_error);
        let mut first_run = true;

        let cleanup = self.inner.reactive.effect(Box::new(move || {
            let mut flat = Vec::new();
            view.flatten_into(&mut flat);
            let is_first = std::mem::replace(&mut first_run, false);
            let Some(engine) = Self::upgrade(&weak) else {
                return;
            };
            match engine.rebuild_children(node, flat) {
                Ok(()) => {}
                Err(e) if is_first => *error_slot.borrow_mut() = Some(e),
                Err(e) => log::error!("[Reconciler] Rebuilding children failed: {}", e),
            }
        }));

        let error = first_error.borrow_mut().take();
        if let Some(e) = error {
            cleanup();
            return Err(e);
        }
        self.store_effect(node, EffectSlot::Children, cleanup);
        Ok(())
    }

    /// Replace every child of `node` with `items`.
    ///
    /// All old children are removed on the host before any new child is
    /// created. Old descendants that were not revived are discarded.
    fn rebuild_children(&self, node: NodeId, items: Vec<Flat>) -> Result<()> {
        let host = Rc::clone(&self.inner.host);
        let calls = DeferredHost::new(host.as_ref());
        let old = self.with_state(|s| {
            s.node(node)?;
            let old = s.tree.descendants(node);
            let State { tree, identity, .. } = s;
            mount::clear_element_children(tree, identity, &calls, node);
            Ok::<_, Error>(old)
        })?;
        calls.replay();

        let mut result = Ok(());
        for item in items {
            if let Err(e) = self
                .materialize(item)
                .and_then(|child| self.insert_node(node, child, None))
            {
                result = Err(e);
                break;
            }
        }

        let cleanups = self.with_state(|s| {
            let mut cleanups = Vec::new();
            for id in old {
                let garbage = s.tree.get(id).is_some_and(|n| n.parent.is_none() && !n.mounted);
                if garbage {
                    cleanups.extend(s.discard(id));
                }
            }
            cleanups
        });
        run_all(cleanups);
        result
    }

    fn materialize(&self, item: Flat) -> Result<NodeId> {
        match item {
            Flat::Text(text) => Ok(self.create_host_text(&text)),
            Flat::Element(view) => self.materialize_element(&view),
        }
    }

    fn materialize_element(&self, view: &Rc<ElementView>) -> Result<NodeId> {
        let key = Rc::as_ptr(view) as usize;
        let node = match self.with_state(|s| s.revivable(key, view)) {
            Some(node) => {
                self.reset_element(node);
                node
            }
            None => {
                let node = self.create_host_element(&view.tag);
                self.with_state(|s| s.remember(key, view, node));
                node
            }
        };

        for (name, prop) in &view.props {
            self.set_host_property(node, name, prop.clone(), None)?;
        }
        self.bind_children(node, view.children.clone())?;
        Ok(node)
    }

    /// Forget the attributes, handlers and effects of a detached element so
    /// it can be repopulated under the same identity.
    fn reset_element(&self, node: NodeId) {
        self.stop_all_effects(node);
        self.with_state(|s| {
            if let Some(element) = s.tree.get_mut(node).and_then(HostNode::element_mut) {
                element.props.clear();
                element.handlers.clear();
            }
        });
    }

    /// Render the view returned by `render_fn` into a root and return it.
    pub fn render(&self, render_fn: impl FnOnce() -> View, options: RenderOptions) -> Result<NodeId> {
        let root = match options.root {
            Some(root) => {
                let is_root = self.with_state(|s| s.node(root).map(HostNode::is_root))?;
                if !is_root {
                    return Err(Error::Usage("render target is not a root".to_string()));
                }
                root
            }
            None => self.create_root(options.parent.as_deref()),
        };

        if options.title.is_some() || options.size.is_some() {
            let host = &self.inner.host;
            if host.supports(Capability::Window) {
                if let Some(title) = &options.title {
                    host.set_title(title);
                }
                if let Some((width, height)) = options.size {
                    host.resize_window(width, height);
                }
            } else {
                log::debug!("[Reconciler] Host has no window control; ignoring title and size");
            }
        }

        let view = render_fn();
        self.bind_children(root, vec![view])?;
        Ok(root)
    }

    /// Cancel the event subscription, clear the identity table and stop
    /// every effect. The host connection is left alone.
    pub fn dispose(&self) {
        let (subscription, cleanups) = self.with_state(|s| {
            s.identity.clear();
            s.memo.clear();
            s.memo_keys.clear();
            let cleanups: Vec<Cleanup> = s
                .effects
                .drain()
                .flat_map(|(_, effects)| effects.into_cleanups())
                .collect();
            (s.router.take_subscription(), cleanups)
        });
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        run_all(cleanups);
        log::debug!("[Reconciler] Disposed");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Parent of `node`.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.with_state(|s| s.tree.get(node)?.parent)
    }

    /// First child of `node`.
    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.with_state(|s| s.tree.get(node)?.first_child)
    }

    /// Next sibling of `node`.
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.with_state(|s| s.tree.get(node)?.next_sibling)
    }

    /// Children of `node` in order.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.with_state(|s| s.tree.children(node))
    }

    /// Widget identity of `node`.
    pub fn widget_id(&self, node: NodeId) -> Option<String> {
        self.with_state(|s| s.tree.get(node).map(|n| n.widget_id.clone()))
    }

    /// Whether `node` currently has a host counterpart.
    pub fn is_mounted(&self, node: NodeId) -> bool {
        self.with_state(|s| s.tree.get(node).is_some_and(|n| n.mounted))
    }

    /// Whether `node` still exists.
    pub fn contains(&self, node: NodeId) -> bool {
        self.with_state(|s| s.tree.contains(node))
    }

    /// Mounted element registered under `widget_id`.
    pub fn lookup(&self, widget_id: &str) -> Option<NodeId> {
        self.with_state(|s| s.identity.lookup(widget_id))
    }

    /// Stored value of attribute `name` on element `node`.
    pub fn property(&self, node: NodeId, name: &str) -> Option<PropValue> {
        self.with_state(|s| s.tree.get(node)?.element()?.props.get(name).cloned())
    }

    /// Number of handlers `node` has for `action`.
    pub fn handler_count(&self, node: NodeId, action: &str) -> usize {
        self.with_state(|s| {
            s.tree
                .get(node)
                .and_then(HostNode::element)
                .and_then(|e| e.handlers.get(action))
                .map_or(0, Vec::len)
        })
    }

    /// Current text of text node `node`.
    pub fn text(&self, node: NodeId) -> Option<String> {
        self.with_state(|s| match &s.tree.get(node)?.kind {
            NodeKind::Text { text } => Some(text.clone()),
            _ => None,
        })
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.with_state(|s| s.tree.len())
    }

    /// Number of mounted elements.
    pub fn mounted_count(&self) -> usize {
        self.with_state(|s| s.identity.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, StyleValue, WidgetKind};
    use crate::router::Handler;
    use crate::test_support::{RecordingHost, Signal, TestReactive};
    use std::cell::Cell;

    fn setup_with(host: RecordingHost) -> (Rc<RecordingHost>, Rc<TestReactive>, Reconciler) {
        let host = Rc::new(host);
        let reactive = TestReactive::new();
        let engine = Reconciler::new(
            Rc::clone(&host) as Rc<dyn HostRuntime>,
            Rc::clone(&reactive) as Rc<dyn Reactive>,
        );
        (host, reactive, engine)
    }

    fn setup() -> (Rc<RecordingHost>, Rc<TestReactive>, Reconciler) {
        setup_with(RecordingHost::new())
    }

    /// `(id, parent_id)` of every create command.
    fn created(commands: &[Command]) -> Vec<(String, Option<String>)> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::CreateWidget { id, parent_id, .. } => Some((id.clone(), parent_id.clone())),
                _ => None,
            })
            .collect()
    }

    fn removed(commands: &[Command]) -> Vec<String> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::RemoveWidget { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn owned(id: &str, parent: Option<&str>) -> (String, Option<String>) {
        (id.to_string(), parent.map(str::to_string))
    }

    #[test]
    fn test_click_reaches_handler_until_removed() {
        let (host, _reactive, engine) = setup();
        let clicks = Rc::new(Cell::new(0));
        let c = Rc::clone(&clicks);

        let root = engine
            .render(
                move || {
                    ElementView::new("button")
                        .on("click", move |_| c.set(c.get() + 1))
                        .child("Go")
                        .into()
                },
                RenderOptions::new(),
            )
            .unwrap();
        let button = engine.first_child(root).unwrap();

        let commands = host.take();
        assert_eq!(
            created(&commands),
            vec![owned("el_2", None), owned("text_3", Some("el_2"))]
        );
        assert!(matches!(
            &commands[1],
            Command::CreateWidget { text: Some(text), kind: WidgetKind::Label, .. } if text == "Go"
        ));

        host.deliver(&UiEvent::widget_action("el_2", "click"));
        assert_eq!(clicks.get(), 1);

        engine.remove_node(root, button).unwrap();
        assert_eq!(removed(&host.take()), vec!["text_3", "el_2"]);
        assert!(!engine.contains(button));

        host.deliver(&UiEvent::widget_action("el_2", "click"));
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn test_cleared_handler_stops_firing() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(None);
        let column = engine.create_host_element("column");
        let button = engine.create_host_element("button");
        engine.append_host_node(root, column).unwrap();

        let clicks = Rc::new(Cell::new(0));
        let c = Rc::clone(&clicks);
        let handler = Handler::from_fn(move |_| c.set(c.get() + 1));
        engine
            .set_host_property(button, "onClick", handler.clone(), None)
            .unwrap();
        engine.append_host_node(column, button).unwrap();

        let click = UiEvent::widget_action("el_3", "click");
        host.deliver(&click);
        assert_eq!(clicks.get(), 1);

        engine
            .set_host_property(button, "onClick", PropValue::Null, Some(&PropValue::from(handler)))
            .unwrap();
        host.deliver(&click);
        assert_eq!(clicks.get(), 1);
        assert_eq!(engine.handler_count(button, "click"), 0);
    }

    #[test]
    fn test_unknown_widget_is_dropped() {
        let (host, _reactive, engine) = setup();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        engine
            .render(
                move || ElementView::new("button").on("click", move |_| f.set(true)).into(),
                RenderOptions::new(),
            )
            .unwrap();

        assert_eq!(engine.dispatch(&UiEvent::widget_action("el_99", "click")), 0);
        assert_eq!(engine.dispatch(&UiEvent::default()), 0);
        host.deliver(&UiEvent::widget_action("el_2", "hover"));
        assert!(!fired.get());
    }

    #[test]
    fn test_wildcard_handler_sees_every_action() {
        let (_host, _reactive, engine) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        engine
            .render(
                move || {
                    ElementView::new("slider")
                        .on("*", move |e| s.borrow_mut().push(e.action.clone()))
                        .into()
                },
                RenderOptions::new(),
            )
            .unwrap();

        let changed = UiEvent::widget_action("el_2", "valueChanged").with_value(0.3);
        assert_eq!(engine.dispatch(&changed), 1);
        assert_eq!(*seen.borrow(), vec![Some("valueChanged".to_string())]);
    }

    #[test]
    fn test_rebuild_removes_before_creating() {
        let (host, _reactive, engine) = setup();
        let items = Signal::new(vec!["a".to_string(), "b".to_string()]);
        let list = items.clone();

        engine
            .render(
                move || {
                    let list = list.clone();
                    ElementView::new("column")
                        .child(View::dynamic(move || {
                            list.get()
                                .into_iter()
                                .map(|text| View::from(ElementView::new("label").prop("text", text)))
                                .collect::<Vec<_>>()
                                .into()
                        }))
                        .into()
                },
                RenderOptions::new(),
            )
            .unwrap();
        assert_eq!(
            created(&host.take()),
            vec![owned("el_2", None), owned("el_3", Some("el_2")), owned("el_4", Some("el_2"))]
        );

        items.set(vec!["c".to_string()]);
        let commands = host.take();
        assert_eq!(
            commands
                .iter()
                .map(|c| match c {
                    Command::RemoveWidget { id } => format!("remove {id}"),
                    Command::CreateWidget { id, .. } => format!("create {id}"),
                    other => format!("{other:?}"),
                })
                .collect::<Vec<_>>(),
            vec!["remove el_4", "remove el_3", "create el_5"]
        );
        assert_eq!(engine.node_count(), 3);
        assert!(engine.lookup("el_3").is_none());
        assert!(engine.lookup("el_5").is_some());
    }

    #[test]
    fn test_reactive_property_applies_only_on_change() {
        let (host, _reactive, engine) = setup();
        let text = Signal::new("one".to_string());
        let t = text.clone();

        engine
            .render(
                move || ElementView::new("label").bind("text", move || t.get()).into(),
                RenderOptions::new(),
            )
            .unwrap();
        assert!(matches!(
            &host.take()[..],
            [Command::CreateWidget { text: Some(text), .. }] if text == "one"
        ));

        text.set("two".to_string());
        text.set("two".to_string());
        assert_eq!(
            host.take(),
            vec![Command::SetText {
                id: "el_2".to_string(),
                text: "two".to_string()
            }]
        );
    }

    #[test]
    fn test_memoized_element_keeps_identity() {
        let (host, _reactive, engine) = setup();
        let label = Rc::new(ElementView::new("label").prop("text", "kept"));
        let extra = Signal::new(false);
        let (l, e) = (Rc::clone(&label), extra.clone());

        engine
            .render(
                move || {
                    let (l, e) = (Rc::clone(&l), e.clone());
                    ElementView::new("column")
                        .child(View::dynamic(move || {
                            let mut items = vec![View::from(Rc::clone(&l))];
                            if e.get() {
                                items.push(ElementView::new("label").prop("text", "extra").into());
                            }
                            View::List(items)
                        }))
                        .into()
                },
                RenderOptions::new(),
            )
            .unwrap();
        host.take();

        extra.set(true);
        let commands = host.take();
        assert_eq!(removed(&commands), vec!["el_3"]);
        assert_eq!(
            created(&commands),
            vec![owned("el_3", Some("el_2")), owned("el_4", Some("el_2"))]
        );
        assert!(engine.lookup("el_3").is_some());
        assert_eq!(engine.node_count(), 4);
    }

    #[test]
    fn test_dispose_stops_effects_and_listener() {
        let (host, reactive, engine) = setup();
        let text = Signal::new("a".to_string());
        let t = text.clone();

        engine
            .render(
                move || {
                    ElementView::new("button")
                        .on("click", |_| {})
                        .child(ElementView::new("label").bind("text", move || t.get()))
                        .into()
                },
                RenderOptions::new(),
            )
            .unwrap();
        assert_eq!(reactive.active_effects(), 1);
        assert_eq!(host.listener_count(), 1);
        host.take();

        engine.dispose();
        assert_eq!(reactive.active_effects(), 0);
        assert_eq!(host.listener_count(), 0);
        assert!(!engine.is_subscribed());
        assert_eq!(engine.mounted_count(), 0);

        text.set("b".to_string());
        assert!(host.take().is_empty());
    }

    #[test]
    fn test_removed_handles_go_stale() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(None);
        let column = engine.create_host_element("column");
        let label = engine.create_host_element("label");
        engine.set_host_property(label, "text", "hi", None).unwrap();
        engine.append_host_node(column, label).unwrap();
        assert!(host.commands().is_empty());

        engine.append_host_node(root, column).unwrap();
        assert_eq!(
            created(&host.take()),
            vec![owned("el_2", None), owned("el_3", Some("el_2"))]
        );

        assert!(matches!(engine.remove_node(column, root), Err(Error::Usage(_))));
        engine.remove_node(root, column).unwrap();
        assert_eq!(removed(&host.take()), vec!["el_3", "el_2"]);

        assert!(matches!(
            engine.set_host_property(label, "text", "x", None),
            Err(Error::StaleNode(_))
        ));
        assert!(matches!(engine.remove_node(root, column), Err(Error::StaleNode(_))));
        assert_eq!(engine.node_count(), 1);
    }

    #[test]
    fn test_replace_text() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(None);
        let text = engine.create_host_text("before");
        engine.replace_text(text, "detached").unwrap();
        assert!(host.commands().is_empty());

        engine.append_host_node(root, text).unwrap();
        host.take();
        engine.replace_text(text, "after").unwrap();
        assert_eq!(
            host.take(),
            vec![Command::SetText {
                id: "text_2".to_string(),
                text: "after".to_string()
            }]
        );
        assert_eq!(engine.text(text).as_deref(), Some("after"));

        let element = engine.create_host_element("label");
        assert!(matches!(engine.replace_text(element, "x"), Err(Error::NotAText(_))));
    }

    #[test]
    fn test_insert_before_anchor() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(None);
        let a = engine.create_host_element("label");
        let b = engine.create_host_element("label");
        let c = engine.create_host_element("label");
        engine.append_host_node(root, a).unwrap();
        engine.append_host_node(root, b).unwrap();
        engine.insert_node(root, c, Some(b)).unwrap();

        assert_eq!(engine.children(root), vec![a, c, b]);
        assert_eq!(engine.next_sibling(a), Some(c));
        assert_eq!(engine.parent(c), Some(root));
        // The host has no positional insert.
        assert_eq!(
            created(&host.take()),
            vec![owned("el_2", None), owned("el_3", None), owned("el_4", None)]
        );

        assert!(matches!(engine.insert_node(root, a, None), Err(Error::Usage(_))));
        assert!(matches!(engine.append_host_node(a, root), Err(Error::Usage(_))));
    }

    #[test]
    fn test_insert_into_own_subtree_is_rejected() {
        let (_host, _reactive, engine) = setup();
        let column = engine.create_host_element("column");
        let inner = engine.create_host_element("row");
        engine.append_host_node(column, inner).unwrap();
        assert!(matches!(engine.append_host_node(inner, column), Err(Error::Usage(_))));

        let text = engine.create_host_text("leaf");
        let other = engine.create_host_element("label");
        assert!(matches!(engine.append_host_node(text, other), Err(Error::NotAnElement(_))));
    }

    #[test]
    fn test_root_under_remote_container() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(Some("panel"));
        let label = engine.create_host_element("label");
        engine.append_host_node(root, label).unwrap();
        assert_eq!(created(&host.take()), vec![owned("el_2", Some("panel"))]);

        // Roots never reach the host
        assert!(engine.lookup("root_1").is_none());
        assert_eq!(engine.widget_id(root).as_deref(), Some("root_1"));
    }

    #[test]
    fn test_render_window_options_need_capability() {
        let (host, _reactive, engine) = setup();
        engine
            .render(
                || View::Empty,
                RenderOptions::new().title("Demo").size(640, 480),
            )
            .unwrap();
        assert_eq!(
            host.take(),
            vec![
                Command::SetTitle {
                    title: "Demo".to_string()
                },
                Command::ResizeWindow {
                    width: 640,
                    height: 480
                },
            ]
        );

        let (host, _reactive, engine) = setup_with(RecordingHost::without_capabilities());
        engine
            .render(|| View::Empty, RenderOptions::new().title("Demo"))
            .unwrap();
        assert!(host.take().is_empty());
    }

    #[test]
    fn test_render_into_existing_root() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(Some("slot"));
        let rendered = engine
            .render(|| View::text("hello"), RenderOptions::new().root(root))
            .unwrap();
        assert_eq!(rendered, root);
        assert_eq!(created(&host.take()), vec![owned("text_2", Some("slot"))]);

        let label = engine.create_host_element("label");
        assert!(matches!(
            engine.render(|| View::Empty, RenderOptions::new().root(label)),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_button_text_is_rejected() {
        let (host, reactive, engine) = setup();
        let button = engine.create_host_element("button");
        assert!(matches!(
            engine.set_host_property(button, "text", "Go", None),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            engine.set_host_property(button, "text", Prop::reactive(|| "Go"), None),
            Err(Error::Usage(_))
        ));
        assert_eq!(reactive.active_effects(), 0);
        assert!(engine.property(button, "text").is_none());
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_subscription_is_lazy_and_shared() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(None);
        let label = engine.create_host_element("label");
        engine.set_host_property(label, "text", "plain", None).unwrap();
        engine.append_host_node(root, label).unwrap();
        assert_eq!(host.listener_count(), 0);
        assert!(!engine.is_subscribed());

        let first = engine.create_host_element("button");
        let second = engine.create_host_element("button");
        engine
            .set_host_property(first, "onClick", Handler::from_fn(|_| {}), None)
            .unwrap();
        engine
            .set_host_property(second, "onClick", Handler::from_fn(|_| {}), None)
            .unwrap();
        assert_eq!(host.listener_count(), 1);
        assert!(engine.is_subscribed());
    }

    #[test]
    fn test_handler_swap_uses_stored_value() {
        let (_host, _reactive, engine) = setup();
        let button = engine.create_host_element("button");
        let first = Handler::from_fn(|_| {});
        let second = Handler::from_fn(|_| {});

        engine.set_host_property(button, "onClick", first.clone(), None).unwrap();
        engine.set_host_property(button, "onClick", second, None).unwrap();
        assert_eq!(engine.handler_count(button, "click"), 1);

        let stored = engine.property(button, "onClick").unwrap();
        engine
            .set_host_property(button, "onClick", PropValue::Null, Some(&stored))
            .unwrap();
        assert_eq!(engine.handler_count(button, "click"), 0);
        assert!(engine.property(button, "onClick").is_none());
        assert_ne!(stored, PropValue::from(first));
    }

    #[test]
    fn test_mounted_writes_reach_host() {
        let (host, _reactive, engine) = setup();
        let root = engine.create_root(None);
        let label = engine.create_host_element("label");
        engine.append_host_node(root, label).unwrap();
        host.take();

        engine.set_host_property(label, "visible", false, None).unwrap();
        engine.set_host_property(label, "fontSize", 14, None).unwrap();
        engine.set_host_property(label, "visible", PropValue::Null, None).unwrap();
        assert_eq!(
            host.take(),
            vec![
                Command::SetVisible {
                    id: "el_2".to_string(),
                    visible: false
                },
                Command::SetStyleProperty {
                    id: "el_2".to_string(),
                    key: "font_size".to_string(),
                    value: StyleValue::Number(14.0)
                },
            ]
        );
        assert!(engine.property(label, "visible").is_none());
    }

    #[test]
    fn test_replacing_reactive_binding_stops_old_effect() {
        let (host, reactive, engine) = setup();
        let root = engine.create_root(None);
        let label = engine.create_host_element("label");
        engine.append_host_node(root, label).unwrap();

        let text = Signal::new("live".to_string());
        let t = text.clone();
        engine
            .set_host_property(label, "text", Prop::reactive(move || t.get()), None)
            .unwrap();
        assert_eq!(reactive.active_effects(), 1);

        engine.set_host_property(label, "text", "fixed", None).unwrap();
        assert_eq!(reactive.active_effects(), 0);
        host.take();

        text.set("ignored".to_string());
        assert!(host.take().is_empty());
        assert_eq!(engine.property(label, "text"), Some(PropValue::from("fixed")));
    }

    #[test]
    fn test_host_reporting_from_inside_create_reaches_handlers() {
        let (host, _reactive, engine) = setup_with(RecordingHost::with_echo("created"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);

        let root = engine
            .render(
                move || {
                    ElementView::new("button")
                        .on("created", move |e| s.borrow_mut().push(e.widget_id.clone()))
                        .child("Go")
                        .into()
                },
                RenderOptions::new(),
            )
            .unwrap();
        assert_eq!(*seen.borrow(), vec![Some("el_2".to_string())]);

        let button = engine.first_child(root).unwrap();
        engine.remove_node(root, button).unwrap();
        assert_eq!(removed(&host.take()), vec!["text_3", "el_2"]);
        assert_eq!(engine.mounted_count(), 0);
    }
}
