//! Event routing from host events to element handlers.
//!
//! One wildcard listener on the host's event stream serves the whole tree.
//! It is registered the first time any handler is added, so a static UI never
//! subscribes. Each event is routed by widget identity to the element's
//! handlers for the event's action plus its wildcard handlers.
//!
//! Handler failures are isolated: an `Err` or a panic from one handler is
//! logged and the remaining handlers still run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::host::{Subscription, WILDCARD};
use crate::protocol::UiEvent;

/// Callback attached to an element through an `on*` attribute.
///
/// Handlers compare by identity: two clones of the same handler are equal,
/// two handlers built from identical closures are not.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&UiEvent) -> anyhow::Result<()>>);

impl Handler {
    /// Wrap a fallible callback.
    pub fn new(callback: impl Fn(&UiEvent) -> anyhow::Result<()> + 'static) -> Self {
        Self(Rc::new(callback))
    }

    /// Wrap a callback that cannot fail.
    pub fn from_fn(callback: impl Fn(&UiEvent) + 'static) -> Self {
        Self::new(move |event| {
            callback(event);
            Ok(())
        })
    }

    /// Invoke the callback.
    pub fn call(&self, event: &UiEvent) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0))
    }
}

/// Action name for an event attribute: `onClick` → `click`,
/// `onValueChanged` → `valueChanged`, `onAny` → the wildcard action.
///
/// Returns `None` for attributes that are not `on` followed by an uppercase
/// letter.
pub fn action_for_prop(name: &str) -> Option<String> {
    let rest = name.strip_prefix("on")?;
    let mut chars = rest.chars();
    let first = chars.next().filter(char::is_ascii_uppercase)?;
    if rest == "Any" {
        return Some(WILDCARD.to_string());
    }
    Some(first.to_ascii_lowercase().to_string() + chars.as_str())
}

/// Action an incoming event is routed under; the wildcard when it has none.
pub fn resolve_action(event: &UiEvent) -> &str {
    event.action.as_deref().unwrap_or(WILDCARD)
}

/// Swap `prev` for `new` in the handler list of `action`.
///
/// An emptied list is removed from the map. Returns `true` when a handler was
/// added.
pub fn set_handler(
    handlers: &mut HashMap<String, Vec<Handler>>,
    action: &str,
    new: Option<&Handler>,
    prev: Option<&Handler>,
) -> bool {
    if let Some(prev) = prev {
        if let Some(list) = handlers.get_mut(action) {
            list.retain(|h| h != prev);
            if list.is_empty() {
                handlers.remove(action);
            }
        }
    }

    let Some(new) = new else {
        return false;
    };
    let list = handlers.entry(action.to_string()).or_default();
    if !list.contains(new) {
        list.push(new.clone());
    }
    true
}

/// Handlers to run for `action`: the action's own, then the wildcard ones.
pub fn collect_handlers(handlers: &HashMap<String, Vec<Handler>>, action: &str) -> Vec<Handler> {
    let mut out: Vec<Handler> = handlers.get(action).cloned().unwrap_or_default();
    if action != WILDCARD {
        if let Some(any) = handlers.get(WILDCARD) {
            out.extend(any.iter().cloned());
        }
    }
    out
}

/// Run `handlers` in order, logging each failure. Returns how many succeeded.
pub fn invoke(handlers: &[Handler], event: &UiEvent) -> usize {
    let widget = event.widget_id.as_deref().unwrap_or("?");
    let action = resolve_action(event);
    let mut ok = 0;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler.call(event))) {
            Ok(Ok(())) => ok += 1,
            Ok(Err(e)) => log::error!("[Router] Handler for '{}' on {} failed: {:#}", action, widget, e),
            Err(_) => log::error!("[Router] Handler for '{}' on {} panicked", action, widget),
        }
    }
    ok
}

/// Owner of the lazy wildcard subscription.
#[derive(Debug, Default)]
pub struct EventRouter {
    subscription: Option<Subscription>,
}

impl EventRouter {
    /// Router with no subscription yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the wildcard listener is registered.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Keep `subscription` as the wildcard listener.
    ///
    /// When one is already held the new one is handed back for the caller to
    /// cancel outside any borrow.
    pub fn attach(&mut self, subscription: Subscription) -> Option<Subscription> {
        if self.subscription.is_some() {
            return Some(subscription);
        }
        log::debug!("[Router] Subscribed to host events");
        self.subscription = Some(subscription);
        None
    }

    /// Hand back the subscription so the caller can cancel it outside any borrow.
    pub fn take_subscription(&mut self) -> Option<Subscription> {
        self.subscription.take()
    }
}
