//! Capability surface of the remote widget host.
//!
//! The reconciler never talks to the socket directly. It drives a
//! [`HostRuntime`]: a small set of widget-level calls plus an event
//! subscription. [`ProtocolHost`] implements it by turning every call into a
//! [`Command`] for a [`CommandSink`] (normally the [`Bridge`]); tests plug in
//! their own recording hosts.
//!
//! # Optional capabilities
//!
//! Image data replacement, video control and window management are optional.
//! Callers check [`HostRuntime::supports`] first; the default method bodies
//! are no-ops so a host without the capability silently ignores the call.
//!
//! # Events: "Subscribe once. React always."
//!
//! [`EventBus`] is a single-threaded pub/sub registry. Listeners register for
//! an event type or for [`WILDCARD`] and get a [`Subscription`] back that
//! unregisters them when cancelled.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::protocol::{Command, LogLevel, StyleValue, UiEvent, WidgetKind, WidgetParams, WidgetStyle};
use crate::socket::Bridge;

/// Event type that matches every event.
pub const WILDCARD: &str = "*";

/// Callback invoked with each matching host event.
pub type EventCallback = Rc<dyn Fn(&UiEvent)>;

/// Optional host features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `set_image_data` replaces an image widget's bytes.
    ImageData,
    /// `play_video`, `pause_video` and `seek_video`.
    Video,
    /// `set_title` and `resize_window`.
    Window,
}

/// Everything the host needs to create one widget.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetSpec {
    /// Widget identity.
    pub id: String,
    /// Widget kind.
    pub kind: WidgetKind,
    /// Parent widget identity; the host root container when `None`.
    pub parent_id: Option<String>,
    /// Initial literal text.
    pub text: Option<String>,
    /// Initial style.
    pub style: Option<WidgetStyle>,
    /// Kind-specific parameters.
    pub params: Option<WidgetParams>,
    /// Binary payload such as image bytes.
    pub data: Option<Vec<u8>>,
}

impl From<WidgetSpec> for Command {
    fn from(spec: WidgetSpec) -> Self {
        Command::CreateWidget {
            id: spec.id,
            kind: spec.kind,
            parent_id: spec.parent_id,
            text: spec.text,
            style: spec.style,
            params: spec.params,
            data: spec.data,
        }
    }
}

/// Handle for an event listener registration.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::cancel`] to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Subscription {
    /// Wrap an unsubscribe function.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unregister the listener.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Widget-level operations the reconciler needs from the host.
pub trait HostRuntime {
    /// Create a widget.
    fn create_widget(&self, spec: WidgetSpec);

    /// Remove a widget.
    fn remove_widget(&self, id: &str);

    /// Replace a widget's literal text.
    fn set_text(&self, id: &str, text: &str);

    /// Show or hide a widget.
    fn set_visible(&self, id: &str, visible: bool);

    /// Set a checkbox state.
    fn set_checked(&self, id: &str, checked: bool);

    /// Set a numeric value.
    fn set_value(&self, id: &str, value: f64);

    /// Replace a widget's full style.
    fn set_style(&self, id: &str, style: &WidgetStyle);

    /// Set one style key.
    fn set_style_property(&self, id: &str, key: &str, value: &StyleValue);

    /// Whether an optional capability is available.
    fn supports(&self, _capability: Capability) -> bool {
        false
    }

    /// Replace the bytes of an image widget. Requires [`Capability::ImageData`].
    fn set_image_data(&self, _id: &str, _data: &[u8]) {}

    /// Start playback. Requires [`Capability::Video`].
    fn play_video(&self, _id: &str) {}

    /// Pause playback. Requires [`Capability::Video`].
    fn pause_video(&self, _id: &str) {}

    /// Seek to `position` seconds. Requires [`Capability::Video`].
    fn seek_video(&self, _id: &str, _position: f64) {}

    /// Set the window title. Requires [`Capability::Window`].
    fn set_title(&self, _title: &str) {}

    /// Resize the window. Requires [`Capability::Window`].
    fn resize_window(&self, _width: u32, _height: u32) {}

    /// Listen for events of `event_type`, or every event with [`WILDCARD`].
    fn on(&self, event_type: &str, callback: EventCallback) -> Subscription;

    /// Session-wide identity generator, when the host provides one.
    fn next_id(&self) -> Option<String> {
        None
    }
}

type DeferredCall<'a> = Box<dyn FnOnce(&dyn HostRuntime) + 'a>;

/// Widget calls recorded while engine state is borrowed, issued on the real
/// host by [`DeferredHost::replay`] once the borrow is released.
///
/// Capability queries, subscriptions and id allocation go straight through.
pub struct DeferredHost<'a> {
    host: &'a dyn HostRuntime,
    calls: RefCell<Vec<DeferredCall<'a>>>,
}

impl std::fmt::Debug for DeferredHost<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredHost")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl<'a> DeferredHost<'a> {
    /// Record calls meant for `host`.
    pub fn new(host: &'a dyn HostRuntime) -> Self {
        Self {
            host,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn push(&self, call: impl FnOnce(&dyn HostRuntime) + 'a) {
        self.calls.borrow_mut().push(Box::new(call));
    }

    /// Number of calls waiting.
    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    /// Issue every recorded call in order.
    pub fn replay(self) {
        let Self { host, calls } = self;
        for call in calls.into_inner() {
            call(host);
        }
    }
}

impl HostRuntime for DeferredHost<'_> {
    fn create_widget(&self, spec: WidgetSpec) {
        self.push(move |host| host.create_widget(spec));
    }

    fn remove_widget(&self, id: &str) {
        let id = id.to_string();
        self.push(move |host| host.remove_widget(&id));
    }

    fn set_text(&self, id: &str, text: &str) {
        let (id, text) = (id.to_string(), text.to_string());
        self.push(move |host| host.set_text(&id, &text));
    }

    fn set_visible(&self, id: &str, visible: bool) {
        let id = id.to_string();
        self.push(move |host| host.set_visible(&id, visible));
    }

    fn set_checked(&self, id: &str, checked: bool) {
        let id = id.to_string();
        self.push(move |host| host.set_checked(&id, checked));
    }

    fn set_value(&self, id: &str, value: f64) {
        let id = id.to_string();
        self.push(move |host| host.set_value(&id, value));
    }

    fn set_style(&self, id: &str, style: &WidgetStyle) {
        let (id, style) = (id.to_string(), style.clone());
        self.push(move |host| host.set_style(&id, &style));
    }

    fn set_style_property(&self, id: &str, key: &str, value: &StyleValue) {
        let (id, key, value) = (id.to_string(), key.to_string(), value.clone());
        self.push(move |host| host.set_style_property(&id, &key, &value));
    }

    fn supports(&self, capability: Capability) -> bool {
        self.host.supports(capability)
    }

    fn set_image_data(&self, id: &str, data: &[u8]) {
        let (id, data) = (id.to_string(), data.to_vec());
        self.push(move |host| host.set_image_data(&id, &data));
    }

    fn play_video(&self, id: &str) {
        let id = id.to_string();
        self.push(move |host| host.play_video(&id));
    }

    fn pause_video(&self, id: &str) {
        let id = id.to_string();
        self.push(move |host| host.pause_video(&id));
    }

    fn seek_video(&self, id: &str, position: f64) {
        let id = id.to_string();
        self.push(move |host| host.seek_video(&id, position));
    }

    fn set_title(&self, title: &str) {
        let title = title.to_string();
        self.push(move |host| host.set_title(&title));
    }

    fn resize_window(&self, width: u32, height: u32) {
        self.push(move |host| host.resize_window(width, height));
    }

    fn on(&self, event_type: &str, callback: EventCallback) -> Subscription {
        self.host.on(event_type, callback)
    }

    fn next_id(&self) -> Option<String> {
        self.host.next_id()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, String, EventCallback)>,
}

/// Single-threaded event listener registry.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Rc<RefCell<Listeners>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event_type` (or [`WILDCARD`]).
    pub fn on(&self, event_type: &str, callback: EventCallback) -> Subscription {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners
                .entries
                .push((id, event_type.to_string(), callback));
            id
        };
        log::debug!("[Events] Registered listener {} for '{}'", id, event_type);

        let weak: Weak<RefCell<Listeners>> = Rc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners
                    .borrow_mut()
                    .entries
                    .retain(|(entry_id, _, _)| *entry_id != id);
                log::debug!("[Events] Unregistered listener {}", id);
            }
        })
    }

    /// Invoke every listener matching `event`. Returns how many ran.
    ///
    /// Listeners are collected before any runs, so a listener may register or
    /// cancel subscriptions without deadlocking the bus.
    pub fn emit(&self, event: &UiEvent) -> usize {
        let callbacks: Vec<EventCallback> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .filter(|(_, event_type, _)| event_type == WILDCARD || *event_type == event.event_type)
            .map(|(_, _, callback)| Rc::clone(callback))
            .collect();

        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

/// Destination for outgoing commands.
pub trait CommandSink {
    /// Deliver one command, preserving program order.
    fn send_command(&self, command: Command);
}

impl CommandSink for Bridge {
    fn send_command(&self, command: Command) {
        self.send(command);
    }
}

impl CommandSink for RefCell<Vec<Command>> {
    fn send_command(&self, command: Command) {
        self.borrow_mut().push(command);
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Rc<T> {
    fn send_command(&self, command: Command) {
        (**self).send_command(command);
    }
}

/// [`HostRuntime`] that speaks the wire protocol.
///
/// Every widget call becomes one [`Command`]; incoming events are handed to
/// [`ProtocolHost::deliver`] by the session loop and fanned out through the
/// [`EventBus`].
pub struct ProtocolHost<S> {
    sink: S,
    bus: EventBus,
}

impl<S> std::fmt::Debug for ProtocolHost<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHost")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl<S: CommandSink> ProtocolHost<S> {
    /// Wrap a command sink.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            bus: EventBus::new(),
        }
    }

    /// The underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The event bus incoming events are published on.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Publish an incoming host event to every matching listener.
    pub fn deliver(&self, event: &UiEvent) -> usize {
        self.bus.emit(event)
    }

    /// Close the window.
    pub fn close_window(&self) {
        self.sink.send_command(Command::CloseWindow);
    }

    /// Ask the host application to exit.
    pub fn exit_app(&self) {
        self.sink.send_command(Command::ExitApp);
    }

    /// Forward a log line to the host.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.send_command(Command::Log {
            level,
            message: message.into(),
        });
    }
}

impl<S: CommandSink> HostRuntime for ProtocolHost<S> {
    fn create_widget(&self, spec: WidgetSpec) {
        self.sink.send_command(spec.into());
    }

    fn remove_widget(&self, id: &str) {
        self.sink.send_command(Command::RemoveWidget { id: id.to_string() });
    }

    fn set_text(&self, id: &str, text: &str) {
        self.sink.send_command(Command::SetText {
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    fn set_visible(&self, id: &str, visible: bool) {
        self.sink.send_command(Command::SetVisible {
            id: id.to_string(),
            visible,
        });
    }

    fn set_checked(&self, id: &str, checked: bool) {
        self.sink.send_command(Command::SetChecked {
            id: id.to_string(),
            checked,
        });
    }

    fn set_value(&self, id: &str, value: f64) {
        self.sink.send_command(Command::SetValue {
            id: id.to_string(),
            value,
        });
    }

    fn set_style(&self, id: &str, style: &WidgetStyle) {
        self.sink.send_command(Command::SetStyle {
            id: id.to_string(),
            style: style.clone(),
        });
    }

    fn set_style_property(&self, id: &str, key: &str, value: &StyleValue) {
        self.sink.send_command(Command::SetStyleProperty {
            id: id.to_string(),
            key: key.to_string(),
            value: value.clone(),
        });
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(
            capability,
            Capability::ImageData | Capability::Video | Capability::Window
        )
    }

    fn set_image_data(&self, id: &str, data: &[u8]) {
        self.sink.send_command(Command::SetImageData {
            id: id.to_string(),
            data: data.to_vec(),
        });
    }

    fn play_video(&self, id: &str) {
        self.sink.send_command(Command::PlayVideo { id: id.to_string() });
    }

    fn pause_video(&self, id: &str) {
        self.sink.send_command(Command::PauseVideo { id: id.to_string() });
    }

    fn seek_video(&self, id: &str, position: f64) {
        self.sink.send_command(Command::SeekVideo {
            id: id.to_string(),
            position,
        });
    }

    fn set_title(&self, title: &str) {
        self.sink.send_command(Command::SetTitle {
            title: title.to_string(),
        });
    }

    fn resize_window(&self, width: u32, height: u32) {
        self.sink.send_command(Command::ResizeWindow { width, height });
    }

    fn on(&self, event_type: &str, callback: EventCallback) -> Subscription {
        self.bus.on(event_type, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recording_host() -> (ProtocolHost<Rc<RefCell<Vec<Command>>>>, Rc<RefCell<Vec<Command>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (ProtocolHost::new(Rc::clone(&log)), log)
    }

    #[test]
    fn test_widget_calls_become_commands() {
        let (host, log) = recording_host();
        host.set_text("el_1", "hi");
        host.set_visible("el_1", false);
        host.remove_widget("el_1");
        assert_eq!(
            *log.borrow(),
            vec![
                Command::SetText {
                    id: "el_1".to_string(),
                    text: "hi".to_string()
                },
                Command::SetVisible {
                    id: "el_1".to_string(),
                    visible: false
                },
                Command::RemoveWidget {
                    id: "el_1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_deferred_calls_wait_for_replay() {
        let (host, log) = recording_host();
        let deferred = DeferredHost::new(&host);
        deferred.set_text("el_1", "hi");
        deferred.remove_widget("el_1");
        assert!(deferred.supports(Capability::Window));
        assert_eq!(deferred.len(), 2);
        assert!(log.borrow().is_empty());

        deferred.replay();
        assert_eq!(
            *log.borrow(),
            vec![
                Command::SetText {
                    id: "el_1".to_string(),
                    text: "hi".to_string()
                },
                Command::RemoveWidget {
                    id: "el_1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_protocol_host_has_no_id_generator() {
        let (host, _log) = recording_host();
        assert!(host.next_id().is_none());
        assert!(host.supports(Capability::Video));
    }

    #[test]
    fn test_bus_filters_by_type_and_wildcard() {
        let bus = EventBus::new();
        let typed = Rc::new(Cell::new(0));
        let any = Rc::new(Cell::new(0));

        let t = Rc::clone(&typed);
        let _typed_sub = bus.on("widgetAction", Rc::new(move |_: &UiEvent| t.set(t.get() + 1)));
        let a = Rc::clone(&any);
        let _any_sub = bus.on(WILDCARD, Rc::new(move |_: &UiEvent| a.set(a.get() + 1)));

        bus.emit(&UiEvent::widget_action("el_1", "click"));
        bus.emit(&UiEvent {
            event_type: "windowResized".to_string(),
            ..UiEvent::default()
        });

        assert_eq!(typed.get(), 1);
        assert_eq!(any.get(), 2);
    }

    #[test]
    fn test_cancel_unregisters() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = bus.on(WILDCARD, Rc::new(move |_: &UiEvent| h.set(h.get() + 1)));
        assert_eq!(bus.listener_count(), 1);

        sub.cancel();
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.emit(&UiEvent::widget_action("el_1", "click")), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_listener_may_cancel_during_emit() {
        let bus = EventBus::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let s = Rc::clone(&slot);
        let sub = bus.on(
            WILDCARD,
            Rc::new(move |_: &UiEvent| {
                if let Some(sub) = s.borrow_mut().take() {
                    sub.cancel();
                }
            }),
        );
        *slot.borrow_mut() = Some(sub);

        assert_eq!(bus.emit(&UiEvent::widget_action("el_1", "click")), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
