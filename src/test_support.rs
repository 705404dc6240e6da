//! Test doubles: a recording host and a minimal signal runtime.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::host::{Capability, EventCallback, HostRuntime, ProtocolHost, Subscription, WidgetSpec};
use crate::protocol::{Command, StyleValue, UiEvent, WidgetStyle};
use crate::reactive::{Cleanup, Reactive};

type CommandLog = Rc<RefCell<Vec<Command>>>;

/// Host that records every call as the [`Command`] it would send.
pub struct RecordingHost {
    inner: ProtocolHost<CommandLog>,
    log: CommandLog,
    id_prefix: Option<String>,
    next: Cell<u64>,
    capabilities: bool,
    echo: Option<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        let log: CommandLog = Rc::new(RefCell::new(Vec::new()));
        Self {
            inner: ProtocolHost::new(Rc::clone(&log)),
            log,
            id_prefix: None,
            next: Cell::new(0),
            capabilities: true,
            echo: None,
        }
    }

    /// Host with its own identity generator producing `{prefix}{n}`.
    pub fn with_id_prefix(prefix: &str) -> Self {
        Self {
            id_prefix: Some(prefix.to_string()),
            ..Self::new()
        }
    }

    /// Host without any optional capability.
    pub fn without_capabilities() -> Self {
        Self {
            capabilities: false,
            ..Self::new()
        }
    }

    /// In-process host that reports `action` on every widget it creates,
    /// from inside the create call.
    pub fn with_echo(action: &str) -> Self {
        Self {
            echo: Some(action.to_string()),
            ..Self::new()
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.log.borrow().clone()
    }

    pub fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn deliver(&self, event: &UiEvent) -> usize {
        self.inner.deliver(event)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.events().listener_count()
    }
}

impl HostRuntime for RecordingHost {
    fn create_widget(&self, spec: WidgetSpec) {
        let id = spec.id.clone();
        self.inner.create_widget(spec);
        if let Some(action) = &self.echo {
            self.inner.deliver(&UiEvent::widget_action(id, action.as_str()));
        }
    }

    fn remove_widget(&self, id: &str) {
        self.inner.remove_widget(id);
    }

    fn set_text(&self, id: &str, text: &str) {
        self.inner.set_text(id, text);
    }

    fn set_visible(&self, id: &str, visible: bool) {
        self.inner.set_visible(id, visible);
    }

    fn set_checked(&self, id: &str, checked: bool) {
        self.inner.set_checked(id, checked);
    }

    fn set_value(&self, id: &str, value: f64) {
        self.inner.set_value(id, value);
    }

    fn set_style(&self, id: &str, style: &WidgetStyle) {
        self.inner.set_style(id, style);
    }

    fn set_style_property(&self, id: &str, key: &str, value: &StyleValue) {
        self.inner.set_style_property(id, key, value);
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities && self.inner.supports(capability)
    }

    fn set_image_data(&self, id: &str, data: &[u8]) {
        self.inner.set_image_data(id, data);
    }

    fn play_video(&self, id: &str) {
        self.inner.play_video(id);
    }

    fn pause_video(&self, id: &str) {
        self.inner.pause_video(id);
    }

    fn seek_video(&self, id: &str, position: f64) {
        self.inner.seek_video(id, position);
    }

    fn set_title(&self, title: &str) {
        self.inner.set_title(title);
    }

    fn resize_window(&self, width: u32, height: u32) {
        self.inner.resize_window(width, height);
    }

    fn on(&self, event_type: &str, callback: EventCallback) -> Subscription {
        self.inner.on(event_type, callback)
    }

    fn next_id(&self) -> Option<String> {
        let prefix = self.id_prefix.as_ref()?;
        let n = self.next.get() + 1;
        self.next.set(n);
        Some(format!("{prefix}{n}"))
    }
}

// ============================================================================
// Signals
// ============================================================================

thread_local! {
    static OBSERVERS: RefCell<Vec<Rc<EffectCell>>> = const { RefCell::new(Vec::new()) };
}

struct EffectCell {
    run: RefCell<Option<Box<dyn FnMut()>>>,
    active: Cell<bool>,
}

impl EffectCell {
    fn execute(self: &Rc<Self>) {
        if !self.active.get() {
            return;
        }
        // Already running: a write inside the effect does not recurse.
        let Some(mut run) = self.run.borrow_mut().take() else {
            return;
        };
        OBSERVERS.with(|o| o.borrow_mut().push(Rc::clone(self)));
        run();
        OBSERVERS.with(|o| o.borrow_mut().pop());
        if self.active.get() {
            *self.run.borrow_mut() = Some(run);
        }
    }
}

struct SignalInner<T> {
    value: RefCell<T>,
    subscribers: RefCell<Vec<Weak<EffectCell>>>,
}

/// Observable value; reading it inside an effect subscribes the effect.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> T {
        OBSERVERS.with(|o| {
            if let Some(current) = o.borrow().last() {
                let mut subscribers = self.inner.subscribers.borrow_mut();
                if !subscribers.iter().any(|w| w.as_ptr() == Rc::as_ptr(current)) {
                    subscribers.push(Rc::downgrade(current));
                }
            }
        });
        self.inner.value.borrow().clone()
    }

    /// Store `value` and synchronously re-run every subscribed effect.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        let subscribers = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
        for effect in subscribers.iter().filter_map(Weak::upgrade) {
            effect.execute();
        }
    }
}

/// [`Reactive`] backed by [`Signal`] tracking.
#[derive(Default)]
pub struct TestReactive {
    effects: RefCell<Vec<Weak<EffectCell>>>,
}

impl TestReactive {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Effects opened and not yet cleaned up.
    pub fn active_effects(&self) -> usize {
        self.effects
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|e| e.active.get())
            .count()
    }
}

impl Reactive for TestReactive {
    fn effect(&self, effect: Box<dyn FnMut()>) -> Cleanup {
        let cell = Rc::new(EffectCell {
            run: RefCell::new(Some(effect)),
            active: Cell::new(true),
        });
        self.effects.borrow_mut().push(Rc::downgrade(&cell));
        cell.execute();
        Box::new(move || {
            cell.active.set(false);
            cell.run.borrow_mut().take();
        })
    }
}
