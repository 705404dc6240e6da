//! Framework-side description of a UI.
//!
//! A [`View`] is what a component returns: elements, text, lists, and
//! [`View::Dynamic`] thunks that the reconciler evaluates inside an effect so
//! the enclosing child list rebuilds when whatever the thunk read changes.
//!
//! Elements are shared as `Rc<ElementView>`; the pointer identity is what the
//! reconciler memoizes materialized nodes on.

use std::fmt;
use std::rc::Rc;

use crate::host::WILDCARD;
use crate::props::PropValue;
use crate::protocol::{UiEvent, WidgetStyle};
use crate::router::Handler;

/// Attribute value as declared by a component.
#[derive(Clone)]
pub enum Prop {
    /// Fixed value.
    Static(PropValue),
    /// Accessor re-evaluated inside an effect.
    Reactive(Rc<dyn Fn() -> PropValue>),
}

impl Prop {
    /// A reactive attribute backed by `accessor`.
    pub fn reactive<T: Into<PropValue>>(accessor: impl Fn() -> T + 'static) -> Self {
        Self::Reactive(Rc::new(move || accessor().into()))
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Reactive(_) => f.write_str("Reactive(..)"),
        }
    }
}

macro_rules! static_prop_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Prop {
                fn from(value: $ty) -> Self {
                    Self::Static(value.into())
                }
            }
        )*
    };
}

static_prop_from!(PropValue, bool, f64, i32, &str, String, Vec<u8>, WidgetStyle, Handler);

/// Node of a UI description.
#[derive(Clone, Default)]
pub enum View {
    /// Nothing.
    #[default]
    Empty,
    /// Literal text.
    Text(String),
    /// Element with attributes and children.
    Element(Rc<ElementView>),
    /// Thunk producing a view; re-evaluated when its inputs change.
    Dynamic(Rc<dyn Fn() -> View>),
    /// Several views in sequence.
    List(Vec<View>),
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Element(element) => f.debug_tuple("Element").field(element).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
        }
    }
}

/// A materializable item after flattening.
#[derive(Debug, Clone)]
pub enum Flat {
    /// Element to materialize (possibly memoized).
    Element(Rc<ElementView>),
    /// Text node.
    Text(String),
}

impl View {
    /// Text view.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Dynamic view.
    pub fn dynamic(thunk: impl Fn() -> View + 'static) -> Self {
        Self::Dynamic(Rc::new(thunk))
    }

    /// Whether evaluating this view reads reactive state.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Dynamic(_) => true,
            Self::List(items) => items.iter().any(View::is_dynamic),
            Self::Empty | Self::Text(_) | Self::Element(_) => false,
        }
    }

    /// Evaluate thunks and flatten lists into materializable items.
    pub fn flatten_into(&self, out: &mut Vec<Flat>) {
        match self {
            Self::Empty => {}
            Self::Text(text) => out.push(Flat::Text(text.clone())),
            Self::Element(element) => out.push(Flat::Element(Rc::clone(element))),
            Self::Dynamic(thunk) => thunk().flatten_into(out),
            Self::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<ElementView> for View {
    fn from(element: ElementView) -> Self {
        Self::Element(Rc::new(element))
    }
}

impl From<Rc<ElementView>> for View {
    fn from(element: Rc<ElementView>) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for View {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<View>> for View {
    fn from(items: Vec<View>) -> Self {
        Self::List(items)
    }
}

impl<T: Into<View>> From<Option<T>> for View {
    fn from(view: Option<T>) -> Self {
        view.map_or(Self::Empty, Into::into)
    }
}

/// Element description.
///
/// ```ignore
/// let view: View = ElementView::new("column")
///     .prop("gap", 8.0)
///     .child(ElementView::new("button").on("click", |_| log::info!("clicked")))
///     .into();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ElementView {
    /// UI tag.
    pub tag: String,
    /// Attributes in declaration order.
    pub props: Vec<(String, Prop)>,
    /// Children in order.
    pub children: Vec<View>,
}

impl ElementView {
    /// Element with no attributes or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Prop>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }

    /// Add a reactive attribute.
    pub fn bind<T: Into<PropValue>>(self, name: impl Into<String>, accessor: impl Fn() -> T + 'static) -> Self {
        self.prop(name, Prop::reactive(accessor))
    }

    /// Add an infallible handler for `action` (`"click"` becomes `onClick`,
    /// `"*"` becomes `onAny`).
    pub fn on(self, action: &str, callback: impl Fn(&UiEvent) + 'static) -> Self {
        let mut chars = action.chars();
        let name = match chars.next() {
            Some(first) if action != WILDCARD => {
                format!("on{}{}", first.to_ascii_uppercase(), chars.as_str())
            }
            _ => "onAny".to_string(),
        };
        self.prop(name, Handler::from_fn(callback))
    }

    /// Append a child.
    pub fn child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children.
    pub fn children<I, V>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<View>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}
