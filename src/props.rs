//! Property translation: UI attributes to remote widget state.
//!
//! Every attribute written on an element falls into one [`PropCategory`],
//! decided by [`classify`] from the attribute name, the widget kind and the
//! value's type. The category then drives both entry points:
//!
//! - [`collect_initial`] folds the attributes of a not-yet-mounted element
//!   into the fields of its create command (text, style, typed parameters,
//!   binary payload). Attributes that only make sense as a call against an
//!   existing widget are returned as `deferred` for replay after creation.
//! - [`apply_mounted`] turns one attribute write on a mounted element into
//!   the matching host call.
//!
//! Unknown primitive attributes become style keys, passed through under their
//! own name, so new host style keys need no change here.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::host::{Capability, HostRuntime, WidgetSpec};
use crate::protocol::{StyleValue, WidgetKind, WidgetParams, WidgetStyle};
use crate::router::{action_for_prop, Handler};

/// Framework attributes that never reach the host.
pub const RESERVED_PROPS: &[&str] = &["children", "ref", "key", "id"];

/// UI attribute name → host style key.
const STYLE_KEYS: &[(&str, &str)] = &[
    ("backgroundColor", "background"),
    ("borderColor", "border_color"),
    ("hoverBorderColor", "hover_border_color"),
    ("borderWidth", "border_width"),
    ("borderRadius", "corner_radius"),
    ("cornerRadius", "corner_radius"),
    ("flexDirection", "direction"),
    ("alignItems", "cross_axis_alignment"),
    ("crossAxisAlignment", "cross_axis_alignment"),
    ("justifyContent", "main_axis_alignment"),
    ("mainAxisAlignment", "main_axis_alignment"),
    ("mustFillMainAxis", "must_fill_main_axis"),
    ("fontSize", "font_size"),
    ("fontWeight", "font_weight"),
    ("fontStyle", "font_style"),
    ("fontFamily", "font_family"),
    ("letterSpacing", "letter_spacing"),
    ("lineHeight", "line_height"),
    ("wordSpacing", "word_spacing"),
    ("svgData", "svg_data"),
];

const BUTTON_TEXT_ERROR: &str =
    "button elements do not own literal text; nest a label child inside the button instead";

/// Slider range when the element does not set one.
const SLIDER_DEFAULTS: (f64, f64, f64) = (0.0, 1.0, 0.5);

/// Value of a UI attribute.
#[derive(Clone, PartialEq, Default)]
pub enum PropValue {
    /// Absent value; clears the stored attribute.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    Text(String),
    /// Binary payload such as encoded image bytes.
    Bytes(Vec<u8>),
    /// Style record (`style` attribute).
    Style(WidgetStyle),
    /// Event callback (`on*` attributes).
    Handler(Handler),
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Number(v) => write!(f, "Number({v})"),
            Self::Text(v) => write!(f, "Text({v:?})"),
            Self::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Self::Style(v) => write!(f, "Style({:?})", v.0),
            Self::Handler(v) => write!(f, "{v:?}"),
        }
    }
}

impl PropValue {
    /// Whether this is [`PropValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The handler, for event attributes.
    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    /// Literal text rendering of a primitive value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The value as a single style entry, for primitives.
    pub fn to_style_value(&self) -> Option<StyleValue> {
        match self {
            Self::Bool(b) => Some(StyleValue::Bool(*b)),
            Self::Number(n) => Some(StyleValue::Number(*n)),
            Self::Text(s) => Some(StyleValue::Text(s.clone())),
            _ => None,
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for PropValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<WidgetStyle> for PropValue {
    fn from(value: WidgetStyle) -> Self {
        Self::Style(value)
    }
}

impl From<Handler> for PropValue {
    fn from(value: Handler) -> Self {
        Self::Handler(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// How an attribute reaches the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropCategory {
    /// Framework-only (reserved names, nulls, values the host cannot carry).
    Structural,
    /// Event handler for the given action.
    Event(String),
    /// Literal text.
    Text,
    /// Whole style record.
    StyleRecord,
    /// Kind-gated creation parameter.
    Param,
    /// Applied by a dedicated call on an existing widget
    /// (`visible`, `checked`, `value`, video `playing`/`position`).
    Control,
    /// Single style key under the given host name.
    Style(String),
}

/// Host style key for a UI attribute name.
pub fn style_key(name: &str) -> Cow<'static, str> {
    STYLE_KEYS
        .iter()
        .find(|(ui, _)| *ui == name)
        .map_or_else(|| Cow::Owned(name.to_string()), |(_, key)| Cow::Borrowed(*key))
}

fn is_param(name: &str, kind: &WidgetKind, value: &PropValue) -> bool {
    matches!(
        (kind, name, value),
        (WidgetKind::Checkbox, "checked", PropValue::Bool(_))
            | (WidgetKind::Slider, "min" | "max" | "value" | "step", PropValue::Number(_))
            | (WidgetKind::ProgressBar, "value", PropValue::Number(_))
            | (WidgetKind::TextInput | WidgetKind::TextArea, "placeholder", PropValue::Text(_))
            | (WidgetKind::Image, "objectFit", PropValue::Text(_))
            | (WidgetKind::Image, "data", PropValue::Bytes(_))
            | (WidgetKind::Video, "src", PropValue::Text(_))
    )
}

/// Decide how attribute `name` with `value` reaches a widget of `kind`.
pub fn classify(name: &str, kind: &WidgetKind, value: &PropValue) -> PropCategory {
    if RESERVED_PROPS.contains(&name) {
        return PropCategory::Structural;
    }
    if let Some(action) = action_for_prop(name) {
        return PropCategory::Event(action);
    }
    if value.is_null() {
        return PropCategory::Structural;
    }
    if is_param(name, kind, value) {
        return PropCategory::Param;
    }
    match (kind, name, value) {
        (_, "text", v) if v.as_text().is_some() => PropCategory::Text,
        (_, "style", PropValue::Style(_)) => PropCategory::StyleRecord,
        (_, "visible" | "checked", PropValue::Bool(_))
        | (_, "value", PropValue::Number(_))
        | (WidgetKind::Video, "playing", PropValue::Bool(_))
        | (WidgetKind::Video, "position", PropValue::Number(_)) => PropCategory::Control,
        (_, _, PropValue::Bool(_) | PropValue::Number(_) | PropValue::Text(_)) => {
            PropCategory::Style(style_key(name).into_owned())
        }
        _ => PropCategory::Structural,
    }
}

/// Reject attribute writes the host widgets cannot express.
///
/// Literal `text` on a button is a usage error: buttons take a label child.
pub fn check_usage(kind: &WidgetKind, name: &str, value: &PropValue) -> Result<()> {
    if *kind == WidgetKind::Button && name == "text" && !value.is_null() {
        return Err(Error::Usage(BUTTON_TEXT_ERROR.to_string()));
    }
    Ok(())
}

fn translate_record(style: &WidgetStyle) -> WidgetStyle {
    style
        .0
        .iter()
        .map(|(key, value)| (style_key(key).into_owned(), value.clone()))
        .collect()
}

/// Create-command fields gathered from an element's attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialWidget {
    /// Literal text.
    pub text: Option<String>,
    /// Style, `None` when empty.
    pub style: Option<WidgetStyle>,
    /// Typed parameters for the widget kind.
    pub params: Option<WidgetParams>,
    /// Binary payload.
    pub data: Option<Vec<u8>>,
    /// Attributes to replay through [`apply_mounted`] once the widget exists,
    /// sorted by name.
    pub deferred: Vec<String>,
}

impl InitialWidget {
    /// The create request for widget `id` of `kind` under `parent_id`.
    pub fn into_spec(self, id: String, kind: WidgetKind, parent_id: Option<String>) -> WidgetSpec {
        WidgetSpec {
            id,
            kind,
            parent_id,
            text: self.text,
            style: self.style,
            params: self.params,
            data: self.data,
        }
    }
}

/// Gather the create-command fields of an element with tag `tag`.
///
/// Fails with [`Error::Usage`] when a button carries `text`.
pub fn collect_initial(
    tag: &str,
    kind: &WidgetKind,
    props: &HashMap<String, PropValue>,
) -> Result<InitialWidget> {
    let mut initial = InitialWidget::default();
    let mut style = WidgetStyle::new();
    let mut overrides = WidgetStyle::new();
    let mut params: HashMap<&str, &PropValue> = HashMap::new();

    if let Some(direction) = WidgetKind::implied_direction(tag) {
        style.insert("direction", direction);
    }

    for (name, value) in props {
        match classify(name, kind, value) {
            PropCategory::Structural | PropCategory::Event(_) => {}
            PropCategory::Text => {
                check_usage(kind, name, value)?;
                initial.text = value.as_text();
            }
            PropCategory::StyleRecord => {
                if let PropValue::Style(record) = value {
                    style.0.extend(translate_record(record).0);
                }
            }
            PropCategory::Param => {
                params.insert(name.as_str(), value);
            }
            PropCategory::Control => initial.deferred.push(name.clone()),
            PropCategory::Style(key) => {
                if let Some(v) = value.to_style_value() {
                    overrides.insert(key, v);
                }
            }
        }
    }

    // Individual attributes win over the record.
    style.0.extend(overrides.0);
    initial.style = (!style.is_empty()).then_some(style);
    initial.deferred.sort();

    let number = |name: &str| params.get(name).and_then(|v| v.number());
    let text = |name: &str| params.get(name).and_then(|v| v.as_text());
    initial.params = match kind {
        WidgetKind::Checkbox => Some(WidgetParams::Checkbox {
            checked: matches!(params.get("checked"), Some(PropValue::Bool(true))),
        }),
        WidgetKind::Slider => {
            let (min, max, value) = SLIDER_DEFAULTS;
            Some(WidgetParams::Slider {
                min: number("min").unwrap_or(min),
                max: number("max").unwrap_or(max),
                value: number("value").unwrap_or(value),
                step: number("step"),
            })
        }
        WidgetKind::ProgressBar => Some(WidgetParams::ProgressBar {
            progress: number("value"),
        }),
        WidgetKind::TextInput | WidgetKind::TextArea => text("placeholder")
            .map(|placeholder| WidgetParams::TextInput {
                placeholder: Some(placeholder),
            }),
        WidgetKind::Image => Some(WidgetParams::Image {
            object_fit: text("objectFit"),
        }),
        WidgetKind::Video => text("src").map(|src| WidgetParams::Video { src }),
        _ => None,
    };
    if let Some(PropValue::Bytes(bytes)) = params.get("data") {
        initial.data = Some(bytes.clone());
    }

    Ok(initial)
}

/// Apply one attribute write to the mounted widget `id`.
///
/// Fails with [`Error::Usage`] when a button receives `text`. Missing
/// optional capabilities are skipped silently.
pub fn apply_mounted(
    host: &dyn HostRuntime,
    id: &str,
    kind: &WidgetKind,
    name: &str,
    value: &PropValue,
) -> Result<()> {
    match classify(name, kind, value) {
        PropCategory::Structural | PropCategory::Event(_) => {}
        PropCategory::Text => {
            check_usage(kind, name, value)?;
            if let Some(text) = value.as_text() {
                host.set_text(id, &text);
            }
        }
        PropCategory::StyleRecord => {
            if let PropValue::Style(record) = value {
                host.set_style(id, &translate_record(record));
            }
        }
        PropCategory::Control | PropCategory::Param => apply_control(host, id, name, value),
        PropCategory::Style(key) => {
            if let Some(v) = value.to_style_value() {
                host.set_style_property(id, &key, &v);
            }
        }
    }
    Ok(())
}

fn apply_control(host: &dyn HostRuntime, id: &str, name: &str, value: &PropValue) {
    match (name, value) {
        ("visible", PropValue::Bool(visible)) => host.set_visible(id, *visible),
        ("checked", PropValue::Bool(checked)) => host.set_checked(id, *checked),
        ("value", PropValue::Number(n)) => host.set_value(id, *n),
        ("data", PropValue::Bytes(bytes)) => {
            if host.supports(Capability::ImageData) {
                host.set_image_data(id, bytes);
            }
        }
        ("playing", PropValue::Bool(playing)) => {
            if host.supports(Capability::Video) {
                if *playing {
                    host.play_video(id);
                } else {
                    host.pause_video(id);
                }
            }
        }
        ("position", PropValue::Number(position)) => {
            if host.supports(Capability::Video) {
                host.seek_video(id, *position);
            }
        }
        _ => {
            if let Some(v) = value.to_style_value() {
                host.set_style_property(id, &style_key(name), &v);
            }
        }
    }
}
