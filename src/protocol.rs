//! Message types exchanged with the remote widget host.
//!
//! Every frame on the socket carries exactly one MessagePack value, encoded
//! as a map with named fields: a [`Command`] on the way out, a [`HostMessage`] on the way in. Both are
//! internally tagged by a `"type"` field with camelCase variant names.
//! Binary payloads travel as MessagePack `bin`, not as integer arrays.
//!
//! ```text
//! client ──Command──► host      createWidget, setText, setStyle, ready, ...
//! client ◄─HostMessage── host   uiEvent { event }, shutdown
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of widget the host should instantiate.
///
/// Travels as a camelCase string. Unknown tags become [`WidgetKind::Custom`]
/// and are sent verbatim so hosts can register their own widgets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WidgetKind {
    /// Static text.
    Label,
    /// Clickable button. Owns no literal text; nest a label instead.
    Button,
    /// Button drawn from an SVG icon (`svgData`).
    IconButton,
    /// Single-line text entry.
    TextInput,
    /// Multi-line text entry.
    TextArea,
    /// Generic container.
    Container,
    /// Flex layout container.
    Flex,
    /// Fixed-size box.
    SizedBox,
    /// Checkbox with optional caption.
    Checkbox,
    /// Selectable rich text.
    Prose,
    /// Progress bar.
    ProgressBar,
    /// Busy spinner.
    Spinner,
    /// Range slider.
    Slider,
    /// Layered stack.
    ZStack,
    /// Scrollable viewport.
    Portal,
    /// Grid layout container.
    Grid,
    /// Container reporting hover state.
    Hoverable,
    /// Raster image (bytes sent as the binary payload).
    Image,
    /// Video player.
    Video,
    /// Vector graphic.
    Svg,
    /// Host-defined widget, sent verbatim.
    Custom(String),
}

impl WidgetKind {
    /// Resolve a UI tag (`"button"`, `"Label"`, `"column"`, ...) to a widget kind.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "label" | "Label" | "text" => Self::Label,
            "button" | "Button" => Self::Button,
            "iconButton" | "IconButton" | "icon_button" => Self::IconButton,
            "textInput" | "TextInput" | "text_input" | "input" => Self::TextInput,
            "textArea" | "TextArea" | "text_area" | "textarea" => Self::TextArea,
            "container" | "Container" => Self::Container,
            "flex" | "Flex" | "column" | "row" | "view" | "div" => Self::Flex,
            "sizedBox" | "SizedBox" | "sized_box" => Self::SizedBox,
            "checkbox" | "Checkbox" => Self::Checkbox,
            "prose" | "Prose" => Self::Prose,
            "progressBar" | "ProgressBar" | "progress_bar" | "progress" => Self::ProgressBar,
            "spinner" | "Spinner" => Self::Spinner,
            "slider" | "Slider" => Self::Slider,
            "zStack" | "ZStack" | "zstack" => Self::ZStack,
            "portal" | "Portal" | "scroll" => Self::Portal,
            "grid" | "Grid" => Self::Grid,
            "hoverable" | "Hoverable" => Self::Hoverable,
            "image" | "Image" | "img" => Self::Image,
            "video" | "Video" => Self::Video,
            "svg" | "Svg" => Self::Svg,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Flex direction implied by layout tags such as `column` and `row`.
    pub fn implied_direction(tag: &str) -> Option<&'static str> {
        match tag {
            "column" => Some("column"),
            "row" => Some("row"),
            _ => None,
        }
    }

    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Label => "label",
            Self::Button => "button",
            Self::IconButton => "iconButton",
            Self::TextInput => "textInput",
            Self::TextArea => "textArea",
            Self::Container => "container",
            Self::Flex => "flex",
            Self::SizedBox => "sizedBox",
            Self::Checkbox => "checkbox",
            Self::Prose => "prose",
            Self::ProgressBar => "progressBar",
            Self::Spinner => "spinner",
            Self::Slider => "slider",
            Self::ZStack => "zStack",
            Self::Portal => "portal",
            Self::Grid => "grid",
            Self::Hoverable => "hoverable",
            Self::Image => "image",
            Self::Video => "video",
            Self::Svg => "svg",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for WidgetKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<WidgetKind> for String {
    fn from(kind: WidgetKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive style value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    /// Flag such as `underline`.
    Bool(bool),
    /// Length, weight, ratio.
    Number(f64),
    /// Color, family, alignment keyword.
    Text(String),
}

impl From<bool> for StyleValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StyleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StyleValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Style record keyed by the host's style names (`font_size`, `background`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetStyle(pub BTreeMap<String, StyleValue>);

impl WidgetStyle {
    /// Empty style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, last write wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StyleValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.0.get(key)
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of keys set.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<StyleValue>> FromIterator<(K, V)> for WidgetStyle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Kind-specific creation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WidgetParams {
    /// Checkbox initial state.
    Checkbox {
        /// Whether the box starts checked.
        checked: bool,
    },
    /// Slider range and position.
    Slider {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Initial position.
        value: f64,
        /// Optional step size.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    /// Progress bar fill; `None` renders as indeterminate.
    #[serde(rename = "progressBar")]
    ProgressBar {
        /// Fill ratio.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
    },
    /// Text entry hint.
    #[serde(rename = "textInput")]
    TextInput {
        /// Placeholder shown while empty.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
    /// Image fitting mode; the bytes travel as the create command's payload.
    Image {
        /// `contain`, `cover`, `fill`, `none` or `scale-down`.
        #[serde(rename = "objectFit", default, skip_serializing_if = "Option::is_none")]
        object_fit: Option<String>,
    },
    /// Video source.
    Video {
        /// URI or path of the media.
        src: String,
    },
}

/// Severity of a forwarded log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug detail.
    Debug,
    /// Informational.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug | log::Level::Trace => Self::Debug,
        }
    }
}

/// Command sent from the client to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Set the window title.
    SetTitle {
        /// New title.
        title: String,
    },
    /// Resize the window.
    ResizeWindow {
        /// Width in logical pixels.
        width: u32,
        /// Height in logical pixels.
        height: u32,
    },
    /// Close the window.
    CloseWindow,
    /// Create a widget under `parent_id` (the host root when `None`).
    #[serde(rename_all = "camelCase")]
    CreateWidget {
        /// Widget identity.
        id: String,
        /// Widget kind.
        kind: WidgetKind,
        /// Parent widget identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
        /// Initial literal text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Initial style.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<WidgetStyle>,
        /// Kind-specific parameters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<WidgetParams>,
        /// Binary payload such as encoded image bytes.
        #[serde(default, with = "serde_bytes", skip_serializing_if = "Option::is_none")]
        data: Option<Vec<u8>>,
    },
    /// Remove a widget and everything the host still holds under it.
    RemoveWidget {
        /// Widget identity.
        id: String,
    },
    /// Replace literal text.
    SetText {
        /// Widget identity.
        id: String,
        /// New text.
        text: String,
    },
    /// Show or hide a widget.
    SetVisible {
        /// Widget identity.
        id: String,
        /// Visibility.
        visible: bool,
    },
    /// Set a numeric value (slider position, progress).
    SetValue {
        /// Widget identity.
        id: String,
        /// New value.
        value: f64,
    },
    /// Set a checkbox state.
    SetChecked {
        /// Widget identity.
        id: String,
        /// New state.
        checked: bool,
    },
    /// Replace the full style record.
    SetStyle {
        /// Widget identity.
        id: String,
        /// New style.
        style: WidgetStyle,
    },
    /// Set one style key.
    SetStyleProperty {
        /// Widget identity.
        id: String,
        /// Host style key.
        key: String,
        /// New value.
        value: StyleValue,
    },
    /// Replace the bytes shown by an image widget.
    SetImageData {
        /// Widget identity.
        id: String,
        /// Encoded image bytes.
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    /// Start video playback.
    PlayVideo {
        /// Widget identity.
        id: String,
    },
    /// Pause video playback.
    PauseVideo {
        /// Widget identity.
        id: String,
    },
    /// Seek a video to `position` seconds.
    SeekVideo {
        /// Widget identity.
        id: String,
        /// Position in seconds.
        position: f64,
    },
    /// Forward a log line to the host.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
    /// Ask the host to exit.
    ExitApp,
    /// Handshake sent once the queued commands are flushed.
    Ready,
}

/// Interaction event reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEvent {
    /// Event type, e.g. `widgetAction` or `windowResized`.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Widget the event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<String>,
    /// Action name, e.g. `click` or `valueChanged`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Numeric payload of value-changed actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl UiEvent {
    /// A `widgetAction` event for `widget_id`.
    pub fn widget_action(widget_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            event_type: "widgetAction".to_string(),
            widget_id: Some(widget_id.into()),
            action: Some(action.into()),
            value: None,
        }
    }

    /// Attach a numeric value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Message sent from the host to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Wrapped interaction event.
    UiEvent {
        /// The event.
        event: UiEvent,
    },
    /// The host is going away; the client should exit cleanly.
    Shutdown,
}

/// Serialize a value into a MessagePack payload with named fields.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| Error::Encode(e.to_string()))
}

/// Deserialize a MessagePack payload.
pub fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    rmp_serde::from_slice(payload).map_err(|e| Error::Decode(e.to_string()))
}
