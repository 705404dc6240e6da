//! widgetlink - drive a remote widget engine from a reactive UI.
//!
//! A reactive framework renders into a local host tree; the reconciler keeps
//! a remote widget tree in step with it over a length-prefixed binary socket,
//! and routes interaction events coming back to the handlers declared on the
//! local elements.
//!
//! # Architecture
//!
//! ```text
//! View ──render──► Reconciler ──HostRuntime──► ProtocolHost ──► Bridge ──► host
//!                    │  tree, identity table,                     │
//!                    │  effects, memo                             │
//!                    ◄──── EventRouter ◄──── EventBus ◄── Session ◄┘
//! ```
//!
//! # Modules
//!
//! - [`tree`] - Host-tree nodes in a slot arena
//! - [`props`] - Attribute classification and translation to widget commands
//! - [`mount`] - Mounting, unmounting and the widget identity table
//! - [`router`] - Event attribute mapping and handler dispatch
//! - [`reconcile`] - The renderer contract the framework drives
//! - [`host`] - Host runtime trait, event bus, protocol-speaking host
//! - [`protocol`] - Wire message types and MessagePack payload codec
//! - [`socket`] - Framing and the client bridge
//! - [`session`] - Process-wide transport context and event loop
//! - [`config`] - Configuration loading/saving

pub mod config;
pub mod constants;
pub mod error;
pub mod host;
pub mod logging;
pub mod mount;
pub mod props;
pub mod protocol;
pub mod reactive;
pub mod reconcile;
pub mod router;
pub mod session;
pub mod socket;
pub mod tree;
pub mod view;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use host::{Capability, CommandSink, EventBus, HostRuntime, ProtocolHost, Subscription, WidgetSpec};
pub use props::PropValue;
pub use protocol::{Command, HostMessage, UiEvent, WidgetKind, WidgetStyle};
pub use reactive::{Cleanup, Immediate, Reactive};
pub use reconcile::{Reconciler, RenderOptions};
pub use router::Handler;
pub use session::{Session, SessionExit};
pub use socket::{Bridge, BridgeEvent};
pub use tree::NodeId;
pub use view::{ElementView, Prop, View};
