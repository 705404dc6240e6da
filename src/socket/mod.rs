//! Unix domain socket transport to the widget host.
//!
//! # Architecture
//!
//! ```text
//! Client process                          Host process
//! ┌────────────────────┐                ┌──────────────────┐
//! │ Reconciler         │                │ widget engine    │
//! │   └─ ProtocolHost  │                │  window, layout  │
//! │        └─ Bridge   │◄──────────────►│  UnixListener    │
//! │  read/write tasks  │  frames over   │                  │
//! └────────┬───────────┘  Unix socket   └──────────────────┘
//!          │ BridgeEvent
//!          ▼
//!       Session loop → EventBus → EventRouter → handlers
//! ```
//!
//! # Wire Protocol
//!
//! Length-prefixed frames: `[u32 LE length][MessagePack payload]`
//!
//! See [`framing`] for the codec and [`crate::protocol`] for message types.

pub mod bridge;
pub mod framing;

pub use bridge::{Bridge, BridgeEvent};
