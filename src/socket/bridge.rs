//! Client-side bridge to the widget host.
//!
//! Owns the one connection to the host and translates between [`Command`]s
//! and socket frames. Commands issued before the connection exists are
//! queued and flushed in order on connect, followed by the `ready`
//! handshake.
//!
//! ```text
//! Reconciler ──send(Command)──► Bridge ──frames──► Unix socket ──► Host
//!                                  │
//! Session ◄──BridgeEvent (mpsc)────┘◄──frames── Unix socket ◄── Host
//! ```
//!
//! The bridge never reconnects. A read or write failure, or the host closing
//! the socket without a `shutdown` message, surfaces as
//! [`BridgeEvent::TransportError`] and the session treats it as fatal.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::framing::{decode_message, encode_value, FrameDecoder};
use crate::constants::READ_BUFFER_SIZE;
use crate::protocol::{Command, HostMessage, UiEvent};

/// Event delivered from the bridge's read and write tasks to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Interaction event from the host.
    Ui(UiEvent),
    /// The host asked the client to shut down.
    Shutdown,
    /// The transport broke; nothing sent or received afterwards can be trusted.
    TransportError(String),
}

/// Outgoing side of the connection.
enum Outbox {
    /// Not connected yet; commands wait here in program order.
    Pending(VecDeque<Command>),
    /// Connected; encoded frames go straight to the write task.
    Connected(UnboundedSender<Vec<u8>>),
    /// Closed by the client; further commands are dropped.
    Closed,
}

struct Inner {
    outbox: Mutex<Outbox>,
    events_tx: UnboundedSender<BridgeEvent>,
    read_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Connection to the widget host.
///
/// Cheap to clone; every clone shares the same connection and queue.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("connected", &self.is_connected())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Create an unconnected bridge and the receiver for its events.
    pub fn new() -> (Self, UnboundedReceiver<BridgeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let bridge = Self {
            inner: Arc::new(Inner {
                outbox: Mutex::new(Outbox::Pending(VecDeque::new())),
                events_tx,
                read_handle: Mutex::new(None),
            }),
        };
        (bridge, events_rx)
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.inner
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a command, or queue it until the connection exists.
    pub fn send(&self, command: Command) {
        let mut outbox = self.outbox();
        match &mut *outbox {
            Outbox::Pending(queue) => queue.push_back(command),
            Outbox::Connected(frame_tx) => {
                forward(frame_tx, &command);
            }
            Outbox::Closed => {
                log::debug!("[Bridge] Closed, dropping {:?}", command);
            }
        }
    }

    /// Whether the connection is established.
    pub fn is_connected(&self) -> bool {
        matches!(&*self.outbox(), Outbox::Connected(_))
    }

    /// Number of commands waiting for the connection.
    pub fn queued(&self) -> usize {
        match &*self.outbox() {
            Outbox::Pending(queue) => queue.len(),
            Outbox::Connected(_) | Outbox::Closed => 0,
        }
    }

    /// Connect to the host socket at `path` and flush the queue.
    pub async fn connect(&self, path: &Path) -> Result<()> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Failed to connect to host socket {}", path.display()))?;
        self.attach(stream)
    }

    /// Take over an already connected stream.
    ///
    /// Spawns the read and write tasks, flushes queued commands in FIFO
    /// order, then sends the `ready` handshake. Must be called inside a
    /// tokio runtime.
    pub fn attach(&self, stream: UnixStream) -> Result<()> {
        let mut outbox = self.outbox();
        let queue = match &mut *outbox {
            Outbox::Pending(queue) => std::mem::take(queue),
            Outbox::Connected(_) => bail!("Bridge is already connected"),
            Outbox::Closed => bail!("Bridge was closed"),
        };

        let (reader, writer) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        tokio::spawn(write_loop(writer, frame_rx, self.inner.events_tx.clone()));
        let read_handle = tokio::spawn(read_loop(reader, self.inner.events_tx.clone()));
        *self
            .inner
            .read_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(read_handle);

        let flushed = queue.len();
        for command in queue.into_iter().chain(std::iter::once(Command::Ready)) {
            forward(&frame_tx, &command);
        }
        *outbox = Outbox::Connected(frame_tx);

        log::info!("[Bridge] Connected, flushed {} queued commands", flushed);
        Ok(())
    }

    /// Close the connection.
    ///
    /// Frames already handed to the write task are still written; the read
    /// task stops immediately.
    pub fn close(&self) {
        *self.outbox() = Outbox::Closed;
        if let Some(handle) = self
            .inner
            .read_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        log::info!("[Bridge] Closed");
    }
}

/// Encode `command` and hand the frame to the write task.
///
/// Returns false when the command was dropped; the reason is logged.
fn forward(frame_tx: &UnboundedSender<Vec<u8>>, command: &Command) -> bool {
    match encode_value(command) {
        Ok(frame) => {
            if frame_tx.send(frame).is_err() {
                log::error!("[Bridge] Write task gone, dropping {:?}", command);
                return false;
            }
            true
        }
        Err(e) => {
            log::error!("[Bridge] Failed to encode command: {e}");
            false
        }
    }
}

/// Read loop: reassembles frames, decodes host messages, forwards events.
async fn read_loop(
    mut reader: tokio::net::unix::OwnedReadHalf,
    events_tx: UnboundedSender<BridgeEvent>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                log::error!("[Bridge] Host closed the socket");
                let _ = events_tx.send(BridgeEvent::TransportError(
                    "host closed the connection".to_string(),
                ));
                return;
            }
            Ok(n) => {
                let payloads = match decoder.feed(&buf[..n]) {
                    Ok(payloads) => payloads,
                    Err(e) => {
                        log::error!("[Bridge] Framing error: {e}");
                        let _ = events_tx.send(BridgeEvent::TransportError(e.to_string()));
                        return;
                    }
                };

                for payload in payloads {
                    match decode_message(&payload) {
                        Ok(HostMessage::UiEvent { event }) => {
                            if events_tx.send(BridgeEvent::Ui(event)).is_err() {
                                return; // Session gone
                            }
                        }
                        Ok(HostMessage::Shutdown) => {
                            log::info!("[Bridge] Host requested shutdown");
                            let _ = events_tx.send(BridgeEvent::Shutdown);
                            return;
                        }
                        Err(e) => {
                            log::error!("[Bridge] Dropping undecodable frame: {e}");
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("[Bridge] Socket read error: {e}");
                let _ = events_tx.send(BridgeEvent::TransportError(e.to_string()));
                return;
            }
        }
    }
}

/// Write loop: writes encoded frames in the order they were queued.
async fn write_loop(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut frame_rx: UnboundedReceiver<Vec<u8>>,
    events_tx: UnboundedSender<BridgeEvent>,
) {
    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            log::error!("[Bridge] Socket write error: {e}");
            let _ = events_tx.send(BridgeEvent::TransportError(e.to_string()));
            return;
        }
    }
    let _ = writer.shutdown().await;
}
