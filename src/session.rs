//! Client session: one bridge, one protocol host, one event loop.
//!
//! [`Session`] is the process-wide transport context. It is created once at
//! startup and hands out the [`ProtocolHost`] the reconciler drives. While
//! [`Session::run`] is pumping, incoming UI events reach the host's event bus
//! in arrival order.
//!
//! A host `shutdown` ends the session cleanly; any transport failure ends it
//! as lost. Neither is recovered from: the caller exits the process with
//! [`SessionExit::exit`].

use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::constants::{EXIT_SHUTDOWN, EXIT_TRANSPORT_LOST};
use crate::host::{HostRuntime, ProtocolHost};
use crate::reactive::Reactive;
use crate::reconcile::Reconciler;
use crate::socket::{Bridge, BridgeEvent};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// The host asked the client to shut down.
    Shutdown,
    /// The transport broke.
    TransportLost(String),
}

impl SessionExit {
    /// Process exit code for this outcome.
    pub fn code(&self) -> i32 {
        match self {
            Self::Shutdown => EXIT_SHUTDOWN,
            Self::TransportLost(_) => EXIT_TRANSPORT_LOST,
        }
    }

    /// Terminate the process with [`SessionExit::code`].
    pub fn exit(&self) -> ! {
        std::process::exit(self.code())
    }
}

/// Connection to one widget host.
pub struct Session {
    config: Config,
    bridge: Bridge,
    events: UnboundedReceiver<BridgeEvent>,
    host: Rc<ProtocolHost<Bridge>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("socket_path", &self.config.socket_path)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session for `config`. Nothing connects until [`Session::connect`].
    pub fn new(config: Config) -> Self {
        let (bridge, events) = Bridge::new();
        let host = Rc::new(ProtocolHost::new(bridge.clone()));
        Self {
            config,
            bridge,
            events,
            host,
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The transport.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Host speaking the wire protocol over this session's bridge.
    pub fn host(&self) -> Rc<ProtocolHost<Bridge>> {
        Rc::clone(&self.host)
    }

    /// Reconciler driving this session's host.
    pub fn reconciler(&self, reactive: Rc<dyn Reactive>) -> Reconciler {
        let host: Rc<dyn HostRuntime> = self.host();
        Reconciler::new(host, reactive)
    }

    /// Connect to the configured socket, retrying with a doubling delay.
    pub async fn connect(&self) -> Result<()> {
        let path = &self.config.socket_path;
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.bridge.connect(path).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::debug!("[Session] Connect attempt {}/{} failed: {:#}", attempt + 1, attempts, e);
                    last_error = Some(e);
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.retry_delay(attempt)).await;
            }
        }

        let error = last_error.context("No connection attempt was made")?;
        Err(error).with_context(|| format!("Giving up after {} attempts", attempts))
    }

    /// Connect, then pump events until the session ends.
    pub async fn run(mut self) -> SessionExit {
        if let Err(e) = self.connect().await {
            return transport_lost(format!("{e:#}"));
        }
        self.pump().await
    }

    /// Deliver incoming events to the host until shutdown or transport loss.
    pub async fn pump(&mut self) -> SessionExit {
        while let Some(event) = self.events.recv().await {
            match event {
                BridgeEvent::Ui(event) => {
                    self.host.deliver(&event);
                }
                BridgeEvent::Shutdown => {
                    log::info!("[Session] Host requested shutdown");
                    self.bridge.close();
                    return SessionExit::Shutdown;
                }
                BridgeEvent::TransportError(message) => {
                    self.bridge.close();
                    return transport_lost(message);
                }
            }
        }
        transport_lost("event channel closed".to_string())
    }
}

fn transport_lost(message: String) -> SessionExit {
    log::error!("[Session] Transport lost: {}", message);
    eprintln!("widgetlink: transport lost: {message}");
    SessionExit::TransportLost(message)
}
