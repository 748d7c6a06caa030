//! Transport session: connection lifecycle of the link to the rig
//!
//! Owns the connection state machine
//! `Disconnected → Scanning → Connecting → Connected → Disconnecting → Disconnected`
//! and publishes every transition on a `watch` channel. Errors are reported
//! to the event logger where they happen and returned to the caller; none of
//! them is retried.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::logger::EventLogger;
use crate::transport::{
    EventSender, GattProfile, LinkEvent, ScanFilter, Transport, TransportError, TransportEvent,
};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}

/// Read-only status surface for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: ConnectionState,
    pub device_name: Option<String>,
}

impl Status {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            device_name: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Status text shown next to the connect control
    pub fn label(&self) -> String {
        match &self.device_name {
            Some(name) => format!("{} ({})", self.state, name),
            None => self.state.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: ConnectionState,
    },
    #[error("connection failed: {0}")]
    Connect(TransportError),
    #[error("not connected")]
    SendFailedNotConnected,
    #[error("send failed: {0}")]
    SendFailedTransport(TransportError),
}

pub struct TransportSession {
    transport: Arc<dyn Transport>,
    profile: GattProfile,
    filter: ScanFilter,
    logger: Arc<dyn EventLogger>,
    status_tx: watch::Sender<Status>,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    /// Bumped on every connect attempt; events from older links are dropped
    generation: u64,
}

impl TransportSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        profile: GattProfile,
        filter: ScanFilter,
        logger: Arc<dyn EventLogger>,
    ) -> Self {
        let (status_tx, _) = watch::channel(Status::disconnected());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            profile,
            filter,
            logger,
            status_tx,
            events_tx,
            events_rx: Some(events_rx),
            generation: 0,
        }
    }

    /// Take the inbound event receiver (can only be called once)
    ///
    /// The owner of the event loop feeds every event back into [`Self::on_event`].
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events_rx.take()
    }

    pub fn status(&self) -> Status {
        self.status_tx.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status_tx.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Replace the profile and scan filter; used from the next `connect`
    pub fn set_link_settings(&mut self, profile: GattProfile, filter: ScanFilter) {
        self.profile = profile;
        self.filter = filter;
    }

    fn set_state(&self, state: ConnectionState, device_name: Option<String>) {
        debug!("Session state: {} → {}", self.state(), state);
        self.status_tx.send_replace(Status { state, device_name });
    }

    fn require(&self, expected: ConnectionState, op: &'static str) -> Result<(), SessionError> {
        let state = self.state();
        if state != expected {
            let err = SessionError::InvalidState { op, state };
            warn!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    /// Discover the rig, open the link and subscribe to notifications
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.require(ConnectionState::Disconnected, "connect")?;
        self.generation += 1;

        self.set_state(ConnectionState::Scanning, None);
        self.logger.log("scanning for devices...", false);
        let device = match self.transport.discover(&self.filter).await {
            Ok(device) => device,
            Err(e) => return Err(self.abort_connect(e).await),
        };

        let name = device.display_name();
        self.set_state(ConnectionState::Connecting, Some(name.clone()));
        self.logger.log(&format!("found \"{}\", connecting...", name), false);

        if let Err(e) = self.transport.open(&device, &self.profile).await {
            return Err(self.abort_connect(e).await);
        }
        let events = EventSender::new(self.generation, self.events_tx.clone());
        if let Err(e) = self.transport.subscribe(events).await {
            return Err(self.abort_connect(e).await);
        }

        self.set_state(ConnectionState::Connected, Some(name.clone()));
        self.logger.log(&format!("connected to {}", name), false);
        info!("Connected to {} over {}", name, self.transport.name());
        Ok(())
    }

    async fn abort_connect(&mut self, error: TransportError) -> SessionError {
        self.logger.log(
            &format!("connection failed, try restarting the device: {}", error),
            true,
        );
        self.transport.close().await;
        self.set_state(ConnectionState::Disconnected, None);
        SessionError::Connect(error)
    }

    /// Tear down the link; always ends in `Disconnected`
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.require(ConnectionState::Connected, "disconnect")?;

        let name = self.status().device_name;
        self.set_state(ConnectionState::Disconnecting, name);
        self.logger.log("disconnecting...", false);
        self.transport.close().await;
        self.set_state(ConnectionState::Disconnected, None);
        self.logger.log("disconnected", false);
        Ok(())
    }

    /// Write one encoded command
    ///
    /// Fails fast without touching the transport when not connected.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        if !self.is_connected() {
            warn!("Send rejected: not connected");
            self.logger.log("not connected: connect to the device first", true);
            return Err(SessionError::SendFailedNotConnected);
        }

        match self.transport.write(payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.logger.log(&format!("send failed: {}", e), true);
                if e == TransportError::LinkLost {
                    self.on_link_lost().await;
                }
                Err(SessionError::SendFailedTransport(e))
            }
        }
    }

    /// Handle one inbound transport event
    ///
    /// Events stamped by an earlier connection are ignored.
    pub async fn on_event(&mut self, event: LinkEvent) {
        if event.generation != self.generation {
            debug!(
                "Ignoring {:?} from link #{} (current #{})",
                event.event, event.generation, self.generation
            );
            return;
        }
        match event.event {
            TransportEvent::Notification(bytes) => {
                if let Some(text) = decode_notification(&bytes) {
                    self.logger.log(&format!("device: {}", text), false);
                }
            }
            TransportEvent::LinkLost => {
                if self.is_connected() {
                    self.logger.log("link to device lost", true);
                    self.on_link_lost().await;
                } else {
                    debug!("Ignoring link loss while {}", self.state());
                }
            }
        }
    }

    async fn on_link_lost(&mut self) {
        self.transport.close().await;
        self.set_state(ConnectionState::Disconnected, None);
    }
}

/// Decode a notification as UTF-8 text, trimmed of whitespace and control characters
pub fn decode_notification(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c.is_control());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
