//! Simulated rig transport
//!
//! Behaves like the firmware at the protocol level: accepts writes while the
//! link is open and acknowledges each command with an `ack:<command>`
//! notification. Failures can be injected at any connection step, which is
//! what the session tests rely on.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::{DeviceInfo, EventSender, GattProfile, ScanFilter, Transport, TransportError, TransportEvent};

/// Step at which the simulated link fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFailure {
    Discovery,
    Link,
    Service,
    Characteristic,
    Subscription,
    /// Writes fail but the link stays up
    Write,
    /// Writes report the link as lost
    WriteLinkLost,
}

#[derive(Default)]
struct SimState {
    open: bool,
    events: Option<EventSender>,
    written: Vec<Vec<u8>>,
    calls: Vec<&'static str>,
    failure: Option<SimFailure>,
}

/// In-process stand-in for the rig
#[derive(Clone)]
pub struct SimulatedRig {
    device_name: String,
    echo: bool,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRig {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            echo: true,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Disable `ack:` notifications
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn fail_at(&self, failure: SimFailure) {
        self.state.lock().failure = Some(failure);
    }

    pub fn clear_failure(&self) {
        self.state.lock().failure = None;
    }

    /// Every payload accepted by `write`, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Names of transport calls, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Push a notification as if the firmware had sent it
    pub fn notify(&self, payload: &[u8]) {
        if let Some(events) = &self.state.lock().events {
            let _ = events.send(TransportEvent::Notification(payload.to_vec()));
        }
    }

    /// Drop the link as if the rig went out of range
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.open = false;
        if let Some(events) = state.events.take() {
            let _ = events.send(TransportEvent::LinkLost);
        }
    }

    fn record(&self, call: &'static str) -> Option<SimFailure> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.failure
    }
}

#[async_trait]
impl Transport for SimulatedRig {
    fn name(&self) -> &str {
        "sim"
    }

    async fn discover(&self, filter: &ScanFilter) -> Result<DeviceInfo, TransportError> {
        if self.record("discover") == Some(SimFailure::Discovery) {
            return Err(TransportError::DiscoveryFailed("no device selected".to_string()));
        }
        let advertised = [filter.service];
        if !filter.matches(Some(&self.device_name), &advertised) {
            return Err(TransportError::DiscoveryFailed(format!(
                "no device matched within {:?}",
                filter.timeout
            )));
        }
        Ok(DeviceInfo {
            id: format!("sim:{}", self.device_name),
            name: Some(self.device_name.clone()),
        })
    }

    async fn open(&self, device: &DeviceInfo, profile: &GattProfile) -> Result<(), TransportError> {
        let failure = self.record("open");
        if failure == Some(SimFailure::Link) {
            return Err(TransportError::LinkFailed("gatt connect refused".to_string()));
        }

        // Connected at this point; later failures must drop the link again
        let mut state = self.state.lock();
        state.open = true;
        let resolved = match failure {
            Some(SimFailure::Service) => Err(TransportError::ServiceNotFound(profile.service)),
            Some(SimFailure::Characteristic) => {
                Err(TransportError::CharacteristicNotFound(profile.notify_characteristic))
            }
            _ => Ok(()),
        };
        if resolved.is_err() {
            state.open = false;
        } else {
            debug!("Simulated link opened to {}", device.id);
        }
        resolved
    }

    async fn subscribe(&self, events: EventSender) -> Result<(), TransportError> {
        if self.record("subscribe") == Some(SimFailure::Subscription) {
            return Err(TransportError::SubscriptionFailed("cccd write rejected".to_string()));
        }
        self.state.lock().events = Some(events);
        Ok(())
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        let failure = self.record("write");
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::LinkLost);
        }
        match failure {
            Some(SimFailure::Write) => {
                return Err(TransportError::WriteFailed("gatt write error".to_string()))
            }
            Some(SimFailure::WriteLinkLost) => {
                state.open = false;
                state.events = None;
                return Err(TransportError::LinkLost);
            }
            _ => {}
        }

        state.written.push(payload.to_vec());
        if self.echo {
            if let Some(events) = &state.events {
                let text = String::from_utf8_lossy(payload);
                let ack = format!("ack:{}\0", text.trim_end_matches('\0'));
                let _ = events.send(TransportEvent::Notification(ack.into_bytes()));
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.record("close");
        let mut state = self.state.lock();
        state.open = false;
        state.events = None;
    }
}
