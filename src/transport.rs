//! Wireless link to the rig
//!
//! The rig exposes one primary service with a write characteristic (commands
//! in) and a notify characteristic (messages out). [`Transport`] is the seam
//! between the session state machine and a concrete link implementation.

#[cfg(feature = "ble")]
pub mod ble;
pub mod sim;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[cfg(feature = "ble")]
pub use ble::BtleplugTransport;
pub use sim::{SimFailure, SimulatedRig};

/// Primary service shared with the firmware
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);
/// Write characteristic (panel → rig)
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);
/// Notify characteristic (rig → panel)
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbeb5484e_36e1_4688_b7f5_ea07361b26a8);

/// Classified link failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device discovery failed: {0}")]
    DiscoveryFailed(String),
    #[error("could not open link to device: {0}")]
    LinkFailed(String),
    #[error("service {0} not found on device")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),
    #[error("notification subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("link to device lost")]
    LinkLost,
}

/// Service and characteristic identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    pub service: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: SERVICE_UUID,
            write_characteristic: WRITE_CHARACTERISTIC_UUID,
            notify_characteristic: NOTIFY_CHARACTERISTIC_UUID,
        }
    }
}

/// Device discovery parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Accept any advertising device instead of filtering on the service
    pub accept_all: bool,
    pub service: Uuid,
    pub name_prefix: Option<String>,
    pub timeout: Duration,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            accept_all: true,
            service: SERVICE_UUID,
            name_prefix: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ScanFilter {
    /// Whether an advertised device passes this filter
    pub fn matches(&self, name: Option<&str>, services: &[Uuid]) -> bool {
        if !self.accept_all && !services.contains(&self.service) {
            return false;
        }
        match (&self.name_prefix, name) {
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// A discovered device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Platform identifier used to reopen the device
    pub id: String,
    pub name: Option<String>,
}

impl DeviceInfo {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "unknown device".to_string())
    }
}

/// Asynchronous inbound events from the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Notification(Vec<u8>),
    LinkLost,
}

/// An event tagged with the connection attempt that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Event channel handed to a transport for one connection
///
/// Every event is stamped with the generation of the connect that created
/// the sender, so reports from an earlier link can be told apart.
#[derive(Debug, Clone)]
pub struct EventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn send(&self, event: TransportEvent) -> Result<(), mpsc::error::SendError<LinkEvent>> {
        self.tx.send(LinkEvent {
            generation: self.generation,
            event,
        })
    }
}

/// Link implementation used by the session
///
/// All methods take `&self`; implementations keep their link handles behind
/// interior mutability so the transport can live in an `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs (e.g. "ble", "sim")
    fn name(&self) -> &str;

    /// Scan for a device matching `filter`
    async fn discover(&self, filter: &ScanFilter) -> Result<DeviceInfo, TransportError>;

    /// Connect to the device and resolve the service and both characteristics
    async fn open(&self, device: &DeviceInfo, profile: &GattProfile) -> Result<(), TransportError>;

    /// Start notifications; events are pushed to `events` until the link closes
    async fn subscribe(&self, events: EventSender) -> Result<(), TransportError>;

    /// Write one command to the write characteristic
    async fn write(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Tear down the link, best-effort. Must be safe to call when not open.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_constants() {
        let profile = GattProfile::default();
        assert_eq!(profile.service.to_string(), "4fafc201-1fb5-459e-8fcc-c5c9c331914b");
        assert_eq!(
            profile.write_characteristic.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
        assert_eq!(
            profile.notify_characteristic.to_string(),
            "beb5484e-36e1-4688-b7f5-ea07361b26a8"
        );
    }

    #[test]
    fn test_event_sender_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = EventSender::new(1, tx.clone());
        let second = EventSender::new(2, tx);

        first.send(TransportEvent::LinkLost).unwrap();
        second.send(TransportEvent::Notification(b"ok".to_vec())).unwrap();

        assert_eq!(rx.try_recv().unwrap().generation, 1);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.generation, 2);
        assert_eq!(event.event, TransportEvent::Notification(b"ok".to_vec()));
    }

    #[test]
    fn test_scan_filter_matching() {
        let mut filter = ScanFilter::default();
        assert!(filter.matches(None, &[]));

        filter.accept_all = false;
        assert!(!filter.matches(Some("Rig"), &[]));
        assert!(filter.matches(Some("Rig"), &[SERVICE_UUID]));

        filter.name_prefix = Some("M5".to_string());
        assert!(filter.matches(Some("M5Stamp"), &[SERVICE_UUID]));
        assert!(!filter.matches(Some("Other"), &[SERVICE_UUID]));
        assert!(!filter.matches(None, &[SERVICE_UUID]));
    }
}
