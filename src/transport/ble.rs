//! Bluetooth LE transport using btleplug
//!
//! Scans with the first available adapter, connects to the first device that
//! passes the [`ScanFilter`], resolves the rig's service and characteristics,
//! and forwards notifications into the session's event channel.

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter as BleScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DeviceInfo, EventSender, GattProfile, ScanFilter, Transport, TransportError, TransportEvent};

/// Interval between peripheral list checks while scanning
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Link {
    peripheral: Peripheral,
    write: Characteristic,
    notify: Characteristic,
    forwarder: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct BleState {
    adapter: Option<Adapter>,
    candidate: Option<Peripheral>,
    link: Option<Link>,
}

pub struct BtleplugTransport {
    state: Mutex<BleState>,
}

impl Default for BtleplugTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BtleplugTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BleState::default()),
        }
    }

    async fn adapter(state: &mut BleState) -> Result<Adapter, TransportError> {
        if let Some(adapter) = &state.adapter {
            return Ok(adapter.clone());
        }
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::DiscoveryFailed(format!("bluetooth unavailable: {}", e)))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::DiscoveryFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::DiscoveryFailed("no bluetooth adapter".to_string()))?;
        state.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    async fn find_match(
        adapter: &Adapter,
        filter: &ScanFilter,
    ) -> Result<Option<(Peripheral, Option<String>)>, TransportError> {
        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::DiscoveryFailed(e.to_string()))?;
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            if filter.matches(props.local_name.as_deref(), &props.services) {
                return Ok(Some((peripheral, props.local_name)));
            }
        }
        Ok(None)
    }

    /// Drop a half-opened connection
    async fn release(peripheral: &Peripheral) {
        if let Err(e) = peripheral.disconnect().await {
            warn!("BLE disconnect after failed open: {}", e);
        }
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    fn name(&self) -> &str {
        "ble"
    }

    async fn discover(&self, filter: &ScanFilter) -> Result<DeviceInfo, TransportError> {
        let mut state = self.state.lock().await;
        let adapter = Self::adapter(&mut state).await?;

        let services = if filter.accept_all {
            Vec::new()
        } else {
            vec![filter.service]
        };
        adapter
            .start_scan(BleScanFilter { services })
            .await
            .map_err(|e| TransportError::DiscoveryFailed(e.to_string()))?;

        let deadline = Instant::now() + filter.timeout;
        let found = loop {
            if let Some(found) = Self::find_match(&adapter, filter).await? {
                break Some(found);
            }
            if Instant::now() >= deadline {
                break None;
            }
            sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            debug!("stop_scan failed: {}", e);
        }

        let (peripheral, name) = found.ok_or_else(|| {
            TransportError::DiscoveryFailed(format!("no device found within {:?}", filter.timeout))
        })?;
        let id = format!("{:?}", peripheral.id());
        info!("Discovered {} ({})", name.as_deref().unwrap_or("unnamed"), id);
        state.candidate = Some(peripheral);
        Ok(DeviceInfo { id, name })
    }

    async fn open(&self, device: &DeviceInfo, profile: &GattProfile) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let peripheral = state
            .candidate
            .take()
            .ok_or_else(|| TransportError::LinkFailed(format!("device {} was not discovered", device.id)))?;

        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::LinkFailed(e.to_string()))?;
        if let Err(e) = peripheral.discover_services().await {
            Self::release(&peripheral).await;
            return Err(TransportError::LinkFailed(format!("service discovery: {}", e)));
        }

        if !peripheral.services().iter().any(|s| s.uuid == profile.service) {
            Self::release(&peripheral).await;
            return Err(TransportError::ServiceNotFound(profile.service));
        }

        let characteristics = peripheral.characteristics();
        let find = |id: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == id && c.service_uuid == profile.service)
                .cloned()
                .ok_or(TransportError::CharacteristicNotFound(id))
        };
        let (write, notify) = match (find(profile.write_characteristic), find(profile.notify_characteristic)) {
            (Ok(write), Ok(notify)) => (write, notify),
            (Err(e), _) | (_, Err(e)) => {
                Self::release(&peripheral).await;
                return Err(e);
            }
        };

        state.link = Some(Link {
            peripheral,
            write,
            notify,
            forwarder: None,
        });
        Ok(())
    }

    async fn subscribe(&self, events: EventSender) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let link = state
            .link
            .as_mut()
            .ok_or_else(|| TransportError::SubscriptionFailed("link not open".to_string()))?;

        link.peripheral
            .subscribe(&link.notify)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;
        let mut stream = link
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;

        let notify_uuid = link.notify.uuid;
        link.forwarder = Some(tokio::spawn(async move {
            use tokio_stream::StreamExt;

            while let Some(notification) = stream.next().await {
                if notification.uuid != notify_uuid {
                    continue;
                }
                if events.send(TransportEvent::Notification(notification.value)).is_err() {
                    return;
                }
            }
            // Stream ends when the peripheral disconnects
            if events.send(TransportEvent::LinkLost).is_err() {
                debug!("Link loss not delivered: session event channel closed");
            }
        }));
        Ok(())
    }

    async fn write(&self, payload: &[u8]) -> Result<(), TransportError> {
        let state = self.state.lock().await;
        let link = state.link.as_ref().ok_or(TransportError::LinkLost)?;

        if !link.peripheral.is_connected().await.unwrap_or(false) {
            return Err(TransportError::LinkLost);
        }
        link.peripheral
            .write(&link.write, payload, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        state.candidate = None;
        if let Some(link) = state.link.take() {
            // Stop forwarding first so the teardown is not reported as a loss
            if let Some(forwarder) = link.forwarder {
                forwarder.abort();
            }
            if let Err(e) = link.peripheral.disconnect().await {
                warn!("BLE disconnect failed: {}", e);
            }
        }
    }
}
