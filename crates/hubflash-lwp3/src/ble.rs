//! Bluetooth Low Energy transport
//!
//! Scans for a hub advertising the bootloader service, connects to the first
//! one found and talks to it through the bootloader characteristic.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use hubflash_core::protocol::{CHARACTERISTIC_UUID_U128, SERVICE_UUID_U128};

use crate::error::{ConnectFailure, SendFailure};
use crate::transport::{LinkEvent, Transport};

/// How long to look for a hub in bootloader mode
pub const DEFAULT_SCAN_TIME: Duration = Duration::from_secs(10);

/// Pause between connecting and service discovery
///
/// Some OS stacks report the link as up before the hub is ready to answer
/// service discovery.
pub const SETTLE_TIME: Duration = Duration::from_secs(1);

const SCAN_POLL: Duration = Duration::from_millis(250);

struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
    events: UnboundedSender<LinkEvent>,
    pump: JoinHandle<()>,
}

/// BLE transport built on `btleplug`
pub struct BleTransport {
    scan_time: Duration,
    link: Mutex<Option<BleLink>>,
}

impl BleTransport {
    /// Create a transport with the default scan time
    pub fn new() -> Self {
        Self::with_scan_time(DEFAULT_SCAN_TIME)
    }

    /// Create a transport that scans for at most `scan_time`
    pub fn with_scan_time(scan_time: Duration) -> Self {
        Self {
            scan_time,
            link: Mutex::new(None),
        }
    }

    async fn adapter() -> Result<Adapter, ConnectFailure> {
        let manager = Manager::new().await.map_err(|e| {
            log::debug!("Bluetooth manager unavailable: {}", e);
            ConnectFailure::NoPlatformSupport
        })?;
        let adapters = manager.adapters().await.map_err(|e| {
            log::debug!("Failed to list Bluetooth adapters: {}", e);
            ConnectFailure::NoBluetooth
        })?;
        adapters.into_iter().next().ok_or(ConnectFailure::NoBluetooth)
    }

    async fn find_hub(&self, adapter: &Adapter) -> Result<Peripheral, ConnectFailure> {
        let service = Uuid::from_u128(SERVICE_UUID_U128);
        adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(|e| {
                log::debug!("Failed to start scan: {}", e);
                ConnectFailure::NoBluetooth
            })?;

        log::info!("Scanning for a hub in bootloader mode...");
        let deadline = tokio::time::Instant::now() + self.scan_time;
        let found = loop {
            let peripherals = adapter.peripherals().await.map_err(unknown)?;
            let mut hit = None;
            for peripheral in peripherals {
                if let Ok(Some(props)) = peripheral.properties().await {
                    if props.services.contains(&service) {
                        log::info!(
                            "Found {} ({})",
                            props.local_name.unwrap_or_else(|| "hub".to_string()),
                            peripheral.address()
                        );
                        hit = Some(peripheral);
                        break;
                    }
                }
            }
            if hit.is_some() || tokio::time::Instant::now() >= deadline {
                break hit;
            }
            tokio::time::sleep(SCAN_POLL).await;
        };

        let _ = adapter.stop_scan().await;
        found.ok_or(ConnectFailure::Canceled)
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(e: btleplug::Error) -> ConnectFailure {
    ConnectFailure::Unknown(e.to_string())
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self) -> Result<UnboundedReceiver<LinkEvent>, ConnectFailure> {
        let adapter = Self::adapter().await?;
        let mut central_events = adapter.events().await.map_err(unknown)?;
        let peripheral = self.find_hub(&adapter).await?;

        peripheral.connect().await.map_err(unknown)?;
        tokio::time::sleep(SETTLE_TIME).await;

        if let Err(e) = peripheral.discover_services().await {
            let _ = peripheral.disconnect().await;
            return Err(unknown(e));
        }

        let char_uuid = Uuid::from_u128(CHARACTERISTIC_UUID_U128);
        let service_uuid = Uuid::from_u128(SERVICE_UUID_U128);
        let characteristic = match peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == char_uuid && c.service_uuid == service_uuid)
        {
            Some(c) => c,
            None => {
                let _ = peripheral.disconnect().await;
                return Err(ConnectFailure::GattServiceNotFound);
            }
        };

        // A subscription left over from an earlier session would deliver
        // every notification twice on some stacks
        let _ = peripheral.unsubscribe(&characteristic).await;
        if let Err(e) = peripheral.subscribe(&characteristic).await {
            let _ = peripheral.disconnect().await;
            return Err(unknown(e));
        }
        let mut notifications = match peripheral.notifications().await {
            Ok(n) => n,
            Err(e) => {
                let _ = peripheral.disconnect().await;
                return Err(unknown(e));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let pump_tx = tx.clone();
        let id = peripheral.id();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    n = notifications.next() => match n {
                        Some(n) if n.uuid == char_uuid => {
                            log::trace!("BLE notify {:02X?}", n.value);
                            if pump_tx.send(LinkEvent::Notification(n.value)).is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                    e = central_events.next() => match e {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => break,
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            log::debug!("BLE link dropped");
            let _ = pump_tx.send(LinkEvent::Dropped);
        });

        log::info!("Connected to hub bootloader");
        *self.link.lock().await = Some(BleLink {
            peripheral,
            characteristic,
            events: tx,
            pump,
        });
        Ok(rx)
    }

    async fn send(&self, frame: &[u8], require_ack: bool) -> Result<(), SendFailure> {
        let (peripheral, characteristic) = {
            let link = self.link.lock().await;
            let link = link.as_ref().ok_or(SendFailure::NotConnected)?;
            (link.peripheral.clone(), link.characteristic.clone())
        };

        let write_type = if require_ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        log::trace!("BLE write {:02X?} ({:?})", frame, write_type);
        peripheral
            .write(&characteristic, frame, write_type)
            .await
            .map_err(|e| SendFailure::Failed(e.to_string()))
    }

    async fn disconnect(&self) {
        let Some(link) = self.link.lock().await.take() else {
            return;
        };
        let _ = link.peripheral.unsubscribe(&link.characteristic).await;
        if let Err(e) = link.peripheral.disconnect().await {
            log::warn!("BLE disconnect failed: {}", e);
        }
        link.pump.abort();
        let _ = link.events.send(LinkEvent::Dropped);
    }
}
