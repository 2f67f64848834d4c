//! Bluetooth LE command source.
//!
//! Connects as a central to the peripheral that publishes target angles and
//! turns every notification on the command characteristic into a write.

use crate::config::BleConfig;
use crate::error::SourceError;
use crate::source::{CommandSource, InboundEvent};
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification,
};
use btleplug::platform::{Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use tokio::time::Duration;
use tracing::{debug, info, warn};

type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

pub struct BleSource {
    device: Peripheral,
    characteristic: Characteristic,
    notifications: Notifications,
}

impl BleSource {
    pub async fn connect(config: &BleConfig) -> Result<Self, SourceError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(SourceError::NoAdapter)?;

        adapter.start_scan(ScanFilter::default()).await?;
        let mut events = adapter.events().await?;
        let scan_timeout = Duration::from_secs(config.scan_timeout_secs);

        info!(name = %config.peripheral_name, "scanning for command peripheral");

        let mut found_device = None;
        while let Ok(Some(event)) = tokio::time::timeout(scan_timeout, events.next()).await {
            if let CentralEvent::DeviceDiscovered(id) = event {
                let peripheral = adapter.peripheral(&id).await?;
                if let Ok(Some(properties)) = peripheral.properties().await {
                    let name_matches =
                        properties.local_name.as_deref() == Some(config.peripheral_name.as_str());
                    let advertises_service = properties.services.contains(&config.service_uuid);
                    if name_matches || advertises_service {
                        found_device = Some(peripheral);
                        break;
                    }
                }
            }
        }

        adapter.stop_scan().await?;

        let device = found_device
            .ok_or_else(|| SourceError::PeripheralNotFound(config.peripheral_name.clone()))?;
        device.connect().await?;
        device.discover_services().await?;

        let characteristic = device
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == config.characteristic_uuid && c.service_uuid == config.service_uuid)
            .ok_or(SourceError::CharacteristicNotFound)?;

        if !characteristic.properties.contains(CharPropFlags::NOTIFY) {
            warn!("command characteristic does not advertise notify; subscribing anyway");
        }
        device.subscribe(&characteristic).await?;
        let notifications = device.notifications().await?;

        info!(uuid = %characteristic.uuid, "subscribed to command characteristic");
        Ok(BleSource {
            device,
            characteristic,
            notifications,
        })
    }
}

impl CommandSource for BleSource {
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        while let Some(notification) = self.notifications.next().await {
            if notification.uuid == self.characteristic.uuid {
                return Ok(Some(InboundEvent::Write(notification.value)));
            }
            debug!(uuid = %notification.uuid, "ignoring notification");
        }

        info!("peripheral disconnected");
        let _ = self.device.disconnect().await;
        Ok(None)
    }

    async fn reply(&mut self, _value: &[u8]) -> Result<(), SourceError> {
        // Notifications carry no read requests, so there is never anyone to answer.
        Ok(())
    }
}
