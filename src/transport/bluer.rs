//! BlueZ D-Bus transport.
//!
//! This backend uses the `bluer` crate to talk to the BlueZ daemon via D-Bus.
//! It requires the `bluetoothd` daemon to be running.

use super::{BoxFuture, Connection, PeripheralInfo, ReadError, Transport, TransportError};
use crate::mac_address::{DeviceTarget, MacAddress};
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Match one discovered device against `target`.
///
/// Devices may vanish between the discovery event and the property query; a
/// failed query skips the device instead of ending the scan.
fn candidate(
    target: &DeviceTarget,
    address: Address,
    name: bluer::Result<Option<String>>,
) -> Option<PeripheralInfo> {
    let name = match name {
        Ok(name) => name,
        Err(err) => {
            debug!(%address, error = %err, "skipping device, properties unavailable");
            return None;
        }
    };
    let matches = match target {
        DeviceTarget::Address(wanted) => MacAddress::from(address) == *wanted,
        DeviceTarget::Name(wanted) => name.as_deref() == Some(wanted.as_str()),
    };
    matches.then(|| PeripheralInfo {
        address: address.into(),
        name,
    })
}

impl From<bluer::Error> for TransportError {
    fn from(err: bluer::Error) -> Self {
        TransportError::Bluetooth(err.to_string())
    }
}

/// Transport backed by the default BlueZ adapter.
pub struct BluerTransport {
    // Keeps the D-Bus connection alive for the adapter
    _session: Session,
    adapter: Adapter,
    service: Option<Uuid>,
}

impl BluerTransport {
    /// Power up the default adapter.
    ///
    /// Only characteristics of `service` are reported by connections when a
    /// service is given.
    pub async fn new(service: Option<Uuid>) -> Result<Self, TransportError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        debug!(adapter = adapter.name(), "Bluetooth adapter ready");

        Ok(Self {
            _session: session,
            adapter,
            service,
        })
    }

    async fn scan(
        &self,
        target: &DeviceTarget,
        window: Duration,
    ) -> Result<Vec<PeripheralInfo>, TransportError> {
        let events = self.adapter.discover_devices().await?;
        tokio::pin!(events);
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        let mut found = Vec::new();
        loop {
            let event = tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => event,
            };
            let address = match event {
                Some(AdapterEvent::DeviceAdded(address)) => address,
                Some(_) => continue,
                None => break,
            };

            let name = match self.adapter.device(address) {
                Ok(device) => device.name().await,
                Err(err) => Err(err),
            };
            let Some(peripheral) = candidate(target, address, name) else {
                continue;
            };
            found.push(peripheral);
            // An address identifies exactly one device
            if matches!(target, DeviceTarget::Address(_)) {
                break;
            }
        }

        Ok(found)
    }

    async fn open(&self, peripheral: &PeripheralInfo) -> Result<BluerConnection, TransportError> {
        let device = self.adapter.device(Address::from(peripheral.address))?;
        if !device.is_connected().await? {
            device.connect().await?;
        }

        let mut characteristics = Vec::new();
        for service in device.services().await? {
            let service_id = service.uuid().await?;
            if self.service.is_some_and(|wanted| wanted != service_id) {
                continue;
            }
            for characteristic in service.characteristics().await? {
                characteristics.push((characteristic.uuid().await?, characteristic));
            }
        }
        debug!(
            address = %peripheral.address,
            count = characteristics.len(),
            "resolved GATT characteristics"
        );

        Ok(BluerConnection {
            device,
            characteristics,
        })
    }
}

impl Transport for BluerTransport {
    fn discover<'a>(
        &'a self,
        target: &'a DeviceTarget,
        window: Duration,
    ) -> BoxFuture<'a, Result<Vec<PeripheralInfo>, TransportError>> {
        Box::pin(self.scan(target, window))
    }

    fn connect<'a>(
        &'a self,
        peripheral: &'a PeripheralInfo,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, TransportError>> {
        Box::pin(async move {
            let connection = self.open(peripheral).await?;
            Ok(Box::new(connection) as Box<dyn Connection>)
        })
    }
}

/// Connected BlueZ device with its resolved characteristics.
pub struct BluerConnection {
    device: Device,
    characteristics: Vec<(Uuid, Characteristic)>,
}

impl BluerConnection {
    async fn read_value(&self, id: Uuid) -> Result<Vec<u8>, ReadError> {
        let characteristic = self
            .characteristics
            .iter()
            .find(|(uuid, _)| *uuid == id)
            .map(|(_, c)| c)
            .ok_or_else(|| ReadError::Transient(format!("characteristic {id} not resolved")))?;

        match characteristic.read().await {
            Ok(value) => Ok(value),
            Err(err) => {
                // Tell a dropped link apart from a failed read
                match self.device.is_connected().await {
                    Ok(true) => Err(ReadError::Transient(err.to_string())),
                    Ok(false) => Err(ReadError::Disconnected(err.to_string())),
                    Err(status) => {
                        warn!(error = %status, "could not query connection state");
                        Err(ReadError::Disconnected(err.to_string()))
                    }
                }
            }
        }
    }
}

impl Connection for BluerConnection {
    fn characteristics(&self) -> BoxFuture<'_, Result<Vec<Uuid>, TransportError>> {
        let ids = self.characteristics.iter().map(|(id, _)| *id).collect();
        Box::pin(async move { Ok(ids) })
    }

    fn read(&self, id: Uuid) -> BoxFuture<'_, Result<Vec<u8>, ReadError>> {
        Box::pin(self.read_value(id))
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.device.disconnect().await?;
            Ok(())
        })
    }
}
