//! BLE transport abstraction for reading GATT characteristics.
//!
//! The polling core only ever calls [`Connection::read`]. Discovery,
//! connection setup and teardown live behind the same traits so the whole
//! session can be driven by a fake in tests and by BlueZ in production.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::mac_address::{DeviceTarget, MacAddress};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Boxed future returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type for discovery, connection and disconnection.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Discovery finished without a matching device
    #[error("no device matching '{0}' found")]
    NotFound(String),
    /// The Bluetooth stack did not answer in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Error type for a single characteristic read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The read failed but the link is still usable
    #[error("read failed: {0}")]
    Transient(String),
    /// No response within the per-channel timeout
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    /// The peripheral dropped the connection
    #[error("peripheral disconnected: {0}")]
    Disconnected(String),
}

impl ReadError {
    /// Whether the error ends the session rather than just the current read.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReadError::Disconnected(_))
    }
}

/// A peripheral found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    pub address: MacAddress,
    pub name: Option<String>,
}

/// Entry point to the radio stack.
pub trait Transport: Send + Sync {
    /// Scan for up to `window` and return every peripheral matching `target`.
    fn discover<'a>(
        &'a self,
        target: &'a DeviceTarget,
        window: Duration,
    ) -> BoxFuture<'a, Result<Vec<PeripheralInfo>, TransportError>>;

    /// Open a GATT connection to a discovered peripheral.
    fn connect<'a>(
        &'a self,
        peripheral: &'a PeripheralInfo,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, TransportError>>;
}

/// An open GATT connection.
pub trait Connection: Send + Sync {
    /// Characteristic UUIDs exposed by the peripheral, restricted to the
    /// service the transport was configured for.
    fn characteristics(&self) -> BoxFuture<'_, Result<Vec<Uuid>, TransportError>>;

    /// Read the current value of a characteristic.
    fn read(&self, id: Uuid) -> BoxFuture<'_, Result<Vec<u8>, ReadError>>;

    /// Release the connection.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Create the compiled-in transport, restricted to `service` when given.
///
/// # Errors
/// Returns [`TransportError::Bluetooth`] if the adapter cannot be initialized,
/// or [`TransportError::BackendNotAvailable`] when built without a backend.
pub async fn default_transport(
    service: Option<Uuid>,
) -> Result<Box<dyn Transport>, TransportError> {
    #[cfg(feature = "bluer")]
    {
        let transport = bluer::BluerTransport::new(service).await?;
        Ok(Box::new(transport))
    }
    #[cfg(not(feature = "bluer"))]
    {
        let _ = service;
        Err(TransportError::BackendNotAvailable("bluer".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_fatality() {
        assert!(ReadError::Disconnected("gone".into()).is_fatal());
        assert!(!ReadError::Transient("busy".into()).is_fatal());
        assert!(!ReadError::Timeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransportError::NotFound("EP Agora".into()).to_string(),
            "no device matching 'EP Agora' found"
        );
        assert_eq!(
            ReadError::Timeout(Duration::from_secs(10)).to_string(),
            "read timed out after 10s"
        );
        assert_eq!(
            TransportError::Bluetooth("adapter off".into()).to_string(),
            "Bluetooth error: adapter off"
        );
    }
}
