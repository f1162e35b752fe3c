//! Host transport contract.
//!
//! The session manager and protocol handlers only talk to hardware through
//! these traits. `peqhid-hid` provides an implementation on top of hidapi;
//! tests provide in-memory ones.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::error::TransportError;

/// Device selection filter passed to [`Transport::request_devices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFilter {
    /// USB vendor id to match
    pub vendor_id: u16,
}

/// Entry point of a host HID transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the host exposes HID access at all.
    fn is_available(&self) -> bool;

    /// Select devices matching any of `filters`.
    ///
    /// An empty list means nothing was selected and is not an error.
    async fn request_devices(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Vec<Arc<dyn RawDevice>>, TransportError>;
}

/// A single HID device as seen by the transport.
///
/// Calls against one device must be issued sequentially; implementations
/// are not required to queue overlapping requests.
#[async_trait]
pub trait RawDevice: Send + Sync + fmt::Debug {
    /// Identity of this handle.
    fn id(&self) -> &DeviceId;

    fn vendor_id(&self) -> u16;

    fn product_id(&self) -> u16;

    /// Product name string reported by the device.
    fn product_name(&self) -> &str;

    /// Whether the device is currently open.
    fn is_opened(&self) -> bool;

    /// Open the device for report I/O.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the device.
    async fn close(&self) -> Result<(), TransportError>;

    /// Send an output report.
    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next input report.
    ///
    /// Returns `None` if nothing arrived within `timeout`.
    async fn receive_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Send a feature report.
    async fn send_feature_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Read a feature report.
    async fn receive_feature_report(&self, report_id: u8) -> Result<Vec<u8>, TransportError>;
}
