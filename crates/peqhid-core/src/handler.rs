//! Protocol handler contract.
//!
//! One implementation exists per device family. Handlers are stateless and
//! shared between every device of that family; all per-device state lives
//! on the device itself and is reached through the [`RawDevice`] passed in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::{DeviceDetails, SlotId};
use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::transport::RawDevice;

/// Contents of a slot read back from a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResult {
    pub filter_set: FilterSet,
    /// Capability metadata as reported during the read
    pub details: DeviceDetails,
}

/// Device-family specific PEQ protocol.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Family name used in logs.
    fn name(&self) -> &str;

    /// Run the device handshake after the transport is open.
    ///
    /// # Errors
    /// Returns an error if the device rejects the handshake or the
    /// transport fails.
    async fn connect(&self, device: &dyn RawDevice) -> Result<DeviceDetails>;

    /// Query the slot the device is currently using.
    ///
    /// # Errors
    /// Returns [`Error::SlotUnavailable`] if the device cannot report it.
    async fn current_slot(&self, device: &dyn RawDevice) -> Result<SlotId>;

    /// Read the filter set stored in `slot`. Must not change device state.
    ///
    /// # Errors
    /// Returns an error if the transport fails or the reply is malformed.
    async fn pull(&self, device: &dyn RawDevice, slot: SlotId) -> Result<PullResult>;

    /// Write `filter_set` to `slot`.
    ///
    /// Any report that fails must fail the whole push; see [`write_reports`].
    ///
    /// # Errors
    /// Returns an error if any part of the write fails.
    async fn push(&self, device: &dyn RawDevice, slot: SlotId, filter_set: &FilterSet)
    -> Result<()>;

    /// Turn the PEQ engine on or off, optionally for one slot only.
    ///
    /// # Errors
    /// Returns an error if the transport fails.
    async fn enable_peq(
        &self,
        device: &dyn RawDevice,
        enabled: bool,
        slot: Option<SlotId>,
    ) -> Result<()>;
}

/// A single output report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub id: u8,
    pub data: Vec<u8>,
}

impl Report {
    #[must_use]
    pub fn new(id: u8, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

/// Send `reports` in order, stopping at the first failure.
///
/// The device may still hold the reports sent before the failure; there is
/// no rollback.
///
/// # Errors
/// Returns [`Error::PartialWrite`] with the number of reports that went out.
pub async fn write_reports(device: &dyn RawDevice, reports: &[Report]) -> Result<()> {
    let total = reports.len();
    for (written, report) in reports.iter().enumerate() {
        if let Err(source) = device.send_report(report.id, &report.data).await {
            warn!(device = %device.id(), written, total, error = %source, "Multi-report write aborted");
            return Err(Error::PartialWrite { written, total, source });
        }
    }
    debug!(device = %device.id(), total, "Reports written");
    Ok(())
}
