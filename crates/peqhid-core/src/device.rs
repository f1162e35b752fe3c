//! Device identity and capability metadata.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::Manufacturer;
use crate::transport::RawDevice;

/// Slot id on a device, valid within `[0, available_slots)`.
pub type SlotId = u8;

/// Slot query result when no handler is bound to the device.
pub const SLOT_NO_HANDLER: i32 = -2;
/// Slot query result when the handler could not answer.
pub const SLOT_UNAVAILABLE: i32 = -1;

/// Identity of a raw transport handle, stable for as long as the device
/// stays plugged in (the OS device path for HID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A writable PEQ slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub id: SlotId,
    /// Name shown by the device, e.g. "USER1"
    pub name: String,
}

impl SlotInfo {
    #[must_use]
    pub fn new(id: SlotId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Capability metadata reported by a protocol handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    /// Slots the device exposes for reading and writing
    pub slots: Vec<SlotInfo>,
    /// Maximum number of bands per slot
    pub max_filters: usize,
    /// Whether the device can report which slot is active
    pub reports_current_slot: bool,
}

impl DeviceDetails {
    /// Number of available slots.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.len()
    }

    /// Whether `slot` is one of the device's slots.
    #[must_use]
    pub fn has_slot(&self, slot: SlotId) -> bool {
        self.slots.iter().any(|s| s.id == slot)
    }

    /// Look up a slot by id.
    #[must_use]
    pub fn slot(&self, slot: SlotId) -> Option<&SlotInfo> {
        self.slots.iter().find(|s| s.id == slot)
    }
}

/// A physical device bound to a session.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    /// USB vendor id
    pub vendor_id: u16,
    /// Manufacturer resolved from the vendor id
    pub manufacturer: Manufacturer,
    /// Product name reported by the transport
    pub model: String,
    /// Raw transport handle
    #[serde(skip_serializing)]
    pub raw: Arc<dyn RawDevice>,
}

impl DeviceDescriptor {
    /// Identity of the raw handle.
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        self.raw.id()
    }
}
