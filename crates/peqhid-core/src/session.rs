//! Device sessions: discovery, handler binding and operation dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::device::{DeviceDescriptor, DeviceDetails, DeviceId, SlotId};
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterSet};
use crate::handler::{ProtocolHandler, PullResult};
use crate::registry::{CapabilityRegistry, Manufacturer};
use crate::transport::{RawDevice, Transport};

/// Lifecycle of a physical device within a session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never seen, or a failed connect was rolled back
    #[default]
    Unknown,
    /// Transport open and handshake in progress
    Connecting,
    /// Bound to a handler and usable
    Connected,
    /// Closed or lost; a later discovery starts over
    Disconnected,
}

/// Session manager behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Read a slot back after every push and fail if it differs
    #[serde(default)]
    pub verify_writes: bool,
}

/// A connected device bound to its protocol handler.
#[derive(Serialize)]
pub struct SessionEntry {
    #[serde(flatten)]
    descriptor: DeviceDescriptor,
    #[serde(skip_serializing)]
    handler: Option<Arc<dyn ProtocolHandler>>,
    details: DeviceDetails,
}

impl SessionEntry {
    /// Create an entry.
    ///
    /// Discovery always binds a handler; `None` is accepted so callers can
    /// represent devices they track without one.
    #[must_use]
    pub fn new(
        descriptor: DeviceDescriptor,
        handler: Option<Arc<dyn ProtocolHandler>>,
        details: DeviceDetails,
    ) -> Self {
        Self { descriptor, handler, details }
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        self.descriptor.id()
    }

    #[must_use]
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn manufacturer(&self) -> Manufacturer {
        self.descriptor.manufacturer
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.descriptor.model
    }

    #[must_use]
    pub fn raw(&self) -> &Arc<dyn RawDevice> {
        &self.descriptor.raw
    }

    #[must_use]
    pub fn handler(&self) -> Option<&Arc<dyn ProtocolHandler>> {
        self.handler.as_ref()
    }

    /// Capability metadata captured at connect time.
    #[must_use]
    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }
}

impl fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEntry")
            .field("descriptor", &self.descriptor)
            .field("handler", &self.handler.as_ref().map(|h| h.name()))
            .field("details", &self.details)
            .finish()
    }
}

#[derive(Default)]
struct Sessions {
    entries: Vec<Arc<SessionEntry>>,
    current: Option<DeviceId>,
    states: HashMap<DeviceId, ConnectionState>,
}

/// Owns the known devices and the current device, and routes every PEQ
/// operation to the handler bound to the target device.
///
/// Operations on different devices may run concurrently. Operations on the
/// same device must be awaited one at a time by the caller, and only one
/// discovery should be in flight at once.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    registry: CapabilityRegistry,
    options: SessionOptions,
    sessions: RwLock<Sessions>,
}

impl SessionManager {
    /// Create a session manager over `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: CapabilityRegistry,
        options: SessionOptions,
    ) -> Self {
        Self { transport, registry, options, sessions: RwLock::new(Sessions::default()) }
    }

    /// Whether the host provides a HID transport at all.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.transport.is_available()
    }

    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Select a device and bind it to its handler.
    ///
    /// Returns `Ok(None)` when no device was selected. A device that is
    /// already connected becomes current again without a new handshake.
    ///
    /// # Errors
    /// Returns [`Error::UnknownVendor`] or [`Error::UnsupportedDevice`] if no
    /// handler is registered for the selected device, and transport or
    /// handshake errors otherwise. No entry is recorded on failure.
    pub async fn discover_and_connect(&self) -> Result<Option<Arc<SessionEntry>>> {
        if !self.is_supported() {
            error!("HID is not supported in this environment");
            return Err(Error::EnvironmentUnsupported);
        }

        let filters = CapabilityRegistry::device_filters();
        let selected = self.transport.request_devices(&filters).await.map_err(|e| {
            error!(error = %e, "Failed to request HID devices");
            Error::from(e)
        })?;

        let Some(raw) = selected.into_iter().next() else {
            info!("No device selected");
            return Ok(None);
        };

        if let Some(existing) = self.find(raw.id()) {
            info!(model = %existing.model(), "Device already connected");
            self.sessions.write().current = Some(existing.id().clone());
            return Ok(Some(existing));
        }

        match self.connect_raw(raw).await {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                error!(error = %e, "Failed to connect to HID device");
                Err(e)
            }
        }
    }

    async fn connect_raw(&self, raw: Arc<dyn RawDevice>) -> Result<Arc<SessionEntry>> {
        let id = raw.id().clone();
        let vendor_id = raw.vendor_id();
        let model = raw.product_name().to_string();

        let manufacturer =
            CapabilityRegistry::manufacturer_for(vendor_id).ok_or(Error::UnknownVendor(vendor_id))?;
        let Some(handler) = self.registry.resolve(manufacturer, &model) else {
            return Err(Error::UnsupportedDevice { manufacturer: manufacturer.to_string(), model });
        };

        {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.entries.iter().find(|e| e.id() == &id).cloned() {
                sessions.current = Some(id);
                return Ok(existing);
            }
            debug!(device = %id, state = ?ConnectionState::Connecting, "Connection state changed");
            sessions.states.insert(id.clone(), ConnectionState::Connecting);
        }

        let opened_here = !raw.is_opened();
        if opened_here && let Err(e) = raw.open().await {
            self.rollback_state(&id);
            return Err(e.into());
        }

        let details = match handler.connect(raw.as_ref()).await {
            Ok(details) => details,
            Err(e) => {
                if opened_here && let Err(close_err) = raw.close().await {
                    warn!(device = %id, error = %close_err, "Failed to close device after handshake failure");
                }
                self.rollback_state(&id);
                return Err(e);
            }
        };

        let descriptor = DeviceDescriptor { vendor_id, manufacturer, model, raw };
        let entry = Arc::new(SessionEntry::new(descriptor, Some(handler), details));

        let mut sessions = self.sessions.write();
        // A concurrent discovery may have bound the same device meanwhile
        if let Some(existing) = sessions.entries.iter().find(|e| e.id() == &id).cloned() {
            sessions.states.insert(id.clone(), ConnectionState::Connected);
            sessions.current = Some(id);
            return Ok(existing);
        }
        sessions.entries.push(Arc::clone(&entry));
        sessions.states.insert(id.clone(), ConnectionState::Connected);
        sessions.current = Some(id);

        info!(
            manufacturer = %entry.manufacturer(),
            model = %entry.model(),
            slots = entry.details().available_slots(),
            "Device connected"
        );
        Ok(entry)
    }

    /// Close the current device and forget it.
    ///
    /// Does nothing if there is no current device. The entry is dropped even
    /// if closing the transport fails.
    ///
    /// # Errors
    /// Returns the transport error if the close failed.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(entry) = self.current_device() else {
            debug!("No current device to disconnect");
            return Ok(());
        };

        let result = entry.raw().close().await;
        self.remove(&entry);

        match result {
            Ok(()) => {
                info!(model = %entry.model(), "Device disconnected");
                Ok(())
            }
            Err(e) => {
                error!(model = %entry.model(), error = %e, "Failed to disconnect device");
                Err(e.into())
            }
        }
    }

    /// Write a preamp and filter list to `slot`.
    ///
    /// With [`SessionOptions::verify_writes`] the slot is read back and
    /// compared afterwards.
    ///
    /// # Errors
    /// Returns [`Error::NoHandler`], [`Error::InvalidSlot`] or
    /// [`Error::TooManyFilters`] before any I/O, and transport, partial write
    /// or verification errors from the write itself.
    pub async fn push_to_device(
        &self,
        device: &SessionEntry,
        slot: SlotId,
        preamp: f64,
        filters: &[Filter],
    ) -> Result<()> {
        let handler = Self::bound_handler(device, "push")?;
        Self::check_slot(device, slot)?;

        let max = device.details().max_filters;
        if max > 0 && filters.len() > max {
            return Err(Error::TooManyFilters { count: filters.len(), max });
        }

        let filter_set = FilterSet::new(preamp, filters.to_vec());
        let raw = device.raw().as_ref();
        let result = async {
            handler.push(raw, slot, &filter_set).await?;
            if self.options.verify_writes {
                let read_back = handler.pull(raw, slot).await?;
                if read_back.filter_set != filter_set {
                    return Err(Error::VerifyMismatch { slot });
                }
            }
            Ok::<(), Error>(())
        }
        .await;

        if result.is_ok() {
            debug!(model = %device.model(), slot, filters = filter_set.len(), "Pushed filters");
        }
        self.finish(device, "push", result).await
    }

    /// Read the filter set stored in `slot`.
    ///
    /// # Errors
    /// Returns [`Error::NoHandler`] or [`Error::InvalidSlot`] before any I/O,
    /// and transport or protocol errors from the read.
    pub async fn pull_from_device(&self, device: &SessionEntry, slot: SlotId) -> Result<PullResult> {
        let handler = Self::bound_handler(device, "pull")?;
        Self::check_slot(device, slot)?;

        let result = handler.pull(device.raw().as_ref(), slot).await;
        self.finish(device, "pull", result).await
    }

    /// Query the slot the device is currently using.
    ///
    /// # Errors
    /// Returns [`Error::NoHandler`] if the device has no handler, and the
    /// handler's error otherwise. See [`Error::slot_sentinel`].
    pub async fn get_current_slot(&self, device: &SessionEntry) -> Result<SlotId> {
        let handler = Self::bound_handler(device, "query")?;

        let result = handler.current_slot(device.raw().as_ref()).await;
        self.finish(device, "query", result).await
    }

    /// [`Self::get_current_slot`] with failures folded into negative
    /// sentinels.
    pub async fn current_slot_or_sentinel(&self, device: &SessionEntry) -> i32 {
        match self.get_current_slot(device).await {
            Ok(slot) => i32::from(slot),
            Err(e) => e.slot_sentinel(),
        }
    }

    /// Turn the PEQ engine on or off, optionally for one slot only.
    ///
    /// # Errors
    /// Returns [`Error::NoHandler`] or [`Error::InvalidSlot`] before any I/O,
    /// and transport errors from the write.
    pub async fn enable_peq(
        &self,
        device: &SessionEntry,
        enabled: bool,
        slot: Option<SlotId>,
    ) -> Result<()> {
        let handler = Self::bound_handler(device, "enabling")?;
        if let Some(slot) = slot {
            Self::check_slot(device, slot)?;
        }

        let result = handler.enable_peq(device.raw().as_ref(), enabled, slot).await;
        self.finish(device, "enabling", result).await
    }

    /// Number of slots the device exposes. Reads cached metadata only.
    #[must_use]
    pub fn get_available_slots(&self, device: &SessionEntry) -> usize {
        device.details().available_slots()
    }

    /// The device operations go to by default.
    #[must_use]
    pub fn current_device(&self) -> Option<Arc<SessionEntry>> {
        let sessions = self.sessions.read();
        let current = sessions.current.as_ref()?;
        sessions.entries.iter().find(|e| e.id() == current).cloned()
    }

    /// All connected devices, in connection order.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.read().entries.clone()
    }

    /// Connection state of a device.
    #[must_use]
    pub fn state(&self, id: &DeviceId) -> ConnectionState {
        self.sessions.read().states.get(id).copied().unwrap_or_default()
    }

    fn find(&self, id: &DeviceId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().entries.iter().find(|e| e.id() == id).cloned()
    }

    /// Forget a failed connect, unless another discovery bound the device.
    fn rollback_state(&self, id: &DeviceId) {
        let mut sessions = self.sessions.write();
        if sessions.states.get(id) == Some(&ConnectionState::Connecting) {
            sessions.states.remove(id);
        }
    }

    /// Drop `entry` if it is the one stored for its device.
    ///
    /// A stale entry for a device that has since been rebound leaves the
    /// live session alone.
    fn remove(&self, entry: &SessionEntry) -> bool {
        let mut sessions = self.sessions.write();
        let before = sessions.entries.len();
        sessions.entries.retain(|e| !std::ptr::eq(Arc::as_ptr(e), entry));
        if sessions.entries.len() == before {
            return false;
        }

        let id = entry.id();
        if sessions.current.as_ref() == Some(id) {
            sessions.current = None;
        }
        sessions.states.insert(id.clone(), ConnectionState::Disconnected);
        true
    }

    fn bound_handler<'a>(
        device: &'a SessionEntry,
        operation: &'static str,
    ) -> Result<&'a Arc<dyn ProtocolHandler>> {
        device.handler().ok_or_else(|| {
            error!(model = %device.model(), operation, "No device handler available");
            Error::NoHandler { operation }
        })
    }

    fn check_slot(device: &SessionEntry, slot: SlotId) -> Result<()> {
        let details = device.details();
        if details.has_slot(slot) {
            Ok(())
        } else {
            warn!(model = %device.model(), slot, "Slot not exposed by device");
            Err(Error::InvalidSlot { slot, available: details.available_slots() })
        }
    }

    /// Log a failed operation and tear the session down if the device is
    /// gone.
    async fn finish<T>(
        &self,
        device: &SessionEntry,
        operation: &'static str,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(e) = &result {
            error!(model = %device.model(), operation, error = %e, "Device operation failed");
            if e.is_disconnect() {
                if let Err(close_err) = device.raw().close().await {
                    warn!(device = %device.id(), error = %close_err, "Failed to release lost device");
                }
                if self.remove(device) {
                    warn!(model = %device.model(), "Device lost, dropping session");
                }
            }
        }
        result
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions = self.sessions.read();
        f.debug_struct("SessionManager")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("devices", &sessions.entries.len())
            .field("current", &sessions.current)
            .finish_non_exhaustive()
    }
}
