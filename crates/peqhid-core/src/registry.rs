//! Capability registry: which protocol handler drives which device.
//!
//! Discovery maps a USB vendor id to a [`Manufacturer`] through [`VENDORS`],
//! then looks up the handler for the (manufacturer, product name) pair.
//! Supporting a new device means adding entries here, not new code paths.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::handler::ProtocolHandler;
use crate::transport::DeviceFilter;

/// Device manufacturers with known vendor ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Manufacturer {
    FiiO,
}

impl Manufacturer {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FiiO => "FiiO",
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// USB vendor id to manufacturer table.
pub const VENDORS: &[(u16, Manufacturer)] = &[(10610, Manufacturer::FiiO)];

/// Product names of FiiO devices sharing the FiiO PEQ protocol.
pub const FIIO_MODELS: &[&str] =
    &["JadeAudio JA11", "FIIO KA17", "FIIO Q7", "FIIO BTR13", "FIIO KA15"];

/// Maps (manufacturer, model) pairs to protocol handlers.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<(Manufacturer, String), Arc<dyn ProtocolHandler>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to one model, replacing any previous binding.
    pub fn register(
        &mut self,
        manufacturer: Manufacturer,
        model: impl Into<String>,
        handler: Arc<dyn ProtocolHandler>,
    ) -> &mut Self {
        let model = model.into();
        debug!(%manufacturer, model = %model, handler = handler.name(), "Registered handler");
        self.handlers.insert((manufacturer, model), handler);
        self
    }

    /// Bind `handler` to every model in [`FIIO_MODELS`].
    pub fn register_fiio(&mut self, handler: Arc<dyn ProtocolHandler>) -> &mut Self {
        for model in FIIO_MODELS {
            self.register(Manufacturer::FiiO, *model, Arc::clone(&handler));
        }
        self
    }

    /// Look up the handler for a device.
    ///
    /// `None` means the device is not supported.
    #[must_use]
    pub fn resolve(&self, manufacturer: Manufacturer, model: &str) -> Option<Arc<dyn ProtocolHandler>> {
        self.handlers.get(&(manufacturer, model.to_string())).cloned()
    }

    #[must_use]
    pub fn supports(&self, manufacturer: Manufacturer, model: &str) -> bool {
        self.handlers.contains_key(&(manufacturer, model.to_string()))
    }

    /// All registered (manufacturer, model) pairs, sorted.
    #[must_use]
    pub fn models(&self) -> Vec<(Manufacturer, &str)> {
        let mut models: Vec<_> = self.handlers.keys().map(|(m, model)| (*m, model.as_str())).collect();
        models.sort_unstable();
        models
    }

    /// Manufacturer for a USB vendor id.
    #[must_use]
    pub fn manufacturer_for(vendor_id: u16) -> Option<Manufacturer> {
        VENDORS.iter().find(|(id, _)| *id == vendor_id).map(|(_, m)| *m)
    }

    /// Transport filters covering every known vendor.
    #[must_use]
    pub fn device_filters() -> Vec<DeviceFilter> {
        VENDORS.iter().map(|(vendor_id, _)| DeviceFilter { vendor_id: *vendor_id }).collect()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry").field("models", &self.models()).finish()
    }
}
