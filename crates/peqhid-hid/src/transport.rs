//! hidapi-backed transport.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hidapi::HidApi;
use parking_lot::Mutex;
use peqhid_core::{DeviceFilter, RawDevice, Transport, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::{HidRawDevice, run_blocking};
use crate::error::{HidError, HidResult};

/// Device selection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidTransportConfig {
    /// Only select devices whose product name contains this (case-insensitive)
    #[serde(default)]
    pub product_filter: Option<String>,
    /// Only select interfaces on this HID usage page
    #[serde(default)]
    pub usage_page: Option<u16>,
}

impl HidTransportConfig {
    /// Whether an enumerated interface passes these settings and `filters`.
    #[must_use]
    pub fn selects(
        &self,
        filters: &[DeviceFilter],
        vendor_id: u16,
        product_name: &str,
        usage_page: u16,
    ) -> bool {
        if !filters.iter().any(|f| f.vendor_id == vendor_id) {
            return false;
        }
        if let Some(page) = self.usage_page
            && page != usage_page
        {
            return false;
        }
        if let Some(wanted) = &self.product_filter
            && !product_name.to_lowercase().contains(&wanted.to_lowercase())
        {
            return false;
        }
        true
    }
}

/// Transport over the host's hidapi backend.
pub struct HidTransport {
    api: Option<Arc<Mutex<HidApi>>>,
    config: HidTransportConfig,
}

impl HidTransport {
    /// Initialize hidapi.
    ///
    /// A host without a usable backend yields a transport that reports
    /// itself unavailable rather than an error.
    #[must_use]
    pub fn new(config: HidTransportConfig) -> Self {
        let api = match HidApi::new() {
            Ok(api) => Some(Arc::new(Mutex::new(api))),
            Err(e) => {
                warn!(error = %e, "Failed to initialize hidapi");
                None
            }
        };
        Self { api, config }
    }

}

#[async_trait]
impl Transport for HidTransport {
    fn is_available(&self) -> bool {
        self.api.is_some()
    }

    async fn request_devices(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Vec<Arc<dyn RawDevice>>, TransportError> {
        let api = Arc::clone(
            self.api
                .as_ref()
                .ok_or_else(|| HidError::Unavailable("hidapi failed to initialize".into()))?,
        );
        let config = self.config.clone();
        let filters = filters.to_vec();

        let selected = run_blocking(move || enumerate(&api, &config, &filters)).await?;

        info!(count = selected.len(), "HID devices selected");
        Ok(selected.into_iter().map(|d| Arc::new(d) as Arc<dyn RawDevice>).collect())
    }
}

/// Refresh the device list and build a handle for every selected path.
fn enumerate(
    api: &Arc<Mutex<HidApi>>,
    config: &HidTransportConfig,
    filters: &[DeviceFilter],
) -> HidResult<Vec<HidRawDevice>> {
    let mut guard = api.lock();
    guard.refresh_devices()?;

    // Keyed by path: one physical device may expose several interfaces
    let mut selected = BTreeMap::new();
    for info in guard.device_list() {
        let product_name = info.product_string().unwrap_or_default();
        if !config.selects(filters, info.vendor_id(), product_name, info.usage_page()) {
            continue;
        }

        debug!(
            vendor_id = format_args!("{:04x}", info.vendor_id()),
            product_id = format_args!("{:04x}", info.product_id()),
            product = %product_name,
            interface = info.interface_number(),
            "Found HID device"
        );
        let path = info.path().to_owned();
        selected.entry(path.clone()).or_insert_with(|| {
            HidRawDevice::new(
                path,
                info.vendor_id(),
                info.product_id(),
                product_name.to_string(),
                Arc::clone(api),
            )
        });
    }
    drop(guard);

    Ok(selected.into_values().collect())
}
