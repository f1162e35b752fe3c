//! peqhid probe - inspect connected PEQ devices.
//!
//! Lists the HID devices from known PEQ vendors, connects to the first
//! supported one and prints what the session manager learned about it as
//! JSON on stdout.
//!
//! The registry built here is empty: vendor wire-format handlers come from
//! integrators linking `peqhid-core`. As shipped, every candidate reports
//! `supported: false` and the `session` part of the report stays `null`.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use peqhid_core::{
    CapabilityRegistry, Manufacturer, RawDevice, SessionEntry, SessionManager, Transport,
};
use peqhid_hid::HidTransport;

#[derive(Debug, Serialize)]
struct Candidate {
    id: String,
    vendor_id: u16,
    product_id: u16,
    product_name: String,
    manufacturer: Option<Manufacturer>,
    supported: bool,
}

#[derive(Debug, Serialize)]
struct Session<'a> {
    device: &'a SessionEntry,
    current_slot: i32,
    current_slot_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ProbeReport<'a> {
    supported: bool,
    candidates: Vec<Candidate>,
    session: Option<Session<'a>>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level)
            .with_context(|| format!("Invalid log level: {}", config.logging.level))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting peqhid probe");
    debug!(?config, "Configuration loaded");

    let transport = Arc::new(HidTransport::new(config.transport.clone()));
    // Vendor wire-format handlers are supplied by integrators
    let registry = CapabilityRegistry::new();
    let manager = SessionManager::new(Arc::clone(&transport) as Arc<dyn Transport>, registry, config.session);

    if !manager.is_supported() {
        error!("HID is not supported in this environment");
        anyhow::bail!("HID transport unavailable");
    }

    let candidates = list_candidates(transport.as_ref(), manager.registry()).await;

    let mut error = None;
    let entry = match manager.discover_and_connect().await {
        Ok(Some(entry)) => Some(entry),
        Ok(None) => {
            info!("No PEQ device found");
            None
        }
        Err(e) => {
            warn!(error = %e, "Could not connect to a PEQ device");
            error = Some(e.to_string());
            None
        }
    };

    let session = match &entry {
        Some(entry) => {
            let current_slot = manager.current_slot_or_sentinel(entry).await;
            let current_slot_name = u8::try_from(current_slot)
                .ok()
                .and_then(|slot| entry.details().slot(slot))
                .map(|info| info.name.as_str());
            Some(Session { device: entry.as_ref(), current_slot, current_slot_name })
        }
        None => None,
    };
    let report = ProbeReport { supported: true, candidates, session, error };

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize probe report")?;
    println!("{json}");

    if entry.is_some()
        && let Err(e) = manager.disconnect().await
    {
        warn!(error = %e, "Failed to disconnect cleanly");
    }

    Ok(())
}

/// Every device from a known vendor, whether or not a handler exists.
async fn list_candidates(transport: &HidTransport, registry: &CapabilityRegistry) -> Vec<Candidate> {
    let devices = match transport.request_devices(&CapabilityRegistry::device_filters()).await {
        Ok(devices) => devices,
        Err(e) => {
            warn!(error = %e, "Failed to list HID devices");
            return Vec::new();
        }
    };

    devices
        .iter()
        .map(|device| {
            let manufacturer = CapabilityRegistry::manufacturer_for(device.vendor_id());
            let supported =
                manufacturer.is_some_and(|m| registry.supports(m, device.product_name()));
            Candidate {
                id: device.id().to_string(),
                vendor_id: device.vendor_id(),
                product_id: device.product_id(),
                product_name: device.product_name().to_string(),
                manufacturer,
                supported,
            }
        })
        .collect()
}
