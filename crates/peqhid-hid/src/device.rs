//! A single hidapi device.

use std::ffi::CString;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use peqhid_core::{DeviceId, RawDevice, TransportError};
use tracing::{debug, info};

use crate::error::{HidError, HidResult};

/// Largest report the PEQ devices use, excluding the report id byte.
pub const REPORT_SIZE: usize = 64;

/// A HID interface found by [`crate::HidTransport`].
///
/// Blocking hidapi calls run on the tokio blocking pool.
pub struct HidRawDevice {
    id: DeviceId,
    vendor_id: u16,
    product_id: u16,
    product_name: String,
    path: CString,
    api: Arc<Mutex<HidApi>>,
    handle: Arc<Mutex<Option<HidDevice>>>,
    /// Mirrors `handle.is_some()` without waiting on in-flight I/O
    opened: Arc<AtomicBool>,
}

impl HidRawDevice {
    pub(crate) fn new(
        path: CString,
        vendor_id: u16,
        product_id: u16,
        product_name: String,
        api: Arc<Mutex<HidApi>>,
    ) -> Self {
        Self {
            id: DeviceId::new(path.to_string_lossy()),
            vendor_id,
            product_id,
            product_name,
            path,
            api,
            handle: Arc::new(Mutex::new(None)),
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `op` against the open device on the blocking pool.
    async fn with_handle<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&HidDevice) -> HidResult<T> + Send + 'static,
    {
        let handle = Arc::clone(&self.handle);
        run_blocking(move || {
            let guard = handle.lock();
            let device = guard.as_ref().ok_or(HidError::NotOpen)?;
            op(device)
        })
        .await
    }
}

/// Run a blocking hidapi call on the tokio blocking pool.
pub(crate) async fn run_blocking<T, F>(op: F) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> HidResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| HidError::Task(e.to_string()))?
        .map_err(TransportError::from)
}

fn framed(report_id: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 1);
    buf.push(report_id);
    buf.extend_from_slice(data);
    buf
}

#[async_trait]
impl RawDevice for HidRawDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    async fn open(&self) -> Result<(), TransportError> {
        if self.is_opened() {
            return Ok(());
        }

        let api = Arc::clone(&self.api);
        let handle = Arc::clone(&self.handle);
        let opened = Arc::clone(&self.opened);
        let path = self.path.clone();
        run_blocking(move || {
            let device = api.lock().open_path(&path)?;
            *handle.lock() = Some(device);
            opened.store(true, Ordering::Release);
            Ok(())
        })
        .await?;

        info!(device = %self.id, product = %self.product_name, "HID device opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let handle = Arc::clone(&self.handle);
        let opened = Arc::clone(&self.opened);
        // Dropping the handle closes it; waits out any read in flight
        let was_open = run_blocking(move || {
            let closed = handle.lock().take().is_some();
            opened.store(false, Ordering::Release);
            Ok(closed)
        })
        .await?;

        if was_open {
            info!(device = %self.id, "HID device closed");
        }
        Ok(())
    }

    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let buf = framed(report_id, data);
        debug!(device = %self.id, report_id, len = data.len(), "Sending output report");
        self.with_handle(move |device| {
            let written = device.write(&buf)?;
            if written < buf.len() {
                return Err(HidError::ShortWrite { written, expected: buf.len() });
            }
            Ok(())
        })
        .await
    }

    async fn receive_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.with_handle(move |device| {
            let mut buf = vec![0u8; REPORT_SIZE + 1];
            let len = device.read_timeout(&mut buf, timeout_ms)?;
            if len == 0 {
                return Ok(None);
            }
            buf.truncate(len);
            Ok(Some(buf))
        })
        .await
    }

    async fn send_feature_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        let buf = framed(report_id, data);
        debug!(device = %self.id, report_id, len = data.len(), "Sending feature report");
        self.with_handle(move |device| Ok(device.send_feature_report(&buf)?)).await
    }

    async fn receive_feature_report(&self, report_id: u8) -> Result<Vec<u8>, TransportError> {
        self.with_handle(move |device| {
            let mut buf = vec![0u8; REPORT_SIZE + 1];
            buf[0] = report_id;
            let len = device.get_feature_report(&mut buf)?;
            buf.truncate(len);
            Ok(buf)
        })
        .await
    }
}

impl fmt::Debug for HidRawDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidRawDevice")
            .field("id", &self.id)
            .field("vendor_id", &format_args!("{:04x}", self.vendor_id))
            .field("product_id", &format_args!("{:04x}", self.product_id))
            .field("product_name", &self.product_name)
            .field("opened", &self.is_opened())
            .finish_non_exhaustive()
    }
}
