//! In-memory transport and handler shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use peqhid_core::{
    CapabilityRegistry, DeviceDetails, DeviceFilter, DeviceId, Error, FilterSet, ProtocolHandler,
    PullResult, RawDevice, Report, Result, SessionManager, SessionOptions, SlotId, SlotInfo,
    Transport, TransportError, write_reports,
};

pub const FIIO_VENDOR: u16 = 10610;

const REPORT_PREAMP: u8 = 0x01;
const REPORT_FILTER: u8 = 0x02;
const REPORT_READ: u8 = 0x03;
const REPORT_ENABLE: u8 = 0x04;
const REPORT_CURRENT_SLOT: u8 = 0x05;
const REPORT_HELLO: u8 = 0x10;

/// Every transport call, in order.
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<&'static str>>);

impl CallLog {
    fn record(&self, call: &'static str) {
        self.0.lock().push(call);
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().iter().filter(|c| **c == call).count()
    }
}

#[derive(Debug)]
pub struct FakeDevice {
    id: DeviceId,
    vendor_id: u16,
    product_name: String,
    opened: AtomicBool,
    unplugged: AtomicBool,
    fail_close: AtomicBool,
    current_slot: AtomicU8,
    /// Number of reports that may still succeed; `None` means unlimited
    reports_left: Mutex<Option<usize>>,
    log: Arc<CallLog>,
}

impl FakeDevice {
    pub fn set_opened(&self, opened: bool) {
        self.opened.store(opened, Ordering::SeqCst);
    }

    pub fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
    }

    /// Make `close` fail and leave the device open.
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn set_current_slot(&self, slot: SlotId) {
        self.current_slot.store(slot, Ordering::SeqCst);
    }

    pub fn fail_reports_after(&self, count: Option<usize>) {
        *self.reports_left.lock() = count;
    }

    fn check_io(&self) -> std::result::Result<(), TransportError> {
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        if !self.opened.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        Ok(())
    }
}

#[async_trait]
impl RawDevice for FakeDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        0x0001
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    async fn open(&self) -> std::result::Result<(), TransportError> {
        self.log.record("open");
        if self.unplugged.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.set_opened(true);
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), TransportError> {
        self.log.record("close");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Io("injected close failure".into()));
        }
        self.set_opened(false);
        Ok(())
    }

    async fn send_report(&self, _report_id: u8, _data: &[u8]) -> std::result::Result<(), TransportError> {
        self.log.record("send_report");
        self.check_io()?;
        let mut left = self.reports_left.lock();
        match left.as_mut() {
            Some(0) => Err(TransportError::Io("injected write failure".into())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn receive_report(
        &self,
        _timeout: Duration,
    ) -> std::result::Result<Option<Vec<u8>>, TransportError> {
        self.log.record("receive_report");
        self.check_io()?;
        Ok(None)
    }

    async fn send_feature_report(
        &self,
        _report_id: u8,
        _data: &[u8],
    ) -> std::result::Result<(), TransportError> {
        self.log.record("send_feature_report");
        self.check_io()
    }

    async fn receive_feature_report(&self, _report_id: u8) -> std::result::Result<Vec<u8>, TransportError> {
        self.log.record("receive_feature_report");
        self.check_io()?;
        Ok(vec![self.current_slot.load(Ordering::SeqCst)])
    }
}

pub struct FakeTransport {
    available: bool,
    honor_filters: bool,
    fail_request: AtomicBool,
    devices: Mutex<Vec<Arc<FakeDevice>>>,
    log: Arc<CallLog>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with(true, true))
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::with(false, true))
    }

    /// A transport that ignores vendor filters when selecting.
    pub fn unfiltered() -> Arc<Self> {
        Arc::new(Self::with(true, false))
    }

    fn with(available: bool, honor_filters: bool) -> Self {
        Self {
            available,
            honor_filters,
            fail_request: AtomicBool::new(false),
            devices: Mutex::new(Vec::new()),
            log: Arc::new(CallLog::default()),
        }
    }

    /// Attach a device; it becomes selectable behind any already attached.
    pub fn plug(&self, id: &str, vendor_id: u16, product_name: &str) -> Arc<FakeDevice> {
        let device = Arc::new(FakeDevice {
            id: DeviceId::new(id),
            vendor_id,
            product_name: product_name.to_string(),
            opened: AtomicBool::new(false),
            unplugged: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            current_slot: AtomicU8::new(0),
            reports_left: Mutex::new(None),
            log: Arc::clone(&self.log),
        });
        self.devices.lock().push(Arc::clone(&device));
        device
    }

    /// Make `device` the only selectable device.
    pub fn select_only(&self, device: &Arc<FakeDevice>) {
        *self.devices.lock() = vec![Arc::clone(device)];
    }

    pub fn fail_requests(&self) {
        self.fail_request.store(true, Ordering::SeqCst);
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn request_devices(
        &self,
        filters: &[DeviceFilter],
    ) -> std::result::Result<Vec<Arc<dyn RawDevice>>, TransportError> {
        self.log.record("request_devices");
        if self.fail_request.load(Ordering::SeqCst) {
            return Err(TransportError::PermissionDenied("hidraw".into()));
        }
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|d| !self.honor_filters || filters.iter().any(|f| f.vendor_id == d.vendor_id))
            .map(|d| Arc::clone(d) as Arc<dyn RawDevice>)
            .collect())
    }
}

/// Three slots, ten bands, current slot reporting.
pub fn stub_details() -> DeviceDetails {
    DeviceDetails {
        slots: vec![SlotInfo::new(0, "USER1"), SlotInfo::new(1, "USER2"), SlotInfo::new(2, "USER3")],
        max_filters: 10,
        reports_current_slot: true,
    }
}

/// Lossless handler keeping slot contents in memory.
///
/// Each push sends one report for the preamp and one per band, and only
/// stores the set if every report went out.
pub struct StubHandler {
    details: DeviceDetails,
    reject_handshake: AtomicBool,
    corrupt_writes: AtomicBool,
    connects: AtomicUsize,
    slots: Mutex<HashMap<(DeviceId, SlotId), FilterSet>>,
    peq: Mutex<HashMap<DeviceId, (bool, Option<SlotId>)>>,
}

impl StubHandler {
    pub fn new() -> Arc<Self> {
        Self::with_details(stub_details())
    }

    pub fn with_details(details: DeviceDetails) -> Arc<Self> {
        Arc::new(Self {
            details,
            reject_handshake: AtomicBool::new(false),
            corrupt_writes: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            slots: Mutex::new(HashMap::new()),
            peq: Mutex::new(HashMap::new()),
        })
    }

    pub fn reject_handshakes(&self) {
        self.reject_handshake.store(true, Ordering::SeqCst);
    }

    /// Store a slightly different preamp than the one pushed.
    pub fn corrupt_writes(&self) {
        self.corrupt_writes.store(true, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn peq_state(&self, id: &DeviceId) -> Option<(bool, Option<SlotId>)> {
        self.peq.lock().get(id).copied()
    }
}

#[async_trait]
impl ProtocolHandler for StubHandler {
    fn name(&self) -> &str {
        "stub"
    }

    async fn connect(&self, device: &dyn RawDevice) -> Result<DeviceDetails> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        // Lets a concurrent discovery interleave with the handshake
        tokio::task::yield_now().await;
        device.send_feature_report(REPORT_HELLO, b"hello").await?;
        if self.reject_handshake.load(Ordering::SeqCst) {
            return Err(Error::Handshake("device refused hello".into()));
        }
        Ok(self.details.clone())
    }

    async fn current_slot(&self, device: &dyn RawDevice) -> Result<SlotId> {
        if !self.details.reports_current_slot {
            return Err(Error::SlotUnavailable);
        }
        let reply = device.receive_feature_report(REPORT_CURRENT_SLOT).await?;
        reply.first().copied().ok_or(Error::SlotUnavailable)
    }

    async fn pull(&self, device: &dyn RawDevice, slot: SlotId) -> Result<PullResult> {
        device.send_report(REPORT_READ, &[slot]).await?;
        let filter_set =
            self.slots.lock().get(&(device.id().clone(), slot)).cloned().unwrap_or_default();
        Ok(PullResult { filter_set, details: self.details.clone() })
    }

    async fn push(&self, device: &dyn RawDevice, slot: SlotId, filter_set: &FilterSet) -> Result<()> {
        let mut reports = vec![Report::new(REPORT_PREAMP, filter_set.preamp.to_le_bytes().to_vec())];
        for filter in &filter_set.filters {
            let mut data = vec![slot];
            data.extend_from_slice(&filter.freq.to_le_bytes());
            data.extend_from_slice(&filter.gain.to_le_bytes());
            data.extend_from_slice(&filter.q.to_le_bytes());
            reports.push(Report::new(REPORT_FILTER, data));
        }
        write_reports(device, &reports).await?;

        let mut stored = filter_set.clone();
        if self.corrupt_writes.load(Ordering::SeqCst) {
            stored.preamp += 0.5;
        }
        self.slots.lock().insert((device.id().clone(), slot), stored);
        Ok(())
    }

    async fn enable_peq(&self, device: &dyn RawDevice, enabled: bool, slot: Option<SlotId>) -> Result<()> {
        device.send_report(REPORT_ENABLE, &[u8::from(enabled), slot.unwrap_or(0xff)]).await?;
        self.peq.lock().insert(device.id().clone(), (enabled, slot));
        Ok(())
    }
}

pub fn manager_with(
    transport: &Arc<FakeTransport>,
    handler: &Arc<StubHandler>,
    options: SessionOptions,
) -> SessionManager {
    let mut registry = CapabilityRegistry::new();
    registry.register_fiio(Arc::clone(handler) as Arc<dyn ProtocolHandler>);
    SessionManager::new(Arc::clone(transport) as Arc<dyn Transport>, registry, options)
}

pub fn manager(transport: &Arc<FakeTransport>, handler: &Arc<StubHandler>) -> SessionManager {
    manager_with(transport, handler, SessionOptions::default())
}
