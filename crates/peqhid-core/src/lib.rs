//! peqhid Core - Device sessions and PEQ protocol dispatch.
//!
//! This crate binds HID audio devices to the protocol handler for their
//! family and routes slot-addressed PEQ reads and writes through it. The
//! host transport and the vendor wire formats are supplied by the caller
//! through the [`Transport`] and [`ProtocolHandler`] traits.

pub mod device;
pub mod error;
pub mod filter;
pub mod handler;
pub mod registry;
pub mod session;
pub mod transport;

pub use device::{DeviceDescriptor, DeviceDetails, DeviceId, SLOT_NO_HANDLER, SLOT_UNAVAILABLE, SlotId, SlotInfo};
pub use error::{Error, Result, TransportError};
pub use filter::{Filter, FilterSet, FilterType};
pub use handler::{ProtocolHandler, PullResult, Report, write_reports};
pub use registry::{CapabilityRegistry, FIIO_MODELS, Manufacturer, VENDORS};
pub use session::{ConnectionState, SessionEntry, SessionManager, SessionOptions};
pub use transport::{DeviceFilter, RawDevice, Transport};
