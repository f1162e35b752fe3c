//! peqhid HID - hidapi transport for PEQ devices.
//!
//! Implements the [`peqhid_core::Transport`] contract on top of hidapi.
//! Selection is non-interactive: every interface matching the vendor
//! filters and the configured [`HidTransportConfig`] is returned, ordered
//! by device path.

pub mod device;
pub mod error;
pub mod transport;

pub use device::HidRawDevice;
pub use error::{HidError, HidResult};
pub use transport::{HidTransport, HidTransportConfig};
