//! HID error types.

use peqhid_core::TransportError;
use thiserror::Error;

/// HID error type.
#[derive(Debug, Error)]
pub enum HidError {
    #[error("HID API unavailable: {0}")]
    Unavailable(String),

    #[error("Device not open")]
    NotOpen,

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
}

/// Result type for HID operations.
pub type HidResult<T> = Result<T, HidError>;

impl From<HidError> for TransportError {
    fn from(e: HidError) -> Self {
        match e {
            HidError::Unavailable(_) => TransportError::NotAvailable,
            HidError::NotOpen => TransportError::NotOpen,
            HidError::Hid(e) => classify(&e.to_string()),
            e @ (HidError::ShortWrite { .. } | HidError::Task(_)) => TransportError::Io(e.to_string()),
        }
    }
}

/// Map a hidapi error message onto a transport error.
///
/// hidapi only reports failures as strings, so the OS error text decides.
fn classify(message: &str) -> TransportError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("eacces") || lower.contains("eperm") {
        TransportError::PermissionDenied(message.to_string())
    } else if lower.contains("no such device") || lower.contains("enodev") || lower.contains("disconnected") {
        TransportError::Disconnected
    } else {
        TransportError::Io(message.to_string())
    }
}
