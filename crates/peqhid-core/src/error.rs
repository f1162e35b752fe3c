//! Error types for peqhid core.

use thiserror::Error;

use crate::device::{SLOT_NO_HANDLER, SLOT_UNAVAILABLE, SlotId};

/// Failures reported by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HID transport is not available")]
    NotAvailable,

    #[error("Device is not open")]
    NotOpen,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Core error type for peqhid operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("HID is not supported in this environment")]
    EnvironmentUnsupported,

    #[error("Unknown vendor id: {0:#06x}")]
    UnknownVendor(u16),

    #[error("Unsupported device: {manufacturer} {model}")]
    UnsupportedDevice { manufacturer: String, model: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("No device handler available for {operation}")]
    NoHandler { operation: &'static str },

    #[error("Invalid slot {slot} (device exposes {available} slots)")]
    InvalidSlot { slot: SlotId, available: usize },

    #[error("Too many filters: {count} (device supports {max})")]
    TooManyFilters { count: usize, max: usize },

    #[error("Current slot is unavailable")]
    SlotUnavailable,

    #[error("Partial write: {written} of {total} reports sent")]
    PartialWrite {
        written: usize,
        total: usize,
        #[source]
        source: TransportError,
    },

    #[error("Slot {slot} read back differently after write")]
    VerifyMismatch { slot: SlotId },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether this error means the device has no registered handler.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnknownVendor(_) | Self::UnsupportedDevice { .. })
    }

    /// Whether the transport reported the device as gone.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Disconnected)
                | Self::PartialWrite { source: TransportError::Disconnected, .. }
        )
    }

    /// Out-of-range slot value standing in for this failure.
    #[must_use]
    pub fn slot_sentinel(&self) -> i32 {
        match self {
            Self::NoHandler { .. } => SLOT_NO_HANDLER,
            _ => SLOT_UNAVAILABLE,
        }
    }
}

/// Result type alias for peqhid core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_sentinels_are_distinct_and_negative() {
        let no_handler = Error::NoHandler { operation: "query" }.slot_sentinel();
        let unavailable = Error::SlotUnavailable.slot_sentinel();

        assert_eq!(no_handler, -2);
        assert_eq!(unavailable, -1);
        assert_ne!(no_handler, unavailable);
    }

    #[test]
    fn test_disconnect_detection() {
        assert!(Error::Transport(TransportError::Disconnected).is_disconnect());
        assert!(
            Error::PartialWrite { written: 2, total: 5, source: TransportError::Disconnected }
                .is_disconnect()
        );
        assert!(!Error::Transport(TransportError::Timeout).is_disconnect());
    }

    #[test]
    fn test_unsupported_classification() {
        assert!(Error::UnknownVendor(0x1234).is_unsupported());
        assert!(
            Error::UnsupportedDevice { manufacturer: "FiiO".into(), model: "FIIO X1".into() }
                .is_unsupported()
        );
        assert!(!Error::SlotUnavailable.is_unsupported());
    }

    #[test]
    fn test_unknown_vendor_message() {
        assert_eq!(Error::UnknownVendor(0x2972).to_string(), "Unknown vendor id: 0x2972");
    }
}
