//! PEQ filter model.

use serde::{Deserialize, Serialize};

/// Shape of a single PEQ band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Bell filter around the center frequency
    Peaking,
    /// Shelf below the corner frequency
    LowShelf,
    /// Shelf above the corner frequency
    HighShelf,
    /// Attenuates above the corner frequency
    LowPass,
    /// Attenuates below the corner frequency
    HighPass,
}

/// One PEQ band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Band shape
    #[serde(rename = "type")]
    pub kind: FilterType,
    /// Center or corner frequency in Hz
    pub freq: f64,
    /// Gain in dB
    pub gain: f64,
    /// Quality factor
    pub q: f64,
}

impl Filter {
    /// Create a peaking band.
    #[must_use]
    pub fn peaking(freq: f64, gain: f64, q: f64) -> Self {
        Self { kind: FilterType::Peaking, freq, gain, q }
    }
}

/// The contents of one slot: preamp gain plus an ordered list of bands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Preamp gain in dB
    pub preamp: f64,
    /// Bands in device order
    pub filters: Vec<Filter>,
}

impl FilterSet {
    /// Create a filter set.
    #[must_use]
    pub fn new(preamp: f64, filters: Vec<Filter>) -> Self {
        Self { preamp, filters }
    }

    /// Number of bands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the set has no bands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
