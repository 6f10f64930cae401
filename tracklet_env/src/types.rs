//! Common types shared between the detector environment and the finder.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Readout channel address.
///
/// Channels are opaque to the finder; geometry and calibration tables are
/// keyed by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Returns the raw address.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// One uncalibrated detection as delivered by the event source.
///
/// The station assignment is already resolved upstream. `source_index` is
/// the caller's own index for this detection and is what results refer back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Caller-side index of this detection
    pub source_index: usize,

    /// Readout channel that fired
    pub channel: ChannelId,

    /// Tracking station the channel belongs to
    pub station: u32,

    /// Global position [x, y, z] in cm
    pub position: Vector3<f64>,

    /// Detection time in ns
    pub time: f64,
}

impl RawDetection {
    /// Creates a new detection.
    pub fn new(
        source_index: usize,
        channel: ChannelId,
        station: u32,
        position: Vector3<f64>,
        time: f64,
    ) -> Self {
        Self {
            source_index,
            channel,
            station,
            position,
            time,
        }
    }
}
