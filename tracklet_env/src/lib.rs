//! Tracklet Environment Abstraction Layer
//!
//! This crate holds everything the track finder needs to know about the
//! detector but does not own itself:
//! - **Identity**: channel addresses and the raw detections they produce
//! - **Geometry**: global-to-local transforms, cell sizes and depths
//! - **Calibration**: per-channel offsets and resolutions
//!
//! The finder only ever talks to the [`DetectorGeometry`] and [`Calibration`]
//! traits. [`PlanarGeometry`] and [`CalibrationTable`] are the in-memory
//! implementations used by the simulator and by table files on disk.
//!
//! # Example
//!
//! ```ignore
//! use tracklet_env::{CalibrationTable, PlanarGeometry};
//!
//! let geometry = PlanarGeometry::load("geometry.json")?;
//! let calibration = CalibrationTable::load("calibration.json")?;
//! let result = finder.find_event(&detections, &geometry, &calibration);
//! ```

mod calibration;
mod error;
mod geometry;
mod types;

pub use calibration::{
    Calibration, CalibrationTable, ChannelCalibration, ChannelOffset, ChannelResolution,
    NoCalibration,
};
pub use error::EnvError;
pub use geometry::{ChannelCell, DetectorGeometry, LocalPoint, PlanarGeometry, DEFAULT_CELL_SIZE};
pub use types::{ChannelId, RawDetection};
