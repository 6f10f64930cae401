//! Simulated detector: planar stations with a square cell grid.

use crate::error::SimError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracklet_core::{Station, StationResolution, StationTable};
use tracklet_env::{
    CalibrationTable, ChannelCell, ChannelId, ChannelOffset, ChannelResolution, PlanarGeometry,
};

/// Configuration for a simulated detector and its event generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of tracking stations
    pub stations: u32,

    /// Depth of station 0 (cm)
    pub first_station_z: f64,

    /// Distance between consecutive stations (cm)
    pub station_spacing: f64,

    /// Cells per side of each station's square grid
    pub cells_per_side: u32,

    /// Cell pitch in x and y (cm)
    pub cell_size: f64,

    /// Time resolution (ns)
    pub sigma_t: f64,

    /// Transverse position resolution (cm)
    pub sigma_xy: f64,

    /// Probability that a particle crossing a station leaves a hit
    pub efficiency: f64,

    /// Uniform noise hits per station per event
    pub noise_per_station: usize,

    /// Transverse spread of the interaction point (cm)
    pub vertex_spread: f64,

    /// Particle slopes are drawn uniformly from [-max_slope, max_slope]
    pub max_slope: f64,

    /// Readout time offset of station `s` is `s * station_time_offset` (ns).
    /// The calibration table carries the inverse correction.
    pub station_time_offset: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            stations: 4,
            first_station_z: 100.0,
            station_spacing: 100.0,
            cells_per_side: 16,
            cell_size: 10.0,
            sigma_t: 0.08,
            sigma_xy: 0.3,
            efficiency: 1.0,
            noise_per_station: 0,
            vertex_spread: 0.5,
            max_slope: 0.1,
            station_time_offset: 0.0,
        }
    }
}

/// Geometry, calibration and station tables of the simulated detector.
#[derive(Debug, Clone)]
pub struct DetectorSetup {
    pub config: SimConfig,
    pub geometry: PlanarGeometry,
    pub calibration: CalibrationTable,
    pub stations: StationTable,
}

impl DetectorSetup {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        if config.stations < 2 {
            return Err(SimError::Setup("at least two stations are needed".into()));
        }
        if config.cells_per_side == 0 || config.cells_per_side > 256 {
            return Err(SimError::Setup("cells_per_side must be in 1..=256".into()));
        }
        if !(config.cell_size > 0.0 && config.sigma_t > 0.0 && config.sigma_xy > 0.0) {
            return Err(SimError::Setup("cell size and resolutions must be positive".into()));
        }

        let mut geometry = PlanarGeometry::new();
        let mut calibration = CalibrationTable::new();
        let mut stations = Vec::with_capacity(config.stations as usize);
        let resolution = ChannelResolution::new(config.sigma_t, config.sigma_xy, config.sigma_xy, 1.0);

        for s in 0..config.stations {
            let z = config.first_station_z + s as f64 * config.station_spacing;
            let mut channels = Vec::new();
            for ix in 0..config.cells_per_side {
                for iy in 0..config.cells_per_side {
                    let channel = Self::channel(s, ix, iy);
                    let center = Vector3::new(
                        Self::cell_center(&config, ix),
                        Self::cell_center(&config, iy),
                        z,
                    );
                    geometry.insert(ChannelCell::new(channel, center, config.cell_size, config.cell_size))?;
                    calibration.set_resolution(channel, resolution);
                    if config.station_time_offset != 0.0 {
                        calibration.set_offset(
                            channel,
                            ChannelOffset {
                                dt: -(s as f64) * config.station_time_offset,
                                ..Default::default()
                            },
                        );
                    }
                    channels.push(channel);
                }
            }
            stations.push(
                Station::new(s)
                    .with_channels(channels)
                    .with_resolution(StationResolution::new(
                        config.sigma_t,
                        config.sigma_xy,
                        config.sigma_xy,
                    )),
            );
        }

        Ok(Self {
            stations: StationTable::new(stations)?,
            geometry,
            calibration,
            config,
        })
    }

    /// Channel id layout: station in the upper 16 bits, then x and y cell.
    pub fn channel(station: u32, ix: u32, iy: u32) -> ChannelId {
        ChannelId((station << 16) | (ix << 8) | iy)
    }

    fn cell_center(config: &SimConfig, i: u32) -> f64 {
        (i as f64 + 0.5 - config.cells_per_side as f64 / 2.0) * config.cell_size
    }

    fn cell_index(&self, v: f64) -> Option<u32> {
        let half = self.half_width();
        let i = ((v + half) / self.config.cell_size).floor();
        if i >= 0.0 && i < self.config.cells_per_side as f64 {
            Some(i as u32)
        } else {
            None
        }
    }

    /// Half the transverse extent of a station (cm).
    pub fn half_width(&self) -> f64 {
        self.config.cells_per_side as f64 * self.config.cell_size / 2.0
    }

    pub fn station_z(&self, station: u32) -> f64 {
        self.config.first_station_z + station as f64 * self.config.station_spacing
    }

    /// Channel of the cell covering (x, y), if inside the grid.
    pub fn cell_at(&self, station: u32, x: f64, y: f64) -> Option<ChannelId> {
        Some(Self::channel(station, self.cell_index(x)?, self.cell_index(y)?))
    }

    /// The cell one row above the one covering (x, y). Its local frame puts
    /// the point a full pitch below the center, outside the active area.
    pub fn neighbour_above(&self, station: u32, x: f64, y: f64) -> Option<ChannelId> {
        let ix = self.cell_index(x)?;
        let iy = self.cell_index(y)? + 1;
        (iy < self.config.cells_per_side).then(|| Self::channel(station, ix, iy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tracklet_env::{Calibration, DetectorGeometry};

    #[test]
    fn test_setup_builds_tables() {
        let setup = DetectorSetup::new(SimConfig {
            stations: 3,
            cells_per_side: 4,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(setup.stations.len(), 3);
        assert_eq!(setup.geometry.len(), 3 * 16);
        assert_eq!(setup.calibration.len(), 3 * 16);
        assert_relative_eq!(setup.half_width(), 20.0);
    }

    #[test]
    fn test_cell_lookup_and_local_frame() {
        let setup = DetectorSetup::new(SimConfig::default()).unwrap();
        let channel = setup.cell_at(2, 3.0, -7.0).unwrap();
        assert_eq!(setup.stations.station_of_channel(channel), Some(2));

        let local = setup
            .geometry
            .local_xy(channel, &Vector3::new(3.0, -7.0, 300.0))
            .unwrap();
        assert_relative_eq!(local.x, -2.0);
        assert_relative_eq!(local.y, -2.0);
        assert!(setup.geometry.active_area_test(channel, local, 0.55));

        assert!(setup.cell_at(0, 500.0, 0.0).is_none());
    }

    #[test]
    fn test_neighbour_cell_is_inactive() {
        let setup = DetectorSetup::new(SimConfig::default()).unwrap();
        let pos = Vector3::new(1.0, 1.0, 100.0);
        let channel = setup.neighbour_above(0, pos.x, pos.y).unwrap();
        let local = setup.geometry.local_xy(channel, &pos).unwrap();
        assert!(!setup.geometry.active_area_test(channel, local, 0.55));
    }

    #[test]
    fn test_time_offset_calibration() {
        let setup = DetectorSetup::new(SimConfig {
            station_time_offset: 1.5,
            ..Default::default()
        })
        .unwrap();
        let channel = setup.cell_at(2, 0.0, 0.0).unwrap();
        let offset = setup.calibration.offset(channel).unwrap();
        assert_relative_eq!(offset.dt, -3.0);
    }

    #[test]
    fn test_rejects_single_station() {
        let config = SimConfig {
            stations: 1,
            ..Default::default()
        };
        assert!(DetectorSetup::new(config).is_err());
    }
}
