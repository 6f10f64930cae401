//! Tracking stations: the ordered detector layers hits are grouped by.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use tracklet_env::{ChannelId, ChannelResolution};

/// Station resolution used by the match score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationResolution {
    pub sigma_t: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
}

impl StationResolution {
    pub fn new(sigma_t: f64, sigma_x: f64, sigma_y: f64) -> Self {
        Self {
            sigma_t,
            sigma_x,
            sigma_y,
        }
    }

    fn is_usable(&self) -> bool {
        self.sigma_t > 0.0 && self.sigma_x > 0.0 && self.sigma_y > 0.0
    }
}

impl From<ChannelResolution> for StationResolution {
    fn from(res: ChannelResolution) -> Self {
        Self::new(res.sigma_t, res.sigma_x, res.sigma_y)
    }
}

/// One tracking station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Position in the station order (proxy for depth)
    pub index: u32,

    /// Channels read out by this station
    #[serde(default)]
    pub channels: BTreeSet<ChannelId>,

    /// Matching resolution; `None` falls back to the configured default
    #[serde(default)]
    pub resolution: Option<StationResolution>,
}

impl Station {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            channels: BTreeSet::new(),
            resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: StationResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelId>) -> Self {
        self.channels.extend(channels);
        self
    }
}

/// Immutable, index-ordered set of stations used for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationTable {
    stations: Vec<Station>,
}

impl StationTable {
    /// Builds the table, sorting by index and rejecting duplicates.
    pub fn new(mut stations: Vec<Station>) -> Result<Self, ConfigError> {
        stations.sort_by_key(|s| s.index);
        for pair in stations.windows(2) {
            if pair[0].index == pair[1].index {
                return Err(ConfigError::DuplicateStation(pair[0].index));
            }
        }
        Ok(Self { stations })
    }

    /// Stations `0..count` with no channel list and default resolution.
    pub fn with_count(count: u32) -> Self {
        Self {
            stations: (0..count).map(Station::new).collect(),
        }
    }

    pub fn get(&self, index: u32) -> Option<&Station> {
        self.stations
            .binary_search_by_key(&index, |s| s.index)
            .ok()
            .map(|pos| &self.stations[pos])
    }

    pub fn contains(&self, index: u32) -> bool {
        self.get(index).is_some()
    }

    /// Station indices in ascending order.
    pub fn indices(&self) -> Vec<u32> {
        self.stations.iter().map(|s| s.index).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Station that reads out `channel`, if any station lists it.
    pub fn station_of_channel(&self, channel: ChannelId) -> Option<u32> {
        self.stations
            .iter()
            .find(|s| s.channels.contains(&channel))
            .map(|s| s.index)
    }

    /// Matching resolution of a station, falling back to `fallback` when the
    /// station is unknown or has no usable resolution.
    pub fn resolution(&self, index: u32, fallback: &ChannelResolution) -> StationResolution {
        match self.get(index).and_then(|s| s.resolution) {
            Some(res) if res.is_usable() => res,
            _ => {
                debug!("Station {} has no resolution, using default", index);
                StationResolution::from(*fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_sorted_and_searchable() {
        let table = StationTable::new(vec![Station::new(2), Station::new(0), Station::new(1)]).unwrap();
        assert_eq!(table.indices(), vec![0, 1, 2]);
        assert!(table.contains(1));
        assert!(!table.contains(5));
    }

    #[test]
    fn test_duplicate_station_rejected() {
        let result = StationTable::new(vec![Station::new(1), Station::new(1)]);
        assert!(matches!(result, Err(ConfigError::DuplicateStation(1))));
    }

    #[test]
    fn test_resolution_fallback() {
        let table = StationTable::new(vec![
            Station::new(0).with_resolution(StationResolution::new(0.05, 0.4, 0.6)),
            Station::new(1),
            Station::new(2).with_resolution(StationResolution::new(0.0, 0.4, 0.6)),
        ])
        .unwrap();
        let fallback = ChannelResolution::new(0.08, 1.0, 1.0, 1.0);

        assert_eq!(table.resolution(0, &fallback).sigma_t, 0.05);
        assert_eq!(table.resolution(1, &fallback).sigma_t, 0.08);
        // A zero component makes the whole entry unusable
        assert_eq!(table.resolution(2, &fallback).sigma_x, 1.0);
        assert_eq!(table.resolution(9, &fallback).sigma_y, 1.0);
    }

    #[test]
    fn test_station_of_channel() {
        let table = StationTable::new(vec![
            Station::new(0).with_channels([ChannelId(10), ChannelId(11)]),
            Station::new(1).with_channels([ChannelId(20)]),
        ])
        .unwrap();
        assert_eq!(table.station_of_channel(ChannelId(20)), Some(1));
        assert_eq!(table.station_of_channel(ChannelId(30)), None);
    }
}
