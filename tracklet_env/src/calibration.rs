//! Per-channel calibration constants.
//!
//! Offsets and resolutions are derived elsewhere from long-run residual
//! distributions. The finder only reads the resulting table.

use crate::error::EnvError;
use crate::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Additive correction applied to a detection at load time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelOffset {
    /// Time offset (ns)
    pub dt: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// Measurement resolution of a channel.
///
/// A component that is zero (or negative) means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelResolution {
    pub sigma_t: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_z: f64,
}

impl ChannelResolution {
    pub fn new(sigma_t: f64, sigma_x: f64, sigma_y: f64, sigma_z: f64) -> Self {
        Self {
            sigma_t,
            sigma_x,
            sigma_y,
            sigma_z,
        }
    }

    /// Replaces every unknown component with the one from `fallback`.
    pub fn or_default(&self, fallback: &ChannelResolution) -> ChannelResolution {
        let pick = |value: f64, default: f64| if value > 0.0 { value } else { default };
        ChannelResolution {
            sigma_t: pick(self.sigma_t, fallback.sigma_t),
            sigma_x: pick(self.sigma_x, fallback.sigma_x),
            sigma_y: pick(self.sigma_y, fallback.sigma_y),
            sigma_z: pick(self.sigma_z, fallback.sigma_z),
        }
    }
}

/// Calibration lookups the finder relies on.
pub trait Calibration {
    /// Offset to add to a detection of this channel.
    fn offset(&self, channel: ChannelId) -> Option<ChannelOffset>;

    /// Resolution of this channel.
    fn resolution(&self, channel: ChannelId) -> Option<ChannelResolution>;
}

/// Calibration that knows nothing; every hit gets the default resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCalibration;

impl Calibration for NoCalibration {
    fn offset(&self, _channel: ChannelId) -> Option<ChannelOffset> {
        None
    }

    fn resolution(&self, _channel: ChannelId) -> Option<ChannelResolution> {
        None
    }
}

/// One row of a calibration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    pub channel: ChannelId,
    #[serde(default)]
    pub offset: ChannelOffset,
    #[serde(default)]
    pub resolution: ChannelResolution,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationFile {
    channels: Vec<ChannelCalibration>,
}

/// In-memory calibration table keyed by channel.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    entries: HashMap<ChannelId, ChannelCalibration>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from rows, rejecting duplicate channels.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ChannelCalibration>,
    ) -> Result<Self, EnvError> {
        let mut table = Self::new();
        for entry in entries {
            if table.entries.contains_key(&entry.channel) {
                return Err(EnvError::DuplicateChannel(entry.channel));
            }
            table.entries.insert(entry.channel, entry);
        }
        Ok(table)
    }

    /// Parses a table from JSON.
    pub fn from_json(json: &str) -> Result<Self, EnvError> {
        let file: CalibrationFile = serde_json::from_str(json)?;
        let table = Self::from_entries(file.channels)?;
        debug!("Loaded calibration for {} channels", table.len());
        Ok(table)
    }

    /// Serializes the table, rows ordered by channel.
    pub fn to_json(&self) -> Result<String, EnvError> {
        let mut channels: Vec<ChannelCalibration> = self.entries.values().cloned().collect();
        channels.sort_by_key(|c| c.channel);
        Ok(serde_json::to_string_pretty(&CalibrationFile { channels })?)
    }

    /// Loads a calibration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Sets the offset of a channel, creating its row if needed.
    pub fn set_offset(&mut self, channel: ChannelId, offset: ChannelOffset) {
        self.row(channel).offset = offset;
    }

    /// Sets the resolution of a channel, creating its row if needed.
    pub fn set_resolution(&mut self, channel: ChannelId, resolution: ChannelResolution) {
        self.row(channel).resolution = resolution;
    }

    fn row(&mut self, channel: ChannelId) -> &mut ChannelCalibration {
        self.entries
            .entry(channel)
            .or_insert_with(|| ChannelCalibration {
                channel,
                offset: ChannelOffset::default(),
                resolution: ChannelResolution::default(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Calibration for CalibrationTable {
    fn offset(&self, channel: ChannelId) -> Option<ChannelOffset> {
        self.entries.get(&channel).map(|e| e.offset)
    }

    fn resolution(&self, channel: ChannelId) -> Option<ChannelResolution> {
        self.entries.get(&channel).map(|e| e.resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_or_default_fills_unknown_components() {
        let fallback = ChannelResolution::new(0.08, 1.0, 1.0, 1.0);
        let partial = ChannelResolution::new(0.05, 0.0, 0.7, -1.0);
        let merged = partial.or_default(&fallback);
        assert_relative_eq!(merged.sigma_t, 0.05);
        assert_relative_eq!(merged.sigma_x, 1.0);
        assert_relative_eq!(merged.sigma_y, 0.7);
        assert_relative_eq!(merged.sigma_z, 1.0);
    }

    #[test]
    fn test_setters_create_rows() {
        let mut table = CalibrationTable::new();
        table.set_offset(ChannelId(4), ChannelOffset { dt: 0.3, ..Default::default() });
        assert_eq!(table.len(), 1);
        assert_relative_eq!(table.offset(ChannelId(4)).unwrap().dt, 0.3);
        // Resolution of a row created by set_offset is all-unknown
        assert_eq!(table.resolution(ChannelId(4)), Some(ChannelResolution::default()));
        assert!(table.offset(ChannelId(5)).is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut table = CalibrationTable::new();
        table.set_resolution(ChannelId(1), ChannelResolution::new(0.06, 0.5, 0.9, 0.5));
        table.set_offset(ChannelId(2), ChannelOffset { dt: -0.2, dx: 0.1, dy: 0.0, dz: 0.0 });

        let json = table.to_json().unwrap();
        let back = CalibrationTable::from_json(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.resolution(ChannelId(1)), table.resolution(ChannelId(1)));
        assert_eq!(back.offset(ChannelId(2)), table.offset(ChannelId(2)));
    }

    #[test]
    fn test_missing_offset_field_defaults_to_zero() {
        let json = r#"{"channels":[{"channel":7,"resolution":{"sigma_t":0.1,"sigma_x":1.0,"sigma_y":1.0,"sigma_z":1.0}}]}"#;
        let table = CalibrationTable::from_json(json).unwrap();
        assert_eq!(table.offset(ChannelId(7)), Some(ChannelOffset::default()));
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let json = r#"{"channels":[{"channel":1},{"channel":1}]}"#;
        assert!(matches!(
            CalibrationTable::from_json(json),
            Err(EnvError::DuplicateChannel(ChannelId(1)))
        ));
    }

    #[test]
    fn test_no_calibration_knows_nothing() {
        assert!(NoCalibration.offset(ChannelId(1)).is_none());
        assert!(NoCalibration.resolution(ChannelId(1)).is_none());
    }
}
