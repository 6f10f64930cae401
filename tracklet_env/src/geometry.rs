//! Detector geometry: where channels sit and how large their active cells are.

use crate::error::EnvError;
use crate::types::ChannelId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Cell size assumed for channels without a geometry entry.
///
/// Together with a zero local position this makes unknown channels pass
/// the active-area test instead of losing their hits.
pub const DEFAULT_CELL_SIZE: f64 = 1.0;

/// Position of a hit in its cell's local frame (cm).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
}

impl LocalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Geometry lookups the finder relies on.
///
/// All lookups return `None` for channels the geometry does not know.
/// Callers are expected to fall back to defaults rather than drop hits.
pub trait DetectorGeometry {
    /// Transforms a global position into the channel's local frame.
    fn local_xy(&self, channel: ChannelId, global: &Vector3<f64>) -> Option<LocalPoint>;

    /// Full cell size (x, y) of the channel.
    fn cell_size(&self, channel: ChannelId) -> Option<(f64, f64)>;

    /// Depth of the channel's cell center along the beam line.
    fn z_of(&self, channel: ChannelId) -> Option<f64>;

    /// Active-area test: `|local_y| < size_y * scale`.
    fn active_area_test(&self, channel: ChannelId, local: LocalPoint, scale: f64) -> bool {
        let size_y = self
            .cell_size(channel)
            .map(|(_, y)| y)
            .unwrap_or(DEFAULT_CELL_SIZE);
        local.y.abs() < size_y * scale
    }
}

/// One readout cell of a planar detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCell {
    /// Channel this cell belongs to
    pub channel: ChannelId,

    /// Cell center in global coordinates (cm)
    pub center: Vector3<f64>,

    /// Full extent along local x (cm)
    pub size_x: f64,

    /// Full extent along local y (cm)
    pub size_y: f64,
}

impl ChannelCell {
    pub fn new(channel: ChannelId, center: Vector3<f64>, size_x: f64, size_y: f64) -> Self {
        Self {
            channel,
            center,
            size_x,
            size_y,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeometryFile {
    cells: Vec<ChannelCell>,
}

/// Geometry made of axis-aligned planar cells.
///
/// The local frame of a cell is its center translated to the origin, with
/// no rotation.
#[derive(Debug, Clone, Default)]
pub struct PlanarGeometry {
    cells: HashMap<ChannelId, ChannelCell>,
}

impl PlanarGeometry {
    /// Creates an empty geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a geometry from a list of cells, rejecting duplicates and
    /// non-positive sizes.
    pub fn from_cells(cells: impl IntoIterator<Item = ChannelCell>) -> Result<Self, EnvError> {
        let mut geometry = Self::new();
        for cell in cells {
            geometry.insert(cell)?;
        }
        Ok(geometry)
    }

    /// Adds one cell.
    pub fn insert(&mut self, cell: ChannelCell) -> Result<(), EnvError> {
        if !(cell.size_x > 0.0 && cell.size_y > 0.0) {
            return Err(EnvError::invalid(cell.channel, "cell size must be positive"));
        }
        if self.cells.contains_key(&cell.channel) {
            return Err(EnvError::DuplicateChannel(cell.channel));
        }
        self.cells.insert(cell.channel, cell);
        Ok(())
    }

    /// Parses a geometry from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, EnvError> {
        let file: GeometryFile = serde_json::from_str(json)?;
        Self::from_cells(file.cells)
    }

    /// Serializes the geometry, cells ordered by channel.
    pub fn to_json(&self) -> Result<String, EnvError> {
        let mut cells: Vec<ChannelCell> = self.cells.values().cloned().collect();
        cells.sort_by_key(|c| c.channel);
        Ok(serde_json::to_string_pretty(&GeometryFile { cells })?)
    }

    /// Loads a geometry file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Returns the cell of a channel.
    pub fn cell(&self, channel: ChannelId) -> Option<&ChannelCell> {
        self.cells.get(&channel)
    }

    /// Number of known channels.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl DetectorGeometry for PlanarGeometry {
    fn local_xy(&self, channel: ChannelId, global: &Vector3<f64>) -> Option<LocalPoint> {
        let cell = self.cells.get(&channel)?;
        Some(LocalPoint::new(
            global.x - cell.center.x,
            global.y - cell.center.y,
        ))
    }

    fn cell_size(&self, channel: ChannelId) -> Option<(f64, f64)> {
        self.cells.get(&channel).map(|c| (c.size_x, c.size_y))
    }

    fn z_of(&self, channel: ChannelId) -> Option<f64> {
        self.cells.get(&channel).map(|c| c.center.z)
    }
}
