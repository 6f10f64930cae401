//! Run configuration for the track finder and the sibling extender.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracklet_env::ChannelResolution;

// ============================================================================
// FINDER CONFIGURATION
// ============================================================================

/// Per-run constants of the track finder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Minimum hit count of a finalized track (default: 3)
    pub min_hits: usize,

    /// Ceiling on the spatial fit chi2/ndf of a kept tracklet (default: 3.0)
    pub chi2_max: f64,

    /// Ceiling on the match score of a (tracklet, hit) pair (default: 4.0)
    pub match_score_max: f64,

    /// Factor applied to `match_score_max` once a tracklet holds
    /// `required_stations - 1` hits (default: 1.0)
    pub match_score_scale_full: f64,

    /// Number of stations a complete track crosses; 0 disables the
    /// match-ceiling modulation (default: 0)
    pub required_stations: usize,

    /// Seed window on |dt/dz| in ns/cm (default: 0.2)
    pub max_time_per_depth: f64,

    /// Center of the seed slope band in x (default: 0.0)
    pub tx_mean: f64,

    /// Center of the seed slope band in y (default: 0.0)
    pub ty_mean: f64,

    /// Half width of the seed slope band in x (default: 1.0)
    pub tx_limit: f64,

    /// Half width of the seed slope band in y (default: 1.0)
    pub ty_limit: f64,

    /// Active area is |local_y| < cell_size_y * scale (default: 0.55)
    pub active_area_scale: f64,

    /// Capacity of the ranked candidate list per station (default: 1000)
    pub max_candidates: usize,

    /// Largest allowed distance of a tracklet from the beam axis at z = 0;
    /// 0 disables the check (default: 0.0)
    pub r0_limit: f64,

    /// Events with more hits than this in any station are not inspected (default: 50)
    pub station_max_multiplicity: usize,

    /// Resolution used when a channel or station has none
    pub default_resolution: ChannelResolution,

    /// Station whose hits act as a start counter at the origin
    pub beam_station: Option<u32>,

    /// Vertex pseudo-hit settings
    pub vertex: VertexConfig,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            min_hits: 3,
            chi2_max: 3.0,
            match_score_max: 4.0,
            match_score_scale_full: 1.0,
            required_stations: 0,
            max_time_per_depth: 0.2,
            tx_mean: 0.0,
            ty_mean: 0.0,
            tx_limit: 1.0,
            ty_limit: 1.0,
            active_area_scale: 0.55,
            max_candidates: 1000,
            r0_limit: 0.0,
            station_max_multiplicity: 50,
            default_resolution: ChannelResolution::new(0.08, 1.0, 1.0, 1.0),
            beam_station: None,
            vertex: VertexConfig::default(),
        }
    }
}

impl FinderConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FinderConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::parse(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&json)
    }

    /// Checks every constant for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_hits < 2 {
            return Err(ConfigError::invalid("min_hits", "must be at least 2"));
        }
        positive("chi2_max", self.chi2_max)?;
        positive("match_score_max", self.match_score_max)?;
        positive("match_score_scale_full", self.match_score_scale_full)?;
        positive("max_time_per_depth", self.max_time_per_depth)?;
        positive("tx_limit", self.tx_limit)?;
        positive("ty_limit", self.ty_limit)?;
        positive("active_area_scale", self.active_area_scale)?;
        if self.max_candidates == 0 {
            return Err(ConfigError::invalid("max_candidates", "must be non-zero"));
        }
        if self.station_max_multiplicity == 0 {
            return Err(ConfigError::invalid("station_max_multiplicity", "must be non-zero"));
        }
        if self.r0_limit < 0.0 || self.r0_limit.is_nan() {
            return Err(ConfigError::invalid("r0_limit", "must not be negative"));
        }
        resolution("default_resolution", &self.default_resolution)?;
        self.vertex.validate()
    }

    /// Match-score ceiling for a tracklet currently holding `hit_count` hits.
    pub fn match_ceiling(&self, hit_count: usize) -> f64 {
        if self.required_stations > 0 && hit_count + 1 >= self.required_stations {
            self.match_score_max * self.match_score_scale_full
        } else {
            self.match_score_max
        }
    }

    /// Settings the hit loader needs.
    pub fn load_options(&self) -> HitLoadOptions {
        HitLoadOptions {
            default_resolution: self.default_resolution,
            active_area_scale: self.active_area_scale,
            beam_station: self.beam_station,
        }
    }
}

/// Settings used when turning raw detections into hits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitLoadOptions {
    pub default_resolution: ChannelResolution,
    pub active_area_scale: f64,
    pub beam_station: Option<u32>,
}

// ============================================================================
// VERTEX PSEUDO-HIT
// ============================================================================

/// Where the vertex pseudo-hit is placed in the transverse plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexPlacement {
    /// Mean of the contributing tracklets' positions at z = 0
    Fitted,
    /// Nominal interaction point (0, 0)
    Origin,
}

/// Configuration of the optional vertex pseudo-hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexConfig {
    /// Append a vertex point to tracklets near the interaction point (default: false)
    pub enabled: bool,

    /// Tracklets whose distance from the beam axis at z = 0 is below this
    /// contribute to and receive the vertex (default: 10.0 cm)
    pub proximity_limit: f64,

    /// Minimum number of contributing tracklets (default: 2)
    pub min_tracks: usize,

    /// The vertex is only built if the contributors' time spread is below this (default: 3.0 ns)
    pub max_time_spread: f64,

    /// Transverse placement (default: fitted)
    pub placement: VertexPlacement,

    /// Divide the position spread by the number of contributors (default: false)
    pub scale_sigma_by_tracks: bool,

    /// Floor on the vertex position sigma (default: 0.1 cm)
    pub min_position_sigma: f64,

    /// Floor on the vertex time sigma (default: 0.01 ns)
    pub min_time_sigma: f64,
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proximity_limit: 10.0,
            min_tracks: 2,
            max_time_spread: 3.0,
            placement: VertexPlacement::Fitted,
            scale_sigma_by_tracks: false,
            min_position_sigma: 0.1,
            min_time_sigma: 0.01,
        }
    }
}

impl VertexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("vertex.proximity_limit", self.proximity_limit)?;
        positive("vertex.max_time_spread", self.max_time_spread)?;
        positive("vertex.min_position_sigma", self.min_position_sigma)?;
        positive("vertex.min_time_sigma", self.min_time_sigma)?;
        Ok(())
    }
}

// ============================================================================
// EXTENDER CONFIGURATION
// ============================================================================

/// One additional station the extender appends hits from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionStation {
    pub index: u32,

    /// Matching resolution (time sigma is unused)
    pub resolution: ChannelResolution,
}

/// Configuration of the sibling track extender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderConfig {
    /// Stations to extend into, processed in the given order
    pub stations: Vec<ExtensionStation>,

    /// Ceiling on the spatial match score (default: 3.0)
    pub match_score_max: f64,

    /// Ceiling on the refit chi2 (default: 3.0)
    pub chi2_max: f64,

    /// Capacity of the ranked pair list per station (default: 100)
    pub max_candidates: usize,

    /// Resolution for channels without calibration
    pub default_resolution: ChannelResolution,

    /// Active area scale for extension hits (default: 0.55)
    pub active_area_scale: f64,
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            match_score_max: 3.0,
            chi2_max: 3.0,
            max_candidates: 100,
            default_resolution: ChannelResolution::new(0.08, 1.0, 1.0, 1.0),
            active_area_scale: 0.55,
        }
    }
}

impl ExtenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("extender.match_score_max", self.match_score_max)?;
        positive("extender.chi2_max", self.chi2_max)?;
        positive("extender.active_area_scale", self.active_area_scale)?;
        if self.max_candidates == 0 {
            return Err(ConfigError::invalid("extender.max_candidates", "must be non-zero"));
        }
        resolution("extender.default_resolution", &self.default_resolution)?;
        for station in &self.stations {
            if !(station.resolution.sigma_x > 0.0 && station.resolution.sigma_y > 0.0) {
                return Err(ConfigError::invalid(
                    "extender.stations",
                    format!("station {} needs positive x/y resolution", station.index),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Duplicate station index {0}")]
    DuplicateStation(u32),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {}", value)))
    }
}

fn resolution(field: &'static str, res: &ChannelResolution) -> Result<(), ConfigError> {
    if res.sigma_t > 0.0 && res.sigma_x > 0.0 && res.sigma_y > 0.0 && res.sigma_z > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "all sigmas must be positive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FinderConfig::default().validate().is_ok());
        assert!(ExtenderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_min_hits_below_two_rejected() {
        let config = FinderConfig {
            min_hits: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "min_hits", .. })
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = FinderConfig {
            max_candidates: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = FinderConfig::from_json(r#"{"min_hits": 4, "vertex": {"enabled": true}}"#).unwrap();
        assert_eq!(config.min_hits, 4);
        assert!(config.vertex.enabled);
        assert_eq!(config.vertex.min_tracks, 2);
        assert_eq!(config.max_candidates, 1000);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        assert!(matches!(
            FinderConfig::from_json("{not json"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_match_ceiling_modulation() {
        let config = FinderConfig {
            match_score_max: 4.0,
            match_score_scale_full: 0.5,
            required_stations: 4,
            ..Default::default()
        };
        assert_eq!(config.match_ceiling(2), 4.0);
        assert_eq!(config.match_ceiling(3), 2.0);

        let plain = FinderConfig::default();
        assert_eq!(plain.match_ceiling(10), plain.match_score_max);
    }
}
