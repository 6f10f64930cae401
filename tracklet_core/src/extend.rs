//! Sibling track extender.
//!
//! Appends hits from additional, lower-density layers to tracks the finder
//! already produced. Matching is purely spatial: each track's current line
//! is evaluated at the hit depth and compared in x and y.

use crate::config::{ConfigError, ExtenderConfig, HitLoadOptions};
use crate::finder::FoundTrack;
use crate::fit::fit_trajectory;
use crate::hits::{Hit, HitStore};
use crate::matcher::{MatchCandidate, RankedMatches};
use crate::station::{Station, StationResolution, StationTable};
use crate::tracklet::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, trace};
use tracklet_env::{Calibration, DetectorGeometry, RawDetection};

/// One hit appended to one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub track: TrackId,
    pub station: u32,
    pub source_index: usize,
    pub score: f64,
}

/// What an extension pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionReport {
    pub extensions: Vec<Extension>,
    /// Assignments undone because the refit exceeded the ceiling.
    pub rollbacks: usize,
    pub candidates_truncated: usize,
    /// Caller indices of extension-station hits left unassigned, ascending.
    pub unused_hits: Vec<usize>,
}

/// Spatial-only pair score: `sqrt(((dx/sx)^2 + (dy/sy)^2) / 2)`.
pub fn spatial_score(track: &FoundTrack, hit: &Hit, resolution: &StationResolution) -> f64 {
    let (x, y) = track.fit.predict(hit.position.z);
    let nx = (hit.position.x - x) / resolution.sigma_x;
    let ny = (hit.position.y - y) / resolution.sigma_y;
    ((nx * nx + ny * ny) / 2.0).sqrt()
}

#[derive(Debug, Clone)]
pub struct TrackExtender {
    config: ExtenderConfig,
    stations: StationTable,
}

impl TrackExtender {
    pub fn new(config: ExtenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let stations = StationTable::new(
            config
                .stations
                .iter()
                .map(|s| {
                    let resolution = s.resolution.or_default(&config.default_resolution);
                    Station::new(s.index).with_resolution(resolution.into())
                })
                .collect(),
        )?;
        Ok(Self { config, stations })
    }

    pub fn config(&self) -> &ExtenderConfig {
        &self.config
    }

    /// Extends `tracks` in place with hits from the extension stations.
    /// Detections of any other station are ignored.
    pub fn extend<G, C>(
        &self,
        tracks: &mut [FoundTrack],
        detections: &[RawDetection],
        geometry: &G,
        calibration: &C,
    ) -> ExtensionReport
    where
        G: DetectorGeometry + ?Sized,
        C: Calibration + ?Sized,
    {
        let options = HitLoadOptions {
            default_resolution: self.config.default_resolution,
            active_area_scale: self.config.active_area_scale,
            beam_station: None,
        };
        let hits = HitStore::load(detections, &self.stations, geometry, calibration, &options);
        let mut report = ExtensionReport::default();
        let mut used = HashSet::new();

        for station in self.config.stations.iter().map(|s| s.index) {
            let resolution = self
                .stations
                .resolution(station, &self.config.default_resolution);
            let mut ranked = RankedMatches::with_capacity(self.config.max_candidates);

            for track in tracks.iter() {
                if track.hits.iter().any(|h| h.station == station) {
                    continue;
                }
                for &hit_id in hits.station_hits(station) {
                    let hit = hits.get(hit_id);
                    if !hit.in_active_area {
                        continue;
                    }
                    let score = spatial_score(track, hit, &resolution);
                    if score < self.config.match_score_max {
                        ranked.offer(MatchCandidate {
                            track: track.id,
                            hit: hit_id,
                            score,
                        });
                    }
                }
            }
            report.candidates_truncated += ranked.truncated();

            let mut taken_tracks = HashSet::new();
            while let Some(best) = ranked.pop_best() {
                if used.contains(&best.hit) || taken_tracks.contains(&best.track) {
                    continue;
                }
                let Some(track) = tracks.iter_mut().find(|t| t.id == best.track) else {
                    continue;
                };
                let hit = hits.get(best.hit);
                if self.append(track, hit, best.score) {
                    used.insert(best.hit);
                    taken_tracks.insert(best.track);
                    if let Some(source_index) = hit.source_index() {
                        report.extensions.push(Extension {
                            track: best.track,
                            station,
                            source_index,
                            score: best.score,
                        });
                    }
                } else {
                    report.rollbacks += 1;
                }
            }
        }

        report.unused_hits = hits
            .iter()
            .filter(|h| !used.contains(&h.id))
            .filter_map(|h| h.source_index())
            .collect();
        report.unused_hits.sort_unstable();
        debug!(
            "Extension: {} hits appended, {} rolled back",
            report.extensions.len(),
            report.rollbacks
        );
        report
    }

    /// Inserts the hit in station order and refits; undoes the insert if
    /// the fit fails or exceeds the ceiling.
    fn append(&self, track: &mut FoundTrack, hit: &Hit, score: f64) -> bool {
        let pos = track.hits.partition_point(|h| h.station < hit.station);
        track.hits.insert(pos, hit.clone());
        track.match_scores.insert(pos, score);

        let refs: Vec<&Hit> = track.hits.iter().collect();
        match fit_trajectory(&refs, None) {
            Ok(fit) if fit.chi2() <= self.config.chi2_max => {
                trace!("{} extended into station {}", track.id, hit.station);
                track.fit = fit;
                true
            }
            _ => {
                track.hits.remove(pos);
                track.match_scores.remove(pos);
                false
            }
        }
    }
}
