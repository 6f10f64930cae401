//! Event-level entry point of the track finder.
//!
//! [`TrackFinder`] holds the per-run inputs (configuration and station
//! table) and turns one event's raw detections into an [`EventResult`].
//! Events are independent: the finder keeps no state between calls, so a
//! host may share one finder across threads and process events in
//! parallel.

use crate::config::{ConfigError, FinderConfig};
use crate::fit::TrajectoryFit;
use crate::hits::{Hit, HitStore};
use crate::metrics::{EventStats, SkipReason};
use crate::resolver::EventSearch;
use crate::station::StationTable;
use crate::tracklet::TrackId;
use crate::vertex::EventVertex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracklet_env::{Calibration, DetectorGeometry, RawDetection};

/// A finalized track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundTrack {
    pub id: TrackId,
    /// Hits in station order; the vertex point, if present, comes last.
    pub hits: Vec<Hit>,
    /// Match score each hit was added with (0 for seed hits).
    pub match_scores: Vec<f64>,
    pub fit: TrajectoryFit,
    pub includes_vertex: bool,
}

impl FoundTrack {
    /// Caller indices of the detector hits.
    pub fn source_indices(&self) -> Vec<usize> {
        self.hits.iter().filter_map(|h| h.source_index()).collect()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn detection_count(&self) -> usize {
        self.hits.iter().filter(|h| !h.is_vertex()).count()
    }

    pub fn stations(&self) -> Vec<u32> {
        self.hits
            .iter()
            .filter(|h| !h.is_vertex())
            .map(|h| h.station)
            .collect()
    }

    pub fn chi2(&self) -> f64 {
        self.fit.chi2()
    }

    pub fn ndf(&self) -> i32 {
        self.fit.ndf()
    }
}

/// Output of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    /// Finalized tracks, ascending id.
    pub tracks: Vec<FoundTrack>,
    /// Caller indices of detections not used by any track, ascending.
    pub unused_hits: Vec<usize>,
    pub vertex: Option<EventVertex>,
    pub stats: EventStats,
}

impl EventResult {
    pub fn is_skipped(&self) -> bool {
        self.stats.is_skipped()
    }
}

/// Multi-station straight-line track finder.
#[derive(Debug, Clone)]
pub struct TrackFinder {
    config: FinderConfig,
    stations: StationTable,
}

impl TrackFinder {
    /// Creates a finder after validating the configuration.
    pub fn new(config: FinderConfig, stations: StationTable) -> Result<Self, ConfigError> {
        config.validate()?;
        if stations.len() < 2 {
            return Err(ConfigError::invalid("stations", "at least two stations are needed"));
        }
        info!(
            "Track finder ready: {} stations, min_hits={}, chi2_max={}",
            stations.len(),
            config.min_hits,
            config.chi2_max
        );
        Ok(Self { config, stations })
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn stations(&self) -> &StationTable {
        &self.stations
    }

    /// Runs the full search on one event.
    pub fn find_event<G, C>(
        &self,
        detections: &[RawDetection],
        geometry: &G,
        calibration: &C,
    ) -> EventResult
    where
        G: DetectorGeometry + ?Sized,
        C: Calibration + ?Sized,
    {
        let hits = HitStore::load(
            detections,
            &self.stations,
            geometry,
            calibration,
            &self.config.load_options(),
        );
        let (fired, skip) = self.inspect(&hits);

        let mut search = EventSearch::new(&self.config, &self.stations, hits);
        search.stats_mut().stations_fired = fired;

        let accepted = if let Some(reason) = skip {
            debug!("Event skipped: {}", reason);
            search.stats_mut().skipped = Some(reason);
            Vec::new()
        } else {
            search.run();
            search.add_vertex();
            search.finalize()
        };

        let (hits, registry, mut stats) = search.into_parts();

        let tracks: Vec<FoundTrack> = accepted
            .iter()
            .map(|&id| {
                let tracklet = registry.track(id);
                FoundTrack {
                    id,
                    hits: tracklet.hit_ids().map(|h| hits.get(h).clone()).collect(),
                    match_scores: tracklet.hits().iter().map(|h| h.match_score).collect(),
                    fit: *tracklet.fit(),
                    includes_vertex: tracklet.has_vertex(),
                }
            })
            .collect();

        let mut unused_hits: Vec<usize> = hits
            .iter()
            .filter(|h| h.claimed_by.is_none())
            .filter_map(|h| h.source_index())
            .chain(hits.untracked().iter().copied())
            .collect();
        unused_hits.sort_unstable();
        stats.unused_hits = unused_hits.len();

        let vertex = EventVertex::estimate(
            tracks.iter().map(|t| (&t.fit, t.detection_count())),
            self.config.min_hits,
        );

        EventResult {
            tracks,
            unused_hits,
            vertex,
            stats,
        }
    }

    /// Counts fired stations and decides whether the event is searched.
    fn inspect(&self, hits: &HitStore) -> (usize, Option<SkipReason>) {
        let max = self.config.station_max_multiplicity;
        let multiplicity = hits.station_multiplicity();
        let fired = multiplicity.values().filter(|&&m| m > 0 && m <= max).count();

        if let Some((&station, &m)) = multiplicity.iter().find(|(_, m)| **m > max) {
            return (
                fired,
                Some(SkipReason::Occupancy {
                    station,
                    multiplicity: m,
                }),
            );
        }
        if fired < self.config.min_hits {
            return (
                fired,
                Some(SkipReason::TooFewStations {
                    fired,
                    required: self.config.min_hits,
                }),
            );
        }
        (fired, None)
    }
}

// ============================================================================
// TESTS
// ============================================================================
