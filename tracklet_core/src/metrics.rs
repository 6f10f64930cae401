//! Tracklet Metrics Module
//! =======================
//!
//! Counters collected while one event is searched, and their running sum
//! over many events:
//! - **EventStats**: what the search did for a single event
//! - **RunStats**: totals plus per-event averages over a batch
//!
//! Nothing here influences the search; the counters only describe it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an event was not searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A station exceeded the multiplicity ceiling.
    Occupancy { station: u32, multiplicity: usize },
    /// Fewer usable stations fired than a track needs.
    TooFewStations { fired: usize, required: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Occupancy {
                station,
                multiplicity,
            } => write!(f, "station {} has {} hits", station, multiplicity),
            SkipReason::TooFewStations { fired, required } => {
                write!(f, "{} stations fired, {} required", fired, required)
            }
        }
    }
}

/// Per-event search counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub hits_loaded: usize,
    pub stations_fired: usize,
    pub seeds_created: usize,
    /// Candidates that entered a ranked list.
    pub candidates_offered: usize,
    /// Candidates lost to the list capacity.
    pub candidates_truncated: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Tracklets killed by cascade invalidation.
    pub invalidations: usize,
    pub vertex_additions: usize,
    pub tracks_found: usize,
    pub unused_hits: usize,
    pub skipped: Option<SkipReason>,
}

impl EventStats {
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Fraction of attempted commits that were kept.
    pub fn acceptance_ratio(&self) -> f64 {
        let attempts = self.commits + self.rollbacks;
        if attempts == 0 {
            0.0
        } else {
            self.commits as f64 / attempts as f64
        }
    }
}

// =============================================================================
// BATCH TOTALS
// =============================================================================

/// Running totals over a sequence of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub events: usize,
    pub events_skipped: usize,
    pub totals: EventStats,
}

impl RunStats {
    /// Folds one event into the totals.
    pub fn absorb(&mut self, event: &EventStats) {
        self.events += 1;
        if event.is_skipped() {
            self.events_skipped += 1;
        }
        let t = &mut self.totals;
        t.hits_loaded += event.hits_loaded;
        t.stations_fired += event.stations_fired;
        t.seeds_created += event.seeds_created;
        t.candidates_offered += event.candidates_offered;
        t.candidates_truncated += event.candidates_truncated;
        t.commits += event.commits;
        t.rollbacks += event.rollbacks;
        t.invalidations += event.invalidations;
        t.vertex_additions += event.vertex_additions;
        t.tracks_found += event.tracks_found;
        t.unused_hits += event.unused_hits;
    }

    pub fn tracks_per_event(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.totals.tracks_found as f64 / self.events as f64
        }
    }

    pub fn seeds_per_event(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.totals.seeds_created as f64 / self.events as f64
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_acceptance_ratio() {
        let stats = EventStats {
            commits: 3,
            rollbacks: 1,
            ..Default::default()
        };
        assert_relative_eq!(stats.acceptance_ratio(), 0.75);
        assert_eq!(EventStats::default().acceptance_ratio(), 0.0);
    }

    #[test]
    fn test_absorb_sums_and_counts_skips() {
        let mut run = RunStats::default();
        run.absorb(&EventStats {
            hits_loaded: 10,
            seeds_created: 4,
            tracks_found: 2,
            ..Default::default()
        });
        run.absorb(&EventStats {
            hits_loaded: 6,
            skipped: Some(SkipReason::TooFewStations {
                fired: 1,
                required: 3,
            }),
            ..Default::default()
        });

        assert_eq!(run.events, 2);
        assert_eq!(run.events_skipped, 1);
        assert_eq!(run.totals.hits_loaded, 16);
        assert_relative_eq!(run.tracks_per_event(), 1.0);
        assert_relative_eq!(run.seeds_per_event(), 2.0);
    }

    #[test]
    fn test_skip_reason_serializes_snake_case() {
        let json = serde_json::to_string(&SkipReason::Occupancy {
            station: 2,
            multiplicity: 80,
        })
        .unwrap();
        assert!(json.contains("occupancy"));
    }
}
