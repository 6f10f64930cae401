//! Conflict resolution and tracklet lifecycle for one event.
//!
//! [`EventSearch`] owns the event's hit store and registry and drives the
//! search: seeding station pairs, propagating live tracklets through later
//! stations, committing or rolling back each candidate, cascading lost hits
//! into competing tracklets, appending the vertex point and finalizing the
//! survivors. Everything is sequential; each decision sees the registry
//! state left by the previous one.

use crate::config::FinderConfig;
use crate::fit::{fit_trajectory, match_score, FitError, TrajectoryFit};
use crate::hits::{Hit, HitId, HitStore};
use crate::matcher::collect_matches;
use crate::metrics::EventStats;
use crate::registry::TrackRegistry;
use crate::seeding::seed_station_pair;
use crate::station::{StationResolution, StationTable};
use crate::tracklet::TrackId;
use crate::vertex::estimate_vertex;
use std::cmp::Ordering;
use tracing::{debug, trace};

/// Result of offering one hit to one tracklet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The hit stays; the tracklet carries the refitted trajectory.
    Committed,
    /// The refit failed the acceptance test and was undone.
    RolledBack,
    /// Nothing was attempted (dead tracklet, claimed hit, occupied station).
    Skipped,
}

/// Search state of a single event.
pub struct EventSearch<'a> {
    config: &'a FinderConfig,
    stations: &'a StationTable,
    hits: HitStore,
    registry: TrackRegistry,
    stats: EventStats,
}

impl<'a> EventSearch<'a> {
    pub fn new(config: &'a FinderConfig, stations: &'a StationTable, hits: HitStore) -> Self {
        let registry = TrackRegistry::new(hits.len());
        let stats = EventStats {
            hits_loaded: hits.len(),
            ..Default::default()
        };
        Self {
            config,
            stations,
            hits,
            registry,
            stats,
        }
    }

    pub fn hits(&self) -> &HitStore {
        &self.hits
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &EventStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut EventStats {
        &mut self.stats
    }

    /// Hands back the event state once the search is over.
    pub fn into_parts(self) -> (HitStore, TrackRegistry, EventStats) {
        (self.hits, self.registry, self.stats)
    }

    // ========================================================================
    // SEARCH DRIVER
    // ========================================================================

    /// Seeds every station pair `s0 < s1` in ascending order. Whenever a
    /// pair produced seeds, the live tracklets are propagated through every
    /// station after `s1`.
    pub fn run(&mut self) {
        let order = self.stations.indices();
        for (i, &s0) in order.iter().enumerate() {
            for (j, &s1) in order.iter().enumerate().skip(i + 1) {
                if self.seed_pair(s0, s1) == 0 {
                    continue;
                }
                for &station in &order[j + 1..] {
                    self.propagate(station);
                }
            }
        }
    }

    /// Creates seeds from one station pair. Returns how many were created.
    pub fn seed_pair(&mut self, s0: u32, s1: u32) -> usize {
        let seeds = seed_station_pair(self.config, &self.hits, s0, s1);
        for seed in &seeds {
            self.registry
                .create_seed(&self.hits, seed.first, seed.second, seed.fit);
        }
        if !seeds.is_empty() {
            debug!("Stations {}/{}: {} seeds", s0, s1, seeds.len());
        }
        self.stats.seeds_created += seeds.len();
        seeds.len()
    }

    /// Matches live tracklets against the hits of `station` and runs the
    /// commit loop over the ranked candidates.
    pub fn propagate(&mut self, station: u32) {
        let resolution = self
            .stations
            .resolution(station, &self.config.default_resolution);
        let mut ranked = collect_matches(
            self.config,
            &resolution,
            &self.hits,
            &self.registry,
            station,
        );
        self.stats.candidates_offered += ranked.len() + ranked.truncated();
        self.stats.candidates_truncated += ranked.truncated();
        if ranked.truncated() > 0 {
            debug!(
                "Station {}: candidate list full, {} dropped",
                station,
                ranked.truncated()
            );
        }

        while let Some(best) = ranked.pop_best() {
            if self.try_add(best.track, best.hit, best.score) == AddOutcome::Committed {
                let registry = &self.registry;
                let shared = self.hits.get(best.hit).is_shared();
                ranked.retain(|c| {
                    c.track != best.track
                        && (shared || c.hit != best.hit)
                        && registry.is_live(c.track)
                });
            }
        }
    }

    // ========================================================================
    // COMMIT / ROLLBACK
    // ========================================================================

    /// Offers `hit` to `track`: commit, refit, then keep or roll back.
    pub fn try_add(&mut self, track: TrackId, hit: HitId, score: f64) -> AddOutcome {
        let tracklet = self.registry.track(track);
        let station = self.hits.get(hit).station;
        if !tracklet.is_live()
            || self.hits.is_claimed(hit)
            || tracklet.contains_hit(hit)
            || tracklet.station_hit(station).is_some()
        {
            return AddOutcome::Skipped;
        }
        let prior = *tracklet.fit();

        if !self.registry.commit(&mut self.hits, hit, track, score) {
            return AddOutcome::Skipped;
        }

        match self.refit(track) {
            Ok(fit) if self.acceptable(&fit) => {
                trace!("Commit {} -> {} (score {:.3}, chi2 {:.3})", hit, track, score, fit.chi2());
                self.registry.track_mut(track).set_fit(fit);
                self.stats.commits += 1;
                self.cascade(track);
                AddOutcome::Committed
            }
            outcome => {
                trace!("Rollback {} -> {}: {:?}", hit, track, outcome.map(|f| f.chi2()));
                self.registry.release(&mut self.hits, hit, track);
                self.registry.track_mut(track).set_fit(prior);
                self.stats.rollbacks += 1;
                AddOutcome::RolledBack
            }
        }
    }

    /// Fits the tracklet's current hit set.
    fn refit(&self, track: TrackId) -> Result<TrajectoryFit, FitError> {
        let members: Vec<&Hit> = self
            .registry
            .track(track)
            .hit_ids()
            .map(|id| self.hits.get(id))
            .collect();
        fit_trajectory(&members, None)
    }

    fn acceptable(&self, fit: &TrajectoryFit) -> bool {
        fit.chi2() <= self.config.chi2_max
            && (self.config.r0_limit <= 0.0 || fit.origin_radius() <= self.config.r0_limit)
    }

    /// Strips the hits of `track` from every other live tracklet holding
    /// them. A tracklet left with fewer than two detections, or whose refit
    /// fails or exceeds the ceiling, is invalidated. One level only: the
    /// hits such a tracklet frees are not offered to anyone in this step.
    fn cascade(&mut self, track: TrackId) {
        let mut shared: Vec<(HitId, TrackId)> = Vec::new();
        for hit in self.registry.track(track).hit_ids() {
            if self.hits.get(hit).is_shared() {
                continue;
            }
            for &other in self.registry.tracks_of(hit) {
                if other != track {
                    shared.push((hit, other));
                }
            }
        }

        for (hit, other) in shared {
            if !self.registry.is_live(other) {
                continue;
            }
            self.registry.release(&mut self.hits, hit, other);

            let survives = if self.registry.track(other).detection_count() < 2 {
                None
            } else {
                self.refit(other)
                    .ok()
                    .filter(|fit| fit.chi2() <= self.config.chi2_max)
            };
            match survives {
                Some(fit) => self.registry.track_mut(other).set_fit(fit),
                None => {
                    trace!("{} lost {} to {} and was invalidated", other, hit, track);
                    self.registry.invalidate(&mut self.hits, other);
                    self.stats.invalidations += 1;
                }
            }
        }
    }

    // ========================================================================
    // VERTEX AND FINALIZATION
    // ========================================================================

    /// Adds the vertex pseudo-hit to every qualifying live tracklet, under
    /// the same accept/rollback rule as a detector hit. Returns the id of
    /// the pseudo-hit if one was created.
    pub fn add_vertex(&mut self) -> Option<HitId> {
        if !self.config.vertex.enabled {
            return None;
        }
        let estimate = estimate_vertex(&self.config.vertex, &self.registry)?;
        let vertex = self.hits.push_vertex(
            estimate.position,
            estimate.position_sigma,
            estimate.time,
            estimate.time_sigma,
        );
        let resolution = StationResolution::new(
            estimate.time_sigma,
            estimate.position_sigma.x,
            estimate.position_sigma.y,
        );

        for track in estimate.contributors {
            if !self.registry.is_live(track) {
                continue;
            }
            let score = match_score(self.registry.track(track).fit(), self.hits.get(vertex), &resolution);
            if self.try_add(track, vertex, score) == AddOutcome::Committed {
                self.stats.vertex_additions += 1;
            }
        }
        debug!(
            "Vertex at ({:.2}, {:.2}) t={:.3} added to {} tracklets",
            estimate.position.x, estimate.position.y, estimate.time, self.stats.vertex_additions
        );
        Some(vertex)
    }

    /// Picks the output tracks and discards everything else.
    ///
    /// Live tracklets are visited longest first, then by ascending chi2,
    /// then by id. A tracklet is kept if it has at least `min_hits`
    /// detections, passes the chi2 ceiling and shares no detection with a
    /// track kept before it. Beam hits may be shared. Kept tracklets claim
    /// their detections.
    pub fn finalize(&mut self) -> Vec<TrackId> {
        self.hits.clear_claims();

        let mut order = self.registry.live_ids();
        let registry = &self.registry;
        let key = |id: TrackId| {
            let t = registry.track(id);
            (t.hit_count(), t.chi2(), id)
        };
        order.sort_by(|&a, &b| finalization_order(key(a), key(b)));

        let mut accepted = Vec::new();
        for id in order {
            let tracklet = self.registry.track(id);
            let viable = tracklet.detection_count() >= self.config.min_hits
                && tracklet.chi2() <= self.config.chi2_max;
            let members: Vec<HitId> = tracklet
                .hit_ids()
                .filter(|&h| !self.hits.get(h).is_vertex())
                .collect();
            let free = members
                .iter()
                .all(|&h| self.hits.get(h).is_beam() || !self.hits.is_claimed(h));

            if viable && free {
                for h in members {
                    if !self.hits.is_claimed(h) {
                        self.hits.mark_claimed(h, id);
                    }
                }
                self.registry.track_mut(id).accept();
                accepted.push(id);
            } else {
                self.registry.invalidate(&mut self.hits, id);
            }
        }

        accepted.sort_unstable();
        self.stats.tracks_found = accepted.len();
        debug!("Finalized {} tracks", accepted.len());
        accepted
    }
}

/// Orders tracklets the way finalization visits them.
pub fn finalization_order(a: (usize, f64, TrackId), b: (usize, f64, TrackId)) -> Ordering {
    b.0.cmp(&a.0).then(a.1.total_cmp(&b.1)).then(a.2.cmp(&b.2))
}
