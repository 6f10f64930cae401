//! Track candidates ("tracklets") and their lifecycle state.

use crate::fit::TrajectoryFit;
use crate::hits::{Hit, HitId, VERTEX_STATION};
use serde::{Deserialize, Serialize};

/// Index of a tracklet in the event's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl TrackId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Lifecycle of a tracklet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackletState {
    /// Two hits, closed-form fit
    Seeded,
    /// Holds at least one hit beyond its seed
    Extending,
    /// Copied to the event output
    Accepted,
    /// Invalidated or rejected; skipped by every later step
    Discarded,
}

/// One hit slot of a tracklet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackletHit {
    pub hit: HitId,
    pub station: u32,

    /// Match score at the time the hit was added (0 for seed hits)
    pub match_score: f64,
}

/// A station-unique, station-ordered set of hits with its fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracklet {
    pub id: TrackId,
    hits: Vec<TrackletHit>,
    fit: TrajectoryFit,
    state: TrackletState,
}

impl Tracklet {
    /// Creates a seed from two hits of different stations.
    pub(crate) fn seeded(id: TrackId, first: &Hit, second: &Hit, fit: TrajectoryFit) -> Self {
        let mut tracklet = Self {
            id,
            hits: Vec::with_capacity(4),
            fit,
            state: TrackletState::Seeded,
        };
        tracklet.insert_hit(first, 0.0);
        tracklet.insert_hit(second, 0.0);
        tracklet
    }

    pub fn hits(&self) -> &[TrackletHit] {
        &self.hits
    }

    pub fn hit_ids(&self) -> impl Iterator<Item = HitId> + '_ {
        self.hits.iter().map(|h| h.hit)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// Hit count without the vertex point.
    pub fn detection_count(&self) -> usize {
        self.hits.iter().filter(|h| h.station != VERTEX_STATION).count()
    }

    pub fn station_hit(&self, station: u32) -> Option<HitId> {
        self.hits
            .iter()
            .find(|h| h.station == station)
            .map(|h| h.hit)
    }

    pub fn contains_hit(&self, hit: HitId) -> bool {
        self.hits.iter().any(|h| h.hit == hit)
    }

    pub fn has_vertex(&self) -> bool {
        self.station_hit(VERTEX_STATION).is_some()
    }

    pub fn fit(&self) -> &TrajectoryFit {
        &self.fit
    }

    pub fn chi2(&self) -> f64 {
        self.fit.chi2()
    }

    pub fn ndf(&self) -> i32 {
        self.fit.ndf()
    }

    pub fn state(&self) -> TrackletState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.state, TrackletState::Discarded)
    }

    /// Sum of the match scores of all added hits.
    pub fn accumulated_match_score(&self) -> f64 {
        self.hits.iter().map(|h| h.match_score).sum()
    }

    /// Inserts a hit in station order. Returns false if its station is
    /// already occupied.
    pub(crate) fn insert_hit(&mut self, hit: &Hit, match_score: f64) -> bool {
        let pos = match self.hits.binary_search_by_key(&hit.station, |h| h.station) {
            Ok(_) => return false,
            Err(pos) => pos,
        };
        self.hits.insert(
            pos,
            TrackletHit {
                hit: hit.id,
                station: hit.station,
                match_score,
            },
        );
        self.refresh_state();
        true
    }

    pub(crate) fn remove_hit(&mut self, hit: HitId) -> Option<TrackletHit> {
        let pos = self.hits.iter().position(|h| h.hit == hit)?;
        let removed = self.hits.remove(pos);
        self.refresh_state();
        Some(removed)
    }

    pub(crate) fn set_fit(&mut self, fit: TrajectoryFit) {
        self.fit = fit;
    }

    pub(crate) fn discard(&mut self) {
        self.state = TrackletState::Discarded;
    }

    pub(crate) fn accept(&mut self) {
        self.state = TrackletState::Accepted;
    }

    fn refresh_state(&mut self) {
        if matches!(self.state, TrackletState::Seeded | TrackletState::Extending) {
            self.state = if self.hits.len() > 2 {
                TrackletState::Extending
            } else {
                TrackletState::Seeded
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::seed_fit;
    use crate::fit::tests::{make_hit, on_line};

    fn seed() -> (Tracklet, Hit, Hit) {
        let a = on_line(0, 0, 100.0, 0.0, 0.0, 0.0);
        let b = on_line(1, 2, 300.0, 0.0, 0.0, 0.0);
        let fit = seed_fit(&a, &b).unwrap();
        (Tracklet::seeded(TrackId(0), &a, &b, fit), a, b)
    }

    #[test]
    fn test_seeded_tracklet() {
        let (trk, a, b) = seed();
        assert_eq!(trk.state(), TrackletState::Seeded);
        assert_eq!(trk.hit_count(), 2);
        assert_eq!(trk.station_hit(0), Some(a.id));
        assert_eq!(trk.station_hit(2), Some(b.id));
        assert!(trk.is_live());
    }

    #[test]
    fn test_insert_keeps_station_order_and_uniqueness() {
        let (mut trk, _, _) = seed();
        let middle = on_line(5, 1, 200.0, 0.0, 0.0, 0.0);
        assert!(trk.insert_hit(&middle, 0.7));
        let stations: Vec<u32> = trk.hits().iter().map(|h| h.station).collect();
        assert_eq!(stations, vec![0, 1, 2]);
        assert_eq!(trk.state(), TrackletState::Extending);

        let clash = make_hit(6, 1, 1.0, 0.0, 200.0, 0.0);
        assert!(!trk.insert_hit(&clash, 0.1));
        assert_eq!(trk.hit_count(), 3);
        assert!((trk.accumulated_match_score() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_remove_returns_to_seeded() {
        let (mut trk, _, _) = seed();
        let middle = on_line(5, 1, 200.0, 0.0, 0.0, 0.0);
        trk.insert_hit(&middle, 0.7);
        assert!(trk.remove_hit(middle.id).is_some());
        assert_eq!(trk.state(), TrackletState::Seeded);
        assert!(trk.remove_hit(middle.id).is_none());
    }

    #[test]
    fn test_discarded_state_sticks() {
        let (mut trk, _, _) = seed();
        trk.discard();
        let middle = on_line(5, 1, 200.0, 0.0, 0.0, 0.0);
        trk.insert_hit(&middle, 0.0);
        assert_eq!(trk.state(), TrackletState::Discarded);
        assert!(!trk.is_live());
    }
}
