//! Propagator/Matcher: scores (tracklet, hit) pairs for one station and
//! keeps the best of them in a bounded ranked list.

use crate::config::FinderConfig;
use crate::fit::match_score;
use crate::hits::{HitId, HitStore};
use crate::registry::TrackRegistry;
use crate::station::StationResolution;
use crate::tracklet::TrackId;
use std::cmp::Ordering;

/// A scored (tracklet, hit) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub track: TrackId,
    pub hit: HitId,
    pub score: f64,
}

impl MatchCandidate {
    /// Ranking order: lower score first, ties broken by lower hit index and
    /// then lower track id.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.hit.cmp(&other.hit))
            .then(self.track.cmp(&other.track))
    }
}

/// Score-ordered candidate list holding at most `capacity` entries.
///
/// When full, a new entry displaces the current worst one; an entry worse
/// than everything already held is dropped.
#[derive(Debug, Clone)]
pub struct RankedMatches {
    // Worst first, so the best entry pops off the end.
    entries: Vec<MatchCandidate>,
    capacity: usize,
    truncated: usize,
}

impl RankedMatches {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            truncated: 0,
        }
    }

    /// Offers a candidate. Returns false if it did not make the list.
    pub fn offer(&mut self, candidate: MatchCandidate) -> bool {
        let pos = self
            .entries
            .partition_point(|e| e.rank_cmp(&candidate) == Ordering::Greater);
        if self.entries.len() >= self.capacity && pos == 0 {
            self.truncated += 1;
            return false;
        }
        self.entries.insert(pos, candidate);
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
            self.truncated += 1;
        }
        true
    }

    /// Removes and returns the best entry.
    pub fn pop_best(&mut self) -> Option<MatchCandidate> {
        self.entries.pop()
    }

    pub fn peek_best(&self) -> Option<&MatchCandidate> {
        self.entries.last()
    }

    pub fn retain(&mut self, keep: impl FnMut(&MatchCandidate) -> bool) {
        self.entries.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries lost to the capacity bound so far.
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    /// Entries from best to worst.
    pub fn iter_ranked(&self) -> impl Iterator<Item = &MatchCandidate> {
        self.entries.iter().rev()
    }
}

/// Scores every live tracklet without a hit in `station` against every
/// unclaimed, active hit of that station.
pub fn collect_matches(
    config: &FinderConfig,
    resolution: &StationResolution,
    hits: &HitStore,
    registry: &TrackRegistry,
    station: u32,
) -> RankedMatches {
    let mut ranked = RankedMatches::with_capacity(config.max_candidates);
    let station_hits = hits.station_hits(station);
    if station_hits.is_empty() {
        return ranked;
    }

    for id in registry.live_ids() {
        let tracklet = registry.track(id);
        if tracklet.station_hit(station).is_some() {
            continue;
        }
        let ceiling = config.match_ceiling(tracklet.hit_count());
        for &hit_id in station_hits {
            let hit = hits.get(hit_id);
            if (hit.claimed_by.is_some() && !hit.is_shared()) || !hit.in_active_area {
                continue;
            }
            let score = match_score(tracklet.fit(), hit, resolution);
            if score < ceiling {
                ranked.offer(MatchCandidate {
                    track: id,
                    hit: hit_id,
                    score,
                });
            }
        }
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::seed_fit;
    use crate::fit::tests::on_line;
    use crate::hits::Hit;

    fn cand(track: u32, hit: u32, score: f64) -> MatchCandidate {
        MatchCandidate {
            track: TrackId(track),
            hit: HitId(hit),
            score,
        }
    }

    #[test]
    fn test_pop_order_is_ascending_score() {
        let mut ranked = RankedMatches::with_capacity(10);
        ranked.offer(cand(0, 0, 2.0));
        ranked.offer(cand(1, 1, 0.5));
        ranked.offer(cand(2, 2, 1.0));
        let scores: Vec<f64> = std::iter::from_fn(|| ranked.pop_best()).map(|c| c.score).collect();
        assert_eq!(scores, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_ties_broken_by_hit_then_track() {
        let mut ranked = RankedMatches::with_capacity(10);
        ranked.offer(cand(3, 5, 1.0));
        ranked.offer(cand(1, 5, 1.0));
        ranked.offer(cand(0, 7, 1.0));
        ranked.offer(cand(9, 2, 1.0));
        let order: Vec<(u32, u32)> = ranked.iter_ranked().map(|c| (c.hit.0, c.track.0)).collect();
        assert_eq!(order, vec![(2, 9), (5, 1), (5, 3), (7, 0)]);
    }

    #[test]
    fn test_capacity_keeps_best() {
        let mut ranked = RankedMatches::with_capacity(2);
        assert!(ranked.offer(cand(0, 0, 3.0)));
        assert!(ranked.offer(cand(1, 1, 1.0)));
        // Worse than everything in a full list
        assert!(!ranked.offer(cand(2, 2, 5.0)));
        // Displaces the 3.0 entry
        assert!(ranked.offer(cand(3, 3, 2.0)));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked.truncated(), 2);
        let scores: Vec<f64> = ranked.iter_ranked().map(|c| c.score).collect();
        assert_eq!(scores, vec![1.0, 2.0]);
    }

    #[test]
    fn test_collect_skips_occupied_station_and_bad_scores() {
        let config = FinderConfig::default();
        let mut hits = HitStore::default();
        for hit in [
            on_line(0, 0, 100.0, 0.0, 0.0, 0.0),
            on_line(1, 1, 200.0, 0.0, 0.0, 0.0),
            on_line(2, 2, 300.0, 0.0, 0.0, 0.0),
            on_line(3, 2, 300.0, 0.3, 0.0, 0.0),
        ] {
            hits.push(hit);
        }
        let mut registry = TrackRegistry::new(hits.len());
        let fit = seed_fit(hits.get(HitId(0)), hits.get(HitId(1))).unwrap();
        let t = registry.create_seed(&hits, HitId(0), HitId(1), fit);

        let res = StationResolution::new(0.08, 1.0, 1.0);
        let ranked = collect_matches(&config, &res, &hits, &registry, 2);
        // Hit 3 is 90 cm off in x
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked.peek_best().map(|c| (c.track, c.hit)), Some((t, HitId(2))));

        // Station 1 is already filled on the only tracklet
        assert!(collect_matches(&config, &res, &hits, &registry, 1).is_empty());
    }

    #[test]
    fn test_collect_ignores_inactive_hits() {
        let config = FinderConfig::default();
        let mut hits = HitStore::default();
        let mut outside: Hit = on_line(2, 2, 300.0, 0.0, 0.0, 0.0);
        outside.in_active_area = false;
        for hit in [
            on_line(0, 0, 100.0, 0.0, 0.0, 0.0),
            on_line(1, 1, 200.0, 0.0, 0.0, 0.0),
            outside,
        ] {
            hits.push(hit);
        }
        let mut registry = TrackRegistry::new(hits.len());
        let fit = seed_fit(hits.get(HitId(0)), hits.get(HitId(1))).unwrap();
        registry.create_seed(&hits, HitId(0), HitId(1), fit);

        let res = StationResolution::new(0.08, 1.0, 1.0);
        assert!(collect_matches(&config, &res, &hits, &registry, 2).is_empty());
    }
}
