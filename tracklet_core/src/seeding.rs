//! Seed Generator: two-hit tracklet candidates from one station pair.

use crate::config::FinderConfig;
use crate::fit::{seed_fit, TrajectoryFit};
use crate::hits::{Hit, HitId, HitStore};
use tracing::trace;

/// A hit pair that passed every seed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedCandidate {
    pub first: HitId,
    pub second: HitId,
    pub fit: TrajectoryFit,
}

/// Why a hit pair was not seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedRejection {
    Claimed,
    OutsideActiveArea,
    SameDepth,
    TimeWindow,
    SlopeX,
    SlopeY,
}

/// Applies the seed windows to one hit pair.
pub fn check_pair(config: &FinderConfig, h0: &Hit, h1: &Hit) -> Result<TrajectoryFit, SeedRejection> {
    let taken = |h: &Hit| h.claimed_by.is_some() && !h.is_shared();
    if taken(h0) || taken(h1) {
        return Err(SeedRejection::Claimed);
    }
    if !h0.in_active_area || !h1.in_active_area {
        return Err(SeedRejection::OutsideActiveArea);
    }

    let dz = h1.position.z - h0.position.z;
    if dz.abs() < f64::EPSILON {
        return Err(SeedRejection::SameDepth);
    }
    let dt = h1.time - h0.time;
    let tx = (h1.position.x - h0.position.x) / dz;
    let ty = (h1.position.y - h0.position.y) / dz;

    if (dt / dz).abs() >= config.max_time_per_depth {
        return Err(SeedRejection::TimeWindow);
    }
    if (tx - config.tx_mean).abs() >= config.tx_limit {
        return Err(SeedRejection::SlopeX);
    }
    if (ty - config.ty_mean).abs() >= config.ty_limit {
        return Err(SeedRejection::SlopeY);
    }

    seed_fit(h0, h1).map_err(|_| SeedRejection::SameDepth)
}

/// Enumerates every accepted (h0 in `s0`, h1 in `s1`) pair in hit order.
pub fn seed_station_pair(
    config: &FinderConfig,
    hits: &HitStore,
    s0: u32,
    s1: u32,
) -> Vec<SeedCandidate> {
    let mut seeds = Vec::new();
    for &first in hits.station_hits(s0) {
        let h0 = hits.get(first);
        if (h0.claimed_by.is_some() && !h0.is_shared()) || !h0.in_active_area {
            continue;
        }
        for &second in hits.station_hits(s1) {
            match check_pair(config, h0, hits.get(second)) {
                Ok(fit) => seeds.push(SeedCandidate { first, second, fit }),
                Err(reason) => trace!("Pair {}/{} rejected: {:?}", first, second, reason),
            }
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::tests::{make_hit, on_line};
    use crate::tracklet::TrackId;

    fn store(hits: Vec<Hit>) -> HitStore {
        let mut store = HitStore::default();
        for hit in hits {
            store.push(hit);
        }
        store
    }

    #[test]
    fn test_straight_pair_is_seeded() {
        let config = FinderConfig::default();
        let hits = store(vec![
            on_line(0, 0, 100.0, 0.1, 0.0, 0.0),
            on_line(1, 1, 200.0, 0.1, 0.0, 0.0),
        ]);
        let seeds = seed_station_pair(&config, &hits, 0, 1);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].first, HitId(0));
        assert_eq!(seeds[0].second, HitId(1));
    }

    #[test]
    fn test_time_window() {
        let config = FinderConfig {
            max_time_per_depth: 0.05,
            ..Default::default()
        };
        let a = make_hit(0, 0, 0.0, 0.0, 100.0, 0.0);
        let fast = make_hit(1, 1, 0.0, 0.0, 200.0, 3.4);
        let slow = make_hit(2, 1, 0.0, 0.0, 200.0, 6.0);
        assert!(check_pair(&config, &a, &fast).is_ok());
        assert_eq!(check_pair(&config, &a, &slow), Err(SeedRejection::TimeWindow));
    }

    #[test]
    fn test_slope_bands_around_mean() {
        let config = FinderConfig {
            tx_mean: 0.2,
            tx_limit: 0.1,
            ty_limit: 0.1,
            ..Default::default()
        };
        let a = make_hit(0, 0, 0.0, 0.0, 100.0, 0.0);
        let in_band = make_hit(1, 1, 25.0, 0.0, 200.0, 3.4);
        let off_x = make_hit(2, 1, 0.0, 0.0, 200.0, 3.4);
        let off_y = make_hit(3, 1, 25.0, 15.0, 200.0, 3.4);
        assert!(check_pair(&config, &a, &in_band).is_ok());
        assert_eq!(check_pair(&config, &a, &off_x), Err(SeedRejection::SlopeX));
        assert_eq!(check_pair(&config, &a, &off_y), Err(SeedRejection::SlopeY));
    }

    #[test]
    fn test_inactive_and_claimed_hits_never_seed() {
        let config = FinderConfig::default();
        let a = on_line(0, 0, 100.0, 0.0, 0.0, 0.0);
        let mut b = on_line(1, 1, 200.0, 0.0, 0.0, 0.0);
        b.in_active_area = false;
        assert_eq!(check_pair(&config, &a, &b), Err(SeedRejection::OutsideActiveArea));

        let mut c = on_line(2, 1, 200.0, 0.0, 0.0, 0.0);
        c.claimed_by = Some(TrackId(0));
        assert_eq!(check_pair(&config, &a, &c), Err(SeedRejection::Claimed));
    }

    #[test]
    fn test_all_combinations_enumerated() {
        let config = FinderConfig::default();
        let hits = store(vec![
            on_line(0, 0, 100.0, 0.0, 0.0, 0.0),
            on_line(1, 0, 100.0, 0.05, 0.0, 0.0),
            on_line(2, 1, 200.0, 0.0, 0.0, 0.0),
            on_line(3, 1, 200.0, 0.05, 0.0, 0.0),
        ]);
        let seeds = seed_station_pair(&config, &hits, 0, 1);
        let pairs: Vec<(u32, u32)> = seeds.iter().map(|s| (s.first.0, s.second.0)).collect();
        assert_eq!(pairs, vec![(0, 2), (0, 3), (1, 2), (1, 3)]);
    }
}
