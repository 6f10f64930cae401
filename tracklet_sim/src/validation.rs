//! Reconstruction quality against the oracle's truth labels, and the
//! structural invariants every finder output must satisfy.

use crate::oracle::SimEvent;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracklet_core::{EventResult, FinderConfig};

/// Fraction of a track's hits that must come from one particle for the
/// track to count as that particle's reconstruction.
pub const MATCH_FRACTION: f64 = 0.7;

/// Efficiency, ghost rate and purity of one or more events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionQuality {
    /// Particles with at least `min_hits` detections in distinct stations
    pub reconstructable: usize,
    /// Reconstructable particles matched by a track
    pub found: usize,
    pub tracks: usize,
    /// Tracks with no majority particle
    pub ghosts: usize,
    /// Sum over tracks of the majority-particle hit fraction
    pub purity_sum: f64,
}

impl ReconstructionQuality {
    pub fn efficiency(&self) -> f64 {
        if self.reconstructable == 0 {
            1.0
        } else {
            self.found as f64 / self.reconstructable as f64
        }
    }

    pub fn ghost_rate(&self) -> f64 {
        if self.tracks == 0 {
            0.0
        } else {
            self.ghosts as f64 / self.tracks as f64
        }
    }

    pub fn purity(&self) -> f64 {
        if self.tracks == 0 {
            1.0
        } else {
            self.purity_sum / self.tracks as f64
        }
    }

    pub fn merge(&mut self, other: &ReconstructionQuality) {
        self.reconstructable += other.reconstructable;
        self.found += other.found;
        self.tracks += other.tracks;
        self.ghosts += other.ghosts;
        self.purity_sum += other.purity_sum;
    }
}

/// Scores one event's tracks against its truth.
pub fn evaluate(event: &SimEvent, result: &EventResult, min_hits: usize) -> ReconstructionQuality {
    let mut quality = ReconstructionQuality::default();

    let mut stations_hit: HashMap<usize, HashSet<u32>> = HashMap::new();
    for (det, truth) in event.detections.iter().zip(&event.truth) {
        if let Some(p) = truth {
            stations_hit.entry(*p).or_default().insert(det.station);
        }
    }
    let reconstructable: HashSet<usize> = stations_hit
        .iter()
        .filter(|(_, s)| s.len() >= min_hits)
        .map(|(&p, _)| p)
        .collect();
    quality.reconstructable = reconstructable.len();

    let mut matched = HashSet::new();
    for track in &result.tracks {
        quality.tracks += 1;
        let indices = track.source_indices();
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for &i in &indices {
            if let Some(Some(p)) = event.truth.get(i) {
                *counts.entry(*p).or_default() += 1;
            }
        }
        let best = counts.iter().max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)));
        let fraction = match (best, indices.len()) {
            (Some((_, &n)), total) if total > 0 => n as f64 / total as f64,
            _ => 0.0,
        };
        quality.purity_sum += fraction;
        match best {
            Some((&p, _)) if fraction >= MATCH_FRACTION => {
                if reconstructable.contains(&p) {
                    matched.insert(p);
                }
            }
            _ => quality.ghosts += 1,
        }
    }
    quality.found = matched.len();
    quality
}

/// Checks ownership, station uniqueness and minimality of an event result.
/// Beam-station hits may be shared between tracks.
pub fn check_invariants(result: &EventResult, config: &FinderConfig) -> Result<(), String> {
    let mut owner: HashMap<usize, usize> = HashMap::new();
    let mut beam_used = HashSet::new();
    for (k, track) in result.tracks.iter().enumerate() {
        for hit in track.hits.iter().filter(|h| h.is_beam()) {
            beam_used.extend(hit.source_index());
        }
        let exclusive = track.hits.iter().filter(|h| !h.is_shared());
        for index in exclusive.filter_map(|h| h.source_index()) {
            if let Some(other) = owner.insert(index, k) {
                return Err(format!(
                    "detection {} shared by tracks {} and {}",
                    index, result.tracks[other].id, track.id
                ));
            }
        }

        let stations = track.stations();
        let distinct: HashSet<u32> = stations.iter().copied().collect();
        if distinct.len() != stations.len() {
            return Err(format!("track {} repeats a station", track.id));
        }
        if track.detection_count() < config.min_hits {
            return Err(format!(
                "track {} has {} hits, minimum is {}",
                track.id,
                track.detection_count(),
                config.min_hits
            ));
        }
        if track.chi2() > config.chi2_max {
            return Err(format!("track {} chi2 {:.3} over ceiling", track.id, track.chi2()));
        }
    }

    for index in &result.unused_hits {
        if owner.contains_key(index) || beam_used.contains(index) {
            return Err(format!("detection {} is both used and unused", index));
        }
    }
    Ok(())
}
