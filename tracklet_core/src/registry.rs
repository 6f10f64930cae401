//! Hit <-> tracklet ownership registry.
//!
//! Tracklets live in an index-stable arena and are never removed during an
//! event; invalidated ones are marked [`TrackletState::Discarded`] and
//! skipped. The per-hit index answers "who else references this hit"
//! without scanning every tracklet.
//!
//! A hit counts as claimed while it belongs to a live tracklet that has
//! grown beyond its two seed hits.

use crate::fit::TrajectoryFit;
use crate::hits::{HitId, HitStore};
use crate::tracklet::{TrackId, Tracklet, TrackletState};
use tracing::trace;

/// Tracklet arena plus the per-hit reverse index.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: Vec<Tracklet>,
    hit_tracks: Vec<Vec<TrackId>>,
}

impl TrackRegistry {
    /// Creates an empty registry for an event with `hit_count` hits.
    pub fn new(hit_count: usize) -> Self {
        Self {
            tracks: Vec::new(),
            hit_tracks: vec![Vec::new(); hit_count],
        }
    }

    // ========================================================================
    // INDEX OPERATIONS
    // ========================================================================

    fn link(&mut self, hit: HitId, track: TrackId) {
        if hit.index() >= self.hit_tracks.len() {
            self.hit_tracks.resize(hit.index() + 1, Vec::new());
        }
        let entry = &mut self.hit_tracks[hit.index()];
        if !entry.contains(&track) {
            entry.push(track);
        }
    }

    fn unlink(&mut self, hit: HitId, track: TrackId) {
        if let Some(entry) = self.hit_tracks.get_mut(hit.index()) {
            entry.retain(|t| *t != track);
        }
    }

    /// Tracklets currently referencing `hit`, in registration order.
    pub fn tracks_of(&self, hit: HitId) -> &[TrackId] {
        self.hit_tracks
            .get(hit.index())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    // ========================================================================
    // ARENA ACCESS
    // ========================================================================

    pub fn track(&self, id: TrackId) -> &Tracklet {
        &self.tracks[id.index()]
    }

    pub(crate) fn track_mut(&mut self, id: TrackId) -> &mut Tracklet {
        &mut self.tracks[id.index()]
    }

    pub fn is_live(&self, id: TrackId) -> bool {
        self.tracks
            .get(id.index())
            .map(|t| t.is_live())
            .unwrap_or(false)
    }

    /// Ids of live tracklets, ascending.
    pub fn live_ids(&self) -> Vec<TrackId> {
        self.tracks
            .iter()
            .filter(|t| t.is_live())
            .map(|t| t.id)
            .collect()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Tracklet> {
        self.tracks.iter()
    }

    pub fn live_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    // ========================================================================
    // MUTATORS
    // ========================================================================

    /// Registers a new two-hit seed.
    pub(crate) fn create_seed(
        &mut self,
        hits: &HitStore,
        first: HitId,
        second: HitId,
        fit: TrajectoryFit,
    ) -> TrackId {
        let id = TrackId(self.tracks.len() as u32);
        self.tracks
            .push(Tracklet::seeded(id, hits.get(first), hits.get(second), fit));
        self.link(first, id);
        self.link(second, id);
        trace!("Seed {} from {} + {}", id, first, second);
        id
    }

    /// Adds `hit` to `track` and registers the link. Once the tracklet holds
    /// more than two hits all of its detections are claimed by it.
    ///
    /// Returns false (and changes nothing) if the tracklet is dead or its
    /// station slot is taken.
    pub fn commit(&mut self, hits: &mut HitStore, hit: HitId, track: TrackId, score: f64) -> bool {
        if !self.is_live(track) {
            return false;
        }
        if !self.tracks[track.index()].insert_hit(hits.get(hit), score) {
            return false;
        }
        self.link(hit, track);
        self.sync_claims(hits, track);
        true
    }

    /// Removes `hit` from `track` and drops the link. Claims the tracklet no
    /// longer justifies are released.
    pub fn release(&mut self, hits: &mut HitStore, hit: HitId, track: TrackId) {
        if self.tracks[track.index()].remove_hit(hit).is_some() {
            self.unlink(hit, track);
            if hits.claimed_by(hit) == Some(track) {
                hits.mark_unclaimed(hit);
            }
            self.sync_claims(hits, track);
        }
    }

    /// Marks `track` dead and unregisters all of its hits.
    pub fn invalidate(&mut self, hits: &mut HitStore, track: TrackId) {
        let members: Vec<HitId> = self.tracks[track.index()].hit_ids().collect();
        for hit in members {
            self.unlink(hit, track);
            if hits.claimed_by(hit) == Some(track) {
                hits.mark_unclaimed(hit);
            }
        }
        self.tracks[track.index()].discard();
        trace!("Invalidated {}", track);
    }

    fn sync_claims(&self, hits: &mut HitStore, track: TrackId) {
        let tracklet = &self.tracks[track.index()];
        let extended = tracklet.is_live() && tracklet.hit_count() > 2;
        for hit in tracklet.hit_ids() {
            if hits.get(hit).is_shared() {
                continue;
            }
            if extended {
                hits.mark_claimed(hit, track);
            } else if hits.claimed_by(hit) == Some(track) {
                hits.mark_unclaimed(hit);
            }
        }
    }

    /// Checks that the reverse index mirrors tracklet membership exactly.
    pub fn is_consistent(&self) -> bool {
        for tracklet in &self.tracks {
            for hit in tracklet.hit_ids() {
                let linked = self.tracks_of(hit).contains(&tracklet.id);
                if tracklet.is_live() != linked {
                    return false;
                }
            }
        }
        self.hit_tracks.iter().enumerate().all(|(hit, ids)| {
            ids.iter().all(|id| {
                let t = &self.tracks[id.index()];
                t.is_live() && t.contains_hit(HitId(hit as u32))
            })
        })
    }

    /// Number of tracklets in each lifecycle state.
    pub fn state_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for t in &self.tracks {
            let slot = match t.state() {
                TrackletState::Seeded => 0,
                TrackletState::Extending => 1,
                TrackletState::Accepted => 2,
                TrackletState::Discarded => 3,
            };
            counts[slot] += 1;
        }
        counts
    }
}
