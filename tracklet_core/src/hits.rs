//! Hit Model: calibrated, per-event detections and their claimed flags.
//!
//! Positions and times are fixed once [`HitStore::load`] returns. The only
//! state that changes during the search is `claimed_by`.

use crate::config::HitLoadOptions;
use crate::station::StationTable;
use crate::tracklet::TrackId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};
use tracklet_env::{Calibration, ChannelId, DetectorGeometry, LocalPoint, RawDetection};

/// Station slot used by the vertex pseudo-hit; it sorts after every real station.
pub const VERTEX_STATION: u32 = u32::MAX;

/// Index of a hit inside one event's [`HitStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HitId(pub u32);

impl HitId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for HitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "H{}", self.0)
    }
}

/// Where a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitOrigin {
    /// A real detection, with the caller's index and the channel that fired
    Detection { source_index: usize, channel: ChannelId },
    /// A beam-station detection moved to the origin; any number of tracks
    /// may share it
    Beam { source_index: usize, channel: ChannelId },
    /// The synthetic vertex point
    Vertex,
}

/// One calibrated detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: HitId,
    pub origin: HitOrigin,
    pub station: u32,

    /// Global position (cm)
    pub position: Vector3<f64>,

    /// Position uncertainty per axis (cm)
    pub position_sigma: Vector3<f64>,

    /// Time (ns)
    pub time: f64,

    /// Time uncertainty (ns)
    pub time_sigma: f64,

    /// Position in the cell's local frame
    pub local: LocalPoint,

    /// Result of the active-area test at load time
    pub in_active_area: bool,

    /// Tracklet currently owning this hit
    pub claimed_by: Option<TrackId>,
}

impl Hit {
    pub fn is_vertex(&self) -> bool {
        matches!(self.origin, HitOrigin::Vertex)
    }

    pub fn is_beam(&self) -> bool {
        matches!(self.origin, HitOrigin::Beam { .. })
    }

    /// Hits exempt from exclusive ownership: the vertex and beam points.
    pub fn is_shared(&self) -> bool {
        self.is_vertex() || self.is_beam()
    }

    /// Caller's index, `None` for the vertex point.
    pub fn source_index(&self) -> Option<usize> {
        match self.origin {
            HitOrigin::Detection { source_index, .. } | HitOrigin::Beam { source_index, .. } => {
                Some(source_index)
            }
            HitOrigin::Vertex => None,
        }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self.origin {
            HitOrigin::Detection { channel, .. } | HitOrigin::Beam { channel, .. } => Some(channel),
            HitOrigin::Vertex => None,
        }
    }
}

/// Arena of one event's hits, indexed by [`HitId`] and grouped by station.
#[derive(Debug, Clone, Default)]
pub struct HitStore {
    hits: Vec<Hit>,
    by_station: BTreeMap<u32, Vec<HitId>>,
    untracked: Vec<usize>,
}

impl HitStore {
    /// Builds the event's hits from raw detections.
    ///
    /// Applies the channel offset, takes sigmas from the channel resolution
    /// (defaults for unknown or zero components) and evaluates the active-area
    /// test once. A detection without a finite depth takes the depth of its
    /// channel's cell. Channels without geometry keep a zero local position so
    /// they still pass the test. Detections of stations outside `stations`
    /// are not searched; their caller indices are kept for the unused list.
    pub fn load<G, C>(
        detections: &[RawDetection],
        stations: &StationTable,
        geometry: &G,
        calibration: &C,
        options: &HitLoadOptions,
    ) -> Self
    where
        G: DetectorGeometry + ?Sized,
        C: Calibration + ?Sized,
    {
        let mut store = Self::default();

        for det in detections {
            if !stations.contains(det.station) {
                debug!(
                    "Detection {} on channel {} in unknown station {}, not tracked",
                    det.source_index, det.channel, det.station
                );
                store.untracked.push(det.source_index);
                continue;
            }

            let offset = calibration.offset(det.channel).unwrap_or_default();
            let resolution = match calibration.resolution(det.channel) {
                Some(res) => res.or_default(&options.default_resolution),
                None => {
                    trace!("No resolution for channel {}, using default", det.channel);
                    options.default_resolution
                }
            };

            let mut position = det.position + Vector3::new(offset.dx, offset.dy, offset.dz);
            if !position.z.is_finite() {
                match geometry.z_of(det.channel) {
                    Some(z) => position.z = z + offset.dz,
                    None => debug!(
                        "Detection {} on channel {} has no depth and no geometry",
                        det.source_index, det.channel
                    ),
                }
            }
            let mut position_sigma =
                Vector3::new(resolution.sigma_x, resolution.sigma_y, resolution.sigma_z);

            let local = geometry.local_xy(det.channel, &position).unwrap_or_else(|| {
                trace!("No geometry for channel {}, local position set to zero", det.channel);
                LocalPoint::default()
            });
            let in_active_area =
                geometry.active_area_test(det.channel, local, options.active_area_scale);

            let origin = if options.beam_station == Some(det.station) {
                position = Vector3::zeros();
                position_sigma = Vector3::new(1.0, 1.0, 1.0);
                HitOrigin::Beam {
                    source_index: det.source_index,
                    channel: det.channel,
                }
            } else {
                HitOrigin::Detection {
                    source_index: det.source_index,
                    channel: det.channel,
                }
            };

            store.push(Hit {
                id: HitId(0),
                origin,
                station: det.station,
                position,
                position_sigma,
                time: det.time + offset.dt,
                time_sigma: resolution.sigma_t,
                local,
                in_active_area,
                claimed_by: None,
            });
        }

        debug!(
            "Loaded {} hits in {} stations ({} untracked)",
            store.hits.len(),
            store.by_station.len(),
            store.untracked.len()
        );
        store
    }

    /// Appends a hit, assigning its id.
    pub(crate) fn push(&mut self, mut hit: Hit) -> HitId {
        let id = HitId(self.hits.len() as u32);
        hit.id = id;
        self.by_station.entry(hit.station).or_default().push(id);
        self.hits.push(hit);
        id
    }

    /// Adds the synthetic vertex point.
    pub(crate) fn push_vertex(
        &mut self,
        position: Vector3<f64>,
        position_sigma: Vector3<f64>,
        time: f64,
        time_sigma: f64,
    ) -> HitId {
        self.push(Hit {
            id: HitId(0),
            origin: HitOrigin::Vertex,
            station: VERTEX_STATION,
            position,
            position_sigma,
            time,
            time_sigma,
            local: LocalPoint::default(),
            in_active_area: true,
            claimed_by: None,
        })
    }

    #[inline]
    pub fn get(&self, id: HitId) -> &Hit {
        &self.hits[id.index()]
    }

    pub fn mark_claimed(&mut self, id: HitId, track: TrackId) {
        self.hits[id.index()].claimed_by = Some(track);
    }

    pub fn mark_unclaimed(&mut self, id: HitId) {
        self.hits[id.index()].claimed_by = None;
    }

    pub(crate) fn clear_claims(&mut self) {
        for hit in &mut self.hits {
            hit.claimed_by = None;
        }
    }

    pub fn is_claimed(&self, id: HitId) -> bool {
        self.hits[id.index()].claimed_by.is_some()
    }

    pub fn claimed_by(&self, id: HitId) -> Option<TrackId> {
        self.hits[id.index()].claimed_by
    }

    /// Hits of one station, in load order.
    pub fn station_hits(&self, station: u32) -> &[HitId] {
        self.by_station
            .get(&station)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Hit count per station, vertex excluded.
    pub fn station_multiplicity(&self) -> BTreeMap<u32, usize> {
        self.by_station
            .iter()
            .filter(|(station, _)| **station != VERTEX_STATION)
            .map(|(station, ids)| (*station, ids.len()))
            .collect()
    }

    /// Caller indices of detections that were not searched.
    pub fn untracked(&self) -> &[usize] {
        &self.untracked
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
