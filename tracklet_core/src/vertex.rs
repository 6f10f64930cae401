//! Vertex handling.
//!
//! Two related estimates live here. [`estimate_vertex`] builds the
//! synthetic pseudo-hit that is offered to live tracklets converging near
//! the nominal interaction point. [`EventVertex`] summarises the finalized
//! tracks of an event by their weighted extrapolation to the depth origin.

use crate::config::{VertexConfig, VertexPlacement};
use crate::fit::TrajectoryFit;
use crate::registry::TrackRegistry;
use crate::tracklet::TrackId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Depth sigma assigned to the pseudo-hit. The spatial fit only uses x and y.
const VERTEX_Z_SIGMA: f64 = 0.1;

/// The vertex pseudo-hit before it enters the hit store.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexEstimate {
    pub position: Vector3<f64>,
    pub position_sigma: Vector3<f64>,
    pub time: f64,
    pub time_sigma: f64,
    /// Tracklets that qualified, ascending id.
    pub contributors: Vec<TrackId>,
}

/// Averages the origin extrapolation of every live tracklet that passes
/// within `proximity_limit` of the beam axis.
///
/// Returns `None` when fewer than two tracklets are live, too few qualify,
/// or their extrapolated times disagree by `max_time_spread` or more.
pub fn estimate_vertex(config: &VertexConfig, registry: &TrackRegistry) -> Option<VertexEstimate> {
    if registry.live_count() < 2 {
        return None;
    }

    let contributors: Vec<TrackId> = registry
        .live_ids()
        .into_iter()
        .filter(|&id| registry.track(id).fit().origin_radius() < config.proximity_limit)
        .collect();
    let n = contributors.len();
    if n < config.min_tracks.max(1) {
        debug!("Vertex: {} tracklets near origin, {} required", n, config.min_tracks);
        return None;
    }

    let fits: Vec<&TrajectoryFit> = contributors
        .iter()
        .map(|&id| registry.track(id).fit())
        .collect();
    let times: Vec<f64> = fits.iter().map(|f| f.predict_time_at_depth(0.0)).collect();

    // Accumulate relative to the first time to keep the sums small
    let offset = times[0];
    let mean_time = offset + times.iter().map(|t| t - offset).sum::<f64>() / n as f64;
    let (t_min, t_max) = times
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
    if t_max - t_min >= config.max_time_spread {
        debug!("Vertex: time spread {:.3} ns too large", t_max - t_min);
        return None;
    }

    let origins: Vec<(f64, f64)> = fits.iter().map(|f| f.predict(0.0)).collect();
    let (cx, cy) = match config.placement {
        VertexPlacement::Fitted => {
            let sx: f64 = origins.iter().map(|o| o.0).sum();
            let sy: f64 = origins.iter().map(|o| o.1).sum();
            (sx / n as f64, sy / n as f64)
        }
        VertexPlacement::Origin => (0.0, 0.0),
    };

    let rms = |values: &mut dyn Iterator<Item = f64>, center: f64| -> f64 {
        let sq: f64 = values.map(|v| (v - center) * (v - center)).sum();
        (sq / n as f64).sqrt()
    };
    let mut sigma_x = rms(&mut origins.iter().map(|o| o.0), cx);
    let mut sigma_y = rms(&mut origins.iter().map(|o| o.1), cy);
    let mut sigma_t = rms(&mut times.iter().copied(), mean_time);
    if config.scale_sigma_by_tracks {
        sigma_x /= n as f64;
        sigma_y /= n as f64;
        sigma_t /= n as f64;
    }

    Some(VertexEstimate {
        position: Vector3::new(cx, cy, 0.0),
        position_sigma: Vector3::new(
            sigma_x.max(config.min_position_sigma),
            sigma_y.max(config.min_position_sigma),
            VERTEX_Z_SIGMA,
        ),
        time: mean_time,
        time_sigma: sigma_t.max(config.min_time_sigma),
        contributors,
    })
}

// ============================================================================
// EVENT VERTEX
// ============================================================================

/// Detection-count weighted mean of the finalized tracks' origin extrapolation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventVertex {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    /// Sum of weights.
    pub norm: f64,
}

impl EventVertex {
    /// Combines `(fit, detection_count)` pairs, ignoring tracks below `min_hits`.
    pub fn estimate<'a>(
        tracks: impl IntoIterator<Item = (&'a TrajectoryFit, usize)>,
        min_hits: usize,
    ) -> Option<Self> {
        let mut acc = EventVertex {
            time: 0.0,
            x: 0.0,
            y: 0.0,
            norm: 0.0,
        };
        for (fit, count) in tracks {
            if count < min_hits {
                continue;
            }
            let w = count as f64;
            let (x, y) = fit.predict(0.0);
            acc.time += w * fit.predict_time_at_depth(0.0);
            acc.x += w * x;
            acc.y += w * y;
            acc.norm += w;
        }
        if acc.norm <= 0.0 {
            return None;
        }
        acc.time /= acc.norm;
        acc.x /= acc.norm;
        acc.y /= acc.norm;
        Some(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::fit_trajectory;
    use crate::fit::tests::on_line;
    use crate::hits::{Hit, HitId, HitStore};
    use approx::assert_relative_eq;

    /// One three-hit tracklet per (tx, ty, t0) triple.
    fn registry_with(lines: &[(f64, f64, f64)]) -> (HitStore, TrackRegistry) {
        let mut hits = HitStore::default();
        let mut ids = Vec::new();
        for (k, &(tx, ty, t0)) in lines.iter().enumerate() {
            let base = (k * 3) as u32;
            let group: Vec<HitId> = (0..3)
                .map(|i| hits.push(on_line(base + i, i, 100.0 * (i + 1) as f64, tx, ty, t0)))
                .collect();
            ids.push(group);
        }
        let mut registry = TrackRegistry::new(hits.len());
        for group in ids {
            let refs: Vec<&Hit> = group[..2].iter().map(|&h| hits.get(h)).collect();
            let fit = fit_trajectory(&refs, None).unwrap();
            let t = registry.create_seed(&hits, group[0], group[1], fit);
            registry.commit(&mut hits, group[2], t, 0.0);
            let refs: Vec<&Hit> = group.iter().map(|&h| hits.get(h)).collect();
            let fit = fit_trajectory(&refs, None).unwrap();
            registry.track_mut(t).set_fit(fit);
        }
        (hits, registry)
    }

    fn enabled() -> VertexConfig {
        VertexConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_vertex_needs_two_live_tracks() {
        let (_, registry) = registry_with(&[(0.1, 0.0, 1.0)]);
        assert!(estimate_vertex(&enabled(), &registry).is_none());
    }

    #[test]
    fn test_vertex_averages_time_at_origin() {
        let (_, registry) = registry_with(&[(0.1, 0.0, 1.0), (-0.05, 0.02, 1.4)]);
        let vertex = estimate_vertex(&enabled(), &registry).unwrap();

        assert_eq!(vertex.contributors, vec![TrackId(0), TrackId(1)]);
        assert_relative_eq!(vertex.time, 1.2, epsilon = 1e-6);
        assert_relative_eq!(vertex.position.x, 0.0, epsilon = 1e-6);
        // Both lines pass through the origin, so the floor applies
        assert_relative_eq!(vertex.position_sigma.x, 0.1);
        assert_relative_eq!(vertex.time_sigma, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_vertex_rejects_time_spread() {
        let config = VertexConfig {
            max_time_spread: 0.3,
            ..enabled()
        };
        let (_, registry) = registry_with(&[(0.1, 0.0, 1.0), (-0.05, 0.0, 1.5)]);
        assert!(estimate_vertex(&config, &registry).is_none());
    }

    #[test]
    fn test_vertex_min_tracks() {
        let config = VertexConfig {
            min_tracks: 3,
            ..enabled()
        };
        let (_, registry) = registry_with(&[(0.1, 0.0, 1.0), (-0.05, 0.0, 1.0)]);
        assert!(estimate_vertex(&config, &registry).is_none());
    }

    #[test]
    fn test_event_vertex_weighting() {
        let (_, registry) = registry_with(&[(0.1, 0.0, 1.0), (-0.05, 0.0, 4.0)]);
        let a = registry.track(TrackId(0)).fit();
        let b = registry.track(TrackId(1)).fit();

        let vertex = EventVertex::estimate([(a, 3), (b, 6)], 3).unwrap();
        assert_relative_eq!(vertex.norm, 9.0);
        assert_relative_eq!(vertex.time, (3.0 + 24.0) / 9.0, epsilon = 1e-6);

        // Below the minimum the track is ignored
        let vertex = EventVertex::estimate([(a, 3), (b, 2)], 3).unwrap();
        assert_relative_eq!(vertex.time, 1.0, epsilon = 1e-6);
        assert!(EventVertex::estimate([(a, 2)], 3).is_none());
    }
}
