//! Trajectory Fitter: straight-line spatial fit and time-vs-path fit.
//!
//! Both fits are closed-form weighted least squares, so every function here
//! is stateless. The spatial part is two independent regressions x(z) and
//! y(z). The temporal part fits `t = t0 + tt * R`, where `R` is the signed
//! path length measured from the z = 0 plane through the first hit.

use crate::hits::Hit;
use crate::station::StationResolution;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Constant subtracted from all times before accumulating the time fit
/// sums, relative to the first hit.
const TIME_FIT_OFFSET: f64 = 10.0;

/// Below this weighted z variance (cm^2) the depth baseline counts as zero.
const MIN_DEPTH_SPREAD: f64 = 1e-12;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors from the fitter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Fewer than two usable points, or no usable baseline between them
    #[error("Insufficient hits for fit: {usable} usable")]
    InsufficientHits { usable: usize },
}

// ============================================================================
// FIT RESULTS
// ============================================================================

/// Straight line `x = x0 + tx (z - z_ref)`, `y = y0 + ty (z - z_ref)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialFit {
    pub x0: f64,
    pub y0: f64,
    pub z_ref: f64,
    pub tx: f64,
    pub ty: f64,

    /// Weighted residual sum of squares divided by `ndf` (0 when `ndf <= 0`)
    pub chi2: f64,

    /// `2 * points - 4`
    pub ndf: i32,
}

impl SpatialFit {
    /// Transverse position of the line at depth `z`.
    #[inline]
    pub fn predict(&self, z: f64) -> (f64, f64) {
        (
            self.x0 + self.tx * (z - self.z_ref),
            self.y0 + self.ty * (z - self.z_ref),
        )
    }

    /// Path length per unit depth, `sqrt(1 + tx^2 + ty^2)`.
    #[inline]
    pub fn slope_norm(&self) -> f64 {
        (1.0 + self.tx * self.tx + self.ty * self.ty).sqrt()
    }
}

/// Time along the track: `t = t0 + tt * R`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalFit {
    /// Time at path length zero (ns)
    pub t0: f64,

    /// Inverse velocity (ns/cm)
    pub tt: f64,

    pub t0_err: f64,
    pub tt_err: f64,
    pub t0tt_cov: f64,

    /// Position of the reference (first) hit
    pub ref_point: Vector3<f64>,

    /// Path length assigned to the reference hit
    pub ref_path: f64,
}

impl TemporalFit {
    /// Signed path length of `point`, sign taken from its depth relative to
    /// the reference hit.
    #[inline]
    pub fn path_length(&self, point: &Vector3<f64>) -> f64 {
        let sign = if point.z < self.ref_point.z { -1.0 } else { 1.0 };
        self.ref_path + sign * (point - self.ref_point).norm()
    }

    #[inline]
    pub fn predict_time(&self, path_length: f64) -> f64 {
        self.t0 + self.tt * path_length
    }

    /// Fitted velocity in cm/ns; infinite for a zero slope.
    pub fn velocity(&self) -> f64 {
        1.0 / self.tt
    }
}

/// Combined spatial and temporal fit of a tracklet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFit {
    pub spatial: SpatialFit,
    pub temporal: TemporalFit,
}

/// Measured minus predicted values of one hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residuals {
    pub dx: f64,
    pub dy: f64,
    pub dt: f64,
}

impl TrajectoryFit {
    #[inline]
    pub fn predict(&self, z: f64) -> (f64, f64) {
        self.spatial.predict(z)
    }

    #[inline]
    pub fn predict_time(&self, path_length: f64) -> f64 {
        self.temporal.predict_time(path_length)
    }

    /// Expected time of a hit at `point`.
    pub fn expected_time(&self, point: &Vector3<f64>) -> f64 {
        self.temporal.predict_time(self.temporal.path_length(point))
    }

    /// Time at which the track crosses depth `z`.
    pub fn predict_time_at_depth(&self, z: f64) -> f64 {
        self.temporal.t0 + self.temporal.tt * (z - self.spatial.z_ref) * self.spatial.slope_norm()
    }

    /// Distance from the beam axis at z = 0.
    pub fn origin_radius(&self) -> f64 {
        let (x, y) = self.spatial.predict(0.0);
        (x * x + y * y).sqrt()
    }

    pub fn chi2(&self) -> f64 {
        self.spatial.chi2
    }

    pub fn ndf(&self) -> i32 {
        self.spatial.ndf
    }

    pub fn residuals(&self, hit: &Hit) -> Residuals {
        let (x, y) = self.predict(hit.position.z);
        Residuals {
            dx: hit.position.x - x,
            dy: hit.position.y - y,
            dt: hit.time - self.expected_time(&hit.position),
        }
    }
}

// ============================================================================
// SPATIAL FIT
// ============================================================================

struct LineFit {
    intercept: f64,
    slope: f64,
    rss: f64,
}

#[inline]
fn weight(sigma: f64) -> f64 {
    if sigma > 0.0 {
        1.0 / (sigma * sigma)
    } else {
        1.0
    }
}

/// Weighted regression `v = intercept + slope * z` over `(z, v, sigma)`.
///
/// Returns `None` when all points share one depth.
fn weighted_line(samples: &[(f64, f64, f64)]) -> Option<LineFit> {
    let mut sw = 0.0;
    let mut swz = 0.0;
    let mut swv = 0.0;
    for &(z, v, sigma) in samples {
        let w = weight(sigma);
        sw += w;
        swz += w * z;
        swv += w * v;
    }
    let z_mean = swz / sw;
    let v_mean = swv / sw;

    let mut szz = 0.0;
    let mut szv = 0.0;
    for &(z, v, sigma) in samples {
        let w = weight(sigma);
        szz += w * (z - z_mean) * (z - z_mean);
        szv += w * (z - z_mean) * (v - v_mean);
    }
    if szz / sw < MIN_DEPTH_SPREAD {
        return None;
    }

    let slope = szv / szz;
    let intercept = v_mean - slope * z_mean;
    let rss = samples
        .iter()
        .map(|&(z, v, sigma)| {
            let r = v - intercept - slope * z;
            weight(sigma) * r * r
        })
        .sum();

    Some(LineFit {
        intercept,
        slope,
        rss,
    })
}

fn usable<'a>(hits: &[&'a Hit], exclude: Option<u32>) -> Vec<&'a Hit> {
    hits.iter()
        .copied()
        .filter(|h| Some(h.station) != exclude)
        .collect()
}

/// Fits the straight line through `hits`, skipping station `exclude`.
pub fn fit_spatial(hits: &[&Hit], exclude: Option<u32>) -> Result<SpatialFit, FitError> {
    let points = usable(hits, exclude);
    if points.len() < 2 {
        return Err(FitError::InsufficientHits {
            usable: points.len(),
        });
    }

    let xs: Vec<(f64, f64, f64)> = points
        .iter()
        .map(|h| (h.position.z, h.position.x, h.position_sigma.x))
        .collect();
    let ys: Vec<(f64, f64, f64)> = points
        .iter()
        .map(|h| (h.position.z, h.position.y, h.position_sigma.y))
        .collect();

    let degenerate = FitError::InsufficientHits { usable: 1 };
    let line_x = weighted_line(&xs).ok_or_else(|| degenerate.clone())?;
    let line_y = weighted_line(&ys).ok_or(degenerate)?;

    let ndf = 2 * points.len() as i32 - 4;
    let chi2 = if ndf > 0 {
        (line_x.rss + line_y.rss) / ndf as f64
    } else {
        0.0
    };

    Ok(SpatialFit {
        x0: line_x.intercept,
        y0: line_y.intercept,
        z_ref: 0.0,
        tx: line_x.slope,
        ty: line_y.slope,
        chi2,
        ndf,
    })
}

// ============================================================================
// TEMPORAL FIT
// ============================================================================

/// Fits `t = t0 + tt * R` along the line `spatial`, skipping station `exclude`.
/// The vertex point constrains the line only; its time is not measured.
///
/// With exactly two points this is the two-point slope with zero errors.
pub fn fit_temporal(
    hits: &[&Hit],
    spatial: &SpatialFit,
    exclude: Option<u32>,
) -> Result<TemporalFit, FitError> {
    let points: Vec<&Hit> = usable(hits, exclude)
        .into_iter()
        .filter(|h| !h.is_vertex())
        .collect();
    if points.len() < 2 {
        return Err(FitError::InsufficientHits {
            usable: points.len(),
        });
    }

    let reference = points[0];
    let mut fit = TemporalFit {
        t0: 0.0,
        tt: 0.0,
        t0_err: 0.0,
        tt_err: 0.0,
        t0tt_cov: 0.0,
        ref_point: reference.position,
        ref_path: (reference.position.z - spatial.z_ref) * spatial.slope_norm(),
    };

    let paths: Vec<f64> = points
        .iter()
        .map(|h| fit.path_length(&h.position))
        .collect();

    if points.len() == 2 {
        let dr = paths[1] - paths[0];
        if dr.abs() < f64::EPSILON {
            return Err(FitError::InsufficientHits { usable: 1 });
        }
        fit.tt = (points[1].time - points[0].time) / dr;
        fit.t0 = points[1].time - fit.tt * paths[1];
        return Ok(fit);
    }

    let offset = reference.time - TIME_FIT_OFFSET;
    let mut esum = 0.0;
    let mut rsum = 0.0;
    let mut tsum = 0.0;
    let mut rrsum = 0.0;
    let mut rtsum = 0.0;
    for (hit, &r) in points.iter().zip(&paths) {
        let w = weight(hit.time_sigma);
        let t = hit.time - offset;
        esum += w;
        rsum += w * r;
        tsum += w * t;
        rrsum += w * r * r;
        rtsum += w * r * t;
    }

    let det = esum * rrsum - rsum * rsum;
    if det.abs() < f64::EPSILON * esum * rrsum.max(1.0) {
        return Err(FitError::InsufficientHits { usable: 1 });
    }

    fit.t0 = (rrsum * tsum - rsum * rtsum) / det + offset;
    fit.tt = (esum * rtsum - rsum * tsum) / det;
    fit.t0_err = (rrsum / det).sqrt();
    fit.tt_err = (esum / det).sqrt();
    fit.t0tt_cov = -rsum / det;
    Ok(fit)
}

/// Runs both fits over `hits`, skipping station `exclude`.
pub fn fit_trajectory(hits: &[&Hit], exclude: Option<u32>) -> Result<TrajectoryFit, FitError> {
    let spatial = fit_spatial(hits, exclude)?;
    let temporal = fit_temporal(hits, &spatial, exclude)?;
    Ok(TrajectoryFit { spatial, temporal })
}

/// Closed-form fit of a two-hit seed: the line through both points, and
/// `tt = dt / distance` signed by depth order, with `t0` projected back from
/// the later hit.
pub fn seed_fit(first: &Hit, second: &Hit) -> Result<TrajectoryFit, FitError> {
    let dz = second.position.z - first.position.z;
    if dz.abs() < f64::EPSILON {
        return Err(FitError::InsufficientHits { usable: 1 });
    }
    let tx = (second.position.x - first.position.x) / dz;
    let ty = (second.position.y - first.position.y) / dz;
    let spatial = SpatialFit {
        x0: first.position.x - tx * first.position.z,
        y0: first.position.y - ty * first.position.z,
        z_ref: 0.0,
        tx,
        ty,
        chi2: 0.0,
        ndf: 0,
    };

    let distance = (second.position - first.position).norm();
    let sign = if dz < 0.0 { -1.0 } else { 1.0 };
    let tt = sign * (second.time - first.time) / distance;
    let mut temporal = TemporalFit {
        t0: 0.0,
        tt,
        t0_err: 0.0,
        tt_err: 0.0,
        t0tt_cov: 0.0,
        ref_point: first.position,
        ref_path: first.position.z * spatial.slope_norm(),
    };
    temporal.t0 = second.time - tt * temporal.path_length(&second.position);

    Ok(TrajectoryFit { spatial, temporal })
}

/// Normalized residual metric used to rank (tracklet, hit) pairs:
/// `sqrt(((dt/st)^2 + (dx/sx)^2 + (dy/sy)^2) / 3)`.
pub fn match_score(fit: &TrajectoryFit, hit: &Hit, resolution: &StationResolution) -> f64 {
    let r = fit.residuals(hit);
    let nt = r.dt / resolution.sigma_t;
    let nx = r.dx / resolution.sigma_x;
    let ny = r.dy / resolution.sigma_y;
    ((nt * nt + nx * nx + ny * ny) / 3.0).sqrt()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hits::{HitId, HitOrigin};
    use approx::assert_relative_eq;
    use tracklet_env::{ChannelId, LocalPoint};

    /// Speed of light in cm/ns.
    const C_LIGHT: f64 = 29.9792458;

    pub(crate) fn make_hit(id: u32, station: u32, x: f64, y: f64, z: f64, t: f64) -> Hit {
        Hit {
            id: HitId(id),
            origin: HitOrigin::Detection {
                source_index: id as usize,
                channel: ChannelId(station * 100 + id),
            },
            station,
            position: Vector3::new(x, y, z),
            position_sigma: Vector3::new(0.5, 0.5, 0.5),
            time: t,
            time_sigma: 0.08,
            local: LocalPoint::default(),
            in_active_area: true,
            claimed_by: None,
        }
    }

    /// Hit on the line through the origin with slopes (tx, ty) and speed of light.
    pub(crate) fn on_line(id: u32, station: u32, z: f64, tx: f64, ty: f64, t0: f64) -> Hit {
        let norm = (1.0 + tx * tx + ty * ty).sqrt();
        make_hit(id, station, tx * z, ty * z, z, t0 + z * norm / C_LIGHT)
    }

    #[test]
    fn test_spatial_fit_exact_line() {
        let hits: Vec<Hit> = (0..4)
            .map(|i| on_line(i, i, 100.0 * (i + 1) as f64, 0.1, -0.05, 0.0))
            .collect();
        let refs: Vec<&Hit> = hits.iter().collect();
        let fit = fit_spatial(&refs, None).unwrap();

        assert_relative_eq!(fit.tx, 0.1, epsilon = 1e-12);
        assert_relative_eq!(fit.ty, -0.05, epsilon = 1e-12);
        assert_relative_eq!(fit.x0, 0.0, epsilon = 1e-9);
        assert_eq!(fit.ndf, 4);
        assert_relative_eq!(fit.chi2, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spatial_chi2_normalized_by_ndf() {
        // x residuals +-1 with sigma 0.5 -> each contributes 4
        let hits = vec![
            make_hit(0, 0, 1.0, 0.0, 100.0, 0.0),
            make_hit(1, 1, -1.0, 0.0, 200.0, 0.0),
            make_hit(2, 2, 1.0, 0.0, 300.0, 0.0),
        ];
        let refs: Vec<&Hit> = hits.iter().collect();
        let fit = fit_spatial(&refs, None).unwrap();
        assert_eq!(fit.ndf, 2);
        // Best line is x = 1/3 with residuals 2/3, -4/3, 2/3
        let rss = 4.0 * (4.0 / 9.0 + 16.0 / 9.0 + 4.0 / 9.0);
        assert_relative_eq!(fit.chi2, rss / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_spatial_fit_exclude_station() {
        let mut hits: Vec<Hit> = (0..3)
            .map(|i| on_line(i, i, 100.0 * (i + 1) as f64, 0.2, 0.0, 0.0))
            .collect();
        hits[1].position.x += 5.0;
        let refs: Vec<&Hit> = hits.iter().collect();

        let with_outlier = fit_spatial(&refs, None).unwrap();
        let without = fit_spatial(&refs, Some(1)).unwrap();
        assert!(with_outlier.chi2 > 0.0);
        assert_relative_eq!(without.tx, 0.2, epsilon = 1e-12);
        assert_eq!(without.ndf, 0);
    }

    #[test]
    fn test_insufficient_hits() {
        let hit = on_line(0, 0, 100.0, 0.0, 0.0, 0.0);
        assert_eq!(
            fit_spatial(&[&hit], None),
            Err(FitError::InsufficientHits { usable: 1 })
        );
        assert_eq!(
            fit_spatial(&[], None),
            Err(FitError::InsufficientHits { usable: 0 })
        );
    }

    #[test]
    fn test_same_depth_is_degenerate() {
        let a = make_hit(0, 0, 0.0, 0.0, 100.0, 1.0);
        let b = make_hit(1, 1, 3.0, 0.0, 100.0, 2.0);
        assert_eq!(
            fit_spatial(&[&a, &b], None),
            Err(FitError::InsufficientHits { usable: 1 })
        );
        assert!(seed_fit(&a, &b).is_err());
    }

    #[test]
    fn test_temporal_fit_recovers_inverse_velocity() {
        let hits: Vec<Hit> = (0..4)
            .map(|i| on_line(i, i, 150.0 * (i + 1) as f64, 0.05, 0.1, 3.0))
            .collect();
        let refs: Vec<&Hit> = hits.iter().collect();
        let fit = fit_trajectory(&refs, None).unwrap();

        assert_relative_eq!(fit.temporal.tt, 1.0 / C_LIGHT, epsilon = 1e-9);
        assert_relative_eq!(fit.temporal.t0, 3.0, epsilon = 1e-7);
        assert_relative_eq!(fit.predict_time_at_depth(0.0), 3.0, epsilon = 1e-7);
        for hit in &hits {
            assert_relative_eq!(fit.expected_time(&hit.position), hit.time, epsilon = 1e-7);
        }
        assert!(fit.temporal.t0_err > 0.0);
        assert!(fit.temporal.tt_err > 0.0);
        assert!(fit.temporal.t0tt_cov < 0.0);
    }

    #[test]
    fn test_temporal_two_points_have_zero_errors() {
        let a = on_line(0, 0, 100.0, 0.0, 0.0, 0.0);
        let b = on_line(1, 1, 250.0, 0.0, 0.0, 0.0);
        let fit = fit_trajectory(&[&a, &b], None).unwrap();
        assert_relative_eq!(fit.temporal.tt, 1.0 / C_LIGHT, epsilon = 1e-12);
        assert_eq!(fit.temporal.t0_err, 0.0);
        assert_eq!(fit.temporal.tt_err, 0.0);
        assert_eq!(fit.temporal.t0tt_cov, 0.0);
    }

    #[test]
    fn test_seed_fit_is_exact_two_point_line() {
        let a = make_hit(0, 0, 1.0, 2.0, 100.0, 5.0);
        let b = make_hit(1, 2, 4.0, -1.0, 250.0, 10.5);
        let fit = seed_fit(&a, &b).unwrap();

        for hit in [&a, &b] {
            let (x, y) = fit.predict(hit.position.z);
            assert_relative_eq!(x, hit.position.x, epsilon = 1e-12);
            assert_relative_eq!(y, hit.position.y, epsilon = 1e-12);
            assert_relative_eq!(fit.expected_time(&hit.position), hit.time, epsilon = 1e-9);
        }
        let distance = (b.position - a.position).norm();
        assert_relative_eq!(fit.temporal.tt, 5.5 / distance, epsilon = 1e-12);
        assert_eq!(fit.chi2(), 0.0);

        // Agrees with the general fit on the same two points
        let general = fit_trajectory(&[&a, &b], None).unwrap();
        assert_relative_eq!(general.spatial.tx, fit.spatial.tx, epsilon = 1e-12);
        assert_relative_eq!(general.temporal.tt, fit.temporal.tt, epsilon = 1e-12);
        assert_relative_eq!(general.temporal.t0, fit.temporal.t0, epsilon = 1e-9);
    }

    #[test]
    fn test_seed_fit_sign_follows_depth_order() {
        let a = make_hit(0, 0, 0.0, 0.0, 200.0, 10.0);
        let b = make_hit(1, 1, 0.0, 0.0, 100.0, 6.0);
        let fit = seed_fit(&a, &b).unwrap();
        // Hit b lies upstream, so its path is shorter; dt is negative
        assert_relative_eq!(fit.temporal.tt, 4.0 / 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_match_score_rms_of_normalized_residuals() {
        let a = on_line(0, 0, 100.0, 0.0, 0.0, 0.0);
        let b = on_line(1, 1, 200.0, 0.0, 0.0, 0.0);
        let fit = seed_fit(&a, &b).unwrap();

        let mut probe = on_line(2, 2, 300.0, 0.0, 0.0, 0.0);
        let res = StationResolution::new(0.1, 1.0, 1.0);
        assert_relative_eq!(match_score(&fit, &probe, &res), 0.0, epsilon = 1e-9);

        probe.position.x += 1.0;
        probe.time += 0.2;
        // ((2)^2 + 1^2 + 0) / 3
        assert_relative_eq!(
            match_score(&fit, &probe, &res),
            (5.0f64 / 3.0).sqrt(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_origin_radius() {
        let a = make_hit(0, 0, 4.0, 3.0, 100.0, 0.0);
        let b = make_hit(1, 1, 4.0, 3.0, 200.0, 3.3);
        let fit = seed_fit(&a, &b).unwrap();
        assert_relative_eq!(fit.origin_radius(), 5.0, epsilon = 1e-12);
    }
}
