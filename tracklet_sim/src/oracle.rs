//! Ground truth oracle for simulation.
//!
//! The Oracle owns the truth of every generated event:
//! - Straight-line particles from a smeared interaction point
//! - Station crossings smeared by the detector resolution
//! - Uniform noise hits with no particle behind them

use crate::world::DetectorSetup;
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracklet_env::{ChannelId, RawDetection};

/// Speed of light in cm/ns.
pub const C_LIGHT: f64 = 29.9792458;

/// A ground truth particle: `x = x0 + tx*z`, `y = y0 + ty*z`, moving at
/// the speed of light and crossing `z = 0` at `t0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthParticle {
    pub id: usize,
    pub x0: f64,
    pub y0: f64,
    pub tx: f64,
    pub ty: f64,
    pub t0: f64,
}

impl TruthParticle {
    pub fn new(id: usize, x0: f64, y0: f64, tx: f64, ty: f64, t0: f64) -> Self {
        Self {
            id,
            x0,
            y0,
            tx,
            ty,
            t0,
        }
    }

    /// True crossing point and time at depth `z`.
    pub fn crossing(&self, z: f64) -> (Vector3<f64>, f64) {
        let norm = (1.0 + self.tx * self.tx + self.ty * self.ty).sqrt();
        (
            Vector3::new(self.x0 + self.tx * z, self.y0 + self.ty * z, z),
            self.t0 + z * norm / C_LIGHT,
        )
    }
}

/// One generated event: detections plus their truth labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimEvent {
    pub detections: Vec<RawDetection>,
    /// Particle behind each detection (`None` for noise), by detection index.
    pub truth: Vec<Option<usize>>,
    pub particles: Vec<TruthParticle>,
}

impl SimEvent {
    /// Appends a detection; its caller index is its position.
    pub fn push(
        &mut self,
        channel: ChannelId,
        station: u32,
        position: Vector3<f64>,
        time: f64,
        particle: Option<usize>,
    ) -> usize {
        let index = self.detections.len();
        self.detections
            .push(RawDetection::new(index, channel, station, position, time));
        self.truth.push(particle);
        index
    }

    /// Detection indices of one particle.
    pub fn particle_hits(&self, particle: usize) -> Vec<usize> {
        self.truth
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == Some(particle))
            .map(|(i, _)| i)
            .collect()
    }

    /// Appends the unsmeared crossing of `particle` with `station`.
    /// Returns `None` if it falls outside the cell grid.
    pub fn place_crossing(
        &mut self,
        setup: &DetectorSetup,
        particle: &TruthParticle,
        station: u32,
    ) -> Option<usize> {
        let (position, time) = particle.crossing(setup.station_z(station));
        let channel = setup.cell_at(station, position.x, position.y)?;
        Some(self.push(channel, station, position, time, Some(particle.id)))
    }

    pub fn noise_count(&self) -> usize {
        self.truth.iter().filter(|p| p.is_none()).count()
    }
}

/// The Oracle - generates particles and their detector response.
pub struct Oracle {
    seed: u64,
    rng: ChaCha8Rng,
}

impl Oracle {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Zero-mean Gaussian sample.
    fn gauss(&mut self, sigma: f64) -> f64 {
        let n: f64 = self.rng.sample(StandardNormal);
        n * sigma
    }

    /// Draws a particle from the interaction region.
    pub fn spawn_particle(&mut self, setup: &DetectorSetup, id: usize) -> TruthParticle {
        let cfg = &setup.config;
        let slope = cfg.max_slope.abs();
        TruthParticle {
            id,
            x0: self.gauss(cfg.vertex_spread),
            y0: self.gauss(cfg.vertex_spread),
            tx: self.rng.gen_range(-slope..=slope),
            ty: self.rng.gen_range(-slope..=slope),
            t0: self.rng.gen_range(0.0..2.0),
        }
    }

    /// Smeared response of every station a particle crosses inside the grid.
    pub fn detect(&mut self, setup: &DetectorSetup, particle: &TruthParticle, event: &mut SimEvent) {
        let cfg = &setup.config;

        for s in 0..cfg.stations {
            if self.rng.gen::<f64>() >= cfg.efficiency {
                continue;
            }
            let (truth, t) = particle.crossing(setup.station_z(s));
            let position = Vector3::new(
                truth.x + self.gauss(cfg.sigma_xy),
                truth.y + self.gauss(cfg.sigma_xy),
                truth.z,
            );
            let time = t + self.gauss(cfg.sigma_t) + s as f64 * cfg.station_time_offset;
            if let Some(channel) = setup.cell_at(s, position.x, position.y) {
                event.push(channel, s, position, time, Some(particle.id));
            }
        }
    }

    /// Uniform noise hits on every station.
    pub fn add_noise(&mut self, setup: &DetectorSetup, per_station: usize, event: &mut SimEvent) {
        for s in 0..setup.config.stations {
            self.add_station_noise(setup, s, per_station, event);
        }
    }

    /// `count` noise hits uniform over one station, uniform in [0, 30) ns.
    pub fn add_station_noise(
        &mut self,
        setup: &DetectorSetup,
        station: u32,
        count: usize,
        event: &mut SimEvent,
    ) {
        let half = setup.half_width() * 0.999;
        for _ in 0..count {
            let x = self.rng.gen_range(-half..half);
            let y = self.rng.gen_range(-half..half);
            let time = self.rng.gen_range(0.0..30.0);
            let position = Vector3::new(x, y, setup.station_z(station));
            if let Some(channel) = setup.cell_at(station, x, y) {
                event.push(channel, station, position, time, None);
            }
        }
    }

    /// A full event: `particles` random particles plus the configured noise.
    pub fn generate_event(&mut self, setup: &DetectorSetup, particles: usize) -> SimEvent {
        let mut event = SimEvent::default();
        for id in 0..particles {
            let particle = self.spawn_particle(setup, id);
            self.detect(setup, &particle, &mut event);
            event.particles.push(particle);
        }
        self.add_noise(setup, setup.config.noise_per_station, &mut event);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SimConfig;
    use approx::assert_relative_eq;

    fn setup(config: SimConfig) -> DetectorSetup {
        DetectorSetup::new(config).unwrap()
    }

    #[test]
    fn test_crossing_time_is_path_over_c() {
        let p = TruthParticle::new(0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let (pos, t) = p.crossing(C_LIGHT * 10.0);
        assert_relative_eq!(pos.z, C_LIGHT * 10.0);
        assert_relative_eq!(t, 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_same_seed_same_event() {
        let setup = setup(SimConfig {
            noise_per_station: 3,
            ..Default::default()
        });
        let a = Oracle::new(7).generate_event(&setup, 4);
        let b = Oracle::new(7).generate_event(&setup, 4);
        assert_eq!(a.detections, b.detections);
        assert_eq!(a.truth, b.truth);

        let c = Oracle::new(8).generate_event(&setup, 4);
        assert_ne!(a.detections, c.detections);
    }

    #[test]
    fn test_full_efficiency_hits_every_station() {
        let setup = setup(SimConfig::default());
        let event = Oracle::new(1).generate_event(&setup, 3);
        for p in 0..3 {
            assert_eq!(event.particle_hits(p).len(), 4);
        }
        assert_eq!(event.noise_count(), 0);
    }

    #[test]
    fn test_zero_efficiency_only_noise() {
        let setup = setup(SimConfig {
            efficiency: 0.0,
            noise_per_station: 2,
            ..Default::default()
        });
        let event = Oracle::new(3).generate_event(&setup, 5);
        assert_eq!(event.detections.len(), 8);
        assert_eq!(event.noise_count(), 8);
    }
}
