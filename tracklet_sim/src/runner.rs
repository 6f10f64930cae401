//! Scenario runner - executes reconstruction scenarios.

use crate::error::SimError;
use crate::oracle::{Oracle, SimEvent, TruthParticle};
use crate::scenarios::ScenarioId;
use crate::validation::{check_invariants, evaluate, ReconstructionQuality};
use crate::world::{DetectorSetup, SimConfig};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracklet_core::{EventResult, FinderConfig, RunStats, SkipReason, TrackFinder};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Events searched
    pub events: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub quality: ReconstructionQuality,
    pub run: RunStats,
}

impl ScenarioMetrics {
    fn record(&mut self, event: &SimEvent, result: &EventResult, min_hits: usize) {
        self.quality.merge(&evaluate(event, result, min_hits));
        self.run.absorb(&result.stats);
    }
}

/// One searched event, kept for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: SimEvent,
    pub result: EventResult,
}

/// Runs reconstruction scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Events per randomized scenario
    events: usize,

    /// Finder configuration; scenarios override individual fields
    config: FinderConfig,

    /// Detector and generator settings for randomized scenarios
    sim: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            events: 20,
            config: FinderConfig::default(),
            sim: SimConfig {
                seed,
                ..Default::default()
            },
        }
    }

    /// Sets the number of events per randomized scenario.
    pub fn with_events(mut self, events: usize) -> Self {
        self.events = events.max(1);
        self
    }

    pub fn with_config(mut self, config: FinderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sim_config(mut self, sim: SimConfig) -> Self {
        self.sim = SimConfig {
            seed: self.seed,
            ..sim
        };
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario).0
    }

    /// Runs a scenario and also returns every searched event.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, Vec<EventRecord>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut ctx = RunContext::default();
        let verdict = match scenario {
            ScenarioId::ColinearTriplet => self.run_colinear_triplet(&mut ctx),
            ScenarioId::TimeOutlier => self.run_time_outlier(&mut ctx),
            ScenarioId::SharedHit => self.run_shared_hit(&mut ctx),
            ScenarioId::OutsideActiveArea => self.run_outside_active_area(&mut ctx),
            ScenarioId::RerunDeterminism => self.run_rerun_determinism(&mut ctx),
            ScenarioId::MultiTrack => self.run_multi_track(&mut ctx),
            ScenarioId::NoisyEvent => self.run_noisy_event(&mut ctx),
            ScenarioId::HighOccupancy => self.run_high_occupancy(&mut ctx),
        };
        let failure_reason = match verdict {
            Ok(()) => None,
            Err(ScenarioFailure::Check(reason)) => Some(reason),
            Err(ScenarioFailure::Setup(err)) => {
                warn!("Scenario {} could not be set up: {}", scenario.name(), err);
                Some(err.to_string())
            }
        };

        let result = ScenarioResult {
            scenario: scenario.name().to_string(),
            seed: self.seed,
            passed: failure_reason.is_none(),
            events: ctx.records.len(),
            failure_reason,
            metrics: ctx.metrics,
        };
        (result, ctx.records)
    }

    // ========================================================================
    // SHARED PLUMBING
    // ========================================================================

    fn setup(&self, sim: SimConfig) -> Result<DetectorSetup, SimError> {
        DetectorSetup::new(sim)
    }

    fn finder(&self, setup: &DetectorSetup, config: FinderConfig) -> Result<TrackFinder, SimError> {
        Ok(TrackFinder::new(config, setup.stations.clone())?)
    }

    /// Searches one event, checks the invariants and records it.
    fn search(
        &self,
        ctx: &mut RunContext,
        finder: &TrackFinder,
        setup: &DetectorSetup,
        event: SimEvent,
    ) -> Result<EventResult, ScenarioFailure> {
        let result = finder.find_event(&event.detections, &setup.geometry, &setup.calibration);
        check_invariants(&result, finder.config()).map_err(ScenarioFailure::Check)?;
        debug!(
            "  event {}: {} detections, {} tracks, {} unused",
            ctx.records.len(),
            event.detections.len(),
            result.tracks.len(),
            result.unused_hits.len()
        );
        ctx.metrics.record(&event, &result, finder.config().min_hits);
        ctx.records.push(EventRecord {
            event,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Detector for hand-placed scenarios.
    fn fixed_setup(&self, stations: u32) -> Result<DetectorSetup, SimError> {
        self.setup(SimConfig {
            seed: self.seed,
            stations,
            ..Default::default()
        })
    }

    fn place_all(event: &mut SimEvent, setup: &DetectorSetup, particle: &TruthParticle) -> Result<(), ScenarioFailure> {
        for s in 0..setup.config.stations {
            event
                .place_crossing(setup, particle, s)
                .ok_or_else(|| ScenarioFailure::Setup(SimError::Setup("particle leaves the grid".into())))?;
        }
        event.particles.push(*particle);
        Ok(())
    }

    // ========================================================================
    // FIXED SCENARIOS
    // ========================================================================

    /// TRK-001: one exact line through three stations.
    fn run_colinear_triplet(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.fixed_setup(3)?;
        let finder = self.finder(&setup, self.config.clone())?;
        let mut event = SimEvent::default();
        Self::place_all(&mut event, &setup, &TruthParticle::new(0, 0.0, 0.0, 0.05, -0.03, 1.0))?;

        let result = self.search(ctx, &finder, &setup, event)?;
        ensure(result.tracks.len() == 1, || format!("{} tracks, expected 1", result.tracks.len()))?;
        let track = &result.tracks[0];
        ensure(track.detection_count() == 3, || format!("{} hits, expected 3", track.detection_count()))?;
        ensure(track.chi2() < 1e-6, || format!("chi2 {:.3e} not ~0", track.chi2()))?;

        info!("✓ ColinearTriplet: chi2 = {:.2e}", track.chi2());
        Ok(())
    }

    /// TRK-002: the station 2 hit arrives 50 time sigmas late.
    fn run_time_outlier(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.fixed_setup(3)?;
        let config = FinderConfig {
            min_hits: 2,
            ..self.config.clone()
        };
        let finder = self.finder(&setup, config)?;
        let mut event = SimEvent::default();
        Self::place_all(&mut event, &setup, &TruthParticle::new(0, 0.0, 0.0, 0.1, 0.0, 0.0))?;
        event.detections[2].time += 50.0 * setup.config.sigma_t;

        let result = self.search(ctx, &finder, &setup, event)?;
        ensure(result.tracks.len() == 1, || format!("{} tracks, expected 1", result.tracks.len()))?;
        let hits = result.tracks[0].source_indices();
        ensure(hits == vec![0, 1], || format!("track holds {:?}, expected the seed pair", hits))?;
        ensure(result.unused_hits.contains(&2), || "late hit was used".to_string())?;

        info!("✓ TimeOutlier: late hit left unused");
        Ok(())
    }

    /// TRK-003: P and Q both reach the station 2 hit; P passes closer.
    fn run_shared_hit(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.fixed_setup(4)?;
        let finder = self.finder(&setup, self.config.clone())?;
        let p = TruthParticle::new(0, 0.0, 0.0, 0.1, 0.0, 0.0);
        let q = TruthParticle::new(1, 5.8, 0.0, 0.082, 0.0, 0.0);

        let mut event = SimEvent::default();
        let missing = || ScenarioFailure::Setup(SimError::Setup("hit outside the grid".into()));
        for s in [0, 1] {
            event.place_crossing(&setup, &p, s).ok_or_else(missing)?;
            event.place_crossing(&setup, &q, s).ok_or_else(missing)?;
        }
        let shared = event.place_crossing(&setup, &p, 2).ok_or_else(missing)?;
        event.place_crossing(&setup, &p, 3).ok_or_else(missing)?;
        let q_last = event.place_crossing(&setup, &q, 3).ok_or_else(missing)?;
        event.particles.extend([p, q]);

        let result = self.search(ctx, &finder, &setup, event)?;
        let owner = result
            .tracks
            .iter()
            .find(|t| t.source_indices().contains(&shared))
            .ok_or_else(|| ScenarioFailure::Check("shared hit not used".into()))?;
        ensure(owner.source_indices().contains(&0), || {
            format!("shared hit went to {:?}, not the closer track", owner.source_indices())
        })?;
        let q_track = result.tracks.iter().find(|t| t.source_indices().contains(&q_last));
        if let Some(q_track) = q_track {
            ensure(!q_track.source_indices().contains(&shared), || "both tracks hold the shared hit".into())?;
        }

        info!(
            "✓ SharedHit: {} tracks, {} invalidations",
            result.tracks.len(),
            result.stats.invalidations
        );
        Ok(())
    }

    /// TRK-004: the station 1 hit is read out by the neighbouring cell.
    fn run_outside_active_area(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.fixed_setup(3)?;
        let config = FinderConfig {
            min_hits: 2,
            ..self.config.clone()
        };
        let finder = self.finder(&setup, config)?;
        let particle = TruthParticle::new(0, 0.0, 1.0, 0.02, 0.0, 0.0);

        let mut event = SimEvent::default();
        Self::place_all(&mut event, &setup, &particle)?;
        let det = &mut event.detections[1];
        det.channel = setup
            .neighbour_above(1, det.position.x, det.position.y)
            .ok_or_else(|| ScenarioFailure::Setup(SimError::Setup("no neighbour cell".into())))?;

        let result = self.search(ctx, &finder, &setup, event)?;
        ensure(result.unused_hits.contains(&1), || "inactive hit was used".to_string())?;
        ensure(result.tracks.len() == 1, || format!("{} tracks, expected 1", result.tracks.len()))?;

        info!("✓ OutsideActiveArea: inactive hit never offered");
        Ok(())
    }

    // ========================================================================
    // RANDOMIZED SCENARIOS
    // ========================================================================

    /// TRK-005: each event searched twice must give identical results.
    fn run_rerun_determinism(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.setup(SimConfig {
            noise_per_station: 3,
            ..self.sim.clone()
        })?;
        let finder = self.finder(&setup, self.config.clone())?;
        let mut oracle = Oracle::new(self.seed);

        for _ in 0..self.events {
            let event = oracle.generate_event(&setup, 4);
            let detections = event.detections.clone();
            let first = self.search(ctx, &finder, &setup, event)?;
            let second = finder.find_event(&detections, &setup.geometry, &setup.calibration);
            ensure(first == second, || "re-run produced different tracks".to_string())?;
        }

        info!("✓ RerunDeterminism: {} events identical", self.events);
        Ok(())
    }

    /// TRK-006: several smeared particles without noise.
    fn run_multi_track(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.setup(self.sim.clone())?;
        let finder = self.finder(&setup, self.config.clone())?;
        let mut oracle = Oracle::new(self.seed);

        for _ in 0..self.events {
            let event = oracle.generate_event(&setup, 5);
            self.search(ctx, &finder, &setup, event)?;
        }

        let q = &ctx.metrics.quality;
        info!(
            "✓ MultiTrack: efficiency {:.1}%, ghosts {:.1}%, purity {:.1}%",
            q.efficiency() * 100.0,
            q.ghost_rate() * 100.0,
            q.purity() * 100.0
        );
        ensure(q.efficiency() >= 0.8, || format!("efficiency {:.2} below 0.80", q.efficiency()))?;
        ensure(q.ghost_rate() <= 0.2, || format!("ghost rate {:.2} above 0.20", q.ghost_rate()))
    }

    /// TRK-007: noise, inefficiency and station time offsets.
    fn run_noisy_event(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.setup(SimConfig {
            noise_per_station: 5,
            efficiency: 0.95,
            station_time_offset: 0.5,
            ..self.sim.clone()
        })?;
        let finder = self.finder(&setup, self.config.clone())?;
        let mut oracle = Oracle::new(self.seed);

        for _ in 0..self.events {
            let event = oracle.generate_event(&setup, 3);
            self.search(ctx, &finder, &setup, event)?;
        }

        let q = &ctx.metrics.quality;
        info!(
            "✓ NoisyEvent: efficiency {:.1}%, ghosts {:.1}%",
            q.efficiency() * 100.0,
            q.ghost_rate() * 100.0
        );
        ensure(q.efficiency() >= 0.7, || format!("efficiency {:.2} below 0.70", q.efficiency()))
    }

    /// TRK-008: one station above the multiplicity ceiling.
    fn run_high_occupancy(&self, ctx: &mut RunContext) -> Result<(), ScenarioFailure> {
        let setup = self.setup(self.sim.clone())?;
        let finder = self.finder(&setup, self.config.clone())?;
        let mut oracle = Oracle::new(self.seed);
        let crowd = self.config.station_max_multiplicity + 1;

        for _ in 0..self.events {
            let mut event = oracle.generate_event(&setup, 2);
            oracle.add_station_noise(&setup, 1, crowd, &mut event);
            let total = event.detections.len();
            let result = self.search(ctx, &finder, &setup, event)?;

            ensure(
                matches!(result.stats.skipped, Some(SkipReason::Occupancy { station: 1, .. })),
                || format!("event not skipped: {:?}", result.stats.skipped),
            )?;
            ensure(result.tracks.is_empty(), || "skipped event produced tracks".into())?;
            ensure(result.unused_hits.len() == total, || "skipped event lost hits".into())?;
        }

        info!("✓ HighOccupancy: {} events skipped", ctx.metrics.run.events_skipped);
        Ok(())
    }
}

#[derive(Default)]
struct RunContext {
    metrics: ScenarioMetrics,
    records: Vec<EventRecord>,
}

enum ScenarioFailure {
    Check(String),
    Setup(SimError),
}

impl From<SimError> for ScenarioFailure {
    fn from(err: SimError) -> Self {
        ScenarioFailure::Setup(err)
    }
}

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Result<(), ScenarioFailure> {
    if condition {
        Ok(())
    } else {
        Err(ScenarioFailure::Check(reason()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_scenarios_pass() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all().into_iter().filter(|s| s.is_fixed()) {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert_eq!(result.events, 1);
        }
    }

    #[test]
    fn test_rerun_scenario() {
        let runner = ScenarioRunner::new(7).with_events(5);
        let result = runner.run(ScenarioId::RerunDeterminism);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.events, 5);
    }

    #[test]
    fn test_high_occupancy_skips_everything() {
        let runner = ScenarioRunner::new(3).with_events(3);
        let result = runner.run(ScenarioId::HighOccupancy);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.run.events_skipped, 3);
    }

    #[test]
    fn test_multi_track_finds_tracks() {
        let runner = ScenarioRunner::new(42).with_events(5);
        let result = runner.run(ScenarioId::MultiTrack);
        assert_eq!(result.events, 5);
        assert!(result.metrics.quality.found > 0);
    }

    #[test]
    fn test_recorded_events_match_count() {
        let runner = ScenarioRunner::new(1).with_events(2);
        let (result, records) = runner.run_recorded(ScenarioId::NoisyEvent);
        assert_eq!(records.len(), result.events);
    }
}
