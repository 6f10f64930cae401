//! Tracklet Deterministic Simulation Harness
//!
//! This crate generates synthetic events for a planar multi-station
//! detector and checks what the tracklet finder makes of them.
//!
//! # Core Principle: One Seed, One Event Stream
//!
//! Every source of variation is derived from a single 64-bit seed:
//! - **Particles**: interaction point, slopes and start time
//! - **Detector response**: smearing, inefficiency and noise
//! - **Readout**: per-station time offsets undone by the calibration table
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │  ┌──────────────┐   detections   ┌────────────────────┐  │
//! │  │    Oracle    │───────────────►│    TrackFinder     │  │
//! │  │ (truth + rng)│                │  (tracklet_core)   │  │
//! │  └──────┬───────┘                └─────────┬──────────┘  │
//! │         │ truth labels                     │ tracks      │
//! │         └──────────────►┌────────────┐◄────┘             │
//! │                         │ validation │                   │
//! │                         └────────────┘                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tracklet_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_events(10).run(ScenarioId::MultiTrack);
//! assert!(result.passed);
//! ```

pub mod error;
pub mod exporter;
pub mod oracle;
pub mod runner;
pub mod scenarios;
pub mod validation;
pub mod world;

pub use error::SimError;
pub use exporter::{DetectionPoint, EventFrame, SimExport, TrackLine};
pub use oracle::{Oracle, SimEvent, TruthParticle, C_LIGHT};
pub use runner::{EventRecord, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use validation::{check_invariants, evaluate, ReconstructionQuality};
pub use world::{DetectorSetup, SimConfig};
