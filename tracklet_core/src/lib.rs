//! Tracklet Core - Multi-Station Time-of-Flight Track Finder
//!
//! Finds straight-line particle tracks in one event of timestamped 3-D
//! detections spread over an ordered sequence of stations:
//! 1. **Seeding**: every station pair yields two-hit tracklets inside the
//!    time and slope windows
//! 2. **Propagation**: live tracklets are matched against later stations by
//!    a normalized residual score and extended best-first
//! 3. **Resolution**: each kept hit is stripped from competing tracklets;
//!    additions that break the fit are rolled back
//! 4. **Finalization**: survivors above the hit minimum become output
//!    tracks that never share a hit
//!
//! Fits are closed-form weighted regressions of x(z), y(z) and of time
//! against path length.

pub mod config;
pub mod extend;
pub mod finder;
pub mod fit;
pub mod hits;
pub mod matcher;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod seeding;
pub mod station;
pub mod tracklet;
pub mod vertex;

// Re-export key types for convenience
pub use config::{ConfigError, ExtenderConfig, ExtensionStation, FinderConfig, VertexConfig, VertexPlacement};
pub use extend::{ExtensionReport, TrackExtender};
pub use finder::{EventResult, FoundTrack, TrackFinder};
pub use fit::{fit_spatial, fit_temporal, fit_trajectory, match_score, seed_fit, FitError, TrajectoryFit};
pub use hits::{Hit, HitId, HitStore, VERTEX_STATION};
pub use metrics::{EventStats, RunStats, SkipReason};
pub use station::{Station, StationResolution, StationTable};
pub use tracklet::{TrackId, Tracklet, TrackletState};
pub use vertex::EventVertex;
