//! Reconstruction scenarios for the simulator.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// TRK-001: one particle, three exact colinear hits
    ColinearTriplet,

    /// TRK-002: third hit far off in time
    TimeOutlier,

    /// TRK-003: two tracks competing for one hit
    SharedHit,

    /// TRK-004: a hit outside its cell's active area
    OutsideActiveArea,

    /// TRK-005: same input twice, same output
    RerunDeterminism,

    /// TRK-006: several smeared particles, no noise
    MultiTrack,

    /// TRK-007: particles plus uniform noise and inefficiency
    NoisyEvent,

    /// TRK-008: a station above the multiplicity ceiling
    HighOccupancy,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ColinearTriplet,
            ScenarioId::TimeOutlier,
            ScenarioId::SharedHit,
            ScenarioId::OutsideActiveArea,
            ScenarioId::RerunDeterminism,
            ScenarioId::MultiTrack,
            ScenarioId::NoisyEvent,
            ScenarioId::HighOccupancy,
        ]
    }

    /// Scenarios built from hand-placed hits; the seed does not affect them.
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            ScenarioId::ColinearTriplet
                | ScenarioId::TimeOutlier
                | ScenarioId::SharedHit
                | ScenarioId::OutsideActiveArea
        )
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ColinearTriplet => "colinear_triplet",
            ScenarioId::TimeOutlier => "time_outlier",
            ScenarioId::SharedHit => "shared_hit",
            ScenarioId::OutsideActiveArea => "outside_active_area",
            ScenarioId::RerunDeterminism => "rerun_determinism",
            ScenarioId::MultiTrack => "multi_track",
            ScenarioId::NoisyEvent => "noisy_event",
            ScenarioId::HighOccupancy => "high_occupancy",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ColinearTriplet => "3 stations, exact line: one 3-hit track with chi2 ~ 0",
            ScenarioId::TimeOutlier => "station 2 hit 50 sigma late: only the seed pair survives",
            ScenarioId::SharedHit => "shared station 2 hit goes to the closer track, the other keeps its rest",
            ScenarioId::OutsideActiveArea => "hit outside the active area is never seeded or matched",
            ScenarioId::RerunDeterminism => "random event searched twice gives identical tracks",
            ScenarioId::MultiTrack => "5 smeared particles: efficiency >= 80%, ghosts <= 20%",
            ScenarioId::NoisyEvent => "3 particles + noise at 95% efficiency: invariants hold, efficiency >= 70%",
            ScenarioId::HighOccupancy => "crowded station: event skipped, every hit unused",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "colinear_triplet" | "colinear" | "trk-001" => Ok(ScenarioId::ColinearTriplet),
            "time_outlier" | "outlier" | "trk-002" => Ok(ScenarioId::TimeOutlier),
            "shared_hit" | "shared" | "trk-003" => Ok(ScenarioId::SharedHit),
            "outside_active_area" | "active_area" | "trk-004" => Ok(ScenarioId::OutsideActiveArea),
            "rerun_determinism" | "rerun" | "trk-005" => Ok(ScenarioId::RerunDeterminism),
            "multi_track" | "multitrack" | "trk-006" => Ok(ScenarioId::MultiTrack),
            "noisy_event" | "noisy" | "trk-007" => Ok(ScenarioId::NoisyEvent),
            "high_occupancy" | "occupancy" | "trk-008" => Ok(ScenarioId::HighOccupancy),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
        assert!("split_brain".parse::<ScenarioId>().is_err());
        assert_eq!("TRK-003".parse::<ScenarioId>(), Ok(ScenarioId::SharedHit));
    }
}
