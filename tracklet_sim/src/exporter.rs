//! JSON exporter for offline inspection of searched events.
//!
//! Each exported event carries the detections with their truth labels and
//! the found tracks as line parameters, so a plotting script can overlay
//! reconstruction on truth without linking against the finder.

use crate::error::SimError;
use crate::runner::{EventRecord, ScenarioResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracklet_core::FoundTrack;

/// One detection with its truth label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPoint {
    pub index: usize,
    pub station: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle: Option<usize>,
}

/// A found track reduced to its line parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackLine {
    pub track_id: u32,
    pub x0: f64,
    pub y0: f64,
    pub z_ref: f64,
    pub tx: f64,
    pub ty: f64,
    pub t0: f64,
    /// Inverse velocity (ns/cm)
    pub tt: f64,
    pub chi2: f64,
    pub hits: Vec<usize>,
    pub includes_vertex: bool,
}

impl From<&FoundTrack> for TrackLine {
    fn from(track: &FoundTrack) -> Self {
        let s = &track.fit.spatial;
        Self {
            track_id: track.id.0,
            x0: s.x0,
            y0: s.y0,
            z_ref: s.z_ref,
            tx: s.tx,
            ty: s.ty,
            t0: track.fit.temporal.t0,
            tt: track.fit.temporal.tt,
            chi2: s.chi2,
            hits: track.source_indices(),
            includes_vertex: track.includes_vertex,
        }
    }
}

/// A single exported event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: usize,
    pub detections: Vec<DetectionPoint>,
    pub tracks: Vec<TrackLine>,
    pub unused_hits: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl EventFrame {
    pub fn from_record(event: usize, record: &EventRecord) -> Self {
        let detections = record
            .event
            .detections
            .iter()
            .zip(&record.event.truth)
            .map(|(d, truth)| DetectionPoint {
                index: d.source_index,
                station: d.station,
                x: d.position.x,
                y: d.position.y,
                z: d.position.z,
                t: d.time,
                particle: *truth,
            })
            .collect();

        Self {
            event,
            detections,
            tracks: record.result.tracks.iter().map(TrackLine::from).collect(),
            unused_hits: record.result.unused_hits.clone(),
            skipped: record.result.stats.skipped.map(|r| r.to_string()),
        }
    }
}

/// Complete scenario export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All searched events
    pub events: Vec<EventFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            events: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Builds an export from a finished run.
    pub fn from_run(result: &ScenarioResult, records: &[EventRecord]) -> Self {
        let mut export = Self::new(&result.scenario, result.seed);
        for record in records {
            export.add_event(record);
        }
        export.finalize(result.passed, result.failure_reason.clone());
        export
    }

    pub fn add_event(&mut self, record: &EventRecord) {
        let frame = EventFrame::from_record(self.events.len(), record);
        self.events.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    pub fn track_count(&self) -> usize {
        self.events.iter().map(|e| e.tracks.len()).sum()
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_colinear_triplet() {
        let (result, records) = ScenarioRunner::new(42).run_recorded(ScenarioId::ColinearTriplet);
        let export = SimExport::from_run(&result, &records);

        assert!(export.passed);
        assert_eq!(export.events.len(), 1);
        assert_eq!(export.track_count(), 1);

        let frame = &export.events[0];
        assert_eq!(frame.detections.len(), 3);
        assert!(frame.detections.iter().all(|d| d.particle == Some(0)));
        assert_eq!(frame.tracks[0].hits, vec![0, 1, 2]);
        assert!(frame.skipped.is_none());
    }

    #[test]
    fn test_export_serializes_skip_reason() {
        let (result, records) = ScenarioRunner::new(5)
            .with_events(1)
            .run_recorded(ScenarioId::HighOccupancy);
        let export = SimExport::from_run(&result, &records);
        let json = serde_json::to_string(&export).unwrap();

        assert!(export.events[0].skipped.is_some());
        assert!(json.contains("\"skipped\""));
        assert!(json.contains("high_occupancy"));
    }
}
