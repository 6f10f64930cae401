//! Two Tracks Demo
//! ===============
//!
//! Builds a four-station detector with one large cell per station, places two
//! straight lines plus a stray noise hit, and prints what the finder returns.
//!
//! Run:
//! ```bash
//! cargo run --example two_tracks_demo
//! ```

use nalgebra::Vector3;
use tracklet_core::{FinderConfig, Station, StationResolution, StationTable, TrackFinder};
use tracklet_env::{ChannelCell, ChannelId, NoCalibration, PlanarGeometry, RawDetection};

const C_LIGHT: f64 = 29.9792458;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Two Tracks Demo");
    println!("===============\n");

    let mut geometry = PlanarGeometry::new();
    let mut stations = Vec::new();
    for s in 0..4u32 {
        let z = 100.0 * (s + 1) as f64;
        geometry.insert(ChannelCell::new(ChannelId(s), Vector3::new(0.0, 0.0, z), 200.0, 200.0))?;
        stations.push(
            Station::new(s)
                .with_channels([ChannelId(s)])
                .with_resolution(StationResolution::new(0.08, 0.5, 0.5)),
        );
    }
    let finder = TrackFinder::new(FinderConfig::default(), StationTable::new(stations)?)?;

    // (x0, y0, tx, ty, t0)
    let lines = [(0.0, 0.0, 0.08, -0.02, 1.0), (-3.0, 2.0, -0.05, 0.06, 4.0)];
    let mut detections = Vec::new();
    for (x0, y0, tx, ty, t0) in lines {
        let norm = (1.0f64 + tx * tx + ty * ty).sqrt();
        for s in 0..4u32 {
            let z = 100.0 * (s + 1) as f64;
            let position = Vector3::new(x0 + tx * z, y0 + ty * z, z);
            let time = t0 + z * norm / C_LIGHT;
            detections.push(RawDetection::new(detections.len(), ChannelId(s), s, position, time));
        }
    }
    detections.push(RawDetection::new(
        detections.len(),
        ChannelId(2),
        2,
        Vector3::new(40.0, -35.0, 300.0),
        17.0,
    ));

    let result = finder.find_event(&detections, &geometry, &NoCalibration);

    println!("📊 {} detections, {} tracks\n", detections.len(), result.tracks.len());
    for track in &result.tracks {
        let s = &track.fit.spatial;
        println!(
            "  track {}: hits {:?}  tx={:+.4} ty={:+.4}  v={:.2} cm/ns  chi2={:.3}",
            track.id,
            track.source_indices(),
            s.tx,
            s.ty,
            track.fit.temporal.velocity(),
            track.chi2()
        );
    }
    println!("\n  unused: {:?}", result.unused_hits);
    if let Some(vertex) = &result.vertex {
        println!("  event vertex: ({:.2}, {:.2}) at t={:.2} ns", vertex.x, vertex.y, vertex.time);
    }
    println!(
        "\n  seeds={} commits={} rollbacks={} invalidations={}",
        result.stats.seeds_created,
        result.stats.commits,
        result.stats.rollbacks,
        result.stats.invalidations
    );

    Ok(())
}
