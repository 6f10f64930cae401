//! Property tests: structural guarantees of the finder over random events.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tracklet_core::{FinderConfig, TrackFinder};
use tracklet_sim::{check_invariants, DetectorSetup, Oracle, SimConfig};

fn setup(noise: usize, efficiency: f64, time_offset: f64) -> DetectorSetup {
    DetectorSetup::new(SimConfig {
        noise_per_station: noise,
        efficiency,
        station_time_offset: time_offset,
        ..Default::default()
    })
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_tracks_respect_ownership_and_minimality(
        seed in any::<u64>(),
        particles in 0usize..6,
        noise in 0usize..6,
        efficiency in 0.7f64..=1.0,
    ) {
        let setup = setup(noise, efficiency, 0.0);
        let event = Oracle::new(seed).generate_event(&setup, particles);
        let config = FinderConfig::default();
        let finder = TrackFinder::new(config.clone(), setup.stations.clone()).unwrap();
        let result = finder.find_event(&event.detections, &setup.geometry, &setup.calibration);

        prop_assert!(check_invariants(&result, &config).is_ok(), "{:?}", check_invariants(&result, &config));
        for track in &result.tracks {
            prop_assert!(track.detection_count() >= config.min_hits);
            prop_assert!(track.chi2() <= config.chi2_max);
        }
    }

    #[test]
    fn prop_used_and_unused_partition_detections(
        seed in any::<u64>(),
        particles in 0usize..5,
        noise in 0usize..8,
    ) {
        let setup = setup(noise, 1.0, 0.0);
        let event = Oracle::new(seed).generate_event(&setup, particles);
        let finder = TrackFinder::new(FinderConfig::default(), setup.stations.clone()).unwrap();
        let result = finder.find_event(&event.detections, &setup.geometry, &setup.calibration);

        let mut seen = BTreeSet::new();
        for track in &result.tracks {
            for index in track.source_indices() {
                prop_assert!(seen.insert(index));
            }
        }
        for &index in &result.unused_hits {
            prop_assert!(seen.insert(index));
        }
        prop_assert_eq!(seen.len(), event.detections.len());
        prop_assert_eq!(result.stats.unused_hits, result.unused_hits.len());
    }

    #[test]
    fn prop_rerun_is_identical(
        seed in any::<u64>(),
        particles in 1usize..5,
        noise in 0usize..4,
        time_offset in 0.0f64..2.0,
    ) {
        let setup = setup(noise, 0.95, time_offset);
        let event = Oracle::new(seed).generate_event(&setup, particles);
        let finder = TrackFinder::new(FinderConfig::default(), setup.stations.clone()).unwrap();

        let first = finder.find_event(&event.detections, &setup.geometry, &setup.calibration);
        let second = finder.find_event(&event.detections, &setup.geometry, &setup.calibration);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_track_stations_are_distinct(
        seed in any::<u64>(),
        particles in 1usize..6,
    ) {
        let setup = setup(2, 1.0, 0.0);
        let event = Oracle::new(seed).generate_event(&setup, particles);
        let finder = TrackFinder::new(FinderConfig::default(), setup.stations.clone()).unwrap();
        let result = finder.find_event(&event.detections, &setup.geometry, &setup.calibration);

        for track in &result.tracks {
            let stations = track.stations();
            let distinct: BTreeSet<u32> = stations.iter().copied().collect();
            prop_assert_eq!(distinct.len(), stations.len());
        }
    }
}
