//! Integration tests for the multi-sensor track array

mod common;

use approx::assert_abs_diff_eq;
use common::{bearing_trace, full_trace, fusion_array, owning_numbers, spherical_trace};
use mfrnet::prelude::*;

fn key(sensor: u32, target: u32) -> SourceKey {
    SourceKey::new(SensorId(sensor), TargetId(target))
}

#[test]
fn test_coincident_reports_fuse_into_one_track() {
    let mut array = fusion_array();
    let p = [1_000.0, 500.0, 8_000.0];
    array.ingest(spherical_trace(1, 1, p, [25.0, 1.0, 0.01]));
    array.ingest(spherical_trace(2, 1, p, [25.0, 1.0, 0.01]));

    let summary = array.cycle(Tick(0));
    assert_eq!(summary.tracks, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.attached, 1);

    let track = array.track(0).unwrap();
    assert_eq!(track.contributor_count(), 2);
    let additional = array.source(track.additional()[0]).unwrap();
    assert_abs_diff_eq!(additional.distance_to_head, 0.0, epsilon = 1e-12);
    assert!(array.is_consistent());
}

#[test]
fn test_intersecting_bearings_triangulate() {
    let a = bearing_trace(1, 1, [1_100.0, 0.0, 0.0], [550.0, 0.0, 5_500.0], 10.0);
    let b = bearing_trace(2, 1, [-1_100.0, 0.0, 0.0], [-550.0, 0.0, 550.0], 10.0);

    let c = correlate(&a, &b, &Gates::default()).unwrap();
    assert_eq!(c.case, CorrelationCase::TwoJammers);
    assert_abs_diff_eq!(c.distance, 0.0, epsilon = 1e-9);
    assert!(c.is_match());

    let mut array = fusion_array();
    array.ingest_all([a, b]);
    array.cycle(Tick(0));
    assert_eq!(array.len(), 1);
    let track = array.track(0).unwrap();
    assert_abs_diff_eq!(*track.position.index(0), 900.0, epsilon = 1e-6);
    assert_abs_diff_eq!(*track.position.index(1), 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(*track.position.index(2), 2_000.0, epsilon = 1e-6);
}

#[test]
fn test_bearing_track_joins_target_on_its_ray() {
    let mut array = fusion_array();
    array.ingest(bearing_trace(2, 1, [5_000.0, 0.0, 0.0], [2_500.0, 0.0, 5_000.0], 10.0));
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 100.0, 0));
    array.cycle(Tick(0));

    assert_eq!(array.len(), 1);
    let track = array.track(0).unwrap();
    // The full-position track outranks the bearing-only one.
    assert_eq!(track.head(), key(1, 1));
    assert_eq!(track.additional(), &[key(2, 1)]);
    assert!(array.source(key(1, 1)).unwrap().is_head());
    assert!(!array.source(key(2, 1)).unwrap().is_head());
    assert_abs_diff_eq!(*track.position.index(2), 10_000.0, epsilon = 1e-6);

    // The bearing adds no range information: along the ray the fused track
    // is as uncertain as the full-position track.
    let u = nalgebra::vector![-1.0, 0.0, 2.0].normalize();
    let along = (u.transpose() * track.covariance.as_matrix() * u)[(0, 0)];
    assert_abs_diff_eq!(along, 100.0, epsilon = 1e-6);
}

#[test]
fn test_triangulated_track_velocity_from_successive_fixes() {
    let mut array = fusion_array();
    array.ingest(bearing_trace(1, 1, [1_100.0, 0.0, 0.0], [550.0, 0.0, 5_500.0], 10.0));
    array.ingest(bearing_trace(2, 1, [-1_100.0, 0.0, 0.0], [-550.0, 0.0, 550.0], 10.0));
    array.cycle(Tick(0));
    assert_eq!(array.len(), 1);

    // One second later both rays cross 100 m further east.
    let mut a = bearing_trace(1, 1, [1_100.0, 0.0, 0.0], [1_050.0, 0.0, 1_000.0], 10.0);
    let mut b = bearing_trace(2, 1, [-1_100.0, 0.0, 0.0], [-50.0, 0.0, 1_000.0], 10.0);
    a.updated = Tick(TICKS_PER_SECOND);
    b.updated = Tick(TICKS_PER_SECOND);
    array.ingest_all([a, b]);
    array.cycle(Tick(TICKS_PER_SECOND));

    assert_eq!(array.len(), 1);
    let track = array.track(0).unwrap();
    assert_eq!(track.contributor_count(), 2);
    assert_abs_diff_eq!(*track.position.index(0), 1_000.0, epsilon = 1e-6);
    assert_abs_diff_eq!(*track.velocity.index(0), 100.0, epsilon = 1e-6);
    assert_abs_diff_eq!(*track.velocity.index(1), 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(*track.velocity.index(2), 0.0, epsilon = 1e-6);
}

#[test]
fn test_ranging_track_demotes_bearing_head() {
    let mut array = fusion_array();
    array.ingest(bearing_trace(1, 1, [1_100.0, 0.0, 0.0], [550.0, 0.0, 5_500.0], 10.0));
    array.ingest(bearing_trace(2, 1, [-1_100.0, 0.0, 0.0], [-550.0, 0.0, 550.0], 10.0));
    array.cycle(Tick(0));
    assert_eq!(array.track(0).unwrap().head(), key(1, 1));

    array.ingest(full_trace(3, 1, [900.0, 0.0, 2_000.0], 25.0, 1));
    array.cycle(Tick(1));

    assert_eq!(array.len(), 1);
    let track = array.track(0).unwrap();
    assert_eq!(track.head(), key(3, 1));
    assert_eq!(track.contributor_count(), 3);
    assert!(array.source(key(3, 1)).unwrap().is_head());
    assert!(!array.source(key(1, 1)).unwrap().is_head());
    assert!(!array.source(key(2, 1)).unwrap().is_head());
    assert!(array.is_consistent());
    assert_abs_diff_eq!(*track.position.index(0), 900.0, epsilon = 1e-6);
    assert_abs_diff_eq!(*track.position.index(2), 2_000.0, epsilon = 1e-6);
}

#[test]
fn test_renumbering_after_removal() {
    let mut array = fusion_array();
    for target in 1..=4 {
        array.ingest(full_trace(1, target, [0.0, 0.0, 10_000.0 * target as f64], 25.0, 0));
    }
    array.cycle(Tick(0));
    assert_eq!(array.len(), 4);

    array.drop_source(key(1, 2));
    assert_eq!(array.len(), 3);
    assert!(array.is_consistent());
    for (i, track) in array.tracks().enumerate() {
        assert_eq!(track.number(), i);
        assert_eq!(array.source(track.head()).unwrap().track_number(), Some(i));
    }
    let numbers = owning_numbers(&array);
    assert_eq!(
        numbers,
        vec![(key(1, 1), Some(0)), (key(1, 3), Some(1)), (key(1, 4), Some(2))]
    );
}

#[test]
fn test_one_contribution_per_sensor() {
    let mut array = fusion_array();
    // Two closely spaced targets seen by two sensors.
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.ingest(full_trace(1, 2, [3.0, 0.0, 10_000.0], 25.0, 0));
    array.ingest(full_trace(2, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.ingest(full_trace(2, 2, [3.0, 0.0, 10_000.0], 25.0, 0));
    array.cycle(Tick(0));

    assert_eq!(array.len(), 2);
    for track in array.tracks() {
        assert_eq!(track.contributor_count(), 2);
        assert!(track.contains_sensor(SensorId(1)));
        assert!(track.contains_sensor(SensorId(2)));
    }
    assert!(array.is_consistent());
}

#[test]
fn test_converging_tracks_are_deduplicated() {
    let mut array = fusion_array();
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.ingest(full_trace(2, 1, [0.0, 0.0, 12_000.0], 25.0, 0));
    array.cycle(Tick(0));
    assert_eq!(array.len(), 2);

    // Sensor 2 refines its estimate onto the first track.
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 25.0, 1));
    array.ingest(full_trace(2, 1, [2.0, 0.0, 10_000.0], 25.0, 1));
    let summary = array.cycle(Tick(1));
    assert_eq!(summary.merged, 1);
    assert_eq!(array.len(), 1);
    assert_eq!(array.track(0).unwrap().head(), key(1, 1));
    assert!(!array.source(key(2, 1)).unwrap().is_member());
    assert!(array.is_consistent());

    // The freed sensor track joins the survivor on the next cycle.
    let summary = array.cycle(Tick(2));
    assert_eq!(summary.attached, 1);
    assert_eq!(array.track(0).unwrap().contributor_count(), 2);
}

#[test]
fn test_auto_track_contributor_becomes_head() {
    let mut array = fusion_array();
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.cycle(Tick(0));
    assert_eq!(array.track(0).unwrap().head(), key(1, 1));

    array.ingest(full_trace(2, 1, [1.0, 0.0, 10_000.0], 25.0, 0).with_auto_track(true));
    array.cycle(Tick(0));
    let track = array.track(0).unwrap();
    assert_eq!(track.head(), key(2, 1));
    assert!(array.source(key(2, 1)).unwrap().is_head());
    let demoted = array.source(key(1, 1)).unwrap();
    assert!(!demoted.is_head());
    assert!(demoted.distance_to_head > 0.0);
}

#[test]
fn test_stale_head_replaced_by_live_contributor() {
    let mut array = fusion_array();
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 25.0, 10));
    array.ingest(full_trace(2, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.cycle(Tick(10));
    assert_eq!(array.track(0).unwrap().head(), key(1, 1));

    // Only sensor 2 keeps reporting.
    for tick in (20..=80).step_by(20) {
        array.ingest(full_trace(2, 1, [0.0, 0.0, 10_000.0], 25.0, tick));
        array.cycle(Tick(tick));
    }
    assert!(array.source(key(1, 1)).is_none());
    assert_eq!(array.len(), 1);
    assert_eq!(array.track(0).unwrap().head(), key(2, 1));
    assert_eq!(array.track(0).unwrap().contributor_count(), 1);
}

#[test]
fn test_three_contributors_fused() {
    let mut array = fusion_array();
    for sensor in 1..=3 {
        array.ingest(full_trace(sensor, 1, [0.0, 0.0, 10_000.0], 30.0, 0));
    }
    array.cycle(Tick(0));
    assert_eq!(array.len(), 1);
    let track = array.track(0).unwrap();
    assert_eq!(track.contributor_count(), 3);
    assert_abs_diff_eq!(track.covariance.as_matrix()[(0, 0)], 10.0, epsilon = 1e-9);
}

#[test]
fn test_registration_rows_mark_heads() {
    let mut array = fusion_array();
    array.ingest(full_trace(1, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.ingest(full_trace(2, 1, [0.0, 0.0, 10_000.0], 25.0, 0));
    array.cycle(Tick(0));

    let rows = array.registration_rows(Tick(0));
    assert_eq!(rows.len(), 2);
    assert!(rows[0].head);
    assert!(!rows[1].head);
    assert!(rows.iter().all(|r| r.track_number == 0));
}
