//! Common helpers for the integration tests

#![allow(dead_code)]

use mfrnet::coords::{cartesian_to_spherical, spherical_covariance_to_cartesian};
use mfrnet::prelude::*;
use nalgebra::Matrix3;

/// A full-position sensor track with a diagonal covariance.
pub fn full_trace(sensor: u32, target: u32, position: [f64; 3], variance: f64, tick: u64) -> SourceTrace {
    SourceTrace::new(
        SensorId(sensor),
        TargetId(target),
        GlobalPoint::zeros(),
        GlobalPoint::from_array(position),
        GlobalPoint::zeros(),
        GlobalCovariance::from_diagonal(&nalgebra::vector![variance, variance, variance]),
        false,
        Tick(tick),
    )
}

/// A full-position sensor track whose covariance is given in spherical
/// `[range, azimuth, elevation]` coordinates at the track position.
pub fn spherical_trace(
    sensor: u32,
    target: u32,
    position: [f64; 3],
    spherical_variance: [f64; 3],
) -> SourceTrace {
    let p = GlobalPoint::from_array(position);
    let s = cartesian_to_spherical(&p);
    let cov = Covariance3::<Spherical>::from_diagonal(&nalgebra::Vector3::from(spherical_variance));
    SourceTrace::new(
        SensorId(sensor),
        TargetId(target),
        GlobalPoint::zeros(),
        p,
        GlobalPoint::zeros(),
        spherical_covariance_to_cartesian::<Global>(&cov, &s),
        false,
        Tick(0),
    )
}

/// A bearing-only sensor track from `site` whose anchor is `through`, with
/// isotropic lateral spread `sigma` (m) at the anchor and none along the ray.
pub fn bearing_trace(sensor: u32, target: u32, site: [f64; 3], through: [f64; 3], sigma: f64) -> SourceTrace {
    let site = GlobalPoint::from_array(site);
    let anchor = GlobalPoint::from_array(through);
    let ray = anchor - site;
    let u = ray.scale(1.0 / ray.norm());
    let u = u.as_svector();
    let lateral = (Matrix3::identity() - u * u.transpose()) * (sigma * sigma);
    SourceTrace::new(
        SensorId(sensor),
        TargetId(target),
        site,
        anchor,
        GlobalPoint::zeros(),
        GlobalCovariance::from_matrix(lateral),
        true,
        Tick(0),
    )
}

/// Fusion engine with the default gates.
pub fn fusion_array() -> MultiSensorTrackArray {
    MultiSensorTrackArray::new(FusionConfig::default()).unwrap()
}

/// Numbers of every contributor's owning track, as seen from the sensor tracks.
pub fn owning_numbers(array: &MultiSensorTrackArray) -> Vec<(SourceKey, Option<usize>)> {
    array.sources().map(|s| (s.key(), s.track_number())).collect()
}

/// A north-facing radar at `x` on the east axis.
pub fn radar(id: u32, x: f64) -> SensorTracker {
    let config = SensorConfig {
        id: SensorId(id),
        position: [x, 0.0, 0.0],
        frame: FrameAngles::pointing(10.0, 0.0, 0.1),
        max_range: 80_000.0,
        cone_half_angle: 1.0,
        sigma: [25.0, 1e-3, 1e-3],
        report_every_ticks: TICKS_PER_SECOND,
        jammer_range: 40_000.0,
        overload_g: 5.0,
        auto_track: false,
    };
    SensorTracker::new(Sensor::new(config).unwrap())
}
