//! Registration rows
//!
//! One flat record per sensor track per tick, the shape a recorder or an
//! operator display consumes. Rows serialize with serde so the caller picks
//! the format.

use serde::{Deserialize, Serialize};

use crate::types::ids::Tick;

use super::source::SourceTrace;

/// Snapshot of one sensor track and its fusion membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRow {
    /// Tick of the snapshot
    pub tick: u64,
    /// Reporting sensor
    pub sensor: u32,
    /// Target as numbered by the sensor
    pub target: u32,
    /// Owning fused-track number, `-1` when free
    pub track_number: i64,
    /// Generalized distance to the owning head (`0` for heads and free tracks)
    pub distance: f64,
    /// Position, east (m)
    pub x: f64,
    /// Position, up (m)
    pub y: f64,
    /// Position, north (m)
    pub z: f64,
    /// Velocity, east (m/s)
    pub vx: f64,
    /// Velocity, up (m/s)
    pub vy: f64,
    /// Velocity, north (m/s)
    pub vz: f64,
    /// Position covariance, east variance (m²)
    pub cxx: f64,
    /// Position covariance, east-up (m²)
    pub cxy: f64,
    /// Position covariance, east-north (m²)
    pub cxz: f64,
    /// Position covariance, up variance (m²)
    pub cyy: f64,
    /// Position covariance, up-north (m²)
    pub cyz: f64,
    /// Position covariance, north variance (m²)
    pub czz: f64,
    /// Sensor track has no range
    pub bearing_only: bool,
    /// Sensor track heads its fused track
    pub head: bool,
}

impl RegistrationRow {
    /// Flattens a sensor track.
    pub fn from_trace(tick: Tick, trace: &SourceTrace) -> Self {
        let p = trace.position.as_svector();
        let v = trace.velocity.as_svector();
        let c = trace.covariance.as_matrix();
        Self {
            tick: tick.0,
            sensor: trace.sensor.0,
            target: trace.target.0,
            track_number: trace.track_number().map_or(-1, |n| n as i64),
            distance: trace.distance_to_head,
            x: p.x,
            y: p.y,
            z: p.z,
            vx: v.x,
            vy: v.y,
            vz: v.z,
            cxx: c[(0, 0)],
            cxy: c[(0, 1)],
            cxz: c[(0, 2)],
            cyy: c[(1, 1)],
            cyz: c[(1, 2)],
            czz: c[(2, 2)],
            bearing_only: trace.bearing_only,
            head: trace.is_head(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ids::{SensorId, TargetId};
    use crate::types::spaces::{GlobalCovariance, GlobalPoint};

    #[test]
    fn test_free_trace_row() {
        let trace = SourceTrace::new(
            SensorId(3),
            TargetId(9),
            GlobalPoint::zeros(),
            GlobalPoint::from_array([1.0, 2.0, 3.0]),
            GlobalPoint::from_array([4.0, 5.0, 6.0]),
            GlobalCovariance::from_matrix(nalgebra::matrix![
                1.0, 0.1, 0.2;
                0.1, 2.0, 0.3;
                0.2, 0.3, 3.0
            ]),
            true,
            Tick(40),
        );
        let row = RegistrationRow::from_trace(Tick(41), &trace);
        assert_eq!(row.tick, 41);
        assert_eq!((row.sensor, row.target), (3, 9));
        assert_eq!(row.track_number, -1);
        assert_eq!((row.x, row.y, row.z), (1.0, 2.0, 3.0));
        assert_eq!((row.vx, row.vy, row.vz), (4.0, 5.0, 6.0));
        assert_eq!((row.cxy, row.cxz, row.cyz), (0.1, 0.2, 0.3));
        assert_eq!((row.cxx, row.cyy, row.czz), (1.0, 2.0, 3.0));
        assert!(row.bearing_only);
        assert!(!row.head);
    }
}
