//! Target kinematics
//!
//! Targets are external input to the network: the demo and the tests move
//! them along straight lines.

use serde::{Deserialize, Serialize};

use crate::types::ids::{TargetId, Tick};
use crate::types::spaces::GlobalPoint;

/// A target flying a straight line at constant velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Target identifier
    pub id: TargetId,
    /// Position at `start_tick` (m, common frame)
    pub start: [f64; 3],
    /// Velocity (m/s, common frame)
    pub velocity: [f64; 3],
    /// Tick the target appears
    pub start_tick: Tick,
    /// Self-screening jammer: sensors see it bearing-only
    pub jammer: bool,
}

impl Target {
    /// An aircraft.
    pub fn new(id: TargetId, start: [f64; 3], velocity: [f64; 3]) -> Self {
        Self {
            id,
            start,
            velocity,
            start_tick: Tick::ZERO,
            jammer: false,
        }
    }

    /// A self-screening jammer.
    pub fn jammer(id: TargetId, start: [f64; 3], velocity: [f64; 3]) -> Self {
        Self {
            jammer: true,
            ..Self::new(id, start, velocity)
        }
    }

    /// True position at `tick`. Before `start_tick` the start position.
    pub fn position_at(&self, tick: Tick) -> GlobalPoint {
        let t = tick.since(self.start_tick) as f64 / crate::types::ids::TICKS_PER_SECOND as f64;
        GlobalPoint::from_array(self.start) + GlobalPoint::from_array(self.velocity).scale(t)
    }

    /// Velocity as a common-frame vector.
    #[inline]
    pub fn velocity(&self) -> GlobalPoint {
        GlobalPoint::from_array(self.velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_line() {
        let t = Target::new(TargetId(1), [0.0, 1000.0, 5000.0], [-200.0, 0.0, 10.0]);
        let p = t.position_at(Tick(40));
        assert_eq!(p, GlobalPoint::from_array([-400.0, 1000.0, 5020.0]));
    }

    #[test]
    fn test_late_start_holds_position() {
        let mut t = Target::jammer(TargetId(2), [10.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        t.start_tick = Tick(100);
        assert!(t.jammer);
        assert_eq!(t.position_at(Tick(20)), GlobalPoint::from_array([10.0, 0.0, 0.0]));
    }
}
