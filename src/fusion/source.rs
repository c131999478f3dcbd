//! Sensor tracks: the fusable unit one sensor reports for one target

use core::cmp::Reverse;

use crate::types::ids::{SensorId, SourceKey, TargetId, Tick};
use crate::types::spaces::{GlobalCovariance, GlobalPoint};

use super::arena::TrackKey;

/// Role of a sensor track inside its fused track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The most accurate contributor; its estimate anchors correlation.
    Head,
    /// Any other contributor.
    Additional,
}

/// Fusion bookkeeping of a member sensor track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Membership {
    /// Stable key of the owning fused track
    pub track: TrackKey,
    /// Current track number (position in the fused-track array)
    pub number: usize,
    /// Head or additional
    pub role: Role,
}

/// Ordering key for contributor priority; smaller is better.
///
/// Full-position tracks rank above bearing-only tracks, then auto-track mode
/// above track-while-scan, then the most recently updated first. The sensor id
/// breaks the remaining ties.
pub type PriorityKey = (bool, bool, Reverse<Tick>, SensorId);

/// One sensor's estimate of one target at one tick.
///
/// Created by the sensor controller each reporting cycle. Once handed to the
/// fusion engine, the engine owns the membership fields; a trace is a member
/// of at most one fused track.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTrace {
    /// Reporting sensor
    pub sensor: SensorId,
    /// Tracked target
    pub target: TargetId,
    /// Antenna phase centre in the common frame
    pub sensor_position: GlobalPoint,
    /// Estimated position in the common frame
    pub position: GlobalPoint,
    /// Estimated velocity in the common frame
    pub velocity: GlobalPoint,
    /// Position covariance in the common frame
    pub covariance: GlobalCovariance,
    /// No usable range (jammer track)
    pub bearing_only: bool,
    /// Tracked in the dedicated auto-track mode
    pub auto_track: bool,
    /// Tick of the estimate
    pub updated: Tick,
    /// Generalized distance to the head of the owning fused track
    pub distance_to_head: f64,
    membership: Option<Membership>,
}

impl SourceTrace {
    /// Creates a free (non-member) sensor track.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sensor: SensorId,
        target: TargetId,
        sensor_position: GlobalPoint,
        position: GlobalPoint,
        velocity: GlobalPoint,
        covariance: GlobalCovariance,
        bearing_only: bool,
        updated: Tick,
    ) -> Self {
        Self {
            sensor,
            target,
            sensor_position,
            position,
            velocity,
            covariance,
            bearing_only,
            auto_track: false,
            updated,
            distance_to_head: 0.0,
            membership: None,
        }
    }

    /// Marks the track as produced in auto-track mode.
    pub fn with_auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = auto_track;
        self
    }

    /// `(sensor, target)` key.
    #[inline]
    pub fn key(&self) -> SourceKey {
        SourceKey::new(self.sensor, self.target)
    }

    /// True if the trace contributes to a fused track.
    #[inline]
    pub fn is_member(&self) -> bool {
        self.membership.is_some()
    }

    /// Membership bookkeeping, if any.
    #[inline]
    pub fn membership(&self) -> Option<&Membership> {
        self.membership.as_ref()
    }

    /// Number of the owning fused track, `None` if free.
    #[inline]
    pub fn track_number(&self) -> Option<usize> {
        self.membership.map(|m| m.number)
    }

    /// True if the trace heads its fused track.
    #[inline]
    pub fn is_head(&self) -> bool {
        matches!(self.membership, Some(Membership { role: Role::Head, .. }))
    }

    /// Direction from the sensor to the reported position.
    #[inline]
    pub fn ray(&self) -> GlobalPoint {
        self.position - self.sensor_position
    }

    /// Contributor priority; see [`PriorityKey`].
    #[inline]
    pub fn priority(&self) -> PriorityKey {
        (self.bearing_only, !self.auto_track, Reverse(self.updated), self.sensor)
    }

    /// Replaces the estimate with a newer report of the same `(sensor, target)`,
    /// keeping the fusion bookkeeping.
    pub(crate) fn refresh_from(&mut self, newer: SourceTrace) {
        let membership = self.membership;
        let distance = self.distance_to_head;
        *self = newer;
        self.membership = membership;
        self.distance_to_head = distance;
    }

    pub(crate) fn attach(&mut self, track: TrackKey, number: usize, role: Role, distance: f64) {
        self.membership = Some(Membership {
            track,
            number,
            role,
        });
        self.distance_to_head = distance;
    }

    pub(crate) fn detach(&mut self) {
        self.membership = None;
        self.distance_to_head = 0.0;
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        if let Some(m) = self.membership.as_mut() {
            m.role = role;
        }
    }

    pub(crate) fn set_number(&mut self, number: usize) {
        if let Some(m) = self.membership.as_mut() {
            m.number = number;
        }
    }
}
