//! Per-sensor track controller
//!
//! Each sensor runs one [`AlphaBetaFilter`] state per tracked target in its
//! own biconical frame. Every reporting interval the controller measures the
//! targets it tracks, steps their filters and converts the estimates into
//! common-frame [`SourceTrace`]s for the command post.
//!
//! Conversions back to the common frame go through the *nominal* rotation:
//! the tracker does not know the calibration error of its own mount.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::coords::{zero_range_terms, Alignment};
use crate::filters::alpha_beta::{AlphaBetaFilter, AngularMeasurement, FilterState};
use crate::fusion::source::SourceTrace;
use crate::models::{Sensor, Target};
use crate::types::ids::{SensorId, TargetId, Tick};
use crate::{FusionError, Result};

/// What one sensor produced on one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReport {
    /// Fresh sensor tracks
    pub traces: Vec<SourceTrace>,
    /// Targets whose track was ended this tick
    pub lost: Vec<TargetId>,
}

/// Track controller of one sensor.
#[derive(Debug, Clone)]
pub struct SensorTracker {
    sensor: Sensor,
    filter: AlphaBetaFilter,
    tracks: BTreeMap<TargetId, FilterState>,
}

impl SensorTracker {
    /// Creates a controller with no tracks.
    pub fn new(sensor: Sensor) -> Self {
        let filter = AlphaBetaFilter::new(sensor.config().filter_config());
        Self {
            sensor,
            filter,
            tracks: BTreeMap::new(),
        }
    }

    /// Identifier of the radar this tracker runs on.
    #[inline]
    pub fn id(&self) -> SensorId {
        self.sensor.id()
    }

    /// The radar model.
    #[inline]
    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    /// Mutable sensor access, e.g. to inject a calibration error.
    #[inline]
    pub fn sensor_mut(&mut self) -> &mut Sensor {
        &mut self.sensor
    }

    /// True if the sensor holds a track on `target`.
    #[inline]
    pub fn is_tracking(&self, target: TargetId) -> bool {
        self.tracks.contains_key(&target)
    }

    /// Tracked targets in id order.
    pub fn tracked(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.tracks.keys().copied()
    }

    /// Filter state of a tracked target.
    pub fn state(&self, target: TargetId) -> Option<&FilterState> {
        self.tracks.get(&target)
    }

    /// Starts a cold filter on a target inside coverage.
    pub fn begin_track(&mut self, target: &Target, tick: Tick) -> Result<()> {
        if !self.sensor.in_coverage(&target.position_at(tick)) {
            return Err(FusionError::OutsideCoverage {
                sensor: self.id(),
                target: target.id,
            });
        }
        self.tracks.entry(target.id).or_default();
        info!(sensor = %self.id(), target = %target.id, tick = tick.0, "track started");
        Ok(())
    }

    /// Discards the filter of a target. Returns false if it was not tracked.
    pub fn end_track(&mut self, target: TargetId) -> bool {
        let ended = self.tracks.remove(&target).is_some();
        if ended {
            info!(sensor = %self.id(), %target, "track ended");
        }
        ended
    }

    /// Runs one filter cycle on a measurement of a tracked target.
    pub fn observe(&mut self, target: TargetId, measurement: &AngularMeasurement) -> Result<()> {
        let sensor = self.id();
        let state = self
            .tracks
            .get_mut(&target)
            .ok_or(FusionError::UnknownTarget { sensor, target })?;
        self.filter.step(state, measurement);
        Ok(())
    }

    /// Common-frame sensor track of a tracked target.
    ///
    /// Bearing-only tracks have the range row and column of their covariance
    /// zeroed before conversion.
    pub fn source_trace(&self, target: TargetId, tick: Tick) -> Result<SourceTrace> {
        let state = self.tracks.get(&target).ok_or(FusionError::UnknownTarget {
            sensor: self.id(),
            target,
        })?;
        let frame = self.sensor.frame();
        let estimate = &state.estimate;

        let position = frame.biconical_to_global(estimate, Alignment::Nominal);
        let velocity =
            frame.biconical_rate_to_global_velocity(&state.estimate_velocity, estimate, Alignment::Nominal)?;
        let biconical_cov = if state.has_range() {
            state.estimate_covariance()
        } else {
            zero_range_terms(&state.estimate_covariance())
        };
        let covariance = frame.biconical_covariance_to_global(&biconical_cov, estimate, Alignment::Nominal)?;

        Ok(SourceTrace::new(
            self.id(),
            target,
            frame.origin(),
            position,
            velocity,
            covariance,
            !state.has_range(),
            tick,
        )
        .with_auto_track(self.sensor.config().auto_track))
    }

    /// True on ticks where the sensor reports.
    #[inline]
    pub fn is_report_tick(&self, tick: Tick) -> bool {
        tick.0 % self.sensor.config().report_every_ticks == 0
    }

    /// One sensor tick: acquires targets entering coverage, ends tracks on
    /// targets that left it, measures and filters the rest and reports them.
    ///
    /// A target whose measurement or conversion fails is skipped for this
    /// tick.
    pub fn cycle<R: Rng + ?Sized>(&mut self, targets: &[Target], tick: Tick, rng: &mut R) -> SensorReport {
        let mut report = SensorReport::default();
        if !self.is_report_tick(tick) {
            return report;
        }

        let vanished: Vec<TargetId> = self
            .tracked()
            .filter(|id| !targets.iter().any(|t| t.id == *id))
            .collect();
        for id in vanished {
            self.end_track(id);
            report.lost.push(id);
        }

        for target in targets {
            let visible = self.sensor.in_coverage(&target.position_at(tick));
            match (visible, self.is_tracking(target.id)) {
                (false, false) => continue,
                (false, true) => {
                    self.end_track(target.id);
                    report.lost.push(target.id);
                    continue;
                }
                (true, false) => {
                    if let Err(err) = self.begin_track(target, tick) {
                        warn!(sensor = %self.id(), target = %target.id, %err, "acquisition failed");
                        continue;
                    }
                }
                (true, true) => {}
            }

            let trace = self
                .sensor
                .measure(target, tick, rng)
                .and_then(|m| self.observe(target.id, &m))
                .and_then(|()| self.source_trace(target.id, tick));
            match trace {
                Ok(trace) => report.traces.push(trace),
                Err(err) => warn!(sensor = %self.id(), target = %target.id, %err, "no report this tick"),
            }
        }
        debug!(
            sensor = %self.id(),
            tick = tick.0,
            reported = report.traces.len(),
            lost = report.lost.len(),
            "sensor cycle"
        );
        report
    }
}
