//! Multi-sensor track array
//!
//! The command post's fused picture. Each fused track aggregates one head
//! sensor track and any number of additional sensor tracks from other
//! sensors that correlate with the head.
//!
//! One [`MultiSensorTrackArray::cycle`] runs, in order:
//!
//! 1. eviction of sensor tracks that stopped reporting
//! 2. re-test of every additional contributor against its own head
//! 3. correlation of free sensor tracks against every fused-track head
//! 4. contributor re-sort by priority (head promotion)
//! 5. duplicate elimination between fused tracks
//! 6. fused estimation
//!
//! Track numbers are renumbered after every insertion or removal so that the
//! track at position `i` has number `i`, and every contributor records `i`.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::ids::{SensorId, SourceKey, Tick};
use crate::types::spaces::{GlobalCovariance, GlobalPoint};
use crate::{FusionError, Result};

use super::arena::{Arena, TrackKey};
use super::correlation::{correlate, gate, Gates, GATE_2DOF, GATE_3DOF};
use super::estimators::{fuse_contributors, Estimate};
use super::report::RegistrationRow;
use super::source::{Role, SourceTrace};

/// Ticks without a report after which a sensor track is dropped (3 s).
pub const DEFAULT_MAX_SOURCE_AGE_TICKS: u64 = 60;

// ============================================================================
// Configuration
// ============================================================================

/// Fusion engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Gate for two full-position tracks
    pub gate_3dof: f64,
    /// Gate for pairs involving a bearing-only track
    pub gate_2dof: f64,
    /// Staleness limit for sensor tracks
    pub max_source_age_ticks: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gate_3dof: GATE_3DOF,
            gate_2dof: GATE_2DOF,
            max_source_age_ticks: DEFAULT_MAX_SOURCE_AGE_TICKS,
        }
    }
}

impl FusionConfig {
    /// Correlation gates.
    #[inline]
    pub fn gates(&self) -> Gates {
        Gates {
            three_dof: self.gate_3dof,
            two_dof: self.gate_2dof,
        }
    }

    /// Rejects non-positive gates and a zero staleness limit.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("gate_3dof", self.gate_3dof), ("gate_2dof", self.gate_2dof)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.max_source_age_ticks == 0 {
            return Err(FusionError::InvalidConfig(
                "max_source_age_ticks must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Fused Track
// ============================================================================

/// A fused multi-sensor track.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedTrack {
    key: TrackKey,
    number: usize,
    head: SourceKey,
    additional: Vec<SourceKey>,
    /// Fused position
    pub position: GlobalPoint,
    /// Fused velocity
    pub velocity: GlobalPoint,
    /// Fused position covariance
    pub covariance: GlobalCovariance,
    /// Tick the track was created
    pub created: Tick,
    /// Tick of the last fused estimate
    pub updated: Tick,
    previous_position: Option<(Tick, GlobalPoint)>,
}

impl FusedTrack {
    fn seeded(key: TrackKey, number: usize, head: &SourceTrace, tick: Tick) -> Self {
        Self {
            key,
            number,
            head: head.key(),
            additional: Vec::new(),
            position: head.position,
            velocity: head.velocity,
            covariance: head.covariance,
            created: tick,
            updated: tick,
            previous_position: None,
        }
    }

    /// Stable key.
    #[inline]
    pub fn key(&self) -> TrackKey {
        self.key
    }

    /// Track number (position in the array).
    #[inline]
    pub fn number(&self) -> usize {
        self.number
    }

    /// Head contributor.
    #[inline]
    pub fn head(&self) -> SourceKey {
        self.head
    }

    /// Additional contributors in priority order.
    #[inline]
    pub fn additional(&self) -> &[SourceKey] {
        &self.additional
    }

    /// Head followed by the additional contributors.
    pub fn contributors(&self) -> impl Iterator<Item = SourceKey> + '_ {
        core::iter::once(self.head).chain(self.additional.iter().copied())
    }

    /// Number of contributors.
    #[inline]
    pub fn contributor_count(&self) -> usize {
        1 + self.additional.len()
    }

    /// True if a contributor comes from `sensor`.
    pub fn contains_sensor(&self, sensor: SensorId) -> bool {
        self.contributors().any(|k| k.sensor == sensor)
    }

    /// True if no sensor contributes to both tracks.
    pub fn is_sensor_disjoint(&self, other: &FusedTrack) -> bool {
        !self.contributors().any(|k| other.contains_sensor(k.sensor))
    }
}

// ============================================================================
// Cycle bookkeeping
// ============================================================================

/// A fused track a sensor track correlated with.
///
/// Produced by the correlation pass and consumed immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Candidate fused track
    pub track: TrackKey,
    /// Generalized distance to its head
    pub distance: f64,
}

/// What one fusion cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Tick of the cycle
    pub tick: Tick,
    /// New fused tracks
    pub created: usize,
    /// Sensor tracks attached to existing fused tracks
    pub attached: usize,
    /// Additional contributors that no longer matched their head
    pub detached: usize,
    /// Fused tracks removed as duplicates
    pub merged: usize,
    /// Stale sensor tracks dropped
    pub evicted: usize,
    /// Fused tracks after the cycle
    pub tracks: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// The command post's fused track array.
///
/// ```
/// use mfrnet::prelude::*;
///
/// let mut array = MultiSensorTrackArray::new(FusionConfig::default()).unwrap();
/// for sensor in [1, 2] {
///     array.ingest(SourceTrace::new(
///         SensorId(sensor),
///         TargetId(1),
///         GlobalPoint::zeros(),
///         GlobalPoint::from_array([1000.0, 500.0, 8000.0]),
///         GlobalPoint::zeros(),
///         GlobalCovariance::from_diagonal(&nalgebra::vector![25.0, 25.0, 25.0]),
///         false,
///         Tick(0),
///     ));
/// }
/// let summary = array.cycle(Tick(0));
/// assert_eq!(summary.tracks, 1);
/// assert_eq!(array.track(0).unwrap().contributor_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MultiSensorTrackArray {
    config: FusionConfig,
    sources: BTreeMap<SourceKey, SourceTrace>,
    tracks: Arena<FusedTrack>,
}

impl MultiSensorTrackArray {
    /// Creates an empty array.
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sources: BTreeMap::new(),
            tracks: Arena::new(),
        })
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Number of fused tracks.
    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if there are no fused tracks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Fused tracks in number order.
    pub fn tracks(&self) -> impl Iterator<Item = &FusedTrack> + '_ {
        self.tracks.iter()
    }

    /// Fused track by number.
    #[inline]
    pub fn track(&self, number: usize) -> Option<&FusedTrack> {
        self.tracks.at(number)
    }

    /// Fused track by stable key.
    #[inline]
    pub fn track_by_key(&self, key: TrackKey) -> Option<&FusedTrack> {
        self.tracks.get(key)
    }

    /// Sensor track by key.
    #[inline]
    pub fn source(&self, key: SourceKey) -> Option<&SourceTrace> {
        self.sources.get(&key)
    }

    /// All known sensor tracks, ordered by key.
    pub fn sources(&self) -> impl Iterator<Item = &SourceTrace> + '_ {
        self.sources.values()
    }

    /// Contributing sensor tracks of a fused track, head first.
    pub fn members(&self, track: &FusedTrack) -> Vec<&SourceTrace> {
        track
            .contributors()
            .filter_map(|k| self.sources.get(&k))
            .collect()
    }

    /// Stores a sensor track report, replacing the previous report of the
    /// same `(sensor, target)` but keeping its fusion membership.
    pub fn ingest(&mut self, trace: SourceTrace) {
        match self.sources.entry(trace.key()) {
            Entry::Occupied(mut entry) => entry.get_mut().refresh_from(trace),
            Entry::Vacant(entry) => {
                entry.insert(trace);
            }
        }
    }

    /// Stores a batch of reports.
    pub fn ingest_all(&mut self, traces: impl IntoIterator<Item = SourceTrace>) {
        for trace in traces {
            self.ingest(trace);
        }
    }

    /// Forgets a sensor track (the sensor lost the target).
    ///
    /// A head is replaced by its best additional contributor; a fused track
    /// left without contributors is removed.
    pub fn drop_source(&mut self, key: SourceKey) -> Option<SourceTrace> {
        let removed_track = self.unlink(key);
        let mut trace = self.sources.remove(&key)?;
        trace.detach();
        if removed_track {
            self.renumber();
        }
        debug!(source = %key, "sensor track dropped");
        Some(trace)
    }

    /// Fused tracks whose head correlates with the given sensor track.
    ///
    /// Tracks that already hold a contribution from the same sensor are
    /// skipped.
    pub fn correlation_candidates(&self, key: SourceKey) -> Vec<Candidate> {
        match self.sources.get(&key) {
            Some(trace) => candidates(trace, &self.tracks, &self.sources, &self.config.gates()),
            None => Vec::new(),
        }
    }

    /// Runs one fusion cycle.
    pub fn cycle(&mut self, tick: Tick) -> CycleSummary {
        let evicted = self.evict_stale(tick);
        let detached = self.retest_additional();
        let (created, attached) = self.correlate_free(tick);
        self.renumber();
        self.sort_contributors();
        let merged = self.eliminate_duplicates();
        self.renumber();
        self.estimate(tick);

        let summary = CycleSummary {
            tick,
            created,
            attached,
            detached,
            merged,
            evicted,
            tracks: self.tracks.len(),
        };
        info!(
            tick = tick.0,
            tracks = summary.tracks,
            created,
            attached,
            detached,
            merged,
            evicted,
            "fusion cycle"
        );
        summary
    }

    /// Registration rows for every known sensor track.
    pub fn registration_rows(&self, tick: Tick) -> Vec<RegistrationRow> {
        self.sources
            .values()
            .map(|trace| RegistrationRow::from_trace(tick, trace))
            .collect()
    }

    /// Checks the numbering and sensor-disjointness invariants.
    pub fn is_consistent(&self) -> bool {
        let numbering = self.tracks.iter().enumerate().all(|(i, track)| {
            track.number == i
                && track.contributors().all(|k| {
                    self.sources
                        .get(&k)
                        .and_then(SourceTrace::membership)
                        .is_some_and(|m| m.number == i && m.track == track.key)
                })
        });
        let disjoint = self.tracks.iter().all(|track| {
            let sensors: BTreeSet<SensorId> = track.contributors().map(|k| k.sensor).collect();
            sensors.len() == track.contributor_count()
        });
        let free = self
            .sources
            .values()
            .filter_map(|t| t.membership().map(|m| (t.key(), m.track)))
            .all(|(key, track)| {
                self.tracks
                    .get(track)
                    .is_some_and(|t| t.contributors().any(|k| k == key))
            });
        numbering && disjoint && free
    }

    // ------------------------------------------------------------------------
    // Cycle steps
    // ------------------------------------------------------------------------

    fn evict_stale(&mut self, tick: Tick) -> usize {
        let max_age = self.config.max_source_age_ticks;
        let stale: Vec<SourceKey> = self
            .sources
            .values()
            .filter(|t| tick.since(t.updated) > max_age)
            .map(SourceTrace::key)
            .collect();
        for key in &stale {
            self.unlink(*key);
            self.sources.remove(key);
            debug!(source = %key, "stale sensor track evicted");
        }
        stale.len()
    }

    fn retest_additional(&mut self) -> usize {
        let gates = self.config.gates();
        let Self {
            tracks, sources, ..
        } = self;
        let mut detached = 0;
        for track_key in tracks.keys().to_vec() {
            let Some(track) = tracks.get_mut(track_key) else {
                continue;
            };
            let Some(head) = sources.get(&track.head) else {
                continue;
            };
            let verdicts: Vec<(SourceKey, Option<f64>)> = track
                .additional
                .iter()
                .filter_map(|k| sources.get(k).map(|t| (*k, gate(t, head, &gates))))
                .collect();
            for (key, verdict) in verdicts {
                let Some(trace) = sources.get_mut(&key) else {
                    continue;
                };
                match verdict {
                    Some(distance) => trace.distance_to_head = distance,
                    None => {
                        trace.detach();
                        track.additional.retain(|k| *k != key);
                        detached += 1;
                        debug!(source = %key, track = %track_key, "contributor no longer matches head");
                    }
                }
            }
        }
        detached
    }

    fn correlate_free(&mut self, tick: Tick) -> (usize, usize) {
        let gates = self.config.gates();
        let free: Vec<SourceKey> = self
            .sources
            .values()
            .filter(|t| !t.is_member())
            .map(SourceTrace::key)
            .collect();

        let (mut created, mut attached) = (0, 0);
        for key in free {
            let Self {
                tracks, sources, ..
            } = self;
            let Some(trace) = sources.get(&key) else {
                continue;
            };
            let best = candidates(trace, tracks, sources, &gates)
                .into_iter()
                .min_by(|a, b| a.distance.total_cmp(&b.distance));

            let (track_key, number, role, distance) = match best {
                Some(candidate) => {
                    let Some(track) = tracks.get_mut(candidate.track) else {
                        continue;
                    };
                    track.additional.push(key);
                    attached += 1;
                    (candidate.track, track.number, Role::Additional, candidate.distance)
                }
                None => {
                    let number = tracks.len();
                    let track_key =
                        tracks.insert_with(|k, dense| FusedTrack::seeded(k, dense, trace, tick));
                    created += 1;
                    (track_key, number, Role::Head, 0.0)
                }
            };
            if let Some(trace) = sources.get_mut(&key) {
                trace.attach(track_key, number, role, distance);
            }
            debug!(source = %key, track = %track_key, ?role, distance, "sensor track attached");
        }
        (created, attached)
    }

    fn sort_contributors(&mut self) {
        let gates = self.config.gates();
        let Self {
            tracks, sources, ..
        } = self;
        for track_key in tracks.keys().to_vec() {
            let Some(track) = tracks.get_mut(track_key) else {
                continue;
            };
            let mut members: Vec<SourceKey> = track
                .contributors()
                .filter(|k| sources.contains_key(k))
                .collect();
            members.sort_by_key(|k| sources.get(k).map(SourceTrace::priority));
            let Some((&head, rest)) = members.split_first() else {
                continue;
            };

            let promoted = head != track.head;
            track.head = head;
            track.additional = rest.to_vec();
            if let Some(trace) = sources.get_mut(&head) {
                trace.set_role(Role::Head);
                trace.distance_to_head = 0.0;
            }
            for key in rest {
                if let Some(trace) = sources.get_mut(key) {
                    trace.set_role(Role::Additional);
                }
            }

            if promoted {
                debug!(track = %track_key, head = %head, "head promoted");
                let Some(head_trace) = sources.get(&head).cloned() else {
                    continue;
                };
                for key in rest {
                    if let Some(trace) = sources.get_mut(key) {
                        if let Ok(c) = correlate(trace, &head_trace, &gates) {
                            trace.distance_to_head = c.distance;
                        }
                    }
                }
            }
        }
    }

    fn eliminate_duplicates(&mut self) -> usize {
        let gates = self.config.gates();
        let keys = self.tracks.keys().to_vec();
        let mut doomed: BTreeSet<TrackKey> = BTreeSet::new();

        for (i, &a) in keys.iter().enumerate() {
            if doomed.contains(&a) {
                continue;
            }
            let Some(track_a) = self.tracks.get(a) else {
                continue;
            };
            let Some(head_a) = self.sources.get(&track_a.head) else {
                continue;
            };

            let mut group = vec![a];
            for &b in &keys[i + 1..] {
                if doomed.contains(&b) {
                    continue;
                }
                let Some(track_b) = self.tracks.get(b) else {
                    continue;
                };
                if !track_a.is_sensor_disjoint(track_b) {
                    continue;
                }
                let Some(head_b) = self.sources.get(&track_b.head) else {
                    continue;
                };
                if gate(head_a, head_b, &gates).is_some() {
                    group.push(b);
                }
            }
            if group.len() < 2 {
                continue;
            }

            // Heads of sensor-disjoint tracks differ in sensor, so the
            // priority key never ties here.
            group.sort_by_key(|k| {
                self.tracks
                    .get(*k)
                    .and_then(|t| self.sources.get(&t.head))
                    .map(SourceTrace::priority)
            });
            debug!(kept = %group[0], removed = group.len() - 1, "duplicate fused tracks");
            doomed.extend(group.into_iter().skip(1));
        }

        for key in &doomed {
            if let Some(track) = self.tracks.remove(*key) {
                for source in track.contributors() {
                    if let Some(trace) = self.sources.get_mut(&source) {
                        trace.detach();
                    }
                }
            }
        }
        doomed.len()
    }

    fn estimate(&mut self, tick: Tick) {
        let Self {
            tracks, sources, ..
        } = self;
        for track_key in tracks.keys().to_vec() {
            let Some(track) = tracks.get_mut(track_key) else {
                continue;
            };
            let Some(head) = sources.get(&track.head) else {
                continue;
            };
            let additional: Vec<&SourceTrace> = track
                .additional
                .iter()
                .filter_map(|k| sources.get(k))
                .collect();

            let fused = fuse_contributors(head, &additional).unwrap_or_else(|err| {
                warn!(track = %track_key, %err, "fused estimate failed, using head estimate");
                Estimate::of(head)
            });

            let velocity = match track.previous_position {
                Some((then, previous)) if head.bearing_only && !additional.is_empty() && tick > then => {
                    (fused.position - previous).scale(1.0 / (tick.seconds() - then.seconds()))
                }
                _ => head.velocity,
            };

            track.position = fused.position;
            track.covariance = fused.covariance;
            track.velocity = velocity;
            track.updated = tick;
            track.previous_position = Some((tick, fused.position));
        }
    }

    // ------------------------------------------------------------------------
    // Membership maintenance
    // ------------------------------------------------------------------------

    /// Removes a sensor track from its fused track. Returns true if the fused
    /// track was removed with it.
    fn unlink(&mut self, key: SourceKey) -> bool {
        let Some(membership) = self.sources.get(&key).and_then(|t| t.membership().copied()) else {
            return false;
        };
        let Self {
            tracks, sources, ..
        } = self;
        if let Some(trace) = sources.get_mut(&key) {
            trace.detach();
        }
        let Some(track) = tracks.get_mut(membership.track) else {
            return false;
        };
        if track.head != key {
            track.additional.retain(|k| *k != key);
            return false;
        }

        let successor = track
            .additional
            .iter()
            .filter_map(|k| sources.get(k))
            .min_by_key(|t| t.priority())
            .map(SourceTrace::key);
        match successor {
            Some(next) => {
                track.additional.retain(|k| *k != next);
                track.head = next;
                if let Some(trace) = sources.get_mut(&next) {
                    trace.set_role(Role::Head);
                    trace.distance_to_head = 0.0;
                }
                debug!(track = %membership.track, head = %next, "head replaced");
                false
            }
            None => {
                tracks.remove(membership.track);
                debug!(track = %membership.track, "fused track emptied");
                true
            }
        }
    }

    fn renumber(&mut self) {
        let Self {
            tracks, sources, ..
        } = self;
        for (number, key) in tracks.keys().to_vec().into_iter().enumerate() {
            let Some(track) = tracks.get_mut(key) else {
                continue;
            };
            track.number = number;
            for source in track.contributors() {
                if let Some(trace) = sources.get_mut(&source) {
                    trace.set_number(number);
                }
            }
        }
    }
}

fn candidates(
    trace: &SourceTrace,
    tracks: &Arena<FusedTrack>,
    sources: &BTreeMap<SourceKey, SourceTrace>,
    gates: &Gates,
) -> Vec<Candidate> {
    tracks
        .iter()
        .filter(|track| !track.contains_sensor(trace.sensor))
        .filter_map(|track| {
            let head = sources.get(&track.head)?;
            gate(trace, head, gates).map(|distance| Candidate {
                track: track.key,
                distance,
            })
        })
        .collect()
}
