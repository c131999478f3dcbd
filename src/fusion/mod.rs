//! Command-post fusion
//!
//! - [`source`]: sensor tracks and their fusion membership
//! - [`correlation`]: gating tests, including bearing-only geometry
//! - [`estimators`]: fused position estimation
//! - [`arena`]: generational storage for fused tracks
//! - [`engine`]: the multi-sensor track array
//! - [`report`]: flat per-tick registration rows

pub mod arena;
pub mod correlation;
pub mod engine;
pub mod estimators;
pub mod report;
pub mod source;

pub use arena::TrackKey;
pub use correlation::{correlate, gate, Correlation, CorrelationCase, Gates, GATE_2DOF, GATE_3DOF};
pub use engine::{Candidate, CycleSummary, FusedTrack, FusionConfig, MultiSensorTrackArray};
pub use estimators::{blend, fuse_contributors, Estimate, PositionEstimator};
pub use report::RegistrationRow;
pub use source::{Membership, Role, SourceTrace};
