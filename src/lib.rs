//! MFRNET: multi-radar track estimation and fusion
//!
//! Simulated multi-function radars (MFRs) track targets in their own angular
//! frames and report covariance-annotated position/velocity estimates; a
//! command post fuses those per-sensor tracks into one consistent
//! multi-sensor track picture.
//!
//! # Layers
//!
//! - [`coords`]: coordinate, velocity and covariance transforms between the
//!   common frame, sensor frames and angular frames
//! - [`filters`]: the adaptive alpha-beta filter each sensor runs per target
//! - [`models`] and [`sensor`]: the radar model and per-sensor controller that
//!   turn filter output into fusable sensor tracks
//! - [`fusion`]: statistical correlation (including bearing-only
//!   triangulation) and the multi-sensor track array
//!
//! Everything inside one tick is deterministic and single-threaded.

pub mod coords;
pub mod filters;
pub mod fusion;
pub mod models;
pub mod sensor;
pub mod types;

pub mod prelude {
    pub use crate::coords::{Alignment, FrameAngles, SensorFrameDescriptor};
    pub use crate::filters::alpha_beta::*;
    pub use crate::fusion::*;
    pub use crate::models::*;
    pub use crate::sensor::{SensorReport, SensorTracker};
    pub use crate::types::ids::*;
    pub use crate::types::spaces::*;
    pub use crate::types::transforms::*;
    pub use crate::FusionError;
}

use types::ids::{SensorId, TargetId};

/// Error types for the library
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FusionError {
    /// A combined covariance is singular and cannot be inverted
    #[error("matrix is singular")]
    SingularMatrix,
    /// The geometry has no defined answer (zero-length ray, parallel rays, frame pole)
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
    /// An arithmetic result is NaN or infinite
    #[error("non-finite result")]
    NonFinite,
    /// A track was requested for a target outside the sensor's coverage
    #[error("{target} is outside the coverage of {sensor}")]
    OutsideCoverage {
        /// Sensor asked for the track
        sensor: SensorId,
        /// Target outside its cone
        target: TargetId,
    },
    /// The sensor holds no track on this target
    #[error("{sensor} is not tracking {target}")]
    UnknownTarget {
        /// Sensor asked for the track
        sensor: SensorId,
        /// Target it does not track
        target: TargetId,
    },
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = ::core::result::Result<T, FusionError>;
