//! Coordinate and covariance transform library
//!
//! Pure conversions between the common Cartesian frame, sensor-local
//! Cartesian frames, antenna frames and the angular (spherical and
//! biconical) frames sensors measure in. Every covariance transform follows
//! one pattern: build the local Jacobian of the forward map at the point and
//! sandwich-multiply, `J · Σ · Jᵀ`.

pub mod biconical;
pub mod frame;
pub mod spherical;

pub use biconical::*;
pub use frame::{Alignment, FrameAngles, SensorFrameDescriptor};
pub use spherical::*;

/// Ranges below this are treated as the frame origin.
pub(crate) const MIN_RANGE: f64 = 1e-9;
