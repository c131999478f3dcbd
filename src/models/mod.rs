//! Sensor and target models
//!
//! The radar model generates noisy angular measurements from ground truth;
//! targets supply that ground truth.

mod sensor;
mod target;

pub use sensor::*;
pub use target::*;
