//! Sensor-level tracking filters
//!
//! - [`alpha_beta::AlphaBetaFilter`]: adaptive alpha-beta filter run per
//!   `(sensor, target)` pair in the sensor's biconical frame

pub mod alpha_beta;
