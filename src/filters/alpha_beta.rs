//! Adaptive alpha-beta tracking filter
//!
//! One filter runs per `(sensor, target)` pair and smooths the sensor's
//! biconical measurements `[range, epsilon_1, epsilon_2]` axis by axis. The
//! smoothing gains adapt to the ratio between the worst-case target
//! manoeuvre and the measurement noise (the *manoeuvre intensity*).
//!
//! # Lifecycle
//!
//! The filter has two states. During *cold start* (`cycle < 2`) both gains
//! are one: the first cycle seeds position, the second establishes velocity.
//! From then on the filter is *steady* and never leaves that state; it is
//! reset only by discarding the [`FilterState`].
//!
//! Error propagation is closed form per axis rather than a full Kalman
//! covariance update. It reads the velocity variance and position/velocity
//! covariance of the *previous* cycle, which the state carries forward until
//! the new values are committed.
//!
//! # Example
//!
//! ```
//! use mfrnet::filters::alpha_beta::{AlphaBetaFilter, AngularMeasurement, FilterConfig, FilterState};
//! use mfrnet::types::spaces::BiconicalPoint;
//!
//! let filter = AlphaBetaFilter::new(FilterConfig::default());
//! let mut state = FilterState::new();
//!
//! for k in 0..5 {
//!     let measurement = AngularMeasurement::new(
//!         BiconicalPoint::from_array([30_000.0 - 200.0 * k as f64, 0.1, 0.02]),
//!         [30.0, 1e-3, 1e-3],
//!     );
//!     filter.step(&mut state, &measurement);
//! }
//! assert!(state.is_steady());
//! assert!(*state.estimate_velocity.index(0) < 0.0);
//! ```

use core::f64::consts::{E, PI};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::spaces::{Biconical, BiconicalPoint, Covariance3};

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.81;

/// `log10` intensity at which the two steady-state gain laws meet.
pub const GAIN_BREAKPOINT_LOW: f64 = 0.15;

/// `log10` intensity above which the gains are held flat.
pub const GAIN_BREAKPOINT_HIGH: f64 = 0.65;

/// Alpha held beyond [`GAIN_BREAKPOINT_HIGH`].
pub const ALPHA_SATURATED: f64 = 0.453066;

/// Beta held beyond [`GAIN_BREAKPOINT_HIGH`].
pub const BETA_SATURATED: f64 = 1.706628;

/// Cycles spent in cold start.
pub const COLD_START_CYCLES: u32 = 2;

// ============================================================================
// Configuration
// ============================================================================

/// Filter tuning shared by every track of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Worst-case target manoeuvre, in multiples of g
    pub overload_g: f64,
    /// Gravitational acceleration (m/s²)
    pub gravity: f64,
    /// Time between two filter cycles (s)
    pub dt: f64,
}

impl FilterConfig {
    /// Creates a filter configuration.
    ///
    /// # Panics
    /// Panics if `overload_g < 0` or `dt <= 0`.
    pub fn new(overload_g: f64, dt: f64) -> Self {
        assert!(overload_g >= 0.0, "Overload must be non-negative");
        assert!(dt > 0.0, "Filter interval must be positive");
        Self {
            overload_g,
            gravity: GRAVITY,
            dt,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new(5.0, 1.0)
    }
}

// ============================================================================
// Measurement and State
// ============================================================================

/// One biconical measurement with its per-axis standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularMeasurement {
    /// `[range, epsilon_1, epsilon_2]`
    pub position: BiconicalPoint,
    /// `[range sigma (m), epsilon_1 sigma (rad), epsilon_2 sigma (rad)]`
    pub sigma: Vector3<f64>,
    /// False for a bearing-only (jammer) measurement; the range component is
    /// then a placeholder supplied by the caller.
    pub has_range: bool,
}

impl AngularMeasurement {
    /// A full measurement with range.
    pub fn new(position: BiconicalPoint, sigma: [f64; 3]) -> Self {
        Self {
            position,
            sigma: Vector3::from(sigma),
            has_range: true,
        }
    }

    /// A bearing-only measurement; `assumed_range` stands in for the missing range.
    pub fn bearing_only(epsilon_1: f64, epsilon_2: f64, assumed_range: f64, sigma: [f64; 3]) -> Self {
        Self {
            position: BiconicalPoint::from_array([assumed_range, epsilon_1, epsilon_2]),
            sigma: Vector3::from(sigma),
            has_range: false,
        }
    }
}

/// Recursive state of one `(sensor, target)` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Completed cycles
    pub cycle: u32,
    /// Last measurement
    pub measured: BiconicalPoint,
    /// Smoothed position
    pub estimate: BiconicalPoint,
    /// Smoothed velocity (biconical rates)
    pub estimate_velocity: BiconicalPoint,
    /// Position predicted for the next cycle
    pub extrapolated: BiconicalPoint,
    /// Velocity predicted for the next cycle
    pub extrapolated_velocity: BiconicalPoint,
    /// Last measurement sigma per axis
    pub sigma: Vector3<f64>,
    /// Variance of the smoothed position
    pub estimate_variance: Vector3<f64>,
    /// Variance of the predicted position
    pub extrapolated_variance: Vector3<f64>,
    /// Variance of the smoothed velocity
    pub velocity_variance: Vector3<f64>,
    /// Covariance between smoothed position and velocity
    pub position_velocity_covariance: Vector3<f64>,
    has_range: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterState {
    /// A cold filter, created when a sensor starts tracking a target.
    pub fn new() -> Self {
        Self {
            cycle: 0,
            measured: BiconicalPoint::zeros(),
            estimate: BiconicalPoint::zeros(),
            estimate_velocity: BiconicalPoint::zeros(),
            extrapolated: BiconicalPoint::zeros(),
            extrapolated_velocity: BiconicalPoint::zeros(),
            sigma: Vector3::zeros(),
            estimate_variance: Vector3::zeros(),
            extrapolated_variance: Vector3::zeros(),
            velocity_variance: Vector3::zeros(),
            position_velocity_covariance: Vector3::zeros(),
            has_range: true,
        }
    }

    /// True once the cold-start cycles are over.
    #[inline]
    pub fn is_steady(&self) -> bool {
        self.cycle >= COLD_START_CYCLES
    }

    /// True if the last measurement carried a range.
    #[inline]
    pub fn has_range(&self) -> bool {
        self.has_range
    }

    /// Diagonal biconical covariance of the smoothed position.
    pub fn estimate_covariance(&self) -> Covariance3<Biconical> {
        Covariance3::from_diagonal(&self.estimate_variance)
    }
}

// ============================================================================
// Gain Law
// ============================================================================

/// Smoothing gains `(alpha, beta)` for one axis.
///
/// `intensity` is the manoeuvre intensity of the axis; `cycle` is the number
/// of completed cycles.
pub fn gain_coefficients(cycle: u32, intensity: f64) -> (f64, f64) {
    if cycle < COLD_START_CYCLES {
        return (1.0, 1.0);
    }
    let l = intensity.log10();
    if l <= GAIN_BREAKPOINT_LOW {
        let alpha = 0.5 * (-(l - GAIN_BREAKPOINT_LOW).abs().powf(1.7) / 3.53376).exp();
        let beta = 2.0 * (1.0 - alpha - (1.0 - 2.0 * alpha).max(0.0).sqrt());
        (alpha, beta)
    } else if l <= GAIN_BREAKPOINT_HIGH {
        let alpha = 0.5 * (-(l - GAIN_BREAKPOINT_LOW).abs().powf(1.9) / E).exp();
        let beta = 2.0 * (1.0 - alpha + (1.0 - 2.0 * alpha).max(0.0).sqrt());
        (alpha, beta)
    } else {
        (ALPHA_SATURATED, BETA_SATURATED)
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Adaptive alpha-beta filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaBetaFilter {
    /// Tuning
    pub config: FilterConfig,
}

impl AlphaBetaFilter {
    /// Creates a filter with the given tuning.
    #[inline]
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Manoeuvre intensity per axis: `2·overload·g·dt² / (π·σ·scale)`.
    ///
    /// The angular sigmas are scaled to meters by `range`; the range axis is
    /// already linear.
    pub fn maneuver_intensity(&self, sigma: &Vector3<f64>, range: f64) -> Vector3<f64> {
        let c = &self.config;
        let numerator = 2.0 * c.overload_g * c.gravity * c.dt * c.dt;
        let scale = [1.0, range, range];
        Vector3::from_fn(|i, _| numerator / (PI * sigma[i] * scale[i]))
    }

    /// Runs one cycle on a new measurement.
    pub fn step(&self, state: &mut FilterState, measurement: &AngularMeasurement) {
        let dt = self.config.dt;
        let measured = measurement.position.as_svector();
        let intensity = self.maneuver_intensity(&measurement.sigma, *measurement.position.index(0));

        let first = state.cycle == 0;
        let (prev_pos, prev_vel) = if first {
            (*measured, Vector3::zeros())
        } else {
            (
                *state.extrapolated.as_svector(),
                *state.extrapolated_velocity.as_svector(),
            )
        };

        let mut estimate = Vector3::zeros();
        let mut velocity = Vector3::zeros();
        let mut next_pos = Vector3::zeros();
        let mut estimate_variance = Vector3::zeros();
        let mut extrapolated_variance = Vector3::zeros();
        let mut velocity_variance = Vector3::zeros();
        let mut covariance_pv = Vector3::zeros();

        for axis in 0..3 {
            let (alpha, beta) = gain_coefficients(state.cycle, intensity[axis]);
            trace!(axis, cycle = state.cycle, alpha, beta, "alpha-beta gains");

            let innovation = measured[axis] - prev_pos[axis];
            estimate[axis] = alpha * measured[axis] + (1.0 - alpha) * prev_pos[axis];
            velocity[axis] = beta / dt * innovation + prev_vel[axis];
            next_pos[axis] = estimate[axis] + dt * velocity[axis];

            let var_meas = measurement.sigma[axis] * measurement.sigma[axis];
            let (p, v, c) = if first {
                // Seeded from the measurement alone; velocity is exactly zero.
                (var_meas, 0.0, 0.0)
            } else {
                propagate_axis_errors(
                    alpha,
                    beta,
                    dt,
                    var_meas,
                    state.extrapolated_variance[axis],
                    state.velocity_variance[axis],
                    state.position_velocity_covariance[axis],
                )
            };
            estimate_variance[axis] = p;
            velocity_variance[axis] = v;
            covariance_pv[axis] = c;
            extrapolated_variance[axis] = p + 2.0 * dt * c + dt * dt * v;
        }

        // Commit: the prediction and this cycle's velocity terms become the
        // priors of the next cycle.
        state.measured = measurement.position;
        state.sigma = measurement.sigma;
        state.has_range = measurement.has_range;
        state.estimate = BiconicalPoint::from_svector(estimate);
        state.estimate_velocity = BiconicalPoint::from_svector(velocity);
        state.extrapolated = BiconicalPoint::from_svector(next_pos);
        state.extrapolated_velocity = BiconicalPoint::from_svector(velocity);
        state.estimate_variance = estimate_variance;
        state.extrapolated_variance = extrapolated_variance;
        state.velocity_variance = velocity_variance;
        state.position_velocity_covariance = covariance_pv;
        state.cycle += 1;
    }
}

/// Closed-form error propagation for one axis.
///
/// Returns `(position variance, velocity variance, position/velocity covariance)`
/// of the new estimate, given the measurement variance, the variance of the
/// prediction it was blended with, and the previous cycle's velocity variance
/// and position/velocity covariance.
pub fn propagate_axis_errors(
    alpha: f64,
    beta: f64,
    dt: f64,
    var_meas: f64,
    var_extrapolated: f64,
    prev_velocity_variance: f64,
    prev_covariance_pv: f64,
) -> (f64, f64, f64) {
    let k = beta / dt;
    // Covariance between the prediction and the velocity it was made with.
    let propagated_cross = prev_covariance_pv + dt * prev_velocity_variance;

    let position = alpha * alpha * var_meas + (1.0 - alpha) * (1.0 - alpha) * var_extrapolated;
    let velocity = k * k * (var_meas + var_extrapolated) - 2.0 * k * propagated_cross
        + prev_velocity_variance;
    let cross = alpha * k * var_meas - (1.0 - alpha) * k * var_extrapolated
        + (1.0 - alpha) * propagated_cross;
    (position, velocity, cross)
}
