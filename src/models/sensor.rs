//! Multi-function radar model
//!
//! A sensor stands at a fixed site, looks along the boresight of its antenna
//! face and sees targets inside a cone around it. Measurements are generated
//! from ground truth through the *corrupted* frame, so an injected
//! calibration error shows up as a bias the sensor's own tracker (which uses
//! the nominal frame) does not know about.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::coords::{Alignment, FrameAngles, SensorFrameDescriptor};
use crate::filters::alpha_beta::{AngularMeasurement, FilterConfig};
use crate::types::ids::{SensorId, Tick, TICKS_PER_SECOND};
use crate::types::spaces::{BiconicalPoint, GlobalPoint};
use crate::{FusionError, Result};

use super::target::Target;

/// Static parameters of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Sensor identifier
    pub id: SensorId,
    /// Site on the ground (m, common frame)
    pub position: [f64; 3],
    /// Mounting angles
    pub frame: FrameAngles,
    /// Instrumented range (m)
    pub max_range: f64,
    /// Half-angle of the coverage cone around boresight (rad)
    pub cone_half_angle: f64,
    /// Measurement sigma `[range (m), epsilon_1 (rad), epsilon_2 (rad)]`
    pub sigma: [f64; 3],
    /// Ticks between two track reports
    pub report_every_ticks: u64,
    /// Range assumed for bearing-only (jammer) tracks (m)
    pub jammer_range: f64,
    /// Manoeuvre overload the filters are tuned for (g)
    pub overload_g: f64,
    /// Reports are produced in the dedicated auto-track mode
    pub auto_track: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            id: SensorId(1),
            position: [0.0; 3],
            frame: FrameAngles::pointing(10.0, 0.0, 0.2),
            max_range: 100_000.0,
            cone_half_angle: 1.0,
            sigma: [25.0, 1e-3, 1e-3],
            report_every_ticks: 20,
            jammer_range: 50_000.0,
            overload_g: 5.0,
            auto_track: false,
        }
    }
}

impl SensorConfig {
    /// Checks that every quantity is in range.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FusionError::InvalidConfig(format!("{}: {msg}", self.id)));
        if !(self.max_range.is_finite() && self.max_range > 0.0) {
            return invalid(format!("max_range must be positive, got {}", self.max_range));
        }
        if !(self.cone_half_angle > 0.0 && self.cone_half_angle < core::f64::consts::FRAC_PI_2) {
            return invalid(format!(
                "cone_half_angle must be in (0, π/2), got {}",
                self.cone_half_angle
            ));
        }
        if self.sigma.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return invalid(format!("sigma must be positive, got {:?}", self.sigma));
        }
        if self.report_every_ticks == 0 {
            return invalid("report_every_ticks must be at least 1".into());
        }
        if !(self.jammer_range > 0.0 && self.jammer_range <= self.max_range) {
            return invalid(format!(
                "jammer_range must be in (0, max_range], got {}",
                self.jammer_range
            ));
        }
        if !(self.overload_g >= 0.0) {
            return invalid(format!("overload_g must be non-negative, got {}", self.overload_g));
        }
        Ok(())
    }

    /// Filter tuning derived from the reporting interval.
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig::new(
            self.overload_g,
            self.report_every_ticks as f64 / TICKS_PER_SECOND as f64,
        )
    }
}

/// A sensor with its composed frame.
#[derive(Debug, Clone)]
pub struct Sensor {
    config: SensorConfig,
    frame: SensorFrameDescriptor,
    noise: [Normal<f64>; 3],
}

impl Sensor {
    /// Builds a sensor from a validated configuration.
    pub fn new(config: SensorConfig) -> Result<Self> {
        config.validate()?;
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| FusionError::InvalidConfig(e.to_string()))
        };
        Ok(Self {
            frame: SensorFrameDescriptor::new(GlobalPoint::from_array(config.position), config.frame),
            noise: [
                normal(config.sigma[0])?,
                normal(config.sigma[1])?,
                normal(config.sigma[2])?,
            ],
            config,
        })
    }

    /// Radar identifier.
    #[inline]
    pub fn id(&self) -> SensorId {
        self.config.id
    }

    /// Validated configuration.
    #[inline]
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Mounting frame with its nominal and corrupted rotations.
    #[inline]
    pub fn frame(&self) -> &SensorFrameDescriptor {
        &self.frame
    }

    /// Injects a fixed-mount calibration error (affects measurements only).
    pub fn inject_alignment_error(&mut self, error: [f64; 3]) {
        self.frame.inject_alignment_error(error);
        self.config.frame.calibration_error = error;
    }

    /// True if `p` lies inside the physical coverage cone and range.
    pub fn in_coverage(&self, p: &GlobalPoint) -> bool {
        let antenna = self.frame.global_to_antenna(p, Alignment::Corrupted);
        let range = antenna.norm();
        let boresight = *antenna.index(2);
        range > 0.0
            && range <= self.config.max_range
            && boresight > 0.0
            && (boresight / range).acos() <= self.config.cone_half_angle
    }

    /// Generates one noisy measurement of `target` at `tick`.
    ///
    /// Jammers yield bearing-only measurements at the configured assumed
    /// range.
    pub fn measure<R: Rng + ?Sized>(
        &self,
        target: &Target,
        tick: Tick,
        rng: &mut R,
    ) -> Result<AngularMeasurement> {
        let truth = target.position_at(tick);
        let b = self.frame.global_to_biconical(&truth, Alignment::Corrupted)?;
        let [n_range, n_e1, n_e2] = [
            self.noise[0].sample(rng),
            self.noise[1].sample(rng),
            self.noise[2].sample(rng),
        ];
        let e1 = (b.index(1) + n_e1).clamp(-1.0, 1.0);
        let e2 = (b.index(2) + n_e2).clamp(-1.0, 1.0);

        let measurement = if target.jammer {
            AngularMeasurement::bearing_only(e1, e2, self.config.jammer_range, self.config.sigma)
        } else {
            let range = (b.index(0) + n_range).max(0.0);
            AngularMeasurement::new(BiconicalPoint::from_array([range, e1, e2]), self.config.sigma)
        };
        Ok(measurement)
    }
}
