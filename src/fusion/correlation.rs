//! Statistical correlation of sensor tracks
//!
//! Two sensor tracks are judged to be the same target when the generalized
//! (Mahalanobis) distance between comparable position estimates falls under
//! a chi-square gate:
//!
//! | Tracks compared | Δ | Σ | Gate |
//! |---|---|---|---|
//! | both with range | position difference | sum of covariances | 3 DoF |
//! | one bearing-only | bearing point projected next to the other track | scaled bearing covariance + other covariance | 2 DoF |
//! | both bearing-only | closest points of the two rays | sum of the scaled covariances | 2 DoF |
//!
//! A bearing-only track has no range, so its reported position is only an
//! anchor on the sensor-to-target ray. Before comparison it is moved along
//! the ray to where the other estimate says the target should be. Its
//! covariance is scaled isotropically by the squared ratio of the new range
//! to the anchor range; only the along-ray position is uncertain, so the
//! lateral spread grows linearly with range.

use tracing::debug;

use crate::types::spaces::{Global, GlobalCovariance, GlobalPoint};
use crate::types::transforms::Jacobian;
use crate::{FusionError, Result};

use super::source::SourceTrace;

/// Chi-square gate for 3 degrees of freedom at 99.9 %.
pub const GATE_3DOF: f64 = 11.345;

/// Chi-square gate for 2 degrees of freedom at 99 %.
pub const GATE_2DOF: f64 = 9.21;

/// Squared-sine threshold below which two rays are treated as parallel.
const PARALLEL_RAYS: f64 = 1e-12;

/// Gating thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gates {
    /// Gate for two full-position tracks
    pub three_dof: f64,
    /// Gate for pairs involving a bearing-only track
    pub two_dof: f64,
}

impl Default for Gates {
    fn default() -> Self {
        Self {
            three_dof: GATE_3DOF,
            two_dof: GATE_2DOF,
        }
    }
}

/// Which geometry a correlation test used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationCase {
    /// Both tracks have range.
    TwoTargets,
    /// One bearing-only track against one full-position track.
    TargetAndJammer,
    /// Two bearing-only tracks.
    TwoJammers,
}

/// Outcome of one correlation test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    /// Geometry used
    pub case: CorrelationCase,
    /// Generalized distance `Δᵀ Σ⁻¹ Δ`
    pub distance: f64,
    /// Gate the distance was compared against
    pub threshold: f64,
}

impl Correlation {
    /// True when the distance is inside the gate.
    #[inline]
    pub fn is_match(&self) -> bool {
        self.distance <= self.threshold
    }
}

/// A bearing-only track relocated along its ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayPoint {
    /// Relocated position
    pub position: GlobalPoint,
    /// Covariance scaled to the relocated range
    pub covariance: GlobalCovariance,
}

/// Rescales a bearing-only covariance to a new point on the same ray.
pub fn scaled_covariance(jammer: &SourceTrace, point: &GlobalPoint) -> Result<GlobalCovariance> {
    let anchor_sq = jammer.ray().norm_squared();
    if anchor_sq <= f64::EPSILON {
        return Err(FusionError::DegenerateGeometry("bearing track anchored at its sensor"));
    }
    let scale = (*point - jammer.sensor_position).norm_squared() / anchor_sq;
    Ok(jammer.covariance.scale(scale))
}

/// Moves a bearing-only track to the foot of the perpendicular dropped from
/// `other` onto its ray.
///
/// Fails when the foot lies behind the bearing sensor.
pub fn project_onto_ray(jammer: &SourceTrace, other: &GlobalPoint) -> Result<RayPoint> {
    let ray = jammer.ray();
    let ray_sq = ray.norm_squared();
    if ray_sq <= f64::EPSILON {
        return Err(FusionError::DegenerateGeometry("bearing track anchored at its sensor"));
    }
    let coeff = -ray.dot(&(jammer.position - *other)) / ray_sq;
    // The sensor sits at coeff = -1.
    if coeff < -1.0 {
        return Err(FusionError::DegenerateGeometry("point projects behind the bearing sensor"));
    }
    let position = ray.scale(coeff) + jammer.position;
    Ok(RayPoint {
        position,
        covariance: scaled_covariance(jammer, &position)?,
    })
}

/// Jacobian `u·uᵀ` of a relocated bearing point with respect to the point it
/// was projected from.
pub fn along_ray_jacobian(jammer: &SourceTrace) -> Result<Jacobian<Global, Global>> {
    let ray = jammer.ray();
    let norm = ray.norm();
    if norm <= f64::EPSILON {
        return Err(FusionError::DegenerateGeometry("bearing track anchored at its sensor"));
    }
    let u = ray.scale(1.0 / norm).into_svector();
    Ok(Jacobian::from_matrix(u * u.transpose()))
}

/// Closest points between the ray `site_a → anchor_a` and the ray
/// `site_b → anchor_b`, point on the first ray first.
///
/// Fails when the rays are parallel or meet behind either site.
pub fn ray_intersection(
    site_a: &GlobalPoint,
    anchor_a: &GlobalPoint,
    site_b: &GlobalPoint,
    anchor_b: &GlobalPoint,
) -> Result<(GlobalPoint, GlobalPoint)> {
    let da = *anchor_a - *site_a;
    let db = *anchor_b - *site_b;
    let normal = da.cross(&db);
    let normal_sq = normal.norm_squared();
    if normal_sq <= PARALLEL_RAYS * da.norm_squared() * db.norm_squared() {
        return Err(FusionError::DegenerateGeometry("parallel bearing rays"));
    }
    let baseline = *site_b - *site_a;
    let ta = baseline.cross(&db).dot(&normal) / normal_sq;
    let tb = baseline.cross(&da).dot(&normal) / normal_sq;
    if ta < 0.0 || tb < 0.0 {
        return Err(FusionError::DegenerateGeometry("bearing rays meet behind a sensor"));
    }
    Ok((*site_a + da.scale(ta), *site_b + db.scale(tb)))
}

/// Closest points between the rays of two bearing-only tracks, each with
/// its covariance scaled to the new range.
pub fn closest_points(a: &SourceTrace, b: &SourceTrace) -> Result<(RayPoint, RayPoint)> {
    let (pa, pb) = ray_intersection(&a.sensor_position, &a.position, &b.sensor_position, &b.position)?;
    Ok((
        RayPoint {
            position: pa,
            covariance: scaled_covariance(a, &pa)?,
        },
        RayPoint {
            position: pb,
            covariance: scaled_covariance(b, &pb)?,
        },
    ))
}

fn generalized_distance(delta: &GlobalPoint, cov: &GlobalCovariance) -> Result<f64> {
    let d = cov.mahalanobis(delta).ok_or(FusionError::SingularMatrix)?;
    if d.is_finite() {
        Ok(d)
    } else {
        Err(FusionError::NonFinite)
    }
}

/// Tests whether two sensor tracks refer to the same target.
pub fn correlate(a: &SourceTrace, b: &SourceTrace, gates: &Gates) -> Result<Correlation> {
    let correlation = match (a.bearing_only, b.bearing_only) {
        (false, false) => {
            let delta = a.position - b.position;
            let cov = a.covariance + b.covariance;
            Correlation {
                case: CorrelationCase::TwoTargets,
                distance: generalized_distance(&delta, &cov)?,
                threshold: gates.three_dof,
            }
        }
        (true, false) | (false, true) => {
            let (jammer, target) = if a.bearing_only { (a, b) } else { (b, a) };
            let projected = project_onto_ray(jammer, &target.position)?;
            let delta = projected.position - target.position;
            let cov = projected.covariance + target.covariance;
            Correlation {
                case: CorrelationCase::TargetAndJammer,
                distance: generalized_distance(&delta, &cov)?,
                threshold: gates.two_dof,
            }
        }
        (true, true) => {
            let (pa, pb) = closest_points(a, b)?;
            let delta = pa.position - pb.position;
            let cov = pa.covariance + pb.covariance;
            Correlation {
                case: CorrelationCase::TwoJammers,
                distance: generalized_distance(&delta, &cov)?,
                threshold: gates.two_dof,
            }
        }
    };
    debug!(
        a = %a.key(),
        b = %b.key(),
        case = ?correlation.case,
        distance = correlation.distance,
        matched = correlation.is_match(),
        "correlation test"
    );
    Ok(correlation)
}

/// Like [`correlate`], but a numerically failed test counts as no match.
///
/// Returns the distance when the pair is inside the gate.
pub fn gate(a: &SourceTrace, b: &SourceTrace, gates: &Gates) -> Option<f64> {
    match correlate(a, b, gates) {
        Ok(c) if c.is_match() => Some(c.distance),
        Ok(_) => None,
        Err(err) => {
            debug!(a = %a.key(), b = %b.key(), %err, "correlation failed, treated as no match");
            None
        }
    }
}
