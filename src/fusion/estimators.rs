//! Fused position estimators
//!
//! The estimator for a fused track is picked from the bearing flags of its
//! first two contributors:
//!
//! - [`PositionEstimator::HeadOnly`]: pass-through of the single contributor
//! - [`PositionEstimator::TwoTargets`]: blend of two full-position tracks
//! - [`PositionEstimator::TargetAndJammer`]: the bearing track is moved onto
//!   the perpendicular foot next to the target track, then blended
//! - [`PositionEstimator::TwoJammers`]: triangulation at the closest points
//!   of the two rays, then blended
//!
//! Further contributors are folded in one at a time, in priority order, into
//! the running estimate with the same pairwise blend.
//!
//! Contributors come from distinct sensors, so their reported errors are
//! independent. Derived points are not: a relocated bearing point inherits
//! the along-ray error of the point it was projected from, and both
//! triangulated points depend on both bearings. Those dependencies enter the
//! blend as cross-covariances built with the Jacobian sandwich.

use nalgebra::{Matrix3, Vector3};

use crate::types::spaces::{Global, GlobalCovariance, GlobalPoint};
use crate::types::transforms::{cross_covariance, Jacobian};
use crate::{FusionError, Result};

use super::correlation::{along_ray_jacobian, project_onto_ray, ray_intersection};
use super::source::SourceTrace;

/// Singular values of the blend denominator below this fraction of the
/// largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-8;

/// Relative disagreement allowed between two estimates along directions in
/// which their difference has no variance.
const AGREEMENT_TOLERANCE: f64 = 1e-6;

/// Central-difference step for triangulation sensitivities, as a fraction of
/// the ray length.
const SENSITIVITY_STEP: f64 = 1e-5;

/// A position estimate with its covariance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Position in the common frame
    pub position: GlobalPoint,
    /// Position covariance
    pub covariance: GlobalCovariance,
}

impl Estimate {
    /// The estimate a sensor track reports about itself.
    pub fn of(trace: &SourceTrace) -> Self {
        Self {
            position: trace.position,
            covariance: trace.covariance,
        }
    }
}

/// Blends two estimates with inverse-covariance weights.
///
/// `cross` is the cross-covariance `Σ_AB` between the two estimates (zero
/// when their errors are independent):
///
/// ```text
/// A = (Σ_B − Σ_AB/2 − Σ_BA/2) · (Σ_A + Σ_B − Σ_AB − Σ_BA)⁺ + N
/// B = I − A
/// x = A·x_A + B·x_B
/// Σ = A·Σ_A·Aᵀ + B·Σ_B·Bᵀ + A·Σ_AB·Bᵀ + (A·Σ_AB·Bᵀ)ᵀ
/// ```
///
/// `⁺` is the pseudo-inverse and `N` projects onto its null space, the
/// directions in which `x_A − x_B` has no variance. With a regular
/// denominator `N = 0` and `B` reduces to `(Σ_A − Σ_AB/2 − Σ_BA/2)·(…)⁻¹`.
/// Along null directions the two estimates must agree, and `A` takes them
/// from `x_A`; otherwise the blend fails with [`FusionError::SingularMatrix`].
pub fn blend(a: &Estimate, b: &Estimate, cross: &Matrix3<f64>) -> Result<Estimate> {
    let sa = a.covariance.as_matrix();
    let sb = b.covariance.as_matrix();
    let cross_t = cross.transpose();
    let mixed = (cross + cross_t) * 0.5;

    let spread = sa + sb - cross - cross_t;
    let svd = spread.svd(true, true);
    let tolerance = RANK_TOLERANCE * svd.singular_values.max();
    let inv = svd
        .pseudo_inverse(tolerance)
        .map_err(|_| FusionError::SingularMatrix)?;
    let unobserved = Matrix3::identity() - inv * spread;

    let delta = a.position.as_svector() - b.position.as_svector();
    let scale = 1.0 + a.position.norm().max(b.position.norm());
    if (unobserved * delta).norm() > AGREEMENT_TOLERANCE * scale {
        return Err(FusionError::SingularMatrix);
    }

    let coeff_a = (sb - mixed) * inv + unobserved;
    let coeff_b = Matrix3::identity() - coeff_a;

    let position = coeff_a * a.position.as_svector() + coeff_b * b.position.as_svector();
    let correlated = coeff_a * cross * coeff_b.transpose();
    let covariance = coeff_a * sa * coeff_a.transpose()
        + coeff_b * sb * coeff_b.transpose()
        + correlated
        + correlated.transpose();

    let fused = Estimate {
        position: GlobalPoint::from_svector(position),
        covariance: GlobalCovariance::from_matrix(covariance).symmetrized(),
    };
    if fused.position.is_finite() && fused.covariance.is_finite() {
        Ok(fused)
    } else {
        Err(FusionError::NonFinite)
    }
}

/// Relocates a bearing-only track next to `reference` and blends the two.
///
/// The relocated point is `anchor + u·uᵀ·(reference − anchor)`, so with
/// `P = u·uᵀ` it carries `P·Σ_ref·Pᵀ` on top of its own lateral spread and
/// has cross-covariance `Σ_ref·Pᵀ` with the reference.
fn blend_with_bearing(reference: &Estimate, jammer: &SourceTrace) -> Result<Estimate> {
    let relocated = project_onto_ray(jammer, &reference.position)?;
    let along = along_ray_jacobian(jammer)?;
    let covariance = relocated.covariance + along.propagate_covariance(&reference.covariance);
    let unchanged = Jacobian::<Global, Global>::identity();
    let cross = cross_covariance(&unchanged, &reference.covariance, &along);
    let relocated = Estimate {
        position: relocated.position,
        covariance: covariance.symmetrized(),
    };
    blend(reference, &relocated, &cross)
}

/// Central-difference sensitivity of both triangulated points to one anchor.
fn anchor_sensitivity(
    anchor: &GlobalPoint,
    step: f64,
    solve: impl Fn(&GlobalPoint) -> Result<(GlobalPoint, GlobalPoint)>,
) -> Result<(Jacobian<Global, Global>, Jacobian<Global, Global>)> {
    let mut on_a = Matrix3::zeros();
    let mut on_b = Matrix3::zeros();
    for k in 0..3 {
        let mut offset = Vector3::zeros();
        offset[k] = step;
        let shift = GlobalPoint::from_svector(offset);
        let (a_plus, b_plus) = solve(&(*anchor + shift))?;
        let (a_minus, b_minus) = solve(&(*anchor - shift))?;
        on_a.set_column(k, &((a_plus - a_minus).into_svector() / (2.0 * step)));
        on_b.set_column(k, &((b_plus - b_minus).into_svector() / (2.0 * step)));
    }
    Ok((Jacobian::from_matrix(on_a), Jacobian::from_matrix(on_b)))
}

/// Triangulates two bearing-only tracks at the closest points of their rays.
///
/// Each anchor's lateral covariance is pushed through the sensitivity of
/// both closest points to that anchor, which yields both point covariances
/// and their cross-covariance.
fn triangulate(a: &SourceTrace, b: &SourceTrace) -> Result<Estimate> {
    let (sa, sb) = (a.sensor_position, b.sensor_position);
    let (pa, pb) = ray_intersection(&sa, &a.position, &sb, &b.position)?;

    let step_a = SENSITIVITY_STEP * a.ray().norm();
    let step_b = SENSITIVITY_STEP * b.ray().norm();
    let (pa_by_a, pb_by_a) = anchor_sensitivity(&a.position, step_a, |anchor| {
        ray_intersection(&sa, anchor, &sb, &b.position)
    })?;
    let (pa_by_b, pb_by_b) = anchor_sensitivity(&b.position, step_b, |anchor| {
        ray_intersection(&sa, &a.position, &sb, anchor)
    })?;

    let on_a = Estimate {
        position: pa,
        covariance: (pa_by_a.propagate_covariance(&a.covariance)
            + pa_by_b.propagate_covariance(&b.covariance))
        .symmetrized(),
    };
    let on_b = Estimate {
        position: pb,
        covariance: (pb_by_a.propagate_covariance(&a.covariance)
            + pb_by_b.propagate_covariance(&b.covariance))
        .symmetrized(),
    };
    let cross = cross_covariance(&pa_by_a, &a.covariance, &pb_by_a)
        + cross_covariance(&pa_by_b, &b.covariance, &pb_by_b);
    blend(&on_a, &on_b, &cross)
}

/// Position estimation strategy for one fused track.
#[derive(Debug, Clone, Copy)]
pub enum PositionEstimator<'a> {
    /// Only a head contributor.
    HeadOnly(&'a SourceTrace),
    /// Two full-position contributors.
    TwoTargets(&'a SourceTrace, &'a SourceTrace),
    /// One full-position and one bearing-only contributor.
    TargetAndJammer {
        /// Contributor with range
        target: &'a SourceTrace,
        /// Bearing-only contributor
        jammer: &'a SourceTrace,
    },
    /// Two bearing-only contributors.
    TwoJammers(&'a SourceTrace, &'a SourceTrace),
}

impl<'a> PositionEstimator<'a> {
    /// Selects the strategy from the bearing flags of the head and the
    /// optional second contributor.
    pub fn select(head: &'a SourceTrace, second: Option<&'a SourceTrace>) -> Self {
        match second {
            None => Self::HeadOnly(head),
            Some(other) => match (head.bearing_only, other.bearing_only) {
                (false, false) => Self::TwoTargets(head, other),
                (false, true) => Self::TargetAndJammer {
                    target: head,
                    jammer: other,
                },
                (true, false) => Self::TargetAndJammer {
                    target: other,
                    jammer: head,
                },
                (true, true) => Self::TwoJammers(head, other),
            },
        }
    }

    /// Fused position and covariance.
    pub fn estimate(&self) -> Result<Estimate> {
        match *self {
            Self::HeadOnly(head) => Ok(Estimate::of(head)),
            Self::TwoTargets(a, b) => {
                blend(&Estimate::of(a), &Estimate::of(b), &Matrix3::zeros())
            }
            Self::TargetAndJammer { target, jammer } => {
                blend_with_bearing(&Estimate::of(target), jammer)
            }
            Self::TwoJammers(a, b) => triangulate(a, b),
        }
    }
}

/// Folds one more contributor into a running estimate.
///
/// The running estimate already has full position information, so a
/// bearing-only contributor is relocated next to it as in the
/// target-and-jammer case.
pub fn fold_in(running: &Estimate, trace: &SourceTrace) -> Result<Estimate> {
    if trace.bearing_only {
        blend_with_bearing(running, trace)
    } else {
        blend(running, &Estimate::of(trace), &Matrix3::zeros())
    }
}

/// Fuses a head and its additional contributors (in priority order).
pub fn fuse_contributors(head: &SourceTrace, additional: &[&SourceTrace]) -> Result<Estimate> {
    let mut running = PositionEstimator::select(head, additional.first().copied()).estimate()?;
    for trace in additional.iter().skip(1) {
        running = fold_in(&running, trace)?;
    }
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ids::{SensorId, TargetId, Tick};
    use approx::assert_abs_diff_eq;

    fn trace(sensor: u32, p: [f64; 3], diag: [f64; 3]) -> SourceTrace {
        SourceTrace::new(
            SensorId(sensor),
            TargetId(1),
            GlobalPoint::zeros(),
            GlobalPoint::from_array(p),
            GlobalPoint::zeros(),
            GlobalCovariance::from_diagonal(&nalgebra::Vector3::from(diag)),
            false,
            Tick(0),
        )
    }

    fn bearing(sensor: u32, site: [f64; 3], through: [f64; 3]) -> SourceTrace {
        let site = GlobalPoint::from_array(site);
        let anchor = GlobalPoint::from_array(through);
        let d = anchor - site;
        let u = d.scale(1.0 / d.norm());
        let u = u.as_svector();
        let lateral = Matrix3::identity() - u * u.transpose();
        SourceTrace::new(
            SensorId(sensor),
            TargetId(1),
            site,
            anchor,
            GlobalPoint::zeros(),
            GlobalCovariance::from_matrix(lateral),
            true,
            Tick(0),
        )
    }

    #[test]
    fn test_select_dispatch() {
        let t = trace(1, [0.0, 0.0, 1000.0], [1.0; 3]);
        let j = bearing(2, [100.0, 0.0, 0.0], [0.0, 0.0, 1000.0]);
        assert!(matches!(PositionEstimator::select(&t, None), PositionEstimator::HeadOnly(_)));
        assert!(matches!(PositionEstimator::select(&t, Some(&t)), PositionEstimator::TwoTargets(..)));
        assert!(matches!(
            PositionEstimator::select(&j, Some(&t)),
            PositionEstimator::TargetAndJammer { target, .. } if target.sensor == SensorId(1)
        ));
        assert!(matches!(PositionEstimator::select(&j, Some(&j)), PositionEstimator::TwoJammers(..)));
    }

    #[test]
    fn test_equal_weights_average() {
        let a = trace(1, [0.0, 0.0, 0.0], [4.0, 4.0, 4.0]);
        let b = trace(2, [10.0, 0.0, 0.0], [4.0, 4.0, 4.0]);
        let e = PositionEstimator::select(&a, Some(&b)).estimate().unwrap();
        assert_abs_diff_eq!(*e.position.index(0), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.covariance.as_matrix()[(0, 0)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tighter_track_dominates() {
        let a = trace(1, [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = trace(2, [10.0, 0.0, 0.0], [9.0, 9.0, 9.0]);
        let e = PositionEstimator::select(&a, Some(&b)).estimate().unwrap();
        assert_abs_diff_eq!(*e.position.index(0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.covariance.as_matrix()[(0, 0)], 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_correlated_blend_matches_formula() {
        let a = Estimate {
            position: GlobalPoint::from_array([0.0, 0.0, 0.0]),
            covariance: GlobalCovariance::from_diagonal(&nalgebra::vector![4.0, 4.0, 4.0]),
        };
        let b = Estimate {
            position: GlobalPoint::from_array([6.0, 0.0, 0.0]),
            covariance: GlobalCovariance::from_diagonal(&nalgebra::vector![2.0, 2.0, 2.0]),
        };
        let cross = Matrix3::identity();
        let e = blend(&a, &b, &cross).unwrap();
        // Scalar case: A = (2 - 1)/(4 + 2 - 2) = 0.25, B = 0.75
        assert_abs_diff_eq!(*e.position.index(0), 4.5, epsilon = 1e-12);
        // 0.0625·4 + 0.5625·2 + 2·0.25·0.75·1
        assert_abs_diff_eq!(e.covariance.as_matrix()[(0, 0)], 1.75, epsilon = 1e-12);
    }

    #[test]
    fn test_target_and_jammer_keeps_target_range() {
        let t = trace(1, [2.0, 0.0, 6000.0], [25.0, 25.0, 25.0]);
        let j = bearing(2, [0.0, 0.0, 0.0], [0.0, 0.0, 1000.0]);
        let e = PositionEstimator::select(&t, Some(&j)).estimate().unwrap();
        // The relocated bearing point sits at the target's range; the
        // lateral position is pulled toward the bearing line.
        assert_abs_diff_eq!(*e.position.index(2), 6000.0, epsilon = 1e-9);
        assert!(e.position.index(0).abs() < 2.0);
    }

    fn variance_along(e: &Estimate, direction: [f64; 3]) -> f64 {
        let d = nalgebra::Vector3::from(direction).normalize();
        (d.transpose() * e.covariance.as_matrix() * d)[(0, 0)]
    }

    /// Target on the bearing ray at twice the anchor range, so the relocated
    /// point keeps the target's position and the lateral spread grows by 4.
    fn target_on_ray() -> (SourceTrace, SourceTrace) {
        let t = trace(1, [0.0, 0.0, 10000.0], [100.0, 100.0, 100.0]);
        let mut j = bearing(2, [5000.0, 0.0, 0.0], [2500.0, 0.0, 5000.0]);
        j.covariance = j.covariance.scale(100.0);
        (t, j)
    }

    #[test]
    fn test_target_and_jammer_keeps_along_ray_variance() {
        let (t, j) = target_on_ray();
        let e = PositionEstimator::select(&t, Some(&j)).estimate().unwrap();
        assert_abs_diff_eq!(*e.position.index(0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(*e.position.index(2), 10000.0, epsilon = 1e-6);
        // The bearing carries no range information: the target's along-ray
        // variance is kept, the lateral one is 100·400/500.
        assert_abs_diff_eq!(variance_along(&e, [-1.0, 0.0, 2.0]), 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(variance_along(&e, [2.0, 0.0, 1.0]), 80.0, epsilon = 1e-6);
        assert_abs_diff_eq!(variance_along(&e, [0.0, 1.0, 0.0]), 80.0, epsilon = 1e-6);
    }

    #[test]
    fn test_folded_bearing_keeps_along_ray_variance() {
        let (t, j) = target_on_ray();
        let second = trace(3, [0.0, 0.0, 10000.0], [100.0, 100.0, 100.0]);
        let e = fuse_contributors(&t, &[&second, &j]).unwrap();
        assert_abs_diff_eq!(variance_along(&e, [-1.0, 0.0, 2.0]), 50.0, epsilon = 1e-6);
        assert_abs_diff_eq!(variance_along(&e, [0.0, 1.0, 0.0]), 400.0 / 9.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fully_correlated_estimates_must_agree() {
        let a = Estimate {
            position: GlobalPoint::from_array([0.0, 0.0, 0.0]),
            covariance: GlobalCovariance::identity(),
        };
        let same = blend(&a, &a, &Matrix3::identity()).unwrap();
        assert_abs_diff_eq!(same.position.norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(same.covariance.as_matrix()[(1, 1)], 1.0, epsilon = 1e-12);

        let b = Estimate {
            position: GlobalPoint::from_array([1.0, 0.0, 0.0]),
            ..a
        };
        assert!(matches!(blend(&a, &b, &Matrix3::identity()), Err(FusionError::SingularMatrix)));
    }

    #[test]
    fn test_two_jammers_triangulate() {
        let a = bearing(1, [1100.0, 0.0, 0.0], [550.0, 0.0, 5500.0]);
        let b = bearing(2, [-1100.0, 0.0, 0.0], [-550.0, 0.0, 550.0]);
        let e = PositionEstimator::select(&a, Some(&b)).estimate().unwrap();
        assert_abs_diff_eq!(*e.position.index(0), 900.0, epsilon = 1e-6);
        assert_abs_diff_eq!(*e.position.index(2), 2000.0, epsilon = 1e-6);
        assert!(e.covariance.is_finite());
        // Both bearings constrain the in-plane position; across the plane
        // the two lateral spreads combine.
        assert!(variance_along(&e, [1.0, 0.0, 0.0]) > 0.0);
        assert!(variance_along(&e, [0.0, 1.0, 0.0]) > 0.0);
    }

    #[test]
    fn test_three_contributors_fold() {
        let a = trace(1, [0.0, 0.0, 0.0], [3.0, 3.0, 3.0]);
        let b = trace(2, [3.0, 0.0, 0.0], [3.0, 3.0, 3.0]);
        let c = trace(3, [6.0, 0.0, 0.0], [3.0, 3.0, 3.0]);
        let e = fuse_contributors(&a, &[&b, &c]).unwrap();
        // (a ⊕ b) has variance 1.5 at x = 1.5; folding c (variance 3) gives x = 3.
        assert_abs_diff_eq!(*e.position.index(0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.covariance.as_matrix()[(0, 0)], 1.0, epsilon = 1e-12);
    }
}
