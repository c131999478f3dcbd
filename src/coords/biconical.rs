//! Antenna Cartesian ↔ biconical conversions
//!
//! A phased-array face measures range and two direction sines relative to its
//! boresight (`+z` of the [`Antenna`] frame):
//!
//! ```text
//! epsilon_1 = asin(x / r)        x = r sin(epsilon_1)
//! epsilon_2 = asin(y / r)        y = r sin(epsilon_2)
//!                                z = r sqrt(1 - sin²(epsilon_1) - sin²(epsilon_2))
//! ```
//!
//! The inverse is only defined in front of the face (`z >= 0`).

use crate::types::spaces::{Antenna, Biconical, BiconicalPoint, Covariance3, Point3};
use crate::types::transforms::Jacobian;
use crate::{FusionError, Result};

use super::MIN_RANGE;

/// Converts an antenna-frame point to `[range, epsilon_1, epsilon_2]`.
pub fn antenna_to_biconical(p: &Point3<Antenna>) -> Result<BiconicalPoint> {
    let r = p.norm();
    if r < MIN_RANGE {
        return Err(FusionError::DegenerateGeometry("point at the antenna phase centre"));
    }
    Ok(BiconicalPoint::from_array([
        r,
        (p.index(0) / r).asin(),
        (p.index(1) / r).asin(),
    ]))
}

/// Boresight cosine `sqrt(1 - sin²ε₁ - sin²ε₂)`, clamped at zero outside the
/// visible region.
#[inline]
fn boresight_cosine(sin_1: f64, sin_2: f64) -> f64 {
    (1.0 - sin_1 * sin_1 - sin_2 * sin_2).max(0.0).sqrt()
}

/// Converts `[range, epsilon_1, epsilon_2]` back to the antenna frame.
pub fn biconical_to_antenna(b: &BiconicalPoint) -> Point3<Antenna> {
    let r = *b.index(0);
    let s1 = b.index(1).sin();
    let s2 = b.index(2).sin();
    Point3::from_array([r * s1, r * s2, r * boresight_cosine(s1, s2)])
}

/// Jacobian `∂(x, y, z) / ∂(r, ε₁, ε₂)` at `b`.
///
/// Fails on the edge of the visible region, where the boresight component
/// has an infinite slope.
pub fn biconical_to_antenna_jacobian(b: &BiconicalPoint) -> Result<Jacobian<Antenna, Biconical>> {
    let r = *b.index(0);
    let (s1, c1) = b.index(1).sin_cos();
    let (s2, c2) = b.index(2).sin_cos();
    let w = boresight_cosine(s1, s2);
    if w < 1e-12 {
        return Err(FusionError::DegenerateGeometry("direction on the antenna horizon"));
    }
    Ok(Jacobian::from_matrix(nalgebra::matrix![
        s1, r * c1,           0.0;
        s2, 0.0,              r * c2;
        w,  -r * s1 * c1 / w, -r * s2 * c2 / w
    ]))
}

/// Jacobian `∂(r, ε₁, ε₂) / ∂(x, y, z)` at `p`.
pub fn antenna_to_biconical_jacobian(p: &Point3<Antenna>) -> Result<Jacobian<Biconical, Antenna>> {
    let (x, y, z) = (*p.index(0), *p.index(1), *p.index(2));
    let r2 = p.norm_squared();
    let r = r2.sqrt();
    if r < MIN_RANGE {
        return Err(FusionError::DegenerateGeometry("point at the antenna phase centre"));
    }
    let c1 = (1.0 - x * x / r2).max(0.0).sqrt();
    let c2 = (1.0 - y * y / r2).max(0.0).sqrt();
    if c1 < 1e-12 || c2 < 1e-12 {
        return Err(FusionError::DegenerateGeometry("direction on a biconical pole"));
    }
    let r3 = r2 * r;
    Ok(Jacobian::from_matrix(nalgebra::matrix![
        x / r,                   y / r,                   z / r;
        (r2 - x * x) / (r3 * c1), -x * y / (r3 * c1),      -x * z / (r3 * c1);
        -x * y / (r3 * c2),      (r2 - y * y) / (r3 * c2), -y * z / (r3 * c2)
    ]))
}

/// Propagates a biconical covariance at `b` into the antenna frame.
pub fn biconical_covariance_to_antenna(
    cov: &Covariance3<Biconical>,
    b: &BiconicalPoint,
) -> Result<Covariance3<Antenna>> {
    Ok(biconical_to_antenna_jacobian(b)?.propagate_covariance(cov))
}

/// Propagates an antenna-frame covariance at `p` into biconical coordinates.
pub fn antenna_covariance_to_biconical(
    cov: &Covariance3<Antenna>,
    p: &Point3<Antenna>,
) -> Result<Covariance3<Biconical>> {
    Ok(antenna_to_biconical_jacobian(p)?.propagate_covariance(cov))
}

/// Converts biconical rates at `b` to an antenna-frame velocity.
pub fn biconical_rate_to_antenna_velocity(
    rate: &BiconicalPoint,
    b: &BiconicalPoint,
) -> Result<Point3<Antenna>> {
    Ok(biconical_to_antenna_jacobian(b)?.apply(rate))
}

/// Converts an antenna-frame velocity at `p` to biconical rates.
pub fn antenna_velocity_to_biconical_rate(
    velocity: &Point3<Antenna>,
    p: &Point3<Antenna>,
) -> Result<BiconicalPoint> {
    Ok(antenna_to_biconical_jacobian(p)?.apply(velocity))
}

/// Zeroes the range row and column of a biconical covariance.
///
/// A bearing-only measurement carries no range information; its range
/// variance is a placeholder and must not leak into any combination with
/// other error sources.
pub fn zero_range_terms(cov: &Covariance3<Biconical>) -> Covariance3<Biconical> {
    let mut m = *cov.as_matrix();
    m.row_mut(0).fill(0.0);
    m.column_mut(0).fill(0.0);
    Covariance3::from_matrix(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_boresight_point() {
        let p: Point3<Antenna> = Point3::from_array([0.0, 0.0, 5000.0]);
        let b = antenna_to_biconical(&p).unwrap();
        assert_relative_eq!(*b.index(0), 5000.0);
        assert_relative_eq!(*b.index(1), 0.0);
        assert_relative_eq!(*b.index(2), 0.0);
    }

    #[test]
    fn test_position_round_trip() {
        let p: Point3<Antenna> = Point3::from_array([-2500.0, 1200.0, 9000.0]);
        let back = biconical_to_antenna(&antenna_to_biconical(&p).unwrap());
        assert_relative_eq!(back.as_svector(), p.as_svector(), epsilon = 1e-8);
    }

    #[test]
    fn test_jacobians_are_inverse() {
        let p: Point3<Antenna> = Point3::from_array([4000.0, -700.0, 20_000.0]);
        let b = antenna_to_biconical(&p).unwrap();
        let forward = biconical_to_antenna_jacobian(&b).unwrap();
        let backward = antenna_to_biconical_jacobian(&p).unwrap();
        assert_relative_eq!(
            forward.as_matrix() * backward.as_matrix(),
            nalgebra::Matrix3::identity(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_covariance_round_trip() {
        let b = BiconicalPoint::from_array([30_000.0, 0.2, -0.1]);
        let cov = Covariance3::from_matrix(nalgebra::matrix![
            25.0, 0.0, 0.0;
            0.0, 1e-6, 2e-7;
            0.0, 2e-7, 4e-6
        ]);
        let cart = biconical_covariance_to_antenna(&cov, &b).unwrap();
        let back = antenna_covariance_to_biconical(&cart, &biconical_to_antenna(&b)).unwrap();
        assert_relative_eq!(back.as_matrix(), cov.as_matrix(), epsilon = 1e-12, max_relative = 1e-7);
    }

    #[test]
    fn test_zero_range_terms() {
        let cov = Covariance3::from_matrix(nalgebra::matrix![
            100.0, 1.0, 2.0;
            1.0, 3.0, 0.5;
            2.0, 0.5, 4.0
        ]);
        let zeroed = zero_range_terms(&cov);
        for i in 0..3 {
            assert_eq!(zeroed.as_matrix()[(0, i)], 0.0);
            assert_eq!(zeroed.as_matrix()[(i, 0)], 0.0);
        }
        assert_eq!(zeroed.as_matrix()[(1, 2)], 0.5);
    }
}
