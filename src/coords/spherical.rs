//! Cartesian ↔ spherical conversions
//!
//! Spherical coordinates are `[range, azimuth, elevation]` with
//! `azimuth = atan2(z, x)` and `elevation = atan2(y, hypot(x, z))`, taken
//! about the origin of whichever Cartesian frame `F` the point lives in.

use crate::types::spaces::{Covariance3, Point3, Spherical};
use crate::types::transforms::Jacobian;
use crate::{FusionError, Result};

use super::MIN_RANGE;

/// Converts a Cartesian point to `[range, azimuth, elevation]`.
pub fn cartesian_to_spherical<F>(p: &Point3<F>) -> Point3<Spherical> {
    let (x, y, z) = (p.index(0), p.index(1), p.index(2));
    let horizontal = x.hypot(*z);
    Point3::from_array([p.norm(), z.atan2(*x), y.atan2(horizontal)])
}

/// Converts `[range, azimuth, elevation]` back to Cartesian.
pub fn spherical_to_cartesian<F>(s: &Point3<Spherical>) -> Point3<F> {
    let (r, az, el) = (*s.index(0), *s.index(1), *s.index(2));
    let (sa, ca) = az.sin_cos();
    let (se, ce) = el.sin_cos();
    Point3::from_array([r * ce * ca, r * se, r * ce * sa])
}

/// Jacobian `∂(x, y, z) / ∂(r, az, el)` at `s`.
pub fn spherical_to_cartesian_jacobian<F>(s: &Point3<Spherical>) -> Jacobian<F, Spherical> {
    let (r, az, el) = (*s.index(0), *s.index(1), *s.index(2));
    let (sa, ca) = az.sin_cos();
    let (se, ce) = el.sin_cos();
    Jacobian::from_matrix(nalgebra::matrix![
        ce * ca, -r * ce * sa, -r * se * ca;
        se,      0.0,          r * ce;
        ce * sa, r * ce * ca,  -r * se * sa
    ])
}

/// Jacobian `∂(r, az, el) / ∂(x, y, z)` at `p`.
///
/// Undefined at the origin and on the vertical axis, where azimuth is not
/// a function of position.
pub fn cartesian_to_spherical_jacobian<F>(p: &Point3<F>) -> Result<Jacobian<Spherical, F>> {
    let (x, y, z) = (*p.index(0), *p.index(1), *p.index(2));
    let r2 = p.norm_squared();
    let rho2 = x * x + z * z;
    if r2.sqrt() < MIN_RANGE || rho2.sqrt() < MIN_RANGE {
        return Err(FusionError::DegenerateGeometry("point on the spherical polar axis"));
    }
    let r = r2.sqrt();
    let rho = rho2.sqrt();
    Ok(Jacobian::from_matrix(nalgebra::matrix![
        x / r,               y / r,     z / r;
        -z / rho2,           0.0,       x / rho2;
        -x * y / (r2 * rho), rho / r2,  -z * y / (r2 * rho)
    ]))
}

/// Propagates a spherical covariance at `s` into the Cartesian frame.
pub fn spherical_covariance_to_cartesian<F>(
    cov: &Covariance3<Spherical>,
    s: &Point3<Spherical>,
) -> Covariance3<F> {
    spherical_to_cartesian_jacobian::<F>(s).propagate_covariance(cov)
}

/// Propagates a Cartesian covariance at `p` into spherical coordinates.
pub fn cartesian_covariance_to_spherical<F>(
    cov: &Covariance3<F>,
    p: &Point3<F>,
) -> Result<Covariance3<Spherical>> {
    Ok(cartesian_to_spherical_jacobian(p)?.propagate_covariance(cov))
}

/// Converts `[range rate, azimuth rate, elevation rate]` at `s` to a
/// Cartesian velocity.
pub fn spherical_rate_to_cartesian_velocity<F>(
    rate: &Point3<Spherical>,
    s: &Point3<Spherical>,
) -> Point3<F> {
    spherical_to_cartesian_jacobian::<F>(s).apply(rate)
}

/// Converts a Cartesian velocity at `p` to spherical rates.
pub fn cartesian_velocity_to_spherical_rate<F>(
    velocity: &Point3<F>,
    p: &Point3<F>,
) -> Result<Point3<Spherical>> {
    Ok(cartesian_to_spherical_jacobian(p)?.apply(velocity))
}
