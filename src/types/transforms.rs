//! Typed frame-to-frame matrices
//!
//! Rotations and local Jacobians that map vectors from one reference frame to
//! another, with the source and target frames encoded in the type.

use ::core::marker::PhantomData;
use ::core::ops::Mul;
use nalgebra::{RealField, SMatrix, Scalar};
use num_traits::Float;

use super::spaces::{Covariance, Vector};

// ============================================================================
// Transform Matrix
// ============================================================================

/// A matrix that maps vectors from frame `From` to frame `To`.
///
/// Used both for exact linear maps (rotations between Cartesian frames) and
/// for first-order linearizations (the Jacobian of a nonlinear coordinate map
/// evaluated at one point).
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Transform<T: Scalar, const ROWS: usize, const COLS: usize, To, From> {
    inner: SMatrix<T, ROWS, COLS>,
    _marker: PhantomData<(To, From)>,
}

impl<T: Scalar, const ROWS: usize, const COLS: usize, To, From> Transform<T, ROWS, COLS, To, From> {
    /// Creates a transform from a raw matrix.
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, ROWS, COLS>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, ROWS, COLS> {
        &self.inner
    }

    /// Consumes self and returns the underlying matrix.
    #[inline]
    pub fn into_matrix(self) -> SMatrix<T, ROWS, COLS> {
        self.inner
    }
}

impl<T: Scalar + Copy, const ROWS: usize, const COLS: usize, To: Clone, From: Clone> Copy
    for Transform<T, ROWS, COLS, To, From>
where
    SMatrix<T, ROWS, COLS>: Copy,
{
}

impl<T: RealField + Copy, const ROWS: usize, const COLS: usize, To, From>
    Transform<T, ROWS, COLS, To, From>
{
    /// Returns the transpose, mapping `To` back to `From`.
    ///
    /// For a rotation this is the exact inverse.
    #[inline]
    pub fn transpose(&self) -> Transform<T, COLS, ROWS, From, To> {
        Transform::from_matrix(self.inner.transpose())
    }

    /// Applies the map to a vector.
    #[inline]
    pub fn apply(&self, v: &Vector<T, COLS, From>) -> Vector<T, ROWS, To> {
        Vector::from_svector(self.inner * v.as_svector())
    }
}

impl<T: RealField + Copy, const N: usize, To, From> Transform<T, N, N, To, From> {
    /// Creates an identity map.
    #[inline]
    pub fn identity() -> Self {
        Self::from_matrix(SMatrix::identity())
    }

    /// Propagates a covariance through the map: `J · Σ · Jᵀ`.
    #[inline]
    pub fn propagate_covariance(&self, cov: &Covariance<T, N, From>) -> Covariance<T, N, To> {
        Covariance::from_matrix(self.inner * cov.as_matrix() * self.inner.transpose())
    }

    /// Attempts to invert the map.
    #[inline]
    pub fn try_inverse(&self) -> Option<Transform<T, N, N, From, To>> {
        self.inner.try_inverse().map(Transform::from_matrix)
    }
}

/// Composition: `(B: Mid → To) * (A: From → Mid) = (From → To)`.
impl<T: RealField + Copy, const N: usize, To, Mid, From> Mul<Transform<T, N, N, Mid, From>>
    for Transform<T, N, N, To, Mid>
{
    type Output = Transform<T, N, N, To, From>;

    #[inline]
    fn mul(self, rhs: Transform<T, N, N, Mid, From>) -> Self::Output {
        Transform::from_matrix(self.inner * rhs.inner)
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// A 3×3 local Jacobian from `From` to `To`.
pub type Jacobian<To, From> = Transform<f64, 3, 3, To, From>;

/// A rotation between two Cartesian frames.
pub type Rotation<To, From> = Transform<f64, 3, 3, To, From>;

// ============================================================================
// Elementary Rotations
// ============================================================================

/// Passive rotation about the `x` axis by `angle` radians.
pub fn rotation_about_x<T: RealField + Float + Copy>(angle: T) -> SMatrix<T, 3, 3> {
    let (s, c) = Float::sin_cos(angle);
    let (o, z) = (T::one(), T::zero());
    nalgebra::matrix![
        o, z, z;
        z, c, s;
        z, -s, c
    ]
}

/// Passive rotation about the `y` (vertical) axis by `angle` radians.
pub fn rotation_about_y<T: RealField + Float + Copy>(angle: T) -> SMatrix<T, 3, 3> {
    let (s, c) = Float::sin_cos(angle);
    let (o, z) = (T::one(), T::zero());
    nalgebra::matrix![
        c, z, -s;
        z, o, z;
        s, z, c
    ]
}

/// Passive rotation about the `z` axis by `angle` radians.
pub fn rotation_about_z<T: RealField + Float + Copy>(angle: T) -> SMatrix<T, 3, 3> {
    let (s, c) = Float::sin_cos(angle);
    let (o, z) = (T::one(), T::zero());
    nalgebra::matrix![
        c, s, z;
        -s, c, z;
        z, z, o
    ]
}

/// Cross-covariance of two linear maps of the same random vector: `A · Σ · Bᵀ`.
pub fn cross_covariance<const N: usize, ToA, ToB, From>(
    a: &Transform<f64, N, N, ToA, From>,
    cov: &Covariance<f64, N, From>,
    b: &Transform<f64, N, N, ToB, From>,
) -> SMatrix<f64, N, N> {
    a.as_matrix() * cov.as_matrix() * b.as_matrix().transpose()
}
