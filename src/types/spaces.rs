//! Reference frames and frame-tagged vectors
//!
//! Every position, velocity and covariance in the network lives in exactly one
//! reference frame. The frame is carried as a phantom type so a sensor-local
//! vector cannot be added to a global one without going through a transform.

use ::core::marker::PhantomData;
use ::core::ops::{Add, Mul, Neg, Sub};
use nalgebra::{RealField, SMatrix, SVector, Scalar};

// ============================================================================
// Frame Markers
// ============================================================================

/// Common Cartesian frame shared by every sensor and the command post.
///
/// Axes: `x` east, `y` up, `z` north (meters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global;

/// Cartesian frame centred on a sensor's antenna phase centre, axes parallel
/// to [`Global`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorLocal;

/// Cartesian frame of the antenna face after fixed-mount and rotating-mount
/// rotations. Boresight is `+z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Antenna;

/// Angular antenna frame: `[range, epsilon_1, epsilon_2]`, where the two
/// off-boresight angles are `asin(x / r)` and `asin(y / r)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Biconical;

/// Spherical frame: `[range, azimuth, elevation]` with
/// `azimuth = atan2(z, x)` and `elevation = atan2(y, hypot(x, z))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spherical;

// ============================================================================
// Typed Vector
// ============================================================================

/// A vector parameterized by scalar type, dimension, and reference frame.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T: Scalar, const N: usize, Frame> {
    inner: SVector<T, N>,
    _marker: PhantomData<Frame>,
}

impl<T: Scalar, const N: usize, Frame> Vector<T, N, Frame> {
    /// Creates a new vector from raw components.
    #[inline]
    pub fn from_array(data: [T; N]) -> Self {
        Self {
            inner: SVector::from(data),
            _marker: PhantomData,
        }
    }

    /// Creates a new vector from an nalgebra SVector.
    #[inline]
    pub fn from_svector(inner: SVector<T, N>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying nalgebra vector.
    #[inline]
    pub fn as_svector(&self) -> &SVector<T, N> {
        &self.inner
    }

    /// Consumes self and returns the underlying nalgebra vector.
    #[inline]
    pub fn into_svector(self) -> SVector<T, N> {
        self.inner
    }

    /// Access element at index.
    ///
    /// # Panics
    /// Panics if index is out of bounds.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn index(&self, index: usize) -> &T {
        &self.inner[index]
    }
}

impl<T: Scalar + Copy, const N: usize, Frame: Clone> Copy for Vector<T, N, Frame> {}

impl<T: RealField + Copy, const N: usize, Frame> Vector<T, N, Frame> {
    /// Creates a zero vector.
    #[inline]
    pub fn zeros() -> Self {
        Self::from_svector(SVector::zeros())
    }

    /// Computes the squared Euclidean norm.
    #[inline]
    pub fn norm_squared(&self) -> T {
        self.inner.norm_squared()
    }

    /// Computes the Euclidean norm.
    #[inline]
    pub fn norm(&self) -> T {
        self.inner.norm()
    }

    /// Scales the vector by a scalar.
    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self::from_svector(self.inner.scale(s))
    }

    /// Inner product with another vector of the same frame.
    #[inline]
    pub fn dot(&self, other: &Self) -> T {
        self.inner.dot(&other.inner)
    }

    /// True when every component is finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|v| v.is_finite())
    }
}

impl<T: RealField + Copy, Frame> Vector<T, 3, Frame> {
    /// Cross product of two 3-vectors in the same frame.
    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::from_svector(self.inner.cross(&other.inner))
    }

    /// Re-tags a vector whose components are already expressed in `Other`.
    ///
    /// Only for frames that differ by a pure translation, where difference
    /// vectors carry over unchanged.
    #[inline]
    pub fn retag<Other>(self) -> Vector<T, 3, Other> {
        Vector::from_svector(self.inner)
    }
}

// ============================================================================
// Type Aliases
// ============================================================================

/// A 3-D point or velocity in a given frame.
pub type Point3<Frame> = Vector<f64, 3, Frame>;

/// A position in the common frame.
pub type GlobalPoint = Point3<Global>;

/// A biconical `[range, epsilon_1, epsilon_2]` triple.
pub type BiconicalPoint = Point3<Biconical>;

// ============================================================================
// Operations: Same-Frame Arithmetic
// ============================================================================

impl<T: RealField + Copy, const N: usize, Frame> Add for Vector<T, N, Frame> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::from_svector(self.inner + rhs.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Frame> Sub for Vector<T, N, Frame> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::from_svector(self.inner - rhs.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Frame> Neg for Vector<T, N, Frame> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self::Output {
        Self::from_svector(-self.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Frame> Mul<T> for Vector<T, N, Frame> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: T) -> Self::Output {
        Self::from_svector(self.inner * rhs)
    }
}

// ============================================================================
// Covariance Matrix
// ============================================================================

/// A covariance matrix bound to a specific reference frame.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Covariance<T: Scalar, const N: usize, Frame> {
    inner: SMatrix<T, N, N>,
    _marker: PhantomData<Frame>,
}

impl<T: Scalar, const N: usize, Frame> Covariance<T, N, Frame> {
    /// Creates a covariance matrix from a raw matrix.
    ///
    /// The caller should ensure the matrix is symmetric and positive semi-definite.
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, N, N>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, N, N> {
        &self.inner
    }

    /// Consumes self and returns the underlying matrix.
    #[inline]
    pub fn into_matrix(self) -> SMatrix<T, N, N> {
        self.inner
    }
}

impl<T: Scalar + Copy, const N: usize, Frame: Clone> Copy for Covariance<T, N, Frame> where
    SMatrix<T, N, N>: Copy
{
}

impl<T: RealField + Copy, const N: usize, Frame> Covariance<T, N, Frame> {
    /// Creates a zero covariance matrix.
    #[inline]
    pub fn zeros() -> Self {
        Self::from_matrix(SMatrix::zeros())
    }

    /// Creates an identity covariance matrix.
    #[inline]
    pub fn identity() -> Self {
        Self::from_matrix(SMatrix::identity())
    }

    /// Creates a diagonal covariance matrix.
    #[inline]
    pub fn from_diagonal(diag: &SVector<T, N>) -> Self {
        Self::from_matrix(SMatrix::from_diagonal(diag))
    }

    /// Scales the covariance matrix.
    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self::from_matrix(self.inner.scale(s))
    }

    /// Computes the trace of the covariance matrix.
    #[inline]
    pub fn trace(&self) -> T {
        self.inner.trace()
    }

    /// Attempts to compute the inverse of the covariance matrix.
    #[inline]
    pub fn try_inverse(&self) -> Option<SMatrix<T, N, N>> {
        self.inner.try_inverse()
    }

    /// Returns `(P + Pᵀ) / 2`, removing round-off asymmetry.
    #[inline]
    pub fn symmetrized(&self) -> Self {
        let half = T::one() / (T::one() + T::one());
        Self::from_matrix((self.inner + self.inner.transpose()) * half)
    }

    /// Generalized (Mahalanobis) squared distance `Δᵀ · P⁻¹ · Δ`.
    ///
    /// Returns `None` when the matrix is singular.
    pub fn mahalanobis(&self, delta: &Vector<T, N, Frame>) -> Option<T> {
        let inv = self.try_inverse()?;
        let d = delta.as_svector();
        Some((d.transpose() * inv * d)[(0, 0)])
    }

    /// True when every element is finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|v| v.is_finite())
    }
}

impl<T: RealField + Copy, const N: usize, Frame> Add for Covariance<T, N, Frame> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::from_matrix(self.inner + rhs.inner)
    }
}

/// A 3×3 covariance in a given frame.
pub type Covariance3<Frame> = Covariance<f64, 3, Frame>;

/// Position covariance in the common frame.
pub type GlobalCovariance = Covariance3<Global>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_operations() {
        let a: GlobalPoint = GlobalPoint::from_array([1.0, 2.0, 3.0]);
        let b: GlobalPoint = GlobalPoint::from_array([0.5, 1.0, 1.5]);

        let sum = a + b;
        assert!((sum.index(0) - 1.5).abs() < 1e-12);
        assert!((sum.index(2) - 4.5).abs() < 1e-12);
        assert!((a.dot(&b) - 7.0).abs() < 1e-12);

        let z = GlobalPoint::from_array([1.0, 0.0, 0.0]).cross(&GlobalPoint::from_array([0.0, 1.0, 0.0]));
        assert!((z.index(2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mahalanobis_identity() {
        let cov: GlobalCovariance = GlobalCovariance::identity();
        let delta = GlobalPoint::from_array([1.0, 2.0, 2.0]);
        assert!((cov.mahalanobis(&delta).unwrap() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_mahalanobis() {
        let cov: GlobalCovariance = GlobalCovariance::zeros();
        assert!(cov.mahalanobis(&GlobalPoint::zeros()).is_none());
    }

    #[test]
    fn test_symmetrized() {
        let cov: GlobalCovariance = Covariance::from_matrix(nalgebra::matrix![
            1.0, 2.0, 0.0;
            0.0, 1.0, 0.0;
            0.0, 0.0, 1.0
        ]);
        let s = cov.symmetrized();
        assert_eq!(s.as_matrix()[(0, 1)], 1.0);
        assert_eq!(s.as_matrix()[(1, 0)], 1.0);
    }
}
