//! Sensor reference frame
//!
//! Each radar sits on a fixed mount (levelled against north with two tilt
//! angles) carrying a rotating mount (azimuth, elevation, twist) that points
//! the antenna face. The two rotations compose into one rotation from the
//! sensor-local Cartesian frame to the antenna frame.
//!
//! Two compositions are kept: the *nominal* one the tracker believes in, and
//! the *corrupted* one that includes any injected fixed-mount calibration
//! error. Measurements of the true target are generated through the corrupted
//! rotation and interpreted through the nominal one, so a calibration error
//! shows up as a systematic bias in the reported tracks.

use serde::{Deserialize, Serialize};

use crate::types::spaces::{
    Antenna, Biconical, BiconicalPoint, Covariance3, Global, GlobalCovariance, GlobalPoint,
    Point3, SensorLocal,
};
use crate::types::transforms::{
    rotation_about_x, rotation_about_y, rotation_about_z, Jacobian, Rotation,
};
use crate::Result;

use super::biconical::{
    antenna_to_biconical, antenna_to_biconical_jacobian, biconical_to_antenna,
    biconical_to_antenna_jacobian,
};

/// Which rotation a conversion goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// The rotation the sensor's tracker assumes.
    Nominal,
    /// The physical rotation, including injected calibration error.
    Corrupted,
}

/// Mounting angles of one sensor (radians, meters).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameAngles {
    /// Height of the antenna phase centre above the site
    pub mount_height: f64,
    /// Fixed mount: rotation of the mount reference about the vertical, from north toward east
    pub north_azimuth: f64,
    /// Fixed mount: tilt about the mount's lateral axis
    pub tilt_pitch: f64,
    /// Fixed mount: tilt about the mount's longitudinal axis
    pub tilt_roll: f64,
    /// Injected fixed-mount error on `[north_azimuth, tilt_pitch, tilt_roll]`
    pub calibration_error: [f64; 3],
    /// Rotating mount: azimuth of the antenna face
    pub azimuth: f64,
    /// Rotating mount: elevation of the antenna face
    pub elevation: f64,
    /// Rotating mount: twist about the boresight
    pub twist: f64,
}

impl FrameAngles {
    /// Face pointing along `azimuth` at `elevation` on a level, north-aligned mount.
    pub fn pointing(mount_height: f64, azimuth: f64, elevation: f64) -> Self {
        Self {
            mount_height,
            azimuth,
            elevation,
            ..Default::default()
        }
    }
}

fn fixed_mount(north_azimuth: f64, pitch: f64, roll: f64) -> nalgebra::Matrix3<f64> {
    rotation_about_z(roll) * rotation_about_x(-pitch) * rotation_about_y(north_azimuth)
}

fn rotating_mount(azimuth: f64, elevation: f64, twist: f64) -> nalgebra::Matrix3<f64> {
    rotation_about_z(twist) * rotation_about_x(-elevation) * rotation_about_y(azimuth)
}

/// Time-invariant geometry of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrameDescriptor {
    site: GlobalPoint,
    angles: FrameAngles,
    rotating: nalgebra::Matrix3<f64>,
    nominal: Rotation<Antenna, SensorLocal>,
    corrupted: Rotation<Antenna, SensorLocal>,
}

impl SensorFrameDescriptor {
    /// Builds the frame of a sensor standing at `site` (ground level).
    pub fn new(site: GlobalPoint, angles: FrameAngles) -> Self {
        let rotating = rotating_mount(angles.azimuth, angles.elevation, angles.twist);
        let mut frame = Self {
            site,
            angles,
            rotating,
            nominal: Rotation::identity(),
            corrupted: Rotation::identity(),
        };
        frame.compose();
        frame
    }

    fn compose(&mut self) {
        let a = &self.angles;
        let err = a.calibration_error;
        let nominal = self.rotating * fixed_mount(a.north_azimuth, a.tilt_pitch, a.tilt_roll);
        let corrupted = self.rotating
            * fixed_mount(
                a.north_azimuth + err[0],
                a.tilt_pitch + err[1],
                a.tilt_roll + err[2],
            );
        self.nominal = Rotation::from_matrix(nominal);
        self.corrupted = Rotation::from_matrix(corrupted);
    }

    /// Replaces the injected fixed-mount calibration error and recomposes the
    /// corrupted rotation.
    pub fn inject_alignment_error(&mut self, error: [f64; 3]) {
        self.angles.calibration_error = error;
        self.compose();
    }

    /// Mounting angles.
    #[inline]
    pub fn angles(&self) -> &FrameAngles {
        &self.angles
    }

    /// Antenna phase centre in the common frame.
    #[inline]
    pub fn origin(&self) -> GlobalPoint {
        self.site + GlobalPoint::from_array([0.0, self.angles.mount_height, 0.0])
    }

    /// Rotation from the sensor-local frame to the antenna frame.
    #[inline]
    pub fn rotation(&self, alignment: Alignment) -> &Rotation<Antenna, SensorLocal> {
        match alignment {
            Alignment::Nominal => &self.nominal,
            Alignment::Corrupted => &self.corrupted,
        }
    }

    /// Global point → sensor-local Cartesian.
    #[inline]
    pub fn global_to_local(&self, p: &GlobalPoint) -> Point3<SensorLocal> {
        (*p - self.origin()).retag()
    }

    /// Sensor-local Cartesian → global point.
    #[inline]
    pub fn local_to_global(&self, p: &Point3<SensorLocal>) -> GlobalPoint {
        p.retag::<Global>() + self.origin()
    }

    /// Global point → antenna frame.
    pub fn global_to_antenna(&self, p: &GlobalPoint, alignment: Alignment) -> Point3<Antenna> {
        self.rotation(alignment).apply(&self.global_to_local(p))
    }

    /// Antenna frame → global point.
    pub fn antenna_to_global(&self, p: &Point3<Antenna>, alignment: Alignment) -> GlobalPoint {
        self.local_to_global(&self.rotation(alignment).transpose().apply(p))
    }

    /// Global point → `[range, epsilon_1, epsilon_2]`.
    pub fn global_to_biconical(&self, p: &GlobalPoint, alignment: Alignment) -> Result<BiconicalPoint> {
        antenna_to_biconical(&self.global_to_antenna(p, alignment))
    }

    /// `[range, epsilon_1, epsilon_2]` → global point.
    pub fn biconical_to_global(&self, b: &BiconicalPoint, alignment: Alignment) -> GlobalPoint {
        self.antenna_to_global(&biconical_to_antenna(b), alignment)
    }

    /// Jacobian of the full chain biconical → global at `b`.
    ///
    /// Translation drops out; what remains is `Rᵀ · ∂antenna/∂biconical`.
    pub fn biconical_to_global_jacobian(
        &self,
        b: &BiconicalPoint,
        alignment: Alignment,
    ) -> Result<Jacobian<Global, Biconical>> {
        let rt = self.rotation(alignment).transpose();
        let chain = rt * biconical_to_antenna_jacobian(b)?;
        Ok(Jacobian::from_matrix(chain.into_matrix()))
    }

    /// Jacobian of the full chain global → biconical at `p`.
    pub fn global_to_biconical_jacobian(
        &self,
        p: &GlobalPoint,
        alignment: Alignment,
    ) -> Result<Jacobian<Biconical, Global>> {
        let antenna = self.global_to_antenna(p, alignment);
        let chain = antenna_to_biconical_jacobian(&antenna)? * *self.rotation(alignment);
        Ok(Jacobian::from_matrix(chain.into_matrix()))
    }

    /// Biconical rates at `b` → global velocity.
    pub fn biconical_rate_to_global_velocity(
        &self,
        rate: &BiconicalPoint,
        b: &BiconicalPoint,
        alignment: Alignment,
    ) -> Result<GlobalPoint> {
        Ok(self.biconical_to_global_jacobian(b, alignment)?.apply(rate))
    }

    /// Global velocity at `p` → biconical rates.
    pub fn global_velocity_to_biconical_rate(
        &self,
        velocity: &GlobalPoint,
        p: &GlobalPoint,
        alignment: Alignment,
    ) -> Result<BiconicalPoint> {
        Ok(self.global_to_biconical_jacobian(p, alignment)?.apply(velocity))
    }

    /// Biconical covariance at `b` → global covariance.
    pub fn biconical_covariance_to_global(
        &self,
        cov: &Covariance3<Biconical>,
        b: &BiconicalPoint,
        alignment: Alignment,
    ) -> Result<GlobalCovariance> {
        Ok(self
            .biconical_to_global_jacobian(b, alignment)?
            .propagate_covariance(cov)
            .symmetrized())
    }

    /// Global covariance at `p` → biconical covariance.
    pub fn global_covariance_to_biconical(
        &self,
        cov: &GlobalCovariance,
        p: &GlobalPoint,
        alignment: Alignment,
    ) -> Result<Covariance3<Biconical>> {
        Ok(self
            .global_to_biconical_jacobian(p, alignment)?
            .propagate_covariance(cov)
            .symmetrized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f64::consts::FRAC_PI_2;

    fn tilted_frame() -> SensorFrameDescriptor {
        let angles = FrameAngles {
            mount_height: 12.0,
            north_azimuth: 0.05,
            tilt_pitch: 0.01,
            tilt_roll: -0.02,
            calibration_error: [0.0; 3],
            azimuth: 0.6,
            elevation: 0.2,
            twist: 0.1,
        };
        SensorFrameDescriptor::new(GlobalPoint::from_array([1000.0, 0.0, -500.0]), angles)
    }

    #[test]
    fn test_boresight_follows_pointing() {
        // Face pointing east (azimuth 90° from north), level.
        let frame = SensorFrameDescriptor::new(
            GlobalPoint::zeros(),
            FrameAngles::pointing(0.0, FRAC_PI_2, 0.0),
        );
        let east = GlobalPoint::from_array([10_000.0, 0.0, 0.0]);
        let b = frame.global_to_biconical(&east, Alignment::Nominal).unwrap();
        assert_relative_eq!(*b.index(0), 10_000.0, epsilon = 1e-9);
        assert_relative_eq!(*b.index(1), 0.0, epsilon = 1e-12);
        assert_relative_eq!(*b.index(2), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_elevated_face() {
        let frame = SensorFrameDescriptor::new(GlobalPoint::zeros(), FrameAngles::pointing(0.0, 0.0, 0.3));
        let (s, c) = 0.3_f64.sin_cos();
        let along_boresight = GlobalPoint::from_array([0.0, 5000.0 * s, 5000.0 * c]);
        let antenna = frame.global_to_antenna(&along_boresight, Alignment::Nominal);
        assert_relative_eq!(*antenna.index(2), 5000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_global_biconical_round_trip() {
        let frame = tilted_frame();
        let p = GlobalPoint::from_array([25_000.0, 4_000.0, 30_000.0]);
        let b = frame.global_to_biconical(&p, Alignment::Nominal).unwrap();
        let back = frame.biconical_to_global(&b, Alignment::Nominal);
        assert_relative_eq!(back.as_svector(), p.as_svector(), epsilon = 1e-7);
    }

    #[test]
    fn test_covariance_chain_round_trip() {
        let frame = tilted_frame();
        let p = GlobalPoint::from_array([25_000.0, 4_000.0, 30_000.0]);
        let b = frame.global_to_biconical(&p, Alignment::Nominal).unwrap();
        let cov = Covariance3::<Biconical>::from_diagonal(&nalgebra::vector![25.0, 1e-6, 1e-6]);
        let global = frame.biconical_covariance_to_global(&cov, &b, Alignment::Nominal).unwrap();
        let back = frame.global_covariance_to_biconical(&global, &p, Alignment::Nominal).unwrap();
        assert_relative_eq!(back.as_matrix(), cov.as_matrix(), epsilon = 1e-12, max_relative = 1e-7);
    }

    #[test]
    fn test_calibration_error_only_touches_corrupted() {
        let mut frame = tilted_frame();
        let nominal_before = *frame.rotation(Alignment::Nominal);
        frame.inject_alignment_error([0.002, 0.0, 0.0]);
        assert_eq!(*frame.rotation(Alignment::Nominal), nominal_before);
        assert_ne!(*frame.rotation(Alignment::Corrupted), nominal_before);

        let p = GlobalPoint::from_array([25_000.0, 4_000.0, 30_000.0]);
        let seen = frame.global_to_biconical(&p, Alignment::Corrupted).unwrap();
        let believed = frame.biconical_to_global(&seen, Alignment::Nominal);
        assert!((believed - p).norm() > 10.0);
    }

    #[test]
    fn test_velocity_chain_round_trip() {
        let frame = tilted_frame();
        let p = GlobalPoint::from_array([25_000.0, 4_000.0, 30_000.0]);
        let v = GlobalPoint::from_array([-250.0, 0.0, 30.0]);
        let rate = frame.global_velocity_to_biconical_rate(&v, &p, Alignment::Nominal).unwrap();
        let b = frame.global_to_biconical(&p, Alignment::Nominal).unwrap();
        let back = frame.biconical_rate_to_global_velocity(&rate, &b, Alignment::Nominal).unwrap();
        assert_relative_eq!(back.as_svector(), v.as_svector(), epsilon = 1e-8);
    }
}
