//! Attitude complementary filter: gyroscope integration with accelerometer
//! tilt correction.
//!
//! Frame convention: the attitude maps the sensor frame into the world frame,
//! and the accelerometer reports gravity as the world "down" vector
//! `(0, 0, -1)` when the device lies flat at rest. The correction torque is
//! `measured × predicted`, where `predicted` is world-down expressed in the
//! sensor frame. With that ordering the error shrinks toward zero at rest.

use serde::{Deserialize, Serialize};

use crate::types::{
    attitude_from_quat, quat_from_attitude, vec3_from_sample, Attitude, Quat, Sample3, UnitQuat,
    Vec3, REFERENCE_GRAVITY,
};

/// Norms below this are treated as degenerate.
const MIN_NORM: f32 = 1e-9;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum GyroUnits {
    #[default]
    Degrees,
    Radians,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplementaryFilterState {
    pub attitude: Attitude,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
    pub updates: u64,
    pub rejected_steps: u64,
}

pub struct ComplementaryFilter {
    /// Trust in the gyroscope, in `[0, 1]`.
    alpha: f32,
    gyro_units: GyroUnits,
    attitude: Quat,
    updates: u64,
    rejected_steps: u64,
}

impl ComplementaryFilter {
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
        ComplementaryFilter {
            alpha,
            gyro_units: GyroUnits::Degrees,
            attitude: Quat::identity(),
            updates: 0,
            rejected_steps: 0,
        }
    }

    pub fn with_gyro_units(mut self, units: GyroUnits) -> Self {
        self.gyro_units = units;
        self
    }

    /// Start from a given orientation instead of identity. Degenerate input
    /// falls back to identity.
    pub fn with_attitude(mut self, attitude: Attitude) -> Self {
        self.attitude = normalized(quat_from_attitude(attitude)).unwrap_or_else(Quat::identity);
        self
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn attitude(&self) -> Attitude {
        attitude_from_quat(&self.attitude)
    }

    pub fn reset(&mut self) {
        self.attitude = Quat::identity();
    }

    /// Advance the estimate by `dt` seconds and return the new attitude.
    ///
    /// A non-positive or non-finite `dt` leaves the estimate untouched.
    pub fn update(&mut self, dt: f32, acceleration: Sample3, gyro: Sample3) -> Attitude {
        if !(dt.is_finite() && dt > 0.0) {
            return self.attitude();
        }

        self.integrate_gyro(gyro, dt);
        self.correct_with_accelerometer(acceleration, dt);
        self.updates += 1;
        self.attitude()
    }

    pub fn get_state(&self) -> ComplementaryFilterState {
        let attitude = self.attitude();
        let (roll_deg, pitch_deg, yaw_deg) = attitude.euler_degrees();
        ComplementaryFilterState {
            attitude,
            roll_deg,
            pitch_deg,
            yaw_deg,
            updates: self.updates,
            rejected_steps: self.rejected_steps,
        }
    }

    fn integrate_gyro(&mut self, gyro: Sample3, dt: f32) {
        let rate = match self.gyro_units {
            GyroUnits::Degrees => vec3_from_sample(gyro).map(f32::to_radians),
            GyroUnits::Radians => vec3_from_sample(gyro),
        };

        // q' = q + (½ q ⊗ ω) dt
        let q_dot = self.attitude * Quat::from_imag(rate) * 0.5;
        self.commit(self.attitude + q_dot * dt);
    }

    fn correct_with_accelerometer(&mut self, acceleration: Sample3, dt: f32) {
        let measured = vec3_from_sample(acceleration);
        let largest = measured.amax();
        if !largest.is_finite() || largest < MIN_NORM {
            return;
        }
        // Pre-scale so the norm cannot overflow for large finite readings.
        let measured = (measured / largest).normalize();

        let orientation = UnitQuat::new_unchecked(self.attitude);
        let predicted = orientation.inverse_transform_vector(&Vec3::from(REFERENCE_GRAVITY));

        let error = measured.cross(&predicted) * ((1.0 - self.alpha) * dt);
        let correction = self.attitude * Quat::from_imag(error) * 0.5;
        self.commit(self.attitude + correction);
    }

    /// Renormalize and store, or keep the previous attitude if the step blew up.
    fn commit(&mut self, candidate: Quat) {
        match normalized(candidate) {
            Some(q) => self.attitude = q,
            None => {
                self.rejected_steps += 1;
                log::warn!("discarding degenerate attitude step (norm {})", candidate.norm());
            }
        }
    }
}

fn normalized(q: Quat) -> Option<Quat> {
    let norm = q.norm();
    if !norm.is_finite() || norm < MIN_NORM {
        return None;
    }
    let unit = q * (1.0 / norm);
    unit.coords.iter().all(|c| c.is_finite()).then_some(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const GRAVITY_DOWN: Sample3 = Sample3::new(0.0, 0.0, -9.81);

    fn assert_unit(attitude: Attitude) {
        assert!(
            (attitude.norm() - 1.0).abs() <= 1e-4,
            "attitude {:?} has norm {}",
            attitude,
            attitude.norm()
        );
    }

    #[test]
    fn test_starts_at_identity() {
        let filter = ComplementaryFilter::new(0.98);
        assert_eq!(filter.attitude(), Attitude::IDENTITY);
    }

    #[test]
    fn test_alpha_is_clamped() {
        assert_eq!(ComplementaryFilter::new(1.7).alpha(), 1.0);
        assert_eq!(ComplementaryFilter::new(-0.2).alpha(), 0.0);
        assert_eq!(ComplementaryFilter::new(f32::NAN).alpha(), 1.0);
    }

    #[test]
    fn test_rest_at_reference_gravity_holds_identity() {
        let mut filter = ComplementaryFilter::new(0.98);
        for _ in 0..1_000 {
            filter.update(0.01, GRAVITY_DOWN, Sample3::ZERO);
        }
        let q = filter.attitude();
        assert_abs_diff_eq!(q.w, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(q.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(q.y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(q.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_tilt_converges_to_identity_and_holds() {
        // 30 degree roll.
        let half = 15f32.to_radians();
        let mut filter = ComplementaryFilter::new(0.5)
            .with_attitude(Attitude::new(half.sin(), 0.0, 0.0, half.cos()));

        for _ in 0..3_000 {
            filter.update(0.02, GRAVITY_DOWN, Sample3::ZERO);
        }
        let converged = filter.attitude();
        assert_abs_diff_eq!(converged.x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(converged.w, 1.0, epsilon = 1e-3);

        for _ in 0..500 {
            filter.update(0.02, GRAVITY_DOWN, Sample3::ZERO);
        }
        let held = filter.attitude();
        assert_abs_diff_eq!(held.x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(held.w, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_pitch_tilt_converges() {
        let half = (-20f32).to_radians() / 2.0;
        let mut filter = ComplementaryFilter::new(0.5)
            .with_attitude(Attitude::new(0.0, half.sin(), 0.0, half.cos()));
        let start = filter.attitude().y.abs();

        for _ in 0..200 {
            filter.update(0.02, GRAVITY_DOWN, Sample3::ZERO);
        }
        assert!(filter.attitude().y.abs() < start);
    }

    #[test]
    fn test_gyro_integration_yaw_quarter_turn() {
        // alpha = 1 disables the accelerometer correction.
        let mut filter = ComplementaryFilter::new(1.0);
        for _ in 0..1_000 {
            filter.update(0.001, GRAVITY_DOWN, Sample3::new(0.0, 0.0, 90.0));
        }
        let q = filter.attitude();
        let expected = std::f32::consts::FRAC_PI_4;
        assert_abs_diff_eq!(q.z, expected.sin(), epsilon = 1e-3);
        assert_abs_diff_eq!(q.w, expected.cos(), epsilon = 1e-3);
        assert_abs_diff_eq!(q.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_radian_units_skip_conversion() {
        let mut filter = ComplementaryFilter::new(1.0).with_gyro_units(GyroUnits::Radians);
        for _ in 0..1_000 {
            filter.update(0.001, GRAVITY_DOWN, Sample3::new(0.0, 0.0, std::f32::consts::FRAC_PI_2));
        }
        let yaw = filter.get_state().yaw_deg;
        assert_abs_diff_eq!(yaw, 90.0, epsilon = 0.5);
    }

    #[test]
    fn test_norm_invariant_under_arbitrary_finite_input() {
        let mut filter = ComplementaryFilter::new(0.9);
        let mut seed: u32 = 0x2545_f491;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
        };

        let scales = [1.0, 10.0, 1e3, 1e6, 1e30];
        for i in 0..5_000 {
            let scale = scales[i % scales.len()];
            let accel = Sample3::new(next() * scale, next() * scale, next() * scale);
            let gyro = Sample3::new(next() * scale, next() * scale, next() * scale);
            let dt = (next() + 1.0) * 0.05;
            let attitude = filter.update(dt, accel, gyro);
            assert_unit(attitude);
        }

        let extremes = [
            (0.01, Sample3::ZERO, Sample3::ZERO),
            (0.0, GRAVITY_DOWN, Sample3::new(1e3, 0.0, 0.0)),
            (10.0, Sample3::new(f32::MAX, f32::MAX, f32::MAX), Sample3::new(f32::MAX, 0.0, 0.0)),
            (f32::MIN_POSITIVE, GRAVITY_DOWN, Sample3::new(-f32::MAX, 1.0, 1.0)),
        ];
        for (dt, accel, gyro) in extremes {
            assert_unit(filter.update(dt, accel, gyro));
        }
    }

    #[test]
    fn test_invalid_dt_leaves_state_untouched() {
        let mut filter = ComplementaryFilter::new(0.5);
        filter.update(0.01, GRAVITY_DOWN, Sample3::new(10.0, 0.0, 0.0));
        let before = filter.attitude();

        for dt in [0.0, -0.5, f32::NAN, f32::INFINITY] {
            assert_eq!(filter.update(dt, GRAVITY_DOWN, Sample3::new(50.0, 50.0, 50.0)), before);
        }
        assert_eq!(filter.get_state().updates, 1);
    }

    #[test]
    fn test_reset_returns_to_identity() {
        let mut filter = ComplementaryFilter::new(0.98);
        filter.update(0.1, GRAVITY_DOWN, Sample3::new(30.0, 0.0, 0.0));
        assert_ne!(filter.attitude(), Attitude::IDENTITY);
        filter.reset();
        assert_eq!(filter.attitude(), Attitude::IDENTITY);
    }
}
