//! Linear algebra aliases and conversions between the plain wire/state
//! types and nalgebra.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use super::{Attitude, Sample3};

pub type Vec3 = Vector3<f32>;
pub type Quat = Quaternion<f32>;
pub type UnitQuat = UnitQuaternion<f32>;

/// Reference "down" direction in the world frame.
pub const REFERENCE_GRAVITY: [f32; 3] = [0.0, 0.0, -1.0];

pub fn vec3_from_sample(sample: Sample3) -> Vec3 {
    Vec3::new(sample.x, sample.y, sample.z)
}

pub fn quat_from_attitude(attitude: Attitude) -> Quat {
    Quat::new(attitude.w, attitude.x, attitude.y, attitude.z)
}

pub fn attitude_from_quat(q: &Quat) -> Attitude {
    Attitude::new(q.i, q.j, q.k, q.w)
}

/// Normalizes on the way in, so callers may pass a slightly drifted attitude.
pub fn unit_quat_from_attitude(attitude: Attitude) -> UnitQuat {
    UnitQuat::from_quaternion(quat_from_attitude(attitude))
}
