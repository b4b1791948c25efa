pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One accelerometer, gyroscope or magnetometer reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample3 {
    pub const ZERO: Sample3 = Sample3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::ops::Sub for Sample3 {
    type Output = Sample3;

    fn sub(self, rhs: Sample3) -> Sample3 {
        Sample3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Orientation estimate as a quaternion `(x, y, z, w)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Attitude {
    pub const IDENTITY: Attitude = Attitude { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Roll, pitch and yaw in degrees, for logs and status output.
    pub fn euler_degrees(&self) -> (f32, f32, f32) {
        let (roll, pitch, yaw) = unit_quat_from_attitude(*self).euler_angles();
        (roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }
}

impl Default for Attitude {
    fn default() -> Self {
        Attitude::IDENTITY
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Magnetometer,
    ];

    pub fn short_name(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accel",
            SensorKind::Gyroscope => "gyro",
            SensorKind::Magnetometer => "mag",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor '{0}'")]
pub struct UnknownSensor(pub String);

impl FromStr for SensorKind {
    type Err = UnknownSensor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accel" | "acc" | "accelerometer" => Ok(SensorKind::Accelerometer),
            "gyro" | "gyroscope" => Ok(SensorKind::Gyroscope),
            "mag" | "magnetometer" => Ok(SensorKind::Magnetometer),
            _ => Err(UnknownSensor(s.to_string())),
        }
    }
}
