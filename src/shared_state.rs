//! Latest-sample store shared between ingestion, the filter runner and
//! read-side consumers.
//!
//! One mutex guards the whole state, so every call is atomic across all
//! fields. Calibrated readings are recomputed on every raw write and on every
//! offset change.

use serde::Serialize;
use std::sync::Mutex;

use crate::lock;
use crate::types::{Attitude, Sample3, SensorKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SensorReading {
    pub raw: Sample3,
    pub offset: Sample3,
    pub calibrated: Sample3,
}

impl SensorReading {
    fn set_raw(&mut self, raw: Sample3) {
        self.raw = raw;
        self.calibrated = raw - self.offset;
    }

    fn set_offset(&mut self, offset: Sample3) {
        self.offset = offset;
        self.calibrated = self.raw - offset;
    }
}

/// Consistent copy of the whole store, taken under one lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub accel: SensorReading,
    pub gyro: SensorReading,
    pub mag: SensorReading,
    pub attitude: Attitude,
}

impl SensorSnapshot {
    pub fn reading(&self, sensor: SensorKind) -> &SensorReading {
        match sensor {
            SensorKind::Accelerometer => &self.accel,
            SensorKind::Gyroscope => &self.gyro,
            SensorKind::Magnetometer => &self.mag,
        }
    }

    fn reading_mut(&mut self, sensor: SensorKind) -> &mut SensorReading {
        match sensor {
            SensorKind::Accelerometer => &mut self.accel,
            SensorKind::Gyroscope => &mut self.gyro,
            SensorKind::Magnetometer => &mut self.mag,
        }
    }
}

#[derive(Default)]
pub struct SharedSensorState {
    inner: Mutex<SensorSnapshot>,
}

impl SharedSensorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_acceleration(&self, ax: f32, ay: f32, az: f32) {
        self.set_raw(SensorKind::Accelerometer, Sample3::new(ax, ay, az));
    }

    pub fn set_rotation_rate(&self, gx: f32, gy: f32, gz: f32) {
        self.set_raw(SensorKind::Gyroscope, Sample3::new(gx, gy, gz));
    }

    pub fn set_magnetic_field(&self, mx: f32, my: f32, mz: f32) {
        self.set_raw(SensorKind::Magnetometer, Sample3::new(mx, my, mz));
    }

    pub fn set_raw(&self, sensor: SensorKind, raw: Sample3) {
        lock(&self.inner).reading_mut(sensor).set_raw(raw);
    }

    /// Stored as given; the filter is responsible for normalization.
    pub fn set_attitude(&self, x: f32, y: f32, z: f32, w: f32) {
        lock(&self.inner).attitude = Attitude::new(x, y, z, w);
    }

    /// Replace the offset and re-derive the calibrated reading from the last
    /// raw sample, so the change is visible before the next frame arrives.
    pub fn set_calibration_offset(&self, sensor: SensorKind, ox: f32, oy: f32, oz: f32) {
        let offset = Sample3::new(ox, oy, oz);
        lock(&self.inner).reading_mut(sensor).set_offset(offset);
        log::info!("{} calibration offset set to ({:.4}, {:.4}, {:.4})", sensor, ox, oy, oz);
    }

    /// Choose the offset that makes the current raw reading read as `expected`.
    pub fn calibrate_to(&self, sensor: SensorKind, expected: Sample3) -> Sample3 {
        let offset = {
            let mut state = lock(&self.inner);
            let reading = state.reading_mut(sensor);
            let offset = reading.raw - expected;
            reading.set_offset(offset);
            offset
        };
        log::info!(
            "{} calibrated against ({:.4}, {:.4}, {:.4}), offset ({:.4}, {:.4}, {:.4})",
            sensor, expected.x, expected.y, expected.z, offset.x, offset.y, offset.z
        );
        offset
    }

    /// Treat the current reading as pure bias.
    pub fn zero_bias(&self, sensor: SensorKind) -> Sample3 {
        self.calibrate_to(sensor, Sample3::ZERO)
    }

    pub fn clear_calibration(&self) {
        let mut state = lock(&self.inner);
        for sensor in SensorKind::ALL {
            state.reading_mut(sensor).set_offset(Sample3::ZERO);
        }
        drop(state);
        log::info!("calibration offsets cleared");
    }

    pub fn acceleration(&self) -> Sample3 {
        lock(&self.inner).accel.raw
    }

    pub fn calibrated_acceleration(&self) -> Sample3 {
        lock(&self.inner).accel.calibrated
    }

    pub fn rotation_rate(&self) -> Sample3 {
        lock(&self.inner).gyro.raw
    }

    pub fn calibrated_rotation_rate(&self) -> Sample3 {
        lock(&self.inner).gyro.calibrated
    }

    pub fn magnetic_field(&self) -> Sample3 {
        lock(&self.inner).mag.raw
    }

    pub fn calibrated_magnetic_field(&self) -> Sample3 {
        lock(&self.inner).mag.calibrated
    }

    pub fn attitude(&self) -> Attitude {
        lock(&self.inner).attitude
    }

    pub fn raw(&self, sensor: SensorKind) -> Sample3 {
        lock(&self.inner).reading(sensor).raw
    }

    pub fn calibrated(&self, sensor: SensorKind) -> Sample3 {
        lock(&self.inner).reading(sensor).calibrated
    }

    pub fn calibration_offset(&self, sensor: SensorKind) -> Sample3 {
        lock(&self.inner).reading(sensor).offset
    }

    /// Acceleration and rotation rate (raw or calibrated) from the same
    /// critical section.
    pub fn motion_pair(&self, calibrated: bool) -> (Sample3, Sample3) {
        let state = lock(&self.inner);
        if calibrated {
            (state.accel.calibrated, state.gyro.calibrated)
        } else {
            (state.accel.raw, state.gyro.raw)
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        *lock(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_calibrated_is_raw_minus_offset() {
        let state = SharedSensorState::new();
        state.set_calibration_offset(SensorKind::Gyroscope, 0.5, -0.25, 1.0);
        state.set_rotation_rate(1.0, 1.0, 1.0);

        assert_eq!(state.rotation_rate(), Sample3::new(1.0, 1.0, 1.0));
        assert_eq!(state.calibrated_rotation_rate(), Sample3::new(0.5, 1.25, 0.0));
    }

    #[test]
    fn test_offset_applies_without_new_sample() {
        let state = SharedSensorState::new();
        state.set_acceleration(0.1, 0.2, 9.9);
        state.set_calibration_offset(SensorKind::Accelerometer, 0.1, 0.2, 0.0);

        assert_eq!(state.calibrated_acceleration(), Sample3::new(0.0, 0.0, 9.9));
        assert_eq!(
            state.calibration_offset(SensorKind::Accelerometer),
            Sample3::new(0.1, 0.2, 0.0)
        );
    }

    #[test]
    fn test_calibration_is_idempotent() {
        let once = SharedSensorState::new();
        let twice = SharedSensorState::new();
        for state in [&once, &twice] {
            state.set_magnetic_field(30.0, -12.5, 44.0);
        }

        once.set_calibration_offset(SensorKind::Magnetometer, 2.0, 3.0, 4.0);
        twice.set_calibration_offset(SensorKind::Magnetometer, 2.0, 3.0, 4.0);
        twice.set_calibration_offset(SensorKind::Magnetometer, 2.0, 3.0, 4.0);

        assert_eq!(once.calibrated_magnetic_field(), twice.calibrated_magnetic_field());
        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn test_zero_bias_and_clear() {
        let state = SharedSensorState::new();
        state.set_rotation_rate(0.3, -0.1, 0.05);
        let offset = state.zero_bias(SensorKind::Gyroscope);

        assert_eq!(offset, Sample3::new(0.3, -0.1, 0.05));
        assert_eq!(state.calibrated_rotation_rate(), Sample3::ZERO);

        state.clear_calibration();
        assert_eq!(state.calibrated_rotation_rate(), Sample3::new(0.3, -0.1, 0.05));
    }

    #[test]
    fn test_calibrate_to_expected_gravity() {
        let state = SharedSensorState::new();
        state.set_acceleration(0.2, -0.1, 9.5);
        state.calibrate_to(SensorKind::Accelerometer, Sample3::new(0.0, 0.0, 9.5));
        assert_eq!(state.calibrated_acceleration(), Sample3::new(0.0, 0.0, 9.5));
    }

    #[test]
    fn test_attitude_stored_verbatim() {
        let state = SharedSensorState::new();
        assert_eq!(state.attitude(), Attitude::IDENTITY);
        state.set_attitude(0.0, 0.0, 2.0, 0.0);
        assert_eq!(state.attitude(), Attitude::new(0.0, 0.0, 2.0, 0.0));
    }

    #[test]
    fn test_snapshot_fields_are_consistent_under_contention() {
        let state = Arc::new(SharedSensorState::new());
        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..10_000 {
                    let v = i as f32;
                    state.set_acceleration(v, v, v);
                }
            })
        };
        for _ in 0..10_000 {
            let accel = state.snapshot().accel;
            assert_eq!(accel.raw.x, accel.raw.z);
            assert_eq!(accel.calibrated, accel.raw);
        }
        writer.join().unwrap();
    }
}
