use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::lock;
use crate::types::SensorKind;

/// Tracks when a sensor last delivered a sample.
///
/// Silence is reported, never treated as a failure: a device that stops
/// sending simply leaves the latest values in place.
#[derive(Debug)]
pub struct SensorHealth {
    pub sensor: SensorKind,
    last_update: Mutex<Option<Instant>>,
    silence_threshold: Duration,
}

impl SensorHealth {
    pub fn new(sensor: SensorKind, silence_threshold: Duration) -> Self {
        SensorHealth {
            sensor,
            last_update: Mutex::new(None),
            silence_threshold,
        }
    }

    pub fn update(&self) {
        *lock(&self.last_update) = Some(Instant::now());
    }

    /// `None` until the first sample arrives.
    pub fn time_since_last_update(&self) -> Option<Duration> {
        let last = *lock(&self.last_update);
        last.map(|t| t.elapsed())
    }

    pub fn has_reported(&self) -> bool {
        lock(&self.last_update).is_some()
    }

    pub fn is_silent(&self) -> bool {
        self.time_since_last_update()
            .map(|d| d > self.silence_threshold)
            .unwrap_or(true)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SensorHealthReport {
    pub healthy: bool,
    pub reported: bool,
    pub silence_secs: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub accel: SensorHealthReport,
    pub gyro: SensorHealthReport,
    pub mag: SensorHealthReport,
}

#[derive(Debug)]
pub struct HealthMonitor {
    pub accel: SensorHealth,
    pub gyro: SensorHealth,
    pub mag: SensorHealth,
}

impl HealthMonitor {
    pub fn new(silence_threshold: Duration) -> Self {
        HealthMonitor {
            accel: SensorHealth::new(SensorKind::Accelerometer, silence_threshold),
            gyro: SensorHealth::new(SensorKind::Gyroscope, silence_threshold),
            mag: SensorHealth::new(SensorKind::Magnetometer, silence_threshold),
        }
    }

    pub fn sensor(&self, sensor: SensorKind) -> &SensorHealth {
        match sensor {
            SensorKind::Accelerometer => &self.accel,
            SensorKind::Gyroscope => &self.gyro,
            SensorKind::Magnetometer => &self.mag,
        }
    }

    pub fn mark(&self, sensor: SensorKind) {
        self.sensor(sensor).update();
    }

    pub fn check_health(&self) -> HealthReport {
        let report = |health: &SensorHealth| SensorHealthReport {
            healthy: !health.is_silent(),
            reported: health.has_reported(),
            silence_secs: health.time_since_last_update().map(|d| d.as_secs_f64()),
        };
        HealthReport {
            accel: report(&self.accel),
            gyro: report(&self.gyro),
            mag: report(&self.mag),
        }
    }

    /// One-line summary for the periodic status log.
    pub fn format_status(&self) -> String {
        SensorKind::ALL
            .iter()
            .map(|&sensor| {
                let health = self.sensor(sensor);
                let status = match health.time_since_last_update() {
                    None => "waiting".to_string(),
                    Some(_) if !health.is_silent() => "ok".to_string(),
                    Some(d) => format!("silent {:.1}s", d.as_secs_f64()),
                };
                format!("{}: {}", sensor, status)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
