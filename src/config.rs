use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::filters::GyroUnits;
use crate::types::SensorKind;

// ===== History buffers =====

/// Buffer capacities are `rate × window`, fixed for the life of the process.
#[derive(Clone, Debug, Serialize)]
pub struct BufferConfig {
    pub accel_hz: u32,
    pub gyro_hz: u32,
    pub mag_hz: u32,
    pub window_secs: u32,
    /// Start every buffer full of zeros so plots have a whole window at once.
    pub prefill: bool,
}

impl BufferConfig {
    pub fn rate_hz(&self, sensor: SensorKind) -> u32 {
        match sensor {
            SensorKind::Accelerometer => self.accel_hz,
            SensorKind::Gyroscope => self.gyro_hz,
            SensorKind::Magnetometer => self.mag_hz,
        }
    }

    pub fn capacity(&self, sensor: SensorKind) -> usize {
        self.rate_hz(sensor) as usize * self.window_secs as usize
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            accel_hz: 500,
            gyro_hz: 1000,
            mag_hz: 250,
            window_secs: 10,
            prefill: true,
        }
    }
}

// ===== Attitude filter =====

#[derive(Clone, Debug, Serialize)]
pub struct FilterConfig {
    pub alpha: f32,
    pub period_ms: u64,
    pub gyro_units: GyroUnits,
    pub use_calibrated: bool,
}

impl FilterConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            alpha: 0.98,
            period_ms: 10,
            gyro_units: GyroUnits::Degrees,
            use_calibrated: false,
        }
    }
}

// ===== Synthetic source =====

#[derive(Clone, Debug, Serialize)]
pub struct SimulatorConfig {
    pub enabled: bool,
    pub rate_hz: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_hz: 100,
        }
    }
}

// ===== Top level =====

#[derive(Clone, Debug, Serialize)]
pub struct Config {
    pub bind: SocketAddr,
    pub buffers: BufferConfig,
    pub filter: FilterConfig,
    pub simulator: SimulatorConfig,
    /// Interval of the periodic status log line; 0 disables it.
    pub status_log_secs: u64,
    /// A sensor with no samples for this long is reported as silent.
    pub health_silence_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            buffers: BufferConfig::default(),
            filter: FilterConfig::default(),
            simulator: SimulatorConfig::default(),
            status_log_secs: 5,
            health_silence_secs: 2,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for sensor in SensorKind::ALL {
            if self.buffers.capacity(sensor) == 0 {
                return Err(ConfigError::ZeroCapacity {
                    sensor: sensor.short_name(),
                    hz: self.buffers.rate_hz(sensor),
                    secs: self.buffers.window_secs,
                });
            }
        }

        let alpha = self.filter.alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::AlphaOutOfRange(alpha));
        }
        if self.filter.period_ms == 0 {
            return Err(ConfigError::ZeroPeriod("filter period"));
        }
        if self.simulator.enabled && self.simulator.rate_hz == 0 {
            return Err(ConfigError::ZeroPeriod("simulator rate"));
        }
        if self.health_silence_secs == 0 {
            return Err(ConfigError::ZeroPeriod("health silence threshold"));
        }
        Ok(())
    }
}
