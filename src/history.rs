use serde::Serialize;

use crate::config::BufferConfig;
use crate::ring_buffer::RingBuffer;
use crate::types::{Sample3, SensorKind};

/// Per-sensor sample history, sized once from the configured rates.
pub struct SensorHistory {
    accel: RingBuffer,
    gyro: RingBuffer,
    mag: RingBuffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BufferFill {
    pub size: usize,
    pub capacity: usize,
}

impl SensorHistory {
    pub fn new(config: &BufferConfig) -> Self {
        let make = |sensor| {
            let capacity = config.capacity(sensor);
            if config.prefill {
                RingBuffer::filled(capacity, Sample3::ZERO)
            } else {
                RingBuffer::new(capacity)
            }
        };
        let history = SensorHistory {
            accel: make(SensorKind::Accelerometer),
            gyro: make(SensorKind::Gyroscope),
            mag: make(SensorKind::Magnetometer),
        };
        log::debug!(
            "history buffers: accel {}, gyro {}, mag {} samples{}",
            history.accel.capacity(),
            history.gyro.capacity(),
            history.mag.capacity(),
            if config.prefill { " (prefilled)" } else { "" }
        );
        history
    }

    pub fn buffer(&self, sensor: SensorKind) -> &RingBuffer {
        match sensor {
            SensorKind::Accelerometer => &self.accel,
            SensorKind::Gyroscope => &self.gyro,
            SensorKind::Magnetometer => &self.mag,
        }
    }

    pub fn accel(&self) -> &RingBuffer {
        &self.accel
    }

    pub fn gyro(&self) -> &RingBuffer {
        &self.gyro
    }

    pub fn mag(&self) -> &RingBuffer {
        &self.mag
    }

    pub fn fill(&self, sensor: SensorKind) -> BufferFill {
        let buffer = self.buffer(sensor);
        BufferFill {
            size: buffer.size(),
            capacity: buffer.capacity(),
        }
    }
}
