use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::FrameError;
use crate::health_monitor::HealthMonitor;
use crate::history::SensorHistory;
use crate::protocol::{parse_frame, SensorFrame};
use crate::shared_state::SharedSensorState;
use crate::types::{Sample3, SensorKind};

/// Every Nth parse error is logged at warn; the rest go to debug.
const PARSE_ERROR_LOG_EVERY: u64 = 100;

#[derive(Debug, Default)]
pub struct IngestionStats {
    frames: AtomicU64,
    mag_frames: AtomicU64,
    parse_errors: AtomicU64,
    sessions: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub mag_frames: u64,
    pub parse_errors: u64,
    pub sessions: u64,
    pub rejected_connections: u64,
}

impl IngestionStats {
    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            mag_frames: self.mag_frames.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            rejected_connections: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Routes parsed frames into the history buffers and the shared store.
pub struct Dispatcher {
    history: Arc<SensorHistory>,
    state: Arc<SharedSensorState>,
    health: Arc<HealthMonitor>,
    stats: IngestionStats,
}

impl Dispatcher {
    pub fn new(
        history: Arc<SensorHistory>,
        state: Arc<SharedSensorState>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Dispatcher {
            history,
            state,
            health,
            stats: IngestionStats::default(),
        }
    }

    pub fn history(&self) -> &Arc<SensorHistory> {
        &self.history
    }

    pub fn state(&self) -> &Arc<SharedSensorState> {
        &self.state
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    /// Parse one text frame and dispatch it. A malformed frame changes
    /// nothing except the error counter.
    pub fn handle_text(&self, text: &str) -> Result<SensorFrame, FrameError> {
        match parse_frame(text) {
            Ok(frame) => {
                self.dispatch(&frame);
                Ok(frame)
            }
            Err(err) => {
                self.record_parse_error(&err, text);
                Err(err)
            }
        }
    }

    pub fn dispatch(&self, frame: &SensorFrame) {
        log::trace!("[dispatch] {:?}", frame);
        self.accept(SensorKind::Accelerometer, frame.accel);
        self.accept(SensorKind::Gyroscope, frame.gyro);
        if let Some(mag) = frame.mag {
            self.accept(SensorKind::Magnetometer, mag);
            self.stats.mag_frames.fetch_add(1, Ordering::Relaxed);
        }

        let frames = self.stats.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frames == 1 {
            log::info!("[dispatch] first frame received");
        } else if frames % 10_000 == 0 {
            log::debug!("[dispatch] {} frames", frames);
        }
    }

    pub fn record_parse_error(&self, err: &FrameError, text: &str) {
        let count = self.stats.parse_errors.fetch_add(1, Ordering::Relaxed) + 1;
        let preview: String = text.chars().take(80).collect();
        if count == 1 || count % PARSE_ERROR_LOG_EVERY == 0 {
            log::warn!("[dispatch] dropped frame ({} total): {}: {:?}", count, err, preview);
        } else {
            log::debug!("[dispatch] dropped frame: {}: {:?}", err, preview);
        }
    }

    fn accept(&self, sensor: SensorKind, sample: Sample3) {
        self.state.set_raw(sensor, sample);
        if let Err(err) = self.history.buffer(sensor).push(sample) {
            log::error!("[dispatch] {} history rejected sample: {}", sensor, err);
        }
        self.health.mark(sensor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use std::time::Duration;

    fn dispatcher() -> Dispatcher {
        let config = BufferConfig {
            accel_hz: 4,
            gyro_hz: 4,
            mag_hz: 2,
            window_secs: 1,
            prefill: false,
        };
        Dispatcher::new(
            Arc::new(SensorHistory::new(&config)),
            Arc::new(SharedSensorState::new()),
            Arc::new(HealthMonitor::new(Duration::from_secs(5))),
        )
    }

    #[test]
    fn test_valid_frame_reaches_buffers_and_state() {
        let dispatcher = dispatcher();
        dispatcher
            .handle_text("Acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]")
            .unwrap();

        assert_eq!(dispatcher.state().acceleration(), Sample3::new(1.0, 2.0, 3.0));
        assert_eq!(dispatcher.state().rotation_rate(), Sample3::new(0.1, 0.2, 0.3));
        assert_eq!(dispatcher.history().accel().latest(), Some(Sample3::new(1.0, 2.0, 3.0)));
        assert_eq!(dispatcher.history().gyro().size(), 1);
        assert_eq!(dispatcher.history().mag().size(), 0);

        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.mag_frames, 0);
        assert!(dispatcher.health().gyro.has_reported());
        assert!(!dispatcher.health().mag.has_reported());
    }

    #[test]
    fn test_magnetometer_frame_updates_mag() {
        let dispatcher = dispatcher();
        dispatcher
            .handle_text("Acc: [0, 0, -1], Gyro: [0, 0, 0], Mag: [20, -5, 40]")
            .unwrap();

        assert_eq!(dispatcher.state().magnetic_field(), Sample3::new(20.0, -5.0, 40.0));
        assert_eq!(dispatcher.history().mag().size(), 1);
        assert_eq!(dispatcher.stats().snapshot().mag_frames, 1);
    }

    #[test]
    fn test_malformed_frame_changes_nothing() {
        let dispatcher = dispatcher();
        dispatcher
            .handle_text("Acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]")
            .unwrap();
        let before = dispatcher.state().snapshot();

        assert!(dispatcher.handle_text("Acc: [1,2]").is_err());
        assert!(dispatcher.handle_text("garbage").is_err());

        assert_eq!(dispatcher.state().snapshot(), before);
        assert_eq!(dispatcher.history().accel().size(), 1);
        let stats = dispatcher.stats().snapshot();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.parse_errors, 2);
    }

    #[test]
    fn test_history_keeps_most_recent_frames() {
        let dispatcher = dispatcher();
        for i in 0..10 {
            let frame = SensorFrame::new(Sample3::new(i as f32, 0.0, 0.0), Sample3::ZERO);
            dispatcher.dispatch(&frame);
        }
        let window = dispatcher.history().accel().recent_copy(4).unwrap().unwrap();
        assert_eq!(window.x, vec![6.0, 7.0, 8.0, 9.0]);
    }
}
