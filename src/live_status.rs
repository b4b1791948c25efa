use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::health_monitor::HealthReport;
use crate::history::BufferFill;
use crate::server::{AppState, SessionStatus, StatsSnapshot};
use crate::shared_state::SensorSnapshot;
use crate::types::SensorKind;
use crate::wait_for_shutdown;

#[derive(Clone, Debug, Serialize)]
pub struct BufferFills {
    pub accel: BufferFill,
    pub gyro: BufferFill,
    pub mag: BufferFill,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct EulerDegrees {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Point-in-time view of the whole pipeline, served at `/status`.
#[derive(Clone, Debug, Serialize)]
pub struct LiveStatus {
    pub timestamp: String,
    pub started_at: String,
    pub uptime_seconds: u64,
    pub session: SessionStatus,
    pub stats: StatsSnapshot,
    pub sensors: SensorSnapshot,
    pub euler_deg: EulerDegrees,
    pub buffers: BufferFills,
    pub health: HealthReport,
}

impl LiveStatus {
    pub fn collect(app: &AppState) -> Self {
        let dispatcher = &app.dispatcher;
        let sensors = dispatcher.state().snapshot();
        let (roll, pitch, yaw) = sensors.attitude.euler_degrees();
        let history = dispatcher.history();

        LiveStatus {
            timestamp: chrono::Utc::now().to_rfc3339(),
            started_at: app.started_at.to_rfc3339(),
            uptime_seconds: app.started.elapsed().as_secs(),
            session: app.slot.status(),
            stats: dispatcher.stats().snapshot(),
            sensors,
            euler_deg: EulerDegrees { roll, pitch, yaw },
            buffers: BufferFills {
                accel: history.fill(SensorKind::Accelerometer),
                gyro: history.fill(SensorKind::Gyroscope),
                mag: history.fill(SensorKind::Magnetometer),
            },
            health: dispatcher.health().check_health(),
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "[{}s] session {} | frames {} (errors {}, rejected {}) | roll {:.1} pitch {:.1} yaw {:.1}",
            self.uptime_seconds,
            self.session.phase,
            self.stats.frames,
            self.stats.parse_errors,
            self.stats.rejected_connections,
            self.euler_deg.roll,
            self.euler_deg.pitch,
            self.euler_deg.yaw,
        )
    }
}

/// Log a status line every `period` until shutdown.
pub fn spawn_status_logger(
    app: AppState,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = LiveStatus::collect(&app);
                    log::info!("{}", status.summary_line());
                    log::info!("[health] {}", app.dispatcher.health().format_status());
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::health_monitor::HealthMonitor;
    use crate::history::SensorHistory;
    use crate::server::{Dispatcher, IngestionServer};
    use crate::shared_state::SharedSensorState;
    use std::sync::Arc;

    fn app() -> (AppState, watch::Sender<bool>) {
        let config = BufferConfig {
            accel_hz: 2,
            gyro_hz: 2,
            mag_hz: 2,
            window_secs: 2,
            prefill: true,
        };
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(SensorHistory::new(&config)),
            Arc::new(SharedSensorState::new()),
            Arc::new(HealthMonitor::new(Duration::from_secs(1))),
        ));
        let (tx, rx) = watch::channel(false);
        (IngestionServer::new(dispatcher, rx).app_state(), tx)
    }

    #[test]
    fn test_collect_reflects_pipeline() {
        let (app, _tx) = app();
        app.dispatcher.state().set_attitude(0.0, 0.0, 0.0, 1.0);
        app.dispatcher
            .handle_text("Acc: [0, 0, -1], Gyro: [0, 0, 0], Mag: [1, 2, 3]")
            .unwrap();

        let status = LiveStatus::collect(&app);
        assert_eq!(status.stats.frames, 1);
        assert_eq!(status.stats.mag_frames, 1);
        assert_eq!(status.buffers.mag, BufferFill { size: 4, capacity: 4 });
        assert!(status.health.mag.reported);
        assert!(!status.summary_line().is_empty());
        assert!(status.summary_line().contains("session listening"));
    }

    #[tokio::test]
    async fn test_status_logger_stops_on_shutdown() {
        let (app, tx) = app();
        let handle = spawn_status_logger(app, Duration::from_millis(5), tx.subscribe());
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
