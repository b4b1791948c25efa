//! IMU telemetry ingestion and attitude fusion.
//!
//! A sensor device streams text frames over a WebSocket; the server parses
//! them into fixed-capacity history buffers and a shared latest-sample
//! store, and a periodic complementary filter turns the latest samples into
//! an orientation quaternion for read-side consumers.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub mod config;
pub mod error;
pub mod filters;
pub mod health_monitor;
pub mod history;
pub mod live_status;
pub mod protocol;
pub mod ring_buffer;
pub mod server;
pub mod shared_state;
pub mod simulator;
pub mod types;

pub use config::Config;
pub use error::{BufferError, ConfigError, FrameError, SessionError};
pub use filters::{ComplementaryFilter, FilterRunner, GyroUnits};
pub use history::SensorHistory;
pub use protocol::{parse_frame, SensorFrame};
pub use ring_buffer::{RecentWindow, RingBuffer, WindowData};
pub use server::IngestionServer;
pub use shared_state::{SensorSnapshot, SharedSensorState};
pub use types::{Attitude, Sample3, SensorKind};

/// Lock a mutex that only guards plain sample data. A writer that panicked
/// cannot leave a torn invariant behind, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once the shutdown flag is raised or its sender is dropped.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
