//! Periodic task driving the complementary filter from the shared state.
//!
//! The runner ticks on wall-clock time, independent of frame arrival, and
//! always consumes whatever samples are most recent. `dt` is measured between
//! ticks rather than assumed from the period.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::complementary::{ComplementaryFilter, ComplementaryFilterState};
use crate::shared_state::SharedSensorState;
use crate::types::Attitude;
use crate::wait_for_shutdown;

/// Shortest accepted tick period; shorter requests are raised to it.
const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct FilterRunner {
    filter: ComplementaryFilter,
    state: Arc<SharedSensorState>,
    period: Duration,
    use_calibrated: bool,
}

impl FilterRunner {
    pub fn new(filter: ComplementaryFilter, state: Arc<SharedSensorState>, period: Duration) -> Self {
        FilterRunner {
            filter,
            state,
            period: period.max(MIN_PERIOD),
            use_calibrated: false,
        }
    }

    /// Feed calibrated rather than raw samples into the filter.
    pub fn use_calibrated(mut self, enabled: bool) -> Self {
        self.use_calibrated = enabled;
        self
    }

    /// Run one filter update with the latest samples and publish the result.
    pub fn step(&mut self, dt: f32) -> Attitude {
        let (accel, gyro) = self.state.motion_pair(self.use_calibrated);
        let attitude = self.filter.update(dt, accel, gyro);
        self.state.set_attitude(attitude.x, attitude.y, attitude.z, attitude.w);
        attitude
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<ComplementaryFilterState> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ComplementaryFilterState {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        log::info!(
            "filter runner started (alpha {:.3}, period {:?}, {} input)",
            self.filter.alpha(),
            self.period,
            if self.use_calibrated { "calibrated" } else { "raw" }
        );

        let report_every = (Duration::from_secs(10).as_micros() / self.period.as_micros().max(1)).max(1) as u64;
        let mut last_tick = Instant::now();
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    let attitude = self.step(dt);
                    ticks += 1;
                    if ticks % report_every == 0 {
                        let (roll, pitch, yaw) = attitude.euler_degrees();
                        log::debug!(
                            "[filter] {} ticks, roll {:.1} pitch {:.1} yaw {:.1}",
                            ticks, roll, pitch, yaw
                        );
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        let state = self.filter.get_state();
        log::info!(
            "filter runner stopped after {} ticks ({} rejected steps)",
            ticks,
            state.rejected_steps
        );
        state
    }
}
