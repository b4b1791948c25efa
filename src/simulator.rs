//! Synthetic sensor source for running without a device.
//!
//! Frames go through the wire formatter and the dispatcher, exactly as if a
//! device had sent them. The signal is a gentle 2 Hz wobble around a level,
//! stationary pose (gravity reads as `(0, 0, -1)` g) with a slow yaw sweep.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::protocol::SensorFrame;
use crate::server::Dispatcher;
use crate::types::Sample3;
use crate::wait_for_shutdown;

const WOBBLE_HZ: f64 = 2.0;
const YAW_HZ: f64 = 0.05;
const MAG_FIELD_UT: f64 = 40.0;

pub struct Simulator {
    dispatcher: Arc<Dispatcher>,
    rate_hz: u32,
    with_mag: bool,
}

impl Simulator {
    pub fn new(dispatcher: Arc<Dispatcher>, rate_hz: u32) -> Self {
        Simulator {
            dispatcher,
            rate_hz: rate_hz.max(1),
            with_mag: true,
        }
    }

    pub fn with_mag(mut self, enabled: bool) -> Self {
        self.with_mag = enabled;
        self
    }

    /// The frame emitted at `t` seconds.
    pub fn frame_at(t: f64, with_mag: bool) -> SensorFrame {
        let wobble = 2.0 * PI * WOBBLE_HZ * t;
        let accel = Sample3::new(
            (wobble.sin() * 0.05) as f32,
            (wobble.cos() * 0.03) as f32,
            (-1.0 + (wobble * 0.5).sin() * 0.01) as f32,
        );
        // deg/s; the yaw term integrates to the heading used for the field
        let yaw_rate = 360.0 * YAW_HZ;
        let gyro = Sample3::new(
            (wobble.cos() * 2.0) as f32,
            (wobble.sin() * 1.5) as f32,
            yaw_rate as f32,
        );

        let frame = SensorFrame::new(accel, gyro);
        if !with_mag {
            return frame;
        }
        let heading = 2.0 * PI * YAW_HZ * t;
        frame.with_mag(Sample3::new(
            (heading.cos() * MAG_FIELD_UT * 0.5) as f32,
            (-heading.sin() * MAG_FIELD_UT * 0.5) as f32,
            (-MAG_FIELD_UT * 0.8) as f32,
        ))
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }

    /// Emit frames until shutdown; returns how many were sent.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let step = 1.0 / self.rate_hz as f64;
        let mut ticker = interval(Duration::from_secs_f64(step));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "[simulator] emitting frames at {} Hz{}",
            self.rate_hz,
            if self.with_mag { " with magnetometer" } else { "" }
        );

        let mut sent = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let wire = Self::frame_at(sent as f64 * step, self.with_mag).to_wire();
                    if let Err(err) = self.dispatcher.handle_text(&wire) {
                        log::error!("[simulator] generated an unparseable frame: {}", err);
                    }
                    sent += 1;
                    if sent % (self.rate_hz as u64 * 30) == 0 {
                        log::debug!("[simulator] {} frames", sent);
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        log::info!("[simulator] stopped after {} frames", sent);
        sent
    }
}
