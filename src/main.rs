use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Duration;

use imu_telemetry::config::{BufferConfig, Config, FilterConfig, SimulatorConfig};
use imu_telemetry::health_monitor::HealthMonitor;
use imu_telemetry::live_status::{spawn_status_logger, LiveStatus};
use imu_telemetry::server::{Dispatcher, IngestionServer};
use imu_telemetry::simulator::Simulator;
use imu_telemetry::{ComplementaryFilter, FilterRunner, GyroUnits, SensorHistory, SharedSensorState};

#[derive(Parser, Debug)]
#[command(name = "imu_telemetry")]
#[command(about = "IMU telemetry ingestion with complementary-filter attitude fusion", long_about = None)]
struct Args {
    /// Run time in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Address for the sensor WebSocket and status routes
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Complementary filter gyro weight in [0, 1]
    #[arg(long, default_value = "0.98")]
    alpha: f32,

    /// Filter update period in milliseconds
    #[arg(long, default_value = "10")]
    filter_period_ms: u64,

    /// Units of the incoming gyroscope samples
    #[arg(long, value_enum, default_value = "degrees")]
    gyro_units: GyroUnits,

    /// Feed calibrated instead of raw samples to the filter
    #[arg(long)]
    filter_calibrated: bool,

    #[arg(long, default_value = "500")]
    accel_hz: u32,

    #[arg(long, default_value = "1000")]
    gyro_hz: u32,

    #[arg(long, default_value = "250")]
    mag_hz: u32,

    /// History window length in seconds
    #[arg(long, default_value = "10")]
    window_secs: u32,

    /// Start with empty history buffers instead of a window of zeros
    #[arg(long)]
    no_prefill: bool,

    /// Generate synthetic frames instead of waiting for a device
    #[arg(long)]
    simulate: bool,

    #[arg(long, default_value = "100")]
    simulate_hz: u32,

    /// Status log interval in seconds (0 = off)
    #[arg(long, default_value = "5")]
    status_interval: u64,

    /// Seconds without samples before a sensor is reported silent
    #[arg(long, default_value = "2")]
    silence_secs: u64,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            bind: self.bind,
            buffers: BufferConfig {
                accel_hz: self.accel_hz,
                gyro_hz: self.gyro_hz,
                mag_hz: self.mag_hz,
                window_secs: self.window_secs,
                prefill: !self.no_prefill,
            },
            filter: FilterConfig {
                alpha: self.alpha,
                period_ms: self.filter_period_ms,
                gyro_units: self.gyro_units,
                use_calibrated: self.filter_calibrated,
            },
            simulator: SimulatorConfig {
                enabled: self.simulate,
                rate_hz: self.simulate_hz,
            },
            status_log_secs: self.status_interval,
            health_silence_secs: self.silence_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate().context("invalid configuration")?;

    log::info!("IMU telemetry starting");
    log::info!("  Bind: {}", config.bind);
    log::info!(
        "  Filter: alpha {:.3}, every {} ms, gyro in {:?}, {} input",
        config.filter.alpha,
        config.filter.period_ms,
        config.filter.gyro_units,
        if config.filter.use_calibrated { "calibrated" } else { "raw" }
    );
    log::info!(
        "  History: {} s at accel {} Hz, gyro {} Hz, mag {} Hz",
        config.buffers.window_secs,
        config.buffers.accel_hz,
        config.buffers.gyro_hz,
        config.buffers.mag_hz
    );
    if args.duration > 0 {
        log::info!("  Duration: {} seconds", args.duration);
    }

    let state = Arc::new(SharedSensorState::new());
    let history = Arc::new(SensorHistory::new(&config.buffers));
    let health = Arc::new(HealthMonitor::new(Duration::from_secs(config.health_silence_secs)));
    let dispatcher = Arc::new(Dispatcher::new(history, Arc::clone(&state), health));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let filter = ComplementaryFilter::new(config.filter.alpha).with_gyro_units(config.filter.gyro_units);
    let filter_handle = FilterRunner::new(filter, Arc::clone(&state), config.filter.period())
        .use_calibrated(config.filter.use_calibrated)
        .spawn(shutdown_rx.clone());

    let simulator_handle = config.simulator.enabled.then(|| {
        Simulator::new(Arc::clone(&dispatcher), config.simulator.rate_hz).spawn(shutdown_rx.clone())
    });

    let server = IngestionServer::new(Arc::clone(&dispatcher), shutdown_rx.clone());
    let app = server.app_state();
    let status_handle = (config.status_log_secs > 0).then(|| {
        spawn_status_logger(
            app.clone(),
            Duration::from_secs(config.status_log_secs),
            shutdown_rx.clone(),
        )
    });

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let mut server_handle = tokio::spawn(server.serve(listener));

    let run_for = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    let server_finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            log::info!("Ctrl-C received, shutting down");
            None
        }
        _ = run_for => {
            log::info!("run time elapsed, shutting down");
            None
        }
        result = &mut server_handle => Some(result),
    };

    // All receivers may already be gone; nothing to signal then.
    let _ = shutdown_tx.send(true);

    match server_finished {
        Some(result) => result.context("server task panicked")??,
        None => server_handle.await.context("server task panicked")??,
    }
    let filter_state = filter_handle.await.context("filter task panicked")?;
    if let Some(handle) = simulator_handle {
        let sent = handle.await.context("simulator task panicked")?;
        log::info!("Simulator sent {} frames", sent);
    }
    if let Some(handle) = status_handle {
        handle.await.context("status task panicked")?;
    }

    let status = LiveStatus::collect(&app);
    log::info!("=== Final Stats ===");
    log::info!("  {}", status.summary_line());
    log::info!(
        "  Filter: {} updates, {} rejected steps",
        filter_state.updates,
        filter_state.rejected_steps
    );
    log::info!(
        "  Sessions: {}, magnetometer frames: {}",
        status.stats.sessions,
        status.stats.mag_frames
    );

    Ok(())
}
