use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::interval;

use super::AppState;
use crate::live_status::LiveStatus;
use crate::ring_buffer::WindowData;
use crate::types::{Sample3, SensorKind};
use crate::wait_for_shutdown;

/// Push rate of `/status/stream` (20 Hz).
const STREAM_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
pub struct CalibrationResponse {
    pub sensor: SensorKind,
    pub offset: Sample3,
    pub calibrated: Sample3,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub n: Option<usize>,
}

fn sensor_from_path(name: &str) -> Result<SensorKind, (StatusCode, String)> {
    name.parse::<SensorKind>()
        .map_err(|err| (StatusCode::NOT_FOUND, err.to_string()))
}

fn calibration_response(app: &AppState, sensor: SensorKind) -> Json<CalibrationResponse> {
    let reading = *app.dispatcher.state().snapshot().reading(sensor);
    Json(CalibrationResponse {
        sensor,
        offset: reading.offset,
        calibrated: reading.calibrated,
    })
}

pub async fn status_handler(State(app): State<AppState>) -> Json<LiveStatus> {
    Json(LiveStatus::collect(&app))
}

pub async fn status_stream_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(|socket| stream_status(socket, app))
}

async fn stream_status(mut socket: WebSocket, app: AppState) {
    let mut shutdown = app.shutdown_signal();
    let mut ticker = interval(STREAM_PERIOD);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let json = match serde_json::to_string(&LiveStatus::collect(&app)) {
                    Ok(json) => json,
                    Err(err) => {
                        log::error!("[status] failed to encode status: {}", err);
                        break;
                    }
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    // Viewer went away.
                    break;
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

pub async fn history_handler(
    Path(sensor): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(app): State<AppState>,
) -> Result<Json<Option<WindowData>>, (StatusCode, String)> {
    let sensor = sensor_from_path(&sensor)?;
    let buffer = app.dispatcher.history().buffer(sensor);
    let n = query.n.unwrap_or_else(|| buffer.capacity());
    buffer
        .recent_copy(n)
        .map(Json)
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))
}

pub async fn set_offset(
    Path(sensor): Path<String>,
    State(app): State<AppState>,
    Json(offset): Json<Sample3>,
) -> Result<Json<CalibrationResponse>, (StatusCode, String)> {
    let sensor = sensor_from_path(&sensor)?;
    if !offset.is_finite() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "offset must be finite".to_string()));
    }
    app.dispatcher
        .state()
        .set_calibration_offset(sensor, offset.x, offset.y, offset.z);
    Ok(calibration_response(&app, sensor))
}

pub async fn zero_offset(
    Path(sensor): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<CalibrationResponse>, (StatusCode, String)> {
    let sensor = sensor_from_path(&sensor)?;
    app.dispatcher.state().zero_bias(sensor);
    Ok(calibration_response(&app, sensor))
}

pub async fn clear_calibration(State(app): State<AppState>) -> impl IntoResponse {
    app.dispatcher.state().clear_calibration();
    StatusCode::NO_CONTENT
}
