//! WebSocket ingestion endpoint plus the HTTP read side, on one axum router.

pub mod dispatch;
pub mod session;
pub mod status;

pub use dispatch::{Dispatcher, IngestionStats, StatsSnapshot};
pub use session::{SessionGuard, SessionPhase, SessionSlot, SessionStatus};

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::error::{FrameError, SessionError};
use crate::wait_for_shutdown;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub slot: Arc<SessionSlot>,
    pub started: Instant,
    pub started_at: chrono::DateTime<chrono::Utc>,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }
}

pub struct IngestionServer {
    app: AppState,
}

impl IngestionServer {
    pub fn new(dispatcher: Arc<Dispatcher>, shutdown: watch::Receiver<bool>) -> Self {
        IngestionServer {
            app: AppState {
                dispatcher,
                slot: Arc::new(SessionSlot::new()),
                started: Instant::now(),
                started_at: chrono::Utc::now(),
                shutdown,
            },
        }
    }

    pub fn app_state(&self) -> AppState {
        self.app.clone()
    }

    pub fn slot(&self) -> &Arc<SessionSlot> {
        &self.app.slot
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/status", get(status::status_handler))
            .route("/status/stream", get(status::status_stream_handler))
            .route("/history/:sensor", get(status::history_handler))
            .route("/calibration", delete(status::clear_calibration))
            .route("/calibration/:sensor", post(status::set_offset))
            .route("/calibration/:sensor/zero", post(status::zero_offset))
            .with_state(self.app.clone())
    }

    /// Serve until the shutdown flag is raised. An active sensor session is
    /// sent a close frame on shutdown.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        log::info!("[server] listening on ws://{}/ws", addr);

        let mut shutdown = self.app.shutdown_signal();
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
            .await?;

        log::info!("[server] stopped");
        Ok(())
    }
}

async fn ws_handler(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(app): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // Claim first so a busy server answers 409 regardless of the request.
    let guard = match app.slot.try_claim(peer) {
        Ok(guard) => guard,
        Err(err) => {
            app.dispatcher.stats().record_rejected();
            log::warn!("[server] {} from {}", err, peer);
            return (
                StatusCode::CONFLICT,
                [(header::CONNECTION, "close")],
                err.to_string(),
            )
                .into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            log::warn!("[session {}] {}: not a websocket upgrade: {}", guard.id(), peer, rejection);
            guard.transition(SessionPhase::Error);
            return rejection.into_response();
        }
    };
    guard.transition(SessionPhase::HandshakeInProgress);

    let dispatcher = Arc::clone(&app.dispatcher);
    let shutdown = app.shutdown_signal();
    let session_id = guard.id();
    ws.on_failed_upgrade(move |err| {
        log::warn!("[session {}] {}: upgrade failed: {}", session_id, peer, err);
    })
    .on_upgrade(move |socket| run_session(socket, guard, dispatcher, shutdown))
}

async fn run_session(
    mut socket: WebSocket,
    guard: SessionGuard,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    if !guard.transition(SessionPhase::Streaming) {
        return;
    }
    dispatcher.stats().record_session();

    let outcome = loop {
        tokio::select! {
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = dispatcher.handle_text(&text);
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        let _ = dispatcher.handle_text(text);
                    }
                    Err(_) => dispatcher.record_parse_error(&FrameError::NotUtf8, ""),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Err(err)) => break Err(SessionError::Transport(err.to_string())),
            },
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = socket.send(Message::Close(None)).await;
                break Ok(());
            }
        }
    };

    guard.finish(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;
    use crate::health_monitor::HealthMonitor;
    use crate::history::SensorHistory;
    use crate::shared_state::SharedSensorState;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    pub(crate) fn test_server() -> (IngestionServer, watch::Sender<bool>) {
        let config = BufferConfig {
            accel_hz: 8,
            gyro_hz: 8,
            mag_hz: 4,
            window_secs: 1,
            prefill: false,
        };
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(SensorHistory::new(&config)),
            Arc::new(SharedSensorState::new()),
            Arc::new(HealthMonitor::new(Duration::from_secs(2))),
        ));
        let (tx, rx) = watch::channel(false);
        (IngestionServer::new(dispatcher, rx), tx)
    }

    #[tokio::test]
    async fn test_plain_get_on_ws_route_is_not_an_upgrade() {
        let (server, _tx) = test_server();
        let peer = SocketAddr::from(([127, 0, 0, 1], 4000));
        let request = Request::builder()
            .uri("/ws")
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
        assert_eq!(server.slot().phase(), SessionPhase::Listening);
    }

    #[tokio::test]
    async fn test_busy_slot_answers_conflict() {
        let (server, _tx) = test_server();
        let holder = server
            .slot()
            .try_claim(SocketAddr::from(([127, 0, 0, 1], 4001)))
            .unwrap();

        let request = Request::builder()
            .uri("/ws")
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4002))))
            .body(Body::empty())
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert_eq!(server.slot().status().session_id, Some(holder.id()));
        assert_eq!(server.app_state().dispatcher.stats().snapshot().rejected_connections, 1);
    }
}
