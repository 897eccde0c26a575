//! WebSocket endpoint serving the listener push channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::run_quote_pump;
use crate::error::RealtimeResult;
use crate::types::PushEnvelope;
use cfd_broker::QuoteBus;

/// Realtime server configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub port: u16,
    pub max_connections: usize,
    pub broadcast_capacity: usize,
    /// Asset list advertised in the connect greeting.
    pub assets: Vec<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            max_connections: 256,
            broadcast_capacity: 64,
            assets: Vec::new(),
        }
    }
}

/// Caps concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a connection slot. The slot is held until the returned
    /// guard drops, so the guard must live as long as the connection.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: self.clone(),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    broadcast_tx: broadcast::Sender<String>,
    limiter: Arc<ConnectionLimiter>,
    assets: Vec<String>,
}

impl AppState {
    pub fn new(broadcast_tx: broadcast::Sender<String>, config: &RealtimeConfig) -> Self {
        Self {
            broadcast_tx,
            limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            assets: config.assets.clone(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.limiter.try_acquire() else {
        warn!(
            current = state.limiter.current_count(),
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    info!(
        connections = state.limiter.current_count(),
        "New WebSocket listener"
    );
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

/// Serve one listener: greeting, then forwarded quote updates. Any send
/// failure or client close ends only this connection.
async fn handle_ws_connection(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.broadcast_tx.subscribe();

    let greeting = PushEnvelope::Connection {
        message: "Connected to live price feed".to_string(),
        assets: state.assets.clone(),
    };
    if let Ok(json) = serde_json::to_string(&greeting) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            debug!("Listener disconnected before greeting");
            return;
        }
    }

    // Drain client frames so close and ping are serviced
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Listener sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => match result {
                Ok(msg) => {
                    if sender.send(Message::Text(msg.into())).await.is_err() {
                        debug!("Listener disconnected");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Listener lagged, skipping to latest");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Push channel closed");
                    break;
                }
            },
            _ = &mut incoming_task => {
                debug!("Listener receive side finished, closing");
                break;
            }
        }
    }

    info!(
        connections = state.limiter.current_count().saturating_sub(1),
        "WebSocket listener closed"
    );
}

/// Bind the realtime endpoint and serve until shutdown.
pub async fn run_server(
    quotes: Arc<QuoteBus>,
    config: RealtimeConfig,
    shutdown: CancellationToken,
) -> RealtimeResult<()> {
    let (broadcast_tx, _) = broadcast::channel::<String>(config.broadcast_capacity);
    let state = AppState::new(broadcast_tx.clone(), &config);

    tokio::spawn(run_quote_pump(quotes, broadcast_tx, shutdown.clone()));

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = config.port, "Realtime server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Realtime server stopped");
    Ok(())
}
