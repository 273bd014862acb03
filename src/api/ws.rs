use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

use crate::api::router::AppState;
use crate::error::Error;
use crate::protocol::{Command, Reply, Session};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// Handler for the device endpoint.
// Upgrades the request to a WebSocket and runs a protocol session on it.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    ws.on_upgrade(move |socket| run_session(socket, app, session_id))
}

/// Serves one device connection until it closes.
///
/// Commands are handled strictly in order. Malformed commands are logged and
/// dropped without touching the session.
#[instrument(skip(socket, app))]
async fn run_session(mut socket: WebSocket, app: AppState, session_id: u64) {
    info!("Device connected");
    metrics::counter!("ws_sessions_total").increment(1);
    metrics::gauge!("ws_sessions_active").increment(1.0);

    let mut session = Session::new(app.session_options);

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "WebSocket receive failed");
                break;
            }
        };

        let command = match message {
            Message::Text(text) => Command::from_text(text.as_str()),
            Message::Binary(data) => Command::from_binary(&data),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let command = match command {
            Ok(command) => command,
            Err(e) => {
                drop_command(&e);
                continue;
            }
        };

        let reply = match session.handle(&app.catalog, command) {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Failed to build reply");
                continue;
            }
        };

        if let Err(e) = socket.send(into_message(reply)).await {
            debug!(error = %e, "WebSocket send failed");
            break;
        }
    }

    metrics::gauge!("ws_sessions_active").decrement(1.0);
    info!(state = ?session.state(), "Device disconnected");
}

fn drop_command(error: &Error) {
    let reason = match error {
        Error::FrameLength { .. } => {
            warn!(error = %error, "Ignoring binary command with invalid length");
            "frame_length"
        }
        _ => {
            debug!(error = %error, "Ignoring malformed command");
            "malformed"
        }
    };
    metrics::counter!("ws_commands_dropped_total", "reason" => reason).increment(1);
}

fn into_message(reply: Reply) -> Message {
    match reply {
        Reply::Text(text) => Message::Text(text.into()),
        Reply::Binary(data) => Message::Binary(data),
    }
}
