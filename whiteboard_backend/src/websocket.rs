use crate::{
    AppState, handlers,
    relay::{Relay, Session},
};
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::info;

/// Why a connection ended.
enum Disconnect {
    Closed(Option<CloseFrame>),
    Failed(axum::Error),
}

/// The entry point for WebSocket connections on `/ws`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

/// The base path serves both browsers opening a socket and plain health checks.
pub async fn root_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state.relay))
            .into_response(),
        Err(_) => handlers::status_page().await.into_response(),
    }
}

/// The main logic for a single WebSocket connection.
async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let Session { id, mut outbound } = relay.accept().await;
    info!(session = %id, "A user connected");

    // Split the WebSocket into a sender and receiver.
    let (mut sender, mut receiver) = socket.split();

    // Task to forward frames broadcast by other sessions to this client.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sender.send(frame).await {
                return Some(e);
            }
        }
        None
    });
    relay.open(&id).await;

    // Task to handle incoming frames from the client.
    let recv_relay = relay.clone();
    let recv_id = id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Close(frame)) => return Disconnect::Closed(frame),
                Ok(frame @ (Message::Text(_) | Message::Binary(_))) => {
                    // Failures are logged by the relay and never end the session.
                    let _ = recv_relay.on_message(&recv_id, frame).await;
                }
                Ok(_) => {}
                Err(e) => return Disconnect::Failed(e),
            }
        }
        Disconnect::Closed(None)
    });

    // Wait for either task to finish. If one does, the other should be aborted.
    let disconnect = tokio::select! {
        outcome = (&mut recv_task) => {
            send_task.abort();
            outcome.unwrap_or(Disconnect::Closed(None))
        }
        outcome = (&mut send_task) => {
            recv_task.abort();
            match outcome {
                Ok(Some(e)) => Disconnect::Failed(e),
                _ => Disconnect::Closed(None),
            }
        }
    };

    match disconnect {
        Disconnect::Closed(Some(frame)) => {
            info!(session = %id, code = frame.code, reason = frame.reason.as_str(), "User disconnected");
            relay.on_close(&id).await;
        }
        Disconnect::Closed(None) => {
            info!(session = %id, reason = "N/A", "User disconnected");
            relay.on_close(&id).await;
        }
        Disconnect::Failed(e) => {
            relay.on_error(&id, &e).await;
        }
    }
}
