//! WebSocket driver for a client engine.
//!
//! The engine never awaits. Outgoing messages go onto an unbounded queue that
//! a writer task drains, and incoming frames arrive on a channel the owner of
//! the engine polls between local events.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::engine::{SendError, Transport};
use crate::protocol::Message;

/// What a UI shows as the connected/disconnected indicator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),
}

enum Outbound {
    Frame(String),
    Close,
}

#[derive(Clone)]
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl WsTransport {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Starts a clean close. Frames queued before this still go out.
    pub fn close(&self) {
        self.status.send_if_modified(|status| {
            let open = *status == ConnectionStatus::Open;
            if open {
                *status = ConnectionStatus::Closing;
            }
            open
        });
        // The writer may still be parked on the queue after the peer hung up.
        let _ = self.outbound.send(Outbound::Close);
    }
}

impl Transport for WsTransport {
    fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    fn send(&self, message: &Message) -> Result<(), SendError> {
        let text = message.encode()?;
        self.outbound
            .send(Outbound::Frame(text))
            .map_err(|_| SendError::Closed)
    }
}

pub struct Connection {
    pub transport: WsTransport,
    /// Incoming frames as text. Binary frames are decoded as UTF-8 first.
    pub incoming: mpsc::UnboundedReceiver<String>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.transport.subscribe()
    }

    /// Flushes queued frames, sends a close frame and waits for the writer.
    pub async fn close(self) {
        self.transport.close();
        let _ = self.writer.await;
        self.reader.abort();
        self.transport.status.send_replace(ConnectionStatus::Closed);
    }
}

pub async fn connect(url: &str) -> Result<Connection, ConnectError> {
    let (status, _) = watch::channel(ConnectionStatus::Connecting);
    let status = Arc::new(status);

    let (stream, _) = connect_async(url).await.inspect_err(|e| {
        warn!(url, error = %e, "WebSocket connection failed");
    })?;
    status.send_replace(ConnectionStatus::Open);
    info!(url, "WebSocket opened");

    let (mut sink, mut source) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let (incoming_tx, incoming) = mpsc::unbounded_channel::<String>();

    let writer_status = status.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                Outbound::Frame(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                        warn!(error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
        writer_status.send_replace(ConnectionStatus::Closed);
    });

    let reader_status = status.clone();
    let reader = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text.as_str().to_owned(),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Dropping binary frame that is not UTF-8");
                        continue;
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    match frame {
                        Some(frame) => info!(
                            code = u16::from(frame.code),
                            reason = frame.reason.as_str(),
                            "WebSocket closed"
                        ),
                        None => info!("WebSocket closed"),
                    }
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
            };
            if incoming_tx.send(text).is_err() {
                debug!("Nobody is listening for incoming frames");
            }
        }
        reader_status.send_replace(ConnectionStatus::Closed);
    });

    Ok(Connection {
        transport: WsTransport {
            outbound: outbound_tx,
            status,
        },
        incoming,
        writer,
        reader,
    })
}
