use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use quizwire_core::net::messages::ServerEvent;
use quizwire_core::net::protocol::{MAX_EVENT_SIZE, decode_server_event};

use crate::config::ReconnectConfig;

/// Liveness of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Handle to the realtime push channel task.
///
/// The task owns one logical connection to the server's WebSocket endpoint
/// and fans decoded [`ServerEvent`]s out to subscribers. On disconnect it
/// waits the configured fixed delay and reconnects silently: no events are
/// synthesized and nothing missed during the outage is backfilled — state
/// recovery is the session controller's business. Malformed frames are
/// dropped with a diagnostic; they never take the connection down.
pub struct RealtimeChannel {
    events: broadcast::Sender<ServerEvent>,
    conn_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Spawn the connection task. Must be called within a tokio runtime.
    pub fn spawn(url: String, reconnect: ReconnectConfig, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_channel(
            url,
            reconnect,
            events.clone(),
            conn_tx,
            shutdown_rx,
        ));
        Self {
            events,
            conn_rx,
            shutdown_tx,
            task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.conn_rx.clone()
    }

    /// Ask the task to stop. Safe to call more than once.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the task has stopped (shutdown or attempt cap reached).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        self.close();
        let _ = self.task.await;
    }
}

async fn run_channel(
    url: String,
    reconnect: ReconnectConfig,
    events: broadcast::Sender<ServerEvent>,
    conn_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let delay = Duration::from_millis(reconnect.delay_ms);
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let _ = conn_tx.send(ConnectionState::Connecting);

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                attempt = 0;
                let _ = conn_tx.send(ConnectionState::Open);
                tracing::info!(%url, "Channel connected");
                read_until_closed(stream, &events, &mut shutdown_rx).await;
                if *shutdown_rx.borrow() {
                    break;
                }
                tracing::warn!(%url, "Channel disconnected");
            },
            Err(e) => {
                tracing::warn!(%url, error = %e, "Channel connect failed");
            },
        }

        let _ = conn_tx.send(ConnectionState::Closed);
        attempt += 1;
        if let Some(max) = reconnect.max_attempts
            && attempt >= max
        {
            tracing::error!(attempt, "Reconnect attempt cap reached, giving up");
            break;
        }

        // fixed delay per attempt, interruptible by shutdown
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown_rx.changed() => break,
        }
    }

    let _ = conn_tx.send(ConnectionState::Closed);
}

async fn read_until_closed(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    events: &broadcast::Sender<ServerEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            },
            msg = source.next() => {
                let Some(msg) = msg else { break };
                match msg {
                    Ok(Message::Text(text)) => {
                        if text.len() > MAX_EVENT_SIZE {
                            tracing::warn!(size = text.len(), "Oversized event dropped");
                            continue;
                        }
                        match decode_server_event(text.as_str()) {
                            // no subscribers is fine
                            Ok(event) => {
                                let _ = events.send(event);
                            },
                            Err(e) => tracing::warn!(error = %e, "Malformed event dropped"),
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    },
                    Ok(Message::Close(_)) => break,
                    // binary and pong frames are not part of the protocol
                    Ok(_) => {},
                    Err(e) => {
                        tracing::warn!(error = %e, "Channel read error");
                        break;
                    },
                }
            },
        }
    }
}
