//! ConnectionSupervisor processor.
//!
//! The ConnectionSupervisor is responsible for:
//! - Owning the WebSocket of one [`VenueAdapter`]
//! - Driving `Connecting -> Subscribing -> Subscribed` and confirming the
//!   venue handshake within a timeout
//! - Forwarding parsed events onto the venue's bus channel, waiting when
//!   the channel is full
//! - Keeping the stream alive with the venue's heartbeat and treating a
//!   silent stream as dropped
//! - Reconnecting with [`Backoff`] after any failure, until shutdown
//! - Publishing [`ConnectionHealth`] on a watch channel

use crate::adapters::{Frame, Heartbeat, VenueAdapter};
use crate::events::VenueEventSender;
use crate::utils::backoff::{Backoff, FailureKind, INITIAL_BACKOFF, MAX_BACKOFF};
use futures_util::{SinkExt, StreamExt};
use hypertrack_sdk::{ConnectionHealth, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Timing knobs shared by every supervised connection.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Connect plus subscribe confirmation must finish within this.
    pub handshake_timeout: Duration,
    /// Subscribed uptime after which the backoff starts over.
    pub stable_after: Duration,
    /// A subscribed stream silent for this long is treated as dropped.
    pub idle_timeout: Duration,
    pub ping_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            stable_after: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            ping_interval: Duration::from_secs(20),
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection error: {source}")]
    Connection {
        kind: FailureKind,
        #[source]
        source: tungstenite::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("handshake not confirmed in time ({confirmed}/{expected} acks)")]
    HandshakeTimeout { confirmed: usize, expected: usize },

    #[error("connection closed by remote")]
    RemoteClosed,

    #[error("no traffic for {0:?}")]
    Idle(Duration),

    #[error("event bus closed")]
    BusClosed,
}

impl AdapterError {
    fn connection(source: tungstenite::Error) -> Self {
        let kind = classify(&source);
        AdapterError::Connection { kind, source }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AdapterError::Connection { kind, .. } => *kind,
            _ => FailureKind::Generic,
        }
    }
}

/// DNS and unreachable-network failures get the longer backoff.
pub fn classify(error: &tungstenite::Error) -> FailureKind {
    let tungstenite::Error::Io(io) = error else {
        return FailureKind::Generic;
    };
    match io.kind() {
        std::io::ErrorKind::NetworkUnreachable | std::io::ErrorKind::HostUnreachable => {
            FailureKind::Network
        }
        _ => {
            let message = io.to_string().to_ascii_lowercase();
            if message.contains("lookup") || message.contains("resolve") {
                FailureKind::Network
            } else {
                FailureKind::Generic
            }
        }
    }
}

/// Supervises one venue connection for the lifetime of the process.
pub struct ConnectionSupervisor {
    adapter: Arc<dyn VenueAdapter>,
    label: String,
    events_tx: VenueEventSender,
    config: SupervisorConfig,
    backoff: Backoff,
    health_tx: watch::Sender<ConnectionHealth>,
}

/// How a session ended when it did not fail.
enum SessionEnd {
    Shutdown,
}

impl ConnectionSupervisor {
    /// Create a supervisor and the receiver its health is published on.
    pub fn new(
        adapter: Arc<dyn VenueAdapter>,
        events_tx: VenueEventSender,
        config: SupervisorConfig,
    ) -> (Self, watch::Receiver<ConnectionHealth>) {
        let label = adapter.label();
        let (health_tx, health_rx) = watch::channel(ConnectionHealth {
            venue: adapter.venue(),
            label: label.clone(),
            state: ConnectionState::Idle,
            consecutive_failures: 0,
            backoff_secs: config.initial_backoff.as_secs(),
            last_activity: None,
        });
        let backoff = Backoff::new(config.initial_backoff, config.max_backoff);
        (
            Self {
                adapter,
                label,
                events_tx,
                config,
                backoff,
                health_tx,
            },
            health_rx,
        )
    }

    /// Run until the shutdown signal fires or the bus is closed.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let venue = self.adapter.venue();
        info!(%venue, label = %self.label, "ConnectionSupervisor started");

        loop {
            if *shutdown_rx.borrow() {
                info!(%venue, label = %self.label, "ConnectionSupervisor received shutdown signal");
                break;
            }

            let mut subscribed_at = None;
            let error = match self.run_session(&mut shutdown_rx, &mut subscribed_at).await {
                Ok(SessionEnd::Shutdown) => {
                    info!(%venue, label = %self.label, "ConnectionSupervisor received shutdown signal");
                    break;
                }
                Err(AdapterError::BusClosed) => {
                    error!(%venue, label = %self.label, "Event bus closed, stopping connection");
                    break;
                }
                Err(e) => e,
            };

            if subscribed_at.is_some_and(|at: Instant| at.elapsed() >= self.config.stable_after) {
                self.backoff.reset();
            }
            let delay = self.backoff.next_delay(error.failure_kind());
            warn!(
                %venue,
                label = %self.label,
                error = %error,
                delay_secs = delay.as_secs_f64(),
                consecutive_failures = self.backoff.consecutive_failures(),
                "Connection lost, reconnecting"
            );
            self.health_tx.send_modify(|h| {
                h.state = ConnectionState::Reconnecting;
                h.consecutive_failures = self.backoff.consecutive_failures();
                h.backoff_secs = delay.as_secs();
            });

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Closed);
        info!(%venue, label = %self.label, "ConnectionSupervisor shutdown complete");
    }

    async fn run_session(
        &mut self,
        shutdown_rx: &mut watch::Receiver<bool>,
        subscribed_at: &mut Option<Instant>,
    ) -> Result<SessionEnd, AdapterError> {
        let venue = self.adapter.venue();
        self.set_state(ConnectionState::Connecting);
        let deadline = Instant::now() + self.config.handshake_timeout;

        let connect = tokio_tungstenite::connect_async(self.adapter.endpoint().as_str());
        let mut socket = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return Ok(SessionEnd::Shutdown),
            result = tokio::time::timeout_at(deadline, connect) => match result {
                Ok(Ok((socket, _response))) => socket,
                Ok(Err(e)) => return Err(AdapterError::connection(e)),
                Err(_) => return Err(AdapterError::HandshakeTimeout { confirmed: 0, expected: 0 }),
            },
        };
        debug!(%venue, label = %self.label, "Connected");
        self.touch();

        self.set_state(ConnectionState::Subscribing);
        let handshake = self.adapter.handshake();
        let expected = handshake.len();
        for message in handshake {
            socket
                .send(Message::Text(message.into()))
                .await
                .map_err(AdapterError::connection)?;
        }

        let mut confirmed = 0;
        while confirmed < expected {
            let message = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    close(&mut socket).await;
                    return Ok(SessionEnd::Shutdown);
                }
                next = tokio::time::timeout_at(deadline, socket.next()) => match next {
                    Ok(message) => message,
                    Err(_) => return Err(AdapterError::HandshakeTimeout { confirmed, expected }),
                },
            };
            let Some(text) = self.read_text(message)? else {
                continue;
            };
            if self.handle_text(&text).await? {
                confirmed += 1;
            }
        }

        self.set_state(ConnectionState::Subscribed);
        *subscribed_at = Some(Instant::now());
        info!(%venue, label = %self.label, "Subscribed");

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        let mut last_activity = Instant::now();

        loop {
            let idle_deadline = last_activity + self.config.idle_timeout;
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    close(&mut socket).await;
                    return Ok(SessionEnd::Shutdown);
                }

                _ = tokio::time::sleep_until(idle_deadline) => {
                    return Err(AdapterError::Idle(self.config.idle_timeout));
                }

                _ = ping.tick() => {
                    let frame = match self.adapter.heartbeat() {
                        Heartbeat::Ping => Message::Ping(Vec::new().into()),
                        Heartbeat::Text(text) => Message::Text(text.into()),
                    };
                    socket.send(frame).await.map_err(AdapterError::connection)?;
                }

                message = socket.next() => {
                    last_activity = Instant::now();
                    self.touch();
                    if let Some(text) = self.read_text(message)? {
                        // Late acks after the handshake are harmless.
                        self.handle_text(&text).await?;
                    }
                }
            }
        }
    }

    /// Unwrap a socket read into the text payload, if any.
    fn read_text(
        &self,
        message: Option<Result<Message, tungstenite::Error>>,
    ) -> Result<Option<String>, AdapterError> {
        match message {
            None => Err(AdapterError::RemoteClosed),
            Some(Err(e)) => Err(AdapterError::connection(e)),
            Some(Ok(Message::Text(text))) => Ok(Some(text.to_string())),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Ok(Some(text)),
                Err(_) => {
                    warn!(venue = %self.adapter.venue(), "Discarding non-UTF-8 binary frame");
                    Ok(None)
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(venue = %self.adapter.venue(), frame = ?frame, "Close frame received");
                Err(AdapterError::RemoteClosed)
            }
            Some(Ok(_)) => Ok(None),
        }
    }

    /// Parse and dispatch one text frame. Returns `true` for an ack.
    async fn handle_text(&self, text: &str) -> Result<bool, AdapterError> {
        let venue = self.adapter.venue();
        let frame = match self.adapter.parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%venue, label = %self.label, error = %e, "Discarding unparseable frame");
                return Ok(false);
            }
        };
        match frame {
            Frame::Ack => {
                debug!(%venue, label = %self.label, "Subscription confirmed");
                Ok(true)
            }
            Frame::Rejected(reason) => Err(AdapterError::Protocol(reason)),
            Frame::Heartbeat | Frame::Ignored => Ok(false),
            Frame::Events(events) => {
                for event in events {
                    debug!(%venue, kind = event.kind_name(), notional = %event.notional_usd(), "Received event");
                    self.events_tx
                        .send(event)
                        .await
                        .map_err(|_| AdapterError::BusClosed)?;
                }
                Ok(false)
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.health_tx.send_modify(|h| h.state = state);
    }

    fn touch(&self) {
        self.health_tx
            .send_modify(|h| h.last_activity = Some(OffsetDateTime::now_utc()));
    }
}

async fn close(socket: &mut Socket) {
    if let Err(e) = socket.close(None).await {
        debug!(error = %e, "Error closing socket");
    }
}
