//! Connection lifecycle: status tracking, reconnect with backoff, and the
//! periodic latency probe.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sketchroom_core::{ClientMessage, ServerMessage};

use crate::channel::{ChannelEvent, MessageChannel};

/// Reconnection gives up after this many consecutive failures.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Backoff ceiling between attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Latency probe cadence while connected.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// User-visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff before attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// All reconnect attempts exhausted.
    Failed,
}

/// Events surfaced to the application per tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(ConnectionStatus),
    /// A parsed server message, to be fed to the reconciler.
    Message(ServerMessage),
    /// Round-trip latency measured from the last pong.
    Latency(Duration),
}

/// Drives a [`MessageChannel`] through connect/reconnect and parses inbound
/// frames. Poll-based: call [`Session::tick`] once per frame or timer beat.
pub struct Session<C> {
    channel: C,
    url: String,
    status: ConnectionStatus,
    reconnect_attempts: u32,
    next_retry_at: Option<Instant>,
    last_ping_at: Option<Instant>,
    /// Status transitions from outside `tick` (a synchronous connect
    /// failure), surfaced on the next `tick`.
    pending_events: Vec<SessionEvent>,
}

impl<C: MessageChannel> Session<C> {
    pub fn new(channel: C, url: impl Into<String>) -> Self {
        Self {
            channel,
            url: url.into(),
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            next_retry_at: None,
            last_ping_at: None,
            pending_events: Vec::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Open the initial connection.
    pub fn connect(&mut self) {
        self.reconnect_attempts = 0;
        self.next_retry_at = None;
        self.open_channel();
    }

    /// Tear down without reconnecting.
    pub fn disconnect(&mut self) {
        self.channel.disconnect();
        self.status = ConnectionStatus::Disconnected;
        self.next_retry_at = None;
        self.last_ping_at = None;
    }

    /// Best-effort send. Messages while not connected are dropped; the
    /// reconciler stops queuing in that state, so this only covers races
    /// around disconnect.
    pub fn send(&mut self, msg: &ClientMessage) {
        if !self.is_connected() {
            log::debug!("not connected, dropping outbound message");
            return;
        }
        match serde_json::to_string(msg) {
            Ok(json) => {
                if let Err(e) = self.channel.send(&json) {
                    log::warn!("outbound send failed: {e}");
                }
            }
            Err(e) => log::warn!("failed to encode outbound message: {e}"),
        }
    }

    /// Drain transport events, drive reconnect/backoff and the ping timer.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut out = std::mem::take(&mut self.pending_events);

        for event in self.channel.poll_events() {
            match event {
                ChannelEvent::Opened => {
                    self.reconnect_attempts = 0;
                    self.next_retry_at = None;
                    self.last_ping_at = Some(now);
                    self.set_status(ConnectionStatus::Connected, &mut out);
                }
                ChannelEvent::Closed => self.schedule_reconnect(now, &mut out),
                ChannelEvent::Error(message) => {
                    log::warn!("channel error: {message}");
                }
                ChannelEvent::Message(text) => match ServerMessage::from_json(&text) {
                    Ok(msg) => {
                        if let ServerMessage::Pong { client_timestamp, .. } = &msg {
                            let rtt = now_ms().saturating_sub(*client_timestamp);
                            out.push(SessionEvent::Latency(Duration::from_millis(rtt)));
                        }
                        out.push(SessionEvent::Message(msg));
                    }
                    Err(e) => log::warn!("dropping malformed server message: {e}"),
                },
            }
        }

        if let Some(retry_at) = self.next_retry_at {
            if now >= retry_at {
                self.next_retry_at = None;
                self.open_channel();
            }
        }

        if self.is_connected() {
            let due = self
                .last_ping_at
                .is_none_or(|at| now.duration_since(at) >= PING_INTERVAL);
            if due {
                self.last_ping_at = Some(now);
                let ping = ClientMessage::Ping { timestamp: now_ms() };
                if let Ok(json) = serde_json::to_string(&ping) {
                    let _ = self.channel.send(&json);
                }
            }
        }

        // Status changes from this tick's transitions.
        out
    }

    fn open_channel(&mut self) {
        self.status = ConnectionStatus::Connecting;
        if let Err(e) = self.channel.connect(&self.url) {
            log::warn!("connect failed immediately: {e}");
            let mut events = Vec::new();
            self.schedule_reconnect(Instant::now(), &mut events);
            self.pending_events.extend(events);
        }
    }

    fn schedule_reconnect(&mut self, now: Instant, out: &mut Vec<SessionEvent>) {
        if self.status == ConnectionStatus::Disconnected
            || self.status == ConnectionStatus::Failed
        {
            return;
        }
        self.last_ping_at = None;
        if self.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
            self.set_status(ConnectionStatus::Failed, out);
            return;
        }
        self.reconnect_attempts += 1;
        let delay =
            Duration::from_secs(1u64 << self.reconnect_attempts.min(5)).min(MAX_RECONNECT_DELAY);
        self.next_retry_at = Some(now + delay);
        self.set_status(
            ConnectionStatus::Reconnecting { attempt: self.reconnect_attempts },
            out,
        );
        log::info!(
            "reconnect attempt {} in {:?}",
            self.reconnect_attempts,
            delay
        );
    }

    fn set_status(&mut self, status: ConnectionStatus, out: &mut Vec<SessionEvent>) {
        if self.status != status {
            self.status = status;
            out.push(SessionEvent::StatusChanged(status));
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
