//! Bidirectional message channel to the server.
//!
//! The reconciler and session are transport-generic over [`MessageChannel`];
//! [`NativeChannel`] is the provided implementation, running tungstenite on
//! a background thread for non-blocking operation.

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tungstenite::{Message, connect};
use url::Url;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Transport-level events surfaced by `poll_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is open.
    Opened,
    /// The channel closed (remote close, error, or local disconnect).
    Closed,
    /// One inbound text frame, not yet parsed.
    Message(String),
    /// The connection attempt or an in-flight operation failed.
    Error(String),
}

/// A persistent bidirectional text-message channel.
///
/// Implementations must be non-blocking: `send` queues, `poll_events` drains
/// whatever has arrived without waiting.
pub trait MessageChannel {
    fn connect(&mut self, url: &str) -> Result<(), ChannelError>;
    fn disconnect(&mut self);
    fn send(&mut self, text: &str) -> Result<(), ChannelError>;
    fn poll_events(&mut self) -> Vec<ChannelEvent>;
    fn is_open(&self) -> bool;
}

enum Command {
    Send(String),
    Close,
}

/// WebSocket channel for native platforms, serviced by a background thread.
pub struct NativeChannel {
    open: bool,
    cmd_tx: Option<Sender<Command>>,
    event_rx: Option<Receiver<ChannelEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl NativeChannel {
    pub fn new() -> Self {
        Self {
            open: false,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }
}

impl Default for NativeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel for NativeChannel {
    fn connect(&mut self, url: &str) -> Result<(), ChannelError> {
        if self.cmd_tx.is_some() {
            return Err(ChannelError::AlreadyConnected);
        }

        let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let (cmd_tx, cmd_rx) = channel::<Command>();
        let (event_tx, event_rx) = channel::<ChannelEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || {
            log::info!("channel thread: connecting to {url}");
            let (mut socket, response) = match connect(&url) {
                Ok(ok) => ok,
                Err(e) => {
                    log::error!("connection failed: {e}");
                    let _ = event_tx.send(ChannelEvent::Error(format!("connection failed: {e}")));
                    let _ = event_tx.send(ChannelEvent::Closed);
                    return;
                }
            };
            log::info!("channel connected, status: {}", response.status());
            let _ = event_tx.send(ChannelEvent::Opened);

            // Short read timeout so the loop keeps servicing the command
            // queue between inbound frames.
            if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }

            loop {
                match cmd_rx.try_recv() {
                    Ok(Command::Send(text)) => {
                        if let Err(e) = socket.send(Message::Text(text)) {
                            log::error!("channel send error: {e}");
                            break;
                        }
                    }
                    Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                        let _ = socket.close(None);
                        break;
                    }
                    Err(TryRecvError::Empty) => {}
                }

                match socket.read() {
                    Ok(Message::Text(text)) => {
                        let _ = event_tx.send(ChannelEvent::Message(text));
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = socket.send(Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        log::error!("channel read error: {e}");
                        break;
                    }
                }
            }

            log::info!("channel thread exiting");
            let _ = event_tx.send(ChannelEvent::Closed);
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.open = false;
    }

    fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        let tx = self.cmd_tx.as_ref().ok_or(ChannelError::NotConnected)?;
        tx.send(Command::Send(text.to_string()))
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    fn poll_events(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    ChannelEvent::Opened => self.open = true,
                    ChannelEvent::Closed | ChannelEvent::Error(_) => self.open = false,
                    ChannelEvent::Message(_) => {}
                }
                events.push(event);
            }
        }
        // A closed channel cannot be reused; drop the dead thread handles so
        // a later connect() starts fresh.
        if !self.open && events.iter().any(|e| *e == ChannelEvent::Closed) {
            self.cmd_tx = None;
            self.event_rx = None;
            self._thread = None;
        }
        events
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for NativeChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
