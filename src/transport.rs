//! Reconnecting progress-stream connection.
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected`. A close arms a
//! periodic reconnect timer unless one is already armed; a successful open
//! cancels it. Reconnection never gives up.

use futures::StreamExt;
use reqwest::Url;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::model::ProgressEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
}

/// What the transport reports to the UI loop, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
  Connected,
  Disconnected,
  Event(ProgressEvent),
  /// A payload that did not parse as a progress event.
  Malformed(String),
}

/// Periodic timer with at most one pending deadline.
#[derive(Debug, Clone)]
pub struct ReconnectTimer {
  period: Duration,
  next: Option<Instant>,
}

impl ReconnectTimer {
  pub fn new(period: Duration) -> Self {
    Self { period, next: None }
  }

  #[cfg(test)]
  pub fn is_armed(&self) -> bool {
    self.next.is_some()
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.next
  }

  /// Arm the timer. Returns false (and changes nothing) if already armed.
  pub fn schedule(&mut self, now: Instant) -> bool {
    if self.next.is_some() {
      return false;
    }
    self.next = Some(now + self.period);
    true
  }

  pub fn cancel(&mut self) {
    self.next = None;
  }

  /// True at most once per elapsed period. The timer stays armed for the next one.
  pub fn poll(&mut self, now: Instant) -> bool {
    match self.next {
      Some(at) if now >= at => {
        self.next = Some(now + self.period);
        true
      }
      _ => false,
    }
  }
}

/// Owns the stream connection state and its reconnect timer.
#[derive(Debug)]
pub struct TransportManager {
  url: Url,
  state: ConnectionState,
  reconnect: ReconnectTimer,
  attempts: u64,
}

impl TransportManager {
  pub fn new(url: Url, reconnect_period: Duration) -> Self {
    Self { url, state: ConnectionState::Disconnected, reconnect: ReconnectTimer::new(reconnect_period), attempts: 0 }
  }

  #[cfg(test)]
  pub fn state(&self) -> ConnectionState {
    self.state
  }

  #[cfg(test)]
  pub fn reconnect_timer(&self) -> &ReconnectTimer {
    &self.reconnect
  }

  /// Total connection attempts so far.
  #[cfg(test)]
  pub fn attempts(&self) -> u64 {
    self.attempts
  }

  pub fn begin_connect(&mut self) {
    self.state = ConnectionState::Connecting;
    self.attempts += 1;
  }

  pub fn on_open(&mut self) {
    self.state = ConnectionState::Connected;
    self.reconnect.cancel();
  }

  /// Handles both orderly and error closes.
  pub fn on_close(&mut self, now: Instant) {
    self.state = ConnectionState::Disconnected;
    if self.reconnect.schedule(now) {
      debug!(url = %self.url, "transport: reconnect timer armed");
    }
  }

  /// True when the reconnect timer fired and `connect` should run again.
  pub fn poll_reconnect(&mut self, now: Instant) -> bool {
    self.reconnect.poll(now)
  }

  /// Run the connection loop on its own task, forwarding signals to `tx`.
  /// The task ends when the receiver is dropped.
  pub fn spawn(self, tx: mpsc::UnboundedSender<TransportSignal>) -> JoinHandle<()> {
    tokio::spawn(self.run(tx))
  }

  async fn run(mut self, tx: mpsc::UnboundedSender<TransportSignal>) {
    loop {
      if !self.connect_once(&tx).await {
        return;
      }
      // Wait for the next tick of the (single) reconnect timer.
      while let Some(deadline) = self.reconnect.deadline() {
        tokio::time::sleep_until(deadline).await;
        if self.poll_reconnect(Instant::now()) {
          break;
        }
      }
      if tx.is_closed() {
        return;
      }
    }
  }

  /// One connect-and-read cycle. Returns false once the receiver is gone.
  async fn connect_once(&mut self, tx: &mpsc::UnboundedSender<TransportSignal>) -> bool {
    self.begin_connect();
    debug!(url = %self.url, attempt = self.attempts, "transport: connecting");

    let mut stream = match connect_async(self.url.as_str()).await {
      Ok((stream, _)) => stream,
      Err(e) => {
        debug!(err = %e, "transport: connect failed");
        self.on_close(Instant::now());
        return !tx.is_closed();
      }
    };

    self.on_open();
    info!(url = %self.url, "transport: connected");
    if tx.send(TransportSignal::Connected).is_err() {
      return false;
    }

    while let Some(message) = stream.next().await {
      let signal = match message {
        Ok(Message::Text(text)) => match ProgressEvent::parse(text.as_str()) {
          Ok(event) => TransportSignal::Event(event),
          Err(e) => {
            warn!(err = %e, "transport: malformed message");
            TransportSignal::Malformed(e.to_string())
          }
        },
        Ok(Message::Close(_)) => break,
        Ok(_) => continue,
        Err(e) => {
          warn!(err = %e, "transport: read failed");
          break;
        }
      };
      if tx.send(signal).is_err() {
        return false;
      }
    }

    info!("transport: disconnected");
    self.on_close(Instant::now());
    tx.send(TransportSignal::Disconnected).is_ok()
  }
}
