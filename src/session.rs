//! Lifecycle of one check run.
//!
//! `Idle -> Checking -> (Stopping) -> Idle`. The session consumes stream
//! events, mutates the result store and reports user-facing notices. Timers
//! are plain deadlines checked by [`ProgressSession::tick`], so callers drive
//! time explicitly.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::constants;
use crate::model::{ProgressEvent, progress_percent};
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Checking,
  Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
  Normal,
  Success,
  Error,
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  /// Transient message.
  Toast { message: String, kind: ToastKind },
  /// Persistent completion notification for a run that found updates.
  Completed { count: u64 },
}

impl Notice {
  pub fn toast(message: impl Into<String>, kind: ToastKind) -> Self {
    Notice::Toast { message: message.into(), kind }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
  /// How long the bar stays up after a run that found nothing.
  pub done_grace: Duration,
  /// Forced idle after a stop request with no `done`.
  pub stop_fallback: Duration,
  /// How long a static snapshot's "updated at" bar stays up.
  pub snapshot_hide: Duration,
}

impl Default for SessionTimings {
  fn default() -> Self {
    let c = constants();
    Self {
      done_grace: Duration::from_millis(c.done_grace_ms),
      stop_fallback: Duration::from_millis(c.stop_fallback_ms),
      snapshot_hide: Duration::from_millis(c.snapshot_hide_ms),
    }
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("a check is already running")]
  AlreadyChecking,
}

#[derive(Debug)]
pub struct ProgressSession {
  state: SessionState,
  percent: u16,
  label: String,
  progress_visible: bool,
  hide_at: Option<Instant>,
  stop_fallback_at: Option<Instant>,
  timings: SessionTimings,
}

impl Default for ProgressSession {
  fn default() -> Self {
    Self::new(SessionTimings::default())
  }
}

impl ProgressSession {
  pub fn new(timings: SessionTimings) -> Self {
    Self {
      state: SessionState::Idle,
      percent: 0,
      label: String::new(),
      progress_visible: false,
      hide_at: None,
      stop_fallback_at: None,
      timings,
    }
  }

  #[cfg(test)]
  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn is_checking(&self) -> bool {
    self.state != SessionState::Idle
  }

  pub fn can_start(&self) -> bool {
    self.state == SessionState::Idle
  }

  /// The stop control is disabled once a stop has been requested.
  pub fn can_stop(&self) -> bool {
    self.state == SessionState::Checking
  }

  /// Search is locked while a run may still mutate the store.
  pub fn search_enabled(&self) -> bool {
    self.state == SessionState::Idle
  }

  pub fn percent(&self) -> u16 {
    self.percent
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn progress_visible(&self) -> bool {
    self.progress_visible
  }

  fn enter_checking(&mut self) {
    self.state = SessionState::Checking;
    self.percent = 0;
    self.label = "Preparing…".to_string();
    self.progress_visible = true;
    self.hide_at = None;
    self.stop_fallback_at = None;
  }

  fn enter_idle(&mut self) {
    self.state = SessionState::Idle;
    self.stop_fallback_at = None;
  }

  /// User-initiated start. The caller issues the start request afterwards.
  pub fn begin(&mut self) -> Result<(), SessionError> {
    if self.is_checking() {
      return Err(SessionError::AlreadyChecking);
    }
    info!("session: check started");
    self.enter_checking();
    Ok(())
  }

  /// Roll back a start whose request failed.
  pub fn start_failed(&mut self) -> Notice {
    self.enter_idle();
    Notice::toast("Failed to start check, is the server reachable?", ToastKind::Error)
  }

  /// Move to `Stopping` and arm the fallback timer. Returns false when there
  /// is nothing to stop or a stop is already pending.
  pub fn request_stop(&mut self, now: Instant) -> bool {
    if !self.can_stop() {
      return false;
    }
    info!("session: stop requested");
    self.state = SessionState::Stopping;
    self.label = "Stopping…".to_string();
    self.stop_fallback_at = Some(now + self.timings.stop_fallback);
    true
  }

  /// The stop request itself failed: re-enable the stop control.
  pub fn stop_failed(&mut self) -> Notice {
    if self.state == SessionState::Stopping {
      self.state = SessionState::Checking;
    }
    self.stop_fallback_at = None;
    Notice::toast("Failed to request stop", ToastKind::Error)
  }

  /// Apply one stream event. Events keep being applied after a stop request.
  pub fn apply(&mut self, event: ProgressEvent, store: &mut ResultStore, now: Instant) -> Vec<Notice> {
    match event {
      ProgressEvent::Progress { current, total, name, .. } => {
        // The stream can beat the start acknowledgement; a progress event
        // while idle means a run is underway.
        if !self.is_checking() {
          debug!("session: progress while idle, entering checking");
          self.enter_checking();
        }
        self.percent = progress_percent(current, total);
        self.label = format!("Checking: {name}");
        Vec::new()
      }
      ProgressEvent::Item { data } => {
        store.prepend(data);
        Vec::new()
      }
      ProgressEvent::Done { count } => self.finish(count, now),
    }
  }

  fn finish(&mut self, count: u64, now: Instant) -> Vec<Notice> {
    info!(count, "session: check finished");
    self.enter_idle();
    self.percent = 100;
    self.progress_visible = true;
    let finished_at = chrono::Local::now().format("%H:%M:%S");
    self.label = format!("Check complete, {count} updates found ({finished_at})");
    if count == 0 {
      self.hide_at = Some(now + self.timings.done_grace);
      vec![Notice::toast("Check complete, no new updates", ToastKind::Success)]
    } else {
      self.hide_at = None;
      vec![Notice::toast(format!("Found {count} new updates!"), ToastKind::Success), Notice::Completed { count }]
    }
  }

  /// Show a static snapshot's generation time on a full bar, hidden later.
  pub fn show_snapshot_status(&mut self, generated_at: &str, now: Instant) {
    self.percent = 100;
    self.label = format!("Updated: {generated_at}");
    self.progress_visible = true;
    self.hide_at = Some(now + self.timings.snapshot_hide);
  }

  /// Hide the bar and zero it, as after a reset.
  pub fn clear_progress(&mut self) {
    self.progress_visible = false;
    self.percent = 0;
    self.hide_at = None;
  }

  /// Fire any elapsed timers.
  pub fn tick(&mut self, now: Instant) -> Vec<Notice> {
    let mut notices = Vec::new();

    if let Some(at) = self.stop_fallback_at
      && now >= at
    {
      self.stop_fallback_at = None;
      if self.is_checking() {
        info!("session: no done after stop, forcing idle");
        self.enter_idle();
        self.label = "Stopped".to_string();
        notices.push(Notice::toast("Check stopped", ToastKind::Normal));
      }
    }

    if let Some(at) = self.hide_at
      && now >= at
    {
      self.hide_at = None;
      if !self.is_checking() {
        self.progress_visible = false;
      }
    }

    notices
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Bookmark, UpdateItem, Video};

  fn timings() -> SessionTimings {
    SessionTimings {
      done_grace: Duration::from_millis(3000),
      stop_fallback: Duration::from_millis(1000),
      snapshot_hide: Duration::from_millis(5000),
    }
  }

  fn progress(current: u64, total: u64, name: &str) -> ProgressEvent {
    ProgressEvent::Progress { current, total, name: name.to_string(), speed: None }
  }

  fn item(title: &str) -> ProgressEvent {
    ProgressEvent::Item {
      data: UpdateItem {
        video: Video { title: title.to_string(), ..Video::default() },
        bookmark: Bookmark { name: "chan".to_string(), ..Bookmark::default() },
      },
    }
  }

  fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
  }

  #[test]
  fn begin_rejects_overlapping_runs() {
    let mut s = ProgressSession::new(timings());
    assert!(s.begin().is_ok());
    assert_eq!(s.begin(), Err(SessionError::AlreadyChecking));
    assert!(!s.search_enabled());
  }

  #[test]
  fn progress_while_idle_enters_checking() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    s.apply(progress(2, 5, "chanA"), &mut store, Instant::now());
    assert_eq!(s.state(), SessionState::Checking);
    assert_eq!(s.percent(), 40);
    assert_eq!(s.label(), "Checking: chanA");
    assert!(s.progress_visible());
    assert!(!s.search_enabled());
  }

  #[test]
  fn full_progress_is_100() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    s.apply(progress(5, 5, "x"), &mut store, Instant::now());
    assert_eq!(s.percent(), 100);
  }

  #[test]
  fn stream_scenario_orders_and_notifies() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    let now = Instant::now();
    let mut notices = Vec::new();
    for ev in [progress(1, 2, "chanA"), item("X"), progress(2, 2, "chanB"), item("Y"), ProgressEvent::Done { count: 2 }]
    {
      notices.extend(s.apply(ev, &mut store, now));
    }
    let order: Vec<_> = store.records().map(|r| r.item.video.title.clone()).collect();
    assert_eq!(order, ["Y", "X"]);
    assert_eq!(store.visible_count(), 2);
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.percent(), 100);
    assert!(notices.iter().any(|n| matches!(n, Notice::Toast { kind: ToastKind::Success, .. })));
    assert!(notices.contains(&Notice::Completed { count: 2 }));
  }

  #[test]
  fn done_with_results_keeps_bar_visible() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    let now = Instant::now();
    s.begin().unwrap();
    s.apply(ProgressEvent::Done { count: 1 }, &mut store, now);
    s.tick(now + ms(10_000));
    assert!(s.progress_visible());
  }

  #[test]
  fn done_without_results_hides_bar_after_grace() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    let now = Instant::now();
    s.begin().unwrap();
    let notices = s.apply(ProgressEvent::Done { count: 0 }, &mut store, now);
    assert!(!notices.iter().any(|n| matches!(n, Notice::Completed { .. })));
    s.tick(now + ms(2999));
    assert!(s.progress_visible());
    s.tick(now + ms(3000));
    assert!(!s.progress_visible());
  }

  #[test]
  fn new_run_during_grace_keeps_bar() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    let now = Instant::now();
    s.begin().unwrap();
    s.apply(ProgressEvent::Done { count: 0 }, &mut store, now);
    s.begin().unwrap();
    s.tick(now + ms(5000));
    assert!(s.progress_visible());
    assert_eq!(s.state(), SessionState::Checking);
  }

  #[test]
  fn stop_falls_back_to_idle_without_done() {
    let mut s = ProgressSession::new(timings());
    let now = Instant::now();
    s.begin().unwrap();
    assert!(s.request_stop(now));
    assert_eq!(s.state(), SessionState::Stopping);
    assert!(!s.can_stop());
    assert_eq!(s.label(), "Stopping…");
    assert!(s.tick(now + ms(999)).is_empty());
    let notices = s.tick(now + ms(1000));
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.label(), "Stopped");
    assert_eq!(notices.len(), 1);
    assert!(s.search_enabled());
  }

  #[test]
  fn done_before_fallback_wins() {
    let mut s = ProgressSession::new(timings());
    let mut store = ResultStore::new();
    let now = Instant::now();
    s.begin().unwrap();
    s.request_stop(now);
    s.apply(item("late"), &mut store, now + ms(100));
    s.apply(ProgressEvent::Done { count: 1 }, &mut store, now + ms(200));
    assert!(s.tick(now + ms(1000)).is_empty());
    assert!(s.label().starts_with("Check complete"));
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn stop_is_noop_when_idle() {
    let mut s = ProgressSession::new(timings());
    assert!(!s.request_stop(Instant::now()));
  }

  #[test]
  fn failed_start_rolls_back() {
    let mut s = ProgressSession::new(timings());
    s.begin().unwrap();
    let notice = s.start_failed();
    assert!(matches!(notice, Notice::Toast { kind: ToastKind::Error, .. }));
    assert!(s.can_start());
  }

  #[test]
  fn failed_stop_reenables_stop() {
    let mut s = ProgressSession::new(timings());
    let now = Instant::now();
    s.begin().unwrap();
    s.request_stop(now);
    s.stop_failed();
    assert!(s.can_stop());
    s.tick(now + ms(5000));
    assert_eq!(s.state(), SessionState::Checking);
  }

  #[test]
  fn snapshot_status_hides_after_delay() {
    let mut s = ProgressSession::new(timings());
    let now = Instant::now();
    s.show_snapshot_status("2024-01-01", now);
    assert_eq!(s.percent(), 100);
    assert_eq!(s.label(), "Updated: 2024-01-01");
    s.tick(now + ms(4999));
    assert!(s.progress_visible());
    s.tick(now + ms(5000));
    assert!(!s.progress_visible());
  }
}
