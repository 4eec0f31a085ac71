use anyhow::Result;
use ratatui::widgets::ListState;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::api::{CheckStart, OpenMethod};
use crate::browser;
use crate::config::Config;
use crate::constants::constants;
use crate::crypto::{SealedSnapshot, decrypt_snapshot};
use crate::mode::{Mode, Runtime, detect_mode};
use crate::session::{Notice, ProgressSession, ToastKind};
use crate::settings::{SettingsConfig, SettingsForm};
use crate::snapshot::{PlainSnapshot, StaticSnapshot, fetch_snapshot, load_into};
use crate::store::{ResultRecord, ResultStore};
use crate::theme::{THEMES, Theme, theme_index};
use crate::transport::{ConnectionState, TransportSignal};

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
  Results,
  Search,
}

/// Modal prompt for the locked snapshot's password.
#[derive(Debug, Clone, Default)]
pub struct PasswordPrompt {
  pub input: String,
  /// Inline failure shown under the input.
  pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogView {
  /// `None` while loading or when the server has nothing yet.
  pub text: Option<String>,
  pub loading: bool,
  pub scroll: u16,
}

#[derive(Debug, Clone)]
pub enum Overlay {
  Password(PasswordPrompt),
  Settings(SettingsForm),
  Logs(LogView),
  ConfirmReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
  pub message: String,
  pub kind: ToastKind,
  expires_at: Instant,
}

/// In-flight background requests. Each slot holds at most one.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) mode_rx: Option<oneshot::Receiver<Mode>>,
  pub(crate) snapshot_rx: Option<oneshot::Receiver<Result<StaticSnapshot>>>,
  pub(crate) settings_rx: Option<oneshot::Receiver<Result<SettingsConfig>>>,
  pub(crate) start_rx: Option<oneshot::Receiver<Result<CheckStart>>>,
  pub(crate) stop_rx: Option<oneshot::Receiver<Result<()>>>,
  pub(crate) save_rx: Option<oneshot::Receiver<(SettingsConfig, Result<()>)>>,
  pub(crate) logs_rx: Option<oneshot::Receiver<Result<Option<String>>>>,
  pub(crate) open_rx: Option<oneshot::Receiver<(String, Result<OpenMethod>)>>,
}

/// Take a finished task's output. `Some(None)` means the task died without answering.
fn take_ready<T>(slot: &mut Option<oneshot::Receiver<T>>) -> Option<Option<T>> {
  let mut rx = slot.take()?;
  match rx.try_recv() {
    Ok(value) => Some(Some(value)),
    Err(oneshot::error::TryRecvError::Empty) => {
      *slot = Some(rx);
      None
    }
    Err(oneshot::error::TryRecvError::Closed) => Some(None),
  }
}

pub struct App {
  pub runtime: Runtime,
  pub store: ResultStore,
  pub session: ProgressSession,
  pub search: String,
  /// Cursor position within the search input (char index).
  pub search_cursor: usize,
  pub search_scroll: usize,
  pub focus: Focus,
  pub list_state: ListState,
  pub overlay: Option<Overlay>,
  pub toasts: Vec<Toast>,
  /// Persistent "N updates found" banner, cleared by the user.
  pub completed: Option<u64>,
  pub connection: ConnectionState,
  pub theme_index: usize,
  pub should_quit: bool,
  config: Config,
  /// Password given on the command line, tried once before prompting.
  preset_password: Option<String>,
  /// Sealed snapshot still waiting for a password. Survives a dismissed prompt.
  locked: Option<SealedSnapshot>,
  pub(crate) tasks: AsyncTasks,
  transport_rx: Option<mpsc::UnboundedReceiver<TransportSignal>>,
}

impl App {
  pub fn new(runtime: Runtime, config: Config, preset_password: Option<String>) -> Self {
    let theme_index = theme_index(config.theme_name.as_deref());
    Self {
      runtime,
      store: ResultStore::new(),
      session: ProgressSession::default(),
      search: String::new(),
      search_cursor: 0,
      search_scroll: 0,
      focus: Focus::Results,
      list_state: ListState::default(),
      overlay: None,
      toasts: Vec::new(),
      completed: None,
      connection: ConnectionState::Disconnected,
      theme_index,
      should_quit: false,
      config,
      preset_password,
      locked: None,
      tasks: AsyncTasks::default(),
      transport_rx: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    // theme_index is bounded by theme_index() and the modulo in next_theme().
    &THEMES[self.theme_index]
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.config.theme_name = Some(self.theme().name.to_string());
    self.config.save();
  }

  /// Terminal title: `(N) <app name>` with the total record count.
  pub fn title(&self) -> String {
    let name = &constants().app_name;
    match self.store.len() {
      0 => name.clone(),
      n => format!("({n}) {name}"),
    }
  }

  pub fn is_static(&self) -> bool {
    self.runtime.mode() == Some(Mode::Static)
  }

  // --- Notifications ---

  pub fn toast(&mut self, message: impl Into<String>, kind: ToastKind, now: Instant) {
    let message = message.into();
    if kind == ToastKind::Error {
      warn!(msg = %message, "toast");
    }
    self.toasts.push(Toast { message, kind, expires_at: now + constants().toast_lifetime() });
  }

  fn push_notices(&mut self, notices: Vec<Notice>, now: Instant) {
    for notice in notices {
      match notice {
        Notice::Toast { message, kind } => self.toast(message, kind, now),
        Notice::Completed { count } => self.completed = Some(count),
      }
    }
  }

  /// Most recent live toast.
  pub fn current_toast(&self) -> Option<&Toast> {
    self.toasts.last()
  }

  pub fn dismiss_completed(&mut self) {
    self.completed = None;
  }

  /// Fire elapsed timers: session deadlines and toast expiry.
  pub fn tick(&mut self, now: Instant) {
    let notices = self.session.tick(now);
    self.push_notices(notices, now);
    self.toasts.retain(|t| t.expires_at > now);
  }

  // --- Startup ---

  /// Kick off the one-time backend probe.
  pub fn start(&mut self) {
    let client = self.runtime.backend.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(detect_mode(&client, constants().probe_timeout()).await);
    });
    self.tasks.mode_rx = Some(rx);
  }

  pub fn on_mode(&mut self, mode: Mode) {
    if !self.runtime.settle_mode(mode) {
      return;
    }
    match mode {
      Mode::Dynamic => {
        match self.runtime.open_transport() {
          Ok(rx) => {
            self.transport_rx = Some(rx);
            self.connection = ConnectionState::Connecting;
          }
          Err(e) => warn!(err = %format!("{e:#}"), "app: cannot open progress stream"),
        }
        self.trigger_settings_fetch();
      }
      Mode::Static => self.trigger_snapshot_fetch(),
    }
  }

  fn trigger_settings_fetch(&mut self) {
    let client = self.runtime.backend.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(client.get_settings().await);
    });
    self.tasks.settings_rx = Some(rx);
  }

  fn trigger_snapshot_fetch(&mut self) {
    let source = match self.runtime.snapshot_source() {
      Ok(source) => source,
      Err(e) => {
        self.toast(format!("Failed to load data: {e:#}"), ToastKind::Error, Instant::now());
        return;
      }
    };
    info!(source = %source, "app: loading snapshot");
    let http = self.runtime.backend.http().clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(fetch_snapshot(&http, &source).await);
    });
    self.tasks.snapshot_rx = Some(rx);
  }

  pub fn on_snapshot(&mut self, result: Result<StaticSnapshot>, now: Instant) {
    match result {
      Ok(StaticSnapshot::Plain(plain)) => self.load_plain(plain, now),
      Ok(StaticSnapshot::Sealed(sealed)) => {
        self.locked = Some(sealed);
        let input = self.preset_password.take().unwrap_or_default();
        let preset = !input.is_empty();
        self.overlay = Some(Overlay::Password(PasswordPrompt { input, error: None }));
        if preset {
          self.submit_password(now);
        }
      }
      Err(e) => self.toast(format!("Failed to load data: {e:#}"), ToastKind::Error, now),
    }
  }

  fn load_plain(&mut self, plain: PlainSnapshot, now: Instant) {
    let count = load_into(plain, &mut self.store, &mut self.session, now);
    self.clamp_selection();
    if count == 0 {
      self.toast("The published snapshot has no items", ToastKind::Normal, now);
    }
  }

  pub fn is_locked(&self) -> bool {
    self.locked.is_some()
  }

  /// Bring the password prompt back after it was dismissed.
  pub fn reopen_unlock(&mut self) {
    if self.locked.is_some() && self.overlay.is_none() {
      self.overlay = Some(Overlay::Password(PasswordPrompt::default()));
    }
  }

  /// Try the typed password. A rejection clears the input and shows an inline error.
  pub fn submit_password(&mut self, now: Instant) {
    let Some(Overlay::Password(prompt)) = self.overlay.as_mut() else { return };
    let Some(sealed) = self.locked.as_ref() else { return };
    if prompt.input.is_empty() {
      return;
    }
    match decrypt_snapshot(sealed, &prompt.input) {
      Ok(value) => {
        self.overlay = None;
        self.locked = None;
        match PlainSnapshot::from_value(value) {
          Ok(plain) => {
            info!("app: snapshot unlocked");
            self.load_plain(plain, now);
          }
          Err(e) => self.toast(format!("Failed to load data: {e:#}"), ToastKind::Error, now),
        }
      }
      Err(e) => {
        prompt.input.clear();
        prompt.error = Some(format!("Unlock failed: {e}"));
      }
    }
  }

  // --- Transport ---

  pub fn handle_transport(&mut self, signal: TransportSignal, now: Instant) {
    match signal {
      TransportSignal::Connected => self.connection = ConnectionState::Connected,
      TransportSignal::Disconnected => self.connection = ConnectionState::Disconnected,
      TransportSignal::Event(event) => {
        let notices = self.session.apply(event, &mut self.store, now);
        self.push_notices(notices, now);
        self.clamp_selection();
        self.sync_focus();
      }
      TransportSignal::Malformed(_) => self.toast("Received malformed progress data", ToastKind::Error, now),
    }
  }

  /// Leave the search box while a run can still change the result set.
  fn sync_focus(&mut self) {
    if self.focus == Focus::Search && !self.session.search_enabled() {
      self.focus = Focus::Results;
    }
  }

  // --- Check control ---

  pub fn trigger_start(&mut self, now: Instant) {
    if !self.runtime.is_dynamic() {
      self.toast("Checks are unavailable in hosted mode", ToastKind::Normal, now);
      return;
    }
    if self.session.begin().is_err() {
      return;
    }
    self.completed = None;
    self.sync_focus();

    let client = self.runtime.backend.clone();
    let days = self.runtime.settings.update_range_days;
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(client.start_check(days).await);
    });
    self.tasks.start_rx = Some(rx);
  }

  pub fn trigger_stop(&mut self, now: Instant) {
    if !self.session.request_stop(now) {
      return;
    }
    let client = self.runtime.backend.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(client.stop_check().await);
    });
    self.tasks.stop_rx = Some(rx);
  }

  // --- Results ---

  pub fn selected_record(&self) -> Option<&ResultRecord> {
    self.list_state.selected().and_then(|i| self.store.visible_nth(i))
  }

  /// Keep the selection inside the visible range.
  pub fn clamp_selection(&mut self) {
    let count = self.store.visible_count();
    match self.list_state.selected() {
      _ if count == 0 => self.list_state.select(None),
      None => self.list_state.select(Some(0)),
      Some(i) if i >= count => self.list_state.select(Some(count - 1)),
      Some(_) => {}
    }
  }

  pub fn select_next(&mut self) {
    let count = self.store.visible_count();
    if count > 0 {
      let i = self.list_state.selected().map_or(0, |i| (i + 1) % count);
      self.list_state.select(Some(i));
    }
  }

  pub fn select_prev(&mut self) {
    let count = self.store.visible_count();
    if count > 0 {
      let i = self.list_state.selected().map_or(0, |i| if i == 0 { count - 1 } else { i - 1 });
      self.list_state.select(Some(i));
    }
  }

  /// Re-run the filter after the search text changed.
  pub fn apply_search(&mut self) {
    self.store.filter(&self.search);
    self.clamp_selection();
  }

  pub fn begin_search(&mut self, now: Instant) {
    if self.session.search_enabled() {
      self.focus = Focus::Search;
    } else {
      self.toast("Search is disabled while a check is running", ToastKind::Normal, now);
    }
  }

  pub fn trigger_open(&mut self, now: Instant) {
    let Some(record) = self.selected_record() else { return };
    let Some(link) = record.link.clone() else {
      self.toast("This item has no usable link", ToastKind::Error, now);
      return;
    };
    if !self.runtime.is_dynamic() {
      self.open_fallback(&link, now);
      return;
    }
    let client = self.runtime.backend.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = client.open_url(&link).await;
      let _ = tx.send((link, result));
    });
    self.tasks.open_rx = Some(rx);
  }

  fn open_fallback(&mut self, link: &str, now: Instant) {
    if let Err(e) = browser::open_locally(link) {
      self.toast(format!("Failed to open link: {e:#}"), ToastKind::Error, now);
    }
  }

  // --- Reset ---

  pub fn request_reset(&mut self, now: Instant) {
    if !self.session.can_start() {
      self.toast("Reset is disabled while a check is running", ToastKind::Normal, now);
    } else if !self.store.is_empty() {
      self.overlay = Some(Overlay::ConfirmReset);
    }
  }

  pub fn confirm_reset(&mut self, now: Instant) {
    self.overlay = None;
    if !self.session.can_start() {
      return;
    }
    self.store.reset();
    self.session.clear_progress();
    self.list_state.select(None);
    self.completed = None;
    info!("app: results cleared");
    self.toast("Results cleared", ToastKind::Normal, now);
  }

  // --- Settings ---

  pub fn open_settings(&mut self, now: Instant) {
    if !self.runtime.is_dynamic() {
      self.toast("Settings are unavailable in hosted mode", ToastKind::Normal, now);
      return;
    }
    self.overlay = Some(Overlay::Settings(SettingsForm::from_settings(&self.runtime.settings)));
  }

  pub fn save_settings(&mut self, now: Instant) {
    let Some(Overlay::Settings(form)) = self.overlay.as_mut() else { return };
    if form.saving {
      return;
    }
    let settings = match form.to_settings() {
      Ok(settings) => settings,
      Err(e) => {
        self.toast(e.to_string(), ToastKind::Error, now);
        return;
      }
    };
    form.saving = true;
    let client = self.runtime.backend.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = client.save_settings(&settings).await;
      let _ = tx.send((settings, result));
    });
    self.tasks.save_rx = Some(rx);
  }

  // --- Logs ---

  pub fn open_logs(&mut self, now: Instant) {
    if !self.runtime.is_dynamic() {
      self.toast("Logs are unavailable in hosted mode", ToastKind::Normal, now);
      return;
    }
    self.overlay = Some(Overlay::Logs(LogView::default()));
    self.refresh_logs();
  }

  pub fn refresh_logs(&mut self) {
    let Some(Overlay::Logs(view)) = self.overlay.as_mut() else { return };
    view.loading = true;
    let client = self.runtime.backend.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(client.fetch_logs().await);
    });
    self.tasks.logs_rx = Some(rx);
  }

  // --- Polling ---

  /// Drain finished background work and transport signals.
  pub fn check_pending(&mut self) {
    let now = Instant::now();

    if let Some(signals) = self.drain_transport() {
      for signal in signals {
        self.handle_transport(signal, now);
      }
    }

    if let Some(mode) = take_ready(&mut self.tasks.mode_rx) {
      // A probe task that died is as good as a failed probe.
      self.on_mode(mode.unwrap_or(Mode::Static));
    }

    if let Some(result) = take_ready(&mut self.tasks.snapshot_rx) {
      let result = result.unwrap_or_else(|| Err(anyhow::anyhow!("snapshot task failed")));
      self.on_snapshot(result, now);
    }

    if let Some(result) = take_ready(&mut self.tasks.settings_rx) {
      match result {
        Some(Ok(settings)) => {
          info!(?settings, "app: settings loaded");
          self.runtime.settings = settings;
        }
        Some(Err(e)) => self.toast(format!("Failed to load settings: {e:#}"), ToastKind::Error, now),
        None => {}
      }
    }

    if let Some(result) = take_ready(&mut self.tasks.start_rx) {
      match result {
        Some(Ok(CheckStart::Started)) => {}
        Some(Ok(CheckStart::AlreadyRunning)) => self.toast("A check is already running", ToastKind::Normal, now),
        Some(Err(e)) => {
          warn!(err = %format!("{e:#}"), "app: start failed");
          let notice = self.session.start_failed();
          self.push_notices(vec![notice], now);
        }
        None => {
          let notice = self.session.start_failed();
          self.push_notices(vec![notice], now);
        }
      }
    }

    if let Some(result) = take_ready(&mut self.tasks.stop_rx)
      && !matches!(result, Some(Ok(())))
    {
      let notice = self.session.stop_failed();
      self.push_notices(vec![notice], now);
    }

    if let Some(result) = take_ready(&mut self.tasks.save_rx) {
      match result {
        Some((settings, Ok(()))) => {
          self.runtime.settings = settings;
          self.overlay = None;
          self.toast("Settings saved", ToastKind::Success, now);
        }
        Some((_, Err(e))) => {
          if let Some(Overlay::Settings(form)) = self.overlay.as_mut() {
            form.saving = false;
          }
          self.toast(format!("Failed to save settings: {e:#}"), ToastKind::Error, now);
        }
        None => {
          if let Some(Overlay::Settings(form)) = self.overlay.as_mut() {
            form.saving = false;
          }
        }
      }
    }

    if let Some(result) = take_ready(&mut self.tasks.logs_rx) {
      let failed = match &result {
        Some(Err(e)) => Some(format!("Failed to load logs: {e:#}")),
        _ => None,
      };
      if let Some(Overlay::Logs(view)) = self.overlay.as_mut() {
        view.loading = false;
        view.text = result.and_then(|r| r.ok()).flatten();
      }
      if let Some(msg) = failed {
        self.toast(msg, ToastKind::Error, now);
      }
    }

    if let Some(result) = take_ready(&mut self.tasks.open_rx) {
      match result {
        Some((_, Ok(OpenMethod::Custom))) => self.toast("Opened in the configured browser", ToastKind::Success, now),
        Some((_, Ok(OpenMethod::Default))) => self.toast("Opened in the default browser", ToastKind::Success, now),
        Some((link, Err(e))) => {
          info!(err = %format!("{e:#}"), "app: server open failed, opening locally");
          self.open_fallback(&link, now);
        }
        None => {}
      }
    }
  }

  fn drain_transport(&mut self) -> Option<Vec<TransportSignal>> {
    let rx = self.transport_rx.as_mut()?;
    let mut signals = Vec::new();
    while let Ok(signal) = rx.try_recv() {
      signals.push(signal);
    }
    Some(signals)
  }

  pub fn shutdown(&mut self) {
    self.transport_rx = None;
    self.runtime.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::BackendClient;
  use crate::crypto::seal;
  use crate::model::{Bookmark, ProgressEvent, UpdateItem, Video};
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn app_for(server: &str) -> App {
    let runtime = Runtime::new(BackendClient::new(server).unwrap(), None);
    App::new(runtime, Config::default(), None)
  }

  fn offline_app() -> App {
    app_for("http://127.0.0.1:1")
  }

  fn item(title: &str, author: &str) -> ProgressEvent {
    ProgressEvent::Item {
      data: UpdateItem {
        video: Video { title: title.to_string(), video_id: "BV1".to_string(), ..Video::default() },
        bookmark: Bookmark { name: author.to_string(), ..Bookmark::default() },
      },
    }
  }

  fn progress(current: u64, total: u64, name: &str) -> ProgressEvent {
    ProgressEvent::Progress { current, total, name: name.to_string(), speed: None }
  }

  /// Poll until every background slot is empty.
  async fn settle(app: &mut App) {
    for _ in 0..200 {
      app.check_pending();
      let t = &app.tasks;
      if t.mode_rx.is_none()
        && t.snapshot_rx.is_none()
        && t.settings_rx.is_none()
        && t.start_rx.is_none()
        && t.stop_rx.is_none()
        && t.save_rx.is_none()
        && t.logs_rx.is_none()
        && t.open_rx.is_none()
      {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background tasks did not finish");
  }

  #[test]
  fn stream_updates_store_title_and_banner() {
    let mut app = offline_app();
    let now = Instant::now();
    let events = [progress(1, 2, "chanA"), item("X", "a"), progress(2, 2, "chanB"), item("Y", "b")];
    for ev in events.into_iter().chain([ProgressEvent::Done { count: 2 }]) {
      app.handle_transport(TransportSignal::Event(ev), now);
    }
    let order: Vec<_> = app.store.records().map(|r| r.item.video.title.clone()).collect();
    assert_eq!(order, ["Y", "X"]);
    assert_eq!(app.store.visible_count(), 2);
    assert_eq!(app.title(), format!("(2) {}", constants().app_name));
    assert_eq!(app.completed, Some(2));
    assert_eq!(app.current_toast().map(|t| t.kind), Some(ToastKind::Success));
    assert_eq!(app.list_state.selected(), Some(0));
  }

  #[test]
  fn title_is_plain_without_records() {
    assert_eq!(offline_app().title(), constants().app_name);
  }

  #[test]
  fn progress_event_locks_search() {
    let mut app = offline_app();
    let now = Instant::now();
    app.begin_search(now);
    assert_eq!(app.focus, Focus::Search);
    app.handle_transport(TransportSignal::Event(progress(1, 3, "x")), now);
    assert_eq!(app.focus, Focus::Results);
    app.begin_search(now);
    assert_eq!(app.focus, Focus::Results);
    assert!(app.current_toast().is_some());
  }

  #[test]
  fn search_filters_and_clamps_selection() {
    let mut app = offline_app();
    let now = Instant::now();
    app.handle_transport(TransportSignal::Event(item("Foobar", "a")), now);
    app.handle_transport(TransportSignal::Event(item("Baz", "b")), now);
    app.list_state.select(Some(1));
    app.search = "foo".to_string();
    app.apply_search();
    assert_eq!(app.store.visible_count(), 1);
    assert_eq!(app.list_state.selected(), Some(0));
    assert_eq!(app.selected_record().map(|r| r.item.video.title.as_str()), Some("Foobar"));
  }

  #[test]
  fn connection_signals_drive_indicator() {
    let mut app = offline_app();
    let now = Instant::now();
    app.handle_transport(TransportSignal::Connected, now);
    assert_eq!(app.connection, ConnectionState::Connected);
    app.handle_transport(TransportSignal::Disconnected, now);
    assert_eq!(app.connection, ConnectionState::Disconnected);
  }

  #[test]
  fn toasts_expire() {
    let mut app = offline_app();
    let now = Instant::now();
    app.toast("hello", ToastKind::Normal, now);
    app.tick(now + Duration::from_millis(2999));
    assert!(app.current_toast().is_some());
    app.tick(now + Duration::from_millis(3000));
    assert!(app.current_toast().is_none());
  }

  #[test]
  fn completion_banner_persists_until_dismissed() {
    let mut app = offline_app();
    let now = Instant::now();
    app.handle_transport(TransportSignal::Event(ProgressEvent::Done { count: 3 }), now);
    app.tick(now + Duration::from_secs(60));
    assert_eq!(app.completed, Some(3));
    app.dismiss_completed();
    assert_eq!(app.completed, None);
  }

  #[test]
  fn reset_requires_confirmation() {
    let mut app = offline_app();
    let now = Instant::now();
    app.handle_transport(TransportSignal::Event(item("A", "x")), now);
    app.request_reset(now);
    assert!(matches!(app.overlay, Some(Overlay::ConfirmReset)));
    assert_eq!(app.store.len(), 1);
    app.confirm_reset(now);
    assert!(app.store.is_empty());
    assert!(!app.session.progress_visible());
    assert_eq!(app.session.percent(), 0);
    assert_eq!(app.list_state.selected(), None);
  }

  #[test]
  fn reset_of_empty_store_is_noop() {
    let mut app = offline_app();
    app.request_reset(Instant::now());
    assert!(app.overlay.is_none());
  }

  #[test]
  fn reset_is_refused_while_checking() {
    let mut app = offline_app();
    let now = Instant::now();
    let progress = |current| ProgressEvent::Progress { current, total: 4, name: "chan".into(), speed: None };
    app.handle_transport(TransportSignal::Event(progress(1)), now);
    app.handle_transport(TransportSignal::Event(item("A", "x")), now);
    app.request_reset(now);
    assert!(app.overlay.is_none());
    assert_eq!(app.current_toast().map(|t| t.kind), Some(ToastKind::Normal));

    app.overlay = Some(Overlay::ConfirmReset);
    app.confirm_reset(now);
    assert_eq!(app.store.len(), 1);

    app.handle_transport(TransportSignal::Event(progress(2)), now);
    assert!(app.session.progress_visible());
    assert_eq!(app.session.percent(), 50);
  }

  #[test]
  fn wrong_password_clears_input_and_keeps_prompt() {
    let mut app = offline_app();
    let now = Instant::now();
    let doc = json!({"items": [{"video": {"title": "Intro"}, "bookmark": {"name": "Chan"}}]});
    let sealed = seal(&serde_json::to_vec(&doc).unwrap(), "open sesame").unwrap();
    app.on_snapshot(Ok(StaticSnapshot::Sealed(sealed)), now);

    let Some(Overlay::Password(prompt)) = app.overlay.as_mut() else { panic!("expected password prompt") };
    prompt.input = "guess".to_string();
    app.submit_password(now);
    let Some(Overlay::Password(prompt)) = app.overlay.as_mut() else { panic!("prompt should stay open") };
    assert!(prompt.input.is_empty());
    assert!(prompt.error.is_some());
    assert!(app.store.is_empty());

    prompt.input = "open sesame".to_string();
    app.submit_password(now);
    assert!(app.overlay.is_none());
    assert_eq!(app.store.visible_count(), 1);
  }

  #[test]
  fn empty_password_is_not_tried() {
    let mut app = offline_app();
    let sealed = seal(b"{}", "pw").unwrap();
    app.on_snapshot(Ok(StaticSnapshot::Sealed(sealed)), Instant::now());
    app.submit_password(Instant::now());
    let Some(Overlay::Password(prompt)) = &app.overlay else { panic!("prompt should stay open") };
    assert!(prompt.error.is_none());
  }

  #[test]
  fn dismissed_prompt_can_be_reopened() {
    let mut app = offline_app();
    let now = Instant::now();
    let sealed = seal(br#"{"items":[{"video":{"title":"A"},"bookmark":{"name":"b"}}]}"#, "pw").unwrap();
    app.on_snapshot(Ok(StaticSnapshot::Sealed(sealed)), now);
    app.overlay = None;
    assert!(app.is_locked());

    app.reopen_unlock();
    let Some(Overlay::Password(prompt)) = app.overlay.as_mut() else { panic!("expected password prompt") };
    prompt.input = "pw".to_string();
    app.submit_password(now);
    assert!(app.overlay.is_none());
    assert!(!app.is_locked());
    assert_eq!(app.store.len(), 1);

    app.reopen_unlock();
    assert!(app.overlay.is_none());
  }

  #[test]
  fn preset_password_unlocks_without_prompt() {
    let runtime = Runtime::new(BackendClient::new("http://127.0.0.1:1").unwrap(), None);
    let mut app = App::new(runtime, Config::default(), Some("pw".to_string()));
    let sealed = seal(br#"{"items":[{"video":{"title":"A"},"bookmark":{"name":"b"}}]}"#, "pw").unwrap();
    app.on_snapshot(Ok(StaticSnapshot::Sealed(sealed)), Instant::now());
    assert!(app.overlay.is_none());
    assert_eq!(app.store.len(), 1);
  }

  #[test]
  fn snapshot_failure_is_a_toast() {
    let mut app = offline_app();
    app.on_snapshot(Err(anyhow::anyhow!("boom")), Instant::now());
    assert_eq!(app.current_toast().map(|t| t.kind), Some(ToastKind::Error));
  }

  #[test]
  fn static_mode_disables_checks_and_settings() {
    let mut app = offline_app();
    let now = Instant::now();
    assert!(app.runtime.settle_mode(Mode::Static));
    app.trigger_start(now);
    assert!(app.session.can_start());
    app.open_settings(now);
    assert!(app.overlay.is_none());
    app.open_logs(now);
    assert!(app.overlay.is_none());
  }

  #[tokio::test]
  async fn unreachable_backend_loads_static_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/data.json"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "items": [{"video": {"title": "Intro", "video_id": "a"}, "bookmark": {"name": "Chan"}}],
        "metadata": {"generated_at": "2024-01-01"}
      })))
      .mount(&server)
      .await;

    let mut app = app_for(&server.uri());
    app.start();
    settle(&mut app).await;
    assert!(app.is_static());
    assert_eq!(app.store.visible_count(), 1);
    assert_eq!(app.session.percent(), 100);
  }

  #[tokio::test]
  async fn failed_start_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/api/check")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let mut app = app_for(&server.uri());
    assert!(app.runtime.settle_mode(Mode::Dynamic));
    app.trigger_start(Instant::now());
    assert!(!app.session.can_start());
    settle(&mut app).await;
    assert!(app.session.can_start());
    assert_eq!(app.current_toast().map(|t| t.kind), Some(ToastKind::Error));
  }

  #[tokio::test]
  async fn failed_save_keeps_settings_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/settings"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "error", "message": "nope"})))
      .mount(&server)
      .await;

    let mut app = app_for(&server.uri());
    assert!(app.runtime.settle_mode(Mode::Dynamic));
    app.open_settings(Instant::now());
    app.save_settings(Instant::now());
    settle(&mut app).await;
    let Some(Overlay::Settings(form)) = &app.overlay else { panic!("settings overlay should stay open") };
    assert!(!form.saving);
    assert_eq!(app.current_toast().map(|t| t.kind), Some(ToastKind::Error));
  }

  #[tokio::test]
  async fn saved_settings_update_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/settings"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
      .mount(&server)
      .await;

    let mut app = app_for(&server.uri());
    assert!(app.runtime.settle_mode(Mode::Dynamic));
    app.open_settings(Instant::now());
    if let Some(Overlay::Settings(form)) = app.overlay.as_mut() {
      form.range_value = "2".to_string();
      form.unit = crate::settings::RangeUnit::Months;
    }
    app.save_settings(Instant::now());
    settle(&mut app).await;
    assert!(app.overlay.is_none());
    assert_eq!(app.runtime.settings.update_range_days, 60);
  }

  #[tokio::test]
  async fn logs_overlay_shows_placeholder_for_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/logs"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
      .mount(&server)
      .await;

    let mut app = app_for(&server.uri());
    assert!(app.runtime.settle_mode(Mode::Dynamic));
    app.open_logs(Instant::now());
    settle(&mut app).await;
    let Some(Overlay::Logs(view)) = &app.overlay else { panic!("expected logs overlay") };
    assert!(!view.loading);
    assert!(view.text.is_none());
  }

  #[tokio::test]
  async fn server_open_reports_method() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/open"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "method": "default"})))
      .expect(1)
      .mount(&server)
      .await;

    let mut app = app_for(&server.uri());
    assert!(app.runtime.settle_mode(Mode::Dynamic));
    app.handle_transport(TransportSignal::Event(item("A", "x")), Instant::now());
    app.trigger_open(Instant::now());
    settle(&mut app).await;
    assert_eq!(app.current_toast().map(|t| t.message.as_str()), Some("Opened in the default browser"));
  }
}
