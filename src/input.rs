use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::time::Instant;

use crate::app::{App, Focus, Overlay};
use crate::session::ToastKind;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: KeyEvent, now: Instant) {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return;
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.next_theme();
    return;
  }

  match app.overlay {
    Some(Overlay::Password(_)) => handle_password_key(app, key, now),
    Some(Overlay::Settings(_)) => handle_settings_key(app, key, now),
    Some(Overlay::Logs(_)) => handle_logs_key(app, key),
    Some(Overlay::ConfirmReset) => handle_confirm_key(app, key, now),
    None => match app.focus {
      Focus::Results => handle_results_key(app, key, now),
      Focus::Search => handle_search_key(app, key),
    },
  }
}

fn handle_results_key(app: &mut App, key: KeyEvent, now: Instant) {
  match key.code {
    KeyCode::Char('q') => app.should_quit = true,
    KeyCode::Char('c') => app.trigger_start(now),
    KeyCode::Char('s') => app.trigger_stop(now),
    KeyCode::Esc => {
      if app.completed.is_some() {
        app.dismiss_completed();
      } else {
        app.trigger_stop(now);
      }
    }
    KeyCode::Enter | KeyCode::Char('o') => app.trigger_open(now),
    KeyCode::Char('/') => app.begin_search(now),
    KeyCode::Char('r') => app.request_reset(now),
    KeyCode::Char('u') => app.reopen_unlock(),
    KeyCode::Char(',') => app.open_settings(now),
    KeyCode::Char('l') => app.open_logs(now),
    KeyCode::Down | KeyCode::Char('j') => app.select_next(),
    KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
    _ => {}
  }
}

fn handle_search_key(app: &mut App, key: KeyEvent) {
  if !app.session.search_enabled() {
    app.focus = Focus::Results;
    return;
  }
  match key.code {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.search, app.search_cursor);
      app.search.insert(byte_idx, c);
      app.search_cursor += 1;
      app.apply_search();
    }
    KeyCode::Backspace => {
      if app.search_cursor > 0 {
        app.search_cursor -= 1;
        let byte_idx = char_to_byte_index(&app.search, app.search_cursor);
        app.search.remove(byte_idx);
        app.apply_search();
      }
    }
    KeyCode::Delete => {
      if app.search_cursor < app.search.chars().count() {
        let byte_idx = char_to_byte_index(&app.search, app.search_cursor);
        app.search.remove(byte_idx);
        app.apply_search();
      }
    }
    KeyCode::Left => {
      app.search_cursor = app.search_cursor.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.search_cursor < app.search.chars().count() {
        app.search_cursor += 1;
      }
    }
    KeyCode::Home => {
      app.search_cursor = 0;
    }
    KeyCode::End => {
      app.search_cursor = app.search.chars().count();
    }
    KeyCode::Enter | KeyCode::Down => {
      app.focus = Focus::Results;
    }
    KeyCode::Esc => {
      app.search.clear();
      app.search_cursor = 0;
      app.search_scroll = 0;
      app.apply_search();
      app.focus = Focus::Results;
    }
    _ => {}
  }
}

fn handle_password_key(app: &mut App, key: KeyEvent, now: Instant) {
  match key.code {
    KeyCode::Enter => app.submit_password(now),
    KeyCode::Esc => {
      app.overlay = None;
      app.toast("The snapshot stays locked. Press u to unlock", ToastKind::Normal, now);
    }
    KeyCode::Backspace => {
      if let Some(Overlay::Password(prompt)) = app.overlay.as_mut() {
        prompt.input.pop();
      }
    }
    KeyCode::Char(c) => {
      if let Some(Overlay::Password(prompt)) = app.overlay.as_mut() {
        prompt.input.push(c);
        prompt.error = None;
      }
    }
    _ => {}
  }
}

fn handle_settings_key(app: &mut App, key: KeyEvent, now: Instant) {
  if key.code == KeyCode::Enter {
    app.save_settings(now);
    return;
  }
  let Some(Overlay::Settings(form)) = app.overlay.as_mut() else { return };
  if form.saving {
    return;
  }
  match key.code {
    KeyCode::Esc => app.overlay = None,
    KeyCode::Tab | KeyCode::Down => form.focus = form.focus.next(),
    KeyCode::BackTab | KeyCode::Up => form.focus = form.focus.prev(),
    KeyCode::Left | KeyCode::Right => form.toggle(),
    KeyCode::Backspace => form.backspace(),
    KeyCode::Char(' ') if !form.focus_is_text() => form.toggle(),
    KeyCode::Char(c) => form.insert_char(c),
    _ => {}
  }
}

fn handle_logs_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Esc | KeyCode::Char('q') => app.overlay = None,
    KeyCode::Char('r') => app.refresh_logs(),
    KeyCode::Down | KeyCode::Char('j') => {
      if let Some(Overlay::Logs(view)) = app.overlay.as_mut() {
        view.scroll = view.scroll.saturating_add(1);
      }
    }
    KeyCode::Up | KeyCode::Char('k') => {
      if let Some(Overlay::Logs(view)) = app.overlay.as_mut() {
        view.scroll = view.scroll.saturating_sub(1);
      }
    }
    _ => {}
  }
}

fn handle_confirm_key(app: &mut App, key: KeyEvent, now: Instant) {
  match key.code {
    KeyCode::Char('y') | KeyCode::Enter => app.confirm_reset(now),
    KeyCode::Char('n') | KeyCode::Esc => app.overlay = None,
    _ => {}
  }
}
