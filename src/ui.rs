use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Flex, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, Gauge, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, Focus, LogView, Overlay, PasswordPrompt};
use crate::constants::constants;
use crate::mode::Mode;
use crate::session::ToastKind;
use crate::settings::{SettingsField, SettingsForm};
use crate::theme::Theme;
use crate::transport::ConnectionState;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn rounded_block<'a>(theme: &Theme) -> Block<'a> {
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border))
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
  let [area] = Layout::horizontal([Constraint::Length(width)]).flex(Flex::Center).areas(area);
  let [area] = Layout::vertical([Constraint::Length(height)]).flex(Flex::Center).areas(area);
  area
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let progress_h = if app.session.progress_visible() { 2 } else { 0 };
  let banner_h = u16::from(app.is_static() || app.completed.is_some());
  let [header_area, progress_area, banner_area, search_area, main_area, status_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(progress_h),
    Constraint::Length(banner_h),
    Constraint::Length(3),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  if progress_h > 0 {
    render_progress(frame, app, progress_area);
  }
  if banner_h > 0 {
    render_banner(frame, app, banner_area);
  }
  render_search(frame, app, search_area);
  render_results(frame, app, main_area);
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);

  match &app.overlay {
    Some(Overlay::Password(prompt)) => render_password(frame, theme, prompt),
    Some(Overlay::Settings(form)) => render_settings(frame, theme, form),
    Some(Overlay::Logs(view)) => render_logs(frame, theme, view),
    Some(Overlay::ConfirmReset) => render_confirm(frame, theme, app.store.len()),
    None => {}
  }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let left = Line::from(vec![
    Span::styled(
      format!(" ● {} ", constants().app_name),
      Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
    ),
    Span::styled(format!("v{}", env!("CARGO_PKG_VERSION")), Style::default().fg(theme.muted)),
  ]);
  frame.render_widget(left, area);

  let (label, color) = match (app.runtime.mode(), app.connection) {
    (None, _) => ("probing…".to_string(), theme.muted),
    (Some(Mode::Static), _) => (Mode::Static.label().to_string(), theme.muted),
    (Some(Mode::Dynamic), ConnectionState::Connected) => ("● connected".to_string(), theme.success),
    (Some(Mode::Dynamic), ConnectionState::Connecting) => ("○ connecting…".to_string(), theme.status),
    (Some(Mode::Dynamic), ConnectionState::Disconnected) => ("○ disconnected".to_string(), theme.error),
  };
  let label = format!("{label} ");
  let width = display_width(&label, label.chars().count()) as u16;
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width, ..area };
  frame.render_widget(Line::from(Span::styled(label, Style::default().fg(color))), right_area);
}

fn render_progress(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let [label_area, gauge_area] = Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(area);
  let label = Line::from(Span::styled(format!(" {}", app.session.label()), Style::default().fg(theme.fg)));
  frame.render_widget(label, label_area);

  let gauge = Gauge::default()
    .gauge_style(Style::default().fg(theme.accent).bg(theme.stripe_bg))
    .percent(app.session.percent())
    .label(format!("{}%", app.session.percent()));
  frame.render_widget(gauge, gauge_area);
}

fn render_banner(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let line = if let Some(count) = app.completed {
    Line::from(Span::styled(
      format!(" ✔ Found {count} new updates. Esc to dismiss"),
      Style::default().fg(theme.success).add_modifier(Modifier::BOLD),
    ))
  } else {
    Line::from(Span::styled(
      " Hosted mode: showing a scheduled snapshot. Checks run on the server.",
      Style::default().fg(theme.status),
    ))
  };
  frame.render_widget(line, area);
}

fn render_search(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let enabled = app.session.search_enabled();
  let active = app.focus == Focus::Search && app.overlay.is_none();
  let border_color = if active { theme.accent } else { theme.border };
  let title = if enabled { " Search titles and authors " } else { " Search (locked while checking) " };
  let block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.search, app.search_cursor);

  if cursor_col < app.search_scroll {
    app.search_scroll = cursor_col;
  } else if cursor_col >= app.search_scroll + inner_w {
    app.search_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .search
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.search_scroll)
    .take_while(|(start, _, _)| *start < app.search_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let fg = if enabled { theme.fg } else { theme.muted };
  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(fg)).block(block), area);

  if active {
    let cursor_x = area.x + 2 + (cursor_col - app.search_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let title = Line::from(vec![
    Span::styled(" Updates ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!(" {} ", app.store.visible_count()), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
    Span::raw(" "),
  ]);
  let block = rounded_block(theme).title(title);

  if app.store.is_empty() {
    let hint = if app.is_static() { "The snapshot has no updates." } else { "No updates yet. Press c to check." };
    let text = vec![Line::from(""), Line::from(Span::styled(hint, Style::default().fg(theme.muted)))];
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center).block(block), area);
    return;
  }

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;
  let selected = app.list_state.selected();

  let items: Vec<ListItem> = app
    .store
    .visible()
    .enumerate()
    .map(|(i, record)| {
      let is_selected = Some(i) == selected;
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let video = &record.item.video;
      let right = if video.relative_time.is_empty() {
        record.item.bookmark.name.clone()
      } else {
        format!("{}  {}", record.item.bookmark.name, video.relative_time)
      };
      let right_w = right.chars().count();
      let title_max = inner_w.saturating_sub(right_w + 2);
      let title = truncate_str(&video.title, title_max);
      let gap = inner_w.saturating_sub(title.chars().count() + right_w);

      let line = Line::from(vec![
        Span::styled(title, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, Style::default().fg(if is_selected { fg } else { theme.muted })),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(toast) = app.current_toast() {
    match toast.kind {
      ToastKind::Error => (format!(" ⚠  {}", toast.message), Style::default().fg(theme.error)),
      ToastKind::Success => (format!(" ✔ {}", toast.message), Style::default().fg(theme.success)),
      ToastKind::Normal => (format!(" {}", toast.message), Style::default().fg(theme.status)),
    }
  } else if let Some(link) = app.selected_record().and_then(|r| r.link.as_deref()) {
    (format!(" {}", truncate_str(link, area.width.saturating_sub(2) as usize)), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys: Vec<(&str, &str)> = match (&app.overlay, app.focus) {
    (Some(Overlay::Password(_)), _) => vec![("Enter", "Unlock"), ("Esc", "Cancel")],
    (Some(Overlay::Settings(_)), _) => {
      vec![("Tab", "Field"), ("Space", "Toggle"), ("Enter", "Save"), ("Esc", "Cancel")]
    }
    (Some(Overlay::Logs(_)), _) => vec![("j/k", "Scroll"), ("r", "Refresh"), ("Esc", "Close")],
    (Some(Overlay::ConfirmReset), _) => vec![("y", "Clear"), ("n", "Keep")],
    (None, Focus::Search) => vec![("Enter", "Done"), ("Esc", "Clear")],
    (None, Focus::Results) => {
      let mut k = vec![("Enter", "Open"), ("j/k", "Navigate"), ("/", "Search")];
      if app.runtime.mode() == Some(Mode::Dynamic) {
        if app.session.can_start() {
          k.push(("c", "Check"));
        }
        if app.session.can_stop() {
          k.push(("s", "Stop"));
        }
        k.push((",", "Settings"));
        k.push(("l", "Logs"));
      }
      if app.is_locked() {
        k.push(("u", "Unlock"));
      }
      if app.session.can_start() {
        k.push(("r", "Reset"));
      }
      k.push(("^t", "Theme"));
      k.push(("q", "Quit"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

// --- Overlays ---

fn render_password(frame: &mut Frame, theme: &Theme, prompt: &PasswordPrompt) {
  let area = centered(frame.area(), 50, 7);
  frame.render_widget(Clear, area);
  let masked = "•".repeat(prompt.input.chars().count());
  let mut lines = vec![
    Line::from(Span::styled("This snapshot is password protected.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(vec![
      Span::styled("Password  ", Style::default().fg(theme.muted)),
      Span::styled(masked, Style::default().fg(theme.fg)),
    ]),
  ];
  if let Some(err) = &prompt.error {
    lines.push(Line::from(Span::styled(err.as_str(), Style::default().fg(theme.error))));
  }
  let block = rounded_block(theme)
    .title(" Locked ")
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));
  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_settings(frame: &mut Frame, theme: &Theme, form: &SettingsForm) {
  let area = centered(frame.area(), 56, 10);
  frame.render_widget(Clear, area);

  let row = |field: SettingsField, label: &'static str, value: String| {
    let focused = form.focus == field;
    let style = if focused {
      Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg)
    } else {
      Style::default().fg(theme.fg)
    };
    Line::from(vec![Span::styled(format!("{label:<16}"), Style::default().fg(theme.muted)), Span::styled(value, style)])
  };

  let path = if form.browser_path.is_empty() { "(system default)".to_string() } else { form.browser_path.clone() };
  let mut lines = vec![
    row(SettingsField::Range, "Update range", format!(" {} ", form.range_value)),
    row(SettingsField::Unit, "Range unit", format!(" ‹ {} › ", form.unit.label())),
    row(SettingsField::Interval, "Interval (h)", format!(" {} ", form.interval_hours)),
    row(SettingsField::AutoCheck, "Auto check", format!(" [{}] ", if form.auto_check { "x" } else { " " })),
    row(SettingsField::BrowserPath, "Browser", format!(" {path} ")),
  ];
  if form.saving {
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Saving…", Style::default().fg(theme.status))));
  }

  let block = rounded_block(theme)
    .title(" Settings ")
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .padding(Padding::uniform(1))
    .style(Style::default().bg(theme.bg));
  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_logs(frame: &mut Frame, theme: &Theme, view: &LogView) {
  let outer = frame.area();
  let area = centered(outer, outer.width.saturating_sub(8), outer.height.saturating_sub(4));
  frame.render_widget(Clear, area);

  let block = rounded_block(theme)
    .title(" Run log ")
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));

  let paragraph = match (&view.text, view.loading) {
    (_, true) => Paragraph::new(Span::styled("Loading…", Style::default().fg(theme.status))),
    (Some(text), false) => {
      Paragraph::new(text.as_str()).style(Style::default().fg(theme.fg)).wrap(Wrap { trim: false })
    }
    (None, false) => Paragraph::new(Span::styled("No logs yet.", Style::default().fg(theme.muted))),
  };
  frame.render_widget(paragraph.scroll((view.scroll, 0)).block(block), area);
}

fn render_confirm(frame: &mut Frame, theme: &Theme, count: usize) {
  let area = centered(frame.area(), 44, 5);
  frame.render_widget(Clear, area);
  let lines = vec![
    Line::from(Span::styled(format!("Clear all {count} results?"), Style::default().fg(theme.fg))),
    Line::from(Span::styled("y to clear, n to keep", Style::default().fg(theme.muted))),
  ];
  let block = rounded_block(theme)
    .title(" Reset ")
    .title_style(Style::default().fg(theme.error).add_modifier(Modifier::BOLD))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));
  frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center).block(block), area);
}
