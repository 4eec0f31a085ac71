use serde::{Deserialize, Serialize};

/// Server-side check settings. The client keeps a cached copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsConfig {
  pub update_range_days: u32,
  /// Seconds between automatic checks.
  pub check_interval: u64,
  pub auto_check: bool,
  pub browser_path: Option<String>,
}

impl Default for SettingsConfig {
  fn default() -> Self {
    Self { update_range_days: 7, check_interval: 3600, auto_check: false, browser_path: None }
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
  #[error("{field} must be a positive whole number")]
  NotPositive { field: &'static str },
}

/// Unit the update range is edited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUnit {
  Days,
  Months,
  Years,
}

impl RangeUnit {
  pub const ALL: [RangeUnit; 3] = [RangeUnit::Days, RangeUnit::Months, RangeUnit::Years];

  pub fn days(self) -> u32 {
    match self {
      RangeUnit::Days => 1,
      RangeUnit::Months => 30,
      RangeUnit::Years => 365,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      RangeUnit::Days => "days",
      RangeUnit::Months => "months",
      RangeUnit::Years => "years",
    }
  }

  /// Largest unit that divides `days` evenly.
  pub fn for_days(days: u32) -> Self {
    if days != 0 && days % 365 == 0 {
      RangeUnit::Years
    } else if days != 0 && days % 30 == 0 {
      RangeUnit::Months
    } else {
      RangeUnit::Days
    }
  }

  pub fn next(self) -> Self {
    let idx = Self::ALL.iter().position(|u| *u == self).unwrap_or(0);
    Self::ALL[(idx + 1) % Self::ALL.len()]
  }
}

/// Interval in whole hours for display, never below one.
pub fn interval_hours(secs: u64) -> u64 {
  ((secs as f64 / 3600.0).round() as u64).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
  Range,
  Unit,
  Interval,
  AutoCheck,
  BrowserPath,
}

impl SettingsField {
  const ORDER: [SettingsField; 5] = [
    SettingsField::Range,
    SettingsField::Unit,
    SettingsField::Interval,
    SettingsField::AutoCheck,
    SettingsField::BrowserPath,
  ];

  pub fn next(self) -> Self {
    let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
    Self::ORDER[(idx + 1) % Self::ORDER.len()]
  }

  pub fn prev(self) -> Self {
    let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
    Self::ORDER[(idx + Self::ORDER.len() - 1) % Self::ORDER.len()]
  }

  fn is_text(self) -> bool {
    matches!(self, SettingsField::Range | SettingsField::Interval | SettingsField::BrowserPath)
  }
}

/// Editable form backing the settings overlay.
#[derive(Debug, Clone)]
pub struct SettingsForm {
  pub range_value: String,
  pub unit: RangeUnit,
  pub interval_hours: String,
  pub auto_check: bool,
  pub browser_path: String,
  pub focus: SettingsField,
  pub saving: bool,
}

impl SettingsForm {
  pub fn from_settings(settings: &SettingsConfig) -> Self {
    let unit = RangeUnit::for_days(settings.update_range_days);
    Self {
      range_value: (settings.update_range_days / unit.days()).to_string(),
      unit,
      interval_hours: interval_hours(settings.check_interval).to_string(),
      auto_check: settings.auto_check,
      browser_path: settings.browser_path.clone().unwrap_or_default(),
      focus: SettingsField::Range,
      saving: false,
    }
  }

  pub fn to_settings(&self) -> Result<SettingsConfig, SettingsError> {
    let range = parse_positive(&self.range_value, "Update range")?;
    let hours = parse_positive(&self.interval_hours, "Check interval")?;
    let path = self.browser_path.trim();
    Ok(SettingsConfig {
      update_range_days: (range as u32).saturating_mul(self.unit.days()),
      check_interval: hours.saturating_mul(3600),
      auto_check: self.auto_check,
      browser_path: if path.is_empty() { None } else { Some(path.to_string()) },
    })
  }

  fn focused_text(&mut self) -> Option<&mut String> {
    match self.focus {
      SettingsField::Range => Some(&mut self.range_value),
      SettingsField::Interval => Some(&mut self.interval_hours),
      SettingsField::BrowserPath => Some(&mut self.browser_path),
      SettingsField::Unit | SettingsField::AutoCheck => None,
    }
  }

  /// Type a character into the focused text field. Numeric fields take digits only.
  pub fn insert_char(&mut self, c: char) {
    let numeric = matches!(self.focus, SettingsField::Range | SettingsField::Interval);
    if numeric && !c.is_ascii_digit() {
      return;
    }
    if let Some(text) = self.focused_text() {
      text.push(c);
    }
  }

  pub fn backspace(&mut self) {
    if let Some(text) = self.focused_text() {
      text.pop();
    }
  }

  /// Space/Enter on a non-text field.
  pub fn toggle(&mut self) {
    match self.focus {
      SettingsField::Unit => self.unit = self.unit.next(),
      SettingsField::AutoCheck => self.auto_check = !self.auto_check,
      _ => {}
    }
  }

  pub fn focus_is_text(&self) -> bool {
    self.focus.is_text()
  }
}

fn parse_positive(text: &str, field: &'static str) -> Result<u64, SettingsError> {
  match text.trim().parse::<u64>() {
    Ok(v) if v > 0 && v <= u32::MAX as u64 => Ok(v),
    _ => Err(SettingsError::NotPositive { field }),
  }
}
