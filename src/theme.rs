use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub success: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "midnight",
    bg: Color::Rgb(22, 24, 33),
    fg: Color::Rgb(205, 214, 244),
    accent: Color::Rgb(137, 180, 250),
    muted: Color::Rgb(108, 112, 134),
    border: Color::Rgb(69, 71, 90),
    highlight_fg: Color::Rgb(22, 24, 33),
    highlight_bg: Color::Rgb(137, 180, 250),
    stripe_bg: Color::Rgb(30, 32, 44),
    status: Color::Rgb(249, 226, 175),
    success: Color::Rgb(166, 227, 161),
    error: Color::Rgb(243, 139, 168),
    key_fg: Color::Rgb(22, 24, 33),
    key_bg: Color::Rgb(108, 112, 134),
  },
  Theme {
    name: "paper",
    bg: Color::Rgb(250, 247, 240),
    fg: Color::Rgb(60, 56, 54),
    accent: Color::Rgb(214, 93, 14),
    muted: Color::Rgb(146, 131, 116),
    border: Color::Rgb(213, 196, 161),
    highlight_fg: Color::Rgb(250, 247, 240),
    highlight_bg: Color::Rgb(214, 93, 14),
    stripe_bg: Color::Rgb(242, 236, 222),
    status: Color::Rgb(181, 118, 20),
    success: Color::Rgb(121, 116, 14),
    error: Color::Rgb(204, 36, 29),
    key_fg: Color::Rgb(250, 247, 240),
    key_bg: Color::Rgb(146, 131, 116),
  },
  Theme {
    name: "terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Cyan,
    muted: Color::DarkGray,
    border: Color::DarkGray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    stripe_bg: Color::Reset,
    status: Color::Yellow,
    success: Color::Green,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::Gray,
  },
];

/// Index of the theme called `name`, falling back to the first one.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name == n)).unwrap_or(0)
}
