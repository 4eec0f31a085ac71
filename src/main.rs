mod api;
mod app;
mod browser;
mod config;
mod constants;
mod crypto;
mod input;
mod mode;
mod model;
mod session;
mod settings;
mod snapshot;
mod store;
mod theme;
mod transport;
mod ui;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use ratatui::{
  DefaultTerminal,
  crossterm::{
    event::{self, Event, KeyEventKind},
    terminal::SetTitle,
  },
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use app::App;
use config::Config;
use constants::constants;
use mode::Runtime;
use snapshot::SnapshotSource;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Backend base URL (default: prefs.toml, then http://127.0.0.1:8000)
  #[arg(short, long)]
  server: Option<String>,

  /// Snapshot URL or path used when the backend is unreachable (default: <server>/data.json)
  #[arg(long)]
  snapshot: Option<String>,

  /// Password for a sealed snapshot; prompts in the UI when omitted
  #[arg(short, long)]
  password: Option<String>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Encrypt a plaintext snapshot so the client asks for a password
  Seal {
    /// Plaintext snapshot (JSON)
    #[arg(short, long)]
    input: PathBuf,
    /// Where to write the sealed snapshot
    #[arg(short, long)]
    output: PathBuf,
    /// Password to seal with; read from stdin when omitted
    #[arg(short, long)]
    password: Option<String>,
  },
  /// Print shell completions
  Completions {
    #[arg(value_enum)]
    shell: clap_complete::Shell,
  },
}

// --- Logging ---

/// Log to a file: the terminal belongs to the UI. Keep the guard alive until exit.
fn init_logging() -> Result<WorkerGuard> {
  let dir = config::log_dir();
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "upchk.log"));
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .with_ansi(false)
    .with_writer(writer)
    .init();
  Ok(guard)
}

// --- Seal ---

fn read_password() -> Result<String> {
  eprint!("Password: ");
  std::io::stderr().flush().ok();
  let mut line = String::new();
  std::io::stdin().read_line(&mut line).context("Failed to read password")?;
  Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn seal_file(input: &Path, output: &Path, password: Option<String>) -> Result<()> {
  let plaintext = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
  let doc: serde_json::Value = serde_json::from_slice(&plaintext).context("Input is not valid JSON")?;
  if doc.get("encrypted").and_then(serde_json::Value::as_bool) == Some(true) {
    bail!("{} is already sealed", input.display());
  }
  let password = match password {
    Some(p) => p,
    None => read_password()?,
  };
  if password.is_empty() {
    bail!("Refusing to seal with an empty password");
  }
  let sealed = crypto::seal(&plaintext, &password)?;
  let text = serde_json::to_string_pretty(&sealed)?;
  std::fs::write(output, text).with_context(|| format!("Failed to write {}", output.display()))?;
  info!(input = %input.display(), output = %output.display(), "seal: snapshot sealed");
  println!("Sealed {} -> {}", input.display(), output.display());
  Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _guard = init_logging()?;
  info!(version = env!("CARGO_PKG_VERSION"), "upchk starting");

  match args.command {
    Some(Command::Seal { input, output, password }) => return seal_file(&input, &output, password),
    Some(Command::Completions { shell }) => {
      clap_complete::generate(shell, &mut Args::command(), "upchk", &mut std::io::stdout());
      return Ok(());
    }
    None => {}
  }

  let config = Config::load();
  let server =
    args.server.or_else(|| config.server_url.clone()).unwrap_or_else(|| constants().default_server_url.clone());
  let snapshot = args.snapshot.or_else(|| config.snapshot.clone()).map(|s| SnapshotSource::parse(&s));
  let backend = api::BackendClient::new(&server)?;
  let app = App::new(Runtime::new(backend, snapshot), config, args.password);

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, app).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
  app.start();
  let mut shown_title = String::new();

  loop {
    app.check_pending();
    app.tick(Instant::now());

    let title = app.title();
    if title != shown_title {
      ratatui::crossterm::execute!(std::io::stdout(), SetTitle(&title))?;
      shown_title = title;
    }

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key, Instant::now());
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.shutdown();
  Ok(())
}
