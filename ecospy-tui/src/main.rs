//! Terminal kiosk for EcoSpy: capture items, look up the customer, and credit EcoPoints.

mod app;
mod backend;
mod config;
mod input;
mod ui;

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ecospy_core::service::KioskService;
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::input::Action;

const DEFAULT_LOG_FILTER: &str = "ecospy=info";

#[derive(Parser, Debug)]
#[command(name = "ecospy-tui")]
#[command(about = "Recycling kiosk that credits EcoPoints for detected items")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ECOSPY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run against an in-memory store and a scripted camera
    #[arg(long)]
    demo: bool,

    /// File that receives the log output
    #[arg(long, env = "ECOSPY_LOG_FILE", default_value = "ecospy.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let config = if args.demo && !args.config.exists() {
        AppConfig::demo()?
    } else {
        AppConfig::load(&args.config)?
    };

    // HTTP + service setup
    let kiosk_backend = if args.demo {
        backend::demo()
    } else {
        let client = Client::builder().user_agent("ecospy/0.1").build()?;
        backend::live(&config, &client)?
    };
    let service = KioskService::new(kiosk_backend, &config.kiosk)
        .context("preparing the capture directory")?;
    info!(demo = args.demo, config = %args.config.display(), "kiosk starting");

    // App state
    let app = App::new(service, &config.kiosk);

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    info!("kiosk stopped");
    res
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging(path: &Path) -> Result<()> {
    let log_file =
        File::create(path).with_context(|| format!("creating log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env("ECOSPY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        app.tick(Instant::now());

        // Draw current UI
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low and timers ticking)
        if event::poll(Duration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let action = input::handle_key_event(key, &mut app);

            match action {
                Action::Quit => break,
                Action::None => {}
                blocking if App::is_blocking(blocking) => {
                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    app.dispatch(blocking).await;
                    app.is_loading = false;
                }
                other => app.dispatch(other).await,
            }
        }
    }

    Ok(())
}
