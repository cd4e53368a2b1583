use anyhow::Context;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{fs::OpenOptions, io, path::Path, sync::{Arc, Mutex}, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mineral_sands::{
    config::AppConfig,
    data::RecordStore,
    state::{Action, AppState, Effect, action_for_key},
    summary::{GeminiClient, SummaryWorker},
    ui,
};

/// The terminal belongs to the dashboard, so logs go to a file.
fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|err| anyhow::anyhow!("installing log subscriber: {err}"))
}

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_default_sources().context("loading configuration")?;
    init_logging(&config.log_file)?;
    info!(
        data_dir = ?config.data_dir,
        model = %config.summary.model,
        api_key_set = config.summary.api_key.is_some(),
        "starting mineral-sands"
    );

    let store = match &config.data_dir {
        Some(dir) => RecordStore::load(dir).with_context(|| format!("loading datasets from {}", dir.display()))?,
        None => RecordStore::builtin().context("loading bundled datasets")?,
    };
    let worker = SummaryWorker::new(Arc::new(
        GeminiClient::from_config(&config.summary).context("building summary client")?,
    ));
    let mut state = AppState::new(store);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut state, &worker);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    info!("exiting");
    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    worker: &SummaryWorker,
) -> anyhow::Result<()> {
    while !state.quit {
        while let Some((id, text)) = worker.try_recv() {
            state.reduce(Action::SummaryArrived { id, text });
        }

        terminal.draw(|f| ui::draw(f, state))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(KeyEvent { code, kind: KeyEventKind::Press, .. }) = event::read()? {
                if let Some(action) = action_for_key(code) {
                    if let Some(Effect::RequestSummary { id, prompt }) = state.reduce(action) {
                        worker.submit(id, prompt);
                    }
                }
            }
        }
    }
    Ok(())
}
