use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};

use keystroke_quest::{
    app::App,
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    history::History,
    leaderboard::{LeaderboardStore, MemoryLeaderboard, SqliteLeaderboard},
    logging,
    runtime::{CrosstermEventSource, Runner, ThreadTickScheduler, REDRAW_RATE_MS},
    session::SessionDuration,
    snippet::{FixedSnippet, RandomSnippets, SnippetProvider},
};

/// code typing test with live wpm/accuracy and a persistent leaderboard
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "kquest",
    version,
    about,
    long_about = "Type a code snippet against the clock. Accuracy and WPM update as you type; when time runs out you can save your score to the leaderboard."
)]
pub struct Cli {
    /// test length in seconds: 60, 120, 180 or 300
    #[clap(short = 'd', long, value_parser = parse_duration)]
    duration: Option<SessionDuration>,

    /// custom snippet to type instead of the built-in set
    #[clap(short = 'p', long)]
    prompt: Option<String>,

    /// directory of snippet files to pick from
    #[clap(long, conflicts_with = "prompt")]
    snippet_dir: Option<PathBuf>,

    /// username used when saving scores
    #[clap(short = 'u', long)]
    username: Option<String>,

    /// leaderboard database file
    #[clap(long)]
    db: Option<PathBuf>,

    /// keep the leaderboard in memory for this run only
    #[clap(long, conflicts_with = "db")]
    memory: bool,

    /// print the leaderboard and exit
    #[clap(long)]
    leaderboard: bool,

    /// print past sessions and exit
    #[clap(long, conflicts_with = "leaderboard")]
    history: bool,

    /// session history csv file
    #[clap(long)]
    history_file: Option<PathBuf>,

    /// config file
    #[clap(long)]
    config: Option<PathBuf>,

    /// log file (filter with KQUEST_LOG)
    #[clap(long)]
    log_file: Option<PathBuf>,
}

fn parse_duration(s: &str) -> Result<SessionDuration, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a number of seconds"))?;
    SessionDuration::try_from(secs).map_err(|e| e.to_string())
}

impl Cli {
    /// Config file values with command line overrides applied.
    fn apply_to(&self, mut config: Config) -> Config {
        if let Some(d) = self.duration {
            config.duration = d;
        }
        if let Some(name) = &self.username {
            config.username = Some(name.clone());
        }
        if let Some(dir) = &self.snippet_dir {
            config.snippet_dir = Some(dir.clone());
        }
        config
    }

    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }

    fn history(&self) -> Option<History> {
        self.history_file
            .clone()
            .or_else(AppDirs::history_path)
            .map(History::new)
    }

    fn open_store(&self) -> keystroke_quest::Result<Box<dyn LeaderboardStore>> {
        if self.memory {
            return Ok(Box::new(MemoryLeaderboard::new()));
        }
        let path = self
            .db
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("keystroke_quest.db"));
        Ok(Box::new(SqliteLeaderboard::open(path)?))
    }

    fn snippets(&self, config: &Config) -> keystroke_quest::Result<Box<dyn SnippetProvider>> {
        if let Some(prompt) = &self.prompt {
            return Ok(Box::new(FixedSnippet::new(prompt)));
        }
        match &config.snippet_dir {
            Some(dir) => Ok(Box::new(RandomSnippets::from_dir(dir)?)),
            None => Ok(Box::new(RandomSnippets::builtin())),
        }
    }
}

fn print_leaderboard(
    store: &dyn LeaderboardStore,
    limit: usize,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let entries = store.top_scores(limit)?;
    if entries.is_empty() {
        writeln!(out, "No scores yet.")?;
    }
    for (i, e) in entries.iter().enumerate() {
        writeln!(
            out,
            "{}. {} - {} WPM ({}% acc, {})",
            i + 1,
            e.username,
            e.wpm,
            e.accuracy,
            e.submitted_at.format("%Y-%m-%d %H:%M")
        )?;
    }
    Ok(())
}

fn print_history(history: Option<History>, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let records = match history {
        Some(h) => h.read_all()?,
        None => Vec::new(),
    };
    if records.is_empty() {
        writeln!(out, "No sessions recorded yet.")?;
    }
    for r in records {
        writeln!(
            out,
            "{}  {:>3}s  {:>3} wpm  {:>3}% acc",
            r.date.format("%Y-%m-%d %H:%M"),
            r.duration_secs,
            r.wpm,
            r.accuracy
        )?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(path) = cli.log_file.clone().or_else(AppDirs::log_path) {
        if let Err(e) = logging::init(&path) {
            eprintln!("logging disabled: {e}");
        }
    }

    let mut stdout = io::stdout();
    if cli.history {
        return print_history(cli.history(), &mut stdout);
    }

    let config_store = cli.config_store();
    let config = cli.apply_to(config_store.load());

    let store: Box<dyn LeaderboardStore> = match cli.open_store() {
        Ok(store) => store,
        Err(e) => {
            log::warn!("falling back to in-memory leaderboard: {}", e);
            eprintln!("leaderboard unavailable ({e}); scores will not be kept");
            Box::new(MemoryLeaderboard::new())
        }
    };

    if cli.leaderboard {
        return print_leaderboard(store.as_ref(), config.leaderboard_size, &mut stdout);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let snippets = match cli.snippets(&config) {
        Ok(s) => s,
        Err(e) => {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
        }
    };

    let runner = Runner::new(
        CrosstermEventSource::new(),
        Duration::from_millis(REDRAW_RATE_MS),
    );
    let scheduler = ThreadTickScheduler::new(runner.sender());

    let mut app = App::new(config, scheduler, snippets, store)
        .with_config_store(Box::new(config_store));
    if let Some(history) = cli.history() {
        app = app.with_history(history);
    }

    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &runner, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    runner: &Runner<CrosstermEventSource>,
    app: &mut App<ThreadTickScheduler>,
) -> Result<(), Box<dyn Error>> {
    log::info!("starting typing session ({})", app.session.duration());
    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    loop {
        app.handle_event(runner.step());
        if app.should_quit() {
            break;
        }
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    }

    Ok(())
}
