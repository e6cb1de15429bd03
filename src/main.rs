mod ui;

use chrono::{Local, Utc};
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use proctor::{
    app::{App, Flow},
    app_dirs::AppDirs,
    bank::QuestionBank,
    config::{ConfigStore, FileConfigStore},
    question::Difficulty,
    result::{ResultId, TestResult},
    runtime::{CrosstermEventSource, FixedTicker, QuizEvent, Runner},
    selector::FilterKey,
    session::{SessionState, TestSession},
    store::{summarize, ResultStore, SqliteResultStore},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, stdin},
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 100;

/// timed multiple-choice tests in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Run timed multiple-choice tests (grammar, aptitude, subject or your own bank) with automatic submission when time runs out, per-question timing, and a history of past results."
)]
pub struct Cli {
    /// module to draw questions from
    #[clap(short = 'm', long)]
    module: Option<String>,

    /// only use questions in this category
    #[clap(short = 'c', long)]
    category: Option<String>,

    /// only use questions of this difficulty
    #[clap(short = 'd', long, value_enum)]
    difficulty: Option<DifficultyArg>,

    /// number of questions in the test
    #[clap(short = 'n', long)]
    questions: Option<usize>,

    /// number of seconds on the clock
    #[clap(short = 's', long)]
    secs: Option<u64>,

    /// extra question bank (JSON) merged into the built-in banks
    #[clap(short = 'b', long)]
    bank: Option<PathBuf>,

    /// list available modules and exit
    #[clap(long)]
    list_modules: bool,

    /// print recent results and exit
    #[clap(long)]
    history: bool,

    /// print one stored result with its review and exit
    #[clap(long, value_name = "RESULT_ID")]
    show: Option<String>,

    /// number of results shown by --history
    #[clap(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Debug, Copy, Clone, ValueEnum, strum_macros::Display)]
pub enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(d: DifficultyArg) -> Self {
        match d {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proctor=info"));
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let cli = Cli::parse();

    let config_store = FileConfigStore::new();
    let mut config = config_store.load();

    let mut bank = QuestionBank::builtin();
    for path in config.bank_path.iter().chain(cli.bank.iter()) {
        match QuestionBank::from_file(path) {
            Ok(extra) => bank.merge(extra),
            Err(e) => {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::ValueValidation, format!("{}: {e}", path.display()))
                    .exit();
            }
        }
    }

    if cli.list_modules {
        for (name, count) in bank.modules() {
            println!("{name:<16} {count:>4} questions");
        }
        return Ok(());
    }

    if cli.history || cli.show.is_some() {
        let store = SqliteResultStore::new()?;
        match &cli.show {
            Some(id) => print_result(&store, id)?,
            None => print_history(&store, cli.limit)?,
        }
        return Ok(());
    }

    let module = cli.module.clone().unwrap_or_else(|| config.module.clone());
    let mut filter = FilterKey::module(module.clone());
    if let Some(category) = &cli.category {
        filter = filter.with_category(category.clone());
    }
    if let Some(difficulty) = cli.difficulty {
        filter = filter.with_difficulty(difficulty.into());
    }
    let session_config = config.session_config(&module, cli.questions, cli.secs);

    let session = match TestSession::start(&bank, filter, session_config) {
        Ok(session) => session,
        Err(e) => {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
        }
    };

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if config.module != module {
        config.module = module;
        let _ = config_store.save(&config);
    }

    let store: Option<Box<dyn ResultStore>> = match SqliteResultStore::new() {
        Ok(store) => Some(Box::new(store)),
        Err(e) => {
            tracing::warn!("results will not be saved: {e}");
            None
        }
    };
    let mut app = App::new(session, bank, store);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    outcome?;

    if app.session.has_unsaved_result() {
        if let Ok(result) = app.session.result() {
            eprintln!(
                "result {} ({}%) could not be saved{}",
                result.result_id,
                result.score_percent,
                app.save_error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let mut runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        let (event, elapsed) = runner.step();
        // Credit time before acting on the key so it lands on the question
        // that was on screen.
        app.on_elapsed(elapsed, Utc::now());

        if let QuizEvent::Key(key) = event {
            let was_running = app.session.state() == SessionState::InProgress;
            if app.handle_key(key, Utc::now()) == Flow::Quit {
                break;
            }
            if !was_running && app.session.state() == SessionState::InProgress {
                runner.reset_elapsed();
            }
        }
    }

    Ok(())
}

fn print_history(store: &SqliteResultStore, limit: usize) -> Result<(), Box<dyn Error>> {
    let results = store.recent(limit)?;
    if results.is_empty() {
        println!("no results yet");
        return Ok(());
    }

    println!(
        "{:<36}  {:<12}  {:>5}  {:>6}  {:<16}",
        "id", "module", "score", "time", "finished"
    );
    for r in &results {
        println!(
            "{:<36}  {:<12}  {:>4}%  {:>5.1}m  {:<16}",
            r.result_id,
            r.module_or_subject,
            r.display_score(),
            r.total_time_minutes,
            r.timing_details
                .ended_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    for s in summarize(&results) {
        println!(
            "{:<12} {} attempts, best {}%, average {:.0}%, {} passed",
            s.module, s.attempts, s.best_score, s.average_score, s.passes
        );
    }
    Ok(())
}

fn print_result(store: &SqliteResultStore, id: &str) -> Result<(), Box<dyn Error>> {
    let id: ResultId = id.parse()?;
    let result: TestResult = store.load_by_id(id)?;

    println!(
        "{} {}{}: {}% ({})",
        result.result_id,
        result.module_or_subject,
        result
            .topic_ref
            .as_deref()
            .map(|t| format!("/{t}"))
            .unwrap_or_default(),
        result.display_score(),
        if result.display_passed() { "passed" } else { "not passed" }
    );
    let m = &result.performance_metrics;
    println!(
        "{} correct, {} incorrect, {} unanswered, {:.2} min, {}",
        m.correct_count,
        m.incorrect_count,
        m.unanswered_count,
        result.total_time_minutes,
        result.timing_details.completion_reason
    );
    for (i, q) in result.questions.iter().enumerate() {
        println!();
        println!("{}. [{}] {}", i + 1, if q.is_correct { "x" } else { " " }, q.text);
        println!(
            "   your answer: {}  correct: {}  time: {}s / {}s",
            q.selected_option_text.as_deref().unwrap_or("-"),
            q.correct_option_text,
            q.time_spent_seconds,
            q.allocated_time_seconds
        );
        if let Some(e) = &q.explanation {
            println!("   {e}");
        }
    }
    Ok(())
}
