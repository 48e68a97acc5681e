use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use dailywall::config::{self, AgentConfig};
use dailywall::http::HttpTransport;
use dailywall::ledger::Ledger;
use dailywall::model::RunDates;
use dailywall::paths::{self, AppPaths};
use dailywall::presentation::{CommandPresenter, NoopPresenter, Presenter};
use dailywall::runlog::RunLog;
use dailywall::sync::{self, SyncOutcome};
use dailywall::SyncError;

const DEFAULT_STATUS_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Sync,
    Plan,
    Status,
    InitConfig,
}

struct Options {
    command: Command,
    base_dir: Option<PathBuf>,
    today: Option<NaiveDate>,
    present: bool,
    limit: usize,
}

enum Failure {
    Usage(String),
    Run(SyncError),
}

impl From<SyncError> for Failure {
    fn from(err: SyncError) -> Self {
        Self::Run(err)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Self::Run(err.into())
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return ExitCode::SUCCESS;
    }

    match parse_args(&args).and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Usage(msg)) => {
            eprintln!("dailywall: {msg} (try --help)");
            ExitCode::from(2)
        }
        Err(Failure::Run(err)) => {
            log::error!("{err}");
            eprintln!("dailywall: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<Options, Failure> {
    let mut options = Options {
        command: Command::Sync,
        base_dir: None,
        today: None,
        present: true,
        limit: DEFAULT_STATUS_LIMIT,
    };
    let mut command_seen = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| Failure::Usage("--base-dir requires a value".to_string()))?;
                options.base_dir = Some(PathBuf::from(v));
            }
            "--today" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| Failure::Usage("--today requires a value".to_string()))?;
                let date = NaiveDate::parse_from_str(v, "%Y-%m-%d")
                    .map_err(|e| Failure::Usage(format!("--today {v:?}: {e}")))?;
                options.today = Some(date);
            }
            "--limit" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| Failure::Usage("--limit requires a value".to_string()))?;
                options.limit = v
                    .parse()
                    .map_err(|_| Failure::Usage(format!("--limit {v:?} is not a number")))?;
            }
            "--no-present" => options.present = false,
            cmd if !command_seen && !cmd.starts_with('-') => {
                options.command = match cmd {
                    "sync" => Command::Sync,
                    "plan" => Command::Plan,
                    "status" => Command::Status,
                    "init-config" => Command::InitConfig,
                    other => return Err(Failure::Usage(format!("unknown command: {other}"))),
                };
                command_seen = true;
            }
            other => return Err(Failure::Usage(format!("unknown arg: {other}"))),
        }
        i += 1;
    }

    Ok(options)
}

fn run(options: Options) -> Result<(), Failure> {
    let base_dir = options
        .base_dir
        .or_else(paths::default_base_dir)
        .ok_or_else(|| Failure::Usage("could not determine base dir; pass --base-dir".to_string()))?;
    let paths = AppPaths::new(base_dir);
    let dates = options.today.map(RunDates::for_today).unwrap_or_else(RunDates::local);

    match options.command {
        Command::Sync => run_sync(&paths, dates, options.present),
        Command::Plan => run_plan(&paths, dates),
        Command::Status => run_status(&paths, options.limit),
        Command::InitConfig => run_init_config(&paths),
    }
}

fn run_sync(paths: &AppPaths, dates: RunDates, present: bool) -> Result<(), Failure> {
    paths.ensure_dirs()?;
    let run_log = RunLog::new(paths);
    let agent_config = match config::load_agent_config(paths) {
        Ok(v) => v,
        Err(err) => {
            let _ = run_log.log_line("error", "config_invalid", serde_json::json!({ "error": err.to_string() }));
            return Err(err.into());
        }
    };

    let transport = HttpTransport::new(&agent_config.site);
    let mut presenter: Box<dyn Presenter> = if present {
        Box::new(CommandPresenter::new(agent_config.presentation.clone()))
    } else {
        Box::new(NoopPresenter)
    };

    let result = sync::run_sync(
        paths,
        &agent_config.site,
        &transport,
        presenter.as_mut(),
        dates,
        |level, event, data| run_log.log_line(level, event, data),
    );

    match result {
        Ok(summary) => {
            match summary.outcome {
                SyncOutcome::UpToDate => println!("Already up to date ({}).", summary.baseline),
                SyncOutcome::NothingNew => {
                    println!("No new wallpapers after {}.", summary.baseline)
                }
                SyncOutcome::Synced => {
                    for record in &summary.backfilled {
                        println!("Backfilled {} {}", record.date, record.filename);
                    }
                    if let Some(head) = &summary.head {
                        println!("Current    {} {}", head.date, head.filename);
                    }
                }
            }
            Ok(())
        }
        Err(err) => {
            let _ = run_log.log_line(
                "error",
                "sync_failed",
                serde_json::json!({ "error": err.to_string() }),
            );
            Err(err.into())
        }
    }
}

fn run_plan(paths: &AppPaths, dates: RunDates) -> Result<(), Failure> {
    let agent_config = config::load_agent_config(paths)?;
    let transport = HttpTransport::new(&agent_config.site);
    let preview = sync::preview_sync(paths, &agent_config.site, &transport, dates)?;

    match preview.last_recorded {
        Some(last) => println!("Last recorded: {last}"),
        None => println!("Last recorded: none (baseline {})", preview.baseline),
    }
    let Some(window) = preview.window else {
        println!("Already up to date.");
        return Ok(());
    };

    println!("Listing items: {}", preview.candidates_seen);
    for date in &window.skipped_future {
        println!("Skip future   {date}");
    }
    for date in &window.skipped_unordered {
        println!("Skip repeated {date}");
    }
    if window.items.is_empty() {
        println!("Nothing to fetch.");
    }
    for (index, item) in window.items.iter().enumerate() {
        let role = if index + 1 == window.items.len() {
            "head    "
        } else {
            "backfill"
        };
        println!("{role} {} {}", item.date, item.detail_url);
    }
    if !window.reached_baseline {
        println!("Warning: the listing page does not reach back to {}; older days will not be backfilled.", preview.baseline);
    }
    Ok(())
}

fn run_status(paths: &AppPaths, limit: usize) -> Result<(), Failure> {
    let ledger = Ledger::new(paths.ledger_path());
    println!("Ledger: {}", ledger.path().to_string_lossy());
    match ledger.read_last_date()? {
        Some(last) => println!("Last recorded: {last}"),
        None => {
            println!("Last recorded: none");
            return Ok(());
        }
    }

    let records = ledger.records()?;
    println!("Records: {}", records.len());
    for record in records.iter().take(limit) {
        let first_line = record.description.lines().next().unwrap_or("");
        println!("  {} {} {}", record.date, record.filename, first_line);
    }
    Ok(())
}

fn run_init_config(paths: &AppPaths) -> Result<(), Failure> {
    let path = paths.config_path();
    if path.exists() {
        println!("Config already exists: {}", path.to_string_lossy());
        return Ok(());
    }
    config::save_agent_config(paths, &AgentConfig::default())?;
    println!("Wrote {}", path.to_string_lossy());
    Ok(())
}

fn print_help() {
    println!(
        r#"dailywall

Downloads the daily wallpapers missed since the last run, records them in the
ledger and sets the newest one as the desktop background.

Usage:
  dailywall [sync] [--no-present]
  dailywall plan
  dailywall status [--limit <n>]
  dailywall init-config

Options:
  --base-dir <path>   Override base dir (default: $DAILYWALL_DIR or ~/Images/bing-wallpapers)
  --today <date>      Treat <date> (YYYY-MM-DD) as the current day
  --no-present        Do not set the background or show a notification
  --limit <n>         Number of records shown by status (default: 5)

Set RUST_LOG=debug for request-level logging.
"#
    );
}
