mod config;
mod logging;
mod player;

use std::fmt;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use recall_core::model::{RequeuePolicy, SessionSummary};
use services::{
    ActiveSession, AudioDirectorySource, Clock, Command, IgnoredReason, Player, SessionEvent,
    SessionLoopService, SessionState, Side, SilentPlayer, display_label,
};
use storage::{LoadStatus, ProgressStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use config::{AppConfig, Overrides};
use player::CommandPlayer;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidRequeue { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidRequeue { raw } => {
                write!(f, "invalid --requeue value: {raw} (expected immediate or next-session)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_number(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<u32, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  recall [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file.json>     settings file");
    eprintln!("  --progress <file.json>   progress store (default progress.json)");
    eprintln!("  --audio-dir <dir>        recordings to study (default audio_files)");
    eprintln!("  --session-limit <n>      target session size (default 20)");
    eprintln!("  --new-cap <n>            new cards per session (default 20)");
    eprintln!("  --shuffle | --no-shuffle");
    eprintln!("  --requeue <immediate|next-session>");
    eprintln!("  --player <command>       e.g. \"mpv --no-video\"; silent when unset");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RECALL_PROGRESS, RECALL_AUDIO_DIR, RECALL_PLAYER, RECALL_LOG");
}

fn print_keys() {
    println!("Keys: <enter>/n next, k known, b back, q quit");
}

enum Parsed {
    Run(Overrides),
    Help,
}

fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<Parsed, ArgsError> {
    let mut overrides = Overrides::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => overrides.config = Some(PathBuf::from(require_value(args, "--config")?)),
            "--progress" => {
                overrides.progress = Some(PathBuf::from(require_value(args, "--progress")?));
            }
            "--audio-dir" => {
                overrides.audio_dir = Some(PathBuf::from(require_value(args, "--audio-dir")?));
            }
            "--session-limit" => {
                overrides.session_limit = Some(require_number(args, "--session-limit")?);
            }
            "--new-cap" => overrides.new_card_cap = Some(require_number(args, "--new-cap")?),
            "--shuffle" => overrides.shuffle = Some(true),
            "--no-shuffle" => overrides.shuffle = Some(false),
            "--requeue" => {
                let value = require_value(args, "--requeue")?;
                let policy = RequeuePolicy::from_name(&value)
                    .ok_or(ArgsError::InvalidRequeue { raw: value })?;
                overrides.requeue = Some(policy);
            }
            "--player" => overrides.player = Some(require_value(args, "--player")?),
            "--help" | "-h" => return Ok(Parsed::Help),
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }
    Ok(Parsed::Run(overrides))
}

fn build_player(command: Option<&str>) -> Arc<dyn Player> {
    match command.and_then(CommandPlayer::new) {
        Some(player) => Arc::new(player),
        None => Arc::new(SilentPlayer),
    }
}

fn input_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "n" => Some(Command::Advance),
        "k" => Some(Command::MarkKnown),
        "b" => Some(Command::Rewind),
        _ => None,
    }
}

fn report(store: &ProgressStore, events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::Played { card_id, side } => {
                let Ok(Some(record)) = store.get(card_id) else {
                    continue;
                };
                match side {
                    Side::Front => println!("\n[{card_id}] {}", display_label(record.front())),
                    Side::Back => println!("  -> {}", display_label(record.back())),
                }
            }
            SessionEvent::Graded(log) => {
                let verdict = if log.grade.is_success() { "known" } else { "again" };
                println!(
                    "  {verdict} (box {} -> {})",
                    log.previous_box.value(),
                    log.new_box.value()
                );
            }
            SessionEvent::Requeued(_) => println!("  back later this session"),
            SessionEvent::Rewound(card_id) => println!("  back to {card_id}"),
            SessionEvent::SaveFailed(message) => eprintln!("warning: progress not saved: {message}"),
            SessionEvent::Completed => println!("\nSession complete."),
            SessionEvent::Ignored(IgnoredReason::NothingToRewind) => {
                println!("  already at the first card");
            }
            SessionEvent::Ignored(IgnoredReason::NoCurrentCard) => {}
        }
    }
}

fn prompt(session: &ActiveSession) {
    let progress = session.machine.progress();
    let hint = match session.machine.state() {
        SessionState::ShowingQuestion => "answer?",
        SessionState::ShowingAnswer => "known?",
        SessionState::Idle | SessionState::CardFinished => "",
    };
    print!("  [{} left] {hint} > ", progress.remaining);
    let _ = std::io::stdout().flush();
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "Reviewed {} ({} known, {} again).",
        summary.total_reviews(),
        summary.good(),
        summary.again()
    );
}

async fn study(
    session: &mut ActiveSession,
    store: &ProgressStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_keys();
    report(store, &session.machine.advance()?);

    while !session.machine.is_complete() {
        prompt(session);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }
        let Some(command) = input_command(&line) else {
            print_keys();
            continue;
        };
        report(store, &session.machine.apply(command)?);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let overrides = match parse_args(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })? {
        Parsed::Run(overrides) => overrides,
        Parsed::Help => {
            print_usage();
            return Ok(());
        }
    };

    let config = AppConfig::resolve(&overrides, |key| std::env::var(key).ok())?;
    info!(
        progress = %config.progress.display(),
        audio_dir = %config.audio_dir.display(),
        "starting"
    );

    let (store, load) = ProgressStore::open(&config.progress);
    if let LoadStatus::Corrupt { reason, .. } = &load.status {
        eprintln!("warning: progress file was unreadable ({reason}); starting fresh");
    } else if load.skipped > 0 {
        warn!(skipped = load.skipped, "some progress entries were dropped");
    }
    let store = Arc::new(store);

    let session_loop = SessionLoopService::new(
        Clock::default_clock(),
        config.study.clone(),
        Arc::clone(&store),
        Arc::new(AudioDirectorySource::new(&config.audio_dir)),
        build_player(config.player.as_deref()),
    );
    let added = session_loop.refresh_cards().await?;
    if added > 0 {
        println!("Found {added} new cards.");
    }

    let mut session = session_loop.start_session()?;
    if session.machine.queue().is_empty() {
        println!("Nothing due right now.");
        session.finish().await?;
        return Ok(());
    }
    println!(
        "{} reviews, {} new cards.",
        session.due_selected, session.new_selected
    );

    let studied = study(&mut session, &store).await;
    // Save whatever was graded even when the loop bailed out.
    let summary = session.finish().await?;
    studied?;
    print_summary(&summary);
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
