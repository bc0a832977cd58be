/*!
 * Steadfast CLI - block distractions and commit to keeping them blocked
 *
 * Version: 0.3.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use steadfast::{
    authority::{self, ControlRequest, ControlResponse},
    bridge::{Bridge, BridgeExit, CommandLauncher},
    check, cli_style,
    config::{LogLevel, Settings},
    error::{Result, SteadfastError, EXIT_SUCCESS},
    logging::{self, LogTarget},
    output::OutputWriter,
};
use steadfast_core_lock::{
    BreakableLock, LockTerms, MinuteOfDay, ProtectionLevel, RandomTextLock, RestartLock,
    ScheduleLock, ScheduleWindow, TimerLock, WeekdaySet,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "steadfast")]
#[command(version, about = "Block distracting sites and apps, and lock the block in place", long_about = None)]
struct Cli {
    /// Path to the settings file (overrides the default location)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Output results as JSON (one object per line)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the authority: owns the configuration, ticks locks, watches agents
    Daemon,

    /// Native-messaging host for browser agents (framed JSON on stdin/stdout)
    Bridge {
        /// Read one message, answer it and exit
        #[arg(long)]
        once: bool,
    },

    /// Show blocking state, lock and agents
    Status,

    /// Blocked domains
    #[command(subcommand)]
    Block(ListCommands),

    /// Blocked applications
    #[command(subcommand)]
    Apps(ListCommands),

    /// Paths allowed inside blocked domains
    #[command(subcommand)]
    Exception(ExceptionCommands),

    /// Turn blocking on
    Start,

    /// Turn blocking off (denied while locked)
    Stop,

    /// Commit to a lock
    #[command(subcommand)]
    Lock(LockCommands),

    /// Try to unlock the active lock
    Unlock {
        /// Text for a random-text lock
        #[arg(long)]
        text: Option<String>,
    },

    /// Start the countdown of a breakable lock
    Countdown,

    /// Show enforcement agents and their health
    Agents,

    /// Show or change the anti-tamper protection level
    Protection {
        /// New level: none, standard, strict or paranoid
        level: Option<ProtectionLevel>,
    },

    /// Show what an agent would do with a URL right now
    Check {
        url: String,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    /// Add entries
    Add {
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Remove entries (denied while locked)
    Remove {
        #[arg(required = true)]
        entries: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ExceptionCommands {
    /// Allow paths inside a blocked domain (denied while locked)
    Add {
        domain: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Drop every allowed path of a domain
    Remove { domain: String },
}

#[derive(Subcommand)]
enum LockCommands {
    /// Locked until the duration elapses (e.g. 90m, 2h, 1d)
    Timer {
        #[arg(value_parser = parse_duration)]
        duration: Duration,
    },

    /// Unlock only by typing a random text exactly
    Text {
        /// Length of the generated text
        #[arg(long, default_value = "32")]
        length: usize,

        /// Wrong answers allowed before the lock stops accepting text
        #[arg(long, default_value = "3")]
        attempts: u32,
    },

    /// Locked during a daily window
    Schedule {
        /// Window start (HH:MM)
        #[arg(long)]
        from: MinuteOfDay,

        /// Window end (HH:MM); earlier than --from wraps past midnight
        #[arg(long)]
        to: MinuteOfDay,

        /// Days: all, workdays, weekend or a list like mon,wed,fri
        #[arg(long, default_value = "all")]
        days: WeekdaySet,
    },

    /// Locked until the computer restarts this many times
    Restart {
        #[arg(default_value = "1")]
        restarts: u32,
    },

    /// Unlockable after a countdown that must be started explicitly
    Breakable {
        #[arg(value_parser = parse_duration)]
        delay: Duration,
    },

    /// Remove the lock outright (only at protection level none)
    Remove,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

/// Parse "90", "90s", "25m", "2h" or "1d"
fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", input))?;
    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown duration unit '{}' (use s, m, h or d)", other)),
    };
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", input))
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_or_default(cli.settings.as_deref())?;
    if let Some(level) = cli.log_level {
        settings.log_level = level.into();
    }
    settings.verbose |= cli.verbose;

    // The bridge's stdout belongs to the agent channel
    let target = match cli.command {
        Commands::Bridge { .. } => LogTarget::Stderr,
        _ if cli.json => LogTarget::Stderr,
        _ => LogTarget::Stdout,
    };
    let long_running = matches!(cli.command, Commands::Daemon | Commands::Bridge { .. });
    if long_running || settings.verbose || settings.log_file.is_some() {
        logging::init_logging(&settings, target)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let out = OutputWriter::new(cli.json);
    let settings_path = cli.settings.clone().or_else(Settings::default_path);

    runtime.block_on(async move {
        match cli.command {
            Commands::Daemon => {
                out.info("Authority running, press Ctrl-C to stop");
                authority::run_daemon(settings, settings_path).await
            }
            Commands::Bridge { once } => run_bridge(&settings, once).await,
            Commands::Check { url } => {
                let report = check::check_url(&settings.state_dir, &url)?;
                if !report.is_blocking && !out.is_json() {
                    cli_style::print_warning("Blocking is off, only management pages are guarded");
                }
                let human = match &report.reason {
                    None => format!("allowed: {}", report.url),
                    Some(reason) => format!("redirected: {} ({})", report.url, reason),
                };
                out.line(&report, &human);
                Ok(())
            }
            Commands::Agents => {
                match authority::dispatch(&settings, settings_path.as_deref(), ControlRequest::Status)
                    .await?
                {
                    ControlResponse::Status(status) => {
                        out.agents(&status.agents);
                        Ok(())
                    }
                    other => finish(&out, other),
                }
            }
            Commands::Protection { level: None } => {
                out.protection(settings.protection_level);
                Ok(())
            }
            command => {
                let request = to_request(command)?;
                let response =
                    authority::dispatch(&settings, settings_path.as_deref(), request).await?;
                finish(&out, response)
            }
        }
    })
}

/// Translate a mutating command into the control vocabulary
fn to_request(command: Commands) -> Result<ControlRequest> {
    let request = match command {
        Commands::Status => ControlRequest::Status,
        Commands::Block(ListCommands::Add { entries }) => ControlRequest::AddDomains { domains: entries },
        Commands::Block(ListCommands::Remove { entries }) => {
            ControlRequest::RemoveDomains { domains: entries }
        }
        Commands::Apps(ListCommands::Add { entries }) => ControlRequest::AddApps { apps: entries },
        Commands::Apps(ListCommands::Remove { entries }) => ControlRequest::RemoveApps { apps: entries },
        Commands::Exception(ExceptionCommands::Add { domain, paths }) => {
            ControlRequest::AddException { domain, paths }
        }
        Commands::Exception(ExceptionCommands::Remove { domain }) => {
            ControlRequest::RemoveException { domain }
        }
        Commands::Start => ControlRequest::SetBlocking { enabled: true },
        Commands::Stop => ControlRequest::SetBlocking { enabled: false },
        Commands::Lock(LockCommands::Remove) => ControlRequest::RemoveLock,
        Commands::Lock(terms) => ControlRequest::ActivateLock {
            terms: lock_terms(terms)?,
        },
        Commands::Unlock { text } => ControlRequest::RequestUnlock { input: text },
        Commands::Countdown => ControlRequest::StartBreakableCountdown,
        Commands::Protection { level: Some(level) } => ControlRequest::SetProtection { level },
        Commands::Daemon
        | Commands::Bridge { .. }
        | Commands::Agents
        | Commands::Check { .. }
        | Commands::Protection { level: None } => {
            return Err(SteadfastError::Control(
                "command is not a control request".to_string(),
            ))
        }
    };
    Ok(request)
}

fn lock_terms(command: LockCommands) -> Result<LockTerms> {
    let terms = match command {
        LockCommands::Timer { duration } => LockTerms::Timer(TimerLock::new(duration.as_secs())),
        LockCommands::Text { length, attempts } => {
            LockTerms::RandomText(RandomTextLock::generate(length, attempts)?)
        }
        LockCommands::Schedule { from, to, days } => LockTerms::Schedule(ScheduleLock::new(vec![
            ScheduleWindow::new(from, to, days),
        ])),
        LockCommands::Restart { restarts } => LockTerms::Restart(RestartLock::new(restarts)),
        LockCommands::Breakable { delay } => {
            LockTerms::Breakable(BreakableLock::new(delay.as_secs()))
        }
        LockCommands::Remove => {
            return Err(SteadfastError::Control(
                "lock removal carries no terms".to_string(),
            ))
        }
    };
    Ok(terms)
}

/// Print the response; a denial becomes a non-zero exit
fn finish(out: &OutputWriter, response: ControlResponse) -> Result<()> {
    out.response(&response);
    match response {
        ControlResponse::Denied { reason, .. } => Err(SteadfastError::TransitionRejected(reason)),
        ControlResponse::Error { message } => Err(SteadfastError::Control(message)),
        ControlResponse::Status(_) | ControlResponse::Ok { .. } => Ok(()),
    }
}

async fn run_bridge(settings: &Settings, once: bool) -> Result<()> {
    let launcher = CommandLauncher::new(settings.app_command.clone());
    let mut bridge = Bridge::new(settings, launcher);
    let (reader, sender) = steadfast_proto::stdio(settings.max_frame_bytes);

    if once {
        bridge.serve_once(reader, sender).await?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    match bridge.serve(reader, sender, cancel).await {
        BridgeExit::ProtocolViolation => Err(SteadfastError::Control(
            "agent broke the framing protocol".to_string(),
        )),
        BridgeExit::EndOfStream | BridgeExit::Cancelled | BridgeExit::Disconnected => Ok(()),
    }
}
