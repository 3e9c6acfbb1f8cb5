pub mod application;
pub mod domain;
pub mod infrastructure;

use anyhow::Context;
use application::commands::{
    authenticate_impl, list_alarms_impl, refresh_impl, run_daemon, set_offset_impl,
    show_offset_impl, AppState,
};
use clap::{Args, Parser, Subcommand};
use domain::models::TimeOffset;
use infrastructure::logging::init_logging;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "knob-joiner", version, about = "Opens upcoming Google Meet links right on time")]
pub struct Cli {
    /// Workspace holding config/, state/ and logs/ (defaults to the current directory).
    #[arg(long, global = true, env = "KNOB_JOINER_ROOT")]
    root: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, global = true, env = "KNOB_JOINER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the daemon (default).
    Run,
    /// Authenticate with Google, or exchange an authorization code.
    Auth {
        #[arg(long)]
        code: Option<String>,
    },
    /// Show or change the time offset.
    Offset {
        #[command(subcommand)]
        action: OffsetAction,
    },
    /// List pending alarms.
    Alarms,
    /// Run one reconciliation pass and exit.
    Refresh,
}

#[derive(Debug, Subcommand)]
enum OffsetAction {
    Show,
    Set(SetOffsetArgs),
}

#[derive(Debug, Args)]
struct SetOffsetArgs {
    /// Minutes before the start (negative: after), between -5 and 5.
    #[arg(allow_negative_numbers = true)]
    minutes: i32,

    /// Interpret the value as the popup slider position (the negated offset).
    #[arg(long)]
    slider: bool,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_root(root: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match root {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("failed to resolve current directory"),
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    run_cli(Cli::parse()).await
}

pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let workspace_root = resolve_root(cli.root)?;
    let state = AppState::new(workspace_root).context("failed to initialize workspace")?;
    let _log_guard = init_logging(state.logs_dir(), &cli.log_level)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(&state)
            .await
            .map_err(|error| anyhow::anyhow!(state.command_error("run", &error)))?,
        Command::Auth { code } => {
            let response = authenticate_impl(code)
                .await
                .map_err(|error| anyhow::anyhow!(state.command_error("auth", &error)))?;
            if let Some(url) = &response.authorization_url {
                eprintln!("Finish signing in at {url}");
                eprintln!("then run `knob-joiner auth --code <code>`.");
            }
            print_json(&response)?;
        }
        Command::Offset { action } => match action {
            OffsetAction::Show => {
                let response = show_offset_impl(&state)
                    .map_err(|error| anyhow::anyhow!(state.command_error("offset", &error)))?;
                print_json(&response)?;
            }
            OffsetAction::Set(args) => {
                let offset = if args.slider {
                    TimeOffset::from_slider(args.minutes)
                } else {
                    TimeOffset::new(args.minutes)
                }
                .map_err(|reason| anyhow::anyhow!(reason))?;
                let response = set_offset_impl(&state, offset)
                    .await
                    .map_err(|error| anyhow::anyhow!(state.command_error("offset", &error)))?;
                print_json(&response)?;
            }
        },
        Command::Alarms => {
            let alarms = list_alarms_impl(&state)
                .map_err(|error| anyhow::anyhow!(state.command_error("alarms", &error)))?;
            print_json(&alarms)?;
        }
        Command::Refresh => {
            let summary = refresh_impl(&state)
                .await
                .map_err(|error| anyhow::anyhow!(state.command_error("refresh", &error)))?;
            print_json(&summary)?;
        }
    }
    Ok(())
}
