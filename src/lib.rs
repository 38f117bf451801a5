//! # authcode
//!
//! Top-level controller for the `authcode` binary: parses the command line,
//! loads configuration, installs logging, builds the session over a JSON
//! history file and dispatches to the command handlers.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod render;

use authcode_totp::totp::{JsonFileStore, Session, SystemClock, TotpService};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;

use cli::{Cli, Commands, HistoryCommands, OutputFormat, WatchArgs};
use config::AppConfig;

/// Entry point used by `main`.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(e.exit_code().clamp(0, 255) as u8);
        }
    };

    let (mut config, config_error) = AppConfig::load(cli.config.as_deref());
    logging::init(&config.log_level, cli.verbose);
    if let Some(e) = config_error {
        tracing::warn!("Using default configuration: {}", e);
    }
    if let Some(path) = &cli.history_file {
        config.history_path = Some(path.clone());
    }
    if cli.privacy {
        config.privacy_mode = true;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("authcode: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("authcode: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build the session described by `config`.
pub fn build_session(config: &AppConfig) -> Session {
    let history_path = config.resolved_history_path();
    tracing::debug!("History file: {}", history_path.display());
    let clock = SystemClock::shared();
    let service = TotpService::new(Box::new(JsonFileStore::new(history_path)), clock.clone());
    Session::new(service, clock, config.tick(), config.privacy_mode)
}

async fn dispatch(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let session = build_session(&config);
    let format = cli.format;

    let result = match cli.command {
        Commands::Code(args) => {
            let reveal = args.reveal || config.reveal_secret_by_default;
            let report = commands::code(&session, &args.secret, args.name.as_deref(), reveal).await?;
            emit(format, &report, render::code_text(&report))
        }
        Commands::Watch(args) => watch(&session, args, &config, format).await,
        Commands::History { command } => {
            let state = session.service();
            match command {
                HistoryCommands::List => {
                    let rows = commands::history_list(&state, session.privacy_mode()).await;
                    emit(format, &rows, render::history_text(&rows))
                }
                HistoryCommands::Rename { id, name } => {
                    let report = commands::history_rename(&state, &id, &name).await?;
                    emit(format, &report, render::change_text(&report))
                }
                HistoryCommands::Delete { id } => {
                    let report = commands::history_delete(&state, &id).await?;
                    emit(format, &report, render::change_text(&report))
                }
                HistoryCommands::Clear => {
                    let report = commands::history_clear(&state).await;
                    emit(format, &report, render::change_text(&report))
                }
            }
        }
        Commands::Reset => {
            let report = commands::reset(&session).await;
            emit(format, &report, render::change_text(&report))
        }
    };

    session.shutdown().await;
    result
}

fn emit<T: serde::Serialize>(format: OutputFormat, value: &T, text: String) -> anyhow::Result<()> {
    if format.is_json() {
        println!("{}", render::to_json(value, true)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

/// Redraw the board every tick until Ctrl-C.
async fn watch(
    session: &Session,
    args: WatchArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let reveal = args.reveal || config.reveal_secret_by_default;
    commands::watch_start(session, args.secret.as_deref(), args.name.as_deref(), reveal).await?;

    let interactive = std::io::stdout().is_terminal() && !format.is_json();
    let mut interval = tokio::time::interval(config.tick());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Interrupted, stopping countdowns");
                break;
            }
            _ = interval.tick() => {
                let board = session.board().await;
                render::write_frame(&mut std::io::stdout().lock(), &board, format, interactive)?;
            }
        }
    }
    Ok(())
}
