//! wrapitup - Run a command under a time limit and stop it gracefully
//!
//! Ctrl+C or SIGTERM (or the configured signals) ask the command to wrap up
//! with SIGTERM, then SIGKILL once the grace period runs out.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "wrapitup")]
#[command(about = "Run commands under a time limit with graceful shutdown")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./wrapitup.toml or ~/.config/wrapitup/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command, stopping it on a time limit or shutdown signal
    Run(cmd::run::RunArgs),
    /// Show which signals this platform can listen for
    Signals,
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(wrapitup_core::ProgressContext::new());

    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    wrapitup_core::init_logging(cli.quiet, cli.debug, multi)?;

    // Load configuration
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Signals => {
            cmd::signals::run();
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Time limit",
                &match config.run.limit {
                    Some(limit) => format!("{limit}s"),
                    None => "none".to_string(),
                },
            ]);
            table.add_row(vec![
                "Grace period",
                &format!("{}s", config.run.grace_period),
            ]);
            table.add_row(vec![
                "Poll interval",
                &format!("{}ms", config.run.poll_interval_ms),
            ]);
            let signals = config.run.signals()?;
            table.add_row(vec![
                "Signals",
                &format!(
                    "{}{}",
                    wrapitup_core::signal::join_names(&signals),
                    if config.run.signals.is_empty() {
                        " (platform default)"
                    } else {
                        ""
                    }
                ),
            ]);

            eprintln!("\n{table}");
            Ok(ExitCode::SUCCESS)
        }
    }
}
