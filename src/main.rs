mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Config,
    pub config_path: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = paths::config_file(cli.config.as_deref())?;
    let config = match cli.command {
        // Must work with a broken or missing config file
        Command::ConfigPath | Command::InitConfig { .. } => Config::default(),
        _ => Config::load(&config_path)?,
    };

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config,
        config_path,
    };

    match cli.command {
        Command::Show(args) => commands::show::run(&ctx, args),
        Command::Set(args) => commands::set::set(&ctx, args),
        Command::Tags(args) => commands::set::tags(&ctx, args),
        Command::Description(args) => commands::set::description(&ctx, args),
        Command::Net(args) => commands::device::net(&ctx, args),
        Command::Disk(args) => commands::device::disk(&ctx, args),
        Command::Cdrom(args) => commands::device::cdrom(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Decode(args) => commands::inspect::decode(args),
        Command::Grammar => {
            commands::inspect::grammar();
            Ok(())
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "pvekit", &mut io::stdout());
            Ok(())
        }
        Command::ConfigPath => {
            commands::config::path(&ctx);
            Ok(())
        }
        Command::InitConfig { force } => commands::config::init(&ctx, force),
    }
}
