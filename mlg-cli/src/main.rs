mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() {
    if let Err(error) = ctrlc::set_handler(|| {
        eprintln!("\nInterrupted. An install may be left partial; run `mlg clean <GAME>` to repair it.");
        std::process::exit(130);
    }) {
        eprintln!("Failed to set Ctrl+C handler: {error}");
    }

    // Usage errors and --help both end here; neither is a failure
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return;
        }
    };

    // Show mlg info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("mlg", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    let result = match &cli.command {
        Command::Install { path } => commands::install::run(path, &cli.global),
        Command::Uninstall { path } => commands::uninstall::run(path, &cli.global),
        Command::Clean { path } => commands::clean::run(path, &cli.global),
    };

    if let Err(error) = result {
        log::debug!("{} failed for {}", command_name(&cli.command), cli.command.path().display());
        output::print_error(&error, &cli.global);
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Install { .. } => "install",
        Command::Uninstall { .. } => "uninstall",
        Command::Clean { .. } => "clean",
    }
}
