use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// mlg - install the MLG mod loader into Godot DotNet games
#[derive(Debug, Parser)]
#[command(name = "mlg", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding the loader module and support modules [default: next to mlg].
    #[arg(long, value_name = "DIR", global = true)]
    pub loader_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Back up the game module, install the shim and deploy the support modules.
    Install {
        /// Path to the game executable.
        #[arg(value_name = "GAME")]
        path: PathBuf,
    },

    /// Restore the original game module and remove everything the install added.
    Uninstall {
        /// Path to the game executable.
        #[arg(value_name = "GAME")]
        path: PathBuf,
    },

    /// Repair an interrupted install or uninstall by removing all of its traces.
    Clean {
        /// Path to the game executable.
        #[arg(value_name = "GAME")]
        path: PathBuf,
    },
}

impl Command {
    /// The game executable the command works on.
    pub fn path(&self) -> &PathBuf {
        match self {
            Command::Install { path } | Command::Uninstall { path } | Command::Clean { path } => {
                path
            }
        }
    }
}
