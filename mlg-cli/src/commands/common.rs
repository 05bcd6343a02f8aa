use std::path::Path;

use anyhow::Context;
use mlg::{
    config::InstallerConfig,
    install::{CleanReport, GameTarget, InstallationManager},
};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Installation manager for the loader directory selected by `--loader-dir`.
pub fn manager(opts: &GlobalOptions) -> InstallationManager {
    let config = match &opts.loader_dir {
        Some(dir) => InstallerConfig::with_installer_dir(dir.clone()),
        None => InstallerConfig::default(),
    };
    InstallationManager::new(config)
}

/// Locate the game data next to the executable at `path`.
pub fn load_target(manager: &InstallationManager, path: &Path) -> anyhow::Result<GameTarget> {
    manager
        .target(path)
        .with_context(|| format!("failed to locate game data for {}", path.display()))
}

/// Files restored and removed by an uninstall or clean.
#[derive(Debug, Serialize)]
pub struct CleanSummary {
    pub restored: bool,
    pub removed_patched: bool,
    pub removed_layout: bool,
}

impl From<CleanReport> for CleanSummary {
    fn from(report: CleanReport) -> Self {
        CleanSummary {
            restored: report.restored,
            removed_patched: report.removed_patched,
            removed_layout: report.removed_layout,
        }
    }
}

impl CleanSummary {
    /// Print the summary lines shared by uninstall and clean.
    pub fn display(&self) {
        if self.restored {
            println!("  Restored the original game module");
        }
        if self.removed_patched {
            println!("  Deleted the patched module");
        }
        if self.removed_layout {
            println!("  Removed the MLG directory");
        }
    }
}
