use std::path::{Path, PathBuf};

use anyhow::Context;
use mlg::install::UninstallOutcome;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_target, manager, CleanSummary},
    output::print_output,
};

#[derive(Debug, Serialize)]
pub struct UninstallSummary {
    pub game: String,
    pub data_dir: PathBuf,
    pub uninstalled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CleanSummary>,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let manager = manager(opts);
    let target = load_target(&manager, path)?;

    let outcome = manager
        .uninstall(&target)
        .with_context(|| format!("failed to uninstall from {}", target.data_dir.display()))?;

    let details = match outcome {
        UninstallOutcome::NothingToDo => None,
        UninstallOutcome::Uninstalled(report) => Some(CleanSummary::from(report)),
    };

    let summary = UninstallSummary {
        game: target.name.clone(),
        data_dir: target.data_dir.clone(),
        uninstalled: details.is_some(),
        details,
    };

    print_output(&summary, opts, |summary| match &summary.details {
        None => println!("{} is not installed, nothing to do", summary.game),
        Some(details) => {
            println!("Uninstalled MLG from {}", summary.game);
            details.display();
        }
    })
}
