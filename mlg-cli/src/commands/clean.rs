use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_target, manager, CleanSummary},
    output::print_output,
};

#[derive(Debug, Serialize)]
pub struct CleanOutput {
    pub game: String,
    pub data_dir: PathBuf,
    #[serde(flatten)]
    pub report: CleanSummary,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let manager = manager(opts);
    let target = load_target(&manager, path)?;

    let report = manager
        .clean(&target)
        .with_context(|| format!("failed to clean {}", target.data_dir.display()))?;
    let nothing_found = report.is_empty();

    let output = CleanOutput {
        game: target.name.clone(),
        data_dir: target.data_dir.clone(),
        report: CleanSummary::from(report),
    };

    print_output(&output, opts, |output| {
        if nothing_found {
            println!("{} has no MLG files, nothing to clean", output.game);
        } else {
            println!("Cleaned {}", output.game);
            output.report.display();
        }
    })
}
