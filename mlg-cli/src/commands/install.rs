use std::path::{Path, PathBuf};

use anyhow::Context;
use mlg::install::{DeployOutcome, InstallOutcome};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{load_target, manager},
    output::{field, print_output},
};

#[derive(Debug, Serialize)]
pub struct InstallSummary {
    pub game: String,
    pub data_dir: PathBuf,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<InstallDetails>,
}

#[derive(Debug, Serialize)]
pub struct InstallDetails {
    pub repaired: bool,
    pub patched_name: String,
    pub anchor_offset: usize,
    pub return_sites: usize,
    pub removed_attribute: bool,
    pub shim_name: String,
    pub rewritten_attributes: Vec<String>,
    pub deployed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deploy_failures: Vec<String>,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let manager = manager(opts);
    let target = load_target(&manager, path)?;

    let outcome = manager
        .install(&target)
        .with_context(|| format!("failed to install into {}", target.data_dir.display()))?;

    let details = match outcome {
        InstallOutcome::AlreadyInstalled => None,
        InstallOutcome::Installed(report) => {
            let deploy_failures = match &report.deployed {
                DeployOutcome::Deployed(deployed) => deployed
                    .failures
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                DeployOutcome::AlreadyPresent => Vec::new(),
            };

            Some(InstallDetails {
                repaired: report.repaired,
                patched_name: report.patch.new_name,
                anchor_offset: report.patch.anchor_offset,
                return_sites: report.patch.return_sites,
                removed_attribute: report.patch.removed_attribute,
                shim_name: report.shim.name,
                rewritten_attributes: report.shim.rewritten,
                deployed: report.deployed.copied(),
                deploy_failures,
            })
        }
    };

    let summary = InstallSummary {
        game: target.name.clone(),
        data_dir: target.data_dir.clone(),
        installed: details.is_some(),
        details,
    };

    print_output(&summary, opts, |summary| {
        let Some(details) = &summary.details else {
            println!("{} is already installed, nothing to do", summary.game);
            return;
        };

        println!("Installed MLG into {}", summary.game);
        if details.repaired {
            println!("  Cleaned up a previous partial install first");
        }
        field("Data:", summary.data_dir.display(), 10);
        field("Patched:", &details.patched_name, 10);
        field("Anchor:", format!("IL_{:04X}", details.anchor_offset), 10);
        field("Returns:", details.return_sites, 10);
        field("Shim:", &details.shim_name, 10);
        field("Deployed:", format!("{} modules", details.deployed), 10);
        for failure in &details.deploy_failures {
            println!("  Warning: {failure}");
        }
    })
}
