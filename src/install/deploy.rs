use std::path::{Path, PathBuf};

use crate::{
    install::FolderLayout,
    Error::{self, Deploy, DirectoryNotFound},
    Result,
};

/// Result of [`DependencyDeployer::deploy`].
#[derive(Debug)]
pub enum DeployOutcome {
    /// The install root existed; nothing was copied or overwritten
    AlreadyPresent,
    /// The layout was created and support modules copied into it
    Deployed(DeployReport),
}

impl DeployOutcome {
    /// Number of modules copied, zero if the layout was already present.
    #[must_use]
    pub fn copied(&self) -> usize {
        match self {
            DeployOutcome::AlreadyPresent => 0,
            DeployOutcome::Deployed(report) => report.copied,
        }
    }
}

/// Modules copied by a deployment and the ones that failed.
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Modules copied into `core`
    pub copied: usize,
    /// One [`crate::Error::Deploy`] per module that could not be copied
    pub failures: Vec<Error>,
}

/// Copies support modules from the installer directory into a [`FolderLayout`].
#[derive(Debug, Clone)]
pub struct DependencyDeployer {
    source: PathBuf,
    extension: String,
    excluded: Vec<String>,
}

impl DependencyDeployer {
    /// Deploy every `*.<extension>` file in `source` except those named in `excluded`.
    ///
    /// Extension and exclusions compare case-insensitively.
    #[must_use]
    pub fn new(source: PathBuf, extension: &str, excluded: &[String]) -> Self {
        DependencyDeployer {
            source,
            extension: extension.to_string(),
            excluded: excluded.to_vec(),
        }
    }

    /// Support modules in the source directory, sorted by path.
    ///
    /// # Errors
    /// Returns [`crate::Error::DirectoryNotFound`] if the source directory cannot be read.
    pub fn modules(&self) -> Result<Vec<PathBuf>> {
        let entries =
            std::fs::read_dir(&self.source).map_err(|_| DirectoryNotFound(self.source.clone()))?;

        let mut modules: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_deployable(path))
            .collect();
        modules.sort();
        Ok(modules)
    }

    fn copy_into(modules: Vec<PathBuf>, core: &Path) -> DeployReport {
        let mut report = DeployReport::default();
        for module in modules {
            let Some(name) = module.file_name() else {
                continue;
            };

            let destination = core.join(name);
            match std::fs::copy(&module, &destination) {
                Ok(_) => {
                    log::debug!("Deployed {}", destination.display());
                    report.copied += 1;
                }
                Err(source) => {
                    log::error!("Failed to deploy {}: {source}", module.display());
                    report.failures.push(Deploy {
                        file: module,
                        source,
                    });
                }
            }
        }
        report
    }

    fn is_deployable(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };

        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));

        matches_extension
            && !self
                .excluded
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(name))
    }

    /// Create `layout` and copy the support modules into its `core` directory.
    ///
    /// An existing layout is left untouched. A module that fails to copy is logged and
    /// recorded in the report; the remaining modules are still copied.
    ///
    /// # Errors
    /// - [`crate::Error::DirectoryNotFound`] if the source directory cannot be read
    /// - [`crate::Error::FileError`] if the layout cannot be created
    pub fn deploy(&self, layout: &FolderLayout) -> Result<DeployOutcome> {
        if layout.exists() {
            log::info!("{} already exists, nothing deployed", layout.root().display());
            return Ok(DeployOutcome::AlreadyPresent);
        }

        let modules = self.modules()?;
        layout.create()?;

        let report = Self::copy_into(modules, &layout.core());
        log::info!(
            "Deployed {} modules into {}",
            report.copied,
            layout.core().display()
        );
        Ok(DeployOutcome::Deployed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{GameFixture, SUPPORT_MODULES};

    fn deployer(fixture: &GameFixture) -> DependencyDeployer {
        let config = fixture.config();
        DependencyDeployer::new(
            config.installer_dir,
            &config.naming.module_extension,
            &config.excluded,
        )
    }

    #[test]
    fn copies_support_modules() {
        let fixture = GameFixture::new("Game");
        let layout = FolderLayout::new(fixture.install_root());

        let outcome = deployer(&fixture).deploy(&layout).unwrap();
        let DeployOutcome::Deployed(report) = outcome else {
            panic!("expected a deployment");
        };
        assert_eq!(report.copied, SUPPORT_MODULES.len());
        assert!(report.failures.is_empty());

        let mut deployed: Vec<String> = std::fs::read_dir(layout.core())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        deployed.sort();
        assert_eq!(deployed, SUPPORT_MODULES);
        assert_eq!(
            std::fs::read(layout.core().join("MLG.Core.dll")).unwrap(),
            b"core"
        );
        assert!(layout.plugins().is_dir());
    }

    #[test]
    fn second_deploy_is_a_no_op() {
        let fixture = GameFixture::new("Game");
        let layout = FolderLayout::new(fixture.install_root());
        let deployer = deployer(&fixture);

        let first = deployer.deploy(&layout).unwrap();
        assert_eq!(first.copied(), SUPPORT_MODULES.len());

        let second = deployer.deploy(&layout).unwrap();
        assert!(matches!(second, DeployOutcome::AlreadyPresent));
        assert_eq!(second.copied(), 0);
        assert_eq!(
            std::fs::read_dir(layout.core()).unwrap().count(),
            SUPPORT_MODULES.len()
        );
    }

    #[test]
    fn existing_layout_is_never_overwritten() {
        let fixture = GameFixture::new("Game");
        let layout = FolderLayout::new(fixture.install_root());
        std::fs::create_dir_all(layout.core()).unwrap();
        std::fs::write(layout.core().join("MLG.Core.dll"), b"user copy").unwrap();

        let outcome = deployer(&fixture).deploy(&layout).unwrap();
        assert!(matches!(outcome, DeployOutcome::AlreadyPresent));
        assert_eq!(outcome.copied(), 0);
        assert_eq!(
            std::fs::read(layout.core().join("MLG.Core.dll")).unwrap(),
            b"user copy"
        );
        assert!(!layout.core().join("MLG.Bootstrap.dll").exists());
    }

    #[test]
    fn exclusions_ignore_case() {
        let fixture = GameFixture::new("Game");
        std::fs::write(fixture.installer_dir.join("Extra.DLL"), b"extra").unwrap();
        let deployer = DependencyDeployer::new(
            fixture.installer_dir.clone(),
            "dll",
            &["mlginstaller.dll".to_string(), "mlg.core.dll".to_string()],
        );

        let names: Vec<String> = deployer
            .modules()
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["Extra.DLL", "GodotPlugins.dll", "MLG.Bootstrap.dll"]);
    }

    #[test]
    fn missing_source_creates_nothing() {
        let fixture = GameFixture::new("Game");
        let layout = FolderLayout::new(fixture.install_root());
        let deployer =
            DependencyDeployer::new(fixture.root.path().join("missing"), "dll", &[]);

        let result = deployer.deploy(&layout);
        assert!(matches!(result, Err(DirectoryNotFound(_))));
        assert!(!layout.exists());
    }

    #[test]
    fn failed_copies_are_collected() {
        let fixture = GameFixture::new("Game");
        let core = fixture.root.path().join("core");
        std::fs::create_dir(&core).unwrap();

        let modules = vec![
            fixture.installer_dir.join("MLG.Bootstrap.dll"),
            fixture.installer_dir.join("Vanished.dll"),
            fixture.installer_dir.join("MLG.Core.dll"),
        ];
        let report = DependencyDeployer::copy_into(modules, &core);
        assert_eq!(report.copied, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            Deploy { file, .. } if file.ends_with("Vanished.dll")
        ));
        assert!(core.join("MLG.Core.dll").exists());
    }
}
