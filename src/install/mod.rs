//! Reversible installation into a game's data directory.
//!
//! An installed game has four artifacts next to its module:
//!
//! ```text
//! data_<name>_<platform>/
//!     <name>.dll            the shim, the loader module impersonating the game
//!     <name>_original.dll   byte-identical backup of the game module
//!     <name>_patched.dll    the backup with the payload hooks inserted
//!     MLG/                  support modules and plugin directories
//! ```
//!
//! [`InstallationManager`] derives the install state from which of these exist, so an
//! interrupted install is detected on the next run and repaired by [`InstallationManager::clean`].
//! Only one installer may work on a game at a time; this is not enforced.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mlg::{config::InstallerConfig, install::InstallationManager};
//! use std::path::Path;
//!
//! let manager = InstallationManager::new(InstallerConfig::default());
//! let target = manager.target(Path::new("Game.exe"))?;
//! manager.install(&target)?;
//! # Ok::<(), mlg::Error>(())
//! ```

mod deploy;
mod layout;
mod target;

pub use deploy::{DependencyDeployer, DeployOutcome, DeployReport};
pub use layout::{FolderLayout, SUBDIRECTORIES};
pub use target::GameTarget;

use std::path::Path;

use crate::{
    config::InstallerConfig,
    metadata::cilmodule::CilModule,
    shim::{AssemblyShimmer, ShimReport},
    BytecodePatcher,
    Error::{LoaderModuleNotFound, ModuleLoad},
    PatchReport, Result,
};

/// Which installation artifacts exist when the state is neither clean nor complete.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialInstall {
    /// `<name>_original.dll` exists
    pub backup: bool,
    /// `<name>.dll` exists
    pub module: bool,
    /// `<name>_patched.dll` exists
    pub patched: bool,
    /// The install root exists
    pub layout: bool,
}

/// Installation state of a game, derived from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Neither a backup nor an install root exists
    Absent,
    /// Backup, install root and module all exist
    Installed,
    /// Any other combination, left behind by an interrupted install or uninstall
    PartiallyInstalled(PartialInstall),
}

/// What a successful install did.
#[derive(Debug)]
pub struct InstallReport {
    /// A partial installation was cleaned up first
    pub repaired: bool,
    /// Edits made to the patched module
    pub patch: PatchReport,
    /// Identity given to the shim
    pub shim: ShimReport,
    /// Support module deployment
    pub deployed: DeployOutcome,
}

/// Result of [`InstallationManager::install`].
#[derive(Debug)]
pub enum InstallOutcome {
    /// The game was already installed; nothing changed
    AlreadyInstalled,
    /// The game is now installed
    Installed(InstallReport),
}

/// What [`InstallationManager::clean`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// The backup was moved back over the module
    pub restored: bool,
    /// The patched module was deleted
    pub removed_patched: bool,
    /// The install root was deleted
    pub removed_layout: bool,
}

impl CleanReport {
    /// Returns `true` if nothing was found to clean.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.restored || self.removed_patched || self.removed_layout)
    }
}

/// Result of [`InstallationManager::uninstall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// No backup exists; no file was touched
    NothingToDo,
    /// The original module is back in place
    Uninstalled(CleanReport),
}

/// Installs, uninstalls and repairs the loader in game directories.
#[derive(Debug, Clone)]
pub struct InstallationManager {
    config: InstallerConfig,
}

impl InstallationManager {
    /// Create a manager with `config`.
    #[must_use]
    pub fn new(config: InstallerConfig) -> Self {
        InstallationManager { config }
    }

    /// The manager's settings.
    #[must_use]
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Locate the game data of `executable` with the configured naming.
    ///
    /// # Errors
    /// Returns [`crate::Error::DirectoryNotFound`] if the game has no data directory.
    pub fn target(&self, executable: &Path) -> Result<GameTarget> {
        GameTarget::from_executable(executable, &self.config.naming)
    }

    /// Current installation state of `target`.
    #[must_use]
    pub fn state(&self, target: &GameTarget) -> InstallState {
        let flags = PartialInstall {
            backup: target.backup.is_file(),
            module: target.module.is_file(),
            patched: target.patched.is_file(),
            layout: target.layout.exists(),
        };

        match (flags.backup, flags.layout) {
            (false, false) => InstallState::Absent,
            (true, true) if flags.module => InstallState::Installed,
            _ => InstallState::PartiallyInstalled(flags),
        }
    }

    /// Install the loader into `target`.
    ///
    /// A partial installation is cleaned up first. The game module is backed up, the backup
    /// is patched into the patched module, the shim replaces the game module, and the support
    /// modules are deployed last. An error after the backup leaves a partial installation.
    ///
    /// # Errors
    /// - [`crate::Error::LoaderModuleNotFound`] if the installer directory has no loader module
    /// - [`crate::Error::AnchorNotFound`] and the other patcher errors if the game module
    ///   cannot be patched
    /// - [`crate::Error::FileError`] on filesystem failures
    pub fn install(&self, target: &GameTarget) -> Result<InstallOutcome> {
        let repaired = match self.state(target) {
            InstallState::Installed => {
                log::info!("{} is already installed", target.name);
                return Ok(InstallOutcome::AlreadyInstalled);
            }
            InstallState::PartiallyInstalled(flags) => {
                log::warn!("{} is partially installed ({flags:?}), cleaning up", target.name);
                self.clean(target)?;
                true
            }
            InstallState::Absent => false,
        };

        let loader = self.config.installer_dir.join(&self.config.loader_module);
        if !loader.is_file() {
            return Err(LoaderModuleNotFound(loader));
        }

        std::fs::copy(&target.module, &target.backup)?;
        log::info!("Backed up {}", target.module.display());

        let identity = CilModule::from_file(&target.backup)
            .and_then(|module| module.identity())
            .map_err(|error| ModuleLoad {
                path: target.backup.clone(),
                source: Box::new(error),
            })?;

        let mut patch_config = self.config.patch.clone();
        patch_config.return_hook_type.assembly = Some(identity.name.clone());
        let patch = BytecodePatcher::new(patch_config).patch(&target.backup, &target.patched)?;

        let shim = AssemblyShimmer::new(self.config.shim.clone()).shim(
            &loader,
            &identity.name,
            &target.module,
        )?;

        let deployed = DependencyDeployer::new(
            self.config.installer_dir.clone(),
            &self.config.naming.module_extension,
            &self.config.excluded,
        )
        .deploy(&target.layout)?;

        log::info!("Installed into {}", target.data_dir.display());
        Ok(InstallOutcome::Installed(InstallReport {
            repaired,
            patch,
            shim,
            deployed,
        }))
    }

    /// Put the original game module back and remove everything the install added.
    ///
    /// Without a backup nothing is touched.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on filesystem failures.
    pub fn uninstall(&self, target: &GameTarget) -> Result<UninstallOutcome> {
        if !target.backup.is_file() {
            log::info!("{} has no backup, nothing to uninstall", target.name);
            return Ok(UninstallOutcome::NothingToDo);
        }

        let report = self.clean(target)?;
        log::info!("Uninstalled from {}", target.data_dir.display());
        Ok(UninstallOutcome::Uninstalled(report))
    }

    /// Restore the backup if there is one, then delete the patched module and the install root.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on filesystem failures.
    pub fn clean(&self, target: &GameTarget) -> Result<CleanReport> {
        let mut report = CleanReport::default();

        if target.backup.is_file() {
            remove_if_present(&target.module)?;
            std::fs::copy(&target.backup, &target.module)?;
            std::fs::remove_file(&target.backup)?;
            log::info!("Restored {}", target.module.display());
            report.restored = true;
        }

        report.removed_patched = remove_if_present(&target.patched)?;
        report.removed_layout = target.layout.remove()?;
        Ok(report)
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }

    std::fs::remove_file(path)?;
    log::debug!("Deleted {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{GameFixture, ModuleBuilder, ENTRY_METHOD, ENTRY_TYPE, SUPPORT_MODULES},
        Error,
    };

    fn manager(fixture: &GameFixture) -> (InstallationManager, GameTarget) {
        let manager = InstallationManager::new(fixture.config());
        let target = manager.target(&fixture.exe).unwrap();
        (manager, target)
    }

    #[test]
    fn install_game() {
        let fixture = GameFixture::new("Game");
        let original = std::fs::read(fixture.module()).unwrap();
        let (manager, target) = manager(&fixture);
        assert_eq!(manager.state(&target), InstallState::Absent);

        let InstallOutcome::Installed(report) = manager.install(&target).unwrap() else {
            panic!("expected an installation");
        };
        assert!(!report.repaired);
        assert_eq!(report.patch.new_name, "Game.Patched");
        assert_eq!(report.shim.name, "Game");
        assert_eq!(report.deployed.copied(), SUPPORT_MODULES.len());
        assert_eq!(manager.state(&target), InstallState::Installed);

        assert_eq!(std::fs::read(fixture.backup()).unwrap(), original);

        let shim = CilModule::from_file(&fixture.module()).unwrap();
        assert_eq!(shim.identity().unwrap().name, "Game");
        assert_eq!(shim.identity().unwrap().product(), Some("Game"));
        assert_eq!(shim.find_methods(ENTRY_TYPE, ENTRY_METHOD).unwrap().len(), 1);

        let patched = CilModule::from_file(&fixture.patched()).unwrap();
        assert_eq!(patched.assembly_name().unwrap(), "Game.Patched");

        for module in SUPPORT_MODULES {
            assert!(fixture.install_root().join("core").join(module).is_file());
        }
        assert!(!fixture
            .install_root()
            .join("core")
            .join("MLGInstaller.dll")
            .exists());
        assert!(!fixture.install_root().join("core").join("README.txt").exists());
    }

    #[test]
    fn uninstall_restores_original_bytes() {
        let fixture = GameFixture::new("Game");
        let before = fixture.snapshot();
        let (manager, target) = manager(&fixture);

        manager.install(&target).unwrap();
        assert_ne!(fixture.snapshot(), before);

        let UninstallOutcome::Uninstalled(report) = manager.uninstall(&target).unwrap() else {
            panic!("expected an uninstall");
        };
        assert!(report.restored && report.removed_patched && report.removed_layout);
        assert_eq!(fixture.snapshot(), before);
        assert_eq!(manager.state(&target), InstallState::Absent);
    }

    #[test]
    fn install_is_idempotent() {
        let fixture = GameFixture::new("Game");
        let (manager, target) = manager(&fixture);

        manager.install(&target).unwrap();
        let installed = fixture.snapshot();

        let outcome = manager.install(&target).unwrap();
        assert!(matches!(outcome, InstallOutcome::AlreadyInstalled));
        assert_eq!(fixture.snapshot(), installed);
    }

    #[test]
    fn uninstall_without_backup_touches_nothing() {
        let fixture = GameFixture::new("Game");
        let (manager, target) = manager(&fixture);
        std::fs::create_dir_all(fixture.install_root().join("plugins")).unwrap();
        let before = fixture.snapshot();

        assert_eq!(
            manager.uninstall(&target).unwrap(),
            UninstallOutcome::NothingToDo
        );
        assert_eq!(fixture.snapshot(), before);
    }

    #[test]
    fn failed_patch_leaves_partial_install() {
        let fixture = GameFixture::with_game("Game", &ModuleBuilder::game("Game").without_anchor());
        let before = fixture.snapshot();
        let (manager, target) = manager(&fixture);

        let result = manager.install(&target);
        assert!(matches!(result, Err(Error::AnchorNotFound { .. })));
        assert!(!fixture.patched().exists());
        assert!(!fixture.install_root().exists());

        let InstallState::PartiallyInstalled(flags) = manager.state(&target) else {
            panic!("expected a partial install");
        };
        assert!(flags.backup && flags.module && !flags.layout && !flags.patched);

        let report = manager.clean(&target).unwrap();
        assert!(report.restored);
        assert_eq!(manager.state(&target), InstallState::Absent);
        assert_eq!(fixture.snapshot(), before);
    }

    #[test]
    fn partial_install_is_repaired() {
        let fixture = GameFixture::new("Game");
        let original = std::fs::read(fixture.module()).unwrap();
        let (manager, target) = manager(&fixture);

        manager.install(&target).unwrap();
        // Interrupted uninstall: layout gone, shim still in place
        std::fs::remove_dir_all(fixture.install_root()).unwrap();
        assert!(matches!(
            manager.state(&target),
            InstallState::PartiallyInstalled(PartialInstall {
                backup: true,
                layout: false,
                ..
            })
        ));

        let InstallOutcome::Installed(report) = manager.install(&target).unwrap() else {
            panic!("expected an installation");
        };
        assert!(report.repaired);
        assert_eq!(manager.state(&target), InstallState::Installed);
        assert_eq!(std::fs::read(fixture.backup()).unwrap(), original);
    }

    #[test]
    fn stray_layout_is_partial() {
        let fixture = GameFixture::new("Game");
        let (manager, target) = manager(&fixture);
        std::fs::create_dir_all(fixture.install_root()).unwrap();

        assert!(matches!(
            manager.state(&target),
            InstallState::PartiallyInstalled(PartialInstall {
                backup: false,
                module: true,
                layout: true,
                ..
            })
        ));

        let report = manager.clean(&target).unwrap();
        assert!(!report.restored && report.removed_layout);
        assert!(manager.clean(&target).unwrap().is_empty());
    }

    #[test]
    fn loader_module_required() {
        let fixture = GameFixture::new("Game");
        std::fs::remove_file(fixture.installer_dir.join("GodotPlugins.dll")).unwrap();
        let before = fixture.snapshot();
        let (manager, target) = manager(&fixture);

        let result = manager.install(&target);
        assert!(matches!(result, Err(Error::LoaderModuleNotFound(_))));
        assert_eq!(fixture.snapshot(), before);
    }
}
