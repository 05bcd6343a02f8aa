//! Synthetic modules and game directories for tests.
//!
//! No sample binaries are shipped; [`ModuleBuilder`] emits the two module shapes the crate
//! works on and [`GameFixture`] lays out a game next to an installer directory. The bridge is
//! driven through [`FakeRuntime`] and [`RecordingHost`].

mod bridge;

pub use bridge::{EntryBehavior, FakeRuntime, RecordingHost};
pub use builder::ModuleBuilder;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::config::InstallerConfig;

pub const ENTRY_TYPE: &str = "GodotPlugins.Game.Main";
pub const ENTRY_METHOD: &str = "InitializeFromGameProject";
pub const ANCHOR_METHOD: &str = "LookupScriptsInAssembly";
pub const RETURN_HOOK_METHOD: &str = "WaitForSceneTree";
pub const BLOCKING_ATTRIBUTE: &str =
    "System.Runtime.InteropServices.UnmanagedCallersOnlyAttribute";
pub const TARGET_FRAMEWORK: &str = "System.Runtime.Versioning.TargetFrameworkAttribute";

/// Support modules placed in the fixture's installer directory.
pub const SUPPORT_MODULES: [&str; 3] = ["GodotPlugins.dll", "MLG.Bootstrap.dll", "MLG.Core.dll"];

/// A game installation and an installer directory inside one temporary directory.
///
/// ```text
/// <root>/game/<name>.exe
/// <root>/game/data_<name>_windows_x86_64/<name>.dll
/// <root>/installer/GodotPlugins.dll
/// <root>/installer/MLG.Bootstrap.dll
/// <root>/installer/MLG.Core.dll
/// <root>/installer/MLGInstaller.dll
/// <root>/installer/README.txt
/// ```
pub struct GameFixture {
    pub root: TempDir,
    pub name: String,
    pub exe: PathBuf,
    pub data_dir: PathBuf,
    pub installer_dir: PathBuf,
}

impl GameFixture {
    pub fn new(name: &str) -> Self {
        Self::with_game(name, &ModuleBuilder::game(name))
    }

    pub fn with_game(name: &str, game: &ModuleBuilder) -> Self {
        let root = tempfile::tempdir().unwrap();
        let game_dir = root.path().join("game");
        let data_dir = game_dir.join(format!("data_{name}_windows_x86_64"));
        let installer_dir = root.path().join("installer");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&installer_dir).unwrap();

        let exe = game_dir.join(format!("{name}.exe"));
        std::fs::write(&exe, b"MZ").unwrap();
        game.write_to(&data_dir.join(format!("{name}.dll")));

        ModuleBuilder::loader().write_to(&installer_dir.join("GodotPlugins.dll"));
        std::fs::write(installer_dir.join("MLG.Bootstrap.dll"), b"bootstrap").unwrap();
        std::fs::write(installer_dir.join("MLG.Core.dll"), b"core").unwrap();
        std::fs::write(installer_dir.join("MLGInstaller.dll"), b"installer").unwrap();
        std::fs::write(installer_dir.join("README.txt"), b"readme").unwrap();

        GameFixture {
            root,
            name: name.to_string(),
            exe,
            data_dir,
            installer_dir,
        }
    }

    pub fn config(&self) -> InstallerConfig {
        InstallerConfig::with_installer_dir(self.installer_dir.clone())
    }

    pub fn module(&self) -> PathBuf {
        self.data_dir.join(format!("{}.dll", self.name))
    }

    pub fn backup(&self) -> PathBuf {
        self.data_dir.join(format!("{}_original.dll", self.name))
    }

    pub fn patched(&self) -> PathBuf {
        self.data_dir.join(format!("{}_patched.dll", self.name))
    }

    pub fn install_root(&self) -> PathBuf {
        self.data_dir.join("MLG")
    }

    /// Every file below the game directory with its contents.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect(&self.root.path().join("game"), &mut files);
        files
    }
}

fn collect(dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.insert(path.clone(), Vec::new());
            collect(&path, files);
        } else {
            files.insert(path.clone(), std::fs::read(&path).unwrap());
        }
    }
}
