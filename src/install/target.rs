use std::path::{Path, PathBuf};

use crate::{
    config::FileNaming,
    install::FolderLayout,
    Error::{self, DirectoryNotFound},
    Result,
};

/// Every path the installer touches for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTarget {
    /// Game name, the executable's file stem
    pub name: String,
    /// The game executable
    pub executable: PathBuf,
    /// The `data_<name>_*` directory next to the executable
    pub data_dir: PathBuf,
    /// `<data>/<name>.dll`, the module the host loads
    pub module: PathBuf,
    /// `<data>/<name>_original.dll`, present while installed
    pub backup: PathBuf,
    /// `<data>/<name>_patched.dll`
    pub patched: PathBuf,
    /// `<data>/MLG`
    pub layout: FolderLayout,
}

impl GameTarget {
    /// Locate the game data of `executable`.
    ///
    /// The data directory is the lexicographically first directory next to the executable
    /// whose name starts with `data_<name>_`.
    ///
    /// # Errors
    /// Returns [`crate::Error::DirectoryNotFound`] if no data directory exists.
    pub fn from_executable(executable: &Path, naming: &FileNaming) -> Result<GameTarget> {
        let Some(name) = executable.file_stem().and_then(|stem| stem.to_str()) else {
            return Err(Error::Error(format!(
                "{} does not name a game executable",
                executable.display()
            )));
        };

        let parent = match executable.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = format!("data_{name}_");
        let not_found = || DirectoryNotFound(parent.join(format!("{prefix}*")));

        let entries = std::fs::read_dir(&parent).map_err(|_| not_found())?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect();
        candidates.sort();

        let Some(data_dir) = candidates.into_iter().next() else {
            return Err(not_found());
        };
        log::debug!("Game data of {name} in {}", data_dir.display());

        Ok(GameTarget::in_data_dir(name, executable, data_dir, naming))
    }

    /// Paths for game `name` whose data lives in `data_dir`.
    #[must_use]
    pub fn in_data_dir(
        name: &str,
        executable: &Path,
        data_dir: PathBuf,
        naming: &FileNaming,
    ) -> GameTarget {
        GameTarget {
            name: name.to_string(),
            executable: executable.to_path_buf(),
            module: data_dir.join(naming.module(name)),
            backup: data_dir.join(naming.backup(name)),
            patched: data_dir.join(naming.patched(name)),
            layout: FolderLayout::new(data_dir.join(&naming.install_root)),
            data_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data_Game_windows_x86_64")).unwrap();
        std::fs::create_dir(dir.path().join("data_Game_linuxbsd_x86_64")).unwrap();
        std::fs::create_dir(dir.path().join("data_Other_windows_x86_64")).unwrap();
        std::fs::write(dir.path().join("data_Game_file"), b"").unwrap();

        let exe = dir.path().join("Game.exe");
        let target = GameTarget::from_executable(&exe, &FileNaming::default()).unwrap();
        let data = dir.path().join("data_Game_linuxbsd_x86_64");
        assert_eq!(target.name, "Game");
        assert_eq!(target.data_dir, data);
        assert_eq!(target.module, data.join("Game.dll"));
        assert_eq!(target.backup, data.join("Game_original.dll"));
        assert_eq!(target.patched, data.join("Game_patched.dll"));
        assert_eq!(target.layout.root(), data.join("MLG"));
    }

    #[test]
    fn data_directory_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data_Other_windows_x86_64")).unwrap();

        let result = GameTarget::from_executable(&dir.path().join("Game.exe"), &FileNaming::default());
        assert!(matches!(result, Err(DirectoryNotFound(_))));

        let result = GameTarget::from_executable(
            &dir.path().join("missing").join("Game.exe"),
            &FileNaming::default(),
        );
        assert!(matches!(result, Err(DirectoryNotFound(_))));
    }
}
