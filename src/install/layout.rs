use std::path::{Path, PathBuf};

use crate::Result;

/// Subdirectories of the install root.
pub const SUBDIRECTORIES: [&str; 4] = ["config", "core", "lib", "plugins"];

/// The install root and its four subdirectories.
///
/// Existence of the root is what marks the layout as present; subdirectories are never
/// checked individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    root: PathBuf,
}

impl FolderLayout {
    /// Layout rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        FolderLayout { root }
    }

    /// The install root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration directory.
    #[must_use]
    pub fn config(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Support modules, the dependency resolver's search directory.
    #[must_use]
    pub fn core(&self) -> PathBuf {
        self.root.join("core")
    }

    /// Libraries shared by plugins.
    #[must_use]
    pub fn lib(&self) -> PathBuf {
        self.root.join("lib")
    }

    /// Plugin modules.
    #[must_use]
    pub fn plugins(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Returns `true` if the install root exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Create the root and all subdirectories.
    ///
    /// Returns `false` without touching anything if the root already exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if a directory cannot be created.
    pub fn create(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }

        for directory in SUBDIRECTORIES {
            std::fs::create_dir_all(self.root.join(directory))?;
        }
        log::info!("Created {}", self.root.display());
        Ok(true)
    }

    /// Delete the root and everything below it.
    ///
    /// Returns `false` if the root did not exist.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the tree cannot be removed.
    pub fn remove(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }

        std::fs::remove_dir_all(&self.root)?;
        log::info!("Removed {}", self.root.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FolderLayout::new(dir.path().join("MLG"));
        assert!(!layout.exists());

        assert!(layout.create().unwrap());
        for directory in SUBDIRECTORIES {
            assert!(layout.root().join(directory).is_dir());
        }
        assert_eq!(layout.core(), dir.path().join("MLG").join("core"));

        std::fs::write(layout.plugins().join("plugin.dll"), b"plugin").unwrap();
        assert!(!layout.create().unwrap());
        assert!(layout.plugins().join("plugin.dll").exists());

        assert!(layout.remove().unwrap());
        assert!(!layout.exists());
        assert!(!layout.remove().unwrap());
    }
}
