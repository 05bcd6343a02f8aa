use std::path::{Path, PathBuf};

use crate::{config::FileNaming, install::FolderLayout};

/// Resolves support module requests to files in the install root's `core` directory.
///
/// The host runtime does not know about the install root, so the bridge registers this
/// with [`super::ModuleRuntime::install_resolver`] before loading the patched module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResolver {
    search_dir: PathBuf,
    extension: String,
}

impl DependencyResolver {
    /// Resolve `<search_dir>/<simple name>.<extension>`.
    #[must_use]
    pub fn new(search_dir: PathBuf, extension: &str) -> Self {
        DependencyResolver {
            search_dir,
            extension: extension.to_string(),
        }
    }

    /// Resolve into the `core` directory of `layout`.
    #[must_use]
    pub fn for_layout(layout: &FolderLayout, naming: &FileNaming) -> Self {
        Self::new(layout.core(), &naming.module_extension)
    }

    /// Directory searched for support modules.
    #[must_use]
    pub fn search_dir(&self) -> &Path {
        &self.search_dir
    }

    /// Path of the module requested by `display_name`, if it exists.
    ///
    /// `display_name` is an assembly display name such as
    /// `MLG.Core, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null`; only the simple
    /// name is used.
    #[must_use]
    pub fn resolve(&self, display_name: &str) -> Option<PathBuf> {
        let name = simple_name(display_name)?;
        let path = self.search_dir.join(format!("{name}.{}", self.extension));

        if path.is_file() {
            log::debug!("Resolved {name} to {}", path.display());
            Some(path)
        } else {
            log::trace!("{name} is not a support module");
            None
        }
    }
}

/// The simple name of an assembly display name.
///
/// Returns `None` for an empty name or one that would leave the search directory.
#[must_use]
pub fn simple_name(display_name: &str) -> Option<&str> {
    let name = display_name.split(',').next()?.trim();
    if name.is_empty() || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}
