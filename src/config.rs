//! Configuration for the patcher, shimmer, installer and runtime bridge.
//!
//! Every component takes a plain data struct with a [`Default`] matching the Godot DotNet
//! layout, so callers only override what differs for their game.

use std::{path::PathBuf, time::Duration};

use crate::metadata::identity::{COMPANY_ATTRIBUTE, PRODUCT_ATTRIBUTE, TITLE_ATTRIBUTE};

/// A type in a (possibly external) assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReference {
    /// Simple name of the defining assembly, `None` for an assembly named like the patched
    /// module before renaming
    pub assembly: Option<String>,
    /// Namespace of the type
    pub namespace: String,
    /// Name of the type
    pub name: String,
}

impl TypeReference {
    /// Type `namespace.name` defined in `assembly`.
    #[must_use]
    pub fn new(assembly: Option<&str>, namespace: &str, name: &str) -> Self {
        TypeReference {
            assembly: assembly.map(str::to_string),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// `Namespace.Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Which call in the entry method the payload hook is inserted after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorPattern {
    /// Name of the called method
    pub method: String,
    /// Full name of the declaring type, any type if `None`
    pub declaring_type: Option<String>,
}

/// Settings for [`crate::BytecodePatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    /// Full name of the type declaring the entry method
    pub entry_type: String,
    /// Name of the entry method
    pub entry_method: String,
    /// Parameter count selecting among overloads, first match if `None`
    pub entry_param_count: Option<usize>,
    /// The call the payload hook follows
    pub anchor: AnchorPattern,
    /// Type whose assembly is handed to the anchor method
    pub hook_type: TypeReference,
    /// Type declaring the method called before every return
    pub return_hook_type: TypeReference,
    /// Name of the method called before every return
    pub return_hook_method: String,
    /// Attribute removed from the entry method
    pub blocking_attribute: String,
    /// Appended to the assembly name
    pub rename_suffix: String,
}

impl Default for PatchConfig {
    /// The Godot layout, with the return hook resolved in an assembly named like the module
    /// being patched.
    fn default() -> Self {
        PatchConfig {
            entry_type: "GodotPlugins.Game.Main".to_string(),
            entry_method: "InitializeFromGameProject".to_string(),
            entry_param_count: Some(4),
            anchor: AnchorPattern {
                method: "LookupScriptsInAssembly".to_string(),
                declaring_type: None,
            },
            hook_type: TypeReference::new(Some("MLG.Bootstrap"), "MLG.Bootstrap", "Bootstrap"),
            return_hook_type: TypeReference::new(None, "GodotPlugins.Game", "Main"),
            return_hook_method: "WaitForSceneTree".to_string(),
            blocking_attribute: "System.Runtime.InteropServices.UnmanagedCallersOnlyAttribute"
                .to_string(),
            rename_suffix: ".Patched".to_string(),
        }
    }
}

impl PatchConfig {
    /// The Godot layout with the return hook in the shim assembly `shim_assembly`.
    #[must_use]
    pub fn godot(shim_assembly: &str) -> Self {
        let mut config = PatchConfig::default();
        config.return_hook_type.assembly = Some(shim_assembly.to_string());
        config
    }
}

/// Settings for [`crate::AssemblyShimmer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConfig {
    /// Full names of the assembly attributes whose leading string is rewritten
    pub attributes: Vec<String>,
}

impl Default for ShimConfig {
    fn default() -> Self {
        ShimConfig {
            attributes: [COMPANY_ATTRIBUTE, PRODUCT_ATTRIBUTE, TITLE_ATTRIBUTE]
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
        }
    }
}

/// File and directory names shared by the installer and the runtime bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    /// Suffix of the preserved game module, `<name>_original.dll`
    pub backup_suffix: String,
    /// Suffix of the patched game module, `<name>_patched.dll`
    pub patched_suffix: String,
    /// Extension of managed modules, without the dot
    pub module_extension: String,
    /// Name of the install root inside the data directory
    pub install_root: String,
}

impl Default for FileNaming {
    fn default() -> Self {
        FileNaming {
            backup_suffix: "_original".to_string(),
            patched_suffix: "_patched".to_string(),
            module_extension: "dll".to_string(),
            install_root: "MLG".to_string(),
        }
    }
}

impl FileNaming {
    /// `<name>.<ext>`
    #[must_use]
    pub fn module(&self, name: &str) -> String {
        format!("{name}.{}", self.module_extension)
    }

    /// `<name><backup suffix>.<ext>`
    #[must_use]
    pub fn backup(&self, name: &str) -> String {
        format!("{name}{}.{}", self.backup_suffix, self.module_extension)
    }

    /// `<name><patched suffix>.<ext>`
    #[must_use]
    pub fn patched(&self, name: &str) -> String {
        format!("{name}{}.{}", self.patched_suffix, self.module_extension)
    }
}

/// Settings for [`crate::install::InstallationManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    /// File name of the loader module used as the shim template
    pub loader_module: String,
    /// Directory holding the loader module and the support modules
    pub installer_dir: PathBuf,
    /// File names never deployed as support modules
    pub excluded: Vec<String>,
    /// Module and directory names
    pub naming: FileNaming,
    /// Patcher settings; the return hook assembly is set per game
    pub patch: PatchConfig,
    /// Shimmer settings
    pub shim: ShimConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let installer_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        InstallerConfig {
            loader_module: "GodotPlugins.dll".to_string(),
            installer_dir,
            excluded: vec!["MLGInstaller.dll".to_string()],
            naming: FileNaming::default(),
            patch: PatchConfig::default(),
            shim: ShimConfig::default(),
        }
    }
}

impl InstallerConfig {
    /// Default settings with modules taken from `installer_dir`.
    #[must_use]
    pub fn with_installer_dir(installer_dir: PathBuf) -> Self {
        InstallerConfig {
            installer_dir,
            ..InstallerConfig::default()
        }
    }
}

/// How long and how often the bridge polls for the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Delay between polls
    pub interval: Duration,
    /// Polls before giving up, unbounded if `None`
    ///
    /// The graph is always polled once, so `Some(0)` gives up after the first poll like `Some(1)`.
    pub max_attempts: Option<u64>,
}

impl ReadinessPolicy {
    /// Poll every `interval`, at most `max_attempts` times and at least once.
    #[must_use]
    pub fn bounded(interval: Duration, max_attempts: u64) -> Self {
        ReadinessPolicy {
            interval,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Poll every `interval` until ready or cancelled.
    #[must_use]
    pub fn unbounded(interval: Duration) -> Self {
        ReadinessPolicy {
            interval,
            max_attempts: None,
        }
    }
}

impl Default for ReadinessPolicy {
    /// 100 ms polls for up to five minutes.
    fn default() -> Self {
        ReadinessPolicy::bounded(Duration::from_millis(100), 3000)
    }
}

/// The plugin loader brought up once the scene graph is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLoaderPayload {
    /// Resource pack mounted into the host's resource system
    pub resource_pack: String,
    /// Module file name inside the host's user data directory
    pub loader_module: String,
    /// Scene instantiated and attached to the scene graph root
    pub scene: String,
}

impl Default for PluginLoaderPayload {
    fn default() -> Self {
        PluginLoaderPayload {
            resource_pack: "user://PluginLoader.pck".to_string(),
            loader_module: "plugin-loader.dll".to_string(),
            scene: "res://plugin_loader.tscn".to_string(),
        }
    }
}

/// Settings for [`crate::bridge::BridgeContext`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    /// Scene graph polling
    pub readiness: ReadinessPolicy,
    /// Plugin loader brought up when ready
    pub payload: PluginLoaderPayload,
    /// Module and directory names, matching the installer's
    pub naming: FileNaming,
    /// Patcher settings; the return hook assembly is set from the shim's own name
    pub patch: PatchConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn godot_preset() {
        let config = PatchConfig::godot("Game");
        assert_eq!(config.return_hook_type.assembly.as_deref(), Some("Game"));
        assert_eq!(config.return_hook_type.full_name(), "GodotPlugins.Game.Main");
        assert_eq!(config.hook_type.full_name(), "MLG.Bootstrap.Bootstrap");
        assert_eq!(PatchConfig::default().return_hook_type.assembly, None);
    }

    #[test]
    fn naming() {
        let naming = FileNaming::default();
        assert_eq!(naming.module("Game"), "Game.dll");
        assert_eq!(naming.backup("Game"), "Game_original.dll");
        assert_eq!(naming.patched("Game"), "Game_patched.dll");
    }

    #[test]
    fn readiness_defaults() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(100));
        assert_eq!(policy.max_attempts, Some(3000));
        assert_eq!(ReadinessPolicy::unbounded(policy.interval).max_attempts, None);
    }

    #[test]
    fn zero_bound_polls_once() {
        let policy = ReadinessPolicy::bounded(Duration::from_millis(100), 0);
        assert_eq!(policy.max_attempts, Some(1));
    }
}
