//! Impersonating a game module with the loader module.
//!
//! The shim is the loader module with the game module's identity: same assembly name, same
//! module file name and the same company, product and title strings. The host loads it from
//! the game module's path and cannot tell the two apart by inspection.

use std::path::Path;

use crate::{
    config::ShimConfig,
    metadata::{cilmodule::CilModule, tables::TableId},
    Error::{LoaderModuleNotFound, ModuleLoad, Serialization},
    Result,
};

/// What [`AssemblyShimmer`] changed in the loader module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimReport {
    /// The shim's assembly name
    pub name: String,
    /// Attribute types whose leading string was rewritten, in configuration order
    pub rewritten: Vec<String>,
}

/// Rewrites the loader module's identity.
#[derive(Debug, Clone, Default)]
pub struct AssemblyShimmer {
    config: ShimConfig,
}

impl AssemblyShimmer {
    /// Create a shimmer with `config`.
    #[must_use]
    pub fn new(config: ShimConfig) -> Self {
        AssemblyShimmer { config }
    }

    /// Write the loader module at `loader`, renamed to `target`, to `output`.
    ///
    /// # Errors
    /// - [`crate::Error::LoaderModuleNotFound`] if `loader` does not exist
    /// - [`crate::Error::ModuleLoad`] if `loader` is not a managed module
    /// - [`crate::Error::Serialization`] if the shim cannot be written
    pub fn shim(&self, loader: &Path, target: &str, output: &Path) -> Result<ShimReport> {
        if !loader.is_file() {
            return Err(LoaderModuleNotFound(loader.to_path_buf()));
        }

        let mut module = CilModule::from_file(loader).map_err(|error| ModuleLoad {
            path: loader.to_path_buf(),
            source: Box::new(error),
        })?;

        let report = self.shim_module(&mut module, target)?;

        module.write_to(output).map_err(|error| Serialization {
            path: output.to_path_buf(),
            source: Box::new(error),
        })?;

        log::info!("Wrote shim {} as {}", output.display(), report.name);
        Ok(report)
    }

    /// Rename `module` to `target` in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the module has no assembly manifest or an
    /// attribute cannot be decoded.
    pub fn shim_module(&self, module: &mut CilModule, target: &str) -> Result<ShimReport> {
        let previous = module.assembly_name()?.to_string();
        module.set_assembly_name(target)?;
        module.set_module_name(&format!("{target}.dll"))?;
        log::debug!("Renamed {previous} to {target}");

        let mut rewritten = Vec::new();
        for type_name in &self.config.attributes {
            let Some(attribute) = module.find_attribute(TableId::Assembly, 1, type_name)? else {
                log::warn!("{previous} has no {type_name}, left unchanged");
                continue;
            };

            if module.set_attribute_string(attribute, target)? {
                rewritten.push(type_name.clone());
            } else {
                log::warn!("{type_name} on {previous} takes no string argument");
            }
        }

        Ok(ShimReport {
            name: target.to_string(),
            rewritten,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::identity::{COMPANY_ATTRIBUTE, PRODUCT_ATTRIBUTE, TITLE_ATTRIBUTE},
        test::{ModuleBuilder, ENTRY_METHOD, ENTRY_TYPE, RETURN_HOOK_METHOD, TARGET_FRAMEWORK},
        Error,
    };

    #[test]
    fn identity_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let loader = dir.path().join("GodotPlugins.dll");
        let output = dir.path().join("Game.dll");
        ModuleBuilder::loader().write_to(&loader);

        let report = AssemblyShimmer::default()
            .shim(&loader, "Game", &output)
            .unwrap();
        assert_eq!(report.name, "Game");
        assert_eq!(
            report.rewritten,
            [COMPANY_ATTRIBUTE, PRODUCT_ATTRIBUTE, TITLE_ATTRIBUTE]
        );

        let shim = CilModule::from_file(&output).unwrap();
        let identity = shim.identity().unwrap();
        assert_eq!(identity.name, "Game");
        assert_eq!(identity.company(), Some("Game"));
        assert_eq!(identity.product(), Some("Game"));
        assert_eq!(identity.title(), Some("Game"));
        assert_eq!(shim.module_name().unwrap(), "Game.dll");

        // Everything else is the loader
        assert_eq!(
            identity.attribute(TARGET_FRAMEWORK),
            Some(".NETCoreApp,Version=v6.0")
        );
        assert_eq!(shim.find_methods(ENTRY_TYPE, ENTRY_METHOD).unwrap().len(), 1);
        assert_eq!(
            shim.find_methods(ENTRY_TYPE, RETURN_HOOK_METHOD).unwrap().len(),
            1
        );
    }

    #[test]
    fn named_arguments_survive() {
        let mut module = CilModule::from_mem(ModuleBuilder::loader().build()).unwrap();
        let framework = module
            .find_attribute(TableId::Assembly, 1, TARGET_FRAMEWORK)
            .unwrap()
            .unwrap();
        let before = module.attribute_string(framework).unwrap().unwrap();
        assert!(!before.tail.is_empty());

        let shimmer = AssemblyShimmer::new(ShimConfig {
            attributes: vec![TARGET_FRAMEWORK.to_string()],
        });
        let report = shimmer.shim_module(&mut module, "Game").unwrap();
        assert_eq!(report.rewritten, [TARGET_FRAMEWORK]);

        let after = module.attribute_string(framework).unwrap().unwrap();
        assert_eq!(after.value.as_deref(), Some("Game"));
        assert_eq!(after.tail, before.tail);
    }

    #[test]
    fn absent_attribute_is_reported() {
        let mut module = CilModule::from_mem(
            ModuleBuilder::loader()
                .without_attribute(TITLE_ATTRIBUTE)
                .build(),
        )
        .unwrap();

        let report = AssemblyShimmer::default()
            .shim_module(&mut module, "Game")
            .unwrap();
        assert_eq!(report.rewritten, [COMPANY_ATTRIBUTE, PRODUCT_ATTRIBUTE]);
        assert_eq!(module.identity().unwrap().title(), None);
    }

    #[test]
    fn loader_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = AssemblyShimmer::default().shim(
            &dir.path().join("GodotPlugins.dll"),
            "Game",
            &dir.path().join("Game.dll"),
        );
        assert!(matches!(result, Err(Error::LoaderModuleNotFound(_))));
        assert!(!dir.path().join("Game.dll").exists());
    }
}
