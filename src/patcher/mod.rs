//! Offline rewriting of a game module's entry method.
//!
//! [`BytecodePatcher`] turns the host's script registration call into an injection point: the
//! same call is repeated for the hook assembly right after the original, and a second hook is
//! called with the entry method's arguments before every return. The entry method loses the
//! attribute that keeps it from being invoked indirectly and the assembly is renamed, so the
//! patched module can load next to the shim that impersonates the original.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mlg::{BytecodePatcher, PatchConfig};
//! use std::path::Path;
//!
//! let patcher = BytecodePatcher::new(PatchConfig::godot("Game"));
//! let report = patcher.patch(Path::new("Game_original.dll"), Path::new("Game_patched.dll"))?;
//! println!("{} is now {}", report.entry_token, report.new_name);
//! # Ok::<(), mlg::Error>(())
//! ```

mod imports;

use std::path::Path;

use crate::{
    assembly::{is_call, op, Instruction, InstructionStream},
    config::PatchConfig,
    metadata::{cilmodule::CilModule, tables::TableId, token::Token},
    Error::{AnchorNotFound, EntryNotFound, ModuleLoad, Serialization},
    Result,
};

use imports::HookReferences;

/// What [`BytecodePatcher`] changed in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// The rewritten entry method
    pub entry_token: Token,
    /// Byte offset of the anchor call in the original body
    pub anchor_offset: usize,
    /// Number of return instructions that received the return hook
    pub return_sites: usize,
    /// `true` if the blocking attribute was present and removed
    pub removed_attribute: bool,
    /// The assembly's new name
    pub new_name: String,
}

/// Inserts the payload and return hooks into a module's entry method.
#[derive(Debug, Clone, Default)]
pub struct BytecodePatcher {
    config: PatchConfig,
}

impl BytecodePatcher {
    /// Create a patcher with `config`.
    #[must_use]
    pub fn new(config: PatchConfig) -> Self {
        BytecodePatcher { config }
    }

    /// The patcher's configuration.
    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Patch the module at `original` and write the result to `output`.
    ///
    /// `original` is only read. Nothing is written unless every edit succeeds.
    ///
    /// # Errors
    /// - [`crate::Error::ModuleLoad`] if `original` is unreadable or not a managed module
    /// - [`crate::Error::EntryNotFound`] if the entry type or method is missing
    /// - [`crate::Error::AnchorNotFound`] if the entry method never calls the anchor
    /// - [`crate::Error::Serialization`] if the output cannot be encoded or written
    pub fn patch(&self, original: &Path, output: &Path) -> Result<PatchReport> {
        let mut module = CilModule::from_file(original).map_err(|error| ModuleLoad {
            path: original.to_path_buf(),
            source: Box::new(error),
        })?;

        let report = self.patch_module(&mut module)?;

        module.write_to(output).map_err(|error| Serialization {
            path: output.to_path_buf(),
            source: Box::new(error),
        })?;

        log::info!(
            "Patched {} into {} ({} return sites)",
            original.display(),
            output.display(),
            report.return_sites
        );
        Ok(report)
    }

    /// Apply every edit to `module` in memory.
    ///
    /// On error `module` may hold imported references but no rewritten body.
    ///
    /// # Errors
    /// See [`BytecodePatcher::patch`], except for loading and serialization.
    pub fn patch_module(&self, module: &mut CilModule) -> Result<PatchReport> {
        let config = &self.config;
        let original_name = module.assembly_name()?.to_string();
        let entry = self.find_entry(module)?;
        let entry_token = Token::for_row(TableId::MethodDef, entry);
        let method_label = format!("{}::{}", config.entry_type, config.entry_method);

        let body = module.method_body(entry)?;
        let mut stream = InstructionStream::from_body(&body)?;
        log::debug!(
            "{method_label} has {} instructions, {} exception clauses",
            stream.len(),
            stream.clauses().len()
        );

        let Some(anchor) = stream.position(|instruction| self.is_anchor(module, instruction))
        else {
            return Err(AnchorNotFound {
                method: method_label,
                anchor: config.anchor.method.clone(),
            });
        };
        let anchor_offset = stream.instructions()[..anchor]
            .iter()
            .map(Instruction::size)
            .sum();
        let Some(anchor_target) = stream.instructions()[anchor].token() else {
            return Err(malformed_error!("Anchor call has no target token"));
        };
        log::debug!("Anchor {anchor_target} found at IL_{anchor_offset:04x}");

        let signature = module.method_signature(entry)?;
        let references = HookReferences::import(module, config, &original_name, &signature)?;

        stream.insert_after(
            anchor,
            vec![
                Instruction::with_token(op::LDTOKEN, references.hook_type),
                Instruction::with_token(op::CALL, references.get_type_from_handle),
                Instruction::with_token(op::CALLVIRT, references.get_assembly),
                Instruction::with_token(op::CALL, anchor_target),
            ],
        )?;

        let argument_count = signature.argument_count();
        let mut return_hook = Vec::with_capacity(argument_count + 1);
        for index in 0..argument_count {
            let index = u16::try_from(index)
                .map_err(|_| malformed_error!("Too many arguments - {}", argument_count))?;
            return_hook.push(Instruction::ldarg(index));
        }
        return_hook.push(Instruction::with_token(op::CALL, references.return_hook));

        let returns = stream.positions(Instruction::is_ret);
        for index in returns.iter().rev() {
            stream.insert_before(*index, return_hook.clone())?;
        }
        log::debug!("Inserted return hook before {} returns", returns.len());

        let extra_stack = u16::try_from(argument_count.max(1)).unwrap_or(u16::MAX);
        let max_stack = body.max_stack.saturating_add(extra_stack);
        module.set_method_body(entry, stream.to_body(&body, max_stack)?)?;

        let removed_attribute =
            match module.find_attribute(TableId::MethodDef, entry, &config.blocking_attribute)? {
                Some(attribute) => {
                    module.remove_custom_attribute(attribute)?;
                    log::debug!("Removed {} from {method_label}", config.blocking_attribute);
                    true
                }
                None => {
                    log::info!(
                        "{method_label} carries no {}, nothing to remove",
                        config.blocking_attribute
                    );
                    false
                }
            };

        let new_name = format!("{original_name}{}", config.rename_suffix);
        module.set_assembly_name(&new_name)?;

        Ok(PatchReport {
            entry_token,
            anchor_offset,
            return_sites: returns.len(),
            removed_attribute,
            new_name,
        })
    }

    fn find_entry(&self, module: &CilModule) -> Result<u32> {
        let config = &self.config;
        let candidates = module.find_methods(&config.entry_type, &config.entry_method)?;

        let Some(expected) = config.entry_param_count else {
            return Ok(candidates[0]);
        };
        for rid in candidates {
            if module.method_signature(rid)?.params.len() == expected {
                return Ok(rid);
            }
        }

        Err(EntryNotFound {
            type_name: config.entry_type.clone(),
            method: config.entry_method.clone(),
        })
    }

    fn is_anchor(&self, module: &CilModule, instruction: &Instruction) -> bool {
        let anchor = &self.config.anchor;
        if !is_call(instruction.opcode) {
            return false;
        }
        let Some(target) = instruction.token() else {
            return false;
        };

        if !matches!(module.member_name(target), Ok(name) if name == anchor.method) {
            return false;
        }
        match &anchor.declaring_type {
            Some(declaring) => matches!(
                module.member_parent_name(target),
                Ok(Some(parent)) if &parent == declaring
            ),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Operand,
        test::{ModuleBuilder, BLOCKING_ATTRIBUTE, ENTRY_METHOD, ENTRY_TYPE, RETURN_HOOK_METHOD},
        Error,
    };

    fn patch(builder: &ModuleBuilder) -> Result<(CilModule, PatchReport)> {
        let mut module = CilModule::from_mem(builder.build())?;
        let report = BytecodePatcher::new(PatchConfig::godot("Game")).patch_module(&mut module)?;
        let module = CilModule::from_mem(module.to_bytes()?)?;
        Ok((module, report))
    }

    fn entry_stream(module: &CilModule) -> InstructionStream {
        let entry = module.find_methods(ENTRY_TYPE, ENTRY_METHOD).unwrap()[0];
        InstructionStream::from_body(&module.method_body(entry).unwrap()).unwrap()
    }

    #[test]
    fn payload_hook_follows_anchor() {
        let (module, report) = patch(&ModuleBuilder::game("Game")).unwrap();
        assert_eq!(report.anchor_offset, 20);
        assert_eq!(report.entry_token, Token::new(0x0600_0001));

        let stream = entry_stream(&module);
        let instructions = stream.instructions();
        // ldc.i4.0, ldarg.1, brfalse.s, pop, ldtoken, call, callvirt, call <anchor>
        let anchor = &instructions[7];
        assert_eq!(module.member_name(anchor.token().unwrap()).unwrap(), "LookupScriptsInAssembly");

        let hook = &instructions[8..12];
        assert_eq!(hook[0].opcode, op::LDTOKEN);
        assert_eq!(
            module.type_name(hook[0].token().unwrap()).unwrap(),
            "MLG.Bootstrap.Bootstrap"
        );
        assert_eq!(hook[1].opcode, op::CALL);
        assert_eq!(module.member_name(hook[1].token().unwrap()).unwrap(), "GetTypeFromHandle");
        assert_eq!(hook[2].opcode, op::CALLVIRT);
        assert_eq!(module.member_name(hook[2].token().unwrap()).unwrap(), "get_Assembly");
        assert_eq!(hook[3], *anchor);

        // The existing references were reused
        assert_eq!(hook[1], instructions[5]);
        assert_eq!(hook[2], instructions[6]);
    }

    #[test]
    fn every_return_gets_the_hook() {
        let (module, report) = patch(&ModuleBuilder::game("Game")).unwrap();
        assert_eq!(report.return_sites, 2);

        let stream = entry_stream(&module);
        let instructions = stream.instructions();
        let returns = stream.positions(Instruction::is_ret);
        assert_eq!(returns.len(), 2);

        for ret in returns {
            let sequence = &instructions[ret - 5..ret];
            for (index, instruction) in sequence[..4].iter().enumerate() {
                assert_eq!(*instruction, Instruction::ldarg(index as u16));
            }
            let call = &sequence[4];
            assert_eq!(call.opcode, op::CALL);
            let target = call.token().unwrap();
            assert_eq!(module.member_name(target).unwrap(), RETURN_HOOK_METHOD);
            assert_eq!(
                module.member_parent_name(target).unwrap().as_deref(),
                Some(ENTRY_TYPE)
            );
            let signature = module.member_signature(target).unwrap();
            assert!(signature.returns_void());
            assert_eq!(signature.params.len(), 4);
        }
    }

    #[test]
    fn branch_to_return_runs_the_hook() {
        let (module, _) = patch(&ModuleBuilder::game("Game")).unwrap();
        let stream = entry_stream(&module);
        let instructions = stream.instructions();

        let last_ret = instructions.len() - 1;
        let Operand::Target(target) = instructions[2].operand else {
            panic!("brfalse lost its target");
        };
        assert_eq!(target, last_ret - 5);
        assert_eq!(instructions[target], Instruction::ldarg(0));
    }

    #[test]
    fn stack_and_attribute() {
        let (module, report) = patch(&ModuleBuilder::game("Game")).unwrap();
        assert!(report.removed_attribute);

        let entry = module.find_methods(ENTRY_TYPE, ENTRY_METHOD).unwrap()[0];
        assert_eq!(module.method_body(entry).unwrap().max_stack, 8 + 4);
        assert_eq!(
            module
                .find_attribute(TableId::MethodDef, entry, BLOCKING_ATTRIBUTE)
                .unwrap(),
            None
        );
    }

    #[test]
    fn missing_attribute_is_tolerated() {
        let (_, report) = patch(&ModuleBuilder::game("Game").without_blocking_attribute()).unwrap();
        assert!(!report.removed_attribute);
        assert_eq!(report.return_sites, 2);
    }

    #[test]
    fn assembly_is_renamed() {
        let (module, report) = patch(&ModuleBuilder::game("Game")).unwrap();
        assert_eq!(report.new_name, "Game.Patched");

        let identity = module.identity().unwrap();
        assert_eq!(identity.name, "Game.Patched");
        // Descriptive attributes still describe the game
        assert_eq!(identity.title(), Some("Game"));
    }

    #[test]
    fn default_config_hooks_into_assembly_named_like_the_module() {
        let mut module = CilModule::from_mem(ModuleBuilder::game("Other").build()).unwrap();
        BytecodePatcher::default().patch_module(&mut module).unwrap();

        let stream = entry_stream(&module);
        let ret = stream.positions(Instruction::is_ret)[0];
        let hook = stream.instructions()[ret - 1].token().unwrap();
        assert_eq!(module.member_parent_name(hook).unwrap().as_deref(), Some(ENTRY_TYPE));
        assert_eq!(module.assembly_name().unwrap(), "Other.Patched");
    }

    #[test]
    fn anchor_missing() {
        let result = patch(&ModuleBuilder::game("Game").without_anchor());
        assert!(matches!(result, Err(Error::AnchorNotFound { .. })));
    }

    #[test]
    fn anchor_declaring_type_is_checked() {
        let mut config = PatchConfig::godot("Game");
        config.anchor.declaring_type = Some("Godot.Bridge.Elsewhere".to_string());
        let mut module = CilModule::from_mem(ModuleBuilder::game("Game").build()).unwrap();
        assert!(matches!(
            BytecodePatcher::new(config.clone()).patch_module(&mut module),
            Err(Error::AnchorNotFound { .. })
        ));

        config.anchor.declaring_type = Some("Godot.Bridge.ScriptManagerBridge".to_string());
        assert!(BytecodePatcher::new(config).patch_module(&mut module).is_ok());
    }

    #[test]
    fn entry_missing() {
        let mut config = PatchConfig::godot("Game");
        config.entry_param_count = Some(2);
        let mut module = CilModule::from_mem(ModuleBuilder::game("Game").build()).unwrap();
        assert!(matches!(
            BytecodePatcher::new(config).patch_module(&mut module),
            Err(Error::EntryNotFound { .. })
        ));

        let mut config = PatchConfig::godot("Game");
        config.entry_type = "GodotPlugins.Game.Missing".to_string();
        assert!(matches!(
            BytecodePatcher::new(config).patch_module(&mut module),
            Err(Error::EntryNotFound { .. })
        ));
    }

    #[test]
    fn core_library_required() {
        let result = patch(&ModuleBuilder::game("Game").without_object_ref());
        assert!(matches!(result, Err(Error::UnresolvedReference(_))));
    }

    #[test]
    fn patch_files() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("Game_original.dll");
        let output = dir.path().join("Game_patched.dll");
        let image = ModuleBuilder::game("Game").build();
        std::fs::write(&original, &image).unwrap();

        let patcher = BytecodePatcher::new(PatchConfig::godot("Game"));
        patcher.patch(&original, &output).unwrap();
        assert_eq!(std::fs::read(&original).unwrap(), image);
        assert_eq!(
            CilModule::from_file(&output).unwrap().assembly_name().unwrap(),
            "Game.Patched"
        );
    }

    #[test]
    fn no_output_without_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("Game_original.dll");
        let output = dir.path().join("Game_patched.dll");
        ModuleBuilder::game("Game").without_anchor().write_to(&original);

        let patcher = BytecodePatcher::new(PatchConfig::godot("Game"));
        assert!(matches!(
            patcher.patch(&original, &output),
            Err(Error::AnchorNotFound { .. })
        ));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unreadable_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("Game_original.dll");
        std::fs::write(&original, b"not a module").unwrap();

        let patcher = BytecodePatcher::default();
        let result = patcher.patch(&original, &dir.path().join("out.dll"));
        assert!(matches!(result, Err(Error::ModuleLoad { .. })));
        assert!(matches!(
            patcher.patch(&dir.path().join("missing.dll"), &dir.path().join("out.dll")),
            Err(Error::ModuleLoad { .. })
        ));
    }

    #[test]
    fn unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("Game_original.dll");
        ModuleBuilder::game("Game").write_to(&original);

        let output = dir.path().join("missing").join("Game_patched.dll");
        let result = BytecodePatcher::default().patch(&original, &output);
        assert!(matches!(result, Err(Error::Serialization { .. })));
    }
}
