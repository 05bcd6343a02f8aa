use crate::{
    config::{PatchConfig, TypeReference},
    metadata::{
        cilmodule::CilModule,
        signatures::{class_type, value_type, MethodSignature, ELEMENT_TYPE},
        token::Token,
    },
    Result,
};

/// Tokens the inserted instructions refer to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HookReferences {
    /// `TypeRef` of the payload hook type
    pub hook_type: Token,
    /// `System.Type::GetTypeFromHandle(RuntimeTypeHandle)`
    pub get_type_from_handle: Token,
    /// `System.Type::get_Assembly()`
    pub get_assembly: Token,
    /// The method called before every return
    pub return_hook: Token,
}

impl HookReferences {
    /// Import every reference, reusing equal rows already in `module`.
    ///
    /// `module_name` is the assembly name before renaming, used for references that do not
    /// name their assembly. `entry` is the entry method's signature; the return hook takes the
    /// same arguments and returns nothing.
    ///
    /// `entry` must be read from `module`. Its parameter blobs are reused as is, so type tokens
    /// inside them keep naming rows of `module`, which imports only ever append to.
    pub(crate) fn import(
        module: &mut CilModule,
        config: &PatchConfig,
        module_name: &str,
        entry: &MethodSignature,
    ) -> Result<HookReferences> {
        let core = module.core_library_scope()?;
        let system_type = module.import_type_ref(core, "System", "Type")?;
        let handle = module.import_type_ref(core, "System", "RuntimeTypeHandle")?;
        let assembly = module.import_type_ref(core, "System.Reflection", "Assembly")?;

        let get_type_from_handle = module.import_member_ref(
            system_type,
            "GetTypeFromHandle",
            &MethodSignature::new_static(class_type(system_type)?, vec![value_type(handle)?]),
        )?;
        let get_assembly = module.import_member_ref(
            system_type,
            "get_Assembly",
            &MethodSignature::new_instance(class_type(assembly)?, Vec::new()),
        )?;

        let hook_type = import_external(module, &config.hook_type, module_name)?;
        let return_hook_type = import_external(module, &config.return_hook_type, module_name)?;

        let mut params = Vec::with_capacity(entry.argument_count());
        if entry.has_this() {
            params.push(vec![ELEMENT_TYPE::OBJECT]);
        }
        params.extend(entry.params.iter().cloned());
        let return_hook = module.import_member_ref(
            return_hook_type,
            &config.return_hook_method,
            &MethodSignature::new_static(vec![ELEMENT_TYPE::VOID], params),
        )?;

        Ok(HookReferences {
            hook_type,
            get_type_from_handle,
            get_assembly,
            return_hook,
        })
    }
}

fn import_external(
    module: &mut CilModule,
    reference: &TypeReference,
    module_name: &str,
) -> Result<Token> {
    let assembly = reference.assembly.as_deref().unwrap_or(module_name);
    let scope = module.import_assembly_ref(assembly)?;
    module.import_type_ref(scope, &reference.namespace, &reference.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::TableId,
        test::{ModuleBuilder, ENTRY_TYPE},
    };

    #[test]
    fn return_hook_keeps_entry_type_tokens() {
        let mut module = CilModule::from_mem(ModuleBuilder::game("Game").build()).unwrap();
        let core = module.core_library_scope().unwrap();
        let system_type = module.import_type_ref(core, "System", "Type").unwrap();
        let main_type = Token::for_row(TableId::TypeDef, 2);
        assert_eq!(module.type_name(main_type).unwrap(), ENTRY_TYPE);

        let entry = MethodSignature::new_static(
            vec![ELEMENT_TYPE::BOOLEAN],
            vec![class_type(main_type).unwrap(), class_type(system_type).unwrap()],
        );
        let references =
            HookReferences::import(&mut module, &PatchConfig::godot("Game"), "Game", &entry)
                .unwrap();

        let module = CilModule::from_mem(module.to_bytes().unwrap()).unwrap();
        let signature = module.member_signature(references.return_hook).unwrap();
        assert!(signature.returns_void());
        assert_eq!(signature.params, entry.params);
        assert_eq!(module.type_name(main_type).unwrap(), ENTRY_TYPE);
        assert_eq!(module.type_name(system_type).unwrap(), "System.Type");
    }
}
