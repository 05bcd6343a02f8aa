//! A loaded managed module, editable in memory.
//!
//! [`CilModule`] combines the original PE image with an owned, mutable copy of its metadata
//! and a set of rewritten method bodies. Lookups work on the metadata as currently edited;
//! [`CilModule::to_bytes`] and [`CilModule::write_to`] produce a new image while the original
//! bytes stay untouched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mlg::metadata::cilmodule::CilModule;
//! use std::path::Path;
//!
//! let mut module = CilModule::from_file(Path::new("Game.dll"))?;
//! println!("{}", module.identity()?);
//!
//! module.set_assembly_name("Game.Patched")?;
//! module.write_to(Path::new("Game_patched.dll"))?;
//! # Ok::<(), mlg::Error>(())
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{
    file::File,
    metadata::{
        cor20header::{Cor20Header, COR20_HEADER_SIZE},
        customattributes::StringAttributeValue,
        identity::{AssemblyVersion, AttributeSummary, ModuleIdentity},
        method::MethodBody,
        signatures::{MethodSignature, ELEMENT_TYPE},
        tables::{
            assembly, assemblyref, customattribute, memberref, methoddef, methodspec, typedef,
            typeref, CodedIndexType, TableId, Tables,
        },
        token::Token,
        Metadata,
    },
    writer::{self, Output},
    Error::{EntryNotFound, UnresolvedReference},
    Result,
};

const MODULE_NAME: usize = 1;

/// A managed module with editable metadata and method bodies.
#[derive(Debug)]
pub struct CilModule {
    file: File,
    path: Option<PathBuf>,
    cor20: Cor20Header,
    metadata: Metadata,
    bodies: BTreeMap<u32, MethodBody>,
}

impl CilModule {
    /// Load a module from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a managed PE image.
    pub fn from_file(path: &Path) -> Result<CilModule> {
        let file = File::from_file(path)?;
        Self::load(file, Some(path.to_path_buf()))
    }

    /// Load a module from an owned buffer.
    ///
    /// # Errors
    /// Returns an error if `data` is not a managed PE image.
    pub fn from_mem(data: Vec<u8>) -> Result<CilModule> {
        Self::load(File::from_mem(data)?, None)
    }

    fn load(file: File, path: Option<PathBuf>) -> Result<CilModule> {
        let (clr_rva, clr_size) = file.clr();
        if (clr_size as usize) < COR20_HEADER_SIZE {
            return Err(malformed_error!("CLR header directory too small - {}", clr_size));
        }

        let cor20 = Cor20Header::read(file.rva_slice(clr_rva, COR20_HEADER_SIZE)?)?;
        let metadata = Metadata::read(
            file.rva_slice(cor20.meta_data_rva, cor20.meta_data_size as usize)?,
        )?;

        Ok(CilModule {
            file,
            path,
            cor20,
            metadata,
            bodies: BTreeMap::new(),
        })
    }

    /// The original image.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Path the module was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The CLI header as read.
    #[must_use]
    pub fn cor20(&self) -> &Cor20Header {
        &self.cor20
    }

    /// The metadata as currently edited.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable access to the metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Method bodies replaced since loading, keyed by `MethodDef` row.
    #[must_use]
    pub fn rewritten_bodies(&self) -> &BTreeMap<u32, MethodBody> {
        &self.bodies
    }

    fn tables(&self) -> &Tables {
        &self.metadata.tables.tables
    }

    fn tables_mut(&mut self) -> &mut Tables {
        &mut self.metadata.tables.tables
    }

    fn string(&self, table: TableId, rid: u32, column: usize) -> Result<&str> {
        self.metadata.strings.get(self.tables().get(table, rid, column)?)
    }

    fn blob(&self, table: TableId, rid: u32, column: usize) -> Result<&[u8]> {
        self.metadata.blob.get(self.tables().get(table, rid, column)?)
    }

    /// Full name of `TypeDef` row `rid`, `Namespace.Name` or `Outer/Inner` for nested types.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row or its names do not exist.
    pub fn type_def_name(&self, rid: u32) -> Result<String> {
        let name = self.string(TableId::TypeDef, rid, typedef::NAME)?;
        let namespace = self.string(TableId::TypeDef, rid, typedef::NAMESPACE)?;

        let enclosing = self
            .tables()
            .rows(TableId::NestedClass)
            .iter()
            .find(|row| row.first() == Some(&rid))
            .and_then(|row| row.get(1).copied());

        match enclosing {
            Some(outer) if outer != rid => Ok(format!("{}/{}", self.type_def_name(outer)?, name)),
            _ => Ok(qualified(namespace, name)),
        }
    }

    /// Full name of `TypeRef` row `rid`, `Namespace.Name` or `Outer/Inner` for nested types.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row or its names do not exist.
    pub fn type_ref_name(&self, rid: u32) -> Result<String> {
        let name = self.string(TableId::TypeRef, rid, typeref::NAME)?;
        let namespace = self.string(TableId::TypeRef, rid, typeref::NAMESPACE)?;
        let scope = self.tables().get(TableId::TypeRef, rid, typeref::SCOPE)?;

        match CodedIndexType::ResolutionScope.decode(scope) {
            Some((TableId::TypeRef, outer)) if outer != rid => {
                Ok(format!("{}/{}", self.type_ref_name(outer)?, name))
            }
            _ => Ok(qualified(namespace, name)),
        }
    }

    /// Full name of the type a `TypeDef` or `TypeRef` token refers to.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for other tables or missing rows.
    pub fn type_name(&self, token: Token) -> Result<String> {
        match token.table_id() {
            Some(TableId::TypeDef) => self.type_def_name(token.row()),
            Some(TableId::TypeRef) => self.type_ref_name(token.row()),
            _ => Err(malformed_error!("Token {} is not a named type", token)),
        }
    }

    /// `TypeDef` row of the type named `full_name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a type's names cannot be read.
    pub fn find_type_def(&self, full_name: &str) -> Result<Option<u32>> {
        for rid in 1..=self.tables().row_count(TableId::TypeDef) {
            if self.type_def_name(rid)? == full_name {
                return Ok(Some(rid));
            }
        }
        Ok(None)
    }

    /// `MethodDef` rows owned by `TypeDef` row `type_rid`, following `MethodPtr` indirection.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the type row does not exist.
    pub fn methods_of(&self, type_rid: u32) -> Result<Vec<u32>> {
        let tables = self.tables();
        if tables.row_count(TableId::MethodPtr) == 0 {
            let range = tables.owned_range(
                TableId::TypeDef,
                type_rid,
                typedef::METHOD_LIST,
                TableId::MethodDef,
            )?;
            return Ok(range.collect());
        }

        tables
            .owned_range(
                TableId::TypeDef,
                type_rid,
                typedef::METHOD_LIST,
                TableId::MethodPtr,
            )?
            .map(|pointer| tables.get(TableId::MethodPtr, pointer, 0))
            .collect()
    }

    /// `TypeDef` row owning `MethodDef` row `method_rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a type row cannot be read.
    pub fn declaring_type_of(&self, method_rid: u32) -> Result<Option<u32>> {
        for type_rid in 1..=self.tables().row_count(TableId::TypeDef) {
            if self.methods_of(type_rid)?.contains(&method_rid) {
                return Ok(Some(type_rid));
            }
        }
        Ok(None)
    }

    /// Every `MethodDef` row of `type_name` called `method`, in table order.
    ///
    /// # Errors
    /// Returns [`crate::Error::EntryNotFound`] if the type or the method does not exist.
    pub fn find_methods(&self, type_name: &str, method: &str) -> Result<Vec<u32>> {
        let not_found = || EntryNotFound {
            type_name: type_name.to_string(),
            method: method.to_string(),
        };

        let type_rid = self.find_type_def(type_name)?.ok_or_else(not_found)?;
        let mut found = Vec::new();
        for rid in self.methods_of(type_rid)? {
            if self.method_name(rid)? == method {
                found.push(rid);
            }
        }

        if found.is_empty() {
            return Err(not_found());
        }
        Ok(found)
    }

    /// Name of `MethodDef` row `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn method_name(&self, rid: u32) -> Result<&str> {
        self.string(TableId::MethodDef, rid, methoddef::NAME)
    }

    /// Decoded signature of `MethodDef` row `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row or its signature is invalid.
    pub fn method_signature(&self, rid: u32) -> Result<MethodSignature> {
        MethodSignature::parse(self.blob(TableId::MethodDef, rid, methoddef::SIGNATURE)?)
    }

    /// Body of `MethodDef` row `rid`, including replacements made with
    /// [`CilModule::set_method_body`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for abstract or runtime implemented methods and
    /// invalid bodies.
    pub fn method_body(&self, rid: u32) -> Result<MethodBody> {
        if let Some(body) = self.bodies.get(&rid) {
            return Ok(body.clone());
        }

        let rva = self.tables().get(TableId::MethodDef, rid, methoddef::RVA)?;
        if rva == 0 {
            return Err(malformed_error!("Method {} has no body", rid));
        }
        MethodBody::read(self.file.rva_tail(rva)?)
    }

    /// Replace the body of `MethodDef` row `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn set_method_body(&mut self, rid: u32, body: MethodBody) -> Result<()> {
        if self.tables().row(TableId::MethodDef, rid).is_none() {
            return Err(malformed_error!("MethodDef {} does not exist", rid));
        }
        self.bodies.insert(rid, body);
        Ok(())
    }

    /// Name of a `MethodDef`, `MemberRef` or `MethodSpec` member.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for other tokens or missing rows.
    pub fn member_name(&self, token: Token) -> Result<&str> {
        match token.table_id() {
            Some(TableId::MethodDef) => self.method_name(token.row()),
            Some(TableId::MemberRef) => self.string(TableId::MemberRef, token.row(), memberref::NAME),
            Some(TableId::MethodSpec) => self.member_name(self.method_spec_target(token.row())?),
            _ => Err(malformed_error!("Token {} is not a member", token)),
        }
    }

    /// Full name of the type declaring a `MethodDef`, `MemberRef` or `MethodSpec` member.
    ///
    /// Returns `None` for members of module references or type specifications.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for other tokens or missing rows.
    pub fn member_parent_name(&self, token: Token) -> Result<Option<String>> {
        match token.table_id() {
            Some(TableId::MethodDef) => match self.declaring_type_of(token.row())? {
                Some(type_rid) => Ok(Some(self.type_def_name(type_rid)?)),
                None => Ok(None),
            },
            Some(TableId::MemberRef) => {
                let class = self
                    .tables()
                    .get(TableId::MemberRef, token.row(), memberref::CLASS)?;
                match CodedIndexType::MemberRefParent.decode(class) {
                    Some((TableId::TypeDef, rid)) => Ok(Some(self.type_def_name(rid)?)),
                    Some((TableId::TypeRef, rid)) => Ok(Some(self.type_ref_name(rid)?)),
                    Some((TableId::MethodDef, rid)) => {
                        self.member_parent_name(Token::for_row(TableId::MethodDef, rid))
                    }
                    _ => Ok(None),
                }
            }
            Some(TableId::MethodSpec) => {
                self.member_parent_name(self.method_spec_target(token.row())?)
            }
            _ => Err(malformed_error!("Token {} is not a member", token)),
        }
    }

    /// Decoded signature of a `MethodDef` or `MemberRef` member.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for other tokens or invalid signatures.
    pub fn member_signature(&self, token: Token) -> Result<MethodSignature> {
        match token.table_id() {
            Some(TableId::MethodDef) => self.method_signature(token.row()),
            Some(TableId::MemberRef) => MethodSignature::parse(self.blob(
                TableId::MemberRef,
                token.row(),
                memberref::SIGNATURE,
            )?),
            _ => Err(malformed_error!("Token {} has no method signature", token)),
        }
    }

    fn method_spec_target(&self, rid: u32) -> Result<Token> {
        let method = self.tables().get(TableId::MethodSpec, rid, methodspec::METHOD)?;
        match CodedIndexType::MethodDefOrRef.decode(method) {
            Some((table, row)) => Ok(Token::for_row(table, row)),
            None => Err(malformed_error!("Invalid MethodSpec method - {}", method)),
        }
    }

    /// `CustomAttribute` rows attached to row `rid` of `parent`, in table order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `parent` cannot carry attributes.
    pub fn custom_attributes(&self, parent: TableId, rid: u32) -> Result<Vec<u32>> {
        let Some(coded) = CodedIndexType::HasCustomAttribute.encode(parent, rid) else {
            return Err(malformed_error!("{:?} cannot carry custom attributes", parent));
        };

        let mut found = Vec::new();
        for (index, row) in self.tables().rows(TableId::CustomAttribute).iter().enumerate() {
            if row.get(customattribute::PARENT) == Some(&coded) {
                found.push(index_to_rid(index)?);
            }
        }
        Ok(found)
    }

    /// Constructor token of `CustomAttribute` row `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row or its constructor reference is invalid.
    pub fn attribute_constructor(&self, rid: u32) -> Result<Token> {
        let ctor = self
            .tables()
            .get(TableId::CustomAttribute, rid, customattribute::TYPE)?;
        match CodedIndexType::CustomAttributeType.decode(ctor) {
            Some((table, row)) => Ok(Token::for_row(table, row)),
            None => Err(malformed_error!("Invalid custom attribute constructor - {}", ctor)),
        }
    }

    /// Full type name of `CustomAttribute` row `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the attribute type cannot be named.
    pub fn attribute_type_name(&self, rid: u32) -> Result<String> {
        let ctor = self.attribute_constructor(rid)?;
        self.member_parent_name(ctor)?
            .ok_or_else(|| malformed_error!("Custom attribute {} has an unnamed type", rid))
    }

    /// First attribute of type `type_name` on row `rid` of `parent`.
    ///
    /// # Errors
    /// See [`CilModule::custom_attributes`].
    pub fn find_attribute(&self, parent: TableId, rid: u32, type_name: &str) -> Result<Option<u32>> {
        for attribute in self.custom_attributes(parent, rid)? {
            if self.attribute_type_name(attribute)? == type_name {
                return Ok(Some(attribute));
            }
        }
        Ok(None)
    }

    /// Remove `CustomAttribute` row `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn remove_custom_attribute(&mut self, rid: u32) -> Result<()> {
        self.tables_mut().remove(TableId::CustomAttribute, rid)?;
        Ok(())
    }

    /// Leading string argument of `CustomAttribute` row `rid`.
    ///
    /// Returns `None` if the constructor's first parameter is not a string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the constructor or value blob is invalid.
    pub fn attribute_string(&self, rid: u32) -> Result<Option<StringAttributeValue>> {
        let signature = self.member_signature(self.attribute_constructor(rid)?)?;
        if signature.params.first().map(Vec::as_slice) != Some(&[ELEMENT_TYPE::STRING][..]) {
            return Ok(None);
        }

        let value = self.blob(TableId::CustomAttribute, rid, customattribute::VALUE)?;
        Ok(Some(StringAttributeValue::parse(value)?))
    }

    /// Replace the leading string argument of `CustomAttribute` row `rid`, keeping all other
    /// arguments.
    ///
    /// Returns `false` if the constructor's first parameter is not a string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the constructor or value blob is invalid.
    pub fn set_attribute_string(&mut self, rid: u32, value: &str) -> Result<bool> {
        let Some(mut current) = self.attribute_string(rid)? else {
            return Ok(false);
        };

        current.value = Some(value.to_string());
        let blob = self.metadata.blob.intern(&current.encode()?)?;
        self.tables_mut()
            .set(TableId::CustomAttribute, rid, customattribute::VALUE, blob)?;
        Ok(true)
    }

    fn require_assembly(&self) -> Result<()> {
        if self.tables().row_count(TableId::Assembly) == 0 {
            return Err(malformed_error!("Module has no assembly manifest"));
        }
        Ok(())
    }

    /// Simple name of the assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the module has no assembly manifest.
    pub fn assembly_name(&self) -> Result<&str> {
        self.require_assembly()?;
        self.string(TableId::Assembly, 1, assembly::NAME)
    }

    /// Rename the assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the module has no assembly manifest.
    pub fn set_assembly_name(&mut self, name: &str) -> Result<()> {
        self.require_assembly()?;
        let index = self.metadata.strings.intern(name);
        self.tables_mut().set(TableId::Assembly, 1, assembly::NAME, index)
    }

    /// File name recorded in the `Module` table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `Module` row is missing.
    pub fn module_name(&self) -> Result<&str> {
        self.string(TableId::Module, 1, MODULE_NAME)
    }

    /// Replace the file name recorded in the `Module` table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `Module` row is missing.
    pub fn set_module_name(&mut self, name: &str) -> Result<()> {
        let index = self.metadata.strings.intern(name);
        self.tables_mut().set(TableId::Module, 1, MODULE_NAME, index)
    }

    /// The assembly's name, version and assembly-level attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the module has no assembly manifest or an
    /// attribute cannot be decoded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn identity(&self) -> Result<ModuleIdentity> {
        let name = self.assembly_name()?.to_string();
        let tables = self.tables();
        let version = AssemblyVersion {
            major: tables.get(TableId::Assembly, 1, assembly::MAJOR)? as u16,
            minor: tables.get(TableId::Assembly, 1, assembly::MINOR)? as u16,
            build: tables.get(TableId::Assembly, 1, assembly::BUILD)? as u16,
            revision: tables.get(TableId::Assembly, 1, assembly::REVISION)? as u16,
        };

        let mut attributes = Vec::new();
        for rid in self.custom_attributes(TableId::Assembly, 1)? {
            attributes.push(AttributeSummary {
                type_name: self.attribute_type_name(rid)?,
                value: self.attribute_string(rid)?.and_then(|value| value.value),
            });
        }

        Ok(ModuleIdentity {
            name,
            version,
            attributes,
        })
    }

    /// `ResolutionScope` value for an `AssemblyRef` named `name`, adding the reference with
    /// version 0.0.0.0 if none exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a row cannot be read.
    pub fn import_assembly_ref(&mut self, name: &str) -> Result<u32> {
        let existing = self.find_row(TableId::AssemblyRef, |module, rid| {
            Ok(module.string(TableId::AssemblyRef, rid, assemblyref::NAME)? == name)
        })?;

        let rid = match existing {
            Some(rid) => rid,
            None => {
                let name_index = self.metadata.strings.intern(name);
                log::debug!("Adding assembly reference {name}");
                self.tables_mut().push(
                    TableId::AssemblyRef,
                    vec![0, 0, 0, 0, 0, 0, name_index, 0, 0],
                )?
            }
        };

        resolution_scope(TableId::AssemblyRef, rid)
    }

    /// `ResolutionScope` of the module's reference to `System.Object`, the scope used for
    /// every core library type the patcher imports.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedReference`] if the module does not reference
    /// `System.Object`.
    pub fn core_library_scope(&self) -> Result<u32> {
        let object = self.find_row(TableId::TypeRef, |module, rid| {
            Ok(module.type_ref_name(rid)? == "System.Object")
        })?;

        match object {
            Some(rid) => self.tables().get(TableId::TypeRef, rid, typeref::SCOPE),
            None => Err(UnresolvedReference("System.Object".to_string())),
        }
    }

    /// Token of a `TypeRef` to `namespace.name` in `scope`, adding the row if none exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a row cannot be read.
    pub fn import_type_ref(&mut self, scope: u32, namespace: &str, name: &str) -> Result<Token> {
        let existing = self.find_row(TableId::TypeRef, |module, rid| {
            Ok(module.tables().get(TableId::TypeRef, rid, typeref::SCOPE)? == scope
                && module.string(TableId::TypeRef, rid, typeref::NAME)? == name
                && module.string(TableId::TypeRef, rid, typeref::NAMESPACE)? == namespace)
        })?;

        let rid = match existing {
            Some(rid) => rid,
            None => {
                let name_index = self.metadata.strings.intern(name);
                let namespace_index = self.metadata.strings.intern(namespace);
                log::debug!("Adding type reference {}", qualified(namespace, name));
                self.tables_mut()
                    .push(TableId::TypeRef, vec![scope, name_index, namespace_index])?
            }
        };

        Ok(Token::for_row(TableId::TypeRef, rid))
    }

    /// Token of a `MemberRef` to method `name` of `parent`, adding the row if none exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `parent` cannot own member references or the
    /// signature cannot be encoded.
    pub fn import_member_ref(
        &mut self,
        parent: Token,
        name: &str,
        signature: &MethodSignature,
    ) -> Result<Token> {
        let class = parent
            .table_id()
            .and_then(|table| CodedIndexType::MemberRefParent.encode(table, parent.row()))
            .ok_or_else(|| malformed_error!("Token {} cannot own member references", parent))?;
        let encoded = signature.encode()?;

        let existing = self.find_row(TableId::MemberRef, |module, rid| {
            Ok(module.tables().get(TableId::MemberRef, rid, memberref::CLASS)? == class
                && module.string(TableId::MemberRef, rid, memberref::NAME)? == name
                && module.blob(TableId::MemberRef, rid, memberref::SIGNATURE)? == encoded.as_slice())
        })?;

        let rid = match existing {
            Some(rid) => rid,
            None => {
                let name_index = self.metadata.strings.intern(name);
                let signature_index = self.metadata.blob.intern(&encoded)?;
                log::debug!("Adding member reference {name} on {parent}");
                self.tables_mut()
                    .push(TableId::MemberRef, vec![class, name_index, signature_index])?
            }
        };

        Ok(Token::for_row(TableId::MemberRef, rid))
    }

    fn find_row<F>(&self, table: TableId, mut matches: F) -> Result<Option<u32>>
    where
        F: FnMut(&CilModule, u32) -> Result<bool>,
    {
        for rid in 1..=self.tables().row_count(table) {
            if matches(self, rid)? {
                return Ok(Some(rid));
            }
        }
        Ok(None)
    }

    /// Serialize the module with all edits applied.
    ///
    /// # Errors
    /// Returns an error if the metadata cannot be encoded or the image cannot be extended.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        writer::write_image(&self.file, &self.metadata, &self.bodies)
    }

    /// Serialize the module to `path`.
    ///
    /// The image is written to a temporary file next to `path` and renamed over it once
    /// complete, so a failure never leaves a truncated module behind.
    ///
    /// # Errors
    /// Returns an error if serialization or any filesystem operation fails.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut output = Output::create(path, bytes.len() as u64)?;
        output.write_at(0, &bytes)?;
        output.finalize()
    }
}

fn qualified(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

fn index_to_rid(index: usize) -> Result<u32> {
    u32::try_from(index + 1).map_err(|_| malformed_error!("Row index overflow - {}", index))
}

fn resolution_scope(table: TableId, rid: u32) -> Result<u32> {
    CodedIndexType::ResolutionScope
        .encode(table, rid)
        .ok_or_else(|| malformed_error!("{:?} is not a resolution scope", table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{ModuleBuilder, ENTRY_METHOD, ENTRY_TYPE};

    fn game() -> CilModule {
        CilModule::from_mem(ModuleBuilder::game("Game").build()).unwrap()
    }

    #[test]
    fn identity_of_game_module() {
        let module = game();
        let identity = module.identity().unwrap();
        assert_eq!(identity.name, "Game");
        assert_eq!(identity.version.to_string(), "1.0.0.0");
        assert_eq!(identity.company(), Some("Game"));
        assert_eq!(identity.title(), Some("Game"));
    }

    #[test]
    fn entry_lookup() {
        let module = game();
        let methods = module.find_methods(ENTRY_TYPE, ENTRY_METHOD).unwrap();
        assert_eq!(methods.len(), 1);

        let signature = module.method_signature(methods[0]).unwrap();
        assert_eq!(signature.params.len(), 4);
        assert!(!signature.has_this());

        let body = module.method_body(methods[0]).unwrap();
        assert!(!body.code.is_empty());

        assert!(matches!(
            module.find_methods(ENTRY_TYPE, "Missing"),
            Err(EntryNotFound { .. })
        ));
        assert!(matches!(
            module.find_methods("Missing.Type", ENTRY_METHOD),
            Err(EntryNotFound { .. })
        ));
    }

    #[test]
    fn type_names() {
        let module = game();
        assert_eq!(module.type_def_name(1).unwrap(), "<Module>");
        assert_eq!(module.find_type_def(ENTRY_TYPE).unwrap(), Some(2));
        assert_eq!(
            module.find_type_def("GodotPlugins.Game.Main/Callbacks").unwrap(),
            Some(3)
        );
        assert_eq!(module.find_type_def("Callbacks").unwrap(), None);
        assert!(module.methods_of(3).unwrap().is_empty());
        assert_eq!(module.declaring_type_of(1).unwrap(), Some(2));
        assert_eq!(module.module_name().unwrap(), "Game.dll");
    }

    #[test]
    fn blocking_attribute_on_entry() {
        let mut module = game();
        let entry = module.find_methods(ENTRY_TYPE, ENTRY_METHOD).unwrap()[0];
        let attribute = module
            .find_attribute(
                TableId::MethodDef,
                entry,
                "System.Runtime.InteropServices.UnmanagedCallersOnlyAttribute",
            )
            .unwrap()
            .unwrap();

        module.remove_custom_attribute(attribute).unwrap();
        assert_eq!(
            module
                .find_attribute(
                    TableId::MethodDef,
                    entry,
                    "System.Runtime.InteropServices.UnmanagedCallersOnlyAttribute",
                )
                .unwrap(),
            None
        );
        // Assembly attributes are untouched
        assert_eq!(module.identity().unwrap().product(), Some("Game"));
    }

    #[test]
    fn imports_reuse_rows() {
        let mut module = game();
        let types_before = module.tables().row_count(TableId::TypeRef);

        let scope = module.core_library_scope().unwrap();
        let object = module.import_type_ref(scope, "System", "Object").unwrap();
        assert_eq!(module.tables().row_count(TableId::TypeRef), types_before);
        assert_eq!(module.type_name(object).unwrap(), "System.Object");

        let hook_scope = module.import_assembly_ref("MLG.Bootstrap").unwrap();
        assert_eq!(module.import_assembly_ref("MLG.Bootstrap").unwrap(), hook_scope);
        let hook = module
            .import_type_ref(hook_scope, "MLG.Bootstrap", "Bootstrap")
            .unwrap();
        assert_eq!(module.tables().row_count(TableId::TypeRef), types_before + 1);

        let signature = MethodSignature::new_static(vec![ELEMENT_TYPE::VOID], Vec::new());
        let first = module.import_member_ref(hook, "Run", &signature).unwrap();
        let second = module.import_member_ref(hook, "Run", &signature).unwrap();
        assert_eq!(first, second);
        assert_eq!(module.member_name(first).unwrap(), "Run");
        assert_eq!(
            module.member_parent_name(first).unwrap().as_deref(),
            Some("MLG.Bootstrap.Bootstrap")
        );
    }

    #[test]
    fn missing_core_library() {
        let module = CilModule::from_mem(ModuleBuilder::game("Game").without_object_ref().build())
            .unwrap();
        assert!(matches!(
            module.core_library_scope(),
            Err(UnresolvedReference(_))
        ));
    }

    #[test]
    fn rename_and_rewrite_survive_serialization() {
        let mut module = game();
        module.set_assembly_name("Game.Patched").unwrap();
        let company = module
            .find_attribute(
                TableId::Assembly,
                1,
                crate::metadata::identity::COMPANY_ATTRIBUTE,
            )
            .unwrap()
            .unwrap();
        assert!(module.set_attribute_string(company, "Other").unwrap());

        let reread = CilModule::from_mem(module.to_bytes().unwrap()).unwrap();
        let identity = reread.identity().unwrap();
        assert_eq!(identity.name, "Game.Patched");
        assert_eq!(identity.company(), Some("Other"));
        assert_eq!(identity.product(), Some("Game"));
    }

    #[test]
    fn write_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Game.dll");

        let module = game();
        module.write_to(&path).unwrap();

        let reread = CilModule::from_file(&path).unwrap();
        assert_eq!(reread.assembly_name().unwrap(), "Game");
        assert_eq!(reread.path(), Some(path.as_path()));
    }

    #[test]
    fn invalid_inputs() {
        assert!(CilModule::from_mem(Vec::new()).is_err());
        assert!(CilModule::from_mem(vec![0x4D, 0x5A, 0x00, 0x00]).is_err());
    }
}
