//! Column layouts of the metadata tables (ECMA-335 II.22).
//!
//! Rows are stored as one `u32` per column. The layouts below determine how each column is read
//! and written; the per-table modules name the column positions used by the editors.

use crate::metadata::tables::{CodedIndexType, TableId};

/// Storage class of a single table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// A 2 byte constant
    U16,
    /// A 4 byte constant
    U32,
    /// An index into the `#Strings` heap
    Str,
    /// An index into the `#GUID` heap
    Guid,
    /// An index into the `#Blob` heap
    Blob,
    /// A simple index into another table
    Index(TableId),
    /// A coded index over several tables
    Coded(CodedIndexType),
}

use CodedIndexType as C;
use ColumnType::{Blob, Coded, Guid, Index, Str, U16, U32};

impl TableId {
    /// The column layout of this table.
    #[must_use]
    pub fn columns(self) -> &'static [ColumnType] {
        match self {
            TableId::Module => &[U16, Str, Guid, Guid, Guid],
            TableId::TypeRef => &[Coded(C::ResolutionScope), Str, Str],
            TableId::TypeDef => &[
                U32,
                Str,
                Str,
                Coded(C::TypeDefOrRef),
                Index(TableId::Field),
                Index(TableId::MethodDef),
            ],
            TableId::FieldPtr => &[Index(TableId::Field)],
            TableId::Field => &[U16, Str, Blob],
            TableId::MethodPtr => &[Index(TableId::MethodDef)],
            TableId::MethodDef => &[U32, U16, U16, Str, Blob, Index(TableId::Param)],
            TableId::ParamPtr => &[Index(TableId::Param)],
            TableId::Param => &[U16, U16, Str],
            TableId::InterfaceImpl => &[Index(TableId::TypeDef), Coded(C::TypeDefOrRef)],
            TableId::MemberRef => &[Coded(C::MemberRefParent), Str, Blob],
            TableId::Constant => &[U16, Coded(C::HasConstant), Blob],
            TableId::CustomAttribute => &[
                Coded(C::HasCustomAttribute),
                Coded(C::CustomAttributeType),
                Blob,
            ],
            TableId::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
            TableId::DeclSecurity => &[U16, Coded(C::HasDeclSecurity), Blob],
            TableId::ClassLayout => &[U16, U32, Index(TableId::TypeDef)],
            TableId::FieldLayout => &[U32, Index(TableId::Field)],
            TableId::StandAloneSig => &[Blob],
            TableId::EventMap => &[Index(TableId::TypeDef), Index(TableId::Event)],
            TableId::EventPtr => &[Index(TableId::Event)],
            TableId::Event => &[U16, Str, Coded(C::TypeDefOrRef)],
            TableId::PropertyMap => &[Index(TableId::TypeDef), Index(TableId::Property)],
            TableId::PropertyPtr => &[Index(TableId::Property)],
            TableId::Property => &[U16, Str, Blob],
            TableId::MethodSemantics => &[U16, Index(TableId::MethodDef), Coded(C::HasSemantics)],
            TableId::MethodImpl => &[
                Index(TableId::TypeDef),
                Coded(C::MethodDefOrRef),
                Coded(C::MethodDefOrRef),
            ],
            TableId::ModuleRef => &[Str],
            TableId::TypeSpec => &[Blob],
            TableId::ImplMap => &[
                U16,
                Coded(C::MemberForwarded),
                Str,
                Index(TableId::ModuleRef),
            ],
            TableId::FieldRVA => &[U32, Index(TableId::Field)],
            TableId::EncLog => &[U32, U32],
            TableId::EncMap => &[U32],
            TableId::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            TableId::AssemblyProcessor => &[U32],
            TableId::AssemblyOS => &[U32, U32, U32],
            TableId::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            TableId::AssemblyRefProcessor => &[U32, Index(TableId::AssemblyRef)],
            TableId::AssemblyRefOS => &[U32, U32, U32, Index(TableId::AssemblyRef)],
            TableId::File => &[U32, Str, Blob],
            TableId::ExportedType => &[U32, U32, Str, Str, Coded(C::Implementation)],
            TableId::ManifestResource => &[U32, U32, Str, Coded(C::Implementation)],
            TableId::NestedClass => &[Index(TableId::TypeDef), Index(TableId::TypeDef)],
            TableId::GenericParam => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
            TableId::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
            TableId::GenericParamConstraint => {
                &[Index(TableId::GenericParam), Coded(C::TypeDefOrRef)]
            }
        }
    }
}

/// Column positions of the `TypeRef` table.
pub mod typeref {
    /// `ResolutionScope` coded index
    pub const SCOPE: usize = 0;
    /// Type name
    pub const NAME: usize = 1;
    /// Type namespace
    pub const NAMESPACE: usize = 2;
}

/// Column positions of the `TypeDef` table.
pub mod typedef {
    /// Type attributes
    pub const FLAGS: usize = 0;
    /// Type name
    pub const NAME: usize = 1;
    /// Type namespace
    pub const NAMESPACE: usize = 2;
    /// Base type
    pub const EXTENDS: usize = 3;
    /// First field owned by the type
    pub const FIELD_LIST: usize = 4;
    /// First method owned by the type
    pub const METHOD_LIST: usize = 5;
}

/// Column positions of the `MethodDef` table.
pub mod methoddef {
    /// RVA of the method body, zero for abstract and runtime methods
    pub const RVA: usize = 0;
    /// Implementation attributes
    pub const IMPL_FLAGS: usize = 1;
    /// Method attributes
    pub const FLAGS: usize = 2;
    /// Method name
    pub const NAME: usize = 3;
    /// Method signature blob
    pub const SIGNATURE: usize = 4;
    /// First parameter row
    pub const PARAM_LIST: usize = 5;
}

/// Column positions of the `MemberRef` table.
pub mod memberref {
    /// `MemberRefParent` coded index
    pub const CLASS: usize = 0;
    /// Member name
    pub const NAME: usize = 1;
    /// Member signature blob
    pub const SIGNATURE: usize = 2;
}

/// Column positions of the `CustomAttribute` table.
pub mod customattribute {
    /// `HasCustomAttribute` coded index of the owner
    pub const PARENT: usize = 0;
    /// `CustomAttributeType` coded index of the constructor
    pub const TYPE: usize = 1;
    /// Attribute value blob
    pub const VALUE: usize = 2;
}

/// Column positions of the `Assembly` table.
pub mod assembly {
    /// Hash algorithm id
    pub const HASH_ALG: usize = 0;
    /// Major version
    pub const MAJOR: usize = 1;
    /// Minor version
    pub const MINOR: usize = 2;
    /// Build number
    pub const BUILD: usize = 3;
    /// Revision number
    pub const REVISION: usize = 4;
    /// Assembly flags
    pub const FLAGS: usize = 5;
    /// Public key blob
    pub const PUBLIC_KEY: usize = 6;
    /// Assembly name
    pub const NAME: usize = 7;
    /// Culture name
    pub const CULTURE: usize = 8;
}

/// Column positions of the `AssemblyRef` table.
pub mod assemblyref {
    /// Major version
    pub const MAJOR: usize = 0;
    /// Minor version
    pub const MINOR: usize = 1;
    /// Build number
    pub const BUILD: usize = 2;
    /// Revision number
    pub const REVISION: usize = 3;
    /// Assembly flags
    pub const FLAGS: usize = 4;
    /// Public key or token blob
    pub const PUBLIC_KEY: usize = 5;
    /// Assembly name
    pub const NAME: usize = 6;
    /// Culture name
    pub const CULTURE: usize = 7;
    /// Hash value blob
    pub const HASH: usize = 8;
}

/// Column positions of the `MethodSpec` table.
pub mod methodspec {
    /// `MethodDefOrRef` coded index of the generic method
    pub const METHOD: usize = 0;
    /// Instantiation blob
    pub const INSTANTIATION: usize = 1;
}
