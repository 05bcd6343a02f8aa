//! # mlg Prelude
//!
//! The types needed to patch, shim and install, and to drive the runtime bridge. Import this
//! module to get them all at once.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all mlg operations
pub use crate::Error;

/// The result type used throughout mlg
pub use crate::Result;

// ================================================================================================
// Modules and Metadata
// ================================================================================================

/// A managed module loaded for editing
pub use crate::metadata::cilmodule::CilModule;

/// Low-level file access
pub use crate::{File, Parser};

/// Metadata tokens and table identifiers
pub use crate::metadata::{tables::TableId, token::Token};

/// Assembly identity as read from the manifest and its attributes
pub use crate::metadata::identity::{AssemblyVersion, ModuleIdentity};

/// Method bodies and their exception handlers
pub use crate::metadata::method::{ExceptionHandler, MethodBody};

/// Method signatures
pub use crate::metadata::signatures::MethodSignature;

// ================================================================================================
// Instructions
// ================================================================================================

/// Decoded instructions and editable instruction streams
pub use crate::assembly::{decode, Instruction, InstructionStream, Operand};

// ================================================================================================
// Patching and Shimming
// ================================================================================================

/// Entry method rewrite
pub use crate::{BytecodePatcher, PatchConfig, PatchReport};

/// Identity rewrite
pub use crate::{AssemblyShimmer, ShimReport};

// ================================================================================================
// Installation
// ================================================================================================

/// Installer settings and file naming
pub use crate::config::{FileNaming, InstallerConfig};

/// Installation state machine and its artifacts
pub use crate::install::{
    CleanReport, DeployOutcome, FolderLayout, GameTarget, InstallOutcome, InstallState,
    InstallationManager, UninstallOutcome,
};

// ================================================================================================
// Runtime Bridge
// ================================================================================================

/// Bridge settings
pub use crate::config::{BridgeConfig, ReadinessPolicy};

/// The bridge and the host boundary it runs against
pub use crate::bridge::{
    BridgeContext, DependencyResolver, EngineInitArgs, GodotBool, ModuleRuntime, ReadinessOutcome,
    SceneHost,
};
