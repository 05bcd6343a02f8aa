use std::path::PathBuf;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Container Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::NotSupported`] - Unsupported file format or feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] / [`Error::GoblinErr`] - I/O and PE parsing failures
///
/// ## Patching Errors
/// - [`Error::ModuleLoad`] - A module could not be read or parsed
/// - [`Error::EntryNotFound`] - The entry type or method does not exist
/// - [`Error::AnchorNotFound`] - The entry method lacks the expected anchor call
/// - [`Error::UnresolvedReference`] - A reference needed for injection cannot be imported
/// - [`Error::Serialization`] - The rewritten module could not be written
///
/// ## Installation Errors
/// - [`Error::LoaderModuleNotFound`] - The shim template is missing
/// - [`Error::DirectoryNotFound`] - The game data directory is missing
/// - [`Error::Deploy`] - A single support module failed to copy
///
/// ## Runtime Bridge Errors
/// - [`Error::ContractMismatch`] / [`Error::EntryContractMissing`] - The loaded module does not
///   expose the expected entry point
/// - [`Error::ReadinessTimedOut`] - The scene graph never became ready
/// - [`Error::Runtime`] - The host runtime reported a failure
///
/// # Examples
///
/// ```rust,no_run
/// use mlg::{Error, BytecodePatcher, PatchConfig};
/// use std::path::Path;
///
/// let patcher = BytecodePatcher::new(PatchConfig::default());
/// match patcher.patch(Path::new("Game_original.dll"), Path::new("Game_patched.dll")) {
///     Ok(report) => println!("patched {} return sites", report.return_sites),
///     Err(Error::AnchorNotFound { method, anchor }) => {
///         eprintln!("{method} does not call {anchor}, incompatible engine version");
///     }
///     Err(e) => eprintln!("patch failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// A module could not be read or is not a valid managed module.
    #[error("Failed to load module {}: {source}", path.display())]
    ModuleLoad {
        /// Path of the module that failed to load
        path: PathBuf,
        /// Underlying parse or I/O failure
        source: Box<Error>,
    },

    /// The configured entry type or entry method does not exist in the module.
    #[error("Entry method {type_name}::{method} not found")]
    EntryNotFound {
        /// Fully qualified name of the entry type
        type_name: String,
        /// Name of the entry method
        method: String,
    },

    /// The entry method contains no call matching the anchor pattern.
    ///
    /// This indicates an incompatible engine version; no output is produced.
    #[error("No call to '{anchor}' found in {method}")]
    AnchorNotFound {
        /// Entry method that was scanned
        method: String,
        /// Name of the anchor call target
        anchor: String,
    },

    /// The rewritten module could not be written to its destination.
    #[error("Failed to write module {}: {source}", path.display())]
    Serialization {
        /// Destination path
        path: PathBuf,
        /// Underlying encoding or I/O failure
        source: Box<Error>,
    },

    /// The loader module used as the shim template is absent.
    #[error("Loader module not found at {}", .0.display())]
    LoaderModuleNotFound(PathBuf),

    /// A support module failed to copy into the install layout.
    ///
    /// Deployment collects these per file instead of aborting.
    #[error("Failed to deploy {}: {source}", file.display())]
    Deploy {
        /// Support module that failed to copy
        file: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The expected game data directory could not be located.
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A reference required by an injected instruction could not be imported.
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// The loaded module exposes an entry contract of a different version.
    #[error("Entry contract mismatch: expected version {expected}, found {found}")]
    ContractMismatch {
        /// Version the bridge was built against
        expected: u32,
        /// Version reported by the loaded module
        found: u32,
    },

    /// The loaded module does not expose an entry contract at all.
    #[error("Loaded module does not expose entry {0}")]
    EntryContractMissing(String),

    /// The scene graph did not become ready within the configured bound.
    #[error("Scene graph not ready after {attempts} attempts")]
    ReadinessTimedOut {
        /// Number of polls performed before giving up
        attempts: u64,
    },

    /// The host runtime reported a failure.
    #[error("Runtime failure: {0}")]
    Runtime(String),
}
