// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory
// - 'writer/output.rs' uses mmap to write the output file
// - 'bridge/mod.rs' marks the host's opaque entry arguments as Send

//! # mlg
//!
//! An offline patcher for the managed game module of Godot DotNet games, and a reversible
//! installer that puts a mod loader in front of it.
//!
//! A Godot DotNet game ships its scripts as one managed module, `<name>.dll`, whose
//! `GodotPlugins.Game.Main::InitializeFromGameProject` the engine calls at startup. `mlg`
//!
//! - rewrites that method so it also registers the scripts of `MLG.Bootstrap` and calls a hook
//!   before every return ([`BytecodePatcher`]),
//! - turns a loader module into a stand-in carrying the game module's identity
//!   ([`AssemblyShimmer`]),
//! - installs both next to the game and undoes it byte for byte
//!   ([`install::InstallationManager`]),
//! - and provides the runtime side that runs inside the host ([`bridge`]).
//!
//! Everything works on the module files directly: there is no dependency on a .NET runtime.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mlg::prelude::*;
//! use std::path::Path;
//!
//! let manager = InstallationManager::new(InstallerConfig::default());
//! let target = manager.target(Path::new("games/Game/Game.exe"))?;
//!
//! match manager.install(&target)? {
//!     InstallOutcome::AlreadyInstalled => println!("{} is already installed", target.name),
//!     InstallOutcome::Installed(report) => {
//!         println!("Patched {}, {} return sites", report.patch.new_name, report.patch.return_sites);
//!     }
//! }
//! # Ok::<(), mlg::Error>(())
//! ```
//!
//! ### Patching a module
//!
//! ```rust,no_run
//! use mlg::{BytecodePatcher, PatchConfig};
//! use std::path::Path;
//!
//! let patcher = BytecodePatcher::new(PatchConfig::godot("Game"));
//! let report = patcher.patch(Path::new("Game_original.dll"), Path::new("Game_patched.dll"))?;
//! println!("Anchor at IL_{:04X}", report.anchor_offset);
//! # Ok::<(), mlg::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`](File) - PE container access and layout
//! - [`metadata`] - ECMA-335 metadata streams and tables, read and written back
//! - [`assembly`] - CIL instruction decoding, editing and encoding
//! - [`writer`] - Serialising an edited module into a new image
//! - [`patcher`] - The entry method rewrite
//! - [`shim`] - The identity rewrite
//! - [`install`] - Game discovery, backup, deployment and restore
//! - [`bridge`] - Runtime hook bridge, readiness watcher and dependency resolver
//! - [`config`] - Settings for all of the above
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use mlg::{BytecodePatcher, Error};
//! use std::path::Path;
//!
//! match BytecodePatcher::default().patch(Path::new("Game.dll"), Path::new("Game_patched.dll")) {
//!     Ok(report) => println!("Renamed to {}", report.new_name),
//!     Err(Error::AnchorNotFound { method, anchor }) => println!("{method} never calls {anchor}"),
//!     Err(e) => println!("Error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(any(test, feature = "fixtures"))]
#[doc(hidden)]
#[allow(missing_docs)]
pub mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use mlg::prelude::*;
///
/// let module = CilModule::from_file("Game.dll".as_ref())?;
/// println!("{}", module.identity()?.name);
/// # Ok::<(), mlg::Error>(())
/// ```
pub mod prelude;

/// ECMA-335 metadata: the root, heaps, tables, signatures and method bodies.
///
/// [`metadata::cilmodule::CilModule`] ties them together with the module's PE image and is the
/// type every edit goes through.
pub mod metadata;

/// CIL instruction streams.
///
/// Bodies are decoded into an [`assembly::InstructionStream`] of instructions whose branch
/// targets are instruction indices, edited by index, and re-encoded with short branches widened
/// where their displacement no longer fits.
pub mod assembly;

/// Writing an edited module into a new PE image.
pub mod writer;

/// The entry method rewrite, see [`BytecodePatcher`].
pub mod patcher;

pub mod shim;

/// Installing, uninstalling and repairing the mod loader in a game directory.
pub mod install;

/// The runtime hook bridge, run from the shim inside the host.
pub mod bridge;

pub mod config;

/// `mlg` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `mlg` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Rewrites a game module's entry method.
pub use patcher::{BytecodePatcher, PatchReport};

/// Rewrites a loader module's identity.
pub use shim::{AssemblyShimmer, ShimReport};

/// Settings of the patcher.
pub use config::PatchConfig;

/// Low-level file access and a byte parser.
///
/// # Example
///
/// ```rust,no_run
/// use mlg::File;
///
/// let file = File::from_file("Game.dll".as_ref())?;
/// println!("Metadata at RVA 0x{:X}", file.clr().0);
/// # Ok::<(), mlg::Error>(())
/// ```
pub use file::{parser::Parser, File};
