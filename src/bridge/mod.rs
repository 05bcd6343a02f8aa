//! Runtime side of the shim: the code that runs when the host calls the game entry point.
//!
//! The host calls the shim's entry point believing it is the game's. [`BridgeContext`] then
//!
//! 1. installs a [`DependencyResolver`] for the support modules,
//! 2. patches `<name>_original.dll` into `<name>_patched.dll`,
//! 3. loads the patched module through the [`ModuleRuntime`],
//! 4. resolves the game entry point through its [`GameEntryContract`],
//! 5. invokes it with the host's arguments and hands back its result unchanged,
//! 6. starts a [`ReadinessWatcher`] that brings up the plugin loader once the host's scene
//!    graph is ready.
//!
//! Failures in steps 1 through 5 never reach the host: they are logged and reported as
//! [`GodotBool::FALSE`]. The host side of steps 3 and 6 sits behind the [`ModuleRuntime`] and
//! [`SceneHost`] traits.
//!
//! # Examples
//!
//! ```rust,ignore
//! mlg::export_game_main_init!(|| {
//!     mlg::bridge::BridgeContext::new(&shim_path()?, runtime(), host(), Default::default())
//! });
//! ```

mod readiness;
mod resolver;

pub use readiness::{ReadinessHandle, ReadinessOutcome, ReadinessWatcher, WATCHER_THREAD};
pub use resolver::{simple_name, DependencyResolver};

use std::{
    any::Any,
    ffi::c_void,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    config::{BridgeConfig, PatchConfig},
    install::FolderLayout,
    BytecodePatcher,
    Error::{self, ContractMismatch, EntryContractMissing, EntryNotFound},
    Result,
};

/// Version of [`GameEntryContract`] this bridge speaks.
pub const GAME_ENTRY_CONTRACT_VERSION: u32 = 1;

/// The host's one-byte boolean.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GodotBool(u8);

impl GodotBool {
    /// False
    pub const FALSE: GodotBool = GodotBool(0);
    /// True
    pub const TRUE: GodotBool = GodotBool(1);

    /// Wrap a raw value as passed by the host.
    #[must_use]
    pub const fn from_raw(value: u8) -> Self {
        GodotBool(value)
    }

    /// The raw value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Any non-zero value is true.
    #[must_use]
    pub const fn is_true(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for GodotBool {
    fn from(value: bool) -> Self {
        if value {
            GodotBool::TRUE
        } else {
            GodotBool::FALSE
        }
    }
}

/// Arguments of the host's game entry point, passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineInitArgs {
    /// Handle of the host library
    pub godot_dll_handle: *mut c_void,
    /// Table the game fills with its managed callbacks
    pub out_managed_callbacks: *mut c_void,
    /// Table of host callbacks
    pub unmanaged_callbacks: *mut c_void,
    /// Size of the host callback table
    pub unmanaged_callbacks_size: i32,
}

// The handles are opaque to the bridge and only passed back to the host.
unsafe impl Send for EngineInitArgs {}
unsafe impl Sync for EngineInitArgs {}

/// A callable game entry point.
pub type EntryPoint = Box<dyn Fn(EngineInitArgs) -> GodotBool>;

/// Versioned access to the entry points of a loaded module.
pub trait GameEntryContract {
    /// Contract version the module implements.
    fn version(&self) -> u32;

    /// The static method `method` of `type_name`, if the module defines it.
    fn entry_point(&self, type_name: &str, method: &str) -> Option<EntryPoint>;
}

/// A module loaded by the [`ModuleRuntime`].
pub trait LoadedModule {
    /// Display name of the loaded module.
    fn name(&self) -> String;

    /// The module's entry contract, `None` if it exposes none.
    fn entry_contract(&self) -> Option<&dyn GameEntryContract>;
}

/// The host's module loader.
pub trait ModuleRuntime: Send + Sync {
    /// Route dependency loads the host cannot satisfy through `resolver`.
    ///
    /// # Errors
    /// Returns an error if the host rejects the resolver.
    fn install_resolver(&self, resolver: DependencyResolver) -> Result<()>;

    /// Load the module at `path`.
    ///
    /// # Errors
    /// Returns an error if the host cannot load the module.
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>>;
}

/// A node instantiated from a scene, identified by the host's instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneNode(pub u64);

/// The host's scene graph.
pub trait SceneHost: Send + Sync {
    /// Returns `true` once the scene graph and its root exist.
    fn is_graph_ready(&self) -> bool;

    /// Mount the resource pack at `pack`.
    ///
    /// # Errors
    /// Returns an error if the pack cannot be mounted.
    fn load_resource_pack(&self, pack: &str) -> Result<()>;

    /// The host's user data directory.
    fn user_data_dir(&self) -> PathBuf;

    /// Load `module` and register its scripts with the host.
    ///
    /// # Errors
    /// Returns an error if the module cannot be loaded.
    fn register_scripts(&self, module: &Path) -> Result<()>;

    /// Instantiate the packed scene at `scene`.
    ///
    /// # Errors
    /// Returns an error if the scene cannot be loaded.
    fn instantiate_scene(&self, scene: &str) -> Result<SceneNode>;

    /// Add `node` as a child of the scene graph root.
    ///
    /// # Errors
    /// Returns an error if the node cannot be attached.
    fn attach_to_root(&self, node: SceneNode) -> Result<()>;
}

/// The entry point the bridge expects in the patched module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContract {
    /// Required [`GameEntryContract::version`]
    pub version: u32,
    /// Full name of the declaring type
    pub type_name: String,
    /// Method name
    pub method: String,
}

impl EntryContract {
    /// The entry method patched by `config`.
    #[must_use]
    pub fn for_patch(config: &PatchConfig) -> Self {
        EntryContract {
            version: GAME_ENTRY_CONTRACT_VERSION,
            type_name: config.entry_type.clone(),
            method: config.entry_method.clone(),
        }
    }

    /// Look the entry point up in `module`.
    ///
    /// # Errors
    /// - [`crate::Error::EntryContractMissing`] if the module exposes no contract
    /// - [`crate::Error::ContractMismatch`] if the contract version differs
    /// - [`crate::Error::EntryNotFound`] if the method is not defined
    pub fn resolve(&self, module: &dyn LoadedModule) -> Result<EntryPoint> {
        let Some(contract) = module.entry_contract() else {
            return Err(EntryContractMissing(format!(
                "{}::{}",
                self.type_name, self.method
            )));
        };

        if contract.version() != self.version {
            return Err(ContractMismatch {
                expected: self.version,
                found: contract.version(),
            });
        }

        contract
            .entry_point(&self.type_name, &self.method)
            .ok_or_else(|| EntryNotFound {
                type_name: self.type_name.clone(),
                method: self.method.clone(),
            })
    }
}

/// Everything the bridge needs, built once when the host calls the entry point.
pub struct BridgeContext {
    name: String,
    data_dir: PathBuf,
    runtime: Arc<dyn ModuleRuntime>,
    host: Arc<dyn SceneHost>,
    config: BridgeConfig,
    watcher_started: AtomicBool,
    watcher: Mutex<Option<ReadinessHandle>>,
}

impl BridgeContext {
    /// Context for the shim loaded from `module_path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if `module_path` has no file name.
    pub fn new(
        module_path: &Path,
        runtime: Arc<dyn ModuleRuntime>,
        host: Arc<dyn SceneHost>,
        config: BridgeConfig,
    ) -> Result<Self> {
        let Some(name) = module_path.file_stem().and_then(|stem| stem.to_str()) else {
            return Err(Error::Error(format!(
                "{} does not name a module",
                module_path.display()
            )));
        };

        let data_dir = match module_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(BridgeContext {
            name: name.to_string(),
            data_dir,
            runtime,
            host,
            config,
            watcher_started: AtomicBool::new(false),
            watcher: Mutex::new(None),
        })
    }

    /// The game name, the shim's file stem.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the shim.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<name>_original.dll`
    #[must_use]
    pub fn original_module(&self) -> PathBuf {
        self.data_dir.join(self.config.naming.backup(&self.name))
    }

    /// `<name>_patched.dll`
    #[must_use]
    pub fn patched_module(&self) -> PathBuf {
        self.data_dir.join(self.config.naming.patched(&self.name))
    }

    /// Resolver for the support modules in the install root.
    #[must_use]
    pub fn resolver(&self) -> DependencyResolver {
        let layout = FolderLayout::new(self.data_dir.join(&self.config.naming.install_root));
        DependencyResolver::for_layout(&layout, &self.config.naming)
    }

    /// Run the game entry point for the host.
    ///
    /// Returns the game's own result. Any failure or panic before the game entry returns is
    /// logged and reported as [`GodotBool::FALSE`]. On a true result the readiness watcher is
    /// started.
    pub fn initialize_from_engine(&self, args: EngineInitArgs) -> GodotBool {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.initialize(args))) {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                log::error!("Failed to initialize {}: {error}", self.name);
                return GodotBool::FALSE;
            }
            Err(payload) => {
                log::error!(
                    "Initialization of {} panicked: {}",
                    self.name,
                    panic_message(payload.as_ref())
                );
                return GodotBool::FALSE;
            }
        };

        if result.is_true() {
            self.on_entry_returned();
        } else {
            log::warn!("Game entry of {} returned false", self.name);
        }
        result
    }

    fn initialize(&self, args: EngineInitArgs) -> Result<GodotBool> {
        log::info!("Living in {}", self.data_dir.display());
        self.runtime.install_resolver(self.resolver())?;

        let mut patch = self.config.patch.clone();
        patch.return_hook_type.assembly = Some(self.name.clone());
        BytecodePatcher::new(patch).patch(&self.original_module(), &self.patched_module())?;

        let module = self.runtime.load(&self.patched_module())?;
        log::info!(
            "Loaded {} from {}",
            module.name(),
            self.patched_module().display()
        );

        let entry = EntryContract::for_patch(&self.config.patch).resolve(module.as_ref())?;
        log::info!("Calling the game entry point");
        let result = entry(args);
        log::info!("Game entry returned {result:?}");
        Ok(result)
    }

    /// Start the readiness watcher unless it was started before.
    ///
    /// This is where the patched entry's return hook lands. Returns `true` if this call
    /// started the watcher.
    pub fn on_entry_returned(&self) -> bool {
        if self
            .watcher_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Readiness watcher already started");
            return false;
        }

        log::info!("Waiting for the scene graph");
        let watcher = ReadinessWatcher::new(
            self.host.clone(),
            self.config.readiness,
            self.config.payload.clone(),
        );
        match watcher.spawn() {
            Ok(handle) => {
                *lock!(self.watcher) = Some(handle);
                true
            }
            Err(error) => {
                log::error!("Failed to start the readiness watcher: {error}");
                false
            }
        }
    }

    /// Returns `true` once the readiness watcher has been started.
    #[must_use]
    pub fn watcher_started(&self) -> bool {
        self.watcher_started.load(Ordering::Acquire)
    }

    /// Take the watcher's handle, leaving the watcher detached from the context.
    pub fn take_readiness(&self) -> Option<ReadinessHandle> {
        lock!(self.watcher).take()
    }
}

/// Build a context with `factory` and run the game entry point.
///
/// Used by [`crate::export_game_main_init`]. A failing or panicking factory yields
/// [`GodotBool::FALSE`]. The context is dropped on return; its watcher keeps running detached.
pub fn run_entry<F>(args: EngineInitArgs, factory: F) -> GodotBool
where
    F: FnOnce() -> Result<BridgeContext>,
{
    let context = match panic::catch_unwind(AssertUnwindSafe(factory)) {
        Ok(Ok(context)) => context,
        Ok(Err(error)) => {
            log::error!("Failed to set up the bridge: {error}");
            return GodotBool::FALSE;
        }
        Err(payload) => {
            log::error!(
                "Bridge setup panicked: {}",
                panic_message(payload.as_ref())
            );
            return GodotBool::FALSE;
        }
    };

    context.initialize_from_engine(args)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Export the host's game entry point, `godotsharp_game_main_init`.
///
/// `$factory` is a closure returning `Result<BridgeContext>`; it runs on every call.
#[macro_export]
macro_rules! export_game_main_init {
    ($factory:expr) => {
        /// Game entry point called by the host.
        #[no_mangle]
        pub extern "C" fn godotsharp_game_main_init(
            godot_dll_handle: *mut ::std::ffi::c_void,
            out_managed_callbacks: *mut ::std::ffi::c_void,
            unmanaged_callbacks: *mut ::std::ffi::c_void,
            unmanaged_callbacks_size: i32,
        ) -> $crate::bridge::GodotBool {
            $crate::bridge::run_entry(
                $crate::bridge::EngineInitArgs {
                    godot_dll_handle,
                    out_managed_callbacks,
                    unmanaged_callbacks,
                    unmanaged_callbacks_size,
                },
                $factory,
            )
        }
    };
}
