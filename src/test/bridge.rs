use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    bridge::{
        DependencyResolver, EngineInitArgs, EntryPoint, GameEntryContract, GodotBool,
        LoadedModule, ModuleRuntime, SceneHost, SceneNode, GAME_ENTRY_CONTRACT_VERSION,
    },
    metadata::cilmodule::CilModule,
    test::{ENTRY_METHOD, ENTRY_TYPE},
    Error::Runtime,
    Result,
};

/// What the fake game entry point does when invoked.
#[derive(Debug, Clone, Copy)]
pub enum EntryBehavior {
    Return(GodotBool),
    Panic,
}

#[derive(Default)]
struct EntryLog {
    invocations: Mutex<Vec<EngineInitArgs>>,
    requested: Mutex<Vec<(String, String)>>,
}

/// A module runtime that parses what it loads and exposes a scripted entry point.
pub struct FakeRuntime {
    behavior: EntryBehavior,
    contract_version: Option<u32>,
    resolver: Mutex<Option<DependencyResolver>>,
    loaded: Mutex<Vec<PathBuf>>,
    log: Arc<EntryLog>,
}

impl FakeRuntime {
    pub fn new(behavior: EntryBehavior) -> Self {
        FakeRuntime {
            behavior,
            contract_version: Some(GAME_ENTRY_CONTRACT_VERSION),
            resolver: Mutex::new(None),
            loaded: Mutex::new(Vec::new()),
            log: Arc::new(EntryLog::default()),
        }
    }

    /// Contract version of loaded modules, no contract if `None`.
    pub fn with_contract_version(mut self, version: Option<u32>) -> Self {
        self.contract_version = version;
        self
    }

    /// A loaded module without going through a file.
    pub fn module(&self) -> Box<dyn LoadedModule> {
        Box::new(FakeModule {
            name: "Game.Patched".to_string(),
            version: self.contract_version,
            behavior: self.behavior,
            log: self.log.clone(),
        })
    }

    pub fn resolver(&self) -> Option<DependencyResolver> {
        self.resolver.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<PathBuf> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn invocations(&self) -> Vec<EngineInitArgs> {
        self.log.invocations.lock().unwrap().clone()
    }

    pub fn requested(&self) -> Vec<(String, String)> {
        self.log.requested.lock().unwrap().clone()
    }
}

impl ModuleRuntime for FakeRuntime {
    fn install_resolver(&self, resolver: DependencyResolver) -> Result<()> {
        *self.resolver.lock().unwrap() = Some(resolver);
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Box<dyn LoadedModule>> {
        let module = CilModule::from_file(path)?;
        self.loaded.lock().unwrap().push(path.to_path_buf());

        Ok(Box::new(FakeModule {
            name: module.assembly_name()?.to_string(),
            version: self.contract_version,
            behavior: self.behavior,
            log: self.log.clone(),
        }))
    }
}

struct FakeModule {
    name: String,
    version: Option<u32>,
    behavior: EntryBehavior,
    log: Arc<EntryLog>,
}

impl LoadedModule for FakeModule {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn entry_contract(&self) -> Option<&dyn GameEntryContract> {
        self.version.map(|_| self as &dyn GameEntryContract)
    }
}

impl GameEntryContract for FakeModule {
    fn version(&self) -> u32 {
        self.version.unwrap_or_default()
    }

    fn entry_point(&self, type_name: &str, method: &str) -> Option<EntryPoint> {
        self.log
            .requested
            .lock()
            .unwrap()
            .push((type_name.to_string(), method.to_string()));

        if type_name != ENTRY_TYPE || method != ENTRY_METHOD {
            return None;
        }

        let behavior = self.behavior;
        let log = self.log.clone();
        Some(Box::new(move |args| {
            log.invocations.lock().unwrap().push(args);
            match behavior {
                EntryBehavior::Return(result) => result,
                EntryBehavior::Panic => panic!("game entry failed"),
            }
        }))
    }
}

/// A scene host that records every call made to it.
pub struct RecordingHost {
    ready_after: Option<usize>,
    pack: bool,
    scene: bool,
    polls: AtomicUsize,
    calls: Mutex<Vec<String>>,
    threads: Mutex<Vec<String>>,
}

impl RecordingHost {
    /// Ready on poll `polls + 1`.
    pub fn ready_after(polls: usize) -> Self {
        RecordingHost {
            ready_after: Some(polls),
            pack: true,
            scene: true,
            polls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn never_ready() -> Self {
        RecordingHost {
            ready_after: None,
            ..Self::ready_after(0)
        }
    }

    pub fn without_pack(mut self) -> Self {
        self.pack = false;
        self
    }

    pub fn without_scene(mut self) -> Self {
        self.scene = false;
        self
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of the threads that polled, in order of first poll.
    pub fn threads(&self) -> Vec<String> {
        self.threads.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SceneHost for RecordingHost {
    fn is_graph_ready(&self) -> bool {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);

        let name = std::thread::current()
            .name()
            .unwrap_or_default()
            .to_string();
        let mut threads = self.threads.lock().unwrap();
        if !threads.contains(&name) {
            threads.push(name);
        }

        self.ready_after.is_some_and(|ready_after| poll >= ready_after)
    }

    fn load_resource_pack(&self, pack: &str) -> Result<()> {
        if !self.pack {
            return Err(Runtime(format!("cannot mount {pack}")));
        }
        self.record(format!("pack {pack}"));
        Ok(())
    }

    fn user_data_dir(&self) -> PathBuf {
        PathBuf::from("/user")
    }

    fn register_scripts(&self, module: &Path) -> Result<()> {
        self.record(format!("scripts {}", module.display()));
        Ok(())
    }

    fn instantiate_scene(&self, scene: &str) -> Result<SceneNode> {
        if !self.scene {
            return Err(Runtime(format!("cannot load {scene}")));
        }
        self.record(format!("instantiate {scene}"));
        Ok(SceneNode(7))
    }

    fn attach_to_root(&self, node: SceneNode) -> Result<()> {
        self.record(format!("attach {}", node.0));
        Ok(())
    }
}
