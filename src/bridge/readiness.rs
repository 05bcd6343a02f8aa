use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use tokio::sync::watch;

use crate::{
    bridge::SceneHost,
    config::{PluginLoaderPayload, ReadinessPolicy},
    Error::{ReadinessTimedOut, Runtime},
    Result,
};

/// Name of the watcher thread.
pub const WATCHER_THREAD: &str = "mlg-readiness";

/// How a readiness watcher finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// The scene graph became ready and the plugin loader is attached
    Completed,
    /// The scene graph was not ready after the configured number of polls
    TimedOut {
        /// Polls made
        attempts: u64,
    },
    /// [`ReadinessHandle::cancel`] was called before the graph became ready
    Cancelled,
    /// The plugin loader could not be brought up
    Failed(String),
}

impl ReadinessOutcome {
    /// `Ok` for completed and cancelled watchers.
    ///
    /// # Errors
    /// - [`crate::Error::ReadinessTimedOut`] for a timed out watcher
    /// - [`crate::Error::Runtime`] for a failed one
    pub fn into_result(self) -> Result<()> {
        match self {
            ReadinessOutcome::Completed | ReadinessOutcome::Cancelled => Ok(()),
            ReadinessOutcome::TimedOut { attempts } => Err(ReadinessTimedOut { attempts }),
            ReadinessOutcome::Failed(message) => Err(Runtime(message)),
        }
    }
}

/// Polls the host until its scene graph is ready, then brings up the plugin loader.
pub struct ReadinessWatcher {
    host: Arc<dyn SceneHost>,
    policy: ReadinessPolicy,
    payload: PluginLoaderPayload,
}

impl ReadinessWatcher {
    /// Watch `host` with `policy`, delivering `payload` once ready.
    #[must_use]
    pub fn new(
        host: Arc<dyn SceneHost>,
        policy: ReadinessPolicy,
        payload: PluginLoaderPayload,
    ) -> Self {
        ReadinessWatcher {
            host,
            policy,
            payload,
        }
    }

    /// Run the watcher on its own thread with a single-threaded runtime.
    ///
    /// Dropping the returned handle detaches the watcher; it keeps polling until the graph is
    /// ready or the bound is reached.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the thread cannot be spawned.
    pub fn spawn(self) -> Result<ReadinessHandle> {
        let (cancel, cancelled) = watch::channel(false);

        let thread = thread::Builder::new()
            .name(WATCHER_THREAD.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        log::error!("Failed to start the readiness runtime: {error}");
                        return ReadinessOutcome::Failed(error.to_string());
                    }
                };
                runtime.block_on(self.run(cancelled))
            })?;

        Ok(ReadinessHandle {
            cancel,
            thread: Some(thread),
        })
    }

    /// Poll until ready, timed out or cancelled through `cancelled`.
    pub async fn run(&self, mut cancelled: watch::Receiver<bool>) -> ReadinessOutcome {
        let mut attempts = 0u64;

        loop {
            if *cancelled.borrow() {
                log::info!("Readiness watcher cancelled after {attempts} polls");
                return ReadinessOutcome::Cancelled;
            }

            if self.host.is_graph_ready() {
                log::info!("Scene graph ready, loading the plugin loader");
                return match self.deliver() {
                    Ok(()) => ReadinessOutcome::Completed,
                    Err(error) => {
                        log::error!("Failed to load the plugin loader: {error}");
                        ReadinessOutcome::Failed(error.to_string())
                    }
                };
            }

            attempts += 1;
            if self
                .policy
                .max_attempts
                .is_some_and(|max_attempts| attempts >= max_attempts)
            {
                log::warn!("Scene graph not ready after {attempts} polls, giving up");
                return ReadinessOutcome::TimedOut { attempts };
            }

            tokio::select! {
                () = tokio::time::sleep(self.policy.interval) => {}
                changed = cancelled.changed() => {
                    // Sender gone: the handle was dropped, keep polling detached
                    if changed.is_err() {
                        tokio::time::sleep(self.policy.interval).await;
                    }
                }
            }
        }
    }

    fn deliver(&self) -> Result<()> {
        if let Err(error) = self.host.load_resource_pack(&self.payload.resource_pack) {
            log::warn!(
                "Failed to load resource pack {}: {error}",
                self.payload.resource_pack
            );
        }

        let module = self
            .host
            .user_data_dir()
            .join(&self.payload.loader_module);
        self.host.register_scripts(&module)?;
        log::debug!("Registered scripts of {}", module.display());

        let node = self.host.instantiate_scene(&self.payload.scene)?;
        self.host.attach_to_root(node)?;
        log::info!("Attached {} to the scene graph", self.payload.scene);
        Ok(())
    }
}

/// Controls a spawned [`ReadinessWatcher`].
#[derive(Debug)]
pub struct ReadinessHandle {
    cancel: watch::Sender<bool>,
    thread: Option<JoinHandle<ReadinessOutcome>>,
}

impl ReadinessHandle {
    /// Ask the watcher to stop at its next poll.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Returns `true` once the watcher has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.thread {
            Some(thread) => thread.is_finished(),
            None => true,
        }
    }

    /// Wait for the watcher to stop.
    pub fn join(mut self) -> ReadinessOutcome {
        let Some(thread) = self.thread.take() else {
            return ReadinessOutcome::Cancelled;
        };

        thread
            .join()
            .unwrap_or_else(|_| ReadinessOutcome::Failed("readiness watcher panicked".to_string()))
    }
}
