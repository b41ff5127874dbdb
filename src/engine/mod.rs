//! Pipeline engine. Owns the ordered action list and drives the scheduling loop on a dedicated thread.
//!
//! Every tick starts with empty pipes. Actions run in configured order and each one receives the envelope of its pipe as left by the previous action bound to the same pipe. Nothing is carried over to the next tick.

mod config;
mod envelope;
mod registry;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::cmdres::{CmdResult, ERR_NOT_FOUND};
use crate::error::Error;
use crate::module::{DynModule, Params};
use crate::output::OutputSink;
use crate::Result;

pub use config::EngineConfig;
pub use envelope::{Envelope, DEFAULT_BUS};
pub use registry::{base_name, Constructor, Registry};

/// A module bound to its per-action parameters.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub module: Arc<dyn DynModule>,
    pub params: Params,
}

type Actions = Arc<RwLock<Vec<Action>>>;
type Snapshot = Vec<(Arc<dyn DynModule>, Params)>;

struct Runner {
    processing_handle: Option<std::thread::JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    stop_pending: Arc<AtomicBool>,
}

fn snapshot(actions: &Actions) -> Snapshot {
    actions
        .read()
        .iter()
        .map(|action| (action.module.clone(), action.params.clone()))
        .collect()
}

/// Runs every action once, in order. Returns the pipes as left by the last action on each.
fn run_tick(actions: &Snapshot) -> HashMap<String, Envelope> {
    let mut pipes: HashMap<String, Envelope> = HashMap::new();

    for (module, params) in actions {
        if !module.is_active() {
            continue;
        }

        let pipe = params.pipe();
        let envelope = pipes.remove(pipe).unwrap_or_default();
        let envelope = module.step(envelope, params);
        pipes.insert(pipe.to_string(), envelope);
    }

    pipes
}

fn process(
    actions: Actions,
    mut shutdown_receiver: oneshot::Receiver<()>,
    stop_pending: Arc<AtomicBool>,
    tick_interval: Duration,
) {
    info!("Scheduler started");

    // A dropped sender also ends the loop
    while matches!(shutdown_receiver.try_recv(), Err(TryRecvError::Empty)) {
        run_tick(&snapshot(&actions));
        std::thread::sleep(tick_interval);
    }

    for (module, params) in snapshot(&actions) {
        module.stop(&params);
    }

    stop_pending.store(false, Ordering::SeqCst);
    info!("Scheduler stopped");
}

pub struct Engine {
    config: EngineConfig,
    registry: Registry,
    sink: OutputSink,
    modules: BTreeMap<String, Arc<dyn DynModule>>,
    actions: Actions,
    runner: Option<Runner>,
}

impl Engine {
    pub fn new(config: EngineConfig, registry: Registry) -> Self {
        Self {
            sink: OutputSink::new(config.output_timeout),
            config,
            registry,
            modules: BTreeMap::new(),
            actions: Arc::new(RwLock::new(Vec::new())),
            runner: None,
        }
    }

    /// Sink shared by all modules created by this engine.
    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_some()
    }

    /// Instantiates modules from `(name, init params)` pairs through the registry.
    pub fn load_modules(&mut self, specs: &[(String, Params)]) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        for (name, params) in specs {
            let module = self.registry.create(name, params, self.sink.clone())?;
            info!("Loaded module {}", name);
            self.modules.insert(name.clone(), module);
        }
        Ok(())
    }

    /// Adds an already constructed module instance under `name`.
    pub fn insert_module(&mut self, name: &str, module: Arc<dyn DynModule>) {
        self.modules.insert(name.to_string(), module);
    }

    /// Appends actions from `(module name, action params)` pairs. Parameters get the default pipe when none is given.
    pub fn load_actions(&mut self, specs: &[(String, Params)]) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        let mut actions = Vec::with_capacity(specs.len());
        for (name, params) in specs {
            let module = self
                .modules
                .get(name)
                .ok_or_else(|| Error::ModuleNotFound(name.clone()))?;
            actions.push(Action {
                name: name.clone(),
                module: module.clone(),
                params: params.clone().validated(),
            });
        }

        self.actions.write().extend(actions);
        Ok(())
    }

    pub fn load(&mut self, modules: &[(String, Params)], actions: &[(String, Params)]) -> Result<()> {
        self.load_modules(modules)?;
        self.load_actions(actions)
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn DynModule>> {
        self.modules.get(name).cloned()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.read().clone()
    }

    /// Index of the first action using module `name`.
    pub fn find_action(&self, name: &str) -> Option<usize> {
        self.actions.read().iter().position(|action| action.name == name)
    }

    /// Runs a single tick on the calling thread.
    pub fn tick(&self) -> HashMap<String, Envelope> {
        run_tick(&snapshot(&self.actions))
    }

    /// Starts every action's module in order, then spawns the scheduling loop.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        for (module, params) in snapshot(&self.actions) {
            module.start(&params);
        }

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let stop_pending = Arc::new(AtomicBool::new(false));

        let actions = self.actions.clone();
        let pending = stop_pending.clone();
        let tick_interval = self.config.tick_interval;
        let processing_handle = std::thread::spawn(move || {
            process(actions, shutdown_receiver, pending, tick_interval);
        });

        self.runner = Some(Runner {
            processing_handle: Some(processing_handle),
            shutdown: Some(shutdown_sender),
            stop_pending,
        });
        Ok(())
    }

    /// Requests a stop and waits until the loop finished its tick and stopped every module.
    pub fn stop(&mut self) {
        let Some(mut runner) = self.runner.take() else {
            return;
        };

        runner.stop_pending.store(true, Ordering::SeqCst);
        if let Some(shutdown) = runner.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(handle) = runner.processing_handle.take() {
            while runner.stop_pending.load(Ordering::SeqCst) && !handle.is_finished() {
                std::thread::sleep(self.config.stop_poll_interval);
            }
            if handle.join().is_err() {
                warn!("Scheduler thread panicked");
            }
        }
        debug!("Engine stopped");
    }

    /// Replaces the parameters of one action. An active module is deactivated and restarted with the new parameters. When the restart fails the old parameters stay in place.
    pub fn edit(&self, index: usize, params: Params) -> Result<()> {
        let (module, old) = {
            let actions = self.actions.read();
            let action = actions.get(index).ok_or(Error::ActionNotFound(index))?;
            (action.module.clone(), action.params.clone())
        };
        let new = params.validated();

        let was_active = module.is_active();
        if was_active {
            module.set_active(false);
        }

        {
            let mut actions = self.actions.write();
            let action = actions.get_mut(index).ok_or(Error::ActionNotFound(index))?;
            action.params = new.clone();
        }

        let result = if was_active {
            module.restart(&old, &new)
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            warn!("Action {} not restarted, keeping its parameters: {}", index, e);
            if let Some(action) = self.actions.write().get_mut(index) {
                action.params = old;
            }
        }

        if was_active {
            module.set_active(true);
        }
        result
    }

    /// Sends a command line to the module of one action.
    pub fn invoke(&self, index: usize, line: &str) -> CmdResult {
        let module = self.actions.read().get(index).map(|action| action.module.clone());
        match module {
            Some(module) => module.invoke(line),
            None => CmdResult::error(line, &format!("Module {} not found", index), ERR_NOT_FOUND)
                .with_cause(Error::ActionNotFound(index)),
        }
    }

    /// Stops the engine if needed and runs the exit hook of every action's module.
    pub fn exit(&mut self) {
        self.stop();
        for (module, params) in snapshot(&self.actions) {
            module.exit(&params);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
