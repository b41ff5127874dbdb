//! The module contract: lifecycle hooks, a command table and a per-instance gate.
//!
//! Modules implement [`Module`]. The engine drives them through the object safe [`DynModule`], which every [`Module`] gets for free. All hooks take `&self`, modules keep their state behind interior mutability so that the scheduler and command dispatch can share one instance.
//!
//! ## Example
//! ```rust
//! use canfuzz::module::{CommandTable, DynModule, Module, ModuleCore, Params};
//! use canfuzz::output::OutputSink;
//!
//! struct Passthrough {
//!     core: ModuleCore,
//!     commands: CommandTable<Self>,
//! }
//!
//! impl Module for Passthrough {
//!     fn core(&self) -> &ModuleCore {
//!         &self.core
//!     }
//!     fn commands(&self) -> &CommandTable<Self> {
//!         &self.commands
//!     }
//! }
//!
//! let module = Passthrough {
//!     core: ModuleCore::new("passthrough", &Params::default(), OutputSink::default()).unwrap(),
//!     commands: CommandTable::new(),
//! };
//! assert_eq!(module.invoke("status").as_str(), Some("active"));
//! ```

mod command;
mod gate;
mod params;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cmdres::{CmdResult, ERR_BUSY, ERR_GENERIC, ERR_NOT_FOUND};
use crate::engine::Envelope;
use crate::error::Error;
use crate::output::{Level, OutputSink};
use crate::Result;

pub use command::{Arity, Callback, Command, CommandTable};
pub use gate::{Gate, GateGuard};
pub use params::{parse_int, Params, DEFAULT_PIPE};

/// Seconds a step or command waits for the gate by default.
pub const DEFAULT_TIMEOUT_SECS: f64 = 3.0;

/// Status codes kept by [`ModuleCore`].
pub const STATUS_OK: i32 = 0;
pub const STATUS_FATAL: i32 = -1;
pub const STATUS_ERROR: i32 = -2;

/// State shared by every module, configured from the module's init parameters.
///
/// Recognised parameters: `bus` (label for output, defaults to the module name), `active`, `output_screen`, `debug` (verbosity) and `timeout` (gate timeout in seconds).
pub struct ModuleCore {
    name: String,
    bus: String,
    active: AtomicBool,
    output_screen: AtomicBool,
    debug: AtomicI64,
    status: AtomicI32,
    error_text: Mutex<String>,
    gate: Gate,
    sink: OutputSink,
}

impl ModuleCore {
    pub fn new(name: &str, params: &Params, sink: OutputSink) -> Result<Self> {
        let timeout = params.parse::<f64>("timeout")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !timeout.is_finite() || timeout < 0.0 {
            return Err(Error::InvalidArgument(format!("timeout={}", timeout)));
        }

        Ok(Self {
            name: name.to_string(),
            bus: params.get_or("bus", name).to_string(),
            active: AtomicBool::new(params.get_bool("active", true)),
            output_screen: AtomicBool::new(params.get_bool("output_screen", false)),
            debug: AtomicI64::new(params.get_int("debug")?.unwrap_or(0)),
            status: AtomicI32::new(STATUS_OK),
            error_text: Mutex::new(String::new()),
            gate: Gate::new(Duration::from_secs_f64(timeout)),
            sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &str {
        &self.bus
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn output_screen(&self) -> bool {
        self.output_screen.load(Ordering::SeqCst)
    }

    pub fn set_output_screen(&self, enabled: bool) {
        self.output_screen.store(enabled, Ordering::SeqCst);
    }

    pub fn debug_level(&self) -> i64 {
        self.debug.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> i32 {
        self.status.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: i32) {
        self.status.store(status, Ordering::SeqCst);
    }

    /// Current status and the last message, which is cleared by the call.
    pub fn take_status(&self) -> (i32, String) {
        let text = std::mem::take(&mut *self.error_text.lock());
        (self.status(), text)
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    fn output(&self, level: Level, text: &str) {
        if self.output_screen() {
            match level {
                Level::Info => info!("[{}] {}", self.bus, text),
                Level::Debug => debug!("[{}] {}", self.bus, text),
                Level::Error | Level::Fatal => error!("[{}] [{}] {}", self.bus, level, text),
            }
        } else {
            self.sink.emit(&self.bus, level, text);
        }
    }

    fn record(&self, status: i32, text: &str) {
        self.set_status(status);
        *self.error_text.lock() = text.to_string();
    }

    pub fn info(&self, text: &str) {
        self.output(Level::Info, text);
        self.record(STATUS_OK, text);
    }

    pub fn error(&self, text: &str) {
        self.output(Level::Error, text);
        self.record(STATUS_ERROR, text);
    }

    /// Unrecoverable failure. The module is deactivated, the scheduler keeps running.
    pub fn fatal(&self, text: &str) {
        self.output(Level::Fatal, text);
        self.record(STATUS_FATAL, text);
        self.set_active(false);
        warn!("{} deactivated after fatal error: {}", self.name, text);
    }

    /// Debug output, shown when `level` does not exceed the configured verbosity.
    pub fn dprint(&self, level: i64, text: &str) {
        if level <= self.debug_level() {
            self.output(Level::Debug, text);
        }
    }
}

/// A processing unit of the pipeline.
pub trait Module: Sized + Send + Sync + 'static {
    fn core(&self) -> &ModuleCore;

    fn commands(&self) -> &CommandTable<Self>;

    /// Processes the envelope of the action's pipe. Only called while the module is active and the gate is held.
    fn effect(&self, envelope: Envelope, _params: &Params) -> Envelope {
        envelope
    }

    fn on_start(&self, _params: &Params) {}

    fn on_stop(&self, _params: &Params) {}

    fn on_exit(&self, _params: &Params) {}
}

/// Object safe view of a module used by the engine.
pub trait DynModule: Send + Sync {
    fn name(&self) -> &str;
    fn is_active(&self) -> bool;
    fn set_active(&self, active: bool);
    /// Calls the start hook unless the module is inactive.
    fn start(&self, params: &Params);
    fn stop(&self, params: &Params);
    fn exit(&self, params: &Params);
    /// Runs the stop hook with the old and the start hook with the new action parameters under the gate.
    fn restart(&self, old: &Params, new: &Params) -> Result<()>;
    /// Runs one scheduling step. Inactive modules and a gate that stays busy pass the envelope through.
    fn step(&self, envelope: Envelope, params: &Params) -> Envelope;
    /// Parses `name [argument]` and runs the command under the gate. Failures are returned as error results.
    fn invoke(&self, line: &str) -> CmdResult;
    fn status_bar(&self) -> (i32, String);
}

impl<M: Module> DynModule for M {
    fn name(&self) -> &str {
        self.core().name()
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn set_active(&self, active: bool) {
        self.core().set_active(active)
    }

    fn start(&self, params: &Params) {
        if self.core().is_active() {
            self.on_start(params);
        }
    }

    fn stop(&self, params: &Params) {
        if self.core().is_active() {
            self.on_stop(params);
        }
    }

    fn exit(&self, params: &Params) {
        if self.core().is_active() {
            self.on_exit(params);
        }
    }

    fn restart(&self, old: &Params, new: &Params) -> Result<()> {
        let _guard = self.core().gate().acquire()?;
        self.on_stop(old);
        self.on_start(new);
        Ok(())
    }

    fn step(&self, envelope: Envelope, params: &Params) -> Envelope {
        let core = self.core();
        if !core.is_active() {
            return envelope;
        }

        match core.gate().acquire() {
            Ok(_guard) => self.effect(envelope, params),
            Err(_) => {
                warn!("{}: gate busy for {:?}, skipping step", core.name(), core.gate().timeout());
                envelope
            }
        }
    }

    fn invoke(&self, line: &str) -> CmdResult {
        let full = line.trim_start();
        let (name, arg) = match full.split_once(' ') {
            Some((name, arg)) => (name, Some(arg).filter(|a| !a.trim().is_empty())),
            None => (full.trim_end(), None),
        };

        let Some(command) = self.commands().get(name) else {
            return CmdResult::error(full, &format!("Command not found: {}", name), ERR_NOT_FOUND);
        };
        if !command.is_enabled() {
            return CmdResult::error(full, "Command disabled", ERR_GENERIC);
        }

        let core = self.core();
        let mut guard = match core.gate().acquire() {
            Ok(guard) => guard,
            Err(e) => return CmdResult::error(full, "Module busy", ERR_BUSY).with_cause(e),
        };

        match command.call(self, &mut guard, arg) {
            Ok(mut result) => {
                result.cmdline = full.to_string();
                result
            }
            Err(e) => {
                core.error(&format!("Command '{}' failed: {}", full, e));
                CmdResult::error(full, "Command failed", ERR_GENERIC).with_cause(e)
            }
        }
    }

    fn status_bar(&self) -> (i32, String) {
        self.core().take_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdres::ResultKind;

    struct Counter {
        core: ModuleCore,
        commands: CommandTable<Self>,
        steps: Mutex<u32>,
    }

    fn fail(_module: &Counter, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
        Err(Error::InvalidArgument(arg.unwrap_or_default().to_string()))
    }

    fn echo(_module: &Counter, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
        Ok(CmdResult::text("echo", "Echo", arg.unwrap_or("<none>")))
    }

    impl Module for Counter {
        fn core(&self) -> &ModuleCore {
            &self.core
        }
        fn commands(&self) -> &CommandTable<Self> {
            &self.commands
        }
        fn effect(&self, envelope: Envelope, _params: &Params) -> Envelope {
            *self.steps.lock() += 1;
            envelope
        }
    }

    fn counter(params: Params) -> Counter {
        Counter {
            core: ModuleCore::new("counter", &params, OutputSink::default()).unwrap(),
            commands: CommandTable::new()
                .with("fail", Command::new("Always fails", Arity::One, "<text>", fail))
                .with("echo", Command::new("Echo argument", Arity::One, "<text>", echo))
                .with("off", Command::new("Disabled", Arity::Zero, "", echo).disabled()),
            steps: Mutex::new(0),
        }
    }

    #[test]
    fn builtin_commands() {
        let module = counter(Params::default());
        assert_eq!(module.invoke("status").as_str(), Some("active"));
        assert_eq!(module.invoke("switch").as_str(), Some("inactive"));
        assert!(!module.is_active());
        assert_eq!(module.invoke("switch 1").as_str(), Some("active"));
        assert_eq!(module.invoke("outscr 1").as_str(), Some("active"));
        assert!(module.core().output_screen());
    }

    #[test]
    fn argument_parsing() {
        let module = counter(Params::default());
        assert_eq!(module.invoke("  echo hello world").as_str(), Some("hello world"));
        assert_eq!(module.invoke("echo").as_str(), Some("<none>"));
        assert_eq!(module.invoke("echo ").as_str(), Some("<none>"));
        assert_eq!(module.invoke("echo x").cmdline, "echo x");
    }

    #[test]
    fn failures_become_results() {
        let module = counter(Params::default());

        let result = module.invoke("nope");
        assert_eq!(result.kind(), ResultKind::Error);
        assert_eq!(result.error_code, ERR_NOT_FOUND);

        let result = module.invoke("off");
        assert_eq!(result.error_code, ERR_GENERIC);

        let result = module.invoke("fail boom");
        assert_eq!(result.error_code, ERR_GENERIC);
        assert_eq!(result.cause.as_deref(), Some("Invalid Argument: boom"));
        assert_eq!(module.core().status(), STATUS_ERROR);
    }

    #[test]
    fn inactive_module_skips_step() {
        let module = counter(Params::from([("active", "false")]));
        let envelope = module.step(Envelope::default(), &Params::default());
        assert!(!envelope.has_can_data);
        assert_eq!(*module.steps.lock(), 0);

        module.set_active(true);
        module.step(Envelope::default(), &Params::default());
        assert_eq!(*module.steps.lock(), 1);
    }

    #[test]
    fn fatal_deactivates() {
        let module = counter(Params::default());
        module.core().fatal("adapter gone");
        assert!(!module.is_active());
        assert_eq!(module.status_bar(), (STATUS_FATAL, "adapter gone".to_string()));
        assert_eq!(module.status_bar().1, "");

        let lines = module.core().sink().take("counter");
        assert_eq!(lines, vec!["[FATAL] adapter gone".to_string()]);
    }

    #[test]
    fn invalid_timeout() {
        let result = ModuleCore::new("x", &Params::from([("timeout", "-1")]), OutputSink::default());
        assert!(result.is_err());
    }
}
