//! Command tables exposed by modules.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cmdres::{CmdResult, CmdValue};
use crate::module::gate::GateGuard;
use crate::module::params::parse_int;
use crate::module::Module;
use crate::Result;

/// Number of raw arguments a command takes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Arity {
    Zero,
    /// A single optional argument, passed verbatim
    One,
}

/// Callback run under the module gate. The argument is `None` for [`Arity::Zero`] commands and when no argument was given.
pub type Callback<M> = fn(&M, &mut GateGuard<'_>, Option<&str>) -> Result<CmdResult>;

pub struct Command<M> {
    pub description: String,
    pub arity: Arity,
    pub param_description: String,
    callback: Callback<M>,
    enabled: AtomicBool,
}

impl<M> Command<M> {
    pub fn new(description: &str, arity: Arity, param_description: &str, callback: Callback<M>) -> Self {
        Self {
            description: description.to_string(),
            arity,
            param_description: param_description.to_string(),
            callback,
            enabled: AtomicBool::new(true),
        }
    }

    /// Same command, initially disabled.
    pub fn disabled(self) -> Self {
        self.enabled.store(false, Ordering::SeqCst);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn call(&self, module: &M, gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
        let arg = match self.arity {
            Arity::Zero => None,
            Arity::One => arg,
        };
        (self.callback)(module, gate, arg)
    }
}

/// Commands of one module keyed by name. Starts out with `status`, `switch` and `outscr`.
pub struct CommandTable<M> {
    commands: BTreeMap<String, Command<M>>,
}

impl<M: Module> Default for CommandTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Module> CommandTable<M> {
    pub fn new() -> Self {
        let mut table = Self {
            commands: BTreeMap::new(),
        };
        table.insert("status", Command::new("Get current status", Arity::Zero, "", status::<M>));
        table.insert(
            "switch",
            Command::new("Deactivate/activate the module", Arity::One, "[0|1|-1]", switch::<M>),
        );
        table.insert(
            "outscr",
            Command::new("Deactivate/activate screen output", Arity::One, "[0|1|-1]", output_screen::<M>),
        );
        table
    }

    /// Adds a command, replacing any command of the same name.
    pub fn insert(&mut self, name: &str, command: Command<M>) -> &mut Self {
        self.commands.insert(name.to_string(), command);
        self
    }

    pub fn with(mut self, name: &str, command: Command<M>) -> Self {
        self.insert(name, command);
        self
    }
}

impl<M> CommandTable<M> {
    pub fn get(&self, name: &str) -> Option<&Command<M>> {
        self.commands.get(name)
    }

    /// Enables or disables a command at runtime. Returns false for unknown names.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.commands.get(name) {
            Some(command) => {
                command.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Command<M>)> {
        self.commands.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// `-1` toggles, `0` clears, anything else sets.
fn toggle(current: bool, arg: Option<&str>) -> Result<bool> {
    let mode = arg.map(parse_int).transpose()?.unwrap_or(-1);
    Ok(match mode {
        -1 => !current,
        0 => false,
        _ => true,
    })
}

fn state_text(active: bool) -> &'static str {
    if active {
        "active"
    } else {
        "inactive"
    }
}

fn status<M: Module>(module: &M, _gate: &mut GateGuard<'_>, _arg: Option<&str>) -> Result<CmdResult> {
    let core = module.core();
    Ok(CmdResult::text("status", "Current status", state_text(core.is_active())))
}

fn switch<M: Module>(module: &M, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let core = module.core();
    let active = toggle(core.is_active(), arg)?;
    core.set_active(active);
    Ok(CmdResult::new("switch", "Activation state", CmdValue::Str(state_text(active).to_string())))
}

fn output_screen<M: Module>(module: &M, _gate: &mut GateGuard<'_>, arg: Option<&str>) -> Result<CmdResult> {
    let core = module.core();
    let enabled = toggle(core.output_screen(), arg)?;
    core.set_output_screen(enabled);
    Ok(CmdResult::new("outscr", "Screen output state", CmdValue::Str(state_text(enabled).to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_modes() {
        assert!(!toggle(true, None).unwrap());
        assert!(toggle(false, Some("-1")).unwrap());
        assert!(!toggle(true, Some("0")).unwrap());
        assert!(toggle(false, Some("1")).unwrap());
        assert!(toggle(false, Some("x")).is_err());
    }
}
