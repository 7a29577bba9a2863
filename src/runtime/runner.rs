//! Shell-state owner consulted by compiled code through host helpers.

use std::collections::HashMap;

/// Variables and mode of the shell driving a closure.
pub trait Runner {
    /// Looks up a shell variable.
    fn get_var(&self, name: &str) -> Option<String>;

    /// Sets a shell variable.
    fn set_var(&mut self, name: &str, value: &str);

    /// Returns `true` when the shell reads commands from a terminal.
    fn is_interactive(&self) -> bool;
}

/// Map-backed [`Runner`].
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    interactive: bool,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new(interactive: bool) -> Self {
        Self {
            vars: HashMap::new(),
            interactive,
        }
    }

    /// Creates an environment seeded from the process environment.
    pub fn from_process(interactive: bool) -> Self {
        Self {
            vars: std::env::vars().collect(),
            interactive,
        }
    }

    /// Removes a variable.
    pub fn unset_var(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }
}

impl Runner for Environment {
    fn get_var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set_var(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}
