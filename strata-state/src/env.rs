//! Environment variable lookup
//!
//! Backends consult environment variables as fallbacks for several
//! attributes. Lookups go through [`Environment`] so the rules can be
//! exercised without touching the process environment.

use std::collections::HashMap;

/// Source of environment variables
pub trait Environment: Send + Sync {
    /// Raw lookup; `None` when the variable is not set
    fn lookup(&self, name: &str) -> Option<String>;

    /// Value of a variable, treating an empty value as unset
    fn var(&self, name: &str) -> Option<String> {
        self.lookup(name).filter(|v| !v.is_empty())
    }

    /// First non-empty variable among `names`
    fn first_var(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.var(name))
    }
}

/// The environment of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
