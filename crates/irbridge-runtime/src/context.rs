//! Execution context threaded through every translated function.

use std::collections::HashMap;
use std::fmt;

use crate::{Memory, Outcome, Trap, Value};

/// Host implementation of a declared-but-undefined function.
pub type ExternalFn = Box<dyn Fn(&mut Memory, &[Value]) -> Outcome<Value> + Send + Sync>;

pub struct Context {
    pub memory: Memory,
    externals: HashMap<String, ExternalFn>,
}

impl Context {
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            externals: HashMap::new(),
        }
    }

    /// Bind `name` to a host function. Replaces any previous binding.
    pub fn register_external<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Memory, &[Value]) -> Outcome<Value> + Send + Sync + 'static,
    {
        self.externals.insert(name.into(), Box::new(f));
    }

    pub fn has_external(&self, name: &str) -> bool {
        self.externals.contains_key(name)
    }

    /// Call a registered external. Unbound names trap with `UnresolvedExternal`.
    pub fn call_external(&mut self, name: &str, args: &[Value]) -> Outcome<Value> {
        let f = self
            .externals
            .get(name)
            .ok_or(Trap::UnresolvedExternal)?;
        f(&mut self.memory, args)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Memory::new())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.externals.keys().collect();
        names.sort();
        f.debug_struct("Context")
            .field("memory_size", &self.memory.size())
            .field("stack_pointer", &self.memory.stack_pointer())
            .field("externals", &names)
            .finish()
    }
}
