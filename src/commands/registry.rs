use std::collections::HashMap;
use std::sync::Arc;

use crate::commands::Command;
use crate::commands::builtin::{EchoCommand, PurgeHistoryCommand, ShellCommand};

/// Registry mapping command names to implementations.
///
/// Names are matched without case; registering the same name twice replaces
/// the earlier command.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in command.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(EchoCommand)
            .register(ShellCommand)
            .register(PurgeHistoryCommand);
        registry
    }

    /// Register a command under its own name
    pub fn register<C>(&mut self, command: C) -> &mut Self
    where
        C: Command + 'static,
    {
        self.register_arc(Arc::new(command))
    }

    pub fn register_arc(&mut self, command: Arc<dyn Command>) -> &mut Self {
        self.commands
            .insert(command.name().to_ascii_lowercase(), command);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.trim().to_ascii_lowercase()).cloned()
    }

    /// Registered commands sorted by name.
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        let mut commands: Vec<_> = self.commands.values().cloned().collect();
        commands.sort_by_key(|c| c.name());
        commands
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.commands.values().map(|c| c.name()).collect();
        names.sort_unstable();
        f.debug_struct("CommandRegistry").field("commands", &names).finish()
    }
}
