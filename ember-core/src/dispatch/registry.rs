use hashbrown::HashMap;

use super::handlers::{handle_echo, handle_get, handle_ping, handle_set};
use super::{CommandArity, CommandSpec};
use crate::command::{CommandFrame, CommandReply};
use crate::keyspace::Keyspace;

/// Runtime command registry.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    entries: HashMap<String, CommandSpec>,
}

impl CommandRegistry {
    /// Builds an empty command registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Builds a registry preloaded with the data-path commands.
    #[must_use]
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self::new();
        registry.register(CommandSpec {
            name: "PING",
            arity: CommandArity::AtLeast(0),
            propagates: false,
            handler: handle_ping,
        });
        registry.register(CommandSpec {
            name: "ECHO",
            arity: CommandArity::AtLeast(1),
            propagates: false,
            handler: handle_echo,
        });
        registry.register(CommandSpec {
            name: "SET",
            arity: CommandArity::AtLeast(2),
            propagates: true,
            handler: handle_set,
        });
        registry.register(CommandSpec {
            name: "GET",
            arity: CommandArity::Exact(1),
            propagates: false,
            handler: handle_get,
        });
        registry
    }

    /// Registers or replaces one command in the table.
    pub fn register(&mut self, spec: CommandSpec) {
        self.entries.insert(spec.name.to_owned(), spec);
    }

    /// Returns `true` when `name` resolves to a registered command.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_uppercase())
    }

    /// Returns `true` when a successful `name` execution must reach replicas.
    #[must_use]
    pub fn propagates_writes(&self, name: &str) -> bool {
        self.entries
            .get(&name.to_ascii_uppercase())
            .is_some_and(|spec| spec.propagates)
    }

    /// Validates command existence and arity without executing handler logic.
    ///
    /// # Errors
    ///
    /// Returns user-facing error text for unknown command names or invalid argument count.
    pub fn validate_frame(&self, frame: &CommandFrame) -> Result<(), String> {
        let command_name = frame.name.to_ascii_uppercase();
        let Some(spec) = self.entries.get(&command_name) else {
            return Err(format!("unknown command '{command_name}'"));
        };

        match spec.arity {
            CommandArity::Exact(expected) if frame.args.len() != expected => Err(format!(
                "wrong number of arguments for '{}' command",
                spec.name
            )),
            CommandArity::AtLeast(minimum) if frame.args.len() < minimum => Err(format!(
                "wrong number of arguments for '{}' command",
                spec.name
            )),
            _ => Ok(()),
        }
    }

    /// Dispatches one canonical command frame to its registered handler.
    #[must_use]
    pub fn dispatch(&self, frame: &CommandFrame, keyspace: &mut Keyspace) -> CommandReply {
        if let Err(message) = self.validate_frame(frame) {
            return CommandReply::Error(message);
        }

        let command_name = frame.name.to_ascii_uppercase();
        let Some(spec) = self.entries.get(&command_name) else {
            return CommandReply::Error(format!("unknown command '{command_name}'"));
        };
        (spec.handler)(frame, keyspace)
    }
}
