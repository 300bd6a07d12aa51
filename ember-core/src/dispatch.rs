//! Command registration and dispatch.
//!
//! Protocol parsing produces a canonical command frame, then a registry resolves
//! and executes the matching handler against the shared keyspace. Each table
//! entry also declares whether a successful execution must be propagated to
//! attached replicas, so the server layer never hardcodes command names.

use crate::command::{CommandFrame, CommandReply};
use crate::keyspace::Keyspace;

#[path = "dispatch/command_spec.rs"]
mod command_spec;
#[path = "dispatch/handlers.rs"]
mod handlers;
#[path = "dispatch/registry.rs"]
mod registry;

pub use command_spec::{CommandArity, CommandSpec};
pub use registry::CommandRegistry;

/// Handler function signature used by command registry entries.
pub type CommandHandler = fn(&CommandFrame, &mut Keyspace) -> CommandReply;
