// Error taxonomy for the command write path.
//
// Purpose
// - Give every failure class its own variant so callers can tell validation
//   problems apart from domain rejections and storage faults.
//
// Boundaries
// - Handler-level failures (UnknownCommand, Decode, Rejected) never produce a
//   log row and never touch the entity cache.
// - Commit-level failures (Conflict, Storage) invalidate the affected cache
//   entries before any replay lookup is attempted.

use crate::core::ports::CommandLogError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("no handler registered for command: {0}")]
    UnknownCommand(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("malformed request: {0}")]
    Decode(String),

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("conflicting commit for entity {entity_id}, command {command_id}")]
    Conflict {
        entity_id: String,
        command_id: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CommandLogError> for CommandError {
    fn from(err: CommandLogError) -> Self {
        match err {
            CommandLogError::Conflict {
                entity_id,
                command_id,
            } => CommandError::Conflict {
                entity_id,
                command_id,
            },
            CommandLogError::Backend(message) => CommandError::Storage(message),
        }
    }
}
