// The in-flight command envelope and its one-shot reply slot.
//
// Purpose
// - Hand a caller's request to the worker together with a channel that can be
//   resolved exactly once, with a success payload or an error, never both.
//
// Notes
// - `oneshot::Sender::send` consumes the sender, so double resolution is
//   unrepresentable; the exactly-once contract needs no runtime bookkeeping.

use crate::core::errors::CommandError;
use tokio::sync::oneshot;

pub type CommandOutcome = Result<Vec<u8>, CommandError>;

pub struct Command {
    pub entity_id: String,
    /// Client-chosen idempotency token, unique per entity across all time.
    pub command_id: String,
    pub command_name: String,
    pub request: Vec<u8>,
    reply: oneshot::Sender<CommandOutcome>,
}

impl Command {
    pub fn new(
        entity_id: impl Into<String>,
        command_id: impl Into<String>,
        command_name: impl Into<String>,
        request: Vec<u8>,
    ) -> (Self, Ticket) {
        let (reply, slot) = oneshot::channel();
        let command = Self {
            entity_id: entity_id.into(),
            command_id: command_id.into(),
            command_name: command_name.into(),
            request,
            reply,
        };
        (command, Ticket(slot))
    }

    /// Resolve the caller's ticket. A caller that dropped its ticket simply
    /// never observes the outcome; the commit itself is unaffected.
    pub fn resolve(self, outcome: CommandOutcome) {
        let _ = self.reply.send(outcome);
    }
}

/// The caller's half of a submitted command.
pub struct Ticket(oneshot::Receiver<CommandOutcome>);

impl Ticket {
    /// Suspend until the worker resolves the command.
    pub async fn wait(self) -> CommandOutcome {
        match self.0.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CommandError::Storage(
                "worker stopped before resolving the command".to_string(),
            )),
        }
    }
}
