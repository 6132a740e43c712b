// Ports define what the core needs from the outside world, without implementing it.
//
// Purpose
// - Describe the durable command log as a trait so the engine stays agnostic
//   of query syntax and connection handling.
//
// Responsibilities
// - Expose exactly three operations: latest-version read, point lookup by
//   (entity_id, command_id), and an atomic multi-row append.
//
// Boundaries
// - Implementations must enforce UNIQUE(entity_id, command_id) and the
//   gapless per-entity version sequence atomically; idempotent replay
//   correctness depends on it.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandLogError {
    #[error("uniqueness violation for entity {entity_id}, command {command_id}")]
    Conflict {
        entity_id: String,
        command_id: String,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

/// One committed row of an entity's append-only log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub entity_id: String,
    pub version: i64,
    pub command_id: String,
    pub command_name: String,
    pub request: Vec<u8>,
    pub response: Vec<u8>,
    /// Snapshot of the entity state after the command.
    pub state: Vec<u8>,
    /// Epoch milliseconds, assigned by the storage adapter on commit.
    pub committed_at: i64,
}

/// A composed row that has not been committed yet. Identical to [`LogRecord`]
/// minus the commit timestamp, which only the storage adapter may assign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub entity_id: String,
    pub version: i64,
    pub command_id: String,
    pub command_name: String,
    pub request: Vec<u8>,
    pub response: Vec<u8>,
    pub state: Vec<u8>,
}

#[async_trait]
pub trait CommandLog: Send + Sync {
    /// Highest-version row for the entity, if any row exists.
    async fn latest(&self, entity_id: &str) -> Result<Option<LogRecord>, CommandLogError>;

    /// The row committed for an exact (entity_id, command_id) pair, if any.
    async fn find(
        &self,
        entity_id: &str,
        command_id: &str,
    ) -> Result<Option<LogRecord>, CommandLogError>;

    /// Append all rows in one atomic statement. Any uniqueness violation
    /// fails the whole batch; nothing is committed partially.
    async fn append(&self, rows: &[PendingRecord]) -> Result<(), CommandLogError>;
}
