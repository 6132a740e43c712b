// Worker is the enqueue side of the command-processing engine.
//
// Purpose
// - Hand commands to the single background task that owns one log handle and
//   one entity cache, and give the caller a one-shot ticket for the outcome.
//
// Concurrency
// - Callers never touch the log handle or the cache; they only enqueue.
// - Commands submitted through the same worker are drained in FIFO arrival
//   order, which totally orders all commands for an entity as long as they
//   route through one worker.
// - The queue is bounded; a full queue makes `submit` wait for space rather
//   than drop (deliberate backpressure).
//
// Shutdown
// - The queue closes when every `Worker` clone has been dropped; the task
//   drains what is already queued, then exits. Await the `JoinHandle`
//   returned by `spawn` for a graceful stop. There is no per-command timeout
//   or cancellation: once enqueued, a command is always attempted.

use crate::application::batch::WorkerTask;
use crate::core::command::{Command, CommandOutcome, Ticket};
use crate::core::errors::CommandError;
use crate::core::ports::CommandLog;
use crate::core::store::{CREATE_COMMAND, EntityStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Commands that may sit in the queue before `submit` exerts backpressure.
    pub queue_capacity: usize,
    /// Commands drained into one write batch; bounds batch size and tail latency.
    pub batch_limit: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_limit: 1000,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Clone)]
pub struct Worker {
    queue: mpsc::Sender<Command>,
}

impl Worker {
    /// Start the background task bound to one store and one log handle. The
    /// task is the sole writer on that handle and the sole mutator of its
    /// entity cache.
    pub fn spawn<S>(
        store: Arc<EntityStore<S>>,
        log: Arc<dyn CommandLog>,
        config: WorkerConfig,
    ) -> (Worker, JoinHandle<()>)
    where
        S: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let (queue, commands) = mpsc::channel(config.queue_capacity);
        let task = WorkerTask::new(store, log, commands, config);
        let join = tokio::spawn(task.run());
        (Worker { queue }, join)
    }

    /// Enqueue a command and return the ticket its outcome will arrive on.
    /// Waits only when the queue is full.
    pub async fn submit(
        &self,
        entity_id: impl Into<String>,
        command_id: impl Into<String>,
        command_name: impl Into<String>,
        request: Vec<u8>,
    ) -> Result<Ticket, CommandError> {
        let (command, ticket) = Command::new(entity_id, command_id, command_name, request);
        self.queue
            .send(command)
            .await
            .map_err(|_| CommandError::Storage("worker queue closed".to_string()))?;
        Ok(ticket)
    }

    /// Enqueue and wait for the outcome.
    pub async fn handle(
        &self,
        entity_id: impl Into<String>,
        command_id: impl Into<String>,
        command_name: impl Into<String>,
        request: Vec<u8>,
    ) -> CommandOutcome {
        let ticket = self
            .submit(entity_id, command_id, command_name, request)
            .await?;
        ticket.wait().await
    }

    /// Bring an entity into existence. The command id is the fixed name of
    /// the create command, so a retried creation collides on the uniqueness
    /// constraint and replays the original creation response.
    pub async fn create(&self, entity_id: impl Into<String>, request: Vec<u8>) -> CommandOutcome {
        self.handle(entity_id, CREATE_COMMAND, CREATE_COMMAND, request)
            .await
    }
}
