// The worker task: drains the command queue into micro-batches, applies
// handlers against the entity cache, and commits batched writes.
//
// Purpose
// - Serialize all writes for one log handle behind a single loop so the
//   cache and the handle need no locking.
//
// Responsibilities
// - Resolve each command's entity from the cache, falling back to a durable
//   read on miss.
// - Compose pending rows, commit them in one atomic statement, and resolve
//   every caller's ticket exactly once.
// - On a failed commit, invalidate the touched cache entries and fall back to
//   per-command conflict resolution: idempotent replay or a surfaced error.

use crate::core::command::{Command, CommandOutcome};
use crate::core::entity::Entity;
use crate::core::errors::CommandError;
use crate::core::ports::{CommandLog, CommandLogError, PendingRecord};
use crate::core::store::{CREATE_COMMAND, EntityStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::application::worker::WorkerConfig;

pub(crate) struct WorkerTask<S> {
    store: Arc<EntityStore<S>>,
    log: Arc<dyn CommandLog>,
    queue: mpsc::Receiver<Command>,
    cache: HashMap<String, Entity<S>>,
    config: WorkerConfig,
}

impl<S> WorkerTask<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(
        store: Arc<EntityStore<S>>,
        log: Arc<dyn CommandLog>,
        queue: mpsc::Receiver<Command>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            log,
            queue,
            cache: HashMap::new(),
            config,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(entity = %self.store.entity_name(), "worker started");
        loop {
            let (batch, closed) = self.drain();
            if batch.is_empty() {
                if closed {
                    break;
                }
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }
            debug!(
                entity = %self.store.entity_name(),
                commands = batch.len(),
                "processing command batch"
            );
            self.process_batch(batch).await;
        }
        info!(entity = %self.store.entity_name(), "worker stopped");
    }

    /// Take everything currently queued, without blocking, up to the batch
    /// cap. Also reports whether the queue has been closed by the callers.
    fn drain(&mut self) -> (Vec<Command>, bool) {
        let mut batch = Vec::new();
        let mut closed = false;
        while batch.len() < self.config.batch_limit {
            match self.queue.try_recv() {
                Ok(command) => batch.push(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        (batch, closed)
    }

    async fn process_batch(&mut self, batch: Vec<Command>) {
        if let Some(retries) = self.commit_batch(batch).await {
            warn!(
                entity = %self.store.entity_name(),
                commands = retries.len(),
                "batch commit failed, retrying each command as a singleton"
            );
            for command in retries {
                // A singleton batch resolves its command itself and never
                // asks for another retry.
                self.commit_batch(vec![command]).await;
            }
        }
    }

    /// Stage every command into a pending row, commit the rows atomically and
    /// resolve the tickets. Returns the unresolved commands when a
    /// multi-command commit failed and each must run as its own singleton.
    async fn commit_batch(&mut self, commands: Vec<Command>) -> Option<Vec<Command>> {
        let mut staged: Vec<(Command, CommandOutcome)> = Vec::with_capacity(commands.len());
        let mut rows: Vec<PendingRecord> = Vec::new();
        for command in commands {
            match self.stage(&command).await {
                Ok(row) => {
                    let response = row.response.clone();
                    rows.push(row);
                    staged.push((command, Ok(response)));
                }
                Err(err) => staged.push((command, Err(err))),
            }
        }

        if rows.is_empty() {
            for (command, outcome) in staged {
                command.resolve(outcome);
            }
            return None;
        }

        match self.log.append(&rows).await {
            Ok(()) => {
                for (command, outcome) in staged {
                    command.resolve(outcome);
                }
                None
            }
            Err(err) => {
                // A contending worker may have advanced any of these
                // entities; the cache must be rebuilt from durable reads.
                for row in &rows {
                    self.cache.remove(&row.entity_id);
                }
                let mut commands: Vec<Command> =
                    staged.into_iter().map(|(command, _)| command).collect();
                if commands.len() == 1 {
                    if let Some(command) = commands.pop() {
                        self.resolve_singleton(command, err).await;
                    }
                    return None;
                }
                Some(commands)
            }
        }
    }

    /// Conflict resolution for a batch of one: a committed row for the same
    /// (entity_id, command_id) means someone else already applied this
    /// command, and its stored response is the caller's answer.
    async fn resolve_singleton(&mut self, command: Command, commit_err: CommandLogError) {
        match self.log.find(&command.entity_id, &command.command_id).await {
            Ok(Some(record)) => {
                debug!(
                    entity_id = %command.entity_id,
                    command_id = %command.command_id,
                    "duplicate command replayed from the log"
                );
                command.resolve(Ok(record.response));
            }
            Ok(None) => command.resolve(Err(commit_err.into())),
            Err(err) => command.resolve(Err(err.into())),
        }
    }

    /// Turn one command into a pending log row, advancing the cache entry
    /// speculatively so later commands in the same batch observe the pending
    /// write. Any error aborts only this command and leaves the cache as is.
    async fn stage(&mut self, command: &Command) -> Result<PendingRecord, CommandError> {
        let store = Arc::clone(&self.store);
        let handler = store
            .handler(&command.command_name)
            .ok_or_else(|| CommandError::UnknownCommand(command.command_name.clone()))?;

        let mut created: Option<Entity<S>> = None;
        let entity: &mut Entity<S> = if command.command_name == CREATE_COMMAND {
            // A create never reads prior state; a duplicate create surfaces
            // at commit time and resolves through replay.
            created.insert(store.fresh_entity(&command.entity_id)?)
        } else {
            match self.cache.entry(command.entity_id.clone()) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let loaded = store.get(self.log.as_ref(), &command.entity_id).await?;
                    slot.insert(loaded)
                }
            }
        };

        let outcome = handler(command.request.as_slice(), &entity.state)?;

        let state_bytes = match outcome.new_state {
            Some(ref new_state) => serde_json::to_vec(new_state)
                .map_err(|err| CommandError::Storage(format!("encode state: {err}")))?,
            None => entity.state_bytes.clone(),
        };
        let row = PendingRecord {
            entity_id: command.entity_id.clone(),
            version: entity.version + 1,
            command_id: command.command_id.clone(),
            command_name: command.command_name.clone(),
            request: command.request.clone(),
            response: outcome.response,
            state: state_bytes.clone(),
        };

        entity.version += 1;
        if let Some(new_state) = outcome.new_state {
            entity.state = new_state;
        }
        entity.state_bytes = state_bytes;
        if let Some(created_entity) = created {
            self.cache
                .insert(command.entity_id.clone(), created_entity);
        }
        Ok(row)
    }
}
