// EntityStore is the immutable registration for one entity kind.
//
// Purpose
// - Map command names to typed handlers and hold the state-value factory.
// - Offer the durable latest-version read used to rebuild cache entries.
//
// Responsibilities
// - Decode request bytes into the command's concrete request type, invoke the
//   pure handler, and encode its response, folding each failure into the
//   matching CommandError class.
//
// Boundaries
// - Built once through the builder; no mutation after construction and no
//   global registry. Handlers must be pure: no input or output.

use crate::core::entity::Entity;
use crate::core::errors::CommandError;
use crate::core::ports::{CommandLog, LogRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Display;
use thiserror::Error;

/// The command name that brings an entity into existence. Fixed so that a
/// retried creation collides on the (entity_id, command_id) constraint and
/// resolves through idempotent replay.
pub const CREATE_COMMAND: &str = "create";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("command name must not be empty")]
    EmptyCommandName,

    #[error("command already registered: {0}")]
    DuplicateCommand(String),
}

/// What a handler produced for one command: encoded response bytes and, when
/// the command changed the entity, its new state. `None` carries the prior
/// serialized state forward under a new version.
pub struct HandlerOutcome<S> {
    pub response: Vec<u8>,
    pub new_state: Option<S>,
}

type BoxedHandler<S> =
    Box<dyn Fn(&[u8], &S) -> Result<HandlerOutcome<S>, CommandError> + Send + Sync>;
type StateFactory<S> = Box<dyn Fn() -> S + Send + Sync>;

pub struct EntityStore<S> {
    entity_name: String,
    handlers: HashMap<String, BoxedHandler<S>>,
    state_factory: StateFactory<S>,
}

pub struct EntityStoreBuilder<S> {
    entity_name: String,
    handlers: HashMap<String, BoxedHandler<S>>,
    state_factory: StateFactory<S>,
}

impl<S> EntityStore<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn builder(entity_name: impl Into<String>) -> EntityStoreBuilder<S>
    where
        S: Default,
    {
        EntityStoreBuilder {
            entity_name: entity_name.into(),
            handlers: HashMap::new(),
            state_factory: Box::new(S::default),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub(crate) fn handler(&self, command_name: &str) -> Option<&BoxedHandler<S>> {
        self.handlers.get(command_name)
    }

    /// Synthesize the zero-value entity a `create` command starts from.
    pub(crate) fn fresh_entity(&self, entity_id: &str) -> Result<Entity<S>, CommandError> {
        let state = (self.state_factory)();
        let state_bytes = serde_json::to_vec(&state)
            .map_err(|err| CommandError::Storage(format!("encode state: {err}")))?;
        Ok(Entity {
            entity_id: entity_id.to_string(),
            version: 0,
            state,
            state_bytes,
            updated_at: 0,
        })
    }

    /// Read the highest-version row for `entity_id` and decode its snapshot.
    pub async fn get(
        &self,
        log: &dyn CommandLog,
        entity_id: &str,
    ) -> Result<Entity<S>, CommandError> {
        let record = log
            .latest(entity_id)
            .await
            .map_err(CommandError::from)?
            .ok_or_else(|| CommandError::NotFound(entity_id.to_string()))?;
        self.entity_from_record(record)
    }

    pub(crate) fn entity_from_record(&self, record: LogRecord) -> Result<Entity<S>, CommandError> {
        let state: S = serde_json::from_slice(&record.state)
            .map_err(|err| CommandError::Storage(format!("decode stored state: {err}")))?;
        Ok(Entity {
            entity_id: record.entity_id,
            version: record.version,
            state,
            state_bytes: record.state,
            updated_at: record.committed_at,
        })
    }
}

impl<S> EntityStoreBuilder<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Override the zero-value the `create` command starts from.
    pub fn state_factory(mut self, factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        self.state_factory = Box::new(factory);
        self
    }

    /// Register a command under `name`. The handler is a pure function from
    /// the decoded request and the current state to a response plus the new
    /// state; `None` keeps the entity's serialized state unchanged. A handler
    /// error becomes a `CommandError::Rejected` and leaves the entity as is.
    pub fn command<Req, Resp, E, F>(
        mut self,
        name: &str,
        handler: F,
    ) -> Result<Self, RegistrationError>
    where
        Req: DeserializeOwned,
        Resp: Serialize,
        E: Display,
        F: Fn(Req, &S) -> Result<(Resp, Option<S>), E> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(RegistrationError::EmptyCommandName);
        }
        if self.handlers.contains_key(name) {
            return Err(RegistrationError::DuplicateCommand(name.to_string()));
        }
        let boxed: BoxedHandler<S> = Box::new(move |request, state| {
            let decoded: Req = serde_json::from_slice(request)
                .map_err(|err| CommandError::Decode(err.to_string()))?;
            let (response, new_state) =
                handler(decoded, state).map_err(|err| CommandError::Rejected(err.to_string()))?;
            let response = serde_json::to_vec(&response)
                .map_err(|err| CommandError::Storage(format!("encode response: {err}")))?;
            Ok(HandlerOutcome {
                response,
                new_state,
            })
        });
        self.handlers.insert(name.to_string(), boxed);
        Ok(self)
    }

    pub fn build(self) -> EntityStore<S> {
        EntityStore {
            entity_name: self.entity_name,
            handlers: self.handlers,
            state_factory: self.state_factory,
        }
    }
}
