// Shared account fixture for the integration suites: a balance-carrying
// entity with the transfer and audit commands used across the tests.

use entitylog::adapters::in_memory::in_memory_command_log::InMemoryCommandLog;
use entitylog::application::worker::{Worker, WorkerConfig};
use entitylog::core::ports::CommandLog;
use entitylog::core::store::{CREATE_COMMAND, EntityStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub usable_balance: i64,
    pub frozen_balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Transfer {
    pub amount: i64,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReply {
    pub errno: i64,
}

#[derive(Debug, Error)]
#[error("account balance can not be negative: {from} => {to}")]
pub struct Overdraft {
    pub from: i64,
    pub to: i64,
}

pub fn account_store() -> EntityStore<Account> {
    EntityStore::<Account>::builder("account")
        .command(
            CREATE_COMMAND,
            |_request: serde_json::Value, state: &Account| {
                Ok::<_, Overdraft>((state.clone(), Some(state.clone())))
            },
        )
        .expect("register create")
        .command("transfer1pc", |request: Transfer, state: &Account| {
            let balance = state.usable_balance + request.amount;
            if balance < 0 {
                return Err(Overdraft {
                    from: state.usable_balance,
                    to: balance,
                });
            }
            let next = Account {
                usable_balance: balance,
                ..state.clone()
            };
            Ok((TransferReply { errno: 0 }, Some(next)))
        })
        .expect("register transfer1pc")
        .command("audit", |_request: serde_json::Value, state: &Account| {
            Ok::<_, Overdraft>((
                serde_json::json!({ "usable_balance": state.usable_balance }),
                None,
            ))
        })
        .expect("register audit")
        .build()
}

/// Worker configuration with a short poll interval so tests do not wait out
/// the production 1s idle sleep.
pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(10),
        ..WorkerConfig::default()
    }
}

pub struct AccountHarness {
    pub worker: Worker,
    pub join: JoinHandle<()>,
    pub log: Arc<InMemoryCommandLog>,
    pub store: Arc<EntityStore<Account>>,
}

#[allow(dead_code)]
pub fn spawn_account_worker() -> AccountHarness {
    spawn_account_worker_with(test_config())
}

pub fn spawn_account_worker_with(config: WorkerConfig) -> AccountHarness {
    let store = Arc::new(account_store());
    let log = Arc::new(InMemoryCommandLog::new());
    let (worker, join) = Worker::spawn(
        Arc::clone(&store),
        Arc::clone(&log) as Arc<dyn CommandLog>,
        config,
    );
    AccountHarness {
        worker,
        join,
        log,
        store,
    }
}

/// A second worker over the same store and log, for contention tests.
#[allow(dead_code)]
pub fn spawn_contender(harness: &AccountHarness) -> (Worker, JoinHandle<()>) {
    Worker::spawn(
        Arc::clone(&harness.store),
        Arc::clone(&harness.log) as Arc<dyn CommandLog>,
        test_config(),
    )
}

#[allow(dead_code)]
pub fn transfer_request(amount: i64) -> Vec<u8> {
    serde_json::to_vec(&Transfer { amount }).expect("encode transfer request")
}
