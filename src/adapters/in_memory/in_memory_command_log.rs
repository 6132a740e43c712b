// In memory implementation of the CommandLog port.
//
// Purpose
// - Support worker tests and local development without a database.
//
// Responsibilities
// - Store committed rows per entity in version order.
// - Enforce UNIQUE(entity_id, command_id) and the gapless per-entity version
//   sequence atomically across a whole batch, including duplicates inside
//   the batch itself; a violation commits nothing.
//
// Testing guidance
// - `toggle_offline` simulates a backend outage for failure-path tests.

use crate::core::ports::{CommandLog, CommandLogError, LogRecord, PendingRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    rows: HashMap<String, Vec<LogRecord>>,
    seen: HashSet<(String, String)>,
    offline: bool,
}

impl Inner {
    fn head_version(&self, entity_id: &str) -> i64 {
        self.rows
            .get(entity_id)
            .and_then(|rows| rows.last())
            .map(|row| row.version)
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct InMemoryCommandLog {
    inner: Mutex<Inner>,
}

impl InMemoryCommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn toggle_offline(&self) {
        let mut inner = self.inner.lock().await;
        inner.offline = !inner.offline;
    }

    pub async fn row_count(&self, entity_id: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.rows.get(entity_id).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl CommandLog for InMemoryCommandLog {
    async fn latest(&self, entity_id: &str) -> Result<Option<LogRecord>, CommandLogError> {
        let inner = self.inner.lock().await;
        if inner.offline {
            return Err(CommandLogError::Backend("command log offline".to_string()));
        }
        Ok(inner
            .rows
            .get(entity_id)
            .and_then(|rows| rows.last())
            .cloned())
    }

    async fn find(
        &self,
        entity_id: &str,
        command_id: &str,
    ) -> Result<Option<LogRecord>, CommandLogError> {
        let inner = self.inner.lock().await;
        if inner.offline {
            return Err(CommandLogError::Backend("command log offline".to_string()));
        }
        Ok(inner.rows.get(entity_id).and_then(|rows| {
            rows.iter()
                .find(|row| row.command_id == command_id)
                .cloned()
        }))
    }

    async fn append(&self, rows: &[PendingRecord]) -> Result<(), CommandLogError> {
        let mut inner = self.inner.lock().await;
        if inner.offline {
            return Err(CommandLogError::Backend("command log offline".to_string()));
        }

        // Validate the whole batch before committing anything.
        let mut staged_versions: HashMap<&str, i64> = HashMap::new();
        let mut staged_commands: HashSet<(&str, &str)> = HashSet::new();
        for row in rows {
            let conflict = || CommandLogError::Conflict {
                entity_id: row.entity_id.clone(),
                command_id: row.command_id.clone(),
            };
            let committed = inner
                .seen
                .contains(&(row.entity_id.clone(), row.command_id.clone()));
            let staged = !staged_commands.insert((&row.entity_id, &row.command_id));
            if committed || staged {
                return Err(conflict());
            }
            let head = staged_versions
                .get(row.entity_id.as_str())
                .copied()
                .unwrap_or_else(|| inner.head_version(&row.entity_id));
            if row.version != head + 1 {
                return Err(conflict());
            }
            staged_versions.insert(&row.entity_id, row.version);
        }

        let committed_at = Utc::now().timestamp_millis();
        for row in rows {
            inner
                .seen
                .insert((row.entity_id.clone(), row.command_id.clone()));
            inner
                .rows
                .entry(row.entity_id.clone())
                .or_default()
                .push(LogRecord {
                    entity_id: row.entity_id.clone(),
                    version: row.version,
                    command_id: row.command_id.clone(),
                    command_name: row.command_name.clone(),
                    request: row.request.clone(),
                    response: row.response.clone(),
                    state: row.state.clone(),
                    committed_at,
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod in_memory_command_log_tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn row() -> PendingRecord {
        PendingRecord {
            entity_id: "acct1".to_string(),
            version: 1,
            command_id: "create".to_string(),
            command_name: "create".to_string(),
            request: b"null".to_vec(),
            response: b"{}".to_vec(),
            state: b"{}".to_vec(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_append_and_read_back_the_latest_row(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        log.append(&[row.clone()]).await.expect("append");
        let latest = log.latest("acct1").await.expect("latest");
        let latest = latest.expect("one row committed");
        assert_eq!(latest.version, 1);
        assert_eq!(latest.command_id, "create");
        assert!(latest.committed_at > 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_find_a_row_by_entity_and_command_id(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        log.append(&[row.clone()]).await.expect("append");
        let found = log.find("acct1", "create").await.expect("find");
        assert!(found.is_some());
        let missing = log.find("acct1", "c-unknown").await.expect("find");
        assert!(missing.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_a_duplicate_command_id_across_batches(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        log.append(&[row.clone()]).await.expect("append");
        let mut retry = row;
        retry.version = 2;
        let result = log.append(&[retry]).await;
        assert!(matches!(result, Err(CommandLogError::Conflict { .. })));
        assert_eq!(log.row_count("acct1").await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_commit_nothing_when_one_row_of_a_batch_conflicts(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        log.append(&[row.clone()]).await.expect("append");
        let fresh = PendingRecord {
            entity_id: "acct2".to_string(),
            ..row.clone()
        };
        let result = log.append(&[fresh, row]).await;
        assert!(matches!(result, Err(CommandLogError::Conflict { .. })));
        assert_eq!(log.row_count("acct2").await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_a_duplicate_command_id_within_one_batch(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        let result = log.append(&[row.clone(), row]).await;
        assert!(matches!(result, Err(CommandLogError::Conflict { .. })));
        assert_eq!(log.row_count("acct1").await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_a_version_gap(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        log.append(&[row.clone()]).await.expect("append");
        let stale = PendingRecord {
            command_id: "c9".to_string(),
            version: 3,
            ..row
        };
        let result = log.append(&[stale]).await;
        assert!(matches!(result, Err(CommandLogError::Conflict { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_accept_consecutive_versions_for_one_entity_in_one_batch(
        row: PendingRecord,
    ) {
        let log = InMemoryCommandLog::new();
        let second = PendingRecord {
            command_id: "c1".to_string(),
            command_name: "transfer1pc".to_string(),
            version: 2,
            ..row.clone()
        };
        log.append(&[row, second]).await.expect("append batch");
        assert_eq!(log.row_count("acct1").await, 2);
        let latest = log.latest("acct1").await.expect("latest");
        assert_eq!(latest.map(|row| row.version), Some(2));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_every_operation_while_offline(row: PendingRecord) {
        let log = InMemoryCommandLog::new();
        log.toggle_offline().await;
        assert!(matches!(
            log.latest("acct1").await,
            Err(CommandLogError::Backend(_))
        ));
        assert!(matches!(
            log.find("acct1", "create").await,
            Err(CommandLogError::Backend(_))
        ));
        assert!(matches!(
            log.append(&[row.clone()]).await,
            Err(CommandLogError::Backend(_))
        ));
        log.toggle_offline().await;
        log.append(&[row]).await.expect("append after recovery");
    }
}
