use crate::domain::command::{
    CommandListFilter, CommandPage, CommandStatus, CommandUpdate, OperationalCommand,
};
use crate::{CommandRepository, CoreError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory implementation of the CommandRepository port for tests and
/// single-instance mode. Indexes are emulated by filtering and sorting.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommandRepository {
    // Store: command_id -> record
    store: Arc<DashMap<String, OperationalCommand>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes records past their retention. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.store.len();
        self.store.retain(|_, cmd| !cmd.is_expired(now));
        before - self.store.len()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn insert(&self, command: &OperationalCommand) -> Result<(), CoreError> {
        match self.store.entry(command.command_id.clone()) {
            dashmap::Entry::Occupied(_) => Err(CoreError::Validation(format!(
                "command {} already exists",
                command.command_id
            ))),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(command.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, command_id: &str) -> Result<Option<OperationalCommand>, CoreError> {
        Ok(self.store.get(command_id).map(|entry| entry.value().clone()))
    }

    async fn conditional_update(
        &self,
        command_id: &str,
        expected: CommandStatus,
        update: CommandUpdate,
    ) -> Result<Option<OperationalCommand>, CoreError> {
        // get_mut holds the shard write lock: check and write happen as one step.
        let Some(mut entry) = self.store.get_mut(command_id) else {
            return Ok(None);
        };
        if entry.status != expected {
            return Ok(None);
        }
        entry.apply(&update)?;
        Ok(Some(entry.clone()))
    }

    async fn query(&self, filter: &CommandListFilter) -> Result<CommandPage, CoreError> {
        let mut matching: Vec<OperationalCommand> = self
            .store
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len();
        let commands = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        Ok(CommandPage { commands, total })
    }
}
