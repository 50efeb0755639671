//! In-memory journal of the last operation applied to each instance.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;
use tokio::sync::RwLock;

/// Number of instances tracked before the oldest entries are evicted.
pub const JOURNAL_CAPACITY: usize = 4096;

/// Lifecycle operations tracked by the journal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Instance provisioning.
    Provision,
    /// Plan change.
    Update,
    /// Instance removal.
    Deprovision,
    /// Credential issue.
    Bind,
    /// Credential revocation.
    Unbind,
}

impl Operation {
    /// Token used as the operation identifier on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Update => "update",
            Self::Deprovision => "deprovision",
            Self::Bind => "bind",
            Self::Unbind => "unbind",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// The operation completed.
    Succeeded,
    /// The operation failed.
    Failed,
}

/// Response body of a last-operation poll.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LastOperation {
    /// Terminal state.
    pub state: OperationState,
    /// Human-readable detail.
    pub description: String,
}

#[derive(Clone, Debug)]
struct Entry {
    operation: Operation,
    failure: Option<String>,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Entries {
    by_instance: BTreeMap<String, Entry>,
    /// Instance IDs keyed by the sequence number of their latest record.
    by_age: BTreeMap<u64, String>,
    next_sequence: u64,
}

impl Entries {
    fn remove(&mut self, instance_id: &str) {
        if let Some(entry) = self.by_instance.remove(instance_id) {
            self.by_age.remove(&entry.sequence);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((_, instance_id)) = self.by_age.pop_first() {
            self.by_instance.remove(&instance_id);
        }
    }

    fn insert(&mut self, instance_id: &str, operation: Operation, failure: Option<String>) {
        self.remove(instance_id);
        if self.by_instance.len() >= JOURNAL_CAPACITY {
            self.evict_oldest();
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.by_age.insert(sequence, instance_id.to_owned());
        self.by_instance.insert(
            instance_id.to_owned(),
            Entry {
                operation,
                failure,
                sequence,
            },
        );
    }
}

/// Records the outcome of the most recent operation per instance.
#[derive(Debug, Default)]
pub struct OperationJournal {
    entries: RwLock<Entries>,
}

impl OperationJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the outcome of `operation` against `instance_id`.
    ///
    /// A successful deprovision clears the entry. Once full, the instance
    /// recorded least recently is evicted.
    pub async fn record<T, E: Display>(
        &self,
        instance_id: &str,
        operation: Operation,
        outcome: &Result<T, E>,
    ) {
        let mut entries = self.entries.write().await;
        if operation == Operation::Deprovision && outcome.is_ok() {
            entries.remove(instance_id);
            return;
        }
        let failure = outcome.as_ref().err().map(ToString::to_string);
        entries.insert(instance_id, operation, failure);
    }

    /// Reports the state of the most recent operation on `instance_id`.
    ///
    /// Every operation runs to completion before its response is sent, so an
    /// instance without a recorded failure reports success.
    pub async fn last(&self, instance_id: &str) -> LastOperation {
        let entries = self.entries.read().await;
        match entries.by_instance.get(instance_id) {
            Some(Entry {
                operation,
                failure: Some(message),
                ..
            }) => LastOperation {
                state: OperationState::Failed,
                description: format!("{operation} failed: {message}"),
            },
            Some(Entry { operation, .. }) => LastOperation {
                state: OperationState::Succeeded,
                description: format!("{operation} succeeded"),
            },
            None => LastOperation {
                state: OperationState::Succeeded,
                description: String::from("no operation in progress"),
            },
        }
    }
}
