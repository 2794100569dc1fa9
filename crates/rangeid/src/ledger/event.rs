use serde::{Deserialize, Serialize};

use crate::StorageKey;

/// Kind of mutation recorded in the ledger's event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerEvent {
    /// An identifier was reserved by the allocator.
    GetNext,
    /// An externally chosen identifier was stored.
    AddAssignment,
    /// An identifier was reclaimed.
    RemoveAssignment,
    /// Consumption was reconciled with a scanned snapshot.
    SyncIds,
}

/// Payload of a [`LogEntry`]. Fields that do not apply to an event are
/// omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<StorageKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

impl EventData {
    pub fn assignment(key: &StorageKey, id: u32) -> Self {
        Self {
            key: Some(key.clone()),
            id: Some(id),
            merge: None,
        }
    }

    pub fn sync(merge: bool) -> Self {
        Self {
            merge: Some(merge),
            ..Self::default()
        }
    }
}

/// One entry of the append-only event log: who changed what, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub event_type: LedgerEvent,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub data: EventData,
}

impl LogEntry {
    pub fn new(event_type: LedgerEvent, timestamp: u64, user: Option<&str>, data: EventData) -> Self {
        Self {
            event_type,
            timestamp,
            user: user.map(str::to_owned),
            data,
        }
    }
}
