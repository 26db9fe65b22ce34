//! Sync queue entries and the remote requests they turn into.
//!
//! Local changes are never sent directly. Each one is recorded as a
//! [`QueueEntry`] and transmitted later by the push reconciler.

use crate::{
    error::Result, record::RecordRef, Error, EntryId, Fields, LocalId, ServerId, Table, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of mutation an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    /// HTTP verb used to transmit this operation.
    pub const fn method(self) -> Method {
        match self {
            Operation::Create => Method::Post,
            Operation::Update => Method::Put,
            Operation::Delete => Method::Delete,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE" => Ok(Operation::Create),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(Error::invalid("operation", other)),
        }
    }
}

/// Transmission state of a queue entry.
///
/// `pending -> syncing -> success` (entry removed) or
/// `pending -> syncing -> failed -> pending` (retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Syncing,
    Failed,
    Success,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Syncing => "syncing",
            QueueStatus::Failed => "failed",
            QueueStatus::Success => "success",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "syncing" => Ok(QueueStatus::Syncing),
            "failed" => Ok(QueueStatus::Failed),
            "success" => Ok(QueueStatus::Success),
            other => Err(Error::invalid("queue status", other)),
        }
    }
}

/// One pending mutation intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store-assigned id, also the tie-breaker for equal timestamps
    pub id: Option<EntryId>,
    pub operation: Operation,
    pub table: Table,
    /// Server id of the target record, when known
    pub record_id: Option<ServerId>,
    /// Client id of the target record, for records created offline
    pub local_id: Option<LocalId>,
    /// Full record for CREATE, changed fields for UPDATE, empty for DELETE
    pub payload: Fields,
    /// When the intent was recorded
    pub timestamp: Timestamp,
    pub status: QueueStatus,
    pub retry_count: u32,
    /// Last failure message
    pub error: Option<String>,
}

impl QueueEntry {
    fn new(
        operation: Operation,
        table: Table,
        target: Option<RecordRef>,
        payload: Fields,
        timestamp: Timestamp,
    ) -> Self {
        let (record_id, local_id) = match target {
            Some(RecordRef::Server(id)) => (Some(id), None),
            Some(RecordRef::Local(local)) => (None, Some(local)),
            None => (None, None),
        };
        Self {
            id: None,
            operation,
            table,
            record_id,
            local_id,
            payload,
            timestamp,
            status: QueueStatus::Pending,
            retry_count: 0,
            error: None,
        }
    }

    /// Intent to create a record that so far only has a local id.
    pub fn create(table: Table, local_id: LocalId, payload: Fields, timestamp: Timestamp) -> Self {
        Self::new(
            Operation::Create,
            table,
            Some(RecordRef::Local(local_id)),
            payload,
            timestamp,
        )
    }

    /// Intent to send changed fields for an existing record.
    pub fn update(table: Table, target: RecordRef, changes: Fields, timestamp: Timestamp) -> Self {
        Self::new(Operation::Update, table, Some(target), changes, timestamp)
    }

    /// Intent to remove a record.
    pub fn delete(table: Table, target: RecordRef, timestamp: Timestamp) -> Self {
        Self::new(
            Operation::Delete,
            table,
            Some(target),
            Fields::new(),
            timestamp,
        )
    }

    /// The record this entry addresses, preferring the server id.
    pub fn target(&self) -> Option<RecordRef> {
        match (&self.record_id, &self.local_id) {
            (Some(id), _) => Some(RecordRef::Server(*id)),
            (None, Some(local)) => Some(RecordRef::Local(local.clone())),
            (None, None) => None,
        }
    }
}

/// HTTP verbs the remote API understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// A single request against the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub table: Table,
    pub record_id: Option<ServerId>,
    pub body: Option<serde_json::Value>,
}

impl RemoteRequest {
    /// Path relative to the API base, e.g. `/api/products/42`.
    pub fn path(&self) -> String {
        match self.record_id {
            Some(id) => format!("/api/{}/{}", self.table, id),
            None => format!("/api/{}", self.table),
        }
    }
}

impl fmt::Display for RemoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn create_entry_references_local_id() {
        let mut payload = Fields::new();
        payload.insert("name".into(), json!("Widget"));
        let entry = QueueEntry::create(Table::Products, "local_1_abc".into(), payload, now());

        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.local_id.as_deref(), Some("local_1_abc"));
        assert!(entry.record_id.is_none());
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert!(entry.error.is_none());
    }

    #[test]
    fn update_entry_prefers_server_id() {
        let entry = QueueEntry::update(
            Table::Products,
            RecordRef::Server(42),
            Fields::new(),
            now(),
        );
        assert_eq!(entry.record_id, Some(42));
        assert!(entry.local_id.is_none());
        assert_eq!(entry.target(), Some(RecordRef::Server(42)));
    }

    #[test]
    fn delete_entry_has_empty_payload() {
        let entry = QueueEntry::delete(Table::Contacts, RecordRef::Local("l".into()), now());
        assert_eq!(entry.operation, Operation::Delete);
        assert!(entry.payload.is_empty());
        assert_eq!(entry.target(), Some(RecordRef::Local("l".into())));
    }

    #[test]
    fn target_prefers_record_id_after_rewrite() {
        let mut entry = QueueEntry::update(
            Table::Products,
            RecordRef::Local("local_x".into()),
            Fields::new(),
            now(),
        );
        entry.record_id = Some(9);
        assert_eq!(entry.target(), Some(RecordRef::Server(9)));
    }

    #[test]
    fn operation_maps_to_method() {
        assert_eq!(Operation::Create.method(), Method::Post);
        assert_eq!(Operation::Update.method(), Method::Put);
        assert_eq!(Operation::Delete.method(), Method::Delete);
    }

    #[test]
    fn string_forms_roundtrip() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        for status in [
            QueueStatus::Pending,
            QueueStatus::Syncing,
            QueueStatus::Failed,
            QueueStatus::Success,
        ] {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("MERGE".parse::<Operation>().is_err());
        assert!("paused".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn request_paths() {
        let create = RemoteRequest {
            method: Method::Post,
            table: Table::ReceiptItems,
            record_id: None,
            body: Some(json!({})),
        };
        assert_eq!(create.path(), "/api/receipt_items");
        assert_eq!(create.to_string(), "POST /api/receipt_items");

        let delete = RemoteRequest {
            method: Method::Delete,
            table: Table::Products,
            record_id: Some(42),
            body: None,
        };
        assert_eq!(delete.path(), "/api/products/42");
    }

    #[test]
    fn serialization_format() {
        let entry = QueueEntry::delete(Table::Products, RecordRef::Server(1), now());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["operation"], json!("DELETE"));
        assert_eq!(json["status"], json!("pending"));
        assert_eq!(json["table"], json!("products"));
    }
}
