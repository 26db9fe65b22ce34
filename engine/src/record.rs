//! Record types for locally mirrored entities and server copies.

use crate::{
    entity::Entity, error::Result, Error, Fields, LocalId, LocalKey, ServerId, Table, Timestamp,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Keys that belong to the sync layer and never travel as domain fields.
pub const RESERVED_KEYS: [&str; 8] = [
    "id",
    "server_id",
    "local_id",
    "synced",
    "_synced",
    "_local_id",
    "created_at",
    "updated_at",
];

/// Drop sync-layer keys from a field map.
pub fn sanitize_fields(mut fields: Fields) -> Fields {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}

/// Generate a client-side id for a record created offline.
///
/// Format: `local_<unix millis>_<9 random chars>`.
pub fn generate_local_id(now: Timestamp) -> LocalId {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("local_{}_{}", now.timestamp_millis(), &random[..9])
}

/// How a record is addressed before and after the server knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum RecordRef {
    Server(ServerId),
    Local(LocalId),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Server(id) => write!(f, "#{id}"),
            RecordRef::Local(id) => f.write_str(id),
        }
    }
}

/// A domain record mirrored in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Local store identifier, assigned on first insert
    pub key: Option<LocalKey>,
    /// Table the record lives in
    pub table: Table,
    /// Server identifier, once the server has accepted the record
    pub server_id: Option<ServerId>,
    /// Client identifier for records created offline and not yet pushed
    pub local_id: Option<LocalId>,
    /// Whether local contents are known to match the server
    pub synced: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Domain fields
    pub fields: Fields,
}

impl EntityRecord {
    /// A record created locally, not yet known to the server.
    pub fn new_local(table: Table, fields: Fields, now: Timestamp) -> Self {
        Self::with_local_id(table, generate_local_id(now), fields, now)
    }

    /// Like [`EntityRecord::new_local`], with a caller-chosen local id.
    pub fn with_local_id(table: Table, local_id: LocalId, fields: Fields, now: Timestamp) -> Self {
        Self {
            key: None,
            table,
            server_id: None,
            local_id: Some(local_id),
            synced: false,
            created_at: now,
            updated_at: now,
            fields: sanitize_fields(fields),
        }
    }

    /// A record mirrored from the server.
    pub fn from_server(table: Table, remote: ServerRecord) -> Self {
        let updated_at = remote.last_modified().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            key: None,
            table,
            server_id: Some(remote.id),
            local_id: None,
            synced: true,
            created_at: remote.created_at.unwrap_or(updated_at),
            updated_at,
            fields: remote.fields,
        }
    }

    /// Merge a partial change set made locally.
    pub fn apply_changes(&mut self, changes: &Fields, now: Timestamp) {
        for (name, value) in changes {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            self.fields.insert(name.clone(), value.clone());
        }
        self.updated_at = now;
        self.synced = false;
    }

    /// Replace local contents with the server's copy.
    pub fn apply_server(&mut self, remote: ServerRecord) {
        if let Some(modified) = remote.last_modified() {
            self.updated_at = modified;
        }
        if let Some(created) = remote.created_at {
            self.created_at = created;
        }
        self.server_id = Some(remote.id);
        self.local_id = None;
        self.fields = remote.fields;
        self.synced = true;
    }

    /// The reference a queue entry should carry for this record.
    pub fn reference(&self) -> Option<RecordRef> {
        match (&self.server_id, &self.local_id) {
            (Some(id), _) => Some(RecordRef::Server(*id)),
            (None, Some(local)) => Some(RecordRef::Local(local.clone())),
            (None, None) => None,
        }
    }

    /// Decode the fields into a typed entity.
    pub fn decode<E: Entity>(&self) -> Result<E> {
        if self.table != E::TABLE {
            return Err(Error::Decode(format!(
                "record belongs to '{}', not '{}'",
                self.table,
                E::TABLE
            )));
        }
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

/// A record as returned by `GET /api/{table}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    pub id: ServerId,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub fields: Fields,
}

impl ServerRecord {
    /// Parse one element of a server collection.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::MalformedRecord("expected a JSON object".into()));
        };

        let id = map
            .get("id")
            .and_then(parse_server_id)
            .ok_or_else(|| Error::MalformedRecord("missing or non-integer id".into()))?;
        let created_at = map.get("created_at").and_then(parse_timestamp);
        let updated_at = map.get("updated_at").and_then(parse_timestamp);

        for key in RESERVED_KEYS {
            map.remove(key);
        }

        Ok(Self {
            id,
            created_at,
            updated_at,
            fields: map,
        })
    }

    /// When the server last changed this record.
    pub fn last_modified(&self) -> Option<Timestamp> {
        self.updated_at.or(self.created_at)
    }
}

/// Extract the server-issued id from a CREATE response body.
pub fn server_id_from_response(body: &Value) -> Result<ServerId> {
    body.get("id")
        .and_then(parse_server_id)
        .ok_or(Error::MissingServerId)
}

fn parse_server_id(value: &Value) -> Option<ServerId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
