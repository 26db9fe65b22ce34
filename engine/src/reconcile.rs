//! Reconciliation decisions for push and pull.
//!
//! The client crate performs the I/O; this module decides what each step
//! should do so the policy can be tested in isolation.
//!
//! # Push
//!
//! Queue entries are drained oldest first. [`plan_push`] maps an entry onto a
//! [`RemoteRequest`]. UPDATE and DELETE entries need a server id to build an
//! endpoint; an entry that only knows a local id has to wait for the CREATE
//! of that record to be acknowledged.
//!
//! # Pull
//!
//! [`decide_pull`] implements record-level last-write-wins, gated by the
//! `synced` flag: a local record with an unpushed edit always wins.

use crate::{
    record::{EntityRecord, ServerRecord},
    LocalId, Method, Operation, QueueEntry, QueueStatus, RemoteRequest,
};
use serde_json::Value;

/// What the push reconciler should do with one queue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PushPlan {
    /// Send this request.
    Transmit(RemoteRequest),
    /// Target only has a local id; its CREATE has not been acknowledged yet.
    AwaitCreate(LocalId),
    /// Entry carries neither a server id nor a local id.
    Unaddressable,
}

/// Plan the transmission of a queue entry.
pub fn plan_push(entry: &QueueEntry) -> PushPlan {
    let method = entry.operation.method();
    match entry.operation {
        Operation::Create => PushPlan::Transmit(RemoteRequest {
            method,
            table: entry.table,
            record_id: None,
            body: Some(Value::Object(entry.payload.clone())),
        }),
        Operation::Update | Operation::Delete => match (&entry.record_id, &entry.local_id) {
            (Some(id), _) => PushPlan::Transmit(RemoteRequest {
                method,
                table: entry.table,
                record_id: Some(*id),
                body: (method == Method::Put).then(|| Value::Object(entry.payload.clone())),
            }),
            (None, Some(local)) => PushPlan::AwaitCreate(local.clone()),
            (None, None) => PushPlan::Unaddressable,
        },
    }
}

/// How a server record merges into the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullAction {
    /// No local copy: insert as synced.
    Insert,
    /// Local copy is synced and older: overwrite with server fields.
    Overwrite,
    /// Local copy has an unpushed edit: leave it alone.
    KeepLocalEdit,
    /// Local copy is at least as new as the server's.
    UpToDate,
}

/// Decide how to merge `remote` given the local copy with the same server id.
pub fn decide_pull(local: Option<&EntityRecord>, remote: &ServerRecord) -> PullAction {
    let Some(local) = local else {
        return PullAction::Insert;
    };
    if !local.synced {
        return PullAction::KeepLocalEdit;
    }
    match remote.last_modified() {
        Some(modified) if modified > local.updated_at => PullAction::Overwrite,
        _ => PullAction::UpToDate,
    }
}

/// Bounds automatic retries of failed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Record a failed transmission attempt on `entry`.
    pub fn record_failure(&self, entry: &mut QueueEntry, message: impl Into<String>) {
        entry.status = QueueStatus::Failed;
        entry.retry_count = entry.retry_count.saturating_add(1);
        entry.error = Some(message.into());
    }

    /// The entry has used up its automatic retries.
    pub fn is_exhausted(&self, entry: &QueueEntry) -> bool {
        entry.retry_count >= self.max_retries
    }

    /// A failed entry the next push pass may pick up again.
    pub fn can_auto_retry(&self, entry: &QueueEntry) -> bool {
        entry.status == QueueStatus::Failed && !self.is_exhausted(entry)
    }
}
