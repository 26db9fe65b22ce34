//! Per-table sync watermarks.
//!
//! Watermarks are informational unless incremental pull is enabled, in which
//! case `last_pull` is sent back to the server as `updated_since`. It records
//! the newest server `updated_at` observed, never local wall time, so it is
//! comparable with server timestamps and stays put on idle cycles.

use crate::{Table, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub table: Table,
    /// Newest server modification time merged so far
    pub last_pull: Option<Timestamp>,
    /// Last time an entry for this table was acknowledged by the server
    pub last_push: Option<Timestamp>,
    /// Newest of the two
    pub last_sync: Option<Timestamp>,
}

impl SyncMetadata {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            last_pull: None,
            last_push: None,
            last_sync: None,
        }
    }

    /// Advance the pull watermark. Returns whether anything changed.
    pub fn observe_pull(&mut self, watermark: Option<Timestamp>) -> bool {
        match watermark {
            Some(w) if self.last_pull.map_or(true, |p| w > p) => {
                self.last_pull = Some(w);
                self.refresh_last_sync();
                true
            }
            _ => false,
        }
    }

    /// Record an acknowledged push. Returns whether anything changed.
    pub fn observe_push(&mut self, at: Timestamp) -> bool {
        if self.last_push.is_some_and(|p| p >= at) {
            return false;
        }
        self.last_push = Some(at);
        self.refresh_last_sync();
        true
    }

    fn refresh_last_sync(&mut self) {
        self.last_sync = self.last_pull.max(self.last_push);
    }
}
