//! Shared helpers for client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use stockline_client::{
    Error, LocalStore, MutationRecorder, RemoteApi, Result, SyncEngine, SyncOptions,
};
use stockline_engine::{
    EntityRecord, Fields, ManualClock, Method, QueueEntry, RemoteRequest, SyncMetadata, Table,
    Timestamp,
};
use tokio::sync::Notify;

/// Local time at the start of every test.
pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

/// Blocks transmissions until released.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct ServerState {
    tables: HashMap<Table, BTreeMap<i64, Value>>,
    raw: HashMap<Table, Vec<Value>>,
    next_id: i64,
    ticks: i64,
    calls: Vec<String>,
    fetches: Vec<(Table, Option<Timestamp>)>,
    scripted_failures: VecDeque<u16>,
    failing_tables: HashSet<Table>,
    omit_ids: bool,
    gate: Option<Gate>,
}

/// In-memory stand-in for the REST API.
///
/// Every write stamps `updated_at` from a server clock that starts a month
/// after [`t0`] and advances one second per write.
pub struct FakeRemote {
    state: Mutex<ServerState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                next_id: 42,
                ..Default::default()
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// Current server time; advances on every call.
    pub fn tick(&self) -> Timestamp {
        let mut state = self.state();
        state.ticks += 1;
        server_time(state.ticks)
    }

    /// Add a record on the server. Returns its id.
    pub fn seed(&self, table: Table, data: Value) -> i64 {
        let at = self.tick();
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        let record = stamp(id, data, at, at);
        state.tables.entry(table).or_default().insert(id, record);
        id
    }

    /// Change a record on the server, as another client would.
    pub fn edit(&self, table: Table, id: i64, changes: Value) {
        let at = self.tick();
        let mut state = self.state();
        let record = state
            .tables
            .get_mut(&table)
            .and_then(|t| t.get_mut(&id))
            .expect("record exists on server");
        merge(record, changes);
        record["updated_at"] = json!(at.to_rfc3339());
    }

    /// Serve an arbitrary element in the collection for `table`.
    pub fn push_raw(&self, table: Table, value: Value) {
        self.state().raw.entry(table).or_default().push(value);
    }

    pub fn record(&self, table: Table, id: i64) -> Option<Value> {
        self.state().tables.get(&table).and_then(|t| t.get(&id)).cloned()
    }

    pub fn count(&self, table: Table) -> usize {
        self.state().tables.get(&table).map_or(0, BTreeMap::len)
    }

    /// Fail the next `times` transmissions with `status`.
    pub fn fail_next(&self, times: usize, status: u16) {
        self.state().scripted_failures.extend(std::iter::repeat(status).take(times));
    }

    pub fn fail_fetch(&self, table: Table) {
        self.state().failing_tables.insert(table);
    }

    /// Answer CREATE requests without an id.
    pub fn omit_ids(&self, omit: bool) {
        self.state().omit_ids = omit;
    }

    pub fn gate(&self) -> Gate {
        let gate = Gate::default();
        self.state().gate = Some(gate.clone());
        gate
    }

    /// Every request seen, e.g. `POST /api/products`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Requests other than collection fetches.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("GET"))
            .collect()
    }

    pub fn fetches(&self) -> Vec<(Table, Option<Timestamp>)> {
        self.state().fetches.clone()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state();
        state.calls.clear();
        state.fetches.clear();
    }
}

fn server_time(ticks: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(ticks)
}

fn stamp(id: i64, data: Value, created_at: Timestamp, updated_at: Timestamp) -> Value {
    let mut record = data;
    record["id"] = json!(id);
    record["created_at"] = json!(created_at.to_rfc3339());
    record["updated_at"] = json!(updated_at.to_rfc3339());
    record
}

fn merge(record: &mut Value, changes: Value) {
    if let (Value::Object(target), Value::Object(changes)) = (record, changes) {
        target.extend(changes);
    }
}

fn status_error(status: u16) -> Error {
    let message = match status {
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    Error::Status {
        status,
        message: message.into(),
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn send(&self, request: RemoteRequest) -> Result<Value> {
        self.state().calls.push(request.to_string());

        let gate = self.state().gate.clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(status) = self.state().scripted_failures.pop_front() {
            return Err(status_error(status));
        }

        let at = self.tick();
        let mut state = self.state();
        match (request.method, request.record_id) {
            (Method::Post, None) => {
                let id = state.next_id;
                state.next_id += 1;
                let record = stamp(id, request.body.unwrap_or(json!({})), at, at);
                state
                    .tables
                    .entry(request.table)
                    .or_default()
                    .insert(id, record.clone());
                if state.omit_ids {
                    Ok(json!({"ok": true}))
                } else {
                    Ok(record)
                }
            }
            (Method::Put, Some(id)) => {
                let record = state
                    .tables
                    .get_mut(&request.table)
                    .and_then(|t| t.get_mut(&id))
                    .ok_or_else(|| status_error(404))?;
                merge(record, request.body.unwrap_or(json!({})));
                record["updated_at"] = json!(at.to_rfc3339());
                Ok(record.clone())
            }
            (Method::Delete, Some(id)) => {
                state
                    .tables
                    .get_mut(&request.table)
                    .and_then(|t| t.remove(&id))
                    .ok_or_else(|| status_error(404))?;
                Ok(Value::Null)
            }
            _ => Err(status_error(400)),
        }
    }

    async fn fetch(&self, table: Table, since: Option<Timestamp>) -> Result<Vec<Value>> {
        let mut state = self.state();
        state.calls.push(format!("GET /api/{table}"));
        state.fetches.push((table, since));

        if state.failing_tables.contains(&table) {
            return Err(status_error(503));
        }

        let mut items: Vec<Value> = state
            .tables
            .get(&table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        if let Some(since) = since {
            items.retain(|item| {
                item["updated_at"]
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .is_some_and(|t| t > since)
            });
        }
        items.extend(state.raw.get(&table).cloned().unwrap_or_default());
        Ok(items)
    }
}

/// A client wired to a [`FakeRemote`], with a manual clock.
pub struct Harness {
    pub store: LocalStore,
    pub remote: Arc<FakeRemote>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<SyncEngine>,
    pub recorder: MutationRecorder,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(SyncOptions::default()).await
    }

    pub async fn with_options(options: SyncOptions) -> Self {
        Self::with_remote(FakeRemote::new(), options).await
    }

    /// A second client sharing the same server.
    pub async fn with_remote(remote: Arc<FakeRemote>, options: SyncOptions) -> Self {
        let store = LocalStore::in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            clock.clone(),
            options,
        ));
        let recorder = MutationRecorder::new(store.clone(), clock.clone());
        Self {
            store,
            remote,
            clock,
            engine,
            recorder,
        }
    }

    pub async fn products(&self) -> Vec<EntityRecord> {
        self.store.all(Table::Products).await.unwrap()
    }

    pub async fn queue(&self) -> Vec<QueueEntry> {
        self.store.queue_entries().await.unwrap()
    }

    /// Everything the store holds, for before/after comparisons.
    pub async fn snapshot(&self) -> (Vec<EntityRecord>, Vec<QueueEntry>, Vec<SyncMetadata>) {
        let mut records = Vec::new();
        let mut metadata = Vec::new();
        for table in Table::ALL {
            records.extend(self.store.all(table).await.unwrap());
            metadata.push(self.store.metadata(table).await.unwrap());
        }
        (records, self.queue().await, metadata)
    }
}
