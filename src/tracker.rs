//! Request Tracker
//!
//! Records start/end/status/error of every inbound control plane operation.
//! Records are never evicted here; retention belongs to whoever embeds the
//! tracker.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Response fields blanked before a record is kept (avoid leaking key material)
const SECRET_FIELDS: &[&str] = &["privateKey", "PrivateKey"];

/// Blank every secret field, at any depth.
pub fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (name, field) in map.iter_mut() {
                if SECRET_FIELDS.contains(&name.as_str()) {
                    if !field.is_null() {
                        *field = Value::String(String::new());
                    }
                } else {
                    redact_secrets(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}

/// Lifecycle of a tracked request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Handling,
    Success,
    Error,
}

/// Observability record for one inbound operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: RequestStatus,
    pub request_data: Value,
    #[serde(default)]
    pub response_data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of a tracked operation together with its request id
#[derive(Debug)]
pub struct Tracked<T> {
    pub request_id: String,
    pub result: Result<T>,
}

impl<T> Tracked<T> {
    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Concurrent request ledger
#[derive(Clone, Default)]
pub struct RequestTracker {
    records: Arc<DashMap<String, RequestRecord>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record in `Handling` state and return its id.
    ///
    /// Ids are the start time in nanoseconds; a collision bumps the id by one
    /// until a free slot is found.
    pub fn start(&self, request_data: Value) -> String {
        let start_time = Utc::now();
        let mut nanos = start_time.timestamp_nanos_opt().unwrap_or_default();

        loop {
            let id = nanos.to_string();
            match self.records.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(RequestRecord {
                        id: id.clone(),
                        start_time,
                        end_time: None,
                        status: RequestStatus::Handling,
                        request_data,
                        response_data: None,
                        error: None,
                    });
                    tracing::debug!("request {} started", id);
                    return id;
                }
                Entry::Occupied(_) => nanos += 1,
            }
        }
    }

    /// Close a record as succeeded.
    pub fn succeed(&self, id: &str, response_data: Value) -> bool {
        self.finish(id, RequestStatus::Success, Some(response_data), None)
    }

    /// Close a record as failed.
    pub fn fail(&self, id: &str, error: &str) -> bool {
        self.finish(id, RequestStatus::Error, None, Some(error.to_string()))
    }

    fn finish(
        &self,
        id: &str,
        status: RequestStatus,
        response_data: Option<Value>,
        error: Option<String>,
    ) -> bool {
        let Some(mut record) = self.records.get_mut(id) else {
            tracing::warn!("finish called for unknown request id {}", id);
            return false;
        };
        record.end_time = Some(Utc::now());
        record.status = status;
        record.response_data = response_data;
        record.error = error;
        tracing::debug!("request {} finished: {:?}", id, status);
        true
    }

    pub fn get(&self, id: &str) -> Option<RequestRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// All records, oldest first
    pub fn list(&self) -> Vec<RequestRecord> {
        let mut records: Vec<RequestRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        records
    }

    /// Run `operation` between `start` and the matching `succeed`/`fail`.
    ///
    /// The stored response is a redacted copy; the caller still gets the
    /// full result.
    pub async fn track<T, F>(&self, request_data: Value, operation: F) -> Tracked<T>
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        let request_id = self.start(request_data);
        let result = operation.await;

        match &result {
            Ok(value) => {
                let mut data = serde_json::to_value(value).unwrap_or(Value::Null);
                redact_secrets(&mut data);
                self.succeed(&request_id, data);
            }
            Err(e) => {
                self.fail(&request_id, &e.to_string());
            }
        }

        Tracked { request_id, result }
    }
}
