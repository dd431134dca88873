//! In-process object store.
//!
//! Records every call it receives and can be told to fail specific
//! operations, which makes upload ordering and retry behavior observable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use relsync_schema::Md5Hash;

use super::{Downloadable, PutOptions, RemoteObject, TransportError, Uploadable};

/// A call observed by [`MemoryTransport`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `get(key)`
    Get(String),
    /// `put(key)`, with whether the no-cache option was set.
    Put {
        /// Object key.
        key: String,
        /// Whether the object was marked no-cache.
        no_cache: bool,
    },
    /// `delete(key)`
    Delete(String),
    /// `list(prefix)`
    List(String),
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// Thread-safe in-memory [`Uploadable`] store.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    calls: Mutex<Vec<TransportCall>>,
    failures: Mutex<HashMap<(&'static str, String), u32>>,
}

impl MemoryTransport {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with an explicit modification time, without recording a call.
    pub fn insert(&self, key: &str, data: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        let data = data.into();
        let etag = format!("\"{}\"", Md5Hash::compute(&data));
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                key.to_string(),
                StoredObject {
                    data,
                    etag,
                    last_modified,
                },
            );
        }
    }

    /// Make the next `times` calls of `op` (`"get"`, `"put"`, `"delete"`,
    /// `"list"`) on `key` fail. For `list`, `key` is the prefix.
    pub fn fail(&self, op: &'static str, key: &str, times: u32) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert((op, key.to_string()), times);
        }
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Keys of the objects currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Content of a stored object.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .ok()
            .and_then(|o| o.get(key).map(|s| s.data.clone()))
    }

    fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check_failure(&self, op: &'static str, key: &str) -> Result<(), TransportError> {
        let Ok(mut failures) = self.failures.lock() else {
            return Ok(());
        };
        if let Some(remaining) = failures.get_mut(&(op, key.to_string())).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(TransportError::Unavailable(format!("injected {op} failure for '{key}'")));
        }
        Ok(())
    }

    fn poisoned() -> TransportError {
        TransportError::Unavailable("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl Downloadable for MemoryTransport {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TransportError> {
        self.record(TransportCall::Get(key.to_string()));
        self.check_failure("get", key)?;
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        Ok(objects.get(key).map(|o| o.data.clone()))
    }
}

#[async_trait]
impl Uploadable for MemoryTransport {
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), TransportError> {
        self.record(TransportCall::Put {
            key: key.to_string(),
            no_cache: options.no_cache,
        });
        self.check_failure("put", key)?;
        let etag = format!("\"{}\"", Md5Hash::compute(&body));
        let mut objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data: body,
                etag,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        self.record(TransportCall::Delete(key.to_string()));
        self.check_failure("delete", key)?;
        let mut objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransportError> {
        self.record(TransportCall::List(prefix.to_string()));
        self.check_failure("list", prefix)?;
        let objects = self.objects.lock().map_err(|_| Self::poisoned())?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| RemoteObject {
                key: key.clone(),
                etag: Some(obj.etag.clone()),
                last_modified: Some(obj.last_modified),
                size: Some(obj.data.len() as u64),
            })
            .collect())
    }
}
