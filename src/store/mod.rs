//! Hierarchical JSON-tree store.
//!
//! Records live at `/`-separated paths (`users/{uid}/profile`,
//! `videos/{id}`, ...). Every logical action commits one [`Batch`]: guards are
//! checked and writes applied as a single unit, so a like, a follow or a
//! comment never leaves a counter without its index entry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub mod memory;
pub mod path;
pub mod postgres;

pub use memory::MemoryStore;
pub use path::encode_key;
pub use postgres::PgStore;

pub type SharedStore = Arc<dyn TreeStore>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("guard failed: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rate limited")]
    RateLimited,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Errors worth retrying as-is: the backend was unreachable or throttled.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::RateLimited)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Exists,
    Missing,
    /// The subtree is exactly this value; `Value::Null` means absent.
    Equals(Value),
}

impl Guard {
    /// Checks the guard against what is stored at `at`.
    pub(crate) fn check(&self, at: &str, found: Option<&Value>) -> Result<(), StoreError> {
        match (self, found) {
            (Guard::Exists, None) => Err(StoreError::Conflict(format!("{at} does not exist"))),
            (Guard::Missing, Some(_)) => {
                Err(StoreError::Conflict(format!("{at} already exists")))
            }
            (Guard::Equals(expected), found) => {
                let expected = path::prune(expected.clone());
                if found.unwrap_or(&Value::Null) == &expected {
                    Ok(())
                } else {
                    Err(StoreError::Conflict(format!("{at} changed")))
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set(Value),
    Remove,
    /// Relative add; a missing or non-integer target counts as 0 and the
    /// result never drops below 0.
    Increment(i64),
}

/// Guards and writes applied atomically by [`TreeStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub guards: Vec<(String, Guard)>,
    pub writes: Vec<(String, Write)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, path: impl Into<String>, guard: Guard) -> Self {
        self.guards.push((path.into(), guard));
        self
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.writes.push((path.into(), Write::Set(value)));
        self
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.writes.push((path.into(), Write::Remove));
        self
    }

    pub fn increment(mut self, path: impl Into<String>, delta: i64) -> Self {
        self.writes.push((path.into(), Write::Increment(delta)));
        self
    }

    pub fn push(&mut self, path: impl Into<String>, write: Write) {
        self.writes.push((path.into(), write));
    }

    pub fn push_guard(&mut self, path: impl Into<String>, guard: Guard) {
        self.guards.push((path.into(), guard));
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Validates and canonicalizes every path before anything is written.
    pub(crate) fn normalized(self) -> Result<Self, StoreError> {
        let guards = self
            .guards
            .into_iter()
            .map(|(p, g)| Ok((path::normalize(&p)?, g)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        let writes = self
            .writes
            .into_iter()
            .map(|(p, w)| Ok((path::normalize(&p)?, w)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(Self { guards, writes })
    }
}

pub(crate) fn incremented(current: Option<&Value>, delta: i64) -> Value {
    let base = current.and_then(Value::as_i64).unwrap_or(0);
    Value::from(base.saturating_add(delta).max(0))
}

#[async_trait]
pub trait TreeStore: Send + Sync {
    /// The subtree at `path`, or `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Applies every write of `batch` if and only if every guard holds.
    async fn commit(&self, batch: Batch) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.get(path).await?.is_some())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.commit(Batch::new().set(path, value)).await
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.commit(Batch::new().remove(path)).await
    }

    async fn increment(&self, path: &str, delta: i64) -> Result<(), StoreError> {
        self.commit(Batch::new().increment(path, delta)).await
    }
}

pub fn to_value<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

/// Reads and deserializes a single record.
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn TreeStore,
    path: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Reads a collection node as `(key, record)` pairs. Children that do not
/// match the record shape are skipped.
pub async fn children_as<T: DeserializeOwned>(
    store: &dyn TreeStore,
    path: &str,
) -> Result<Vec<(String, T)>, StoreError> {
    Ok(children_of(path, store.get(path).await?))
}

/// [`children_as`] over a node that has already been read.
pub fn children_of<T: DeserializeOwned>(path: &str, node: Option<Value>) -> Vec<(String, T)> {
    let Some(Value::Object(map)) = node else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        match serde_json::from_value::<T>(value) {
            Ok(record) => out.push((key, record)),
            Err(e) => tracing::warn!("Skipping malformed record at {}/{}: {}", path, key, e),
        }
    }
    out
}

/// Child keys of a node; empty when the node is absent or a leaf.
pub async fn child_keys(store: &dyn TreeStore, path: &str) -> Result<Vec<String>, StoreError> {
    match store.get(path).await? {
        Some(Value::Object(map)) => Ok(map.keys().cloned().collect()),
        _ => Ok(Vec::new()),
    }
}
