use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{incremented, path, Batch, StoreError, TreeStore, Write};

/// In-process tree. A commit holds the write lock from the first guard check
/// to the last write.
pub struct MemoryStore {
    root: RwLock<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// Starts from an existing tree, e.g. an export of the hosted database.
    pub fn with_tree(tree: Value) -> Self {
        Self {
            root: RwLock::new(path::prune(tree)),
        }
    }

    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segs = path::segments(path)?;
        let root = self.root.read().await;
        Ok(path::lookup(&root, &segs).cloned())
    }

    async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        let batch = batch.normalized()?;
        let mut root = self.root.write().await;

        for (p, guard) in &batch.guards {
            let segs = path::segments(p)?;
            guard.check(p, path::lookup(&root, &segs))?;
        }

        for (p, write) in batch.writes {
            let segs = path::segments(&p)?;
            let value = match write {
                Write::Set(value) => value,
                Write::Remove => Value::Null,
                Write::Increment(delta) => incremented(path::lookup(&root, &segs), delta),
            };
            path::put(&mut root, &segs, value);
        }

        if root.is_null() {
            *root = Value::Object(Map::new());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Guard;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_nested() {
        let store = MemoryStore::new();
        store
            .set("users/u1/profile", json!({"name": "ana", "followers": 0}))
            .await
            .unwrap();

        assert_eq!(
            store.get("users/u1/profile/name").await.unwrap(),
            Some(json!("ana"))
        );
        assert_eq!(
            store.get("/users/u1/").await.unwrap(),
            Some(json!({"profile": {"name": "ana", "followers": 0}}))
        );
        assert_eq!(store.get("users/u2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_guard_writes_nothing() {
        let store = MemoryStore::new();
        store.set("a/b", json!(1)).await.unwrap();

        let batch = Batch::new()
            .set("x/y", json!(true))
            .increment("a/b", 1)
            .guard("a/b", Guard::Missing);
        let err = store.commit(batch).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get("x").await.unwrap(), None);
        assert_eq!(store.get("a/b").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_equals_guard_compares_subtree() {
        let store = MemoryStore::new();
        store.set("v/likedBy/u1", json!(true)).await.unwrap();

        let stale = Batch::new()
            .guard("v/likedBy", Guard::Equals(json!({})))
            .remove("v");
        assert!(matches!(store.commit(stale).await, Err(StoreError::Conflict(_))));

        let absent = Batch::new()
            .guard("v/replies", Guard::Equals(Value::Null))
            .guard("v/likedBy", Guard::Equals(json!({"u1": true})))
            .remove("v");
        store.commit(absent).await.unwrap();
        assert_eq!(store.get("v").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_path_writes_nothing() {
        let store = MemoryStore::new();
        let batch = Batch::new().set("ok/path", json!(1)).set("bad.path", json!(2));

        assert!(matches!(
            store.commit(batch).await,
            Err(StoreError::InvalidPath(_))
        ));
        assert_eq!(store.get("ok").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_floors_at_zero() {
        let store = MemoryStore::new();
        store.increment("v/likes", 1).await.unwrap();
        store.increment("v/likes", -1).await.unwrap();
        store.increment("v/likes", -1).await.unwrap();

        assert_eq!(store.get("v/likes").await.unwrap(), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_remove_prunes_and_null_set_removes() {
        let store = MemoryStore::new();
        store.set("a/b/c", json!("x")).await.unwrap();
        store.set("a/d", json!(2)).await.unwrap();

        store.remove("a/b/c").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"d": 2})));

        store.set("a/d", Value::Null).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.snapshot().await, json!({}));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("counter", 1).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.get("counter").await.unwrap(), Some(json!(32)));
    }
}
