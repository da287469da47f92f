use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{
    postgres::PgArguments, query::Query, PgPool, Postgres, Row, Transaction,
};

use super::{incremented, path, Batch, Guard, StoreError, TreeStore, Write};

/// The tree persisted in PostgreSQL, one row per leaf in `tree_nodes`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// The node at `$1` and every path below it. `~>=~`/`~<~` compare bytewise,
/// like the `text_pattern_ops` index, and `'0'` is the byte after `'/'`.
const SUBTREE_FILTER: &str =
    "(path = $1 OR (path ~>=~ ($1 || '/') AND path ~<~ ($1 || '0')))";

/// The whole tree is selected without a filter so the scan stays planable.
fn subtree_query<'q>(head: &'q str, base: &'q str) -> Query<'q, Postgres, PgArguments> {
    let query = sqlx::query(head);
    if base.is_empty() {
        query
    } else {
        query.bind(base)
    }
}

fn subtree_sql(head: &str, base: &str, tail: &str) -> String {
    if base.is_empty() {
        format!("{head}{tail}")
    } else {
        format!("{head} WHERE {SUBTREE_FILTER}{tail}")
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // A unique violation means a concurrent commit created the same leaf.
            Some("40001") | Some("40P01") | Some("23505") => {
                StoreError::Conflict(db.message().to_string())
            }
            Some("53300") => StoreError::RateLimited,
            _ => StoreError::Backend(e.to_string()),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

async fn read_subtree<'e, E>(executor: E, base: &str) -> Result<Option<Value>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = subtree_sql("SELECT path, value FROM tree_nodes", base, "");
    let rows = subtree_query(&sql, base)
        .fetch_all(executor)
    .await
    .map_err(map_sqlx)?;

    let mut tree = Value::Object(Map::new());
    for row in rows {
        let full: String = row.get("path");
        let value: Value = row.get("value");
        if full == base {
            return Ok(Some(value));
        }
        let relative = if base.is_empty() {
            full.as_str()
        } else {
            &full[base.len() + 1..]
        };
        let segs: Vec<&str> = relative.split('/').collect();
        path::put(&mut tree, &segs, value);
    }

    Ok(if path::is_empty(&tree) { None } else { Some(tree) })
}

async fn subtree_exists(
    tx: &mut Transaction<'_, Postgres>,
    base: &str,
) -> Result<bool, StoreError> {
    let sql = subtree_sql("SELECT EXISTS(SELECT 1 FROM tree_nodes", base, ") AS present");
    let row = subtree_query(&sql, base)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx)?;
    Ok(row.get("present"))
}

/// Replaces everything at `base` (and any leaf standing where an ancestor
/// object has to be) with the leaves of `value`.
async fn replace(
    tx: &mut Transaction<'_, Postgres>,
    base: &str,
    value: Value,
) -> Result<(), StoreError> {
    let sql = subtree_sql("DELETE FROM tree_nodes", base, "");
    subtree_query(&sql, base)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;

    let leaves = path::flatten(base, &path::prune(value));
    if leaves.is_empty() {
        return Ok(());
    }

    sqlx::query("DELETE FROM tree_nodes WHERE path = ANY($1)")
        .bind(path::ancestors(base))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;

    for (leaf_path, leaf) in leaves {
        sqlx::query("INSERT INTO tree_nodes (path, value) VALUES ($1, $2)")
            .bind(leaf_path)
            .bind(leaf)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx)?;
    }
    Ok(())
}

#[async_trait]
impl TreeStore for PgStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let base = path::normalize(path)?;
        read_subtree(&self.pool, &base).await
    }

    async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        let batch = batch.normalized()?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        for (p, guard) in &batch.guards {
            let found = match guard {
                Guard::Equals(_) => read_subtree(&mut *tx, p).await?,
                // Presence is all the other guards look at.
                _ => subtree_exists(&mut tx, p).await?.then_some(Value::Bool(true)),
            };
            guard.check(p, found.as_ref())?;
        }

        for (p, write) in batch.writes {
            let value = match write {
                Write::Set(value) => value,
                Write::Remove => Value::Null,
                Write::Increment(delta) => {
                    let current = read_subtree(&mut *tx, &p).await?;
                    incremented(current.as_ref(), delta)
                }
            };
            replace(&mut tx, &p, value).await?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }
}
