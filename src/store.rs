use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Column, Row, SqlitePool, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{self, schema};
use crate::model::{DrinkEvent, RecipeSummary, ResolvedTask, DEFAULT_RECIPE_KIND};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no database is open")]
    NotOpen,
    #[error("cannot open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
    #[error("database {} is missing {}", path.display(), missing.join(", "))]
    Schema { path: PathBuf, missing: Vec<String> },
    #[error("recipe {0} not found")]
    RecipeNotFound(i64),
    #[error("no row matched recipe {recipe_id} task {task_id}")]
    RowNotFound { recipe_id: i64, task_id: i64 },
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

impl StoreError {
    /// True when the failure means there is no usable backing database.
    pub fn is_connection(&self) -> bool {
        match self {
            StoreError::NotOpen | StoreError::Open { .. } | StoreError::Schema { .. } => true,
            StoreError::Query(err) => matches!(
                err,
                sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
            ),
            StoreError::RecipeNotFound(_) | StoreError::RowNotFound { .. } => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
struct ActiveDb {
    pool: SqlitePool,
    path: PathBuf,
}

/// A database that has been opened and schema-checked but is not active yet.
///
/// Reads against a staged database let an import collect everything it needs
/// before the process switches over, so a failed import never leaves the
/// active store pointing at a half-usable file.
pub struct StagedDb {
    pool: SqlitePool,
    path: PathBuf,
}

impl StagedDb {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list_default_recipes(&self) -> StoreResult<Vec<RecipeSummary>> {
        list_default_recipes(&self.pool).await
    }

    pub async fn list_drink_events(&self) -> StoreResult<Vec<DrinkEvent>> {
        list_drink_events(&self.pool).await
    }

    pub async fn list_quantity_events(&self) -> StoreResult<Vec<Value>> {
        list_quantity_events(&self.pool).await
    }

    /// Discard the staged database without activating it.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Owner of the one open recipe database.
///
/// Cloning is cheap; clones share the active connection.
#[derive(Clone, Default)]
pub struct Store {
    active: Arc<RwLock<Option<ActiveDb>>>,
}

impl Store {
    /// A store with no database open. Every query fails with
    /// [`StoreError::NotOpen`] until [`Store::open_database`] succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(path: &Path) -> StoreResult<Self> {
        let store = Self::new();
        store.open_database(path).await?;
        Ok(store)
    }

    pub fn is_open(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|db| db.path.clone())
    }

    fn pool(&self) -> StoreResult<SqlitePool> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|db| db.pool.clone())
            .ok_or(StoreError::NotOpen)
    }

    /// Open `path` and verify it carries the recipe schema, without making it
    /// the active database.
    pub async fn stage(path: &Path) -> StoreResult<StagedDb> {
        let pool = db::open_sqlite_pool(path, false)
            .await
            .map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let missing = match schema::missing_schema(&pool).await {
            Ok(missing) => missing,
            Err(source) => {
                // A file that is not a sqlite database opens fine and only
                // fails on the first read.
                pool.close().await;
                return Err(StoreError::Open {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if !missing.is_empty() {
            pool.close().await;
            warn!(
                target: "auramatic",
                event = "db_schema_rejected",
                path = %path.display(),
                missing = %missing.join(",")
            );
            return Err(StoreError::Schema {
                path: path.to_path_buf(),
                missing,
            });
        }

        Ok(StagedDb {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Make a staged database the active one and close the previous pool.
    pub async fn promote(&self, staged: StagedDb) {
        let previous = {
            let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
            guard.replace(ActiveDb {
                pool: staged.pool,
                path: staged.path.clone(),
            })
        };
        info!(
            target: "auramatic",
            event = "db_switched",
            path = %staged.path.display(),
            previous = previous.as_ref().map(|db| db.path.display().to_string())
        );
        if let Some(previous) = previous {
            previous.pool.close().await;
        }
    }

    /// Replace the active database with `path`.
    ///
    /// Callers holding cached task data must drop it afterwards.
    pub async fn open_database(&self, path: &Path) -> StoreResult<()> {
        let staged = Self::stage(path).await?;
        self.promote(staged).await;
        Ok(())
    }

    pub async fn close(&self) {
        let previous = self
            .active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(previous) = previous {
            previous.pool.close().await;
        }
    }

    pub async fn list_default_recipes(&self) -> StoreResult<Vec<RecipeSummary>> {
        list_default_recipes(&self.pool()?).await
    }

    /// Tasks of `recipe_id` that carry a usable range, ordered by task id.
    pub async fn get_resolved_tasks(&self, recipe_id: i64) -> StoreResult<Vec<ResolvedTask>> {
        let pool = self.pool()?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipe_table WHERE id = ?")
            .bind(recipe_id)
            .fetch_one(&pool)
            .await?;
        if exists == 0 {
            return Err(StoreError::RecipeNotFound(recipe_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT r.recipeId AS recipe_id,
                   r.taskId AS task_id,
                   COALESCE(CAST(r.quantity AS INTEGER), 0) AS quantity,
                   CAST(r.quantity AS TEXT) AS stored_quantity,
                   (typeof(r.quantity) = 'real' AND r.quantity <> CAST(r.quantity AS INTEGER)) AS fractional,
                   COALESCE(t.name, '') AS name,
                   COALESCE(t.unit, '') AS unit,
                   CAST(rg."range" AS TEXT) AS range_values,
                   rg.description AS description
            FROM recipe_task_table r
            JOIN task_table t ON r.taskId = t.id
            LEFT JOIN range_table rg ON r.recipeId = rg.recipeId AND r.taskId = rg.taskId
            WHERE r.recipeId = ?
              AND rg."range" IS NOT NULL
              AND CAST(rg."range" AS TEXT) NOT IN ('', '0')
            ORDER BY r.taskId
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<ResolvedTask> {
                let task = ResolvedTask {
                    recipe_id: row.try_get("recipe_id")?,
                    task_id: row.try_get("task_id")?,
                    name: row.try_get("name")?,
                    unit: row.try_get("unit")?,
                    quantity: row.try_get("quantity")?,
                    range: row.try_get("range_values")?,
                    description: row.try_get("description")?,
                };
                if row.try_get::<bool, _>("fractional")? {
                    let stored: Option<String> = row.try_get("stored_quantity")?;
                    warn_fractional(task.recipe_id, task.task_id, stored.as_deref(), task.quantity);
                }
                Ok(task)
            })
            .collect()
    }

    /// Write the operative quantity of one task. Exactly one row must match.
    pub async fn set_quantity(&self, recipe_id: i64, task_id: i64, quantity: i64) -> StoreResult<u64> {
        let res = sqlx::query(
            "UPDATE recipe_task_table SET quantity = ? WHERE recipeId = ? AND taskId = ?",
        )
        .bind(quantity)
        .bind(recipe_id)
        .bind(task_id)
        .execute(&self.pool()?)
        .await?;
        expect_one_row(res.rows_affected(), recipe_id, task_id)
    }

    /// Write the serialized allowed range of one task. Exactly one row must match.
    pub async fn set_range(&self, recipe_id: i64, task_id: i64, range: &str) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"UPDATE range_table SET "range" = ? WHERE recipeId = ? AND taskId = ?"#,
        )
        .bind(range)
        .bind(recipe_id)
        .bind(task_id)
        .execute(&self.pool()?)
        .await?;
        expect_one_row(res.rows_affected(), recipe_id, task_id)
    }

    pub async fn current_quantity(&self, recipe_id: i64, task_id: i64) -> StoreResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT CAST(quantity AS INTEGER) AS quantity,
                   CAST(quantity AS TEXT) AS stored_quantity,
                   (typeof(quantity) = 'real' AND quantity <> CAST(quantity AS INTEGER)) AS fractional
            FROM recipe_task_table
            WHERE recipeId = ? AND taskId = ?
            "#,
        )
        .bind(recipe_id)
        .bind(task_id)
        .fetch_optional(&self.pool()?)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let quantity: Option<i64> = row.try_get("quantity")?;
        if let (Some(quantity), true) = (quantity, row.try_get::<bool, _>("fractional")?) {
            let stored: Option<String> = row.try_get("stored_quantity")?;
            warn_fractional(recipe_id, task_id, stored.as_deref(), quantity);
        }
        Ok(quantity)
    }

    pub async fn list_drink_events(&self) -> StoreResult<Vec<DrinkEvent>> {
        list_drink_events(&self.pool()?).await
    }

    pub async fn list_quantity_events(&self) -> StoreResult<Vec<Value>> {
        list_quantity_events(&self.pool()?).await
    }
}

/// Quantities are whole numbers on the wire; a REAL written by the machine
/// is truncated toward zero.
fn warn_fractional(recipe_id: i64, task_id: i64, stored: Option<&str>, quantity: i64) {
    warn!(
        target: "auramatic",
        event = "quantity_truncated",
        recipe_id,
        task_id,
        stored = stored.unwrap_or_default(),
        quantity
    );
}

fn expect_one_row(affected: u64, recipe_id: i64, task_id: i64) -> StoreResult<u64> {
    if affected == 0 {
        return Err(StoreError::RowNotFound { recipe_id, task_id });
    }
    Ok(affected)
}

async fn list_default_recipes(pool: &SqlitePool) -> StoreResult<Vec<RecipeSummary>> {
    let rows = sqlx::query("SELECT id, name FROM recipe_table WHERE type = ? ORDER BY id")
        .bind(DEFAULT_RECIPE_KIND)
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| -> StoreResult<RecipeSummary> {
            Ok(RecipeSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .collect()
}

async fn list_drink_events(pool: &SqlitePool) -> StoreResult<Vec<DrinkEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT COALESCE(CAST(userId AS TEXT), '') AS user_id,
               COALESCE(CAST(recipeName AS TEXT), '') AS recipe_name,
               CAST(timestamp AS TEXT) AS timestamp
        FROM make_drink_table
        ORDER BY rowid
        "#,
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| -> StoreResult<DrinkEvent> {
            Ok(DrinkEvent {
                user_id: row.try_get("user_id")?,
                recipe_name: row.try_get("recipe_name")?,
                timestamp: row.try_get("timestamp")?,
            })
        })
        .collect()
}

async fn list_quantity_events(pool: &SqlitePool) -> StoreResult<Vec<Value>> {
    if !schema::has_table(pool, schema::QUANTITY_LOG_TABLE).await? {
        return Ok(Vec::new());
    }
    let sql = format!("SELECT * FROM {} ORDER BY rowid", schema::QUANTITY_LOG_TABLE);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(row_to_value).collect())
}

fn row_to_value(row: SqliteRow) -> Value {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        let v = row.try_get_raw(idx).ok();
        let val = match v {
            Some(raw) => {
                if raw.is_null() {
                    Value::Null
                } else {
                    match raw.type_info().name() {
                        "INTEGER" => row
                            .try_get::<i64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        "REAL" => row
                            .try_get::<f64, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        _ => row
                            .try_get::<String, _>(idx)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    }
                }
            }
            None => Value::Null,
        };
        map.insert(col.name().to_string(), val);
    }
    Value::Object(map)
}
