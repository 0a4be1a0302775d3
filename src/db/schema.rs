//! The table layout the machine writes, and a check that an imported file has it.

use std::collections::HashSet;

use sqlx::{Row, SqlitePool};

/// Tables (and the columns read from them) a database must carry to be
/// usable. `set_quantity_table` is optional and therefore absent here.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("recipe_table", &["id", "name", "type"]),
    ("task_table", &["id", "name", "unit"]),
    ("recipe_task_table", &["recipeId", "taskId", "quantity"]),
    ("range_table", &["recipeId", "taskId", "range", "description"]),
    ("make_drink_table", &["userId", "recipeName", "timestamp"]),
];

pub const QUANTITY_LOG_TABLE: &str = "set_quantity_table";

const CREATE_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS recipe_table (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  type TEXT NOT NULL DEFAULT 'DEFAULT'
)"#,
    r#"CREATE TABLE IF NOT EXISTS task_table (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  unit TEXT NOT NULL DEFAULT ''
)"#,
    r#"CREATE TABLE IF NOT EXISTS recipe_task_table (
  recipeId INTEGER NOT NULL REFERENCES recipe_table(id),
  taskId INTEGER NOT NULL REFERENCES task_table(id),
  quantity INTEGER NOT NULL DEFAULT 0,
  PRIMARY KEY (recipeId, taskId)
)"#,
    r#"CREATE TABLE IF NOT EXISTS range_table (
  recipeId INTEGER NOT NULL,
  taskId INTEGER NOT NULL,
  "range" TEXT,
  description TEXT,
  PRIMARY KEY (recipeId, taskId)
)"#,
    r#"CREATE TABLE IF NOT EXISTS make_drink_table (
  id INTEGER PRIMARY KEY,
  userId INTEGER NOT NULL,
  recipeName TEXT NOT NULL,
  timestamp TEXT
)"#,
    r#"CREATE TABLE IF NOT EXISTS set_quantity_table (
  id INTEGER PRIMARY KEY,
  userId INTEGER,
  recipeName TEXT,
  taskName TEXT,
  quantity INTEGER,
  timestamp TEXT
)"#,
];

/// Create every table on an empty database. Existing tables are left alone.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in CREATE_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(target: "auramatic", event = "db_schema_created");
    Ok(())
}

/// Return the required tables and columns `pool` lacks, as `table` or
/// `table.column`. An empty result means the database is usable.
pub async fn missing_schema(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    let mut missing = Vec::new();
    for (table, columns) in REQUIRED_COLUMNS {
        let present: HashSet<String> = sqlx::query("SELECT name FROM pragma_table_info(?1)")
            .bind(*table)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?;

        if present.is_empty() {
            missing.push((*table).to_string());
            continue;
        }
        for column in columns.iter() {
            if !present.contains(*column) {
                missing.push(format!("{table}.{column}"));
            }
        }
    }
    Ok(missing)
}

pub async fn has_table(pool: &SqlitePool, table: &str) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(table)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}
