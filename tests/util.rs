#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::path::{Path, PathBuf};

use auramatic_lib::db::{open_sqlite_pool, schema};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Espresso (1) and Latte (2) carry constrained tasks; Plain (4) has none;
/// Custom (3) is not a default recipe.
const FIXTURE: &[&str] = &[
    "INSERT INTO recipe_table (id, name, type) VALUES
        (1, 'Espresso', 'DEFAULT'),
        (2, 'Latte', 'DEFAULT'),
        (3, 'Custom', 'IMPORTED'),
        (4, 'Plain', 'DEFAULT')",
    "INSERT INTO task_table (id, name, unit) VALUES
        (10, 'Grind', 'g'),
        (11, 'Water', 'ml'),
        (12, 'Milk', 'ml'),
        (13, 'Heat', 'C')",
    "INSERT INTO recipe_task_table (recipeId, taskId, quantity) VALUES
        (1, 10, 3),
        (1, 11, 40),
        (1, 12, 0),
        (2, 10, 2),
        (2, 12, 150),
        (4, 13, 90)",
    r#"INSERT INTO range_table (recipeId, taskId, "range", description) VALUES
        (1, 10, '1,3,5', 'Ground coffee'),
        (1, 11, '30,40,50', NULL),
        (1, 12, '0', NULL),
        (2, 10, '2,4', NULL),
        (2, 12, '', NULL)"#,
    "INSERT INTO make_drink_table (userId, recipeName, timestamp) VALUES
        (1, 'Espresso', '2024-03-01T08:00:00Z'),
        (2, 'Latte', '2024-03-01T08:05:00Z'),
        (1, 'Espresso', '2024-03-01T09:00:00Z')",
    "INSERT INTO set_quantity_table (userId, recipeName, taskName, quantity, timestamp) VALUES
        (1, 'Espresso', 'Grind', 3, '2024-03-01T07:59:00Z')",
];

const ALTERNATE: &[&str] = &[
    "INSERT INTO recipe_table (id, name, type) VALUES
        (7, 'Cappuccino', 'DEFAULT'),
        (8, 'Guest', 'IMPORTED')",
    "INSERT INTO task_table (id, name, unit) VALUES (20, 'Foam', 's')",
    "INSERT INTO recipe_task_table (recipeId, taskId, quantity) VALUES (7, 20, 6)",
    r#"INSERT INTO range_table (recipeId, taskId, "range", description) VALUES (7, 20, '4,6,8', NULL)"#,
    "INSERT INTO make_drink_table (userId, recipeName, timestamp) VALUES
        (5, 'Cappuccino', '2024-04-02T10:00:00Z')",
];

async fn build(path: &Path, statements: &[&str]) {
    let pool = open_sqlite_pool(path, true).await.expect("create sqlite file");
    schema::create_schema(&pool).await.expect("create tables");
    for statement in statements {
        sqlx::query(statement).execute(&pool).await.expect("seed row");
    }
    pool.close().await;
}

pub async fn seeded_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("app_database.db");
    build(&path, FIXTURE).await;
    path
}

/// Seed the standard fixture at an explicit location, creating parents.
pub async fn seeded_at(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    build(path, FIXTURE).await;
}

pub async fn alternate_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("imported.db");
    build(&path, ALTERNATE).await;
    path
}

/// A valid sqlite file that lacks `range_table`.
pub async fn incomplete_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("incomplete.db");
    let pool = open_sqlite_pool(&path, true).await.expect("create sqlite file");
    sqlx::query("CREATE TABLE recipe_table (id INTEGER PRIMARY KEY, name TEXT, type TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
    path
}

pub fn garbage_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"this is not a database, just some text that is long enough")
        .unwrap();
    path
}

/// Independent connection for asserting on what was persisted.
pub async fn inspect(path: &Path) -> SqlitePool {
    open_sqlite_pool(path, false).await.expect("open for inspection")
}

pub async fn stored_quantity(path: &Path, recipe_id: i64, task_id: i64) -> i64 {
    let pool = inspect(path).await;
    let quantity = sqlx::query_scalar(
        "SELECT quantity FROM recipe_task_table WHERE recipeId = ? AND taskId = ?",
    )
    .bind(recipe_id)
    .bind(task_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    pool.close().await;
    quantity
}

pub async fn stored_range(path: &Path, recipe_id: i64, task_id: i64) -> Option<String> {
    let pool = inspect(path).await;
    let range = sqlx::query_scalar(
        r#"SELECT "range" FROM range_table WHERE recipeId = ? AND taskId = ?"#,
    )
    .bind(recipe_id)
    .bind(task_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    pool.close().await;
    range
}
