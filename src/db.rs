use anyhow::Result;
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::task::{Task, DATE_FORMAT};

pub type DbPool = SqlitePool;

pub async fn init_db(database_url: &str) -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    create_tables(&pool).await?;
    Ok(pool)
}

async fn create_tables(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            due_date TEXT,
            created_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks (due_date)")
        .execute(pool)
        .await?;

    Ok(())
}

type TaskRow = (i64, String, String, Option<String>);

const TASK_COLUMNS: &str = "id, title, description, due_date";

fn row_to_task((id, title, description, due_date): TaskRow) -> Task {
    Task {
        id: Some(id),
        title,
        description,
        due_date: due_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
    }
}

fn date_param(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

// Insert a new task, or update it in place when it already has an id
pub async fn save_task(pool: &DbPool, task: &Task) -> Result<i64> {
    if let Some(id) = task.id {
        sqlx::query("UPDATE tasks SET title = ?, description = ?, due_date = ? WHERE id = ?")
            .bind(&task.title)
            .bind(&task.description)
            .bind(date_param(task.due_date))
            .bind(id)
            .execute(pool)
            .await?;
        return Ok(id);
    }

    let result = sqlx::query(
        "INSERT INTO tasks (title, description, due_date, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(date_param(task.due_date))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

// Insert a batch of new tasks atomically
pub async fn save_tasks(pool: &DbPool, tasks: &[Task]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let now = chrono::Utc::now().to_rfc3339();

    for task in tasks {
        sqlx::query(
            "INSERT INTO tasks (title, description, due_date, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(date_param(task.due_date))
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(tasks.len())
}

pub async fn get_task(pool: &DbPool, id: i64) -> Result<Option<Task>> {
    let row: Option<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(row_to_task))
}

pub async fn get_tasks_by_date(pool: &DbPool, date: NaiveDate) -> Result<Vec<Task>> {
    let rows: Vec<TaskRow> = sqlx::query_as(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE due_date = ? ORDER BY id"
    ))
    .bind(date.format(DATE_FORMAT).to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_task).collect())
}

// Tasks due within [start, end], inclusive on both ends
pub async fn get_tasks_between(pool: &DbPool, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>> {
    let rows: Vec<TaskRow> = sqlx::query_as(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE due_date >= ? AND due_date <= ? ORDER BY due_date, id"
    ))
    .bind(start.format(DATE_FORMAT).to_string())
    .bind(end.format(DATE_FORMAT).to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_task).collect())
}

// All tasks, soonest due first; undated tasks last
pub async fn get_tasks_by_due_date(pool: &DbPool) -> Result<Vec<Task>> {
    let rows: Vec<TaskRow> = sqlx::query_as(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY due_date IS NULL, due_date, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_task).collect())
}

pub async fn get_all_tasks(pool: &DbPool) -> Result<Vec<Task>> {
    let rows: Vec<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_task).collect())
}

pub async fn delete_task(pool: &DbPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_tasks(pool: &DbPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tasks").execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
pub async fn init_memory_db() -> Result<DbPool> {
    // One connection: every in-memory connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_tables(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get_task() {
        let pool = init_memory_db().await.unwrap();
        let id = save_task(&pool, &Task::new("Stretch", "ten minutes", Some(date(2025, 4, 1))))
            .await
            .unwrap();

        let task = get_task(&pool, id).await.unwrap().unwrap();
        assert_eq!(task.id, Some(id));
        assert_eq!(task.title, "Stretch");
        assert_eq!(task.due_date, Some(date(2025, 4, 1)));
    }

    #[tokio::test]
    async fn test_save_existing_task_updates_in_place() {
        let pool = init_memory_db().await.unwrap();
        let id = save_task(&pool, &Task::new("Draft", "", None)).await.unwrap();

        let mut task = get_task(&pool, id).await.unwrap().unwrap();
        task.title = "Final".to_string();
        task.due_date = Some(date(2025, 5, 5));
        assert_eq!(save_task(&pool, &task).await.unwrap(), id);

        let all = get_all_tasks(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Final");
    }

    #[tokio::test]
    async fn test_date_queries() {
        let pool = init_memory_db().await.unwrap();
        let tasks = vec![
            Task::new("a", "", Some(date(2025, 2, 10))),
            Task::new("b", "", Some(date(2025, 3, 1))),
            Task::new("c", "", Some(date(2025, 3, 31))),
            Task::new("d", "", None),
        ];
        assert_eq!(save_tasks(&pool, &tasks).await.unwrap(), 4);

        let march = get_tasks_between(&pool, date(2025, 3, 1), date(2025, 3, 31)).await.unwrap();
        let titles: Vec<&str> = march.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);

        let on_day = get_tasks_by_date(&pool, date(2025, 2, 10)).await.unwrap();
        assert_eq!(on_day.len(), 1);

        let ordered = get_tasks_by_due_date(&pool).await.unwrap();
        let titles: Vec<&str> = ordered.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let pool = init_memory_db().await.unwrap();
        let id = save_task(&pool, &Task::new("x", "", None)).await.unwrap();
        save_task(&pool, &Task::new("y", "", None)).await.unwrap();

        assert!(delete_task(&pool, id).await.unwrap());
        assert!(!delete_task(&pool, id).await.unwrap());
        assert_eq!(clear_tasks(&pool).await.unwrap(), 1);
        assert!(get_all_tasks(&pool).await.unwrap().is_empty());
    }
}
