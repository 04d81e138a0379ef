//! Backup binary for copying the planner database to a backup file.
//!
//! Usage: cargo run --bin backup
//!        cargo run --bin backup -- --target my_backup.db
//!        cargo run --bin backup -- --db sqlite:other.db --target backup.db
//!
//! Creates a backup of every task in a new file.

mod config;
mod db;
mod task;

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use tracing::info;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "backup")]
#[command(about = "Backup the planner database to a new file")]
struct Args {
    /// Source database URL (overrides DATABASE_URL from .env)
    #[arg(long)]
    db: Option<String>,

    /// Target backup file path (default: backup_{year}_{month}_{day}.db)
    #[arg(long)]
    target: Option<String>,
}

fn default_target(date: NaiveDate) -> String {
    format!("backup_{}_{:02}_{:02}.db", date.year(), date.month(), date.day())
}

type BackupRow = (i64, String, String, Option<String>, Option<String>);

async fn copy_tasks(source: &db::DbPool, target: &db::DbPool) -> Result<usize> {
    let rows: Vec<BackupRow> =
        sqlx::query_as("SELECT id, title, description, due_date, created_at FROM tasks ORDER BY id")
            .fetch_all(source)
            .await?;

    let mut tx = target.begin().await?;
    for row in &rows {
        sqlx::query(
            "INSERT INTO tasks (id, title, description, due_date, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(row.0)
        .bind(&row.1)
        .bind(&row.2)
        .bind(&row.3)
        .bind(&row.4)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(rows.len())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    config::init_tracing("info")?;

    let config = AppConfig::load();
    let source_url = args.db.unwrap_or(config.database_url);
    let target_file = args.target.unwrap_or_else(|| default_target(chrono::Utc::now().date_naive()));
    let target_url = format!("sqlite:{}?mode=rwc", target_file);

    info!(source = %source_url, target = %target_file, "starting backup");

    let source_pool = db::init_db(&source_url).await?;
    // init_db creates the table in the new file
    let target_pool = db::init_db(&target_url).await?;

    let copied = copy_tasks(&source_pool, &target_pool).await?;
    info!(copied, target = %target_file, "backup completed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[test]
    fn test_default_target_name() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(default_target(date), "backup_2025_03_07.db");
    }

    #[tokio::test]
    async fn test_copy_tasks_keeps_ids() {
        let source = db::init_memory_db().await.unwrap();
        let target = db::init_memory_db().await.unwrap();
        db::save_task(&source, &Task::new("a", "", NaiveDate::from_ymd_opt(2025, 1, 2))).await.unwrap();
        let id = db::save_task(&source, &Task::new("b", "x", None)).await.unwrap();

        assert_eq!(copy_tasks(&source, &target).await.unwrap(), 2);
        let copied = db::get_task(&target, id).await.unwrap().unwrap();
        assert_eq!(copied.title, "b");
        assert_eq!(copied.description, "x");
    }
}
