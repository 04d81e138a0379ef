//! Clear binary for resetting the planner database.
//!
//! Usage: cargo run --bin clear
//!
//! Deletes every task.

mod config;
mod db;
mod task;

use anyhow::Result;
use tracing::info;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing("info")?;

    let config = AppConfig::load();
    info!(database_url = %config.database_url, "connecting to database");
    let pool = db::init_db(&config.database_url).await?;

    let removed = db::clear_tasks(&pool).await?;
    info!(removed, "tasks table cleared");

    Ok(())
}
