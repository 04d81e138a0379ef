//! Seed binary for populating the planner database with initial tasks.
//!
//! Usage: cargo run --bin seed
//!        cargo run --bin seed -- path/to/seed.toml
//!
//! Each `[[tasks]]` entry needs a title and either a `due_date` (YYYY-MM-DD)
//! or `days_from_now`, counted from today in APP_TIMEZONE.

mod config;
mod db;
mod task;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::fs;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::task::{parse_date, Task};

#[derive(Debug, Deserialize)]
struct SeedData {
    tasks: Vec<SeedTask>,
}

#[derive(Debug, Deserialize)]
struct SeedTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    days_from_now: Option<i64>,
}

impl SeedTask {
    fn to_task(&self, today: NaiveDate) -> Task {
        let due_date = match (&self.due_date, self.days_from_now) {
            (Some(date), _) => parse_date(date).or_else(|| {
                warn!(title = %self.title, date = %date, "unparseable due_date, leaving undated");
                None
            }),
            (None, Some(days)) => Duration::try_days(days).and_then(|d| today.checked_add_signed(d)),
            (None, None) => None,
        };
        Task::new(self.title.trim(), self.description.clone(), due_date)
    }
}

fn parse_seed(content: &str) -> Result<SeedData> {
    toml::from_str(content).context("seed file is not valid TOML")
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing("info")?;
    info!("seeding database");

    let config = AppConfig::load();
    config::init_timezone(&config.timezone);
    let pool = db::init_db(&config.database_url).await?;
    info!(database_url = %config.database_url, "connected to database");

    let path = std::env::args().nth(1).unwrap_or_else(|| "seed.toml".to_string());
    let seed_content = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let seed_data = parse_seed(&seed_content)?;
    info!(count = seed_data.tasks.len(), "found tasks to seed");

    let today = config::today();
    for seed_task in &seed_data.tasks {
        let task = seed_task.to_task(today);
        match db::save_task(&pool, &task).await {
            Ok(id) => info!(id, title = %task.title, "created task"),
            Err(e) => warn!(title = %task.title, error = %e, "failed to create task"),
        }
    }

    info!("seeding complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_dates() {
        let data = parse_seed(
            r#"
            [[tasks]]
            title = "Fixed"
            due_date = "2025-05-01"

            [[tasks]]
            title = "Relative"
            description = "In a week"
            days_from_now = 7

            [[tasks]]
            title = "Undated"
            "#,
        )
        .unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let tasks: Vec<Task> = data.tasks.iter().map(|t| t.to_task(today)).collect();
        assert_eq!(tasks[0].due_date, NaiveDate::from_ymd_opt(2025, 5, 1));
        assert_eq!(tasks[1].due_date, NaiveDate::from_ymd_opt(2025, 1, 8));
        assert_eq!(tasks[1].description, "In a week");
        assert_eq!(tasks[2].due_date, None);
    }

    #[test]
    fn test_seed_requires_title() {
        assert!(parse_seed("[[tasks]]\ndescription = \"no title\"\n").is_err());
    }
}
