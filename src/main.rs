mod calendar;
mod config;
mod db;
mod guard;
mod planner;
mod reindex;
mod storybook;
mod task;
mod tasks;

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::get_service;
use axum::{routing::get, Router};
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::AppConfig;
use crate::guard::SubmissionRegistry;
use crate::planner::{GeminiConfig, Planner};
use crate::tasks::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing("info")?;

    let config = AppConfig::load();
    config::init_timezone(&config.timezone);

    let pool = db::init_db(&config.database_url).await?;
    info!(database_url = %config.database_url, "database initialized");

    let planner = Planner::new(GeminiConfig::from_app(&config));
    if !planner.is_configured() {
        info!("GEMINI_API_KEY is not set; plan generation will report an error");
    }

    let state = AppState {
        pool,
        planner: Arc::new(planner),
        submissions: SubmissionRegistry::new(config.submit_fallback),
    };

    fs::create_dir_all("static")?;
    let static_dir = ServeDir::new("static");

    let app = Router::new()
        .route("/", get(tasks::default_page))
        .nest("/storybook", storybook::router())
        .nest("/tasks", tasks::router())
        .with_state(state)
        .nest_service("/static", get_service(static_dir));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
