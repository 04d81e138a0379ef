use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use dotenvy::EnvLoader;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow::anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        debug!("tracing subscriber already set");
    }
    Ok(())
}

/// Global timezone setting for the application
static APP_TIMEZONE: OnceLock<Tz> = OnceLock::new();

/// Initialize the timezone from the given string
pub fn init_timezone(tz_str: &str) {
    let timezone: Tz = tz_str.parse().unwrap_or_else(|_| {
        warn!(timezone = tz_str, "invalid timezone, falling back to UTC");
        chrono_tz::UTC
    });

    if APP_TIMEZONE.set(timezone).is_err() {
        warn!("timezone already initialized");
    }
}

/// Get the configured timezone
pub fn get_timezone() -> Tz {
    *APP_TIMEZONE.get().unwrap_or(&chrono_tz::UTC)
}

/// Today's date in the configured timezone
pub fn today() -> NaiveDate {
    chrono::Utc::now().with_timezone(&get_timezone()).date_naive()
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite:planner.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_FALLBACK_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub timezone: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// How long a guarded submit control stays disabled before it is restored
    pub submit_fallback: Duration,
}

impl AppConfig {
    /// Load settings from `.env` (if present) with the process environment as fallback.
    pub fn load() -> Self {
        let dotenv = EnvLoader::new().load().unwrap_or_default();
        let lookup = |key: &str| {
            dotenv
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
                .filter(|v| !v.trim().is_empty())
        };

        let config = Self::from_lookup(lookup);
        info!(
            database_url = %config.database_url,
            bind_addr = %config.bind_addr,
            timezone = %config.timezone,
            gemini_configured = config.gemini_api_key.is_some(),
            "configuration loaded"
        );
        config
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let submit_fallback = lookup("SUBMIT_FALLBACK_SECS")
            .and_then(|s| match s.trim().parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!(value = %s, "invalid SUBMIT_FALLBACK_SECS, using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_FALLBACK_SECS);

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            timezone: lookup("APP_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
            gemini_api_key: lookup("GEMINI_API_KEY"),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            submit_fallback: Duration::from_secs(submit_fallback),
        }
    }
}
