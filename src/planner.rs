//! Turning a goal into a list of dated tasks with the Gemini API.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::task::Task;

pub const MIN_TASKS: u32 = 5;
pub const MAX_TASKS: u32 = 20;
pub const DEFAULT_WEEKLY_FREQUENCY: u32 = 3;
pub const DEFAULT_DEADLINE_WEEKS: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("no Gemini API key is configured")]
    MissingApiKey,
    #[error("request to Gemini failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Gemini returned no text")]
    EmptyResponse,
    #[error("could not parse the generated plan: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("the generated plan contained no tasks")]
    NoTasks,
}

impl PlanError {
    /// Message shown above the plan form
    pub fn user_message(&self) -> &'static str {
        match self {
            PlanError::MissingApiKey
            | PlanError::Http(_)
            | PlanError::Status { .. }
            | PlanError::EmptyResponse => "Could not get a response from the AI.",
            PlanError::Parse(_) | PlanError::NoTasks => "Task generation failed.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub goal: String,
    pub weekly_frequency: u32,
    pub deadline_weeks: u32,
}

impl PlanRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            weekly_frequency: DEFAULT_WEEKLY_FREQUENCY,
            deadline_weeks: DEFAULT_DEADLINE_WEEKS,
        }
    }

    /// Sessions per week times weeks, kept between 5 and 20.
    pub fn total_tasks(&self) -> u32 {
        self.weekly_frequency
            .saturating_mul(self.deadline_weeks)
            .clamp(MIN_TASKS, MAX_TASKS)
    }

    pub fn prompt(&self) -> String {
        let total = self.total_tasks();
        let deadline_days = self.deadline_weeks.saturating_mul(7);
        format!(
            "The user's goal: {goal}\n\n\
             Conditions:\n\
             - They plan to work on it {freq} times a week\n\
             - The deadline is {weeks} weeks away\n\
             - Generate about {total} tasks in total\n\n\
             Generate concrete tasks that lead to this goal.\n\
             Each task should be actionable and build on the previous ones.\n\
             Space the tasks to match a pace of {freq} sessions per week.\n\n\
             Reply with JSON only, in exactly this shape:\n\
             [\n  {{\"title\": \"Task name\", \"description\": \"Details\", \"daysFromNow\": 7}},\n  \
             {{\"title\": \"Task name 2\", \"description\": \"Details 2\", \"daysFromNow\": 14}}\n]\n\
             daysFromNow is the number of days from today until the task is due.\n\
             The last task should be due about {deadline_days} days ({weeks} weeks) from now.",
            goal = self.goal.trim(),
            freq = self.weekly_frequency,
            weeks = self.deadline_weeks,
            total = total,
            deadline_days = deadline_days,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub days_from_now: i64,
}

impl PlannedTask {
    pub fn into_task(self, today: NaiveDate) -> Task {
        let due = Duration::try_days(self.days_from_now).and_then(|d| today.checked_add_signed(d));
        Task::new(self.title, self.description, due)
    }
}

/// Strip Markdown code fences the model likes to wrap JSON in.
fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse the model's reply into tasks dated relative to `today`.
pub fn parse_plan(text: &str, today: NaiveDate) -> Result<Vec<Task>, PlanError> {
    let planned: Vec<PlannedTask> = serde_json::from_str(&strip_fences(text))?;
    if planned.is_empty() {
        return Err(PlanError::NoTasks);
    }
    Ok(planned.into_iter().map(|p| p.into_task(today)).collect())
}

/// Pull `candidates[0].content.parts[0].text` out of a generateContent reply.
pub fn extract_text(response: &serde_json::Value) -> Option<String> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, Clone)]
pub struct Planner {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl Planner {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    #[tracing::instrument(skip(self, request), fields(goal = %request.goal, total = request.total_tasks()))]
    pub async fn generate_text(&self, request: &PlanRequest) -> Result<String, PlanError> {
        let api_key = self.config.api_key.as_deref().ok_or(PlanError::MissingApiKey)?;

        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": request.prompt() } ] }
            ]
        });

        info!(model = %self.config.model, "requesting plan from Gemini");
        let response = self
            .http
            .post(self.config.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "Gemini request failed");
            return Err(PlanError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response.json().await?;
        let text = extract_text(&value).ok_or(PlanError::EmptyResponse)?;
        debug!(chars = text.len(), "Gemini response received");
        Ok(text)
    }

    /// Generate and parse a plan; nothing is saved.
    pub async fn plan(&self, request: &PlanRequest, today: NaiveDate) -> Result<Vec<Task>, PlanError> {
        let text = self.generate_text(request).await?;
        parse_plan(&text, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    #[test]
    fn test_total_tasks_is_clamped() {
        let mut req = PlanRequest::new("Learn piano");
        assert_eq!(req.total_tasks(), 12);

        req.weekly_frequency = 1;
        req.deadline_weeks = 2;
        assert_eq!(req.total_tasks(), MIN_TASKS);

        req.weekly_frequency = 7;
        req.deadline_weeks = 8;
        assert_eq!(req.total_tasks(), MAX_TASKS);
    }

    #[test]
    fn test_prompt_mentions_conditions() {
        let req = PlanRequest {
            goal: "  Run a marathon ".to_string(),
            weekly_frequency: 4,
            deadline_weeks: 10,
        };
        let prompt = req.prompt();
        assert!(prompt.contains("The user's goal: Run a marathon\n"));
        assert!(prompt.contains("4 times a week"));
        assert!(prompt.contains("about 20 tasks"));
        assert!(prompt.contains("about 70 days (10 weeks)"));
        assert!(prompt.contains("\"daysFromNow\": 7"));
    }

    #[test]
    fn test_parse_plan_with_fences() {
        let text = "```json\n[\n {\"title\": \"Buy shoes\", \"description\": \"Get fitted\", \"daysFromNow\": 2},\n {\"title\": \"First run\", \"daysFromNow\": 5}\n]\n```";
        let tasks = parse_plan(text, today()).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Buy shoes");
        assert_eq!(tasks[0].due_date, NaiveDate::from_ymd_opt(2025, 1, 12));
        assert_eq!(tasks[1].description, "");
        assert_eq!(tasks[1].due_date, NaiveDate::from_ymd_opt(2025, 1, 15));
    }

    #[test]
    fn test_parse_plan_errors() {
        assert!(matches!(parse_plan("[]", today()), Err(PlanError::NoTasks)));
        assert!(matches!(parse_plan("Sure! Here is your plan", today()), Err(PlanError::Parse(_))));
    }

    #[test]
    fn test_extract_text() {
        let reply = serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": "[1]" } ] } }
            ]
        });
        assert_eq!(extract_text(&reply), Some("[1]".to_string()));
        assert_eq!(extract_text(&serde_json::json!({ "candidates": [] })), None);
    }

    #[tokio::test]
    async fn test_unconfigured_planner_reports_missing_key() {
        let planner = Planner::new(GeminiConfig {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        });
        assert!(!planner.is_configured());
        let err = planner.plan(&PlanRequest::new("x"), today()).await.unwrap_err();
        assert!(matches!(err, PlanError::MissingApiKey));
        assert_eq!(err.user_message(), "Could not get a response from the AI.");
    }

    #[test]
    fn test_endpoint() {
        let config = GeminiConfig::from_app(&AppConfig::from_lookup(|_| None));
        assert_eq!(
            config.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
