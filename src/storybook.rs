use axum::{response::Html, routing::get, Router};
use chrono::{Duration, NaiveDate};
use hypertext::{prelude::*, Raw};
use uuid::Uuid;

use crate::config::today;
use crate::reindex::TaskList;
use crate::task::Task;
use crate::tasks::{render_confirm_page, render_plan_form, render_task_form, AppState, PlanFormView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai-plan", get(ai_plan_states))
        .route("/ai-plan/confirm", get(ai_plan_confirm))
}

const DEMO_GOAL: &str = "Run a 10k";

/// A plan the way the planner would hand it back, dated from `today`.
pub fn demo_tasks(today: NaiveDate) -> Vec<Task> {
    [
        ("Buy running shoes", "Get fitted at a running store", 1),
        ("First easy run", "20 minutes at a conversational pace", 3),
        ("Interval session", "6 x 400m with 90s rest", 6),
        ("Long run", "5k without stopping", 9),
        ("Race day", "Enjoy it", 14),
    ]
    .into_iter()
    .map(|(title, description, days)| Task::new(title, description, today.checked_add_signed(Duration::days(days))))
    .collect()
}

// GET /storybook/ai-plan/confirm - The confirmation list with demo tasks
async fn ai_plan_confirm() -> Html<String> {
    let mut list = TaskList::from_tasks(&demo_tasks(today()));
    list.ready();
    Html(render_confirm_page(DEMO_GOAL, &list, Uuid::new_v4()))
}

// GET /storybook/ai-plan - Plan form and task list in each of their states
async fn ai_plan_states() -> Html<String> {
    let mut full = TaskList::from_tasks(&demo_tasks(today()));
    full.ready();
    let mut empty = TaskList::from_tasks(&[]);
    empty.ready();

    let blocked = PlanFormView {
        error: Some("Please enter a goal.".to_string()),
        focus_goal: true,
        ..PlanFormView::default()
    };

    let sections = [
        ("Plan form", render_plan_form(&PlanFormView::default())),
        ("Plan form, blank goal", render_plan_form(&blocked)),
        ("Task list", render_task_form(DEMO_GOAL, &full, Uuid::new_v4())),
        ("Task list, everything deleted", render_task_form(DEMO_GOAL, &empty, Uuid::new_v4())),
    ];

    let html = maud! {
        !DOCTYPE
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "AI Plan - Storybook" }
                link rel="stylesheet" href="/static/app.css";
                script src="https://unpkg.com/htmx.org@2.0.4" {}
            }
            body {
                h1 { "AI Plan Storybook" }
                @for (name, section) in &sections {
                    section .story {
                        h2 { (name) }
                        (Raw::dangerously_create(section))
                    }
                }
            }
        }
    };

    Html(html.render().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_tasks_are_dated_in_order() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let tasks = demo_tasks(today);
        assert_eq!(tasks.len(), 5);
        assert_eq!(tasks[0].due_date, NaiveDate::from_ymd_opt(2025, 4, 2));
        assert!(tasks.windows(2).all(|w| w[0].due_date < w[1].due_date));
    }
}
