use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::{Datelike, NaiveDate};
use hypertext::{prelude::*, Raw};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::{generate_calendar, group_by_due_date, CalendarDay, MonthView};
use crate::config::today;
use crate::db::{self, DbPool};
use crate::guard::{
    RequiredField, SubmissionGuard, SubmissionRegistry, SubmitControl, SubmitOutcome, FALLBACK_DELAY,
};
use crate::planner::{PlanRequest, Planner, DEFAULT_DEADLINE_WEEKS, DEFAULT_WEEKLY_FREQUENCY};
use crate::reindex::{EntryField, TaskEntry, TaskList, TaskListAction, DELETE_PROMPT};
use crate::task::{parse_date, Task};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub planner: Arc<Planner>,
    pub submissions: SubmissionRegistry,
}

// ============================================================================
// Form helpers
// ============================================================================

pub const GENERATE_LABEL: &str = "Generate plan";
pub const GENERATING_LABEL: &str = "Generating… ⏳";
pub const SAVE_TASK_LABEL: &str = "Save";
pub const SAVING_LABEL: &str = "Saving… ⏳";
const GOAL_NOTICE: &str = "Please enter a goal.";
const TITLE_NOTICE: &str = "Please enter a title.";
const SUPPRESSED_MESSAGE: &str = "This form is already being submitted.";

type FormPairs = Vec<(String, String)>;

/// Last value wins, as with a browser's named lookup
fn field_map(pairs: &[(String, String)]) -> HashMap<String, String> {
    pairs.iter().cloned().collect()
}

/// The hidden token identifying a rendered form; a missing or garbled token gets a fresh one.
fn submission_token(fields: &HashMap<String, String>) -> Uuid {
    fields
        .get("submission")
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn plan_guard() -> Option<SubmissionGuard> {
    SubmissionGuard::attach(Some(SubmitControl::new(GENERATE_LABEL)), GENERATING_LABEL)
        .map(|g| g.require(RequiredField::new("goal", GOAL_NOTICE)))
}

fn task_guard() -> Option<SubmissionGuard> {
    SubmissionGuard::attach(Some(SubmitControl::new(SAVE_TASK_LABEL)), SAVING_LABEL)
        .map(|g| g.require(RequiredField::new("title", TITLE_NOTICE)))
}

/// The confirm page's save guard; no save control means no guard.
fn save_guard(list: &TaskList) -> Option<SubmissionGuard> {
    SubmissionGuard::attach(list.save_control().cloned(), SAVING_LABEL)
}

fn suppressed_response() -> Response {
    (StatusCode::CONFLICT, Html(format!("<p class=\"form-error-message\">{SUPPRESSED_MESSAGE}</p>")))
        .into_response()
}

fn parse_count(fields: &HashMap<String, String>, key: &str, default: u32) -> u32 {
    fields
        .get(key)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

// ============================================================================
// Routes
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(default_page).post(save_task))
        .route("/new", get(add_task_form))
        .route("/calendar", get(show_calendar))
        .route("/date/{date}", get(tasks_by_date))
        .route("/list", get(list_tasks))
        .route("/upcoming", get(upcoming_tasks))
        .route("/add", get(add_task_form))
        .route("/edit/{id}", get(edit_task_form))
        .route("/save", post(save_task))
        .route("/delete/{id}", post(delete_task))
        .route("/ai-plan", get(ai_plan_form))
        .route("/generate-plan", post(generate_plan))
        .route("/ai-plan/entries/{action}", post(task_list_action))
        .route("/save-generated-tasks", post(save_generated_tasks))
}

// GET / and GET /tasks - The calendar is the landing page
pub async fn default_page() -> Redirect {
    Redirect::to("/tasks/calendar")
}

#[derive(Deserialize)]
pub struct CalendarQuery {
    pub year: Option<String>,
    pub month: Option<String>,
}

// GET /tasks/calendar - Month view
async fn show_calendar(State(state): State<AppState>, Query(query): Query<CalendarQuery>) -> Html<String> {
    let view = MonthView::resolve(
        query.year.and_then(|y| y.trim().parse().ok()),
        query.month.and_then(|m| m.trim().parse().ok()),
        today(),
    );

    let tasks = db::get_tasks_between(&state.pool, view.first_day, view.last_day)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to load tasks for calendar");
            Vec::new()
        });
    let weeks = generate_calendar(view.first_day, &group_by_due_date(tasks));

    Html(render_calendar_page(&view, &weeks, today()))
}

// GET /tasks/date/:date - Tasks due on one day
async fn tasks_by_date(State(state): State<AppState>, Path(date): Path<String>) -> Response {
    let Some(date) = parse_date(&date) else {
        return Redirect::to("/tasks/calendar").into_response();
    };
    let tasks = db::get_tasks_by_date(&state.pool, date).await.unwrap_or_else(|e| {
        error!(error = %e, %date, "failed to load tasks for date");
        Vec::new()
    });

    Html(render_date_page(date, &tasks)).into_response()
}

// GET /tasks/list - Every task in creation order
async fn list_tasks(State(state): State<AppState>) -> Html<String> {
    let tasks = db::get_all_tasks(&state.pool).await.unwrap_or_default();
    Html(render_task_table_page("All Tasks", &tasks))
}

// GET /tasks/upcoming - Every task, soonest due first
async fn upcoming_tasks(State(state): State<AppState>) -> Html<String> {
    let tasks = db::get_tasks_by_due_date(&state.pool).await.unwrap_or_default();
    Html(render_task_table_page("Upcoming Tasks", &tasks))
}

#[derive(Deserialize)]
pub struct AddQuery {
    pub date: Option<String>,
}

// GET /tasks/add and GET /tasks/new - Form for a new task, optionally preset to a date
async fn add_task_form(Query(query): Query<AddQuery>) -> Html<String> {
    let task = Task {
        due_date: query.date.as_deref().and_then(parse_date),
        ..Task::default()
    };
    Html(render_task_form_page(&task, Uuid::new_v4(), None))
}

// GET /tasks/edit/:id - Form for an existing task
async fn edit_task_form(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match db::get_task(&state.pool, id).await {
        Ok(Some(task)) => Html(render_task_form_page(&task, Uuid::new_v4(), None)).into_response(),
        Ok(None) => Redirect::to("/tasks/calendar").into_response(),
        Err(e) => {
            error!(error = %e, id, "failed to load task");
            Redirect::to("/tasks/calendar").into_response()
        }
    }
}

fn date_redirect(date: Option<NaiveDate>) -> Redirect {
    match date {
        Some(date) => Redirect::to(&format!("/tasks/date/{}", date.format("%Y-%m-%d"))),
        None => Redirect::to("/tasks/calendar"),
    }
}

// POST /tasks/save and POST /tasks - Create or update a single task
#[tracing::instrument(skip_all)]
async fn save_task(State(state): State<AppState>, Form(pairs): Form<FormPairs>) -> Response {
    let fields = field_map(&pairs);
    let token = submission_token(&fields);

    let mut task = Task {
        id: fields.get("id").and_then(|v| v.trim().parse().ok()),
        title: fields.get("title").map(|t| t.trim().to_string()).unwrap_or_default(),
        description: fields.get("description").cloned().unwrap_or_default(),
        due_date: fields.get("dueDate").and_then(|d| parse_date(d)),
    };

    match state.submissions.begin(token, task_guard, &fields) {
        SubmitOutcome::Proceed => {}
        SubmitOutcome::Suppressed => return suppressed_response(),
        SubmitOutcome::Blocked { notice, .. } => {
            return Html(render_task_form_page(&task, token, Some(&notice))).into_response();
        }
    }

    let response = if let Some(id) = task.id {
        match db::get_task(&state.pool, id).await {
            Ok(Some(existing)) => {
                // A blank date keeps the one already stored
                if task.due_date.is_none() {
                    task.due_date = existing.due_date;
                }
                match db::save_task(&state.pool, &task).await {
                    Ok(_) => {
                        info!(id, "task updated");
                        date_redirect(task.due_date).into_response()
                    }
                    Err(e) => {
                        error!(error = %e, id, "failed to update task");
                        Redirect::to("/tasks/calendar").into_response()
                    }
                }
            }
            _ => Redirect::to("/tasks/calendar").into_response(),
        }
    } else {
        match db::save_task(&state.pool, &task).await {
            Ok(id) => {
                info!(id, "task created");
                date_redirect(task.due_date).into_response()
            }
            Err(e) => {
                error!(error = %e, "failed to create task");
                Redirect::to("/tasks/calendar").into_response()
            }
        }
    };

    state.submissions.finish(token);
    response
}

// POST /tasks/delete/:id - Delete a task and go back to its day
async fn delete_task(State(state): State<AppState>, Path(id): Path<i64>) -> Redirect {
    let task = db::get_task(&state.pool, id).await.ok().flatten();
    let Some(task) = task else {
        return Redirect::to("/tasks/calendar");
    };

    if let Err(e) = db::delete_task(&state.pool, id).await {
        error!(error = %e, id, "failed to delete task");
        return Redirect::to("/tasks/calendar");
    }
    info!(id, "task deleted");
    date_redirect(task.due_date)
}

// ============================================================================
// AI plan flow
// ============================================================================

/// What the plan form shows
pub struct PlanFormView {
    pub goal: String,
    pub weekly_frequency: u32,
    pub deadline_weeks: u32,
    pub token: Uuid,
    pub error: Option<String>,
    pub focus_goal: bool,
}

impl Default for PlanFormView {
    fn default() -> Self {
        Self {
            goal: String::new(),
            weekly_frequency: DEFAULT_WEEKLY_FREQUENCY,
            deadline_weeks: DEFAULT_DEADLINE_WEEKS,
            token: Uuid::new_v4(),
            error: None,
            focus_goal: false,
        }
    }
}

// GET /tasks/ai-plan - Goal form
async fn ai_plan_form() -> Html<String> {
    Html(render_ai_plan_page(&PlanFormView::default()))
}

// POST /tasks/generate-plan - Ask the planner, then show the confirmation list
#[tracing::instrument(skip_all)]
async fn generate_plan(State(state): State<AppState>, Form(pairs): Form<FormPairs>) -> Response {
    let fields = field_map(&pairs);
    let token = submission_token(&fields);
    let request = PlanRequest {
        goal: fields.get("goal").map(|g| g.trim().to_string()).unwrap_or_default(),
        weekly_frequency: parse_count(&fields, "weeklyFrequency", DEFAULT_WEEKLY_FREQUENCY),
        deadline_weeks: parse_count(&fields, "deadlineWeeks", DEFAULT_DEADLINE_WEEKS),
    };

    match state.submissions.begin(token, plan_guard, &fields) {
        SubmitOutcome::Proceed => {}
        SubmitOutcome::Suppressed => return suppressed_response(),
        SubmitOutcome::Blocked { notice, .. } => {
            let view = PlanFormView {
                goal: request.goal,
                weekly_frequency: request.weekly_frequency,
                deadline_weeks: request.deadline_weeks,
                token,
                error: Some(notice),
                focus_goal: true,
            };
            return Html(render_ai_plan_page(&view)).into_response();
        }
    }

    let result = state.planner.plan(&request, today()).await;
    state.submissions.finish(token);

    match result {
        Ok(tasks) => {
            info!(count = tasks.len(), "plan generated");
            let mut list = TaskList::from_tasks(&tasks);
            list.ready();
            Html(render_confirm_page(&request.goal, &list, Uuid::new_v4())).into_response()
        }
        Err(e) => {
            warn!(error = %e, "plan generation failed");
            let view = PlanFormView {
                goal: request.goal,
                weekly_frequency: request.weekly_frequency,
                deadline_weeks: request.deadline_weeks,
                error: Some(e.user_message().to_string()),
                ..PlanFormView::default()
            };
            Html(render_ai_plan_page(&view)).into_response()
        }
    }
}

// POST /tasks/ai-plan/entries/:action - Triggers from the task list (htmx)
async fn task_list_action(Path(action): Path<String>, Form(pairs): Form<FormPairs>) -> Response {
    let action: TaskListAction = match action.parse() {
        Ok(action) => action,
        Err(e) => {
            warn!(error = %e, "rejected task list action");
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
    };

    let fields = field_map(&pairs);
    let token = submission_token(&fields);
    let goal = fields.get("goal").cloned().unwrap_or_default();
    let entry = fields.get("entry").and_then(|v| v.trim().parse().ok());
    // hx-confirm has already asked; the flag only arrives when the user agreed
    let mut confirmed = fields.get("confirmed").is_some_and(|v| v == "true");

    let mut list = TaskList::from_form(&pairs);
    list.update_task_count();
    list.dispatch(action.targeting(entry), &mut confirmed);

    Html(render_task_form(&goal, &list, token)).into_response()
}

// POST /tasks/save-generated-tasks - Save the confirmed plan
#[tracing::instrument(skip_all)]
async fn save_generated_tasks(State(state): State<AppState>, Form(pairs): Form<FormPairs>) -> Response {
    let fields = field_map(&pairs);
    let token = submission_token(&fields);

    let mut list = TaskList::from_form(&pairs);
    list.ready();

    if state.submissions.begin(token, || save_guard(&list), &fields) == SubmitOutcome::Suppressed {
        return suppressed_response();
    }

    let tasks = list.to_tasks();
    let response = match db::save_tasks(&state.pool, &tasks).await {
        Ok(count) => {
            info!(count, "generated tasks saved");
            Redirect::to("/tasks/calendar")
        }
        Err(e) => {
            error!(error = %e, "failed to save generated tasks");
            Redirect::to("/tasks/ai-plan")
        }
    };

    state.submissions.finish(token);
    response.into_response()
}

// ============================================================================
// Rendering
// ============================================================================

fn render_page(title: &str, body: &str) -> String {
    maud! {
        !DOCTYPE
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " - Planner" }
                link rel="stylesheet" href="/static/app.css";
                script src="https://unpkg.com/htmx.org@2.0.4" {}
            }
            body {
                nav .top-nav {
                    a href="/tasks/calendar" { "Calendar" }
                    " | "
                    a href="/tasks/upcoming" { "Upcoming" }
                    " | "
                    a href="/tasks/ai-plan" { "AI Plan" }
                }
                (Raw::dangerously_create(body))
            }
        }
    }
    .render()
    .into_inner()
}

fn render_submit_button(control: &SubmitControl, class: &str) -> String {
    maud! {
        @if control.is_disabled() {
            button type="submit" class=(class) disabled { (control.label()) }
        } @else {
            button type="submit" class=(class) { (control.label()) }
        }
    }
    .render()
    .into_inner()
}

/// Runs when htmx sends the form: mark it busy, show the busy label, and put
/// both back after `fallback` unless the page has been replaced by then.
fn busy_script(fallback: Duration) -> String {
    format!(
        "if(event.detail.elt!==this)return;\
         this.setAttribute('aria-busy','true');\
         var b=this.querySelector('[type=submit]');\
         if(b){{b.dataset.label=b.textContent;b.textContent=this.dataset.busyLabel;}}\
         var f=this;\
         setTimeout(function(){{f.removeAttribute('aria-busy');if(b){{b.disabled=false;b.textContent=b.dataset.label;}}}},{});",
        fallback.as_millis()
    )
}

/// Runs when the response came back without replacing the page (e.g. 409).
const IDLE_SCRIPT: &str = "if(event.detail.elt!==this)return;\
    this.removeAttribute('aria-busy');\
    var b=this.querySelector('[type=submit]');\
    if(b){if(b.dataset.label){b.textContent=b.dataset.label;}}";

/// Wrap `inner` in a form. A guarded form is submitted through htmx so the
/// submit control is disabled and relabelled while the request is out.
fn render_guarded_form(id: &str, action: &str, guard: Option<&SubmissionGuard>, inner: &str) -> String {
    let Some(guard) = guard else {
        return format!(r#"<form id="{id}" method="post" action="{action}">{inner}</form>"#);
    };
    let busy = if guard.is_busy() { r#" aria-busy="true""# } else { "" };
    format!(
        r#"<form id="{id}" method="post" action="{action}" hx-boost="true" hx-disabled-elt="find button[type='submit']" data-busy-label="{label}" hx-on::before-request="{before}" hx-on::after-request="{after}"{busy}>{inner}</form>"#,
        label = guard.busy_label(),
        before = busy_script(FALLBACK_DELAY),
        after = IDLE_SCRIPT,
    )
}

fn render_guard_button(guard: Option<&SubmissionGuard>, class: &str) -> String {
    guard
        .map(|g| render_submit_button(g.control(), class))
        .unwrap_or_default()
}

fn render_notice(notice: Option<&str>) -> String {
    match notice {
        Some(text) => maud! {
            div .form-error-message { (text) }
        }
        .render()
        .into_inner(),
        None => String::new(),
    }
}

pub fn render_calendar_page(view: &MonthView, weeks: &[Vec<CalendarDay>], today: NaiveDate) -> String {
    let prev_url = format!("/tasks/calendar?year={}&month={}", view.prev.0, view.prev.1);
    let next_url = format!("/tasks/calendar?year={}&month={}", view.next.0, view.next.1);

    let mut rows = String::new();
    for week in weeks {
        rows.push_str("<tr>");
        for day in week {
            let mut class = "calendar-cell".to_string();
            if !day.in_month {
                class.push_str(" calendar-cell-outside");
            }
            if day.date == today {
                class.push_str(" calendar-cell-today");
            }
            if day.has_tasks() {
                class.push_str(" calendar-cell-has-tasks");
            }
            let date_url = format!("/tasks/date/{}", day.date.format("%Y-%m-%d"));
            let cell = maud! {
                td class=(class) {
                    a .calendar-day-number href=(date_url) { (day.date.day().to_string()) }
                    @for task in &day.tasks {
                        div .calendar-task { (task.title) }
                    }
                }
            }
            .render()
            .into_inner();
            rows.push_str(&cell);
        }
        rows.push_str("</tr>");
    }

    let body = maud! {
        div .calendar-page {
            div .calendar-nav {
                a href=(prev_url) { "‹ Prev" }
                h1 .calendar-title { (view.title()) }
                a href=(next_url) { "Next ›" }
            }
            table .calendar {
                thead {
                    tr {
                        @for name in ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"] {
                            th { (name) }
                        }
                    }
                }
                tbody {
                    (Raw::dangerously_create(&rows))
                }
            }
        }
    }
    .render()
    .into_inner();

    render_page(&view.title(), &body)
}

pub fn render_date_page(date: NaiveDate, tasks: &[Task]) -> String {
    let date_str = date.format("%Y-%m-%d").to_string();
    let add_url = format!("/tasks/add?date={}", date_str);

    let items: Vec<String> = tasks
        .iter()
        .filter_map(|task| task.id.map(|id| (id, task)))
        .map(|(id, task)| {
            let edit_url = format!("/tasks/edit/{}", id);
            let delete_form = format!(
                r#"<form class="inline-form" method="post" action="/tasks/delete/{}" onsubmit="return confirm('{}')"><button class="btn btn-delete" type="submit">Delete</button></form>"#,
                id, DELETE_PROMPT
            );
            maud! {
                li .task-row {
                    div .task-row-title { (task.title) }
                    @if !task.description.is_empty() {
                        div .task-row-description { (task.description) }
                    }
                    a .btn href=(edit_url) { "Edit" }
                    (Raw::dangerously_create(&delete_form))
                }
            }
            .render()
            .into_inner()
        })
        .collect();

    let body = maud! {
        div .date-page {
            h1 { (date.format("%A, %B %-d, %Y").to_string()) }
            @if items.is_empty() {
                p .empty { "No tasks on this day." }
            } @else {
                ul .task-rows {
                    (Raw::dangerously_create(&items.join("\n")))
                }
            }
            a .btn href=(add_url) { "Add task" }
        }
    }
    .render()
    .into_inner();

    render_page(&date_str, &body)
}

pub fn render_task_table_page(title: &str, tasks: &[Task]) -> String {
    let body = maud! {
        div .task-table-page {
            h1 { (title) }
            @if tasks.is_empty() {
                p .empty { "No tasks yet." }
            } @else {
                table .task-table {
                    thead { tr { th { "Due" } th { "Title" } th { "Description" } } }
                    tbody {
                        @for task in tasks {
                            tr {
                                td { (task.due_date_string()) }
                                td {
                                    @if let Some(id) = task.id {
                                        a href=(format!("/tasks/edit/{}", id)) { (task.title) }
                                    } @else {
                                        (task.title)
                                    }
                                }
                                td { (task.description) }
                            }
                        }
                    }
                }
            }
        }
    }
    .render()
    .into_inner();

    render_page(title, &body)
}

pub fn render_task_form_page(task: &Task, token: Uuid, notice: Option<&str>) -> String {
    let guard = task_guard();
    let heading = if task.id.is_some() { "Edit Task" } else { "New Task" };
    let id_value = task.id.map(|id| id.to_string()).unwrap_or_default();
    let submit_button = render_guard_button(guard.as_ref(), "btn btn-default");
    let notice_html = render_notice(notice);

    let inner = maud! {
        input type="hidden" name="submission" value=(token.to_string());
        input type="hidden" name="id" value=(id_value);
        (Raw::dangerously_create(&notice_html))
        div .form-group {
            label for="title" { "Title" }
            @if notice.is_some() {
                input type="text" id="title" name="title" value=(task.title) required autofocus;
            } @else {
                input type="text" id="title" name="title" value=(task.title) required;
            }
        }
        div .form-group {
            label for="description" { "Description" }
            textarea id="description" name="description" rows="4" { (task.description) }
        }
        div .form-group {
            label for="dueDate" { "Due date" }
            input type="date" id="dueDate" name="dueDate" value=(task.due_date_string());
        }
        div .form-actions {
            a .btn href="/tasks/calendar" { "Cancel" }
            " "
            (Raw::dangerously_create(&submit_button))
        }
    }
    .render()
    .into_inner();

    let body = format!(
        r#"<div class="task-form-page"><h1>{}</h1>{}</div>"#,
        heading,
        render_guarded_form("taskEditForm", "/tasks/save", guard.as_ref(), &inner)
    );
    render_page(heading, &body)
}

/// The `#planForm` element.
pub fn render_plan_form(view: &PlanFormView) -> String {
    let guard = plan_guard();
    let submit_button = render_guard_button(guard.as_ref(), "btn btn-default");
    let notice_html = render_notice(view.error.as_deref());

    let inner = maud! {
        input type="hidden" name="submission" value=(view.token.to_string());
        (Raw::dangerously_create(&notice_html))
        div .form-group {
            label for="goal" { "Goal" }
            @if view.focus_goal {
                input type="text" id="goal" name="goal" value=(view.goal) placeholder="e.g. Run a half marathon" autofocus;
            } @else {
                input type="text" id="goal" name="goal" value=(view.goal) placeholder="e.g. Run a half marathon";
            }
        }
        div .form-group {
            label for="weeklyFrequency" { "Sessions per week" }
            input type="number" id="weeklyFrequency" name="weeklyFrequency" min="1" max="7" value=(view.weekly_frequency.to_string());
        }
        div .form-group {
            label for="deadlineWeeks" { "Weeks until deadline" }
            input type="number" id="deadlineWeeks" name="deadlineWeeks" min="1" max="52" value=(view.deadline_weeks.to_string());
        }
        div .form-actions {
            (Raw::dangerously_create(&submit_button))
        }
    }
    .render()
    .into_inner();

    render_guarded_form("planForm", "/tasks/generate-plan", guard.as_ref(), &inner)
}

pub fn render_ai_plan_page(view: &PlanFormView) -> String {
    let body = format!(
        r#"<div class="ai-plan-page"><h1>Plan with AI</h1>{}</div>"#,
        render_plan_form(view)
    );
    render_page("AI Plan", &body)
}

fn render_entry_field(field: &EntryField) -> String {
    match field.suffix() {
        "title" => maud! {
            input .task-title type="text" name=(field.name) value=(field.value) required;
        }
        .render()
        .into_inner(),
        "description" => maud! {
            textarea .task-description name=(field.name) rows="2" { (field.value) }
        }
        .render()
        .into_inner(),
        "dueDate" => maud! {
            input .task-due type="date" name=(field.name) value=(field.value);
        }
        .render()
        .into_inner(),
        _ => maud! {
            input type="hidden" name=(field.name) value=(field.value);
        }
        .render()
        .into_inner(),
    }
}

fn render_task_entry(entry: &TaskEntry) -> String {
    let ordinal = entry
        .ordinal()
        .map(|o| maud! { span .task-number { (o) } }.render().into_inner())
        .unwrap_or_default();
    let fields: String = entry.fields().iter().map(render_entry_field).collect();
    let delete_button = format!(
        r##"<button type="button" class="btn btn-delete" hx-post="/tasks/ai-plan/entries/delete-task" hx-vals='{{"entry": "{}", "confirmed": "true"}}' hx-include="#taskForm" hx-target="#taskForm" hx-swap="outerHTML" hx-confirm="{}">×</button>"##,
        entry.index(),
        DELETE_PROMPT
    );

    format!(
        r#"<div class="task-item" data-index="{}">{}<div class="task-fields">{}</div>{}</div>"#,
        entry.index(),
        ordinal,
        fields,
        delete_button
    )
}

/// The `#taskForm` element; htmx swaps it whole after list actions.
pub fn render_task_form(goal: &str, list: &TaskList, token: Uuid) -> String {
    let entries: String = list.entries().iter().map(render_task_entry).collect();
    let guard = save_guard(list);
    let save_button = render_guard_button(guard.as_ref(), "btn btn-default btn-save");

    let inner = maud! {
        input type="hidden" name="submission" value=(token.to_string());
        input type="hidden" name="goal" value=(goal);
        div .task-summary {
            "Goal: " strong { (goal) }
            @if let Some(count) = list.count_display() {
                " · Tasks: " span id="task-count" { (count) }
            }
        }
        div id="taskList" {
            (Raw::dangerously_create(&entries))
            @if let Some(message) = list.placeholder() {
                div .no-tasks { (message) }
            }
        }
        div .form-actions {
            a .btn href="/tasks/ai-plan" { "Cancel" }
            " "
            (Raw::dangerously_create(&save_button))
        }
    }
    .render()
    .into_inner();

    render_guarded_form("taskForm", "/tasks/save-generated-tasks", guard.as_ref(), &inner)
}

pub fn render_confirm_page(goal: &str, list: &TaskList, token: Uuid) -> String {
    let body = format!(
        r#"<div class="ai-plan-confirm-page"><h1>Review generated tasks</h1>{}</div>"#,
        render_task_form(goal, list, token)
    );
    render_page("Review Plan", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list(n: usize) -> TaskList {
        let tasks: Vec<Task> = (0..n)
            .map(|i| Task::new(format!("Step {}", i + 1), "", NaiveDate::from_ymd_opt(2025, 3, 1 + i as u32)))
            .collect();
        let mut list = TaskList::from_tasks(&tasks);
        list.ready();
        list
    }

    #[test]
    fn test_submission_token_roundtrip_and_fallback() {
        let token = Uuid::new_v4();
        let fields = field_map(&[("submission".to_string(), token.to_string())]);
        assert_eq!(submission_token(&fields), token);

        let garbled = field_map(&[("submission".to_string(), "nope".to_string())]);
        assert_ne!(submission_token(&garbled), token);
    }

    #[test]
    fn test_parse_count_defaults() {
        let fields = field_map(&[
            ("weeklyFrequency".to_string(), "5".to_string()),
            ("deadlineWeeks".to_string(), "0".to_string()),
        ]);
        assert_eq!(parse_count(&fields, "weeklyFrequency", 3), 5);
        assert_eq!(parse_count(&fields, "deadlineWeeks", 4), 4);
        assert_eq!(parse_count(&fields, "missing", 4), 4);
    }

    #[test]
    fn test_task_form_renders_indexed_fields() {
        let html = render_task_form("Learn Rust", &sample_list(2), Uuid::nil());

        assert!(html.contains(r#"name="tasks[0].title""#));
        assert!(html.contains(r#"name="tasks[1].dueDate""#));
        assert!(html.contains(r#"data-index="1""#));
        assert!(html.contains(">2.</span>"));
        assert!(html.contains(r#"id="task-count""#));
        assert!(!html.contains("no-tasks"));
        assert!(!html.contains(" disabled>"));
    }

    #[test]
    fn test_empty_task_form_disables_save_and_shows_placeholder() {
        let html = render_task_form("Learn Rust", &sample_list(0), Uuid::nil());

        assert_eq!(html.matches("class=\"no-tasks\"").count(), 1);
        assert!(html.contains(" disabled>"));
    }

    #[test]
    fn test_blocked_plan_form_focuses_goal() {
        let view = PlanFormView {
            error: Some(GOAL_NOTICE.to_string()),
            focus_goal: true,
            ..PlanFormView::default()
        };
        let html = render_ai_plan_page(&view);
        assert!(html.contains(GOAL_NOTICE));
        assert!(html.contains("autofocus"));
        assert!(!html.contains(" disabled>"));
    }

    #[test]
    fn test_rendered_values_are_escaped() {
        let tasks = vec![Task::new("<script>alert(1)</script>", "", None)];
        let mut list = TaskList::from_tasks(&tasks);
        list.ready();
        let html = render_task_form("a & b", &list, Uuid::nil());
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn test_delete_action_roundtrip_through_form() {
        let list = sample_list(3);
        let html = render_task_form("Goal", &list, Uuid::nil());
        assert!(html.contains("/tasks/ai-plan/entries/delete-task"));

        // What htmx would post back after the second delete button is confirmed
        let mut pairs: FormPairs = vec![("goal".into(), "Goal".into())];
        for entry in list.entries() {
            for field in entry.fields() {
                pairs.push((field.name.clone(), field.value.clone()));
            }
        }
        let mut posted = TaskList::from_form(&pairs);
        posted.update_task_count();
        let action: TaskListAction = "delete-task".parse().unwrap();
        posted.dispatch(action.targeting(Some(1)), &mut true);

        let titles: Vec<&str> = posted.entries().iter().map(|e| e.value("title").unwrap()).collect();
        assert_eq!(titles, vec!["Step 1", "Step 3"]);
        assert_eq!(posted.entries()[1].fields()[0].name, "tasks[1].title");
        assert_eq!(posted.count_display(), Some("2"));
    }

    #[tokio::test]
    async fn test_generated_tasks_save_through_db() {
        let pool = db::init_memory_db().await.unwrap();
        let pairs: FormPairs = vec![
            ("tasks[0].title".into(), "First".into()),
            ("tasks[0].dueDate".into(), "2025-03-01".into()),
            ("tasks[2].title".into(), "Second".into()),
        ];
        let mut list = TaskList::from_form(&pairs);
        list.ready();
        db::save_tasks(&pool, &list.to_tasks()).await.unwrap();

        let saved = db::get_all_tasks(&pool).await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].title, "Second");
    }

    #[test]
    fn test_guarded_forms_go_through_htmx_with_busy_state() {
        let plan = render_plan_form(&PlanFormView::default());
        assert!(plan.starts_with(r#"<form id="planForm" method="post" action="/tasks/generate-plan" hx-boost="true""#));
        assert!(plan.contains(r#"hx-disabled-elt="find button[type='submit']""#));
        assert!(plan.contains(&format!(r#"data-busy-label="{GENERATING_LABEL}""#)));
        assert!(plan.contains("hx-on::before-request=\"if(event.detail.elt!==this)return;this.setAttribute('aria-busy','true');"));
        assert!(plan.contains("b.textContent=this.dataset.busyLabel"));
        assert!(plan.contains(&format!("}},{});", FALLBACK_DELAY.as_millis())));
        assert!(plan.contains("hx-on::after-request=\"if(event.detail.elt!==this)return;this.removeAttribute('aria-busy');"));
        assert!(plan.contains(&format!(">{GENERATE_LABEL}</button>")));
        assert!(!plan.contains("aria-busy=\"true\""));

        let edit = render_task_form_page(&Task::new("Water plants", "", None), Uuid::nil(), None);
        assert!(edit.contains(r#"action="/tasks/save" hx-boost="true""#));
        assert!(edit.contains(&format!(r#"data-busy-label="{SAVING_LABEL}""#)));
        assert!(edit.contains(&format!(">{SAVE_TASK_LABEL}</button>")));

        let confirm = render_task_form("Goal", &sample_list(2), Uuid::nil());
        assert!(confirm.contains(r#"action="/tasks/save-generated-tasks" hx-boost="true""#));
        assert!(confirm.contains(&format!(r#"data-busy-label="{SAVING_LABEL}""#)));
    }

    #[test]
    fn test_task_list_without_save_control_is_plain_form() {
        let list = sample_list(1).without_save();
        let html = render_task_form("Goal", &list, Uuid::nil());
        assert!(html.starts_with(r#"<form id="taskForm" method="post" action="/tasks/save-generated-tasks">"#));
        assert!(!html.contains("hx-boost"));
        assert!(!html.contains("btn-save"));
    }

    async fn serve_tasks() -> (String, DbPool) {
        let pool = db::init_memory_db().await.unwrap();
        let state = AppState {
            pool: pool.clone(),
            planner: Arc::new(Planner::new(crate::planner::GeminiConfig {
                api_key: None,
                model: "gemini-2.5-flash".to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
            })),
            submissions: SubmissionRegistry::default(),
        };
        let app = Router::new().nest("/tasks", router()).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), pool)
    }

    #[tokio::test]
    async fn test_new_and_create_routes() {
        let (base, pool) = serve_tasks().await;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        let form = client.get(format!("{base}/tasks/new")).send().await.unwrap();
        assert_eq!(form.status(), 200);
        assert!(form.text().await.unwrap().contains(r#"action="/tasks/save""#));

        let created = client
            .post(format!("{base}/tasks"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body("title=Water+plants&description=&dueDate=2025-03-04")
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 303);
        assert_eq!(created.headers()["location"], "/tasks/date/2025-03-04");

        let saved = db::get_all_tasks(&pool).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Water plants");
    }

    #[test]
    fn test_calendar_page_links_days() {
        let view = MonthView::resolve(Some(2025), Some(3), NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        let weeks = generate_calendar(view.first_day, &HashMap::new());
        let html = render_calendar_page(&view, &weeks, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert!(html.contains("March 2025"));
        assert!(html.contains("/tasks/date/2025-03-05"));
        assert!(html.contains("calendar-cell-today"));
        assert!(html.contains("year=2025&amp;month=4") || html.contains("year=2025&month=4"));
    }
}
