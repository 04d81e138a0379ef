//! The editable list of generated tasks on the plan confirmation page.
//!
//! Each entry carries form fields named `tasks[<index>].<suffix>`; the server
//! rebuilds the plan from those names, so after a deletion the survivors are
//! renumbered to keep the indices contiguous and zero-based in document order.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::guard::SubmitControl;
use crate::task::{parse_date, Task};

pub const COLLECTION: &str = "tasks";
pub const EMPTY_MESSAGE: &str =
    "There are no generated tasks. Cancel to go back, or create a new task yourself.";

static INDEX_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tasks\[\d+\]").expect("index segment pattern"));

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tasks\[(\d+)\]\.(\w+)$").expect("field name pattern"));

/// Replace the first `tasks[<n>]` segment of `name` with `tasks[<index>]`.
pub fn rewrite_index(name: &str, index: usize) -> String {
    INDEX_SEGMENT
        .replace(name, format!("{COLLECTION}[{index}]").as_str())
        .into_owned()
}

pub fn field_name(index: usize, suffix: &str) -> String {
    format!("{COLLECTION}[{index}].{suffix}")
}

/// Split `tasks[3].title` into `(3, "title")`.
pub fn parse_field_name(name: &str) -> Option<(usize, &str)> {
    let caps = FIELD_NAME.captures(name)?;
    let index = caps.get(1)?.as_str().parse().ok()?;
    Some((index, caps.get(2)?.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryField {
    pub name: String,
    pub value: String,
}

impl EntryField {
    /// The part of the name after `tasks[<n>].`, or the whole name if it has no index.
    pub fn suffix(&self) -> &str {
        parse_field_name(&self.name)
            .map(|(_, suffix)| suffix)
            .unwrap_or(&self.name)
    }
}

/// One task fragment in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    index: usize,
    ordinal: Option<String>,
    fields: Vec<EntryField>,
}

impl TaskEntry {
    pub fn new(index: usize, fields: Vec<EntryField>) -> Self {
        Self {
            index,
            ordinal: Some(format!("{}.", index.saturating_add(1))),
            fields,
        }
    }

    pub fn from_task(index: usize, task: &Task) -> Self {
        Self::new(
            index,
            vec![
                EntryField { name: field_name(index, "title"), value: task.title.clone() },
                EntryField { name: field_name(index, "description"), value: task.description.clone() },
                EntryField { name: field_name(index, "dueDate"), value: task.due_date_string() },
            ],
        )
    }

    /// Drop the `.task-number` element; renumbering then leaves the ordinal alone.
    pub fn without_ordinal(mut self) -> Self {
        self.ordinal = None;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ordinal(&self) -> Option<&str> {
        self.ordinal.as_deref()
    }

    pub fn fields(&self) -> &[EntryField] {
        &self.fields
    }

    pub fn value(&self, suffix: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.suffix() == suffix)
            .map(|f| f.value.as_str())
    }

    pub fn to_task(&self) -> Task {
        Task {
            id: None,
            title: self.value("title").unwrap_or_default().trim().to_string(),
            description: self.value("description").unwrap_or_default().to_string(),
            due_date: self.value("dueDate").and_then(parse_date),
        }
    }

    fn renumber(&mut self, index: usize) {
        if let Some(ordinal) = self.ordinal.as_mut() {
            *ordinal = format!("{}.", index.saturating_add(1));
        }
        self.index = index;
        for field in &mut self.fields {
            if !field.name.is_empty() {
                field.name = rewrite_index(&field.name, index);
            }
        }
    }
}

/// Asks the user a yes/no question before a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl Confirm for bool {
    fn confirm(&mut self, _prompt: &str) -> bool {
        *self
    }
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

pub const DELETE_PROMPT: &str = "Delete this task?";

/// Identifies the entry a delete button sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteControl {
    pub entry: usize,
}

/// Operations that markup can trigger on the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskListAction {
    Delete(Option<DeleteControl>),
    UpdateNumbers,
    UpdateCount,
}

impl TaskListAction {
    /// Point a delete action at the entry whose button fired it.
    pub fn targeting(self, entry: Option<usize>) -> Self {
        match self {
            Self::Delete(_) => Self::Delete(entry.map(|entry| DeleteControl { entry })),
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task list action '{0}'")]
pub struct UnknownAction(pub String);

/// Action names as they appear in trigger URLs. `reindexTasks` is kept as an
/// older name for renumbering.
impl FromStr for TaskListAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deleteTask" | "delete-task" => Ok(Self::Delete(None)),
            "updateTaskNumbers" | "update-task-numbers" | "reindexTasks" | "reindex-tasks" => {
                Ok(Self::UpdateNumbers)
            }
            "updateTaskCount" | "update-task-count" => Ok(Self::UpdateCount),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// The list container with its entries plus the page controls it drives:
/// the count display and the save button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    entries: Vec<TaskEntry>,
    has_container: bool,
    placeholder: Option<String>,
    count_display: Option<String>,
    save: Option<SubmitControl>,
}

impl TaskList {
    pub fn new(entries: Vec<TaskEntry>) -> Self {
        Self {
            entries,
            has_container: true,
            placeholder: None,
            count_display: Some(String::new()),
            save: Some(SubmitControl::new("Save tasks")),
        }
    }

    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self::new(
            tasks
                .iter()
                .enumerate()
                .map(|(i, t)| TaskEntry::from_task(i, t))
                .collect(),
        )
    }

    /// Rebuild the list from submitted form pairs.
    ///
    /// Entries are grouped by the index in their field names and kept in the
    /// order they first appear, which is document order. Pairs that do not
    /// follow the `tasks[<n>].<suffix>` pattern are ignored.
    pub fn from_form(pairs: &[(String, String)]) -> Self {
        let mut order: Vec<usize> = Vec::new();
        let mut grouped: HashMap<usize, Vec<EntryField>> = HashMap::new();

        for (name, value) in pairs {
            let Some((index, _)) = parse_field_name(name) else {
                continue;
            };
            let fields = grouped.entry(index).or_insert_with(|| {
                order.push(index);
                Vec::new()
            });
            fields.push(EntryField {
                name: name.clone(),
                value: value.clone(),
            });
        }

        let entries = order
            .into_iter()
            .filter_map(|index| grouped.remove(&index).map(|fields| TaskEntry::new(index, fields)))
            .collect();
        Self::new(entries)
    }

    pub fn without_container(mut self) -> Self {
        self.has_container = false;
        self.placeholder = None;
        self
    }

    pub fn without_count_display(mut self) -> Self {
        self.count_display = None;
        self
    }

    pub fn without_save(mut self) -> Self {
        self.save = None;
        self
    }

    pub fn with_save(mut self, control: SubmitControl) -> Self {
        self.save = Some(control);
        self
    }

    pub fn entries(&self) -> &[TaskEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    pub fn count_display(&self) -> Option<&str> {
        self.count_display.as_deref()
    }

    pub fn save_control(&self) -> Option<&SubmitControl> {
        self.save.as_ref()
    }

    /// Page-ready normalisation
    pub fn ready(&mut self) {
        self.update_task_numbers();
        self.update_task_count();
    }

    /// Remove the entry the control belongs to, after confirmation.
    /// Returns whether an entry was removed.
    pub fn delete_task(&mut self, control: Option<DeleteControl>, confirm: &mut impl Confirm) -> bool {
        let Some(control) = control else {
            return false;
        };
        if !confirm.confirm(DELETE_PROMPT) {
            debug!(entry = control.entry, "deletion declined");
            return false;
        }
        let Some(position) = self.entries.iter().position(|e| e.index == control.entry) else {
            warn!(entry = control.entry, "no task entry for delete control");
            return false;
        };

        self.entries.remove(position);
        self.update_task_numbers();
        self.update_task_count();
        true
    }

    pub fn update_task_numbers(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.renumber(i);
        }
    }

    /// Older name for [`TaskList::update_task_numbers`].
    pub fn reindex_tasks(&mut self) {
        self.update_task_numbers();
    }

    pub fn update_task_count(&mut self) {
        let count = self.entries.len();

        if let Some(display) = self.count_display.as_mut() {
            *display = count.to_string();
        }
        if let Some(save) = self.save.as_mut() {
            save.set_disabled(count == 0);
        }
        if !self.has_container {
            return;
        }

        if count == 0 {
            if self.placeholder.is_none() {
                self.placeholder = Some(EMPTY_MESSAGE.to_string());
            }
        } else {
            self.placeholder = None;
        }
    }

    /// Single entry point for triggers registered on the list container.
    pub fn dispatch(&mut self, action: TaskListAction, confirm: &mut impl Confirm) {
        match action {
            TaskListAction::Delete(control) => {
                self.delete_task(control, confirm);
            }
            TaskListAction::UpdateNumbers => self.update_task_numbers(),
            TaskListAction::UpdateCount => self.update_task_count(),
        }
    }

    /// Tasks in list order, skipping entries left without a title.
    pub fn to_tasks(&self) -> Vec<Task> {
        self.entries
            .iter()
            .map(TaskEntry::to_task)
            .filter(|t| {
                if t.title.is_empty() {
                    warn!("skipping generated task without a title");
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn push_entry(&mut self, entry: TaskEntry) {
        self.entries.push(entry);
    }
}
