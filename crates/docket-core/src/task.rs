use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::datetime::{DayFrame, parse_due_date};
use crate::error::{Error, Result};

pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            other => Err(Error::validation(format!("unknown status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,

    pub owner: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub notes: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    pub order: f64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(owner: &str, title: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            title,
            description: String::new(),
            notes: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            status: TaskStatus::Todo,
            completed: false,
            tags: vec![],
            subtasks: vec![],
            due_date: None,
            order: default_order(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Past due and still open.
    pub fn is_expired(&self, frame: &DayFrame) -> bool {
        !self.completed && self.due_date.is_some_and(|due| frame.is_before_today(due))
    }

    /// Flips `completed`, keeping `status` in step: completing moves the task
    /// to `done`, reopening a `done` task moves it back to `todo`.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.completed = !self.completed;
        if self.completed {
            self.status = TaskStatus::Done;
        } else if self.status == TaskStatus::Done {
            self.status = TaskStatus::Todo;
        }
        self.updated_at = now;
    }

    pub fn toggle_subtask(&mut self, subtask_id: Uuid, now: DateTime<Utc>) -> bool {
        let Some(subtask) = self.subtasks.iter_mut().find(|s| s.id == subtask_id) else {
            return false;
        };
        subtask.completed = !subtask.completed;
        self.updated_at = now;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub order: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskList {
    pub fn new(owner: &str, name: String, color: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            name,
            color,
            order: default_order(now),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskInput>,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_task(self, owner: &str, now: DateTime<Utc>, tz: Tz) -> Result<Task> {
        let title = required_title(&self.title)?;
        let subtasks = build_subtasks(self.subtasks)?;
        let due_date = match self.due_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_due_date(raw, tz)?),
            _ => None,
        };

        let mut task = Task::new(owner, title, now);
        task.description = self.description.unwrap_or_default();
        task.notes = self.notes.unwrap_or_default();
        task.category = normalize_category(self.category.as_deref());
        task.status = self.status.unwrap_or_default();
        task.tags = dedupe_tags(self.tags);
        task.subtasks = subtasks;
        task.due_date = due_date;
        Ok(task)
    }
}

/// Partial update. `None` leaves a field untouched; `due_date: Some(None)`
/// (or an empty string) clears the due date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub subtasks: Option<Vec<SubtaskInput>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<String>>,
}

impl TaskPatch {
    /// Validates every provided field before touching `task`, so a rejected
    /// patch leaves the task unchanged.
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>, tz: Tz) -> Result<()> {
        let title = self.title.as_deref().map(required_title).transpose()?;
        let subtasks = self.subtasks.map(build_subtasks).transpose()?;
        let due_date = match self.due_date {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) if raw.trim().is_empty() => Some(None),
            Some(Some(raw)) => Some(Some(parse_due_date(&raw, tz)?)),
        };

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(notes) = self.notes {
            task.notes = notes;
        }
        if let Some(category) = self.category {
            task.category = normalize_category(Some(&category));
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(tags) = self.tags {
            task.tags = dedupe_tags(tags);
        }
        if let Some(subtasks) = subtasks {
            task.subtasks = subtasks;
        }
        if let Some(due_date) = due_date {
            task.due_date = due_date;
        }
        task.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewList {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: Option<f64>,
}

impl ListPatch {
    pub fn apply(self, list: &mut TaskList, now: DateTime<Utc>) -> Result<()> {
        let name = self.name.as_deref().map(required_list_name).transpose()?;
        if let Some(order) = self.order
            && !order.is_finite()
        {
            return Err(Error::validation("list order must be a finite number"));
        }

        if let Some(name) = name {
            list.name = name;
        }
        if let Some(color) = self.color {
            list.color = color;
        }
        if let Some(order) = self.order {
            list.order = order;
        }
        list.updated_at = now;
        Ok(())
    }
}

pub fn required_list_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::validation("Name is required"));
    }
    Ok(name.to_string())
}

fn required_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(Error::validation("Title is required"));
    }
    Ok(title.to_string())
}

fn build_subtasks(inputs: Vec<SubtaskInput>) -> Result<Vec<Subtask>> {
    inputs
        .into_iter()
        .map(|input| {
            let title = input.title.trim();
            if title.is_empty() {
                return Err(Error::validation("subtask title is required"));
            }
            Ok(Subtask {
                id: input.id.unwrap_or_else(Uuid::new_v4),
                title: title.to_string(),
                completed: input.completed,
            })
        })
        .collect()
}

fn normalize_category(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(category) if !category.is_empty() => category.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Drops blank and repeated tags, keeping first-seen order.
pub fn dedupe_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_order(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64
}

fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
