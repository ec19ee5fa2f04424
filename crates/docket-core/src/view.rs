use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::datetime::DayFrame;
use crate::error::{Error, Result};
use crate::filter::{Criteria, Scope, filter};
use crate::reconcile::{CategoryCount, category_rows};
use crate::task::{Task, TaskList, TaskStatus};

pub const DEFAULT_CELL_LIMIT: usize = 3;
pub const MIN_CALENDAR_CELLS: usize = 42;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    #[default]
    List,
    Board,
    Calendar,
}

impl FromStr for ViewKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "list" => Ok(Self::List),
            "board" => Ok(Self::Board),
            "calendar" => Ok(Self::Calendar),
            other => Err(Error::validation(format!("unknown view: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewRequest {
    pub criteria: Criteria,
    pub view: ViewKind,
    pub calendar_selected_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewOptions {
    pub cell_limit: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            cell_limit: DEFAULT_CELL_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub items: Vec<Task>,
    pub grouping: Grouping,
}

/// Grouping over `ListView::items`, by task id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum Grouping {
    List(ListSections),
    Board(BoardColumns),
    Calendar(CalendarMonth),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListSections {
    pub active: Vec<Uuid>,
    pub expired: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardColumns {
    pub todo: Vec<Uuid>,
    pub doing: Vec<Uuid>,
    pub done: Vec<Uuid>,
    pub expired: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCell {
    pub date: Option<NaiveDate>,
    pub task_ids: Vec<Uuid>,
    pub overflow: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub cells: Vec<CalendarCell>,
}

/// Sidebar counters. All counts are over incomplete tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub today: usize,
    pub upcoming: usize,
    pub expired: usize,
    pub categories: Vec<CategoryCount>,
}

/// Filter, sort and group in one pass over an owner's tasks.
#[tracing::instrument(skip(tasks, frame, options), fields(input = tasks.len()))]
pub fn project(
    tasks: Vec<Task>,
    request: &ViewRequest,
    frame: &DayFrame,
    options: ViewOptions,
) -> ListView {
    let scope = request.criteria.scope;
    let mut items = filter(tasks, &request.criteria, frame);
    sort_for_scope(&mut items, scope);

    let (items, grouping) = match request.view {
        ViewKind::List => {
            let sections = list_sections(&items, scope, frame);
            (items, Grouping::List(sections))
        }
        ViewKind::Board => {
            let columns = board_columns(&items, frame);
            (items, Grouping::Board(columns))
        }
        ViewKind::Calendar => {
            let anchor = request.calendar_selected_date.unwrap_or(frame.today);
            let month = calendar_month(&items, anchor, frame, options.cell_limit);
            let items = match request.calendar_selected_date {
                Some(day) => {
                    let on_day = Criteria {
                        day: Some(day),
                        ..Criteria::default()
                    };
                    filter(items, &on_day, frame)
                }
                None => items,
            };
            (items, Grouping::Calendar(month))
        }
    };

    debug!(items = items.len(), view = ?request.view, "projected view");
    ListView { items, grouping }
}

pub fn sort_for_scope(tasks: &mut [Task], scope: Option<Scope>) {
    match scope {
        Some(Scope::Upcoming) => sort_upcoming(tasks),
        Some(Scope::Expired) => sort_expired(tasks),
        Some(Scope::Today) | None => sort_default(tasks),
    }
}

/// `(order, created_at)` ascending.
pub fn sort_default(tasks: &mut [Task]) {
    tasks.sort_by(cmp_default);
}

/// Due date ascending with undated last, then open before completed, then
/// `order`.
pub fn sort_upcoming(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        cmp_due_missing_last(a, b)
            .then(a.completed.cmp(&b.completed))
            .then(a.order.total_cmp(&b.order))
    });
}

pub fn sort_expired(tasks: &mut [Task]) {
    tasks.sort_by(cmp_due_missing_last);
}

fn cmp_default(a: &Task, b: &Task) -> Ordering {
    a.order
        .total_cmp(&b.order)
        .then(a.created_at.cmp(&b.created_at))
}

fn cmp_due_missing_last(a: &Task, b: &Task) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Without a scope, expired tasks move to their own section. Under
/// `scope=expired` every item is in that section.
pub fn list_sections(tasks: &[Task], scope: Option<Scope>, frame: &DayFrame) -> ListSections {
    let mut sections = ListSections::default();
    for task in tasks {
        match scope {
            Some(Scope::Expired) => sections.expired.push(task.id),
            _ if task.is_expired(frame) => {
                if scope.is_none() {
                    sections.expired.push(task.id);
                }
            }
            _ => sections.active.push(task.id),
        }
    }
    sections
}

/// Each task lands in exactly one column. Completed tasks and tasks whose
/// status is `done` go to `done`; remaining past-due tasks go to `expired`.
pub fn board_columns(tasks: &[Task], frame: &DayFrame) -> BoardColumns {
    let mut columns = BoardColumns::default();
    for task in tasks {
        if task.completed || task.status == TaskStatus::Done {
            columns.done.push(task.id);
        } else if task.is_expired(frame) {
            columns.expired.push(task.id);
        } else if task.status == TaskStatus::Doing {
            columns.doing.push(task.id);
        } else {
            columns.todo.push(task.id);
        }
    }
    columns
}

/// Sunday-first month grid for the month containing `anchor`, padded with
/// blank cells to a multiple of seven and at least six weeks.
pub fn calendar_month(
    tasks: &[Task],
    anchor: NaiveDate,
    frame: &DayFrame,
    cell_limit: usize,
) -> CalendarMonth {
    let first = anchor.with_day(1).unwrap_or(anchor);
    let days_in_month = first
        .checked_add_months(Months::new(1))
        .map(|next| next.signed_duration_since(first).num_days())
        .unwrap_or(31);
    let leading = first.weekday().num_days_from_sunday() as usize;

    let mut by_day: BTreeMap<NaiveDate, Vec<Uuid>> = BTreeMap::new();
    for task in tasks {
        if let Some(due) = task.due_date {
            by_day.entry(frame.local_date(due)).or_default().push(task.id);
        }
    }

    let mut cells = Vec::with_capacity(MIN_CALENDAR_CELLS);
    cells.extend((0..leading).map(|_| blank_cell()));
    for date in first.iter_days().take(days_in_month as usize) {
        let ids = by_day.remove(&date).unwrap_or_default();
        let overflow = ids.len().saturating_sub(cell_limit);
        cells.push(CalendarCell {
            date: Some(date),
            task_ids: ids.into_iter().take(cell_limit).collect(),
            overflow,
        });
    }
    while cells.len() % 7 != 0 || cells.len() < MIN_CALENDAR_CELLS {
        cells.push(blank_cell());
    }

    CalendarMonth {
        year: first.year(),
        month: first.month(),
        cells,
    }
}

fn blank_cell() -> CalendarCell {
    CalendarCell {
        date: None,
        task_ids: vec![],
        overflow: 0,
    }
}

pub fn summarize(tasks: &[Task], lists: &[TaskList], frame: &DayFrame) -> Summary {
    let mut ordered = tasks.to_vec();
    sort_default(&mut ordered);

    let open = || ordered.iter().filter(|t| !t.completed);
    Summary {
        today: open()
            .filter(|t| t.due_date.is_some_and(|due| frame.is_today(due)))
            .count(),
        upcoming: open()
            .filter(|t| t.due_date.is_none_or(|due| !frame.is_before_today(due)))
            .count(),
        expired: open().filter(|t| t.is_expired(frame)).count(),
        categories: category_rows(&ordered, lists),
    }
}
