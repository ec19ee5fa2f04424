use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::filter::category_eq;
use crate::task::{DEFAULT_CATEGORY, Task, TaskList};

/// What happens to the tasks of a deleted list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListDeletionPlan {
    /// Move the matched tasks to the default category.
    Reassign(Vec<Uuid>),
    /// Remove the matched tasks.
    Delete(Vec<Uuid>),
}

impl ListDeletionPlan {
    pub fn task_ids(&self) -> &[Uuid] {
        match self {
            Self::Reassign(ids) | Self::Delete(ids) => ids,
        }
    }
}

pub fn plan_list_deletion(list_name: &str, tasks: &[Task], cascade: bool) -> ListDeletionPlan {
    let matched: Vec<Uuid> = tasks
        .iter()
        .filter(|task| category_eq(&task.category, list_name))
        .map(|task| task.id)
        .collect();
    if cascade {
        ListDeletionPlan::Delete(matched)
    } else {
        ListDeletionPlan::Reassign(matched)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

/// Sidebar category rows: the union of task categories and list names,
/// keyed case-insensitively. A list's own name is the display name when one
/// exists; otherwise the first-seen task casing is used. Counts cover open
/// tasks only, so categories whose tasks are all completed still show up.
pub fn category_rows(tasks: &[Task], lists: &[TaskList]) -> Vec<CategoryCount> {
    let mut display: HashMap<String, String> = HashMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        let raw = if task.category.trim().is_empty() {
            DEFAULT_CATEGORY
        } else {
            task.category.as_str()
        };
        let key = raw.to_lowercase();
        if !task.completed {
            *counts.entry(key.clone()).or_insert(0) += 1;
        }
        display.entry(key).or_insert_with(|| raw.to_string());
    }

    for list in lists {
        let key = list.name.to_lowercase();
        if key.is_empty() {
            continue;
        }
        display.insert(key, list.name.clone());
    }

    let mut rows: Vec<CategoryCount> = display
        .into_iter()
        .map(|(key, name)| CategoryCount {
            count: counts.get(&key).copied().unwrap_or(0),
            name,
        })
        .collect();
    rows.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn task(category: &str, completed: bool) -> Task {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut task = Task::new("u1", format!("in {category}"), now);
        task.category = category.to_string();
        task.completed = completed;
        task
    }

    fn list(name: &str) -> TaskList {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        TaskList::new("u1", name.to_string(), String::new(), now)
    }

    #[test]
    fn plan_matches_category_case_insensitively() {
        let work = task("Work", false);
        let work_lower = task("work", true);
        let home = task("Home", false);
        let tasks = vec![work.clone(), work_lower.clone(), home];

        assert_eq!(
            plan_list_deletion("Work", &tasks, false),
            ListDeletionPlan::Reassign(vec![work.id, work_lower.id])
        );
        assert_eq!(
            plan_list_deletion("WORK", &tasks, true),
            ListDeletionPlan::Delete(vec![work.id, work_lower.id])
        );
    }

    #[test]
    fn rows_are_union_of_tasks_and_lists() {
        let tasks = vec![
            task("school", false),
            task("School", false),
            task("archive", true),
        ];
        let lists = vec![list("Errands"), list("SCHOOL")];

        let rows = category_rows(&tasks, &lists);
        assert_eq!(
            rows,
            vec![
                CategoryCount {
                    name: "archive".to_string(),
                    count: 0
                },
                CategoryCount {
                    name: "Errands".to_string(),
                    count: 0
                },
                CategoryCount {
                    name: "SCHOOL".to_string(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn first_seen_casing_without_list() {
        let rows = category_rows(&[task("Gym", false), task("gym", false)], &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Gym");
        assert_eq!(rows[0].count, 2);
    }
}
